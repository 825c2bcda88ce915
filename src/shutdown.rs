//! Shutdown coordination for consumer tasks.
//!
//! A [`Shutdown`] is owned by the boot path; every consumer task and every
//! handler invocation holds a [`ShutdownSignal`] subscribed from it.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
            _keepalive: None,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.rx.borrow()
    }

    /// Initiate shutdown. Idempotent.
    pub fn trigger(&self) {
        let changed = self.tx.send_if_modified(|state| {
            if *state {
                false
            } else {
                *state = true;
                true
            }
        });
        if changed {
            info!("Initiating graceful shutdown");
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`Shutdown`].
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl ShutdownSignal {
    /// A signal that never fires, for one-off handler calls outside a loop.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Holding the sender keeps `recv` pending instead of resolving on close.
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn recv(&mut self) {
        // A closed channel means the coordinator is gone; treat as shutdown.
        let _ = self.rx.wait_for(|down| *down).await;
    }
}
