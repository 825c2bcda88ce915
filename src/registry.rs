//! Table name → handler routing.
//!
//! A [`Registry`] is built at boot from [`BootResources`] for one destination
//! database and is never mutated afterwards. Each replication direction gets
//! its own registry, shared by that direction's consumer through an `Arc`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::cdc::{Operation, Row};
use crate::config::Environment;
use crate::handlers::{MemberHandler, SubscriptionHandler, TokenHandler};
use crate::service::BootResources;
use crate::shutdown::ShutdownSignal;
use crate::{Error, Result};

/// Per-message context handed to handlers and on to the services they call.
#[derive(Clone)]
pub struct HandlerContext {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    shutdown: ShutdownSignal,
}

impl HandlerContext {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, shutdown: ShutdownSignal) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            shutdown,
        }
    }

    /// A context not tied to any broker message or shutdown.
    pub fn detached() -> Self {
        Self::new("", -1, -1, ShutdownSignal::never())
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_shutdown()
    }

    /// Fails with [`Error::Shutdown`] once shutdown has been triggered.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Shutdown)
        } else {
            Ok(())
        }
    }

    /// Resolves when shutdown is triggered. Services race this against
    /// in-flight I/O.
    pub async fn cancelled(&self) {
        self.shutdown.clone().recv().await;
    }
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("offset", &self.offset)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Business adapter for one source table.
#[async_trait]
pub trait TableHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        operation: &Operation,
        after: Option<&Row>,
        before: Option<&Row>,
    ) -> Result<()>;
}

/// Immutable table → handler mapping.
#[derive(Clone, Default)]
pub struct Registry {
    handlers: HashMap<String, Arc<dyn TableHandler>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// `None` for tables nobody registered; the caller decides what that means.
    pub fn lookup(&self, table: &str) -> Option<Arc<dyn TableHandler>> {
        self.handlers.get(table).cloned()
    }

    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        tables.sort_unstable();
        tables
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("tables", &self.tables())
            .finish()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<String, Arc<dyn TableHandler>>,
}

impl RegistryBuilder {
    /// Registers `handler` for `table`, replacing any earlier registration.
    pub fn register<H>(mut self, table: impl Into<String>, handler: H) -> Self
    where
        H: TableHandler + 'static,
    {
        self.handlers.insert(table.into(), Arc::new(handler));
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            handlers: self.handlers,
        }
    }
}

/// Builds the registry for events that must land in `destination`. Every
/// handler captures that environment's service and nothing else.
pub fn build_registry(resources: &BootResources, destination: Environment) -> Registry {
    debug!(?destination, "Binding table handlers");
    let service = resources.service(destination);

    Registry::builder()
        .register(
            MemberHandler::TABLE,
            MemberHandler::new(Arc::clone(&service)),
        )
        .register(
            SubscriptionHandler::TABLE,
            SubscriptionHandler::new(Arc::clone(&service)),
        )
        .register(
            TokenHandler::TABLE,
            TokenHandler::new(service),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TableHandler for CountingHandler {
        async fn handle(
            &self,
            _ctx: &HandlerContext,
            _operation: &Operation,
            _after: Option<&Row>,
            _before: Option<&Row>,
        ) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lookup_registered_and_missing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Registry::builder()
            .register("data_peserta", CountingHandler { calls: calls.clone() })
            .build();

        let handler = registry.lookup("data_peserta").expect("handler registered");
        handler
            .handle(&HandlerContext::detached(), &Operation::Create, None, None)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.lookup("unknown_table").is_none());
        assert_eq!(registry.tables(), vec!["data_peserta"]);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_registry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(
            Registry::builder()
                .register("a", CountingHandler { calls: calls.clone() })
                .register("b", CountingHandler { calls: calls.clone() })
                .build(),
        );

        let mut tasks = Vec::new();
        for i in 0..8 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let table = if i % 2 == 0 { "a" } else { "b" };
                let handler = registry.lookup(table).unwrap();
                handler
                    .handle(&HandlerContext::detached(), &Operation::Update, None, None)
                    .await
            }));
        }
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_register_replaces_earlier_entry() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let registry = Registry::builder()
            .register("a", CountingHandler { calls: first })
            .register("a", CountingHandler { calls: second })
            .build();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_detached_context_is_never_cancelled() {
        let ctx = HandlerContext::detached();
        assert!(!ctx.is_cancelled());
        assert!(ctx.check_cancelled().is_ok());
    }
}
