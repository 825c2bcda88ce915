//! Starts and supervises one consumer loop per replication direction.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{Environment, KafkaConfig, TopicsConfig};
use crate::consumer::{ConsumerLoop, ConsumerStats};
use crate::kafka::{KafkaSource, MessageSource};
use crate::registry::{build_registry, Registry};
use crate::service::BootResources;
use crate::shutdown::Shutdown;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    LocalToProd,
    ProdToLocal,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::LocalToProd, Direction::ProdToLocal];

    /// Appended to the base group id so each direction tracks its own offsets.
    pub fn suffix(&self) -> &'static str {
        match self {
            Direction::LocalToProd => "local-to-prod",
            Direction::ProdToLocal => "prod-to-local",
        }
    }

    /// Database whose changes this direction's topic carries.
    pub fn source(&self) -> Environment {
        match self {
            Direction::LocalToProd => Environment::Local,
            Direction::ProdToLocal => Environment::Production,
        }
    }

    /// Database this direction writes into. Always the opposite of `source`.
    pub fn destination(&self) -> Environment {
        match self {
            Direction::LocalToProd => Environment::Production,
            Direction::ProdToLocal => Environment::Local,
        }
    }

    fn topic<'a>(&self, topics: &'a TopicsConfig) -> Option<&'a str> {
        match self {
            Direction::LocalToProd => topics.local_to_prod(),
            Direction::ProdToLocal => topics.prod_to_local(),
        }
    }
}

/// What one consumer task subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSpec {
    pub direction: Direction,
    pub topic: String,
    pub group_id: String,
}

/// One spec per direction with a configured topic.
pub fn consumer_specs(kafka: &KafkaConfig) -> Vec<ConsumerSpec> {
    Direction::ALL
        .iter()
        .filter_map(|direction| {
            direction.topic(&kafka.topics).map(|topic| ConsumerSpec {
                direction: *direction,
                topic: topic.to_string(),
                group_id: format!("{}-{}", kafka.group_id, direction.suffix()),
            })
        })
        .collect()
}

/// Capped exponential backoff between restarts of a failed consumer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RestartPolicy {
    /// Delay before restart number `failures` (1-based).
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug)]
pub enum ExitReason {
    /// The loop stopped because shutdown was requested.
    Shutdown(ConsumerStats),
    /// The source could not be created.
    SourceFailed(String),
    /// The loop task panicked or was aborted.
    Crashed(String),
}

/// Termination notice for one run of a consumer task.
#[derive(Debug)]
pub struct TaskExit {
    pub direction: Direction,
    pub attempt: u32,
    pub reason: ExitReason,
    /// Whether the supervisor will start the loop again.
    pub restarting: bool,
}

/// Handles to the running consumer tasks.
pub struct ConsumerSet {
    tasks: Vec<(Direction, JoinHandle<()>)>,
    exits: mpsc::UnboundedReceiver<TaskExit>,
}

impl ConsumerSet {
    pub fn directions(&self) -> Vec<Direction> {
        self.tasks.iter().map(|(direction, _)| *direction).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Next termination notice. `None` once every task has finished.
    pub async fn next_exit(&mut self) -> Option<TaskExit> {
        self.exits.recv().await
    }

    /// Waits for every supervisor to finish. Call after triggering shutdown.
    pub async fn join(self) {
        let (directions, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        for (direction, result) in directions
            .into_iter()
            .zip(futures::future::join_all(handles).await)
        {
            if let Err(e) = result {
                error!(direction = direction.suffix(), "Consumer supervisor failed: {}", e);
            }
        }
    }
}

/// Starts one Kafka consumer per configured direction, each routing into a
/// registry bound to that direction's destination. Returns immediately.
pub fn start_consumers(kafka: &KafkaConfig, resources: &BootResources, shutdown: &Shutdown) -> ConsumerSet {
    let config = kafka.clone();
    start_consumers_with(
        consumer_specs(kafka),
        |direction| Arc::new(build_registry(resources, direction.destination())),
        shutdown,
        kafka.retry_backoff(),
        RestartPolicy::default(),
        move |spec: &ConsumerSpec| KafkaSource::new(&config, &spec.topic, &spec.group_id),
    )
}

/// Starts one supervised loop per spec. `registry_for` supplies the registry
/// of each direction and `factory` builds its sources.
pub fn start_consumers_with<R, F, S>(
    specs: Vec<ConsumerSpec>,
    registry_for: R,
    shutdown: &Shutdown,
    retry_backoff: Duration,
    policy: RestartPolicy,
    factory: F,
) -> ConsumerSet
where
    R: Fn(Direction) -> Arc<Registry>,
    F: Fn(&ConsumerSpec) -> Result<S> + Send + Sync + 'static,
    S: MessageSource + 'static,
{
    if specs.is_empty() {
        warn!("No Kafka topics configured, no consumers started");
    }

    let factory = Arc::new(factory);
    let (exit_tx, exits) = mpsc::unbounded_channel();

    let tasks = specs
        .into_iter()
        .map(|spec| {
            let direction = spec.direction;
            let registry = registry_for(direction);
            info!(
                direction = direction.suffix(),
                topic = %spec.topic,
                group_id = %spec.group_id,
                destination = ?direction.destination(),
                tables = ?registry.tables(),
                "Starting CDC consumer"
            );
            let supervisor = Supervisor {
                spec,
                registry,
                shutdown: shutdown.clone(),
                retry_backoff,
                policy,
                exits: exit_tx.clone(),
            };
            let handle = tokio::spawn(supervisor.run(Arc::clone(&factory)));
            (direction, handle)
        })
        .collect();

    info!("Kafka consumers started");
    ConsumerSet { tasks, exits }
}

struct Supervisor {
    spec: ConsumerSpec,
    registry: Arc<Registry>,
    shutdown: Shutdown,
    retry_backoff: Duration,
    policy: RestartPolicy,
    exits: mpsc::UnboundedSender<TaskExit>,
}

impl Supervisor {
    async fn run<F, S>(self, factory: Arc<F>)
    where
        F: Fn(&ConsumerSpec) -> Result<S> + Send + Sync + 'static,
        S: MessageSource + 'static,
    {
        let mut signal = self.shutdown.subscribe();
        let direction = self.spec.direction.suffix();
        let mut attempt = 0u32;
        let mut failures = 0u32;

        loop {
            attempt += 1;
            let started = Instant::now();

            let reason = match (*factory)(&self.spec) {
                Err(e) => ExitReason::SourceFailed(e.to_string()),
                Ok(source) => {
                    let consumer = ConsumerLoop::new(
                        self.spec.group_id.clone(),
                        source,
                        Arc::clone(&self.registry),
                        signal.clone(),
                    )
                    .with_retry_backoff(self.retry_backoff);
                    match tokio::spawn(consumer.run()).await {
                        Ok(stats) => ExitReason::Shutdown(stats),
                        Err(e) => ExitReason::Crashed(e.to_string()),
                    }
                }
            };

            let restarting = !matches!(reason, ExitReason::Shutdown(_)) && !signal.is_shutdown();
            if restarting {
                if started.elapsed() >= self.policy.max_backoff {
                    failures = 0;
                }
                failures += 1;
                error!(direction, attempt, reason = ?reason, "CDC consumer terminated unexpectedly");
            }

            let _ = self.exits.send(TaskExit {
                direction: self.spec.direction,
                attempt,
                reason,
                restarting,
            });

            if !restarting {
                info!(direction, "CDC consumer stopped");
                break;
            }

            let delay = self.policy.backoff(failures);
            warn!(direction, delay_ms = delay.as_millis() as u64, "Restarting CDC consumer");
            tokio::select! {
                biased;
                _ = signal.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
