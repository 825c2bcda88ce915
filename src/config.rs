use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub kafka: KafkaConfig,
    pub databases: DatabasesConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub group_id: String,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u32,
    #[serde(default = "default_auto_commit_interval_ms")]
    pub auto_commit_interval_ms: u32,
}

/// One topic per replication direction. A missing or empty topic disables
/// that direction's consumer.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TopicsConfig {
    #[serde(default)]
    pub local_to_prod: Option<String>,
    #[serde(default)]
    pub prod_to_local: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabasesConfig {
    pub local: PostgresConfig,
    pub production: PostgresConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// One of the two databases the pipeline replicates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Local,
    Production,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("GOLDGYM_CDC")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("kafka.brokers")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kafka.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(Error::Config("kafka.brokers must not be empty".to_string()));
        }
        if self.kafka.group_id.trim().is_empty() {
            return Err(Error::Config("kafka.group_id must not be empty".to_string()));
        }
        if self.kafka.topics.local_to_prod().is_none() && self.kafka.topics.prod_to_local().is_none() {
            return Err(Error::Config(
                "at least one of kafka.topics.local_to_prod or kafka.topics.prod_to_local must be set"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl KafkaConfig {
    pub fn bootstrap_servers(&self) -> String {
        self.brokers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl TopicsConfig {
    pub fn local_to_prod(&self) -> Option<&str> {
        non_empty(self.local_to_prod.as_deref())
    }

    pub fn prod_to_local(&self) -> Option<&str> {
        non_empty(self.prod_to_local.as_deref())
    }
}

impl PostgresConfig {
    pub fn postgres_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?connect_timeout={}",
            self.username,
            self.password,
            self.host,
            self.port,
            self.database,
            self.connect_timeout_secs
        )
    }
}

fn non_empty(topic: Option<&str>) -> Option<&str> {
    topic.map(str::trim).filter(|t| !t.is_empty())
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_session_timeout_ms() -> u32 {
    30_000
}

fn default_auto_commit_interval_ms() -> u32 {
    5000
}

fn default_connect_timeout() -> u64 {
    30
}
