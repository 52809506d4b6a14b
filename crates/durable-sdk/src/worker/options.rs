//! Worker configuration: namespace, task queue, identity, and concurrency
//! limits a worker runs with.
//!
//! Grounded on `crates/durable/src/worker/pool.rs`'s `WorkerPoolConfig`
//! builder shape, extended with an environment-backed constructor per the
//! ambient-stack configuration amendment.

use std::time::Duration;

use crate::config::{load_dotenv, optional_parsed, optional_var, required_var, ConfigError};

/// What worker(s) poll, who they identify as, and how much concurrency
/// they're allowed.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub namespace: String,
    pub task_queue: String,
    pub build_id: String,
    pub identity: Option<String>,
    pub api_key: Option<String>,
    pub server_hostname: String,
    pub heartbeat_interval_ms: u64,
    pub max_concurrent_workflow_tasks: usize,
    pub max_concurrent_activities: usize,
    pub sticky_queue_schedule_to_start_timeout: Duration,
}

impl WorkerOptions {
    /// Construct explicitly, applying the same defaults `from_env` falls
    /// back to for fields the spec marks optional.
    pub fn new(namespace: impl Into<String>, task_queue: impl Into<String>, build_id: impl Into<String>, server_hostname: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            task_queue: task_queue.into(),
            build_id: build_id.into(),
            identity: None,
            api_key: None,
            server_hostname: server_hostname.into(),
            heartbeat_interval_ms: 30_000,
            max_concurrent_workflow_tasks: 40,
            max_concurrent_activities: 200,
            sticky_queue_schedule_to_start_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent_workflow_tasks(mut self, n: usize) -> Self {
        self.max_concurrent_workflow_tasks = n.max(1);
        self
    }

    pub fn with_max_concurrent_activities(mut self, n: usize) -> Self {
        self.max_concurrent_activities = n.max(1);
        self
    }

    /// Load required fields from `DURABLE_NAMESPACE`, `DURABLE_TASK_QUEUE`,
    /// `DURABLE_BUILD_ID`, `DURABLE_SERVER_HOSTNAME`; optional fields from
    /// their `DURABLE_*` counterparts, falling back to documented defaults.
    /// Loads a `.env` file first, matching the reference worker binary's
    /// `DATABASE_URL`-from-environment bootstrap.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();

        Ok(Self {
            namespace: required_var("DURABLE_NAMESPACE")?,
            task_queue: required_var("DURABLE_TASK_QUEUE")?,
            build_id: required_var("DURABLE_BUILD_ID")?,
            identity: optional_var("DURABLE_IDENTITY"),
            api_key: optional_var("DURABLE_API_KEY"),
            server_hostname: required_var("DURABLE_SERVER_HOSTNAME")?,
            heartbeat_interval_ms: optional_parsed("DURABLE_HEARTBEAT_INTERVAL_MS")?.unwrap_or(30_000),
            max_concurrent_workflow_tasks: optional_parsed("DURABLE_MAX_CONCURRENT_WORKFLOW_TASKS")?.unwrap_or(40),
            max_concurrent_activities: optional_parsed("DURABLE_MAX_CONCURRENT_ACTIVITIES")?.unwrap_or(200),
            sticky_queue_schedule_to_start_timeout: optional_parsed("DURABLE_STICKY_QUEUE_SCHEDULE_TO_START_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_secs(10)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_construction_applies_documented_defaults() {
        let options = WorkerOptions::new("ns", "tq", "build-1", "localhost:7233");
        assert_eq!(options.heartbeat_interval_ms, 30_000);
        assert_eq!(options.max_concurrent_activities, 200);
        assert!(options.identity.is_none());
    }

    #[test]
    fn builder_methods_override_fields() {
        let options = WorkerOptions::new("ns", "tq", "build-1", "localhost:7233")
            .with_identity("worker-1")
            .with_max_concurrent_activities(50);
        assert_eq!(options.identity.as_deref(), Some("worker-1"));
        assert_eq!(options.max_concurrent_activities, 50);
    }

    #[test]
    fn from_env_reports_missing_required_field() {
        std::env::remove_var("DURABLE_NAMESPACE");
        let err = WorkerOptions::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("DURABLE_NAMESPACE")));
    }
}
