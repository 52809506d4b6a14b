//! Client-facing configuration shapes, modeled directly on
//! [`crate::worker::WorkerOptions`].

use std::collections::HashMap;
use std::time::Duration;

use crate::config::{load_dotenv, optional_var, required_var, ConfigError};
use crate::payload::Payload;
use crate::retry::RetryPolicy;

/// What happens when `start_workflow_execution` is called for a workflow id
/// that already has a closed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowIdReusePolicy {
    #[default]
    AllowDuplicate,
    AllowDuplicateFailedOnly,
    RejectDuplicate,
    TerminateIfRunning,
}

/// What happens when `start_workflow_execution` is called for a workflow id
/// that already has a *running* execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowIdConflictPolicy {
    #[default]
    Fail,
    UseExisting,
    TerminateExisting,
}

/// `{ id, task_queue, timeouts, id_reuse_policy, id_conflict_policy,
/// retry_policy?, cron_schedule?, memo?, search_attributes?, start_delay?,
/// request_eager_start }`.
#[derive(Debug, Clone)]
pub struct WorkflowStartOptions {
    pub id: String,
    pub task_queue: String,
    pub execution_timeout: Option<Duration>,
    pub run_timeout: Option<Duration>,
    pub task_timeout: Option<Duration>,
    pub id_reuse_policy: WorkflowIdReusePolicy,
    pub id_conflict_policy: WorkflowIdConflictPolicy,
    pub retry_policy: Option<RetryPolicy>,
    pub cron_schedule: Option<String>,
    pub memo: HashMap<String, Payload>,
    pub search_attributes: HashMap<String, Payload>,
    pub start_delay: Option<Duration>,
    pub request_eager_start: bool,
}

impl WorkflowStartOptions {
    pub fn new(id: impl Into<String>, task_queue: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_queue: task_queue.into(),
            execution_timeout: None,
            run_timeout: None,
            task_timeout: None,
            id_reuse_policy: WorkflowIdReusePolicy::default(),
            id_conflict_policy: WorkflowIdConflictPolicy::default(),
            retry_policy: None,
            cron_schedule: None,
            memo: HashMap::new(),
            search_attributes: HashMap::new(),
            start_delay: None,
            request_eager_start: false,
        }
    }

    pub fn with_id_reuse_policy(mut self, policy: WorkflowIdReusePolicy) -> Self {
        self.id_reuse_policy = policy;
        self
    }

    pub fn with_id_conflict_policy(mut self, policy: WorkflowIdConflictPolicy) -> Self {
        self.id_conflict_policy = policy;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_cron_schedule(mut self, expression: impl Into<String>) -> Self {
        self.cron_schedule = Some(expression.into());
        self
    }

    pub fn with_memo(mut self, key: impl Into<String>, value: Payload) -> Self {
        self.memo.insert(key.into(), value);
        self
    }

    pub fn with_search_attribute(mut self, key: impl Into<String>, value: Payload) -> Self {
        self.search_attributes.insert(key.into(), value);
        self
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    pub fn with_request_eager_start(mut self, eager: bool) -> Self {
        self.request_eager_start = eager;
        self
    }
}

/// Whether an update call waits for acceptance or for completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateLifecycleStage {
    Admitted,
    #[default]
    Accepted,
    Completed,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub wait_for_stage: UpdateLifecycleStage,
}

/// Identity and transport configuration shared by every client call,
/// modeled on [`crate::worker::WorkerOptions`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub namespace: String,
    pub identity: Option<String>,
    pub api_key: Option<String>,
    pub server_hostname: String,
}

impl ClientOptions {
    pub fn new(namespace: impl Into<String>, server_hostname: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), identity: None, api_key: None, server_hostname: server_hostname.into() }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Load from `DURABLE_NAMESPACE`/`DURABLE_SERVER_HOSTNAME` (required)
    /// and `DURABLE_IDENTITY`/`DURABLE_API_KEY` (optional), matching
    /// `WorkerOptions::from_env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();

        Ok(Self {
            namespace: required_var("DURABLE_NAMESPACE")?,
            identity: optional_var("DURABLE_IDENTITY"),
            api_key: optional_var("DURABLE_API_KEY"),
            server_hostname: required_var("DURABLE_SERVER_HOSTNAME")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_construction_applies_documented_defaults() {
        let options = WorkflowStartOptions::new("order-123", "orders-tq");
        assert_eq!(options.id_reuse_policy, WorkflowIdReusePolicy::AllowDuplicate);
        assert_eq!(options.id_conflict_policy, WorkflowIdConflictPolicy::Fail);
        assert!(options.retry_policy.is_none());
        assert!(!options.request_eager_start);
    }

    #[test]
    fn builder_methods_override_fields() {
        let options = WorkflowStartOptions::new("order-123", "orders-tq")
            .with_id_conflict_policy(WorkflowIdConflictPolicy::UseExisting)
            .with_cron_schedule("0 0 * * *")
            .with_request_eager_start(true);
        assert_eq!(options.id_conflict_policy, WorkflowIdConflictPolicy::UseExisting);
        assert_eq!(options.cron_schedule.as_deref(), Some("0 0 * * *"));
        assert!(options.request_eager_start);
    }

    #[test]
    fn client_options_from_env_reports_missing_required_field() {
        std::env::remove_var("DURABLE_NAMESPACE");
        let err = ClientOptions::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("DURABLE_NAMESPACE")));
    }
}
