//! The `Activity` trait and its type-erased registry, mirroring
//! [`crate::workflow::Workflow`]/`WorkflowRegistry` for the activity side.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bridge::WorkflowExecution;
use crate::cancellation::CancellationToken;
use crate::failure::Failure;
use crate::payload::{DataConverter, Payload, PayloadError};

/// Identity and scheduling facts about the activity task currently
/// executing, analogous to `WorkflowInfo` on the workflow side.
#[derive(Debug, Clone)]
pub struct ActivityInfo {
    pub activity_type: String,
    pub activity_id: String,
    pub workflow_execution: WorkflowExecution,
    pub attempt: u32,
    pub heartbeat_timeout: Option<Duration>,
    pub start_to_close_timeout: Option<Duration>,
    /// Heartbeat details recorded by the previous attempt, if this is a
    /// retry.
    pub heartbeat_details: Vec<Payload>,
}

/// Handle passed to a running activity: identity, cooperative
/// cancellation, and heartbeating, via an explicit `CancellationToken`
/// passed down through activity calls rather than implicit task-local state.
#[derive(Clone)]
pub struct ActivityContext {
    info: Arc<ActivityInfo>,
    cancellation_token: CancellationToken,
    heartbeat_tx: tokio::sync::mpsc::UnboundedSender<Vec<Payload>>,
}

impl ActivityContext {
    pub(crate) fn new(
        info: ActivityInfo,
        cancellation_token: CancellationToken,
        heartbeat_tx: tokio::sync::mpsc::UnboundedSender<Vec<Payload>>,
    ) -> Self {
        Self { info: Arc::new(info), cancellation_token, heartbeat_tx }
    }

    pub fn info(&self) -> &ActivityInfo {
        &self.info
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Record heartbeat details. Coalesced by [`super::heartbeat`] and
    /// flushed at most once per configured interval.
    pub fn heartbeat(&self, details: Vec<Payload>) {
        let _ = self.heartbeat_tx.send(details);
    }
}

/// What activity code can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("{0}")]
    Application(Failure),

    #[error("activity was cancelled")]
    Cancelled(Failure),

    /// The activity will be completed later, out of band, via the async
    /// activity completion client surface; no completion is emitted
    /// for this task.
    #[error("activity completion deferred")]
    CompleteAsync,
}

impl ActivityError {
    pub fn application(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        ActivityError::Application(Failure::application(error_type, message))
    }

    pub fn non_retryable(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        ActivityError::Application(Failure::application(error_type, message).non_retryable())
    }
}

impl From<Failure> for ActivityError {
    fn from(failure: Failure) -> Self {
        if failure.is_cancelled() {
            ActivityError::Cancelled(failure)
        } else {
            ActivityError::Application(failure)
        }
    }
}

/// A concrete activity implementation.
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    const ACTIVITY_TYPE: &'static str;
    type Input: DeserializeOwned + Send + 'static;
    type Output: Serialize + Send + 'static;

    async fn run(&self, ctx: ActivityContext, input: Self::Input) -> Result<Self::Output, ActivityError>;
}

#[async_trait]
trait ErasedActivity: Send + Sync {
    async fn run(
        &self,
        ctx: ActivityContext,
        input: Vec<Payload>,
        data_converter: &DataConverter,
    ) -> Result<Payload, ActivityError>;
}

struct ActivityEntry<A: Activity> {
    activity: Arc<A>,
}

#[async_trait]
impl<A: Activity> ErasedActivity for ActivityEntry<A> {
    async fn run(
        &self,
        ctx: ActivityContext,
        input: Vec<Payload>,
        data_converter: &DataConverter,
    ) -> Result<Payload, ActivityError> {
        let decoded: A::Input = decode_input(input.first(), data_converter)
            .map_err(|e| ActivityError::application("DataConverterError", e.to_string()))?;
        let output = self.activity.run(ctx, decoded).await?;
        data_converter
            .to_payload(&output, "output")
            .map_err(|e| ActivityError::application("DataConverterError", e.to_string()))
    }
}

fn decode_input<T: DeserializeOwned>(
    first: Option<&Payload>,
    data_converter: &DataConverter,
) -> Result<T, PayloadError> {
    match first {
        Some(payload) => data_converter.from_payload(payload, "input.0"),
        None => {
            let null_payload = Payload::with_encoding("binary/null", Vec::new());
            data_converter.from_payload(&null_payload, "input.0")
        }
    }
}

/// Maps activity type names to registered [`Activity`] implementations,
/// consulted by the activity worker per polled task.
#[derive(Default)]
pub struct ActivityRegistry {
    entries: HashMap<String, Arc<dyn ErasedActivity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A: Activity>(&mut self, activity: A) {
        self.entries
            .insert(A::ACTIVITY_TYPE.to_string(), Arc::new(ActivityEntry { activity: Arc::new(activity) }));
    }

    pub fn is_registered(&self, activity_type: &str) -> bool {
        self.entries.contains_key(activity_type)
    }

    pub(crate) async fn run(
        &self,
        activity_type: &str,
        ctx: ActivityContext,
        input: Vec<Payload>,
        data_converter: &DataConverter,
    ) -> Result<Payload, ActivityError> {
        match self.entries.get(activity_type) {
            Some(entry) => entry.run(ctx, input, data_converter).await,
            None => Err(ActivityError::application(
                "NotFound",
                format!("activity type {activity_type} is not registered"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Double;

    #[async_trait]
    impl Activity for Double {
        const ACTIVITY_TYPE: &'static str = "Double";
        type Input = i32;
        type Output = i32;

        async fn run(&self, _ctx: ActivityContext, input: i32) -> Result<i32, ActivityError> {
            Ok(input * 2)
        }
    }

    fn test_ctx() -> ActivityContext {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        ActivityContext::new(
            ActivityInfo {
                activity_type: "Double".to_string(),
                activity_id: "a1".to_string(),
                workflow_execution: WorkflowExecution { workflow_id: "wf".to_string(), run_id: "run".to_string() },
                attempt: 1,
                heartbeat_timeout: None,
                start_to_close_timeout: None,
                heartbeat_details: Vec::new(),
            },
            CancellationToken::new(),
            tx,
        )
    }

    #[tokio::test]
    async fn registered_activity_decodes_input_and_encodes_output() {
        let mut registry = ActivityRegistry::new();
        registry.register(Double);
        let data_converter = DataConverter::default();
        let input = vec![data_converter.to_payload(&21, "input.0").unwrap()];

        let payload = registry.run("Double", test_ctx(), input, &data_converter).await.unwrap();
        let output: i32 = data_converter.from_payload(&payload, "output").unwrap();
        assert_eq!(output, 42);
    }

    #[tokio::test]
    async fn unregistered_activity_type_is_an_error() {
        let registry = ActivityRegistry::new();
        let data_converter = DataConverter::default();
        let err = registry.run("Missing", test_ctx(), vec![], &data_converter).await.unwrap_err();
        assert!(matches!(err, ActivityError::Application(_)));
    }
}
</content>
