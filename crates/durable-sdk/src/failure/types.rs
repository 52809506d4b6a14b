//! The `Failure` record: a recursive, cause-chained description of a
//! workflow or activity failure, independent of any host-language error
//! type.

use serde::{Deserialize, Serialize};

use crate::payload::Payload;

mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

/// How many times an activity or child workflow had been attempted, and
/// why it stopped retrying, as last observed by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryState {
    Unspecified,
    InProgress,
    Backoff,
    CancelRequested,
    Exhausted,
    Timeout,
    NonRetryableFailure,
}

/// What kind of timeout elapsed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutType {
    ScheduleToStart,
    StartToClose,
    Heartbeat,
}

/// The tagged variant of a [`Failure`], carrying the fields specific to its
/// kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureInfo {
    /// An application-level error raised by workflow or activity code.
    Application {
        #[serde(rename = "type")]
        error_type: String,
        non_retryable: bool,
        details: Vec<Payload>,
        #[serde(default, with = "option_duration_millis")]
        next_retry_delay: Option<std::time::Duration>,
    },
    /// The operation was cancelled cooperatively.
    Cancelled { details: Vec<Payload> },
    /// The workflow or activity was terminated by an external request.
    Terminated {},
    /// A scheduling or execution timeout elapsed.
    Timeout {
        #[serde(rename = "type")]
        timeout_type: TimeoutType,
        last_heartbeat_details: Vec<Payload>,
    },
    /// The server rejected the request or failed internally.
    Server { non_retryable: bool },
    /// An activity invocation failed; this wraps the activity's own
    /// failure as `cause`.
    Activity {
        scheduled_event_id: i64,
        started_event_id: i64,
        identity: String,
        activity_type: String,
        activity_id: String,
        retry_state: RetryState,
    },
    /// A child workflow execution failed; wraps the child's failure as
    /// `cause`.
    ChildWorkflowExecution {
        namespace: String,
        workflow_id: String,
        run_id: String,
        workflow_name: String,
        retry_state: RetryState,
    },
}

/// `{ message, source, stack_trace, encoded_attributes?, info, cause? }`.
///
/// Recursive: `Activity`/`ChildWorkflowExecution` failures carry the
/// underlying failure as `cause` so a client can walk the whole chain back
/// to its root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Failure {
    pub message: String,
    /// Name of the originating error type, independent of `info.error_type`
    /// (which is only present for `Application` failures). Analogous to a
    /// language exception's class name.
    pub source: Option<String>,
    pub stack_trace: String,
    /// Present when `encode_common_attributes` has moved `message` and
    /// `stack_trace` behind a payload (see [`crate::failure::converter`]).
    pub encoded_attributes: Option<Payload>,
    pub info: FailureInfo,
    pub cause: Option<Box<Failure>>,
}

impl Failure {
    pub fn application(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            stack_trace: String::new(),
            encoded_attributes: None,
            info: FailureInfo::Application {
                error_type: error_type.into(),
                non_retryable: false,
                details: Vec::new(),
                next_retry_delay: None,
            },
            cause: None,
        }
    }

    pub fn non_retryable(mut self) -> Self {
        if let FailureInfo::Application { non_retryable, .. } = &mut self.info {
            *non_retryable = true;
        }
        self
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            stack_trace: String::new(),
            encoded_attributes: None,
            info: FailureInfo::Cancelled { details: Vec::new() },
            cause: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = stack_trace.into();
        self
    }

    pub fn with_cause(mut self, cause: Failure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// `true` for `Cancelled`, and for an `Activity`/`ChildWorkflowExecution`
    /// failure whose `retry_state` is `CancelRequested`.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.info,
            FailureInfo::Cancelled { .. }
        ) || matches!(
            &self.info,
            FailureInfo::Activity { retry_state: RetryState::CancelRequested, .. }
                | FailureInfo::ChildWorkflowExecution { retry_state: RetryState::CancelRequested, .. }
        )
    }

    /// The deepest failure in the cause chain.
    pub fn root_cause(&self) -> &Failure {
        let mut current = self;
        while let Some(cause) = &current.cause {
            current = cause;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_builder_sets_non_retryable() {
        let failure = Failure::application("InvalidInput", "bad request").non_retryable();
        match failure.info {
            FailureInfo::Application { non_retryable, .. } => assert!(non_retryable),
            _ => panic!("expected Application"),
        }
    }

    #[test]
    fn cancelled_is_detected() {
        assert!(Failure::cancelled("stop").is_cancelled());
        assert!(!Failure::application("X", "y").is_cancelled());
    }

    #[test]
    fn root_cause_walks_the_chain() {
        let root = Failure::application("Root", "root cause");
        let middle = Failure::application("Middle", "wrapped").with_cause(root.clone());
        let top = Failure::application("Top", "outer").with_cause(middle);
        assert_eq!(top.root_cause().message, root.message);
    }
}
