//! Wire-adjacent types exchanged across the [`super::worker::BridgeWorker`]
//! boundary. These are the typed Rust stand-ins for what would, in a real
//! deployment, cross a gRPC connection as generated protobuf messages; this
//! crate defines the boundary and its shapes without depending on any
//! protobuf codegen.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::failure::Failure;
use crate::payload::Payload;
use crate::retry::RetryPolicy;

/// Opaque token the server uses to correlate a completion with the task it
/// answers. Never constructed by workflow/activity code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskToken(pub Vec<u8>);

/// `(workflow_id, run_id)`. An empty `run_id` means "the latest run".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkflowExecution {
    pub workflow_id: String,
    pub run_id: String,
}

/// Result of a completed operation (activity, timer, child workflow, ...):
/// either a success payload or a structured failure.
#[derive(Debug, Clone)]
pub enum ActivationResult {
    Completed(Payload),
    Failed(Failure),
}

/// What an update handler's two-phase result resolved to.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    Accepted,
    Rejected(Failure),
    Completed(ActivationResult),
}

/// Per-job payload for a single entry in an [`Activation`]'s job list.
#[derive(Debug, Clone)]
pub enum ActivationJob {
    InitializeWorkflow {
        workflow_type: String,
        input: Vec<Payload>,
        memo: HashMap<String, Payload>,
        search_attributes: HashMap<String, Payload>,
        headers: HashMap<String, Payload>,
        random_seed: u64,
    },
    FireTimer { seq: u32 },
    ResolveActivity { seq: u32, result: ActivationResult },
    ResolveChildWorkflowStart { seq: u32, result: ActivationResult },
    ResolveChildWorkflow { seq: u32, result: ActivationResult },
    ResolveSignalExternal { seq: u32, failure: Option<Failure> },
    ResolveRequestCancelExternal { seq: u32, failure: Option<Failure> },
    SignalWorkflow { name: String, input: Vec<Payload>, headers: HashMap<String, Payload> },
    QueryWorkflow { id: String, name: String, input: Vec<Payload>, headers: HashMap<String, Payload> },
    CancelWorkflow { reason: Option<String> },
    DoUpdate {
        id: String,
        name: String,
        input: Vec<Payload>,
        headers: HashMap<String, Payload>,
        protocol_instance_id: String,
    },
    ResolveNexusOperationStart { seq: u32, result: ActivationResult },
    ResolveNexusOperation { seq: u32, result: ActivationResult },
    NotifyHasPatch { id: String },
    UpdateRandomSeed { value: u64 },
    RemoveFromCache { reason: String },
}

/// A server-delivered batch of jobs asking the worker to advance one
/// workflow run.
#[derive(Debug, Clone)]
pub struct Activation {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_replaying: bool,
    pub jobs: Vec<ActivationJob>,
}

/// A worker-emitted directive describing what the workflow wants the
/// server to do next.
#[derive(Debug, Clone)]
pub enum Command {
    StartTimer { seq: u32, duration: Duration },
    CancelTimer { seq: u32 },
    ScheduleActivity {
        seq: u32,
        activity_type: String,
        input: Vec<Payload>,
        options: ActivityOptions,
        headers: HashMap<String, Payload>,
    },
    ScheduleLocalActivity {
        seq: u32,
        activity_type: String,
        input: Vec<Payload>,
        options: ActivityOptions,
    },
    RequestCancelActivity { seq: u32 },
    StartChildWorkflow {
        seq: u32,
        workflow_type: String,
        input: Vec<Payload>,
        options: ChildWorkflowOptions,
        headers: HashMap<String, Payload>,
    },
    CancelChildWorkflow { seq: u32 },
    SignalExternalWorkflow {
        seq: u32,
        target: WorkflowExecution,
        name: String,
        input: Vec<Payload>,
        headers: HashMap<String, Payload>,
    },
    RequestCancelExternalWorkflow { seq: u32, target: WorkflowExecution },
    RespondToQuery { id: String, result: ActivationResult },
    UpdateResponse { id: String, outcome: UpdateOutcome },
    CompleteWorkflow { result: Payload },
    FailWorkflow { failure: Failure },
    ContinueAsNew {
        workflow_type: String,
        input: Vec<Payload>,
        memo: HashMap<String, Payload>,
        search_attributes: HashMap<String, Payload>,
    },
    CancelWorkflow,
    UpsertSearchAttributes { search_attributes: HashMap<String, Payload> },
    ModifyWorkflowProperties { memo_upserts: HashMap<String, Payload> },
    SetPatchMarker { id: String, deprecated: bool },
    ScheduleNexusOperation {
        seq: u32,
        endpoint: String,
        service: String,
        operation: String,
        input: Payload,
    },
    RequestCancelNexusOperation { seq: u32 },
}

/// What the workflow state machine hands back to the worker after
/// draining an activation: either a successful batch of commands or a task
/// failure, never both.
#[derive(Debug, Clone)]
pub enum Completion {
    Successful { commands: Vec<Command> },
    Failed { failure: Failure },
}

/// Options controlling how an activity is scheduled, independent of its
/// input.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    pub task_queue: Option<String>,
    pub schedule_to_close_timeout: Option<Duration>,
    pub schedule_to_start_timeout: Option<Duration>,
    pub start_to_close_timeout: Option<Duration>,
    pub heartbeat_timeout: Option<Duration>,
    pub retry_policy: RetryPolicy,
    pub cancellation_type: ActivityCancellationType,
    pub activity_id: Option<String>,
    pub disable_eager_execution: bool,
    pub versioning_intent: VersioningIntent,
    pub priority: Option<Priority>,
    pub summary: Option<String>,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            task_queue: None,
            schedule_to_close_timeout: None,
            schedule_to_start_timeout: None,
            start_to_close_timeout: Some(Duration::from_secs(60)),
            heartbeat_timeout: None,
            retry_policy: RetryPolicy::exponential(),
            cancellation_type: ActivityCancellationType::TryCancel,
            activity_id: None,
            disable_eager_execution: false,
            versioning_intent: VersioningIntent::Unspecified,
            priority: None,
            summary: None,
        }
    }
}

/// How an activity invocation reacts to workflow-side cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityCancellationType {
    /// Request cancellation and don't wait for confirmation.
    TryCancel,
    /// Request cancellation and wait for the activity to acknowledge it.
    WaitCancellationCompleted,
    /// Detach: the activity keeps running after the workflow moves on.
    Abandon,
}

/// Whether an activity (or child workflow) should run on a worker running
/// the same build id as the one scheduling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersioningIntent {
    #[default]
    Unspecified,
    Default,
    Compatible,
}

/// Relative scheduling priority. Lower `priority_key` values are dispatched
/// first; `None` defers to the task queue's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Priority {
    pub priority_key: Option<i32>,
}

/// Options controlling a child workflow invocation.
#[derive(Debug, Clone, Default)]
pub struct ChildWorkflowOptions {
    pub workflow_id: Option<String>,
    pub task_queue: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
    pub cancellation_type: ChildWorkflowCancellationType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildWorkflowCancellationType {
    #[default]
    WaitCancellationCompleted,
    TryCancel,
    Abandon,
}

/// An activity task delivered by the server to be executed by the activity
/// worker.
#[derive(Debug, Clone)]
pub struct ActivityTask {
    pub task_token: TaskToken,
    pub activity_type: String,
    pub activity_id: String,
    pub workflow_execution: WorkflowExecution,
    pub input: Vec<Payload>,
    pub headers: HashMap<String, Payload>,
    pub heartbeat_timeout: Option<Duration>,
    pub start_to_close_timeout: Option<Duration>,
    /// Heartbeat details from the most recent attempt, if this is a retry.
    pub heartbeat_details: Vec<Payload>,
    pub attempt: u32,
}

/// Outcome of executing an activity task, reported back through the bridge.
#[derive(Debug, Clone)]
pub enum ActivityTaskCompletion {
    Completed { task_token: TaskToken, result: Payload },
    Failed { task_token: TaskToken, failure: Failure },
    Cancelled { task_token: TaskToken, details: Vec<Payload> },
}
