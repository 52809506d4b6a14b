//! The `WorkflowService` trait (the client surface's counterpart to
//! [`crate::bridge::BridgeWorker`]): the seam between this crate's client
//! logic and whatever actually talks to the server on the client side.
//! Ships only the trait and an in-memory test double, mirroring
//! `bridge::worker`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::bridge::{TaskToken, WorkflowExecution};
use crate::failure::Failure;
use crate::payload::Payload;

use super::options::{UpdateOptions, WorkflowIdConflictPolicy, WorkflowStartOptions};
use super::schedule::{CreateScheduleRequest, Schedule, ScheduleListEntry};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("update {0} not found or not yet resolved")]
    UpdateNotFound(String),

    #[error("schedule {0} not found")]
    ScheduleNotFound(String),
}

#[derive(Debug, Clone)]
pub struct StartWorkflowRequest {
    pub workflow_type: String,
    pub options: WorkflowStartOptions,
    pub input: Vec<Payload>,
    pub headers: HashMap<String, Payload>,
}

#[derive(Debug, Clone)]
pub struct StartWorkflowResponse {
    pub run_id: String,
    /// `true` if this call attached to an already-running execution with
    /// the same workflow id rather than starting a new run (relevant for
    /// `signal_with_start`/`id_conflict_policy=use_existing`).
    pub already_running: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateWorkflowRequest {
    pub execution: WorkflowExecution,
    pub name: String,
    pub update_id: String,
    pub input: Vec<Payload>,
    pub headers: HashMap<String, Payload>,
    pub options: UpdateOptions,
}

#[derive(Debug, Clone)]
pub enum UpdateWorkflowResponse {
    Accepted,
    Rejected(Failure),
    Completed(Result<Payload, Failure>),
}

/// Attributes of a terminal history event, as consumed by `result()`.
/// Non-terminal events are collapsed to [`HistoryEventAttributes::Other`]:
/// the client surface only needs to recognize run-closing events.
#[derive(Debug, Clone)]
pub enum HistoryEventAttributes {
    WorkflowExecutionCompleted { result: Payload, new_execution_run_id: Option<String> },
    WorkflowExecutionFailed { failure: Failure, new_execution_run_id: Option<String> },
    WorkflowExecutionContinuedAsNew { new_execution_run_id: String },
    WorkflowExecutionTimedOut,
    WorkflowExecutionCanceled { details: Vec<Payload> },
    WorkflowExecutionTerminated { reason: String, details: Vec<Payload> },
    Other,
}

#[derive(Debug, Clone)]
pub struct HistoryEvent {
    pub event_id: i64,
    pub event_time: DateTime<Utc>,
    pub attributes: HistoryEventAttributes,
}

#[derive(Debug, Clone)]
pub struct GetHistoryRequest {
    pub execution: WorkflowExecution,
    /// If set and no new event is available yet, the call blocks until one
    /// arrives (server-streaming long-poll).
    pub wait_new_event: bool,
    pub close_event_only: bool,
    pub next_page_token: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct GetHistoryResponse {
    pub events: Vec<HistoryEvent>,
    pub next_page_token: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowExecutionStatus {
    Running,
    Completed,
    Failed,
    Canceled,
    Terminated,
    ContinuedAsNew,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct WorkflowExecutionDescription {
    pub execution: WorkflowExecution,
    pub workflow_type: String,
    pub status: WorkflowExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
    pub memo: HashMap<String, Payload>,
    pub search_attributes: HashMap<String, Payload>,
}

#[derive(Debug, Clone)]
pub struct WorkflowExecutionSummary {
    pub execution: WorkflowExecution,
    pub workflow_type: String,
    pub status: WorkflowExecutionStatus,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ListWorkflowsRequest {
    pub query: String,
    pub next_page_token: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct ListWorkflowsResponse {
    pub executions: Vec<WorkflowExecutionSummary>,
    pub next_page_token: Option<Vec<u8>>,
}

/// Identifies an activity task for async completion via the `*_by_id`
/// RPCs, without requiring the caller to have kept the original task token.
#[derive(Debug, Clone)]
pub enum ActivityTaskIdentifier {
    ById { workflow_execution: WorkflowExecution, activity_id: String },
    ByToken(TaskToken),
}

/// Abstracts the server-facing side of the client, covering the subset of
/// the wire protocol the client surface needs. A production deployment
/// supplies a gRPC-backed implementation without touching
/// [`super::WorkflowClient`].
#[async_trait]
pub trait WorkflowService: Send + Sync {
    async fn start_workflow_execution(&self, request: StartWorkflowRequest) -> Result<StartWorkflowResponse, ServiceError>;

    async fn signal_workflow_execution(
        &self,
        execution: WorkflowExecution,
        name: String,
        input: Vec<Payload>,
        headers: HashMap<String, Payload>,
    ) -> Result<(), ServiceError>;

    async fn signal_with_start_workflow_execution(
        &self,
        start: StartWorkflowRequest,
        signal_name: String,
        signal_input: Vec<Payload>,
    ) -> Result<StartWorkflowResponse, ServiceError>;

    async fn query_workflow(
        &self,
        execution: WorkflowExecution,
        name: String,
        input: Vec<Payload>,
        headers: HashMap<String, Payload>,
    ) -> Result<Result<Payload, Failure>, ServiceError>;

    async fn update_workflow_execution(&self, request: UpdateWorkflowRequest) -> Result<UpdateWorkflowResponse, ServiceError>;

    async fn poll_update_workflow_execution(
        &self,
        execution: WorkflowExecution,
        update_id: String,
    ) -> Result<UpdateWorkflowResponse, ServiceError>;

    async fn terminate_workflow_execution(
        &self,
        execution: WorkflowExecution,
        reason: String,
        details: Vec<Payload>,
    ) -> Result<(), ServiceError>;

    async fn request_cancel_workflow_execution(&self, execution: WorkflowExecution) -> Result<(), ServiceError>;

    async fn describe_workflow_execution(
        &self,
        execution: WorkflowExecution,
    ) -> Result<WorkflowExecutionDescription, ServiceError>;

    async fn get_workflow_execution_history(&self, request: GetHistoryRequest) -> Result<GetHistoryResponse, ServiceError>;

    async fn list_workflow_executions(&self, request: ListWorkflowsRequest) -> Result<ListWorkflowsResponse, ServiceError>;

    async fn count_workflow_executions(&self, query: String) -> Result<i64, ServiceError>;

    async fn record_activity_task_heartbeat_by_id(
        &self,
        id: ActivityTaskIdentifier,
        details: Vec<Payload>,
    ) -> Result<crate::bridge::HeartbeatResponse, ServiceError>;

    async fn respond_activity_task_completed_by_id(&self, id: ActivityTaskIdentifier, result: Payload) -> Result<(), ServiceError>;

    async fn respond_activity_task_failed_by_id(&self, id: ActivityTaskIdentifier, failure: Failure) -> Result<(), ServiceError>;

    async fn respond_activity_task_canceled_by_id(&self, id: ActivityTaskIdentifier, details: Vec<Payload>) -> Result<(), ServiceError>;

    async fn create_schedule(&self, request: CreateScheduleRequest) -> Result<(), ServiceError>;

    async fn describe_schedule(&self, schedule_id: &str) -> Result<Schedule, ServiceError>;

    async fn list_schedules(&self, next_page_token: Option<Vec<u8>>) -> Result<(Vec<ScheduleListEntry>, Option<Vec<u8>>), ServiceError>;

    async fn delete_schedule(&self, schedule_id: &str) -> Result<(), ServiceError>;
}

/// An in-memory `WorkflowService` for tests. Executions are tracked by
/// `workflow_id`; history events accumulate per `(workflow_id, run_id)` and
/// `get_workflow_execution_history` with `wait_new_event = true` blocks
/// until a new one lands, simulating the server-streaming long-poll.
#[derive(Default)]
pub struct InMemoryWorkflowService {
    state: Mutex<InMemoryState>,
    notify: Notify,
}

#[derive(Default)]
struct InMemoryState {
    next_run_id: u64,
    running: HashMap<String, String>, // workflow_id -> run_id
    histories: HashMap<(String, String), VecDeque<HistoryEvent>>,
    descriptions: HashMap<(String, String), WorkflowExecutionDescription>,
    signals: Vec<(WorkflowExecution, String, Vec<Payload>)>,
    updates: HashMap<String, UpdateWorkflowResponse>,
    heartbeats: Vec<(ActivityTaskIdentifier, Vec<Payload>)>,
    activity_completions: Vec<(ActivityTaskIdentifier, Result<Payload, Failure>)>,
    schedules: HashMap<String, Schedule>,
    cancel_requests: Vec<WorkflowExecution>,
    terminations: Vec<(WorkflowExecution, String, Vec<Payload>)>,
}

impl InMemoryWorkflowService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start bookkeeping for a workflow id/run without going through
    /// `start_workflow_execution`, for tests that only exercise the
    /// history/result path.
    pub fn seed_running(&self, workflow_id: &str, run_id: &str, workflow_type: &str, now: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        state.running.insert(workflow_id.to_string(), run_id.to_string());
        state.histories.entry((workflow_id.to_string(), run_id.to_string())).or_default();
        state.descriptions.insert(
            (workflow_id.to_string(), run_id.to_string()),
            WorkflowExecutionDescription {
                execution: WorkflowExecution { workflow_id: workflow_id.to_string(), run_id: run_id.to_string() },
                workflow_type: workflow_type.to_string(),
                status: WorkflowExecutionStatus::Running,
                start_time: now,
                close_time: None,
                memo: HashMap::new(),
                search_attributes: HashMap::new(),
            },
        );
    }

    /// Push a terminal history event for `(workflow_id, run_id)`, waking any
    /// blocked `get_workflow_execution_history` poller.
    pub fn push_close_event(&self, workflow_id: &str, run_id: &str, attributes: HistoryEventAttributes, now: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        let key = (workflow_id.to_string(), run_id.to_string());
        let event_id = state.histories.get(&key).map(|h| h.len() as i64 + 1).unwrap_or(1);
        state.histories.entry(key.clone()).or_default().push_back(HistoryEvent { event_id, event_time: now, attributes });
        if let Some(desc) = state.descriptions.get_mut(&key) {
            desc.close_time = Some(now);
        }
        drop(state);
        self.notify.notify_waiters();
    }

    pub fn recorded_signals(&self) -> Vec<(WorkflowExecution, String, Vec<Payload>)> {
        self.state.lock().unwrap().signals.clone()
    }

    pub fn recorded_terminations(&self) -> Vec<(WorkflowExecution, String, Vec<Payload>)> {
        self.state.lock().unwrap().terminations.clone()
    }

    pub fn recorded_cancel_requests(&self) -> Vec<WorkflowExecution> {
        self.state.lock().unwrap().cancel_requests.clone()
    }

    /// Resolve a pending update, e.g. from a test driving a worker that
    /// answers it asynchronously.
    pub fn resolve_update(&self, update_id: &str, response: UpdateWorkflowResponse) {
        self.state.lock().unwrap().updates.insert(update_id.to_string(), response);
    }
}

impl Clone for ActivityTaskIdentifier {
    fn clone(&self) -> Self {
        match self {
            Self::ById { workflow_execution, activity_id } => {
                Self::ById { workflow_execution: workflow_execution.clone(), activity_id: activity_id.clone() }
            }
            Self::ByToken(token) => Self::ByToken(token.clone()),
        }
    }
}

#[async_trait]
impl WorkflowService for InMemoryWorkflowService {
    async fn start_workflow_execution(&self, request: StartWorkflowRequest) -> Result<StartWorkflowResponse, ServiceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing_run) = state.running.get(&request.options.id) {
            if request.options.id_conflict_policy == WorkflowIdConflictPolicy::UseExisting {
                return Ok(StartWorkflowResponse { run_id: existing_run.clone(), already_running: true });
            }
            if request.options.id_conflict_policy == WorkflowIdConflictPolicy::Fail {
                return Err(ServiceError::Transport(format!("workflow {} already running", request.options.id)));
            }
        }
        state.next_run_id += 1;
        let run_id = format!("run-{}", state.next_run_id);
        state.running.insert(request.options.id.clone(), run_id.clone());
        state.histories.insert((request.options.id.clone(), run_id.clone()), VecDeque::new());
        Ok(StartWorkflowResponse { run_id, already_running: false })
    }

    async fn signal_workflow_execution(
        &self,
        execution: WorkflowExecution,
        name: String,
        input: Vec<Payload>,
        _headers: HashMap<String, Payload>,
    ) -> Result<(), ServiceError> {
        self.state.lock().unwrap().signals.push((execution, name, input));
        Ok(())
    }

    async fn signal_with_start_workflow_execution(
        &self,
        start: StartWorkflowRequest,
        signal_name: String,
        signal_input: Vec<Payload>,
    ) -> Result<StartWorkflowResponse, ServiceError> {
        let response = self.start_workflow_execution(start.clone()).await?;
        self.signal_workflow_execution(
            WorkflowExecution { workflow_id: start.options.id.clone(), run_id: response.run_id.clone() },
            signal_name,
            signal_input,
            HashMap::new(),
        )
        .await?;
        Ok(response)
    }

    async fn query_workflow(
        &self,
        _execution: WorkflowExecution,
        _name: String,
        _input: Vec<Payload>,
        _headers: HashMap<String, Payload>,
    ) -> Result<Result<Payload, Failure>, ServiceError> {
        Err(ServiceError::Transport("InMemoryWorkflowService does not drive live workflow code".to_string()))
    }

    async fn update_workflow_execution(&self, request: UpdateWorkflowRequest) -> Result<UpdateWorkflowResponse, ServiceError> {
        let mut state = self.state.lock().unwrap();
        Ok(state.updates.remove(&request.update_id).unwrap_or(UpdateWorkflowResponse::Accepted))
    }

    async fn poll_update_workflow_execution(
        &self,
        _execution: WorkflowExecution,
        update_id: String,
    ) -> Result<UpdateWorkflowResponse, ServiceError> {
        self.state
            .lock()
            .unwrap()
            .updates
            .get(&update_id)
            .cloned()
            .ok_or(ServiceError::UpdateNotFound(update_id))
    }

    async fn terminate_workflow_execution(
        &self,
        execution: WorkflowExecution,
        reason: String,
        details: Vec<Payload>,
    ) -> Result<(), ServiceError> {
        let now = {
            let mut state = self.state.lock().unwrap();
            state.terminations.push((execution.clone(), reason.clone(), details.clone()));
            state.descriptions.get(&(execution.workflow_id.clone(), execution.run_id.clone())).map(|d| d.start_time)
        };
        self.push_close_event(
            &execution.workflow_id,
            &execution.run_id,
            HistoryEventAttributes::WorkflowExecutionTerminated { reason, details },
            now.unwrap_or_else(chrono_now_fallback),
        );
        Ok(())
    }

    async fn request_cancel_workflow_execution(&self, execution: WorkflowExecution) -> Result<(), ServiceError> {
        self.state.lock().unwrap().cancel_requests.push(execution);
        Ok(())
    }

    async fn describe_workflow_execution(
        &self,
        execution: WorkflowExecution,
    ) -> Result<WorkflowExecutionDescription, ServiceError> {
        self.state
            .lock()
            .unwrap()
            .descriptions
            .get(&(execution.workflow_id.clone(), execution.run_id.clone()))
            .cloned()
            .ok_or_else(|| ServiceError::Transport(format!("no such execution {execution:?}")))
    }

    async fn get_workflow_execution_history(&self, request: GetHistoryRequest) -> Result<GetHistoryResponse, ServiceError> {
        let key = (request.execution.workflow_id.clone(), request.execution.run_id.clone());
        loop {
            {
                let mut state = self.state.lock().unwrap();
                let history = state.histories.entry(key.clone()).or_default();
                if !history.is_empty() {
                    let events: Vec<_> = if request.close_event_only {
                        history.iter().cloned().collect()
                    } else {
                        history.iter().cloned().collect()
                    };
                    return Ok(GetHistoryResponse { events, next_page_token: None });
                }
                if !request.wait_new_event {
                    return Ok(GetHistoryResponse { events: vec![], next_page_token: None });
                }
            }
            self.notify.notified().await;
        }
    }

    async fn list_workflow_executions(&self, _request: ListWorkflowsRequest) -> Result<ListWorkflowsResponse, ServiceError> {
        let state = self.state.lock().unwrap();
        let executions = state
            .descriptions
            .values()
            .map(|d| WorkflowExecutionSummary {
                execution: d.execution.clone(),
                workflow_type: d.workflow_type.clone(),
                status: d.status,
                start_time: d.start_time,
            })
            .collect();
        Ok(ListWorkflowsResponse { executions, next_page_token: None })
    }

    async fn count_workflow_executions(&self, _query: String) -> Result<i64, ServiceError> {
        Ok(self.state.lock().unwrap().descriptions.len() as i64)
    }

    async fn record_activity_task_heartbeat_by_id(
        &self,
        id: ActivityTaskIdentifier,
        details: Vec<Payload>,
    ) -> Result<crate::bridge::HeartbeatResponse, ServiceError> {
        self.state.lock().unwrap().heartbeats.push((id, details));
        Ok(crate::bridge::HeartbeatResponse::default())
    }

    async fn respond_activity_task_completed_by_id(&self, id: ActivityTaskIdentifier, result: Payload) -> Result<(), ServiceError> {
        self.state.lock().unwrap().activity_completions.push((id, Ok(result)));
        Ok(())
    }

    async fn respond_activity_task_failed_by_id(&self, id: ActivityTaskIdentifier, failure: Failure) -> Result<(), ServiceError> {
        self.state.lock().unwrap().activity_completions.push((id, Err(failure)));
        Ok(())
    }

    async fn respond_activity_task_canceled_by_id(&self, id: ActivityTaskIdentifier, details: Vec<Payload>) -> Result<(), ServiceError> {
        self.state.lock().unwrap().activity_completions.push((id, Err(Failure::cancelled("activity cancelled").with_cause(
            Failure { message: String::new(), source: None, stack_trace: String::new(), encoded_attributes: None, info: crate::failure::FailureInfo::Cancelled { details }, cause: None },
        ))));
        Ok(())
    }

    async fn create_schedule(&self, request: CreateScheduleRequest) -> Result<(), ServiceError> {
        self.state.lock().unwrap().schedules.insert(request.schedule_id.clone(), request.schedule);
        Ok(())
    }

    async fn describe_schedule(&self, schedule_id: &str) -> Result<Schedule, ServiceError> {
        self.state
            .lock()
            .unwrap()
            .schedules
            .get(schedule_id)
            .cloned()
            .ok_or_else(|| ServiceError::ScheduleNotFound(schedule_id.to_string()))
    }

    async fn list_schedules(&self, _next_page_token: Option<Vec<u8>>) -> Result<(Vec<ScheduleListEntry>, Option<Vec<u8>>), ServiceError> {
        let state = self.state.lock().unwrap();
        let entries = state
            .schedules
            .iter()
            .map(|(id, schedule)| ScheduleListEntry {
                schedule_id: id.clone(),
                spec: schedule.spec.clone(),
                memo: schedule.memo.clone(),
                paused: schedule.paused,
            })
            .collect();
        Ok((entries, None))
    }

    async fn delete_schedule(&self, schedule_id: &str) -> Result<(), ServiceError> {
        self.state.lock().unwrap().schedules.remove(schedule_id);
        Ok(())
    }
}

fn chrono_now_fallback() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).expect("epoch is a valid timestamp")
}
