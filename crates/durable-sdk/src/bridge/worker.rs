//! The `BridgeWorker` trait: the seam between this crate's pure
//! replay/dispatch logic and whatever actually talks to the server. This
//! crate ships only the trait and an in-memory test double; a production
//! deployment supplies a gRPC-backed implementation without touching the
//! rest of the worker runtime.
//!
//! Grounded on the `#[async_trait] WorkflowEventStore`/`Activity` boundary
//! traits in the reference corpus: an object-safe async trait assembled
//! behind an `Arc<dyn ...>` so callers never know whether they're talking
//! to the real thing or a test double.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::types::{Activation, ActivityTask, ActivityTaskCompletion, Completion, TaskToken};

/// What the server says back on a heartbeat: whether it has asked for this
/// activity's cancellation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatResponse {
    pub cancel_requested: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("bridge is shutting down")]
    ShuttingDown,

    #[error("no activation pending for run {0}")]
    NoSuchRun(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Abstracts the native/server-facing side of the worker. Polling methods
/// suspend until work is available and fail only once shutdown has been
/// initiated and drained.
#[async_trait]
pub trait BridgeWorker: Send + Sync {
    async fn poll_workflow_activation(&self) -> Result<Activation, BridgeError>;

    /// At most one completion may be in flight per run-id at a time; the
    /// server relies on this to preserve per-run ordering.
    async fn complete_workflow_activation(
        &self,
        run_id: &str,
        completion: Completion,
    ) -> Result<(), BridgeError>;

    async fn poll_activity_task(&self) -> Result<ActivityTask, BridgeError>;

    async fn complete_activity_task(&self, completion: ActivityTaskCompletion) -> Result<(), BridgeError>;

    /// Best-effort; the native side is expected to coalesce heartbeats sent
    /// faster than the server wants to hear about them.
    async fn record_activity_heartbeat(
        &self,
        task_token: TaskToken,
        details: Vec<crate::payload::Payload>,
    ) -> Result<HeartbeatResponse, BridgeError>;

    /// Causes subsequent polls to drain then fail with
    /// [`BridgeError::ShuttingDown`].
    async fn initiate_shutdown(&self);

    /// Awaited after all in-flight completions have been delivered.
    async fn finalize_shutdown(&self);
}

/// An in-memory `BridgeWorker` for tests: activations and activity tasks
/// are fed in by the test, completions are recorded for later assertion.
pub struct InMemoryBridge {
    state: Mutex<InMemoryState>,
    notify: Notify,
}

#[derive(Default)]
struct InMemoryState {
    pending_activations: VecDeque<Activation>,
    pending_activity_tasks: VecDeque<ActivityTask>,
    workflow_completions: Vec<(String, Completion)>,
    activity_completions: Vec<ActivityTaskCompletion>,
    heartbeats: Vec<(TaskToken, Vec<crate::payload::Payload>)>,
    cancel_requested: std::collections::HashSet<TaskToken>,
    shutting_down: bool,
}

impl Default for InMemoryBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBridge {
    pub fn new() -> Self {
        Self { state: Mutex::new(InMemoryState::default()), notify: Notify::new() }
    }

    /// Feed an activation to the next `poll_workflow_activation` call.
    pub fn push_activation(&self, activation: Activation) {
        self.state.lock().unwrap().pending_activations.push_back(activation);
        self.notify.notify_waiters();
    }

    /// Feed an activity task to the next `poll_activity_task` call.
    pub fn push_activity_task(&self, task: ActivityTask) {
        self.state.lock().unwrap().pending_activity_tasks.push_back(task);
        self.notify.notify_waiters();
    }

    /// Completions recorded by `complete_workflow_activation`, in order.
    pub fn recorded_workflow_completions(&self) -> Vec<(String, Completion)> {
        self.state.lock().unwrap().workflow_completions.clone()
    }

    pub fn recorded_activity_completions(&self) -> Vec<ActivityTaskCompletion> {
        self.state.lock().unwrap().activity_completions.clone()
    }

    pub fn recorded_heartbeats(&self) -> Vec<(TaskToken, Vec<crate::payload::Payload>)> {
        self.state.lock().unwrap().heartbeats.clone()
    }

    /// From the next heartbeat for `task_token` onward, respond with
    /// `cancel_requested = true` (simulating a server-initiated cancel).
    pub fn request_cancellation(&self, task_token: TaskToken) {
        self.state.lock().unwrap().cancel_requested.insert(task_token);
    }
}

#[async_trait]
impl BridgeWorker for InMemoryBridge {
    async fn poll_workflow_activation(&self) -> Result<Activation, BridgeError> {
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if let Some(activation) = state.pending_activations.pop_front() {
                    return Ok(activation);
                }
                if state.shutting_down {
                    return Err(BridgeError::ShuttingDown);
                }
            }
            self.notify.notified().await;
        }
    }

    async fn complete_workflow_activation(
        &self,
        run_id: &str,
        completion: Completion,
    ) -> Result<(), BridgeError> {
        self.state
            .lock()
            .unwrap()
            .workflow_completions
            .push((run_id.to_string(), completion));
        Ok(())
    }

    async fn poll_activity_task(&self) -> Result<ActivityTask, BridgeError> {
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if let Some(task) = state.pending_activity_tasks.pop_front() {
                    return Ok(task);
                }
                if state.shutting_down {
                    return Err(BridgeError::ShuttingDown);
                }
            }
            self.notify.notified().await;
        }
    }

    async fn complete_activity_task(&self, completion: ActivityTaskCompletion) -> Result<(), BridgeError> {
        self.state.lock().unwrap().activity_completions.push(completion);
        Ok(())
    }

    async fn record_activity_heartbeat(
        &self,
        task_token: TaskToken,
        details: Vec<crate::payload::Payload>,
    ) -> Result<HeartbeatResponse, BridgeError> {
        let mut state = self.state.lock().unwrap();
        let cancel_requested = state.cancel_requested.contains(&task_token);
        state.heartbeats.push((task_token, details));
        Ok(HeartbeatResponse { cancel_requested })
    }

    async fn initiate_shutdown(&self) {
        self.state.lock().unwrap().shutting_down = true;
        self.notify.notify_waiters();
    }

    async fn finalize_shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_activation(run_id: &str) -> Activation {
        Activation { run_id: run_id.to_string(), timestamp: Utc::now(), is_replaying: false, jobs: vec![] }
    }

    #[tokio::test]
    async fn poll_returns_pushed_activation() {
        let bridge = InMemoryBridge::new();
        bridge.push_activation(test_activation("run-1"));
        let activation = bridge.poll_workflow_activation().await.unwrap();
        assert_eq!(activation.run_id, "run-1");
    }

    #[tokio::test]
    async fn poll_blocks_until_pushed() {
        let bridge = std::sync::Arc::new(InMemoryBridge::new());
        let bridge2 = bridge.clone();
        let handle = tokio::spawn(async move { bridge2.poll_workflow_activation().await });

        tokio::task::yield_now().await;
        bridge.push_activation(test_activation("run-2"));

        let activation = handle.await.unwrap().unwrap();
        assert_eq!(activation.run_id, "run-2");
    }

    #[tokio::test]
    async fn shutdown_fails_pending_poll() {
        let bridge = std::sync::Arc::new(InMemoryBridge::new());
        let bridge2 = bridge.clone();
        let handle = tokio::spawn(async move { bridge2.poll_workflow_activation().await });

        tokio::task::yield_now().await;
        bridge.initiate_shutdown().await;

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(BridgeError::ShuttingDown)));
    }

    #[tokio::test]
    async fn completions_are_recorded_in_order() {
        let bridge = InMemoryBridge::new();
        bridge
            .complete_workflow_activation("run-1", Completion::Successful { commands: vec![] })
            .await
            .unwrap();
        bridge
            .complete_workflow_activation("run-2", Completion::Successful { commands: vec![] })
            .await
            .unwrap();

        let recorded = bridge.recorded_workflow_completions();
        assert_eq!(recorded[0].0, "run-1");
        assert_eq!(recorded[1].0, "run-2");
    }
}
