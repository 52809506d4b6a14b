//! `WfContext`: the handle workflow code uses to request side-effectful
//! operations and to register signal/query/update handlers, via an explicit
//! runtime API called from the top of `run` rather than reflection over
//! decorated methods.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as StdContext, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::bridge::{
    ActivityOptions, ChildWorkflowOptions, Command, WorkflowExecution,
};
use crate::failure::Failure;
use crate::interceptor::{WorkflowOutboundCall, WorkflowOutboundInterceptorChain};
use crate::payload::Payload;

use super::state::{
    LocalBoxFuture, QueryHandlerFn, Slot, SlotFuture, UpdateHandlerFn, UpdateValidatorFn,
    WorkflowState,
};
use super::WorkflowError;

/// Everything about the current run that doesn't change once the run
/// starts: workflow/run identity, task queue, attempt, and the start-time
/// memo/search-attribute snapshot. Analogous to `workflow.info()` in other
/// SDKs.
#[derive(Debug, Clone)]
pub struct WorkflowInfo {
    pub workflow_id: String,
    pub run_id: String,
    pub workflow_type: String,
    pub task_queue: String,
    pub attempt: u32,
}

/// Handle to a workflow's condition-wait, activity, timer, child-workflow,
/// and signal/query/update primitives.
///
/// Cheaply `Clone`: every clone shares the same underlying
/// [`WorkflowState`], matching the single-threaded-by-construction model —
/// no synchronization needed because nothing but the executor thread ever
/// touches it.
#[derive(Clone)]
pub struct WfContext {
    pub(crate) state: Rc<RefCell<WorkflowState>>,
    pub(crate) info: Rc<WorkflowInfo>,
    pub(crate) interceptors: WorkflowOutboundInterceptorChain,
}

impl WfContext {
    pub(crate) fn new(state: Rc<RefCell<WorkflowState>>, info: WorkflowInfo) -> Self {
        Self { state, info: Rc::new(info), interceptors: WorkflowOutboundInterceptorChain::default() }
    }

    /// Install the chain observing `execute_activity`/`start_child_workflow`
    /// calls made through this context.
    pub(crate) fn with_interceptors(mut self, interceptors: WorkflowOutboundInterceptorChain) -> Self {
        self.interceptors = interceptors;
        self
    }

    pub fn info(&self) -> &WorkflowInfo {
        &self.info
    }

    /// Current deterministic time, advanced only by server-supplied
    /// activation timestamps — workflow code never reads the wall clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.state.borrow().replay_now
    }

    /// `true` while this activation is replaying previously-recorded
    /// history rather than executing live.
    pub fn is_replaying(&self) -> bool {
        self.state.borrow().is_replaying
    }

    /// Deterministic random value derived from the server-provided seed,
    /// rather than a host RNG call.
    pub fn random_u64(&self) -> u64 {
        let mut state = self.state.borrow_mut();
        // A simple splitmix64 step: deterministic, reseeded by
        // `update_random_seed` jobs, and never touches a host RNG.
        state.random_seed = state.random_seed.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = state.random_seed;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// A UUID derived deterministically from the current random stream,
    /// for the same reason `random_u64` avoids a host RNG.
    pub fn random_uuid(&self) -> uuid::Uuid {
        let hi = self.random_u64();
        let lo = self.random_u64();
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&hi.to_be_bytes());
        bytes[8..].copy_from_slice(&lo.to_be_bytes());
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.borrow().is_cancelled
    }

    fn cancelled_failure(&self) -> Failure {
        let reason = self
            .state
            .borrow()
            .cancel_reason
            .clone()
            .unwrap_or_else(|| "workflow was cancelled".to_string());
        Failure::cancelled(reason)
    }

    // -- Timers -----------------------------------------------------------

    pub fn sleep(&self, duration: Duration) -> impl Future<Output = Result<(), WorkflowError>> {
        let mut state = self.state.borrow_mut();
        let seq = state.next_seq();
        state.push_command(Command::StartTimer { seq, duration });
        let slot = Slot::new();
        state.timers.insert(seq, slot.clone());
        drop(state);

        let ctx = self.clone();
        async move {
            let result = SlotFuture::new(slot).await;
            result.map_err(|failure| {
                if failure.is_cancelled() {
                    WorkflowError::Cancelled(failure)
                } else {
                    WorkflowError::Failure(failure)
                }
            })?;
            let _ = &ctx;
            Ok(())
        }
    }

    /// Cancel a previously started timer.
    pub fn cancel_timer(&self, handle: &OperationHandle) {
        let mut state = self.state.borrow_mut();
        state.push_command(Command::CancelTimer { seq: handle.seq });
    }

    // -- Activities ---------------------------------------------------------

    pub fn execute_activity(
        &self,
        activity_type: impl Into<String>,
        input: Vec<Payload>,
        options: ActivityOptions,
    ) -> (OperationHandle, impl Future<Output = Result<Payload, WorkflowError>>) {
        let activity_type = activity_type.into();
        self.interceptors.before_call(&WorkflowOutboundCall::ExecuteActivity {
            activity_type: activity_type.clone(),
            input: input.clone(),
            options: options.clone(),
        });

        let mut state = self.state.borrow_mut();
        let seq = state.next_seq();
        state.push_command(Command::ScheduleActivity {
            seq,
            activity_type,
            input,
            options,
            headers: HashMap::new(),
        });
        let slot = Slot::new();
        state.activities.insert(seq, slot.clone());
        drop(state);

        (OperationHandle { seq }, async move {
            SlotFuture::new(slot).await.map_err(|failure| {
                if failure.is_cancelled() {
                    WorkflowError::Cancelled(failure)
                } else {
                    WorkflowError::Failure(failure)
                }
            })
        })
    }

    pub fn request_cancel_activity(&self, handle: &OperationHandle) {
        let mut state = self.state.borrow_mut();
        state.push_command(Command::RequestCancelActivity { seq: handle.seq });
    }

    // -- Child workflows ------------------------------------------------

    pub fn start_child_workflow(
        &self,
        workflow_type: impl Into<String>,
        input: Vec<Payload>,
        options: ChildWorkflowOptions,
    ) -> (OperationHandle, impl Future<Output = Result<Payload, WorkflowError>>) {
        let workflow_type = workflow_type.into();
        self.interceptors.before_call(&WorkflowOutboundCall::StartChildWorkflow {
            workflow_type: workflow_type.clone(),
            input: input.clone(),
            options: options.clone(),
        });

        let mut state = self.state.borrow_mut();
        let seq = state.next_seq();
        state.push_command(Command::StartChildWorkflow {
            seq,
            workflow_type,
            input,
            options,
            headers: HashMap::new(),
        });
        let start_slot = Slot::new();
        let result_slot = Slot::new();
        state.child_workflow_starts.insert(seq, start_slot.clone());
        state.child_workflows.insert(seq, result_slot.clone());
        drop(state);

        (OperationHandle { seq }, async move {
            SlotFuture::new(start_slot).await.map_err(|failure| {
                if failure.is_cancelled() {
                    WorkflowError::Cancelled(failure)
                } else {
                    WorkflowError::Failure(failure)
                }
            })?;
            SlotFuture::new(result_slot).await.map_err(|failure| {
                if failure.is_cancelled() {
                    WorkflowError::Cancelled(failure)
                } else {
                    WorkflowError::Failure(failure)
                }
            })
        })
    }

    pub fn request_cancel_child_workflow(&self, handle: &OperationHandle) {
        let mut state = self.state.borrow_mut();
        state.push_command(Command::CancelChildWorkflow { seq: handle.seq });
    }

    // -- Nexus operations ---------------------------------------------------

    pub fn execute_nexus_operation(
        &self,
        endpoint: impl Into<String>,
        service: impl Into<String>,
        operation: impl Into<String>,
        input: Payload,
    ) -> (OperationHandle, impl Future<Output = Result<Payload, WorkflowError>>) {
        let mut state = self.state.borrow_mut();
        let seq = state.next_seq();
        state.push_command(Command::ScheduleNexusOperation {
            seq,
            endpoint: endpoint.into(),
            service: service.into(),
            operation: operation.into(),
            input,
        });
        let start_slot = Slot::new();
        let result_slot = Slot::new();
        state.nexus_op_starts.insert(seq, start_slot.clone());
        state.nexus_ops.insert(seq, result_slot.clone());
        drop(state);

        (OperationHandle { seq }, async move {
            SlotFuture::new(start_slot).await.map_err(|failure| {
                if failure.is_cancelled() {
                    WorkflowError::Cancelled(failure)
                } else {
                    WorkflowError::Failure(failure)
                }
            })?;
            SlotFuture::new(result_slot).await.map_err(|failure| {
                if failure.is_cancelled() {
                    WorkflowError::Cancelled(failure)
                } else {
                    WorkflowError::Failure(failure)
                }
            })
        })
    }

    pub fn request_cancel_nexus_operation(&self, handle: &OperationHandle) {
        let mut state = self.state.borrow_mut();
        state.push_command(Command::RequestCancelNexusOperation { seq: handle.seq });
    }

    // -- Signals / cancels to external executions ----------------------

    pub fn signal_external_workflow(
        &self,
        target: WorkflowExecution,
        name: impl Into<String>,
        input: Vec<Payload>,
    ) -> impl Future<Output = Result<(), WorkflowError>> {
        let mut state = self.state.borrow_mut();
        let seq = state.next_seq();
        state.push_command(Command::SignalExternalWorkflow {
            seq,
            target,
            name: name.into(),
            input,
            headers: HashMap::new(),
        });
        let slot = Slot::new();
        state.signals_sent.insert(seq, slot.clone());
        drop(state);

        async move {
            SlotFuture::new(slot).await.map_err(WorkflowError::Failure)
        }
    }

    pub fn request_cancel_external_workflow(
        &self,
        target: WorkflowExecution,
    ) -> impl Future<Output = Result<(), WorkflowError>> {
        let mut state = self.state.borrow_mut();
        let seq = state.next_seq();
        state.push_command(Command::RequestCancelExternalWorkflow { seq, target });
        let slot = Slot::new();
        state.cancels_sent.insert(seq, slot.clone());
        drop(state);

        async move {
            SlotFuture::new(slot).await.map_err(WorkflowError::Failure)
        }
    }

    // -- Condition waits ---------------------------------------------------

    /// `await condition(predicate)`. Fails fast with a cancelled
    /// error if the workflow is already cancelled so a cancelled run
    /// doesn't block forever on a predicate that will never be
    /// re-evaluated after teardown.
    pub fn wait_condition(
        &self,
        predicate: impl Fn() -> bool + 'static,
    ) -> impl Future<Output = Result<(), WorkflowError>> {
        ConditionFuture {
            state: self.state.clone(),
            check: Rc::new(predicate),
            ctx: self.clone(),
        }
    }

    // -- Patching ---------------------------------------------------------

    pub fn has_patch(&self, id: &str) -> bool {
        self.state.borrow_mut().has_patch(id)
    }

    pub fn deprecate_patch(&self, id: &str) {
        self.state.borrow_mut().deprecate_patch(id)
    }

    // -- Memo / search attributes -----------------------------------------

    pub fn upsert_search_attributes(&self, attrs: HashMap<String, Payload>) {
        let mut state = self.state.borrow_mut();
        state.search_attributes.extend(attrs.clone());
        state.push_command(Command::UpsertSearchAttributes { search_attributes: attrs });
    }

    pub fn upsert_memo(&self, memo: HashMap<String, Payload>) {
        let mut state = self.state.borrow_mut();
        state.memo.extend(memo.clone());
        state.push_command(Command::ModifyWorkflowProperties { memo_upserts: memo });
    }

    // -- Handler registration ---------------------------------------------

    /// Register a signal handler, draining any signals buffered before
    /// registration in FIFO order. The handler is spawned as its own
    /// logical task per delivered signal.
    pub fn set_signal_handler<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Payload>, HashMap<String, Payload>) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let name = name.into();
        let handler: Rc<
            dyn Fn(Vec<Payload>, HashMap<String, Payload>) -> LocalBoxFuture<()>,
        > = Rc::new(move |input, headers| Box::pin(handler(input, headers)));

        let buffered: Vec<_> = {
            let mut state = self.state.borrow_mut();
            state.signal_handlers.insert(name.clone(), handler.clone());
            let mut drained = Vec::new();
            let mut remaining = std::collections::VecDeque::new();
            for entry in state.signal_buffer.drain(..) {
                if entry.name == name {
                    drained.push(entry);
                } else {
                    remaining.push_back(entry);
                }
            }
            state.signal_buffer = remaining;
            drained
        };

        for signal in buffered {
            self.spawn((handler)(signal.input, signal.headers));
        }
    }

    pub fn set_query_handler<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Payload>, HashMap<String, Payload>) -> Result<Payload, Failure> + 'static,
    {
        let handler: QueryHandlerFn = Rc::new(handler);
        self.state.borrow_mut().query_handlers.insert(name.into(), handler);
    }

    pub fn set_update_handler<V, H, Fut>(
        &self,
        name: impl Into<String>,
        validator: Option<V>,
        handler: H,
    ) where
        V: Fn(Vec<Payload>, HashMap<String, Payload>) -> Result<(), Failure> + 'static,
        H: Fn(Vec<Payload>, HashMap<String, Payload>) -> Fut + 'static,
        Fut: Future<Output = Result<Payload, Failure>> + 'static,
    {
        let name = name.into();
        let mut state = self.state.borrow_mut();
        if let Some(validator) = validator {
            let validator: UpdateValidatorFn = Rc::new(validator);
            state.update_validators.insert(name.clone(), validator);
        }
        let handler: UpdateHandlerFn = Rc::new(move |input, headers| Box::pin(handler(input, headers)));
        state.update_handlers.insert(name, handler);
    }

    /// Spawn an ad-hoc future as its own logical task. Queued rather than
    /// spawned immediately: a running task cannot spawn
    /// onto the executor that is currently polling it. Drained onto the
    /// executor between drain passes by
    /// [`super::instance::WorkflowInstance::drain_to_quiescence`].
    pub fn spawn(&self, future: impl Future<Output = ()> + 'static) {
        self.state.borrow_mut().pending_spawns.push(Box::pin(future));
    }
}

/// Opaque handle to a started timer, activity, or child workflow, usable
/// only to request cancellation.
#[derive(Debug, Clone, Copy)]
pub struct OperationHandle {
    seq: u32,
}

struct ConditionFuture {
    state: Rc<RefCell<WorkflowState>>,
    check: Rc<dyn Fn() -> bool>,
    ctx: WfContext,
}

impl Future for ConditionFuture {
    type Output = Result<(), WorkflowError>;

    fn poll(self: Pin<&mut Self>, cx: &mut StdContext<'_>) -> Poll<Self::Output> {
        if self.ctx.is_cancelled() {
            return Poll::Ready(Err(WorkflowError::Cancelled(self.ctx.cancelled_failure())));
        }
        if (self.check)() {
            return Poll::Ready(Ok(()));
        }
        self.state.borrow_mut().condition_waiters.push(super::state::ConditionEntry {
            check: self.check.clone(),
            waker: cx.waker().clone(),
        });
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::WorkflowOutboundInterceptor;

    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl WorkflowOutboundInterceptor for Recorder {
        fn before_call(&self, call: &WorkflowOutboundCall) {
            let label = match call {
                WorkflowOutboundCall::ExecuteActivity { activity_type, .. } => activity_type.clone(),
                WorkflowOutboundCall::StartChildWorkflow { workflow_type, .. } => workflow_type.clone(),
            };
            self.0.borrow_mut().push(label);
        }
    }

    fn test_ctx(interceptors: WorkflowOutboundInterceptorChain) -> WfContext {
        let state = Rc::new(RefCell::new(WorkflowState::new(1, Utc::now())));
        WfContext::new(
            state,
            WorkflowInfo {
                workflow_id: "wf-1".to_string(),
                run_id: "run-1".to_string(),
                workflow_type: "Greeter".to_string(),
                task_queue: "tq".to_string(),
                attempt: 1,
            },
        )
        .with_interceptors(interceptors)
    }

    #[test]
    fn execute_activity_notifies_the_installed_interceptor() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let chain = WorkflowOutboundInterceptorChain::new(vec![Rc::new(Recorder(log.clone()))]);
        let ctx = test_ctx(chain);

        let _ = ctx.execute_activity("SendEmail", vec![], ActivityOptions::default());
        assert_eq!(*log.borrow(), vec!["SendEmail".to_string()]);
    }
}
</content>
