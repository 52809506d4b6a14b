//! The activity worker: polls activity tasks and runs them
//! concurrently, bounded by `max_concurrent_activities`.
//!
//! Grounded on `crates/durable/src/worker/pool.rs`'s `WorkerPool::
//! start_poll_loop` (poll, acquire a semaphore permit, spawn, report the
//! result back to the store), adapted from a single outcome report to the
//! three-way `completed`/`cancelled`/`failed` split plus the `CompleteAsync`
//! no-completion case.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use crate::bridge::{ActivityTask, ActivityTaskCompletion, BridgeError, BridgeWorker};
use crate::cancellation::CancellationToken;
use crate::failure::{Failure, FailureConverter, FailureInfo};
use crate::interceptor::{ActivityInboundInterceptorChain, ExecuteActivityInput, ExecuteActivityOutcome};
use crate::payload::{DataConverter, Payload};

use super::activity::{ActivityContext, ActivityError, ActivityInfo, ActivityRegistry};
use super::options::WorkerOptions;

/// Owns the activity poll loop. Unlike [`super::WorkflowWorker`], its
/// [`Self::run`] future is `Send`: activities and their handler table share
/// no `Rc`/`RefCell` state, only `Arc`-shared immutable tables and per-task
/// owned state, so tasks are spawned onto the ambient tokio runtime rather
/// than driven inline.
pub struct ActivityWorker<B: BridgeWorker> {
    bridge: Arc<B>,
    registry: Arc<ActivityRegistry>,
    data_converter: Arc<DataConverter>,
    failure_converter: Arc<FailureConverter>,
    interceptors: ActivityInboundInterceptorChain,
    options: WorkerOptions,
}

impl<B: BridgeWorker + 'static> ActivityWorker<B> {
    pub fn new(
        bridge: Arc<B>,
        registry: Arc<ActivityRegistry>,
        data_converter: Arc<DataConverter>,
        failure_converter: Arc<FailureConverter>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            bridge,
            registry,
            data_converter,
            failure_converter,
            interceptors: ActivityInboundInterceptorChain::default(),
            options,
        }
    }

    pub fn with_interceptors(mut self, interceptors: ActivityInboundInterceptorChain) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// Poll until the bridge reports shutdown, then await every in-flight
    /// task before calling `finalize_shutdown` — the activity side has no
    /// cache to evict, only in-flight executions to drain.
    #[instrument(skip(self), fields(task_queue = %self.options.task_queue))]
    pub async fn run(&self) {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_activities.max(1)));
        let heartbeat_interval = Duration::from_millis(self.options.heartbeat_interval_ms);
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

        loop {
            let task = match self.bridge.poll_activity_task().await {
                Ok(task) => task,
                Err(BridgeError::ShuttingDown) => {
                    debug!("activity poll loop: shutdown requested");
                    break;
                }
                Err(err) => {
                    error!(%err, "activity task poll failed");
                    continue;
                }
            };

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("activity worker semaphore is never closed");

            let bridge = self.bridge.clone();
            let registry = self.registry.clone();
            let data_converter = self.data_converter.clone();
            let failure_converter = self.failure_converter.clone();
            let interceptors = self.interceptors.clone();

            in_flight.retain(|handle| !handle.is_finished());
            in_flight.push(tokio::spawn(async move {
                let _permit = permit;
                execute_one(bridge, registry, data_converter, failure_converter, interceptors, heartbeat_interval, task)
                    .await;
            }));
        }

        for handle in in_flight {
            let _ = handle.await;
        }
        self.bridge.finalize_shutdown().await;
    }
}

/// Run one activity task end to end: build its execution
/// context, run the registered handler concurrently with a heartbeat
/// coalescer, and report the outcome.
async fn execute_one<B: BridgeWorker>(
    bridge: Arc<B>,
    registry: Arc<ActivityRegistry>,
    data_converter: Arc<DataConverter>,
    failure_converter: Arc<FailureConverter>,
    interceptors: ActivityInboundInterceptorChain,
    heartbeat_interval: Duration,
    task: ActivityTask,
) {
    let task_token = task.task_token.clone();
    let cancellation_token = CancellationToken::new();
    let (heartbeat_tx, heartbeat_rx) = tokio::sync::mpsc::unbounded_channel();

    let coalescer = tokio::spawn({
        let bridge = bridge.clone();
        let cancellation_token = cancellation_token.clone();
        let task_token = task_token.clone();
        async move {
            super::heartbeat::run_coalescer(bridge.as_ref(), task_token, cancellation_token, heartbeat_interval, heartbeat_rx)
                .await;
        }
    });

    let info = ActivityInfo {
        activity_type: task.activity_type.clone(),
        activity_id: task.activity_id.clone(),
        workflow_execution: task.workflow_execution.clone(),
        attempt: task.attempt,
        heartbeat_timeout: task.heartbeat_timeout,
        start_to_close_timeout: task.start_to_close_timeout,
        heartbeat_details: task.heartbeat_details.clone(),
    };
    let ctx = ActivityContext::new(info.clone(), cancellation_token, heartbeat_tx);

    let intercepted_input = ExecuteActivityInput { info, input: task.input.clone() };
    interceptors.before_execute_activity(&intercepted_input);

    let outcome = registry.run(&task.activity_type, ctx, task.input, &data_converter).await;

    // Drop this task's heartbeat sender happens when `outcome` is computed
    // (the context was consumed by the time `run` returned); join the
    // coalescer so its final flush lands before we report the result.
    let _ = coalescer.await;

    let completion = match outcome {
        Ok(payload) => {
            interceptors.after_execute_activity(&intercepted_input, &ExecuteActivityOutcome::Completed(payload.clone()));
            ActivityTaskCompletion::Completed { task_token, result: payload }
        }
        Err(ActivityError::CompleteAsync) => {
            interceptors.after_execute_activity(&intercepted_input, &ExecuteActivityOutcome::Deferred);
            debug!(activity_id = %task.activity_id, "activity deferred completion to the async-activity client surface");
            return;
        }
        Err(ActivityError::Cancelled(failure)) => {
            let failure = encode_failure(failure, &failure_converter);
            interceptors.after_execute_activity(&intercepted_input, &ExecuteActivityOutcome::Cancelled(failure.clone()));
            ActivityTaskCompletion::Cancelled { task_token, details: cancelled_details(&failure) }
        }
        Err(ActivityError::Application(failure)) => {
            let failure = encode_failure(failure, &failure_converter);
            interceptors.after_execute_activity(&intercepted_input, &ExecuteActivityOutcome::Failed(failure.clone()));
            ActivityTaskCompletion::Failed { task_token, failure }
        }
    };

    if let Err(err) = bridge.complete_activity_task(completion).await {
        error!(%err, activity_id = %task.activity_id, "failed to deliver activity completion");
    }
}

fn encode_failure(failure: Failure, fc: &FailureConverter) -> Failure {
    fc.encode(failure).unwrap_or_else(|err| Failure::application("DataConverterError", err.to_string()))
}

fn cancelled_details(failure: &Failure) -> Vec<Payload> {
    match &failure.info {
        FailureInfo::Cancelled { details } => details.clone(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{InMemoryBridge, TaskToken, WorkflowExecution};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    struct Double;

    #[async_trait]
    impl crate::worker::Activity for Double {
        const ACTIVITY_TYPE: &'static str = "Double";
        type Input = i32;
        type Output = i32;

        async fn run(&self, _ctx: ActivityContext, input: i32) -> Result<i32, ActivityError> {
            Ok(input * 2)
        }
    }

    struct DeferredCompletion;

    #[async_trait]
    impl crate::worker::Activity for DeferredCompletion {
        const ACTIVITY_TYPE: &'static str = "Deferred";
        type Input = ();
        type Output = ();

        async fn run(&self, _ctx: ActivityContext, _input: ()) -> Result<(), ActivityError> {
            Err(ActivityError::CompleteAsync)
        }
    }

    struct HeartbeatsUntilCancelled {
        beats: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl crate::worker::Activity for HeartbeatsUntilCancelled {
        const ACTIVITY_TYPE: &'static str = "Heartbeats";
        type Input = ();
        type Output = ();

        async fn run(&self, ctx: ActivityContext, _input: ()) -> Result<(), ActivityError> {
            loop {
                if ctx.is_cancelled() {
                    return Err(Failure::cancelled("activity observed cancellation").into());
                }
                ctx.heartbeat(vec![]);
                self.beats.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(StdDuration::from_millis(5)).await;
            }
        }
    }

    fn task(activity_type: &str, token: u8) -> ActivityTask {
        ActivityTask {
            task_token: TaskToken(vec![token]),
            activity_type: activity_type.to_string(),
            activity_id: format!("a-{token}"),
            workflow_execution: WorkflowExecution { workflow_id: "wf".to_string(), run_id: "run".to_string() },
            input: vec![],
            headers: HashMap::new(),
            heartbeat_timeout: None,
            start_to_close_timeout: None,
            heartbeat_details: vec![],
            attempt: 1,
        }
    }

    fn worker_with<A: crate::worker::Activity>(bridge: Arc<InMemoryBridge>, activity: A, max_concurrent: usize) -> ActivityWorker<InMemoryBridge> {
        let mut registry = ActivityRegistry::new();
        registry.register(activity);
        let mut options = WorkerOptions::new("ns", "tq", "build-1", "localhost:7233");
        options.max_concurrent_activities = max_concurrent;
        options.heartbeat_interval_ms = 10_000;
        ActivityWorker::new(
            bridge,
            Arc::new(registry),
            Arc::new(DataConverter::default()),
            Arc::new(FailureConverter::new(Arc::new(DataConverter::default()))),
            options,
        )
    }

    #[tokio::test]
    async fn successful_activity_completes_with_encoded_result() {
        let bridge = Arc::new(InMemoryBridge::new());
        let dc = DataConverter::default();
        let mut t = task("Double", 1);
        t.input = vec![dc.to_payload(&21, "input.0").unwrap()];
        bridge.push_activity_task(t);
        bridge.initiate_shutdown().await;

        worker_with(bridge.clone(), Double, 4).run().await;

        let completions = bridge.recorded_activity_completions();
        assert_eq!(completions.len(), 1);
        match &completions[0] {
            ActivityTaskCompletion::Completed { result, .. } => {
                let value: i32 = dc.from_payload(result, "output").unwrap();
                assert_eq!(value, 42);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_async_emits_no_completion() {
        let bridge = Arc::new(InMemoryBridge::new());
        bridge.push_activity_task(task("Deferred", 2));
        bridge.initiate_shutdown().await;

        worker_with(bridge.clone(), DeferredCompletion, 4).run().await;

        assert!(bridge.recorded_activity_completions().is_empty());
    }

    #[tokio::test]
    async fn server_requested_cancellation_flips_the_token_and_fails_cancelled() {
        let bridge = Arc::new(InMemoryBridge::new());
        let token = TaskToken(vec![3]);
        bridge.push_activity_task(task("Heartbeats", 3));

        let worker = worker_with(bridge.clone(), HeartbeatsUntilCancelled { beats: Arc::new(AtomicUsize::new(0)) }, 4);

        let bridge_for_cancel = bridge.clone();
        let cancel_task = tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_millis(20)).await;
            bridge_for_cancel.request_cancellation(token);
            tokio::time::sleep(StdDuration::from_millis(50)).await;
            bridge_for_cancel.initiate_shutdown().await;
        });

        worker.run().await;
        cancel_task.await.unwrap();

        let completions = bridge.recorded_activity_completions();
        assert_eq!(completions.len(), 1);
        assert!(matches!(completions[0], ActivityTaskCompletion::Cancelled { .. }));
    }
}
