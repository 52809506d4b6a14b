//! End-to-end: a workflow that schedules one activity, driven through the
//! real `WorkflowWorker`/`ActivityWorker` poll loops against a single
//! shared `InMemoryBridge`, the way a `WorkflowWorker` and `ActivityWorker`
//! sharing one server connection would be in a real deployment.
//!
//! The workflow worker's `run` future is `!Send` (its per-run state is
//! `Rc`-based), so it is driven on a `tokio::task::LocalSet` alongside the
//! `Send` activity worker, per the split documented on
//! `WorkflowWorker::run`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use durable_sdk::bridge::{
    Activation, ActivationJob, ActivationResult, ActivityTask, ActivityTaskCompletion, Command,
    Completion, InMemoryBridge, TaskToken, WorkflowExecution,
};
use durable_sdk::failure::FailureConverter;
use durable_sdk::payload::DataConverter;
use durable_sdk::worker::{Activity, ActivityContext, ActivityError, ActivityRegistry, ActivityWorker, WorkerOptions, WorkflowWorker};
use durable_sdk::workflow::{Workflow, WorkflowDescriptor, WorkflowRegistry};

struct Shout;

#[async_trait]
impl Activity for Shout {
    const ACTIVITY_TYPE: &'static str = "Shout";
    type Input = String;
    type Output = String;

    async fn run(&self, _ctx: ActivityContext, input: String) -> Result<String, ActivityError> {
        Ok(format!("{}!", input.to_uppercase()))
    }
}

struct Greeter;

impl Workflow for Greeter {
    const WORKFLOW_TYPE: &'static str = "Greeter";
    type Input = String;
    type Output = String;

    fn descriptor() -> WorkflowDescriptor<Self> {
        WorkflowDescriptor::new(|ctx, name: String| async move {
            let dc = DataConverter::default();
            let input = vec![dc
                .to_payload(&name, "input.0")
                .map_err(|e| durable_sdk::workflow::WorkflowError::application("DataConverterError", e.to_string()))?];
            let (_handle, activity) = ctx.execute_activity("Shout", input, Default::default());
            let result = activity.await?;
            let shouted: String = dc
                .from_payload(&result, "output")
                .map_err(|e| durable_sdk::workflow::WorkflowError::application("DataConverterError", e.to_string()))?;
            Ok(format!("heard: {shouted}"))
        })
    }
}

fn workflow_worker(bridge: Arc<InMemoryBridge>) -> WorkflowWorker<InMemoryBridge> {
    let mut registry = WorkflowRegistry::new();
    registry.register::<Greeter>();
    WorkflowWorker::new(
        bridge,
        Arc::new(registry),
        Arc::new(DataConverter::default()),
        Arc::new(FailureConverter::new(Arc::new(DataConverter::default()))),
        WorkerOptions::new("ns", "tq", "build-1", "localhost:7233"),
    )
}

fn activity_worker(bridge: Arc<InMemoryBridge>) -> ActivityWorker<InMemoryBridge> {
    let mut registry = ActivityRegistry::new();
    registry.register(Shout);
    ActivityWorker::new(
        bridge,
        Arc::new(registry),
        Arc::new(DataConverter::default()),
        Arc::new(FailureConverter::new(Arc::new(DataConverter::default()))),
        WorkerOptions::new("ns", "tq", "build-1", "localhost:7233"),
    )
}

#[tokio::test]
async fn workflow_schedules_an_activity_and_completes_with_its_result() {
    let bridge = Arc::new(InMemoryBridge::new());
    let dc = DataConverter::default();

    let local = tokio::task::LocalSet::new();
    let wf_worker = workflow_worker(bridge.clone());
    let wf_handle = local.spawn_local(async move { wf_worker.run().await });
    let activity_handle = tokio::spawn({
        let worker = activity_worker(bridge.clone());
        async move { worker.run().await }
    });

    local
        .run_until(async {
            bridge.push_activation(Activation {
                run_id: "run-1".to_string(),
                timestamp: chrono::Utc::now(),
                is_replaying: false,
                jobs: vec![ActivationJob::InitializeWorkflow {
                    workflow_type: "Greeter".to_string(),
                    input: vec![dc.to_payload(&"hello".to_string(), "input.0").unwrap()],
                    memo: HashMap::new(),
                    search_attributes: HashMap::new(),
                    headers: HashMap::new(),
                    random_seed: 7,
                }],
            });

            let schedule = wait_for_completion(&bridge, 1).await;
            let (seq, activity_type, activity_input) = match schedule {
                Completion::Successful { commands } => commands
                    .into_iter()
                    .find_map(|c| match c {
                        Command::ScheduleActivity { seq, activity_type, input, .. } => Some((seq, activity_type, input)),
                        _ => None,
                    })
                    .expect("workflow should have scheduled an activity"),
                Completion::Failed { failure } => panic!("workflow task failed: {failure:?}"),
            };
            assert_eq!(activity_type, "Shout");

            bridge.push_activity_task(ActivityTask {
                task_token: TaskToken(vec![1]),
                activity_type,
                activity_id: "a-1".to_string(),
                workflow_execution: WorkflowExecution { workflow_id: "run-1".to_string(), run_id: "run-1".to_string() },
                input: activity_input,
                headers: HashMap::new(),
                heartbeat_timeout: None,
                start_to_close_timeout: Some(Duration::from_secs(10)),
                heartbeat_details: vec![],
                attempt: 1,
            });

            let activity_result = wait_for_activity_completion(&bridge).await;
            let result_payload = match activity_result {
                ActivityTaskCompletion::Completed { result, .. } => result,
                other => panic!("expected the activity to complete, got {other:?}"),
            };
            let shouted: String = dc.from_payload(&result_payload, "output").unwrap();
            assert_eq!(shouted, "HELLO!");

            bridge.push_activation(Activation {
                run_id: "run-1".to_string(),
                timestamp: chrono::Utc::now(),
                is_replaying: false,
                jobs: vec![ActivationJob::ResolveActivity { seq, result: ActivationResult::Completed(result_payload) }],
            });

            let final_completion = wait_for_completion(&bridge, 2).await;
            match final_completion {
                Completion::Successful { commands } => {
                    let result = commands.into_iter().find_map(|c| match c {
                        Command::CompleteWorkflow { result } => Some(result),
                        _ => None,
                    });
                    let result = result.expect("workflow should have completed");
                    let output: String = dc.from_payload(&result, "output").unwrap();
                    assert_eq!(output, "heard: HELLO!");
                }
                Completion::Failed { failure } => panic!("workflow task failed: {failure:?}"),
            }

            bridge.initiate_shutdown().await;
        })
        .await;

    local.await;
    wf_handle.await.unwrap();
    activity_handle.await.unwrap();
}

/// Poll `recorded_workflow_completions` until it has `count` entries, then
/// return the last one. There is no other signal the bridge test double
/// offers for "a workflow completion was just recorded".
async fn wait_for_completion(bridge: &InMemoryBridge, count: usize) -> Completion {
    for _ in 0..1000 {
        let recorded = bridge.recorded_workflow_completions();
        if recorded.len() >= count {
            return recorded.into_iter().nth(count - 1).unwrap().1;
        }
        tokio::task::yield_now().await;
    }
    panic!("timed out waiting for {count} workflow completions");
}

async fn wait_for_activity_completion(bridge: &InMemoryBridge) -> ActivityTaskCompletion {
    for _ in 0..1000 {
        let recorded = bridge.recorded_activity_completions();
        if let Some(completion) = recorded.into_iter().next() {
            return completion;
        }
        tokio::task::yield_now().await;
    }
    panic!("timed out waiting for an activity completion");
}
