//! The workflow worker: owns the poll loop and the per-run-id
//! cache of live [`WorkflowInstance`]s.
//!
//! Grounded on `crates/durable/src/worker/pool.rs`'s `WorkerPool::
//! start_poll_loop` (spawn a polling task, dispatch claimed work, react to a
//! shutdown signal), adapted from per-task activity dispatch to per-run-id
//! activation dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, instrument, warn};

use crate::bridge::{Activation, ActivationJob, BridgeError, BridgeWorker, Command, Completion, UpdateOutcome};
use crate::failure::{Failure, FailureConverter};
use crate::interceptor::{WorkflowInboundInterceptorChain, WorkflowOutboundInterceptorChain};
use crate::payload::DataConverter;
use crate::workflow::{InitialWorkflow, WorkflowInfo, WorkflowInstance, WorkflowRegistry};

use super::options::WorkerOptions;

/// Owns the poll loop and the per-run-id cache. Its [`Self::run`]
/// future is not `Send`: [`WorkflowInstance`] holds `Rc<RefCell<_>>` state
/// by design, relying on each run staying single-threaded. Drive it
/// directly (`.await` it in a dedicated task) or via
/// [`tokio::task::LocalSet`] if it must share a runtime with `Send` tasks
/// such as an [`super::ActivityWorker`].
pub struct WorkflowWorker<B: BridgeWorker> {
    bridge: Arc<B>,
    registry: Arc<WorkflowRegistry>,
    data_converter: Arc<DataConverter>,
    failure_converter: Arc<FailureConverter>,
    outbound_interceptors: WorkflowOutboundInterceptorChain,
    inbound_interceptors: WorkflowInboundInterceptorChain,
    options: WorkerOptions,
}

impl<B: BridgeWorker> WorkflowWorker<B> {
    pub fn new(
        bridge: Arc<B>,
        registry: Arc<WorkflowRegistry>,
        data_converter: Arc<DataConverter>,
        failure_converter: Arc<FailureConverter>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            bridge,
            registry,
            data_converter,
            failure_converter,
            outbound_interceptors: WorkflowOutboundInterceptorChain::default(),
            inbound_interceptors: WorkflowInboundInterceptorChain::default(),
            options,
        }
    }

    /// Install the interceptor chains every run this worker initializes
    /// will be constructed with.
    pub fn with_interceptors(
        mut self,
        outbound: WorkflowOutboundInterceptorChain,
        inbound: WorkflowInboundInterceptorChain,
    ) -> Self {
        self.outbound_interceptors = outbound;
        self.inbound_interceptors = inbound;
        self
    }

    /// Poll until the bridge reports shutdown, then evict every cached
    /// instance and await `finalize_shutdown`.
    #[instrument(skip(self), fields(task_queue = %self.options.task_queue))]
    pub async fn run(&self) {
        let mut running: HashMap<String, WorkflowInstance> = HashMap::new();

        loop {
            let activation = match self.bridge.poll_workflow_activation().await {
                Ok(activation) => activation,
                Err(BridgeError::ShuttingDown) => {
                    debug!("workflow poll loop: shutdown requested");
                    break;
                }
                Err(err) => {
                    error!(%err, "workflow activation poll failed");
                    continue;
                }
            };

            let run_id = activation.run_id.clone();
            let activation = decode_activation_failures(activation, &self.failure_converter);
            let completion = self.apply_to_run(&mut running, activation);
            let completion = encode_completion_failures(completion, &self.failure_converter);

            if let Err(err) = self.bridge.complete_workflow_activation(&run_id, completion).await {
                error!(%err, run_id = %run_id, "failed to deliver workflow completion");
            }
        }

        for (run_id, mut instance) in running.drain() {
            debug!(run_id = %run_id, "evicting cached workflow instance on shutdown");
            instance.evict();
        }
        self.bridge.finalize_shutdown().await;
    }

    /// Dispatch one activation against the per-run cache.
    fn apply_to_run(&self, running: &mut HashMap<String, WorkflowInstance>, activation: Activation) -> Completion {
        let run_id = activation.run_id.clone();

        if is_solo_remove_from_cache(&activation.jobs) {
            if let Some(mut instance) = running.remove(&run_id) {
                instance.evict();
            }
            return Completion::Successful { commands: vec![] };
        }

        let completion = match running.contains_key(&run_id) {
            true => {
                let instance = running.get_mut(&run_id).expect("just checked contains_key");
                debug!(run_id = %run_id, "feeding activation to cached instance");
                instance.apply(activation)
            }
            false => self.initialize_and_apply(running, activation),
        };

        if let Some(instance) = running.get(&run_id) {
            if instance.remove_from_cache_reason().is_some() {
                debug!(run_id = %run_id, "tearing down run after remove_from_cache");
                if let Some(mut instance) = running.remove(&run_id) {
                    instance.evict();
                }
            }
        }

        completion
    }

    fn initialize_and_apply(&self, running: &mut HashMap<String, WorkflowInstance>, mut activation: Activation) -> Completion {
        let run_id = activation.run_id.clone();

        let Some(init_index) = activation
            .jobs
            .iter()
            .position(|job| matches!(job, ActivationJob::InitializeWorkflow { .. }))
        else {
            return Completion::Failed {
                failure: Failure::application(
                    "NonDeterminismError",
                    format!("no cached instance for run {run_id} and activation carries no initialize_workflow job"),
                )
                .non_retryable(),
            };
        };

        let ActivationJob::InitializeWorkflow { workflow_type, input, memo, search_attributes, headers: _, random_seed } =
            activation.jobs.remove(init_index)
        else {
            unreachable!("position() matched InitializeWorkflow above")
        };

        if !self.registry.is_registered(&workflow_type) {
            warn!(%workflow_type, run_id = %run_id, "unknown workflow type");
            return Completion::Failed {
                failure: Failure::application("NotFound", format!("workflow {workflow_type} not found")).non_retryable(),
            };
        }

        let initial = InitialWorkflow { workflow_type: workflow_type.clone(), input, memo, search_attributes, random_seed };
        let info = WorkflowInfo {
            // The bridge boundary only models `run_id`; a real
            // deployment's activation would also carry `workflow_id`.
            workflow_id: run_id.clone(),
            run_id: run_id.clone(),
            workflow_type,
            task_queue: self.options.task_queue.clone(),
            attempt: 1,
        };

        match WorkflowInstance::initialize_with_interceptors(
            &self.registry,
            initial,
            info,
            activation.timestamp,
            &self.data_converter,
            self.outbound_interceptors.clone(),
            self.inbound_interceptors.clone(),
        ) {
            Ok(mut instance) => {
                let completion = instance.apply(activation);
                running.insert(run_id, instance);
                completion
            }
            Err(err) => Completion::Failed {
                failure: Failure::application("NonDeterminismError", err.to_string()).non_retryable(),
            },
        }
    }
}

fn is_solo_remove_from_cache(jobs: &[ActivationJob]) -> bool {
    jobs.len() == 1 && matches!(jobs[0], ActivationJob::RemoveFromCache { .. })
}

/// Decode the `encoded_attributes` of every [`Failure`] an activation
/// carries before it reaches the workflow state machine, scoped
/// to failures — payload values are decoded lazily, at the point workflow
/// code asks for a typed value, by [`DataConverter::from_payload`], which
/// already composes the codec and converter passes in one call.
fn decode_activation_failures(mut activation: Activation, fc: &FailureConverter) -> Activation {
    for job in &mut activation.jobs {
        match job {
            ActivationJob::ResolveActivity { result, .. }
            | ActivationJob::ResolveChildWorkflowStart { result, .. }
            | ActivationJob::ResolveChildWorkflow { result, .. }
            | ActivationJob::ResolveNexusOperationStart { result, .. }
            | ActivationJob::ResolveNexusOperation { result, .. } => {
                decode_activation_result(result, fc);
            }
            ActivationJob::ResolveSignalExternal { failure, .. }
            | ActivationJob::ResolveRequestCancelExternal { failure, .. } => {
                if let Some(f) = failure.take() {
                    *failure = Some(decode_failure(f, fc));
                }
            }
            _ => {}
        }
    }
    activation
}

fn decode_activation_result(result: &mut crate::bridge::ActivationResult, fc: &FailureConverter) {
    if let crate::bridge::ActivationResult::Failed(failure) = result {
        *failure = decode_failure(std::mem::replace(failure, Failure::application("", "")), fc);
    }
}

fn decode_failure(failure: Failure, fc: &FailureConverter) -> Failure {
    fc.decode(failure).unwrap_or_else(|err| Failure::application("DataConverterError", err.to_string()))
}

/// Encode every outgoing [`Failure`], in reverse of the decode pass above.
fn encode_completion_failures(completion: Completion, fc: &FailureConverter) -> Completion {
    match completion {
        Completion::Failed { failure } => Completion::Failed { failure: encode_failure(failure, fc) },
        Completion::Successful { commands } => {
            Completion::Successful { commands: commands.into_iter().map(|c| encode_command_failure(c, fc)).collect() }
        }
    }
}

fn encode_command_failure(command: Command, fc: &FailureConverter) -> Command {
    match command {
        Command::FailWorkflow { failure } => Command::FailWorkflow { failure: encode_failure(failure, fc) },
        Command::RespondToQuery { id, result: crate::bridge::ActivationResult::Failed(failure) } => {
            Command::RespondToQuery { id, result: crate::bridge::ActivationResult::Failed(encode_failure(failure, fc)) }
        }
        Command::UpdateResponse { id, outcome } => Command::UpdateResponse { id, outcome: encode_update_outcome(outcome, fc) },
        other => other,
    }
}

fn encode_update_outcome(outcome: UpdateOutcome, fc: &FailureConverter) -> UpdateOutcome {
    match outcome {
        UpdateOutcome::Rejected(failure) => UpdateOutcome::Rejected(encode_failure(failure, fc)),
        UpdateOutcome::Completed(crate::bridge::ActivationResult::Failed(failure)) => {
            UpdateOutcome::Completed(crate::bridge::ActivationResult::Failed(encode_failure(failure, fc)))
        }
        other => other,
    }
}

fn encode_failure(failure: Failure, fc: &FailureConverter) -> Failure {
    fc.encode(failure).unwrap_or_else(|err| Failure::application("DataConverterError", err.to_string()))
}
