//! [`WorkflowInstance`]: ties the task executor, the workflow state machine,
//! and a registered [`super::Workflow`] together into one cached run.
//!
//! One instance exists per live `run_id` in the workflow worker's cache;
//! the worker constructs it on `initialize_workflow` and calls
//! [`WorkflowInstance::apply`] for every subsequent activation until the run
//! completes or the server asks to evict it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use chrono::{DateTime, Utc};

use crate::bridge::{ActivationResult, UpdateOutcome};
use crate::bridge::{Activation, ActivationJob, Command, Completion};
use crate::failure::Failure;
use crate::interceptor::{WorkflowInboundInterceptorChain, WorkflowInboundJob, WorkflowOutboundInterceptorChain};
use crate::payload::{DataConverter, Payload};

use super::context::{WfContext, WorkflowInfo};
use super::descriptor::{WorkflowRegistry, WorkflowRegistryError};
use super::executor::TaskExecutor;
use super::state::{TerminalOutcome, WorkflowState};
use super::WorkflowError;

/// Decoded `(workflow_id, run_id, workflow_type, ...)` the caller already
/// extracted from the first `initialize_workflow` job, handed in separately
/// from the rest of that activation's jobs.
pub struct InitialWorkflow {
    pub workflow_type: String,
    pub input: Vec<Payload>,
    pub memo: HashMap<String, Payload>,
    pub search_attributes: HashMap<String, Payload>,
    pub random_seed: u64,
}

/// One cached, running workflow execution.
pub struct WorkflowInstance {
    executor: TaskExecutor,
    state: Rc<RefCell<WorkflowState>>,
    #[allow(dead_code)]
    ctx: WfContext,
    interceptors: WorkflowInboundInterceptorChain,
    remove_from_cache: Option<String>,
}

impl WorkflowInstance {
    /// Construct a fresh instance from an `initialize_workflow` job and
    /// spawn the registered workflow's `run` future as task zero. Does not
    /// drain: the caller immediately follows with [`Self::apply`] on the
    /// activation's remaining jobs (possibly empty) so the run's first
    /// suspension point is reached through the ordinary activation-apply
    /// path rather than a separate code path.
    pub fn initialize(
        registry: &WorkflowRegistry,
        initial: InitialWorkflow,
        info: WorkflowInfo,
        now: DateTime<Utc>,
        data_converter: &DataConverter,
    ) -> Result<Self, WorkflowRegistryError> {
        Self::initialize_with_interceptors(
            registry,
            initial,
            info,
            now,
            data_converter,
            WorkflowOutboundInterceptorChain::default(),
            WorkflowInboundInterceptorChain::default(),
        )
    }

    /// As [`Self::initialize`], additionally installing the
    /// [`WorkflowOutboundInterceptorChain`] workflow code sees through its
    /// [`WfContext`] and the [`WorkflowInboundInterceptorChain`] observing
    /// jobs dispatched into this run.
    pub fn initialize_with_interceptors(
        registry: &WorkflowRegistry,
        initial: InitialWorkflow,
        info: WorkflowInfo,
        now: DateTime<Utc>,
        data_converter: &DataConverter,
        outbound: WorkflowOutboundInterceptorChain,
        inbound: WorkflowInboundInterceptorChain,
    ) -> Result<Self, WorkflowRegistryError> {
        let mut state = WorkflowState::new(initial.random_seed, now);
        state.memo = initial.memo;
        state.search_attributes = initial.search_attributes;
        let state = Rc::new(RefCell::new(state));
        let ctx = WfContext::new(state.clone(), info).with_interceptors(outbound);

        inbound.before_dispatch(&WorkflowInboundJob::Initialize {
            workflow_type: initial.workflow_type.clone(),
            input: initial.input.clone(),
        });

        let run_future = registry.spawn_run(&initial.workflow_type, ctx.clone(), initial.input, data_converter)?;

        let mut executor = TaskExecutor::new();
        let completion_state = state.clone();
        executor.spawn(async move {
            let result = run_future.await;
            let mut s = completion_state.borrow_mut();
            s.terminal = Some(terminal_outcome_for(result, s.is_cancelled));
        });

        Ok(Self { executor, state, ctx, interceptors: inbound, remove_from_cache: None })
    }

    /// Advance the run by one activation: apply every job in canonical
    /// order, drain the task executor to quiescence, answer queries, and
    /// collect whatever commands workflow code emitted along the way.
    pub fn apply(&mut self, activation: Activation) -> Completion {
        {
            let mut state = self.state.borrow_mut();
            state.replay_now = activation.timestamp;
            state.is_replaying = activation.is_replaying;
        }

        let mut patches = Vec::new();
        let mut random_seed_jobs = Vec::new();
        let mut signals = Vec::new();
        let mut updates = Vec::new();
        let mut rest = Vec::new();
        let mut queries = Vec::new();

        for job in activation.jobs {
            match job {
                ActivationJob::NotifyHasPatch { .. } => patches.push(job),
                ActivationJob::UpdateRandomSeed { .. } => random_seed_jobs.push(job),
                ActivationJob::SignalWorkflow { .. } => signals.push(job),
                ActivationJob::DoUpdate { .. } => updates.push(job),
                ActivationJob::QueryWorkflow { .. } => queries.push(job),
                ActivationJob::RemoveFromCache { reason } => {
                    self.remove_from_cache = Some(reason);
                }
                ActivationJob::InitializeWorkflow { .. } => {
                    return Completion::Failed {
                        failure: Failure::application(
                            "NonDeterminismError",
                            "unexpected initialize_workflow on an already-running instance",
                        )
                        .non_retryable(),
                    };
                }
                other => rest.push(other),
            }
        }

        // Canonical ordering: patches, random seed, signals, updates,
        // everything else, then queries, then remove_from_cache.
        for job in patches
            .into_iter()
            .chain(random_seed_jobs)
            .chain(signals)
            .chain(updates)
            .chain(rest)
        {
            self.apply_job(job);
            self.state.borrow_mut().evaluate_conditions();
        }

        if let Err(failure) = self.drain_to_quiescence() {
            return Completion::Failed { failure };
        }

        for job in queries {
            self.apply_job(job);
        }

        self.collect_completion()
    }

    /// Drop every in-flight task and pending resolver without resuming them
    /// further: the cache entry is gone, any later activation for this
    /// `run_id` builds a fresh instance from scratch.
    pub fn evict(&mut self) {
        let failure = Failure::cancelled("workflow instance was evicted from the cache");
        {
            let mut state = self.state.borrow_mut();
            resolve_all(&mut state.timers, Err(failure.clone()));
            resolve_all(&mut state.activities, Err(failure.clone()));
            resolve_all(&mut state.local_activities, Err(failure.clone()));
            resolve_all(&mut state.child_workflow_starts, Err(failure.clone()));
            resolve_all(&mut state.child_workflows, Err(failure.clone()));
            resolve_all(&mut state.signals_sent, Err(failure.clone()));
            resolve_all(&mut state.cancels_sent, Err(failure.clone()));
            resolve_all(&mut state.nexus_op_starts, Err(failure.clone()));
            resolve_all(&mut state.nexus_ops, Err(failure));
            for entry in std::mem::take(&mut state.condition_waiters) {
                entry.waker.wake();
            }
        }
        self.executor.evict();
    }

    /// Whether the server asked to evict this run (a `remove_from_cache`
    /// job arrived in the last applied activation).
    pub fn remove_from_cache_reason(&self) -> Option<&str> {
        self.remove_from_cache.as_deref()
    }

    /// Repeatedly drain the executor and move any futures queued by
    /// `WfContext::spawn` onto it, re-evaluating conditions between passes,
    /// until nothing is ready and nothing is pending spawn. An executor-level
    /// error (reentrant drain, exhausted poll budget) is surfaced as a
    /// non-retryable failure rather than propagated as a panic.
    fn drain_to_quiescence(&mut self) -> Result<(), Failure> {
        loop {
            self.executor.drain().map_err(|err| {
                Failure::application("NonDeterminismError", err.to_string()).non_retryable()
            })?;
            self.state.borrow_mut().evaluate_conditions();
            let spawns: Vec<_> = std::mem::take(&mut self.state.borrow_mut().pending_spawns);
            let had_spawns = !spawns.is_empty();
            for future in spawns {
                self.executor.spawn(future);
            }
            if !had_spawns && self.executor.is_quiescent() {
                return Ok(());
            }
        }
    }

    fn apply_job(&mut self, job: ActivationJob) {
        match job {
            ActivationJob::InitializeWorkflow { .. } => {
                // Stripped by the caller before the job list reaches `apply`.
            }
            ActivationJob::FireTimer { seq } => {
                if let Some(slot) = self.state.borrow_mut().timers.remove(&seq) {
                    slot.resolve(Ok(()));
                }
            }
            ActivationJob::ResolveActivity { seq, result } => {
                if let Some(slot) = self.state.borrow_mut().activities.remove(&seq) {
                    slot.resolve(activation_result_to_result(result));
                }
            }
            ActivationJob::ResolveChildWorkflowStart { seq, result } => {
                if let Some(slot) = self.state.borrow_mut().child_workflow_starts.remove(&seq) {
                    slot.resolve(match result {
                        ActivationResult::Completed(_) => Ok(()),
                        ActivationResult::Failed(failure) => Err(failure),
                    });
                }
            }
            ActivationJob::ResolveChildWorkflow { seq, result } => {
                if let Some(slot) = self.state.borrow_mut().child_workflows.remove(&seq) {
                    slot.resolve(activation_result_to_result(result));
                }
            }
            ActivationJob::ResolveSignalExternal { seq, failure } => {
                if let Some(slot) = self.state.borrow_mut().signals_sent.remove(&seq) {
                    slot.resolve(opt_failure_to_result(failure));
                }
            }
            ActivationJob::ResolveRequestCancelExternal { seq, failure } => {
                if let Some(slot) = self.state.borrow_mut().cancels_sent.remove(&seq) {
                    slot.resolve(opt_failure_to_result(failure));
                }
            }
            ActivationJob::ResolveNexusOperationStart { seq, result } => {
                if let Some(slot) = self.state.borrow_mut().nexus_op_starts.remove(&seq) {
                    slot.resolve(activation_result_to_result(result));
                }
            }
            ActivationJob::ResolveNexusOperation { seq, result } => {
                if let Some(slot) = self.state.borrow_mut().nexus_ops.remove(&seq) {
                    slot.resolve(activation_result_to_result(result));
                }
            }
            ActivationJob::SignalWorkflow { name, input, headers } => {
                self.dispatch_signal(name, input, headers);
            }
            ActivationJob::DoUpdate { id, name, input, headers, .. } => {
                self.dispatch_update(id, name, input, headers);
            }
            ActivationJob::QueryWorkflow { id, name, input, headers } => {
                self.dispatch_query(id, name, input, headers);
            }
            ActivationJob::CancelWorkflow { reason } => {
                self.apply_cancel(reason);
            }
            ActivationJob::NotifyHasPatch { id } => {
                self.state.borrow_mut().apply_notify_has_patch(id);
            }
            ActivationJob::UpdateRandomSeed { value } => {
                self.state.borrow_mut().random_seed = value;
            }
            ActivationJob::RemoveFromCache { reason } => {
                self.remove_from_cache = Some(reason);
            }
        }
    }

    fn dispatch_signal(&mut self, name: String, input: Vec<Payload>, headers: HashMap<String, Payload>) {
        self.interceptors.before_dispatch(&WorkflowInboundJob::Signal { name: name.clone(), input: input.clone() });
        let handler = self.state.borrow().signal_handlers.get(&name).cloned();
        match handler {
            Some(handler) => {
                self.executor.spawn((handler)(input, headers));
            }
            None => {
                self.state
                    .borrow_mut()
                    .signal_buffer
                    .push_back(super::state::BufferedSignal { name, input, headers });
            }
        }
    }

    fn dispatch_update(&mut self, id: String, name: String, input: Vec<Payload>, headers: HashMap<String, Payload>) {
        self.interceptors.before_dispatch(&WorkflowInboundJob::Update { name: name.clone(), input: input.clone() });
        let handler = self.state.borrow().update_handlers.get(&name).cloned();
        let Some(handler) = handler else {
            let failure = Failure::application("NotFound", format!("no handler registered for update {name}"));
            self.state
                .borrow_mut()
                .push_command(Command::UpdateResponse { id, outcome: UpdateOutcome::Rejected(failure) });
            return;
        };

        let validator = self.state.borrow().update_validators.get(&name).cloned();
        if let Some(validator) = validator {
            let input = input.clone();
            let headers = headers.clone();
            let (result, violated) = self
                .state
                .borrow_mut()
                .run_as_query(move |_| validator(input, headers));
            if violated {
                let failure =
                    Failure::application("InvalidOperation", "update validator attempted to emit a command")
                        .non_retryable();
                self.state
                    .borrow_mut()
                    .push_command(Command::UpdateResponse { id, outcome: UpdateOutcome::Rejected(failure) });
                return;
            }
            if let Err(failure) = result {
                self.state
                    .borrow_mut()
                    .push_command(Command::UpdateResponse { id, outcome: UpdateOutcome::Rejected(failure) });
                return;
            }
        }

        self.state
            .borrow_mut()
            .push_command(Command::UpdateResponse { id: id.clone(), outcome: UpdateOutcome::Accepted });

        let state = self.state.clone();
        self.executor.spawn(async move {
            let outcome = handler(input, headers).await;
            let result = match outcome {
                Ok(payload) => ActivationResult::Completed(payload),
                Err(failure) => ActivationResult::Failed(failure),
            };
            state
                .borrow_mut()
                .push_command(Command::UpdateResponse { id, outcome: UpdateOutcome::Completed(result) });
        });
    }

    fn dispatch_query(&mut self, id: String, name: String, input: Vec<Payload>, headers: HashMap<String, Payload>) {
        self.interceptors.before_dispatch(&WorkflowInboundJob::Query { name: name.clone(), input: input.clone() });
        let handler = self.state.borrow().query_handlers.get(&name).cloned();
        let (result, violated) = self.state.borrow_mut().run_as_query(move |_| match &handler {
            Some(handler) => handler(input, headers),
            None => Err(Failure::application("NotFound", format!("no query handler registered for {name}"))),
        });

        let final_result = if violated {
            Err(Failure::application("InvalidOperation", "query handler attempted to emit a command").non_retryable())
        } else {
            result
        };

        let command = Command::RespondToQuery {
            id,
            result: match final_result {
                Ok(payload) => ActivationResult::Completed(payload),
                Err(failure) => ActivationResult::Failed(failure),
            },
        };
        self.state.borrow_mut().push_command(command);
    }

    /// Cancellation fails every still-pending blocking primitive fast
    /// rather than waiting for its natural resolution.
    fn apply_cancel(&mut self, reason: Option<String>) {
        let mut state = self.state.borrow_mut();
        state.is_cancelled = true;
        state.cancel_reason = reason.clone();
        let failure = Failure::cancelled(reason.unwrap_or_else(|| "workflow was cancelled".to_string()));

        resolve_all(&mut state.timers, Err(failure.clone()));
        resolve_all(&mut state.activities, Err(failure.clone()));
        resolve_all(&mut state.local_activities, Err(failure.clone()));
        resolve_all(&mut state.child_workflow_starts, Err(failure.clone()));
        resolve_all(&mut state.child_workflows, Err(failure.clone()));
        resolve_all(&mut state.signals_sent, Err(failure.clone()));
        resolve_all(&mut state.cancels_sent, Err(failure.clone()));
        resolve_all(&mut state.nexus_op_starts, Err(failure.clone()));
        resolve_all(&mut state.nexus_ops, Err(failure));

        for entry in std::mem::take(&mut state.condition_waiters) {
            entry.waker.wake();
        }
    }

    fn collect_completion(&mut self) -> Completion {
        let mut state = self.state.borrow_mut();
        if let Some(terminal) = state.terminal.take() {
            let command = match terminal {
                TerminalOutcome::Completed(payload) => Command::CompleteWorkflow { result: payload },
                TerminalOutcome::Failed(failure) => Command::FailWorkflow { failure },
                TerminalOutcome::ContinuedAsNew { workflow_type, input, memo, search_attributes } => {
                    Command::ContinueAsNew { workflow_type, input, memo, search_attributes }
                }
                TerminalOutcome::Cancelled => Command::CancelWorkflow,
            };
            state.commands_buffer.push(command);
        }
        let commands = std::mem::take(&mut state.commands_buffer);
        Completion::Successful { commands }
    }
}

fn activation_result_to_result(result: ActivationResult) -> Result<Payload, Failure> {
    match result {
        ActivationResult::Completed(payload) => Ok(payload),
        ActivationResult::Failed(failure) => Err(failure),
    }
}

fn opt_failure_to_result(failure: Option<Failure>) -> Result<(), Failure> {
    match failure {
        None => Ok(()),
        Some(failure) => Err(failure),
    }
}

fn resolve_all<T: Clone>(map: &mut HashMap<u32, Rc<super::state::Slot<T>>>, value: T) {
    for (_, slot) in map.drain() {
        slot.resolve(value.clone());
    }
}

fn terminal_outcome_for(result: Result<Payload, WorkflowError>, is_cancelled: bool) -> TerminalOutcome {
    match result {
        Ok(payload) => TerminalOutcome::Completed(payload),
        Err(WorkflowError::Cancelled(failure)) => {
            if is_cancelled {
                TerminalOutcome::Cancelled
            } else {
                TerminalOutcome::Failed(failure)
            }
        }
        Err(WorkflowError::Failure(failure)) => TerminalOutcome::Failed(failure),
        Err(WorkflowError::ContinueAsNew { workflow_type, input, memo, search_attributes }) => {
            TerminalOutcome::ContinuedAsNew { workflow_type, input, memo, search_attributes }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::descriptor::{Workflow, WorkflowDescriptor};

    struct Echo;
    impl Workflow for Echo {
        const WORKFLOW_TYPE: &'static str = "Echo";
        type Input = String;
        type Output = String;

        fn descriptor() -> WorkflowDescriptor<Self> {
            WorkflowDescriptor::new(|ctx, name: String| async move {
                ctx.sleep(std::time::Duration::from_secs(1)).await?;
                Ok(name)
            })
        }
    }

    struct Counter;
    impl Workflow for Counter {
        const WORKFLOW_TYPE: &'static str = "Counter";
        type Input = ();
        type Output = i64;

        fn descriptor() -> WorkflowDescriptor<Self> {
            WorkflowDescriptor::new(|ctx, _input: ()| async move {
                let count = Rc::new(RefCell::new(0i64));
                let count_for_handler = count.clone();
                ctx.set_signal_handler("increment", move |_input, _headers| {
                    let count = count_for_handler.clone();
                    async move {
                        *count.borrow_mut() += 1;
                    }
                });

                let count_for_query = count.clone();
                ctx.set_query_handler("get_count", move |_input, _headers| {
                    let data_converter = DataConverter::default();
                    data_converter
                        .to_payload(&*count_for_query.borrow(), "result")
                        .map_err(|e| Failure::application("DataConverterError", e.to_string()))
                });

                let count_for_wait = count.clone();
                ctx.wait_condition(move || *count_for_wait.borrow() >= 3).await?;
                Ok(*count.borrow())
            })
        }
    }

    fn info() -> WorkflowInfo {
        WorkflowInfo {
            workflow_id: "wf-1".to_string(),
            run_id: "run-1".to_string(),
            workflow_type: "test".to_string(),
            task_queue: "tq".to_string(),
            attempt: 1,
        }
    }

    fn initial_activation(jobs: Vec<ActivationJob>) -> Activation {
        Activation { run_id: "run-1".to_string(), timestamp: Utc::now(), is_replaying: false, jobs }
    }

    #[test]
    fn starting_a_workflow_emits_its_first_command() {
        let mut registry = WorkflowRegistry::new();
        registry.register::<Echo>();
        let data_converter = DataConverter::default();
        let input = vec![data_converter.to_payload(&"hi".to_string(), "input.0").unwrap()];

        let mut instance = WorkflowInstance::initialize(
            &registry,
            InitialWorkflow {
                workflow_type: "Echo".to_string(),
                input,
                memo: HashMap::new(),
                search_attributes: HashMap::new(),
                random_seed: 7,
            },
            info(),
            Utc::now(),
            &data_converter,
        )
        .unwrap();

        let completion = instance.apply(initial_activation(Vec::new()));
        match completion {
            Completion::Successful { commands } => {
                assert_eq!(commands.len(), 1);
                assert!(matches!(commands[0], Command::StartTimer { .. }));
            }
            Completion::Failed { .. } => panic!("expected a successful completion"),
        }
    }

    #[test]
    fn timer_resolution_completes_the_workflow() {
        let mut registry = WorkflowRegistry::new();
        registry.register::<Echo>();
        let data_converter = DataConverter::default();
        let input = vec![data_converter.to_payload(&"hi".to_string(), "input.0").unwrap()];

        let mut instance = WorkflowInstance::initialize(
            &registry,
            InitialWorkflow {
                workflow_type: "Echo".to_string(),
                input,
                memo: HashMap::new(),
                search_attributes: HashMap::new(),
                random_seed: 7,
            },
            info(),
            Utc::now(),
            &data_converter,
        )
        .unwrap();
        instance.apply(initial_activation(Vec::new()));

        let completion = instance.apply(initial_activation(vec![ActivationJob::FireTimer { seq: 1 }]));
        match completion {
            Completion::Successful { commands } => {
                assert_eq!(commands.len(), 1);
                assert!(matches!(commands[0], Command::CompleteWorkflow { .. }));
            }
            Completion::Failed { .. } => panic!("expected a successful completion"),
        }
    }

    #[test]
    fn signals_then_query_reflects_accumulated_state() {
        let mut registry = WorkflowRegistry::new();
        registry.register::<Counter>();
        let data_converter = DataConverter::default();

        let mut instance = WorkflowInstance::initialize(
            &registry,
            InitialWorkflow {
                workflow_type: "Counter".to_string(),
                input: Vec::new(),
                memo: HashMap::new(),
                search_attributes: HashMap::new(),
                random_seed: 7,
            },
            info(),
            Utc::now(),
            &data_converter,
        )
        .unwrap();
        instance.apply(initial_activation(Vec::new()));

        let signal = |n: u32| ActivationJob::SignalWorkflow {
            name: "increment".to_string(),
            input: vec![],
            headers: HashMap::from([("n".to_string(), data_converter.to_payload(&n, "n").unwrap())]),
        };

        let completion = instance.apply(initial_activation(vec![signal(1), signal(2), signal(3)]));
        assert!(matches!(completion, Completion::Successful { ref commands } if commands.iter().any(|c| matches!(c, Command::CompleteWorkflow { .. }))));

        let completion = instance.apply(initial_activation(vec![ActivationJob::QueryWorkflow {
            id: "q1".to_string(),
            name: "get_count".to_string(),
            input: vec![],
            headers: HashMap::new(),
        }]));
        match completion {
            Completion::Successful { commands } => {
                let query_response = commands
                    .iter()
                    .find_map(|c| match c {
                        Command::RespondToQuery { result: ActivationResult::Completed(payload), .. } => Some(payload),
                        _ => None,
                    })
                    .expect("expected a query response");
                let value: i64 = data_converter.from_payload(query_response, "result").unwrap();
                assert_eq!(value, 3);
            }
            Completion::Failed { .. } => panic!("expected a successful completion"),
        }
    }

    #[test]
    fn cancelling_a_workflow_fails_its_pending_timer() {
        let mut registry = WorkflowRegistry::new();
        registry.register::<Echo>();
        let data_converter = DataConverter::default();
        let input = vec![data_converter.to_payload(&"hi".to_string(), "input.0").unwrap()];

        let mut instance = WorkflowInstance::initialize(
            &registry,
            InitialWorkflow {
                workflow_type: "Echo".to_string(),
                input,
                memo: HashMap::new(),
                search_attributes: HashMap::new(),
                random_seed: 7,
            },
            info(),
            Utc::now(),
            &data_converter,
        )
        .unwrap();
        instance.apply(initial_activation(Vec::new()));

        let completion =
            instance.apply(initial_activation(vec![ActivationJob::CancelWorkflow { reason: Some("stop".to_string()) }]));
        match completion {
            Completion::Successful { commands } => {
                // An uncaught cooperative cancellation resolves to
                // `cancel_workflow`, not `fail_workflow`.
                assert!(commands.iter().any(|c| matches!(c, Command::CancelWorkflow)));
            }
            Completion::Failed { .. } => panic!("expected a successful completion"),
        }
    }
}
</content>
