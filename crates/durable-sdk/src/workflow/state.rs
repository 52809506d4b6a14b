//! Per-run mutable state backing [`super::context::WfContext`]: pending-work
//! registration and condition-wait bookkeeping.
//!
//! Everything here lives behind a single `Rc<RefCell<..>>` owned by one
//! [`super::instance::WorkflowInstance`]. There is no `Arc`/`Mutex` anywhere
//! in this module: a workflow run is single-threaded by construction, and
//! `Rc`/`RefCell` make that invariant visible in the type system instead of
//! paying for synchronization nobody needs.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as StdContext, Poll, Waker};

use chrono::{DateTime, Utc};

use crate::bridge::Command;
use crate::failure::Failure;
use crate::payload::Payload;

pub(crate) type LocalBoxFuture<T> = Pin<Box<dyn Future<Output = T>>>;

/// A one-shot slot fulfilled by a later activation job. If the fulfilling
/// value arrives before anyone is polling the slot, it is buffered; if a
/// poll is already waiting, fulfilling wakes it.
pub(crate) struct Slot<T> {
    state: RefCell<SlotState<T>>,
}

enum SlotState<T> {
    Empty,
    Waiting(Waker),
    Ready(T),
}

impl<T> Slot<T> {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self { state: RefCell::new(SlotState::Empty) })
    }

    /// Fulfill the slot. If nobody has polled it yet, the value is buffered
    /// for the first awaiter.
    pub(crate) fn resolve(&self, value: T) {
        let previous = self.state.replace(SlotState::Ready(value));
        if let SlotState::Waiting(waker) = previous {
            waker.wake();
        }
    }

    fn poll(&self, waker: &Waker) -> Poll<T> {
        let current = self.state.replace(SlotState::Empty);
        match current {
            SlotState::Ready(value) => Poll::Ready(value),
            _ => {
                *self.state.borrow_mut() = SlotState::Waiting(waker.clone());
                Poll::Pending
            }
        }
    }
}

/// A future that resolves once its backing [`Slot`] is fulfilled.
pub(crate) struct SlotFuture<T> {
    slot: Rc<Slot<T>>,
}

impl<T> SlotFuture<T> {
    pub(crate) fn new(slot: Rc<Slot<T>>) -> Self {
        Self { slot }
    }
}

impl<T> Future for SlotFuture<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut StdContext<'_>) -> Poll<T> {
        self.slot.poll(cx.waker())
    }
}

/// A registered `await condition(predicate)` waiter. `check` is
/// re-evaluated after every job that could change visible state; `waker`
/// resumes the owning task once it returns `true`.
pub(crate) struct ConditionEntry {
    pub(crate) check: Rc<dyn Fn() -> bool>,
    pub(crate) waker: Waker,
}

/// An async signal handler: `(input, headers) -> ()`.
pub(crate) type SignalHandlerFn =
    Rc<dyn Fn(Vec<Payload>, HashMap<String, Payload>) -> LocalBoxFuture<()>>;

/// A synchronous query handler: `input -> Result<Payload, Failure>`. Must
/// not mutate visible state or emit commands; enforced by
/// [`WorkflowState::run_as_query`].
pub(crate) type QueryHandlerFn =
    Rc<dyn Fn(Vec<Payload>, HashMap<String, Payload>) -> Result<Payload, Failure>>;

/// The synchronous validation phase of a two-phase update.
pub(crate) type UpdateValidatorFn =
    Rc<dyn Fn(Vec<Payload>, HashMap<String, Payload>) -> Result<(), Failure>>;

/// The asynchronous execution phase of a two-phase update.
pub(crate) type UpdateHandlerFn = Rc<
    dyn Fn(Vec<Payload>, HashMap<String, Payload>) -> LocalBoxFuture<Result<Payload, Failure>>,
>;

/// A signal delivered before its handler was registered, buffered FIFO.
pub(crate) struct BufferedSignal {
    pub(crate) name: String,
    pub(crate) input: Vec<Payload>,
    pub(crate) headers: HashMap<String, Payload>,
}

/// How the current activation ended, set the moment workflow code
/// completes, fails, or continues-as-new. Read by
/// [`super::instance::WorkflowInstance::apply`] after draining to quiescence
/// to decide which terminal command to append.
#[derive(Debug, Clone)]
pub(crate) enum TerminalOutcome {
    Completed(Payload),
    Failed(Failure),
    ContinuedAsNew {
        workflow_type: String,
        input: Vec<Payload>,
        memo: HashMap<String, Payload>,
        search_attributes: HashMap<String, Payload>,
    },
    Cancelled,
}

/// All event-sourced state for one workflow run.
pub(crate) struct WorkflowState {
    pub(crate) seq_counter: u32,
    pub(crate) commands_buffer: Vec<Command>,

    pub(crate) timers: HashMap<u32, Rc<Slot<Result<(), Failure>>>>,
    pub(crate) activities: HashMap<u32, Rc<Slot<Result<Payload, Failure>>>>,
    pub(crate) local_activities: HashMap<u32, Rc<Slot<Result<Payload, Failure>>>>,
    pub(crate) child_workflow_starts: HashMap<u32, Rc<Slot<Result<(), Failure>>>>,
    pub(crate) child_workflows: HashMap<u32, Rc<Slot<Result<Payload, Failure>>>>,
    pub(crate) signals_sent: HashMap<u32, Rc<Slot<Result<(), Failure>>>>,
    pub(crate) cancels_sent: HashMap<u32, Rc<Slot<Result<(), Failure>>>>,
    pub(crate) nexus_op_starts: HashMap<u32, Rc<Slot<Result<Payload, Failure>>>>,
    pub(crate) nexus_ops: HashMap<u32, Rc<Slot<Result<Payload, Failure>>>>,

    pub(crate) condition_waiters: Vec<ConditionEntry>,

    pub(crate) signal_handlers: HashMap<String, SignalHandlerFn>,
    pub(crate) query_handlers: HashMap<String, QueryHandlerFn>,
    pub(crate) update_validators: HashMap<String, UpdateValidatorFn>,
    pub(crate) update_handlers: HashMap<String, UpdateHandlerFn>,
    pub(crate) signal_buffer: VecDeque<BufferedSignal>,

    /// Futures queued by `WfContext::spawn` from within running workflow
    /// code; moved onto the executor between drain passes (see
    /// [`super::instance::WorkflowInstance::drain_to_quiescence`]) since a
    /// task cannot spawn onto the very executor that is polling it.
    pub(crate) pending_spawns: Vec<LocalBoxFuture<()>>,

    pub(crate) replay_now: DateTime<Utc>,
    pub(crate) is_replaying: bool,
    pub(crate) random_seed: u64,

    pub(crate) is_cancelled: bool,
    pub(crate) cancel_reason: Option<String>,

    pub(crate) patches_notified: HashSet<String>,
    pub(crate) patches_recorded: HashSet<String>,

    pub(crate) memo: HashMap<String, Payload>,
    pub(crate) search_attributes: HashMap<String, Payload>,

    /// `true` while a query handler or update validator is running: any
    /// command pushed during this window is a bug and is recorded rather
    /// than silently dropped.
    in_query: bool,
    query_violation: bool,

    pub(crate) terminal: Option<TerminalOutcome>,
}

impl WorkflowState {
    pub(crate) fn new(random_seed: u64, now: DateTime<Utc>) -> Self {
        Self {
            seq_counter: 0,
            commands_buffer: Vec::new(),
            timers: HashMap::new(),
            activities: HashMap::new(),
            local_activities: HashMap::new(),
            child_workflow_starts: HashMap::new(),
            child_workflows: HashMap::new(),
            signals_sent: HashMap::new(),
            cancels_sent: HashMap::new(),
            nexus_op_starts: HashMap::new(),
            nexus_ops: HashMap::new(),
            condition_waiters: Vec::new(),
            signal_handlers: HashMap::new(),
            query_handlers: HashMap::new(),
            update_validators: HashMap::new(),
            update_handlers: HashMap::new(),
            signal_buffer: VecDeque::new(),
            pending_spawns: Vec::new(),
            replay_now: now,
            is_replaying: false,
            random_seed,
            is_cancelled: false,
            cancel_reason: None,
            patches_notified: HashSet::new(),
            patches_recorded: HashSet::new(),
            memo: HashMap::new(),
            search_attributes: HashMap::new(),
            in_query: false,
            query_violation: false,
            terminal: None,
        }
    }

    pub(crate) fn next_seq(&mut self) -> u32 {
        self.seq_counter += 1;
        self.seq_counter
    }

    /// Append a command, refusing it if emitted from inside a query/update
    /// validator.
    pub(crate) fn push_command(&mut self, command: Command) {
        if self.in_query {
            self.query_violation = true;
            return;
        }
        self.commands_buffer.push(command);
    }

    /// Run `body` with command emission disabled, returning whether any
    /// command was attempted during the call (a query/validator bug).
    pub(crate) fn run_as_query<R>(&mut self, body: impl FnOnce(&mut Self) -> R) -> (R, bool) {
        let was_in_query = self.in_query;
        self.in_query = true;
        self.query_violation = false;
        let result = body(self);
        let violated = self.query_violation;
        self.in_query = was_in_query;
        (result, violated)
    }

    /// Re-evaluate every registered condition in registration order,
    /// resuming (and removing) every entry whose predicate now holds. Ties
    /// among predicates that became true in the same pass are broken by
    /// registration order.
    pub(crate) fn evaluate_conditions(&mut self) {
        let waiters = std::mem::take(&mut self.condition_waiters);
        let mut still_waiting = Vec::with_capacity(waiters.len());
        for entry in waiters {
            if (entry.check)() {
                entry.waker.wake();
            } else {
                still_waiting.push(entry);
            }
        }
        self.condition_waiters = still_waiting;
    }

    /// `has_patch(id)`: `true` during replay iff `id` was already
    /// recorded; always `true` when not replaying, recording the id and
    /// emitting `set_patch_marker` exactly once per run in that case.
    pub(crate) fn has_patch(&mut self, id: &str) -> bool {
        if self.is_replaying {
            return self.patches_recorded.contains(id);
        }
        if self.patches_recorded.insert(id.to_string()) {
            self.push_command(Command::SetPatchMarker { id: id.to_string(), deprecated: false });
        }
        true
    }

    pub(crate) fn deprecate_patch(&mut self, id: &str) {
        if self.patches_recorded.insert(id.to_string()) {
            self.push_command(Command::SetPatchMarker { id: id.to_string(), deprecated: true });
        }
    }

    pub(crate) fn apply_notify_has_patch(&mut self, id: String) {
        self.patches_notified.insert(id.clone());
        self.patches_recorded.insert(id);
    }
}

</content>
