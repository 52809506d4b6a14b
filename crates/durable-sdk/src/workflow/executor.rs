//! The workflow task executor: a single-threaded cooperative scheduler
//! driving plain `async` Rust futures to quiescence without ever touching a
//! reactor or blocking on I/O.
//!
//! Workflow code, signal handlers, update handlers, and query handlers are
//! each spawned as one logical task. A suspension point (timer, activity,
//! condition, ...) registers its waker with a [`crate::workflow::state`]
//! resolver and returns `Pending`; when the resolver later fulfills it calls
//! that waker, which re-queues the owning task here. Because polling a
//! future drains its entire ready sub-tree before yielding `Pending`, a
//! single logical task's jobs always run consecutively — the ready queue
//! only needs to track task identity, not individual continuations.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

use tracing::{debug, instrument, trace, warn};

/// Caps how many task polls a single [`TaskExecutor::drain`] call will
/// perform before giving up. A task that keeps re-waking itself (or keeps
/// waking a peer that wakes it back) every poll would otherwise hang the
/// single activation-processing thread forever; this bound turns that into
/// a reported error instead of a stuck worker.
const DEFAULT_POLL_BUDGET: usize = 1_000_000;

/// Errors raised while driving a workflow run's task set.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// [`TaskExecutor::drain`] was called again before a prior call on the
    /// same executor returned; the executor is not reentrant.
    #[error("drain() called re-entrantly on the same task executor")]
    ReentrantDrain,

    /// The ready queue did not empty within [`DEFAULT_POLL_BUDGET`] polls,
    /// most likely a workflow task caught in a wake-poll-wake cycle that
    /// never yields.
    #[error("task executor exceeded its poll budget of {0} polls without reaching quiescence")]
    PollBudgetExceeded(usize),
}

/// Identifies one logical task: the top-level workflow run, a single
/// signal/update/query handler invocation, or any future spawned by
/// workflow code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

type BoxFuture = Pin<Box<dyn Future<Output = ()>>>;

/// FIFO ready queue, deduplicated so a task woken multiple times before its
/// next poll only occupies one slot.
#[derive(Default)]
struct ReadyQueue {
    order: Mutex<VecDeque<TaskId>>,
    queued: Mutex<HashSet<TaskId>>,
}

impl ReadyQueue {
    fn push(&self, id: TaskId) {
        let mut queued = self.queued.lock().unwrap();
        if queued.insert(id) {
            self.order.lock().unwrap().push_back(id);
        }
    }

    fn pop(&self) -> Option<TaskId> {
        let id = self.order.lock().unwrap().pop_front()?;
        self.queued.lock().unwrap().remove(&id);
        Some(id)
    }

    fn is_empty(&self) -> bool {
        self.order.lock().unwrap().is_empty()
    }
}

struct TaskWaker {
    task_id: TaskId,
    queue: Arc<ReadyQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.queue.push(self.task_id);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.push(self.task_id);
    }
}

/// Owns every live task for one workflow run and the FIFO queue of tasks
/// ready to be polled.
pub struct TaskExecutor {
    tasks: HashMap<TaskId, BoxFuture>,
    queue: Arc<ReadyQueue>,
    next_id: u64,
    poll_budget: usize,
    draining: bool,
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskExecutor {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            queue: Arc::new(ReadyQueue::default()),
            next_id: 0,
            poll_budget: DEFAULT_POLL_BUDGET,
            draining: false,
        }
    }

    /// Spawn a new logical task, scheduling it for its first poll.
    #[instrument(skip(self, future))]
    pub fn spawn(&mut self, future: impl Future<Output = ()> + 'static) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.insert(id, Box::pin(future));
        self.queue.push(id);
        trace!(task_id = ?id, live_tasks = self.tasks.len(), "spawned task");
        id
    }

    /// `true` once every task has either completed or is blocked waiting on
    /// something outside the executor: this is the only safe point at which
    /// the owning state machine may emit a completion.
    pub fn is_quiescent(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_alive(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn live_task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Drain every ready task until quiescent. Must not be called from
    /// inside a task's own poll (no reentrancy) — this is enforced and
    /// reported as [`ExecutorError::ReentrantDrain`] rather than silently
    /// corrupting scheduling order.
    #[instrument(skip(self))]
    pub fn drain(&mut self) -> Result<(), ExecutorError> {
        if self.draining {
            warn!("drain() invoked re-entrantly");
            return Err(ExecutorError::ReentrantDrain);
        }
        self.draining = true;
        let mut polls = 0usize;

        let result = loop {
            let Some(id) = self.queue.pop() else {
                break Ok(());
            };
            let Some(future) = self.tasks.get_mut(&id) else {
                continue;
            };
            polls += 1;
            if polls > self.poll_budget {
                warn!(budget = self.poll_budget, "poll budget exceeded, aborting drain");
                break Err(ExecutorError::PollBudgetExceeded(self.poll_budget));
            }
            let waker = Waker::from(Arc::new(TaskWaker { task_id: id, queue: self.queue.clone() }));
            let mut cx = Context::from_waker(&waker);
            if future.as_mut().poll(&mut cx) == Poll::Ready(()) {
                self.tasks.remove(&id);
                trace!(task_id = ?id, "task completed");
            }
        };

        debug!(polls, live_tasks = self.tasks.len(), "drain pass finished");
        self.draining = false;
        result
    }

    /// Drop every task without polling it further: suspended continuations
    /// simply never resume, matching "released state" semantics rather than
    /// attempting a cooperative unwind.
    #[instrument(skip(self))]
    pub fn evict(&mut self) {
        debug!(live_tasks = self.tasks.len(), "evicting all tasks");
        self.tasks.clear();
        while self.queue.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Poll as StdPoll;

    struct Yield {
        times: usize,
    }

    impl Future for Yield {
        type Output = ();
        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> StdPoll<()> {
            if self.times == 0 {
                StdPoll::Ready(())
            } else {
                self.times -= 1;
                cx.waker().wake_by_ref();
                StdPoll::Pending
            }
        }
    }

    #[test]
    fn spawned_task_runs_to_completion() {
        let mut executor = TaskExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        let id = executor.spawn(async move {
            counter2.fetch_add(1, Ordering::SeqCst);
        });
        assert!(executor.is_alive(id));
        executor.drain().unwrap();
        assert!(executor.is_quiescent());
        assert!(!executor.is_alive(id));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn self_waking_task_drains_inline_without_reentering_queue() {
        let mut executor = TaskExecutor::new();
        let id = executor.spawn(Yield { times: 3 });
        executor.drain().unwrap();
        assert!(executor.is_quiescent());
        assert!(!executor.is_alive(id));
    }

    #[test]
    fn task_blocked_externally_leaves_executor_quiescent() {
        let mut executor = TaskExecutor::new();
        let waker_slot: Arc<Mutex<Option<Waker>>> = Arc::new(Mutex::new(None));
        let slot = waker_slot.clone();
        let fulfilled = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fulfilled_read = fulfilled.clone();

        struct WaitOnce {
            slot: Arc<Mutex<Option<Waker>>>,
            fulfilled: Arc<std::sync::atomic::AtomicBool>,
        }
        impl Future for WaitOnce {
            type Output = ();
            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> StdPoll<()> {
                if self.fulfilled.load(Ordering::SeqCst) {
                    StdPoll::Ready(())
                } else {
                    *self.slot.lock().unwrap() = Some(cx.waker().clone());
                    StdPoll::Pending
                }
            }
        }

        let id = executor.spawn(WaitOnce { slot, fulfilled: fulfilled_read });
        executor.drain().unwrap();
        assert!(executor.is_quiescent());
        assert!(executor.is_alive(id), "task should still be alive, blocked externally");

        fulfilled.store(true, Ordering::SeqCst);
        let waker = waker_slot.lock().unwrap().take().unwrap();
        waker.wake();

        executor.drain().unwrap();
        assert!(!executor.is_alive(id));
    }

    #[test]
    fn multiple_tasks_run_in_fifo_spawn_order() {
        let mut executor = TaskExecutor::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            executor.spawn(async move {
                order.lock().unwrap().push(i);
            });
        }
        executor.drain().unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn evict_clears_all_tasks_without_polling_further() {
        let mut executor = TaskExecutor::new();
        let ran_after_evict = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran_after_evict.clone();

        let waker_slot: Arc<Mutex<Option<Waker>>> = Arc::new(Mutex::new(None));
        let slot = waker_slot.clone();

        struct NeverResolves {
            slot: Arc<Mutex<Option<Waker>>>,
            flag: Arc<std::sync::atomic::AtomicBool>,
        }
        impl Future for NeverResolves {
            type Output = ();
            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> StdPoll<()> {
                self.flag.store(true, Ordering::SeqCst);
                *self.slot.lock().unwrap() = Some(cx.waker().clone());
                StdPoll::Pending
            }
        }

        let id = executor.spawn(NeverResolves { slot, flag });
        executor.drain().unwrap();
        assert!(ran_after_evict.load(Ordering::SeqCst));
        ran_after_evict.store(false, Ordering::SeqCst);

        executor.evict();
        assert!(!executor.is_alive(id));
        assert_eq!(executor.live_task_count(), 0);

        if let Some(waker) = waker_slot.lock().unwrap().take() {
            waker.wake();
        }
        executor.drain().unwrap();
        assert!(!ran_after_evict.load(Ordering::SeqCst));
    }

    #[test]
    fn poll_budget_exceeded_is_reported_instead_of_hanging() {
        let mut executor = TaskExecutor::new();
        executor.poll_budget = 5;
        executor.spawn(Yield { times: 1_000 });
        let err = executor.drain().unwrap_err();
        assert!(matches!(err, ExecutorError::PollBudgetExceeded(5)));
    }
}
