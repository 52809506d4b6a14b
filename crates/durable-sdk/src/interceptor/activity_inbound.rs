//! The activity-inbound interceptor role: observes an activity task as it
//! enters and leaves the worker's registered handler.
//!
//! Hook-based rather than true onion-wrapping middleware: an interceptor
//! overrides only the hooks it cares about (defaults are no-ops), and a
//! chain runs every installed interceptor's `before` hook in registration
//! order, then its `after` hook in reverse order, so the first-registered
//! interceptor is outermost (its `before` fires first, its `after` fires
//! last) and the last-registered is innermost, closest to the activity
//! itself.

use std::sync::Arc;

use crate::failure::Failure;
use crate::payload::Payload;
use crate::worker::ActivityInfo;

/// What ran, handed to every hook so an interceptor doesn't need to thread
/// its own correlation state between `before` and `after`.
#[derive(Debug, Clone)]
pub struct ExecuteActivityInput {
    pub info: ActivityInfo,
    pub input: Vec<Payload>,
}

/// The result a hook observes after the registered handler has run,
/// mirroring [`crate::worker::ActivityError`] without the `CompleteAsync`
/// variant (a deferred completion has no outcome to observe yet).
#[derive(Debug, Clone)]
pub enum ExecuteActivityOutcome {
    Completed(Payload),
    Failed(Failure),
    Cancelled(Failure),
    Deferred,
}

/// Observes activity execution on the worker side.
pub trait ActivityInboundInterceptor: Send + Sync {
    fn before_execute_activity(&self, _input: &ExecuteActivityInput) {}
    fn after_execute_activity(&self, _input: &ExecuteActivityInput, _outcome: &ExecuteActivityOutcome) {}
}

/// An ordered, installed set of [`ActivityInboundInterceptor`]s.
#[derive(Clone, Default)]
pub struct ActivityInboundInterceptorChain {
    interceptors: Vec<Arc<dyn ActivityInboundInterceptor>>,
}

impl ActivityInboundInterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn ActivityInboundInterceptor>>) -> Self {
        Self { interceptors }
    }

    pub fn before_execute_activity(&self, input: &ExecuteActivityInput) {
        for interceptor in &self.interceptors {
            interceptor.before_execute_activity(input);
        }
    }

    pub fn after_execute_activity(&self, input: &ExecuteActivityInput, outcome: &ExecuteActivityOutcome) {
        for interceptor in self.interceptors.iter().rev() {
            interceptor.after_execute_activity(input, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::WorkflowExecution;
    use std::sync::Mutex;

    struct Recorder(Arc<Mutex<Vec<&'static str>>>, &'static str);

    impl ActivityInboundInterceptor for Recorder {
        fn before_execute_activity(&self, _input: &ExecuteActivityInput) {
            self.0.lock().unwrap().push(self.1);
        }
        fn after_execute_activity(&self, _input: &ExecuteActivityInput, _outcome: &ExecuteActivityOutcome) {
            self.0.lock().unwrap().push(self.1);
        }
    }

    fn input() -> ExecuteActivityInput {
        ExecuteActivityInput {
            info: ActivityInfo {
                activity_type: "T".to_string(),
                activity_id: "a1".to_string(),
                workflow_execution: WorkflowExecution { workflow_id: "wf".to_string(), run_id: "run".to_string() },
                attempt: 1,
                heartbeat_timeout: None,
                start_to_close_timeout: None,
                heartbeat_details: vec![],
            },
            input: vec![],
        }
    }

    #[test]
    fn first_registered_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = ActivityInboundInterceptorChain::new(vec![
            Arc::new(Recorder(log.clone(), "outer")),
            Arc::new(Recorder(log.clone(), "inner")),
        ]);

        chain.before_execute_activity(&input());
        chain.after_execute_activity(&input(), &ExecuteActivityOutcome::Deferred);

        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner", "inner", "outer"]);
    }
}
