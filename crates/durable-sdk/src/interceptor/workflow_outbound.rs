//! The workflow-outbound interceptor role: observes operations workflow
//! code requests through [`crate::workflow::WfContext`] (schedule an
//! activity, start a child workflow, ...) on their way out to the command
//! list. `Rc`-based, not `Arc`: workflow execution is single-threaded by
//! construction, so these never cross a thread boundary.

use std::rc::Rc;

use crate::bridge::{ActivityOptions, ChildWorkflowOptions};
use crate::payload::Payload;

/// One workflow-outbound call site an interceptor can observe.
#[derive(Debug, Clone)]
pub enum WorkflowOutboundCall {
    ExecuteActivity { activity_type: String, input: Vec<Payload>, options: ActivityOptions },
    StartChildWorkflow { workflow_type: String, input: Vec<Payload>, options: ChildWorkflowOptions },
}

/// Observes operations requested from inside workflow code before the
/// corresponding command is pushed.
pub trait WorkflowOutboundInterceptor {
    fn before_call(&self, _call: &WorkflowOutboundCall) {}
}

/// An ordered, installed set of [`WorkflowOutboundInterceptor`]s.
#[derive(Clone, Default)]
pub struct WorkflowOutboundInterceptorChain {
    interceptors: Vec<Rc<dyn WorkflowOutboundInterceptor>>,
}

impl WorkflowOutboundInterceptorChain {
    pub fn new(interceptors: Vec<Rc<dyn WorkflowOutboundInterceptor>>) -> Self {
        Self { interceptors }
    }

    pub fn before_call(&self, call: &WorkflowOutboundCall) {
        for interceptor in &self.interceptors {
            interceptor.before_call(call);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

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

    #[test]
    fn chain_observes_calls_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let chain = WorkflowOutboundInterceptorChain::new(vec![Rc::new(Recorder(log.clone()))]);
        chain.before_call(&WorkflowOutboundCall::ExecuteActivity {
            activity_type: "Hello".to_string(),
            input: vec![],
            options: ActivityOptions::default(),
        });
        assert_eq!(*log.borrow(), vec!["Hello".to_string()]);
    }
}
