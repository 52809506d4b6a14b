//! The workflow-inbound interceptor role: observes jobs arriving at a
//! workflow run from the outside (init, signal, query, update) before
//! they're dispatched to the workflow's own code. `Rc`-based, matching
//! [`super::workflow_outbound`].

use std::rc::Rc;

use crate::payload::Payload;

/// One workflow-inbound dispatch site an interceptor can observe.
#[derive(Debug, Clone)]
pub enum WorkflowInboundJob {
    Initialize { workflow_type: String, input: Vec<Payload> },
    Signal { name: String, input: Vec<Payload> },
    Query { name: String, input: Vec<Payload> },
    Update { name: String, input: Vec<Payload> },
}

/// Observes jobs as they arrive at a workflow run, before dispatch.
pub trait WorkflowInboundInterceptor {
    fn before_dispatch(&self, _job: &WorkflowInboundJob) {}
}

/// An ordered, installed set of [`WorkflowInboundInterceptor`]s.
#[derive(Clone, Default)]
pub struct WorkflowInboundInterceptorChain {
    interceptors: Vec<Rc<dyn WorkflowInboundInterceptor>>,
}

impl WorkflowInboundInterceptorChain {
    pub fn new(interceptors: Vec<Rc<dyn WorkflowInboundInterceptor>>) -> Self {
        Self { interceptors }
    }

    pub fn before_dispatch(&self, job: &WorkflowInboundJob) {
        for interceptor in &self.interceptors {
            interceptor.before_dispatch(job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl WorkflowInboundInterceptor for Recorder {
        fn before_dispatch(&self, job: &WorkflowInboundJob) {
            if let WorkflowInboundJob::Signal { name, .. } = job {
                self.0.borrow_mut().push(name.clone());
            }
        }
    }

    #[test]
    fn chain_observes_signal_dispatch() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let chain = WorkflowInboundInterceptorChain::new(vec![Rc::new(Recorder(log.clone()))]);
        chain.before_dispatch(&WorkflowInboundJob::Signal { name: "cancel_order".to_string(), input: vec![] });
        assert_eq!(*log.borrow(), vec!["cancel_order".to_string()]);
    }
}
