//! The client-outbound interceptor role: observes calls a
//! [`crate::client::WorkflowClient`] makes against the
//! [`crate::client::WorkflowService`] boundary, e.g. for auth header
//! injection or call logging. Same hook-based, before/after-ordered chain
//! shape as [`super::activity_inbound`].

use std::sync::Arc;

use crate::client::ClientError;
use crate::payload::Payload;

/// One client-outbound call site an interceptor can observe.
#[derive(Debug, Clone)]
pub enum ClientOutboundCall {
    StartWorkflow { workflow_type: String, workflow_id: String },
    SignalWorkflow { workflow_id: String, name: String },
    QueryWorkflow { workflow_id: String, name: String },
    UpdateWorkflow { workflow_id: String, name: String },
    CancelWorkflow { workflow_id: String },
    TerminateWorkflow { workflow_id: String },
}

/// Observes client-side calls before they're sent and after a response (or
/// error) comes back.
pub trait ClientOutboundInterceptor: Send + Sync {
    fn before_call(&self, _call: &ClientOutboundCall) {}
    fn after_call(&self, _call: &ClientOutboundCall, _result: &Result<Option<Payload>, ClientError>) {}
}

/// An ordered, installed set of [`ClientOutboundInterceptor`]s.
#[derive(Clone, Default)]
pub struct ClientOutboundInterceptorChain {
    interceptors: Vec<Arc<dyn ClientOutboundInterceptor>>,
}

impl ClientOutboundInterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn ClientOutboundInterceptor>>) -> Self {
        Self { interceptors }
    }

    pub fn before_call(&self, call: &ClientOutboundCall) {
        for interceptor in &self.interceptors {
            interceptor.before_call(call);
        }
    }

    pub fn after_call(&self, call: &ClientOutboundCall, result: &Result<Option<Payload>, ClientError>) {
        for interceptor in self.interceptors.iter().rev() {
            interceptor.after_call(call, result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CountingInterceptor(Arc<Mutex<usize>>);

    impl ClientOutboundInterceptor for CountingInterceptor {
        fn before_call(&self, _call: &ClientOutboundCall) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn every_installed_interceptor_observes_the_call() {
        let count = Arc::new(Mutex::new(0));
        let chain = ClientOutboundInterceptorChain::new(vec![
            Arc::new(CountingInterceptor(count.clone())),
            Arc::new(CountingInterceptor(count.clone())),
        ]);
        chain.before_call(&ClientOutboundCall::StartWorkflow {
            workflow_type: "T".to_string(),
            workflow_id: "wf".to_string(),
        });
        assert_eq!(*count.lock().unwrap(), 2);
    }
}
