//! The interceptor framework: four roles observing the seams between user
//! code and the runtime -- a client issuing calls, a workflow run receiving
//! jobs, workflow code issuing commands, and the worker executing an
//! activity.
//!
//! Each role is a small trait with default no-op hooks (so an interceptor
//! only overrides what it needs) and an ordered chain type. Chains run
//! every installed interceptor's "before" hook in registration order and
//! "after" hook (where the role has one) in reverse, so the
//! first-registered interceptor is outermost and the last-registered is
//! innermost -- closest to the real operation.

mod activity_inbound;
mod client_outbound;
mod workflow_inbound;
mod workflow_outbound;

pub use activity_inbound::{
    ActivityInboundInterceptor, ActivityInboundInterceptorChain, ExecuteActivityInput, ExecuteActivityOutcome,
};
pub use client_outbound::{ClientOutboundCall, ClientOutboundInterceptor, ClientOutboundInterceptorChain};
pub use workflow_inbound::{WorkflowInboundInterceptor, WorkflowInboundInterceptorChain, WorkflowInboundJob};
pub use workflow_outbound::{WorkflowOutboundCall, WorkflowOutboundInterceptor, WorkflowOutboundInterceptorChain};
