//! Crate-wide error aggregate.
//!
//! Each component defines its own `thiserror` enum scoped to its own
//! failure modes (`PayloadError`, `FailureConversionError`, `BridgeError`,
//! `WorkflowTaskError`, `ClientError`, ...). [`SdkError`] exists only for
//! call sites that cross component boundaries and want a single `?`-able
//! return type rather than manual `map_err` at every hop.

use crate::bridge::BridgeError;
use crate::client::ClientError;
use crate::payload::PayloadError;
use crate::workflow::WorkflowTaskError;

/// Umbrella error for code that touches more than one component and does not
/// want to thread per-component error types through its own signature.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    WorkflowTask(#[from] WorkflowTaskError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}
</content>
