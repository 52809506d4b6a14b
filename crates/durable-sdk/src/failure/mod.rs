//! The failure converter: bidirectional mapping between error values and
//! structured [`Failure`] records.

mod converter;
mod types;

pub use converter::{FailureConversionError, FailureConverter};
pub use types::{Failure, FailureInfo, RetryState, TimeoutType};
