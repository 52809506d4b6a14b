//! Bidirectional mapping between error values and [`Failure`] records.
//! Grounded on the message+retryable shape of the reference crate's
//! `ActivityError`/`WorkflowError`, generalized into the full tagged
//! `FailureInfo` sum type and given a pluggable attribute-encoding option
//! the reference types did not need.

use std::sync::Arc;

use crate::payload::{DataConverter, PayloadError};

use super::types::{Failure, FailureInfo};

#[derive(Debug, thiserror::Error)]
pub enum FailureConversionError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("encoded_attributes present but not valid JSON: {0}")]
    MalformedEncodedAttributes(serde_json::Error),
}

const ENCODED_ATTRIBUTES_ENCODING: &str = "json/plain";

/// Converts between application error values and [`Failure`] records.
///
/// `encode_common_attributes`, when set, moves `message` and `stack_trace`
/// into an encrypted/encoded `encoded_attributes` payload on encode
/// (restoring them from it on decode) — useful when a codec in the
/// configured [`DataConverter`] encrypts payloads but the bare `Failure`
/// fields would otherwise leak error text in plaintext history.
pub struct FailureConverter {
    encode_common_attributes: bool,
    data_converter: Arc<DataConverter>,
}

impl FailureConverter {
    pub fn new(data_converter: Arc<DataConverter>) -> Self {
        Self { encode_common_attributes: false, data_converter }
    }

    pub fn with_encode_common_attributes(mut self, enabled: bool) -> Self {
        self.encode_common_attributes = enabled;
        self
    }

    /// Construct a `Failure` from a raw application error, falling back to
    /// `Application{type: error_type, non_retryable: false}` for error kinds
    /// this converter does not recognize more specifically. Does not encode:
    /// `encode_common_attributes` is a boundary concern applied once by the
    /// worker when the failure crosses into a completion (see
    /// `worker/workflow_worker.rs`, `worker/activity_worker.rs`).
    pub fn from_application_error(
        &self,
        error_type: impl Into<String>,
        message: impl Into<String>,
        non_retryable: bool,
    ) -> Result<Failure, FailureConversionError> {
        Ok(Failure {
            message: message.into(),
            source: None,
            stack_trace: String::new(),
            encoded_attributes: None,
            info: FailureInfo::Application {
                error_type: error_type.into(),
                non_retryable,
                details: Vec::new(),
                next_retry_delay: None,
            },
            cause: None,
        })
    }

    /// Apply `encode_common_attributes`, if enabled, to `failure` and every
    /// failure in its cause chain.
    pub fn encode(&self, mut failure: Failure) -> Result<Failure, FailureConversionError> {
        if let Some(cause) = failure.cause.take() {
            failure.cause = Some(Box::new(self.encode(*cause)?));
        }

        if !self.encode_common_attributes {
            return Ok(failure);
        }

        let attributes = serde_json::json!({
            "message": failure.message,
            "stack_trace": failure.stack_trace,
        });
        let payload = self
            .data_converter
            .to_payload(&attributes, "failure.encoded_attributes")?;

        failure.encoded_attributes = Some(payload);
        failure.message = "encoded_attributes, see `encoded_attributes`".to_string();
        failure.stack_trace = String::new();
        Ok(failure)
    }

    /// Restore `message`/`stack_trace` from `encoded_attributes`, if present,
    /// recursing through the cause chain.
    pub fn decode(&self, mut failure: Failure) -> Result<Failure, FailureConversionError> {
        if let Some(cause) = failure.cause.take() {
            failure.cause = Some(Box::new(self.decode(*cause)?));
        }

        let Some(payload) = failure.encoded_attributes.take() else {
            return Ok(failure);
        };

        if payload.encoding() != Some(ENCODED_ATTRIBUTES_ENCODING) {
            failure.encoded_attributes = Some(payload);
            return Ok(failure);
        }

        let attributes: serde_json::Value = self
            .data_converter
            .from_payload(&payload, "failure.encoded_attributes")?;

        if let Some(message) = attributes.get("message").and_then(|v| v.as_str()) {
            failure.message = message.to_string();
        }
        if let Some(stack_trace) = attributes.get("stack_trace").and_then(|v| v.as_str()) {
            failure.stack_trace = stack_trace.to_string();
        }
        Ok(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter(encode: bool) -> FailureConverter {
        FailureConverter::new(Arc::new(DataConverter::default()))
            .with_encode_common_attributes(encode)
    }

    #[test]
    fn unrecognized_error_falls_back_to_application() {
        let conv = converter(false);
        let failure = conv
            .from_application_error("CustomError", "boom", false)
            .unwrap();
        match failure.info {
            FailureInfo::Application { error_type, non_retryable, .. } => {
                assert_eq!(error_type, "CustomError");
                assert!(!non_retryable);
            }
            _ => panic!("expected Application"),
        }
    }

    #[test]
    fn encode_common_attributes_round_trips_message_and_stack_trace() {
        let conv = converter(true);
        let mut failure = conv.from_application_error("X", "original message", false).unwrap();
        failure.stack_trace = "at foo()\nat bar()".to_string();
        let encoded = conv.encode(failure).unwrap();
        assert!(encoded.encoded_attributes.is_some());
        assert_ne!(encoded.message, "original message");

        let decoded = conv.decode(encoded).unwrap();
        assert_eq!(decoded.message, "original message");
        assert_eq!(decoded.stack_trace, "at foo()\nat bar()");
        assert!(decoded.encoded_attributes.is_none());
    }

    #[test]
    fn disabled_encoding_leaves_failure_untouched() {
        let conv = converter(false);
        let failure = conv.from_application_error("X", "plain message", false).unwrap();
        assert!(failure.encoded_attributes.is_none());
        assert_eq!(failure.message, "plain message");
    }

    #[test]
    fn encode_recurses_through_cause_chain() {
        let conv = converter(true);
        let root = conv.from_application_error("Root", "root message", false).unwrap();
        let mut top = conv.from_application_error("Top", "top message", false).unwrap();
        top.cause = Some(Box::new(root));

        let encoded = conv.encode(top).unwrap();
        let cause = encoded.cause.as_ref().unwrap();
        assert!(cause.encoded_attributes.is_some());

        let decoded = conv.decode(encoded).unwrap();
        assert_eq!(decoded.cause.unwrap().message, "root message");
    }
}
