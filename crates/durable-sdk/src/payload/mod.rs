//! The payload codec pipeline: converters map typed values to a
//! wire-ready `Payload`, codecs then transform that payload opaquely
//! (compression, encryption) without knowledge of what it decodes to.

mod codec;
mod converter;
mod payload;

pub use codec::{CodecChain, CodecError, EncryptionCodec, NoopCodec, PayloadCodec};
pub use converter::{EncodableValue, PayloadConverter, PayloadConverterChain, PayloadError};
pub use payload::{Payload, ENCODING_KEY};

/// The full pipeline: converter chain first, codec chain second, composed
/// the way a worker or client is configured to encode/decode workflow and
/// activity IO end to end.
#[derive(Clone)]
pub struct DataConverter {
    converters: std::sync::Arc<PayloadConverterChain>,
    codecs: CodecChain,
}

impl Default for DataConverter {
    fn default() -> Self {
        Self {
            converters: std::sync::Arc::new(PayloadConverterChain::default_chain()),
            codecs: CodecChain::identity(),
        }
    }
}

impl DataConverter {
    pub fn new(converters: PayloadConverterChain, codecs: CodecChain) -> Self {
        Self { converters: std::sync::Arc::new(converters), codecs }
    }

    pub fn to_payload<T: serde::Serialize>(&self, value: &T, field_path: &str) -> Result<Payload, PayloadError> {
        let payload = self.converters.to_payload(value, field_path)?;
        self.codecs.encode(payload).map_err(PayloadError::from)
    }

    pub fn from_payload<T: serde::de::DeserializeOwned>(
        &self,
        payload: &Payload,
        field_path: &str,
    ) -> Result<T, PayloadError> {
        let decoded = self.codecs.decode(payload.clone())?;
        self.converters.from_payload(&decoded, field_path)
    }

    pub fn decode_void(&self, payload: Option<&Payload>) -> Result<(), PayloadError> {
        match payload {
            None => Ok(()),
            Some(p) => {
                let decoded = self.codecs.decode(p.clone())?;
                self.converters.decode_void(Some(&decoded))
            }
        }
    }
}
