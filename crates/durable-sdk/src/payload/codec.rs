//! Payload codecs: the outer layer of the codec pipeline, applied
//! after conversion and in reverse order before decoding. Codecs operate
//! opaquely on `Payload.data` — compression, encryption — without caring
//! what converter produced it.
//!
//! `EncryptionCodec` generalizes the envelope-encryption scheme used for
//! encrypting database columns in the reference corpus onto arbitrary
//! payload bytes: a per-process primary key encrypts a random per-payload
//! data-encryption key (DEK), and the DEK encrypts the payload itself. Both
//! layers use AES-256-GCM with a random 96-bit nonce.

use std::collections::HashMap;
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

use super::payload::Payload;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("codec {codec} failed to encode: {message}")]
    Encode { codec: &'static str, message: String },

    #[error("codec {codec} failed to decode: {message}")]
    Decode { codec: &'static str, message: String },

    #[error("key {0:?} not found among configured decryption keys")]
    UnknownKey(String),

    #[error("missing or malformed environment configuration: {0}")]
    Config(String),
}

/// One layer of the outer codec chain. Implementations must be inverses of
/// themselves: `decode(encode(payload)) == payload`.
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, payload: Payload) -> Result<Payload, CodecError>;
    fn decode(&self, payload: Payload) -> Result<Payload, CodecError>;
}

/// Identity codec. The default outer chain when no compression or
/// encryption has been configured.
pub struct NoopCodec;

impl PayloadCodec for NoopCodec {
    fn encode(&self, payload: Payload) -> Result<Payload, CodecError> {
        Ok(payload)
    }
    fn decode(&self, payload: Payload) -> Result<Payload, CodecError> {
        Ok(payload)
    }
}

/// An ordered stack of codecs, applied outer-to-inner on encode and
/// inner-to-outer on decode (reverse of the encode order), matching the
/// spec's "applied in reverse order when decoding" rule.
#[derive(Clone)]
pub struct CodecChain {
    codecs: Arc<Vec<Arc<dyn PayloadCodec>>>,
}

impl Default for CodecChain {
    fn default() -> Self {
        Self::identity()
    }
}

impl CodecChain {
    pub fn identity() -> Self {
        Self {
            codecs: Arc::new(vec![Arc::new(NoopCodec)]),
        }
    }

    pub fn new(codecs: Vec<Arc<dyn PayloadCodec>>) -> Self {
        Self { codecs: Arc::new(codecs) }
    }

    pub fn encode(&self, mut payload: Payload) -> Result<Payload, CodecError> {
        for codec in self.codecs.iter() {
            payload = codec.encode(payload)?;
        }
        Ok(payload)
    }

    pub fn decode(&self, mut payload: Payload) -> Result<Payload, CodecError> {
        for codec in self.codecs.iter().rev() {
            payload = codec.decode(payload)?;
        }
        Ok(payload)
    }
}

const ENCRYPTION_METADATA_KEY: &str = "encryption-key-id";
const DEK_LEN: usize = 32;
const NONCE_LEN: usize = 12;

struct VersionedKey {
    key_id: String,
    cipher: Aes256Gcm,
}

/// Envelope-encrypting codec: AES-256-GCM over a random per-payload DEK,
/// itself AES-256-GCM-wrapped by a primary key-encryption key (KEK).
/// Previously-rotated keys are retained for decrypting payloads written
/// before a rotation; they are never used to encrypt.
pub struct EncryptionCodec {
    primary: Arc<VersionedKey>,
    keys_by_id: HashMap<String, Arc<VersionedKey>>,
}

impl EncryptionCodec {
    /// Build a codec from an already-parsed primary key plus any number of
    /// previously-active keys, keyed by their `key_id`.
    pub fn new(primary_key_id: impl Into<String>, primary_key: [u8; 32]) -> Self {
        let primary = Arc::new(VersionedKey {
            key_id: primary_key_id.into(),
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&primary_key)),
        });
        let mut keys_by_id = HashMap::new();
        keys_by_id.insert(primary.key_id.clone(), primary.clone());
        Self { primary, keys_by_id }
    }

    /// Register an additional previously-active key usable for decryption.
    pub fn with_previous_key(mut self, key_id: impl Into<String>, key: [u8; 32]) -> Self {
        let key_id = key_id.into();
        let versioned = Arc::new(VersionedKey {
            key_id: key_id.clone(),
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        });
        self.keys_by_id.insert(key_id, versioned);
        self
    }

    /// Build from `DURABLE_SDK_ENCRYPTION_KEY` (format `"key_id:base64_key"`)
    /// and an optional comma-separated `DURABLE_SDK_ENCRYPTION_KEY_PREVIOUS`
    /// of the same format, for decrypting payloads from before a rotation.
    pub fn from_env() -> Result<Self, CodecError> {
        let primary_raw = crate::config::required_var("DURABLE_SDK_ENCRYPTION_KEY")
            .map_err(|e| CodecError::Config(e.to_string()))?;
        let (key_id, key) = parse_versioned_key(&primary_raw)?;
        let mut codec = EncryptionCodec::new(key_id, key);

        if let Some(previous) = crate::config::optional_var("DURABLE_SDK_ENCRYPTION_KEY_PREVIOUS") {
            for entry in previous.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let (key_id, key) = parse_versioned_key(entry)?;
                codec = codec.with_previous_key(key_id, key);
            }
        }

        Ok(codec)
    }

    fn random_nonce() -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        nonce
    }
}

fn parse_versioned_key(raw: &str) -> Result<(String, [u8; 32]), CodecError> {
    let (key_id, encoded) = raw
        .split_once(':')
        .ok_or_else(|| CodecError::Config(format!("expected \"key_id:base64_key\", got {raw:?}")))?;
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| CodecError::Config(format!("invalid base64 key material: {e}")))?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CodecError::Config("key material must be exactly 32 bytes".to_string()))?;
    Ok((key_id.to_string(), key))
}

impl PayloadCodec for EncryptionCodec {
    fn encode(&self, payload: Payload) -> Result<Payload, CodecError> {
        let mut dek_bytes = [0u8; DEK_LEN];
        rand::thread_rng().fill_bytes(&mut dek_bytes);
        let dek = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&dek_bytes));

        let data_nonce = Self::random_nonce();
        let ciphertext = dek
            .encrypt(Nonce::from_slice(&data_nonce), payload.data.as_slice())
            .map_err(|e| CodecError::Encode { codec: "encryption", message: e.to_string() })?;

        let wrap_nonce = Self::random_nonce();
        let wrapped_dek = self
            .primary
            .cipher
            .encrypt(Nonce::from_slice(&wrap_nonce), dek_bytes.as_slice())
            .map_err(|e| CodecError::Encode { codec: "encryption", message: e.to_string() })?;

        // Wire format: nonce(12) || wrapped_dek_nonce(12) || wrapped_dek || ciphertext
        let mut data = Vec::with_capacity(NONCE_LEN * 2 + wrapped_dek.len() + ciphertext.len());
        data.extend_from_slice(&data_nonce);
        data.extend_from_slice(&wrap_nonce);
        data.extend_from_slice(&wrapped_dek);
        data.extend_from_slice(&ciphertext);

        let mut encoded = Payload { data, metadata: payload.metadata };
        encoded
            .metadata
            .insert(ENCRYPTION_METADATA_KEY.to_string(), self.primary.key_id.clone().into_bytes());
        Ok(encoded)
    }

    fn decode(&self, payload: Payload) -> Result<Payload, CodecError> {
        let key_id = payload
            .metadata
            .get(ENCRYPTION_METADATA_KEY)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .ok_or_else(|| CodecError::Decode {
                codec: "encryption",
                message: "payload has no encryption-key-id metadata".to_string(),
            })?;

        let versioned = self
            .keys_by_id
            .get(&key_id)
            .ok_or_else(|| CodecError::UnknownKey(key_id.clone()))?;

        if payload.data.len() < NONCE_LEN * 2 {
            return Err(CodecError::Decode {
                codec: "encryption",
                message: "payload too short to contain envelope header".to_string(),
            });
        }

        let (data_nonce, rest) = payload.data.split_at(NONCE_LEN);
        let (wrap_nonce, rest) = rest.split_at(NONCE_LEN);

        // The wrapped DEK is a fixed-size AES-GCM ciphertext (DEK_LEN + 16-byte tag).
        if rest.len() < DEK_LEN + 16 {
            return Err(CodecError::Decode {
                codec: "encryption",
                message: "payload too short to contain wrapped key".to_string(),
            });
        }
        let (wrapped_dek, ciphertext) = rest.split_at(DEK_LEN + 16);

        let dek_bytes = versioned
            .cipher
            .decrypt(Nonce::from_slice(wrap_nonce), wrapped_dek)
            .map_err(|e| CodecError::Decode { codec: "encryption", message: e.to_string() })?;
        let dek = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&dek_bytes));

        let plaintext = dek
            .decrypt(Nonce::from_slice(data_nonce), ciphertext)
            .map_err(|e| CodecError::Decode { codec: "encryption", message: e.to_string() })?;

        let mut metadata = payload.metadata;
        metadata.remove(ENCRYPTION_METADATA_KEY);
        Ok(Payload { data: plaintext, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn encrypt_decrypt_round_trips() {
        let codec = EncryptionCodec::new("k1", test_key(1));
        let payload = Payload::with_encoding("json/plain", b"{\"a\":1}".to_vec());
        let encrypted = codec.encode(payload.clone()).unwrap();
        assert_ne!(encrypted.data, payload.data);
        assert_eq!(
            encrypted.metadata.get(ENCRYPTION_METADATA_KEY).unwrap(),
            b"k1"
        );
        let decrypted = codec.decode(encrypted).unwrap();
        assert_eq!(decrypted.data, payload.data);
        assert_eq!(decrypted.encoding(), payload.encoding());
    }

    #[test]
    fn two_encryptions_of_same_payload_differ() {
        let codec = EncryptionCodec::new("k1", test_key(1));
        let payload = Payload::with_encoding("json/plain", b"same".to_vec());
        let a = codec.encode(payload.clone()).unwrap();
        let b = codec.encode(payload).unwrap();
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn decrypt_with_rotated_previous_key_still_works() {
        let writer = EncryptionCodec::new("k1", test_key(1));
        let payload = Payload::with_encoding("json/plain", b"legacy".to_vec());
        let encrypted = writer.encode(payload.clone()).unwrap();

        let reader = EncryptionCodec::new("k2", test_key(2)).with_previous_key("k1", test_key(1));
        let decrypted = reader.decode(encrypted).unwrap();
        assert_eq!(decrypted.data, payload.data);
    }

    #[test]
    fn unknown_key_id_is_rejected() {
        let writer = EncryptionCodec::new("k1", test_key(1));
        let payload = Payload::with_encoding("json/plain", b"x".to_vec());
        let encrypted = writer.encode(payload).unwrap();

        let reader = EncryptionCodec::new("k2", test_key(2));
        let err = reader.decode(encrypted).unwrap_err();
        assert!(matches!(err, CodecError::UnknownKey(ref id) if id == "k1"));
    }

    #[test]
    fn chain_applies_codecs_in_reverse_on_decode() {
        let chain = CodecChain::new(vec![Arc::new(EncryptionCodec::new("k1", test_key(1)))]);
        let payload = Payload::with_encoding("json/plain", b"wrapped".to_vec());
        let encoded = chain.encode(payload.clone()).unwrap();
        let decoded = chain.decode(encoded).unwrap();
        assert_eq!(decoded.data, payload.data);
    }

    #[test]
    fn identity_chain_is_a_no_op() {
        let chain = CodecChain::identity();
        let payload = Payload::with_encoding("binary/plain", b"hello".to_vec());
        let encoded = chain.encode(payload.clone()).unwrap();
        assert_eq!(encoded.data, payload.data);
    }
}
