use std::collections::HashMap;

/// The metadata key identifying which converter encoded a payload's `data`.
pub const ENCODING_KEY: &str = "encoding";

/// `{ data: bytes, metadata: map<string, bytes> }`.
///
/// Metadata is total: every payload produced by this crate carries an
/// `encoding` entry. Encoding names are disjoint across converters and
/// codecs — nothing downstream needs to guess which layer produced a given
/// tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub data: Vec<u8>,
    pub metadata: HashMap<String, Vec<u8>>,
}

impl Payload {
    /// A payload carrying `data` tagged with the given encoding.
    pub fn with_encoding(encoding: &str, data: Vec<u8>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(ENCODING_KEY.to_string(), encoding.as_bytes().to_vec());
        Self { data, metadata }
    }

    /// The `encoding` metadata entry as a string, if present and valid UTF-8.
    pub fn encoding(&self) -> Option<&str> {
        self.metadata
            .get(ENCODING_KEY)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// `true` for an empty, `binary/null`-tagged payload — the canonical
    /// encoding of `void`.
    pub fn is_null(&self) -> bool {
        self.data.is_empty() && self.encoding() == Some("binary/null")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_encoding_sets_metadata() {
        let p = Payload::with_encoding("json/plain", b"\"hi\"".to_vec());
        assert_eq!(p.encoding(), Some("json/plain"));
        assert_eq!(p.data, b"\"hi\"");
    }

    #[test]
    fn is_null_requires_empty_data_and_tag() {
        let null_payload = Payload::with_encoding("binary/null", vec![]);
        assert!(null_payload.is_null());

        let tagged_but_not_empty = Payload::with_encoding("binary/null", vec![1]);
        assert!(!tagged_but_not_empty.is_null());

        let empty_but_untagged = Payload::with_encoding("json/plain", vec![]);
        assert!(!empty_but_untagged.is_null());
    }
}
</content>
