//! Inbound message envelope and content-type tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Media type for JSON payloads.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Media type for CBOR payloads.
pub const CONTENT_TYPE_CBOR: &str = "application/cbor";

/// Media type for opaque binary payloads.
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";

/// Content type of an envelope payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    /// `application/json`
    Json,
    /// `application/cbor`
    Cbor,
    /// `application/octet-stream`
    Binary,
    /// Anything else, kept verbatim.
    Other(String),
}

impl ContentType {
    /// Parse a media type string.
    ///
    /// Parameters such as `; charset=utf-8` are ignored and the comparison is
    /// case-insensitive.
    pub fn parse(raw: &str) -> Self {
        let media_type = raw.split(';').next().unwrap_or_default().trim();
        if media_type.eq_ignore_ascii_case(CONTENT_TYPE_JSON) {
            Self::Json
        } else if media_type.eq_ignore_ascii_case(CONTENT_TYPE_CBOR) {
            Self::Cbor
        } else if media_type.eq_ignore_ascii_case(CONTENT_TYPE_BINARY) {
            Self::Binary
        } else {
            Self::Other(raw.to_string())
        }
    }

    /// The media type string for this content type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Json => CONTENT_TYPE_JSON,
            Self::Cbor => CONTENT_TYPE_CBOR,
            Self::Binary => CONTENT_TYPE_BINARY,
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ContentType {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for ContentType {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<ContentType> for String {
    fn from(content_type: ContentType) -> Self {
        content_type.as_str().to_string()
    }
}

/// A unit of inbound work: payload bytes plus correlation metadata.
///
/// Envelopes are never modified by the runtime; the decoder only borrows them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub payload: Vec<u8>,
    pub content_type: ContentType,
    #[serde(default)]
    pub correlation_id: String,
    #[serde(default)]
    pub checksum: String,
}

impl Envelope {
    /// Create an envelope with no correlation id or checksum.
    pub fn new(payload: impl Into<Vec<u8>>, content_type: impl Into<ContentType>) -> Self {
        Self {
            payload: payload.into(),
            content_type: content_type.into(),
            correlation_id: String::new(),
            checksum: String::new(),
        }
    }

    /// Create a JSON envelope from a serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_vec(value)?, ContentType::Json))
    }

    /// Set the correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Set the checksum.
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = checksum.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_types() {
        assert_eq!(ContentType::parse("application/json"), ContentType::Json);
        assert_eq!(ContentType::parse("application/cbor"), ContentType::Cbor);
        assert_eq!(
            ContentType::parse("application/octet-stream"),
            ContentType::Binary
        );
    }

    #[test]
    fn test_parse_ignores_parameters_and_case() {
        assert_eq!(
            ContentType::parse("Application/JSON; charset=utf-8"),
            ContentType::Json
        );
    }

    #[test]
    fn test_parse_unknown_keeps_raw() {
        let ct = ContentType::parse("text/xml");
        assert_eq!(ct, ContentType::Other("text/xml".to_string()));
        assert_eq!(ct.to_string(), "text/xml");
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::new(b"{}".to_vec(), "application/json")
            .with_correlation_id("abc")
            .with_checksum("123");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["contentType"], "application/json");
        assert_eq!(value["correlationId"], "abc");
        assert_eq!(value["checksum"], "123");

        let back: Envelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, envelope);
    }
}
