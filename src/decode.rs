//! Content-type aware envelope decoding.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ConfigError;
use crate::data::Data;
use crate::envelope::{ContentType, Envelope};
use crate::event::{Event, HasEventId};

/// Structured payload format a decode was attempted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Json,
    Cbor,
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("JSON"),
            Self::Cbor => f.write_str("CBOR"),
        }
    }
}

/// Error returned when an envelope cannot be decoded.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload is not valid for its declared format.
    #[error("Unable to unmarshal message payload as {format} : {detail}")]
    BadPayload {
        format: PayloadFormat,
        detail: String,
    },

    /// The content type has no decoder.
    #[error("'{0}' content type for input data not supported")]
    UnsupportedContentType(String),
}

/// Factory that decodes payload bytes into a freshly constructed value.
type DecodeFn =
    Arc<dyn Fn(PayloadFormat, &[u8]) -> Result<(Data, Option<String>), String> + Send + Sync>;

/// Describes what the first pipeline stage receives.
#[derive(Clone)]
pub enum TargetType {
    /// Payload bytes passed through untouched.
    Raw,
    /// Payload decoded into a new value on every call.
    Typed {
        name: &'static str,
        decode: DecodeFn,
    },
}

impl TargetType {
    /// Target that decodes into a fresh `T` for every envelope.
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Serialize + HasEventId + fmt::Debug + Send + Sync + 'static,
    {
        Self::Typed {
            name: std::any::type_name::<T>(),
            decode: Arc::new(decode_fresh::<T>),
        }
    }

    /// Target that decodes into [`Event`].
    pub fn event() -> Self {
        Self::of::<Event>()
    }

    /// Resolve a configured target type name.
    ///
    /// Known names: `event`, `json`, `raw` (alias `bytes`).
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "event" => Ok(Self::event()),
            "json" => Ok(Self::of::<serde_json::Value>()),
            "raw" | "bytes" => Ok(Self::Raw),
            _ => Err(ConfigError::UnknownTargetType(name.to_string())),
        }
    }

    /// Name of the target type, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Typed { name, .. } => name,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw)
    }
}

impl Default for TargetType {
    fn default() -> Self {
        Self::event()
    }
}

impl fmt::Debug for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TargetType").field(&self.name()).finish()
    }
}

fn decode_fresh<T>(format: PayloadFormat, bytes: &[u8]) -> Result<(Data, Option<String>), String>
where
    T: DeserializeOwned + Serialize + HasEventId + fmt::Debug + Send + Sync + 'static,
{
    let value: T = match format {
        PayloadFormat::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string())?,
        PayloadFormat::Cbor => ciborium::de::from_reader(bytes).map_err(|e| e.to_string())?,
    };
    let event_id = value.event_id();
    Ok((Data::marshal(value), event_id))
}

/// Result of decoding one envelope.
#[derive(Debug)]
pub struct Decoded {
    /// Value handed to the first stage.
    pub data: Data,
    /// Set only for raw targets, where no structural decode happened.
    pub content_type: Option<ContentType>,
    pub event_id: Option<String>,
    pub checksum: Option<String>,
}

/// Decode an envelope into the configured target type.
pub fn decode(envelope: &Envelope, target: &TargetType) -> Result<Decoded, DecodeError> {
    let decode = match target {
        TargetType::Raw => {
            return Ok(Decoded {
                data: Data::Bytes(envelope.payload.clone()),
                content_type: Some(envelope.content_type.clone()),
                event_id: None,
                checksum: None,
            });
        }
        TargetType::Typed { decode, .. } => decode,
    };

    match &envelope.content_type {
        ContentType::Json => {
            let (data, event_id) = decode(PayloadFormat::Json, &envelope.payload).map_err(
                |detail| DecodeError::BadPayload {
                    format: PayloadFormat::Json,
                    detail,
                },
            )?;
            Ok(Decoded {
                data,
                content_type: None,
                event_id,
                checksum: None,
            })
        }
        ContentType::Cbor => {
            let (data, _) = decode(PayloadFormat::Cbor, &envelope.payload).map_err(|detail| {
                DecodeError::BadPayload {
                    format: PayloadFormat::Cbor,
                    detail,
                }
            })?;
            Ok(Decoded {
                data,
                content_type: None,
                event_id: None,
                checksum: Some(envelope.checksum.clone()).filter(|c| !c.is_empty()),
            })
        }
        other => Err(DecodeError::UnsupportedContentType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert!(TargetType::from_name("raw").unwrap().is_raw());
        assert!(TargetType::from_name("Bytes").unwrap().is_raw());
        assert_eq!(
            TargetType::from_name("event").unwrap().name(),
            std::any::type_name::<Event>()
        );
        assert!(matches!(
            TargetType::from_name("pointer"),
            Err(ConfigError::UnknownTargetType(name)) if name == "pointer"
        ));
    }

    #[test]
    fn test_fresh_value_per_decode() {
        let target = TargetType::event();
        let first = Envelope::json(&Event::new("a").with_reading("temp", "1")).unwrap();
        let second = Envelope::json(&Event::new("b")).unwrap();

        let a = decode(&first, &target).unwrap();
        let b = decode(&second, &target).unwrap();

        assert_eq!(a.data.downcast_ref::<Event>().unwrap().readings.len(), 1);
        assert!(b.data.downcast_ref::<Event>().unwrap().readings.is_empty());
    }

    #[test]
    fn test_binary_content_type_with_typed_target_is_unsupported() {
        let envelope = Envelope::new(vec![0u8, 1], ContentType::Binary);
        let err = decode(&envelope, &TargetType::event()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'application/octet-stream' content type for input data not supported"
        );
    }
}
