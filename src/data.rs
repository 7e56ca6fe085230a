//! Values passed between pipeline stages.

use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A value that can be marshaled to JSON and downcast to its concrete type.
///
/// Implemented for every `Serialize + Debug` type.
pub trait Marshal: Any + Send + Sync + fmt::Debug {
    /// Serialize the value as JSON bytes.
    fn to_json(&self) -> Result<Vec<u8>, serde_json::Error>;

    /// Borrow as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T> Marshal for T
where
    T: Serialize + Any + Send + Sync + fmt::Debug,
{
    fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Error returned when data cannot be turned into a payload.
#[derive(Error, Debug)]
pub enum SerializeError {
    /// The value has no serialized form.
    #[error("passed in data must be of type bytes, string or implement Serialize")]
    Unsupported,

    /// Marshaling the value failed.
    #[error("failed to marshal data: {0}")]
    Marshal(#[from] serde_json::Error),

    /// A marshaler produced bytes that are not UTF-8 JSON text.
    #[error("marshaled JSON is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::string::FromUtf8Error),
}

/// Data flowing between pipeline stages.
///
/// The variant decides how the value is serialized for delivery.
#[derive(Clone)]
pub enum Data {
    /// Raw bytes, delivered as-is.
    Bytes(Vec<u8>),
    /// UTF-8 text, delivered as its bytes.
    Text(String),
    /// A structured value, delivered as JSON.
    Marshal(Arc<dyn Marshal>),
    /// A value with no serialized form. Stages can still downcast it.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Data {
    /// Wrap a serializable value.
    pub fn marshal<T>(value: T) -> Self
    where
        T: Serialize + Any + Send + Sync + fmt::Debug,
    {
        Self::Marshal(Arc::new(value))
    }

    /// Wrap a value that has no serialized form.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Self::Opaque(Arc::new(value))
    }

    /// Downcast a structured or opaque value to a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Marshal(value) => value.as_any().downcast_ref::<T>(),
            Self::Opaque(value) => value.downcast_ref::<T>(),
            Self::Bytes(_) | Self::Text(_) => None,
        }
    }

    /// Borrow the raw bytes, if this is `Bytes`.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Borrow the text, if this is `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Short name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
            Self::Marshal(_) => "marshal",
            Self::Opaque(_) => "opaque",
        }
    }

    /// Serialize into payload bytes.
    pub fn to_payload(&self) -> Result<Vec<u8>, SerializeError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Text(text) => Ok(text.as_bytes().to_vec()),
            Self::Marshal(value) => Ok(value.to_json()?),
            Self::Opaque(_) => Err(SerializeError::Unsupported),
        }
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Marshal(value) => f.debug_tuple("Marshal").field(value).finish(),
            Self::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl From<Vec<u8>> for Data {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for Data {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Data {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    #[test]
    fn test_bytes_and_text_payloads() {
        assert_eq!(Data::from(vec![1u8, 2, 3]).to_payload().unwrap(), vec![1, 2, 3]);
        assert_eq!(Data::from("hello").to_payload().unwrap(), b"hello".to_vec());
    }

    #[test]
    fn test_marshal_payload_is_json() {
        let data = Data::marshal(Event::new("thermostat").with_id("e1"));
        let payload = data.to_payload().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["id"], "e1");
        assert_eq!(value["device"], "thermostat");
    }

    #[test]
    fn test_opaque_is_unsupported() {
        struct NotSerializable;
        let data = Data::opaque(NotSerializable);
        assert!(matches!(data.to_payload(), Err(SerializeError::Unsupported)));
    }

    #[test]
    fn test_downcast() {
        let data = Data::marshal(Event::new("pump"));
        assert_eq!(data.downcast_ref::<Event>().unwrap().device, "pump");
        assert!(data.downcast_ref::<String>().is_none());

        let opaque = Data::opaque(42u64);
        assert_eq!(opaque.downcast_ref::<u64>(), Some(&42));
        assert!(Data::from("text").downcast_ref::<String>().is_none());
    }
}
