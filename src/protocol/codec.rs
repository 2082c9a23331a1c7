use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Codec failures. Decoding an unknown shape is classified non-fatal by the
/// session manager; encoding failures indicate an internal bug.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode message: {0}")]
    Encoding(String),

    #[error("unknown message format")]
    UnknownMessageFormat,
}

/// Serialize a message to its wire form (one JSON object per message).
pub fn encode<T: Serialize>(message: &T) -> Result<String, CodecError> {
    serde_json::to_string(message).map_err(|e| CodecError::Encoding(e.to_string()))
}

/// Parse wire bytes into a message.
pub fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(raw).map_err(|_| CodecError::UnknownMessageFormat)
}
