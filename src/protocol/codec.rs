//! Pluggable wire codec.
//!
//! The framer treats payloads as opaque bytes; turning a [`Message`] into
//! those bytes and back is the codec's job. [`JsonCodec`] is the default.
//! Other encodings plug in by implementing [`WireCodec`] and handing an
//! instance to [`ConnectionConfig::with_codec`](crate::ConnectionConfig::with_codec).

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use super::Message;

/// Boxed error produced by a codec implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for codec operations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Failed to encode a message to bytes.
    #[error("encode error: {0}")]
    Encode(#[source] BoxError),

    /// Failed to decode bytes to a message.
    #[error("decode error: {0}")]
    Decode(#[source] BoxError),
}

/// Serialize/deserialize capability for [`Message`]s.
pub trait WireCodec: Send + Sync + fmt::Debug {
    /// Short name used in configuration, e.g. `"json"`.
    fn name(&self) -> &'static str;

    fn encode(&self, msg: &Message) -> Result<Bytes, CodecError>;

    fn decode(&self, buf: &[u8]) -> Result<Message, CodecError>;
}

/// Shared codec handle held by the connection and its tasks.
pub type CodecPtr = Arc<dyn WireCodec>;

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl WireCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, msg: &Message) -> Result<Bytes, CodecError> {
        serde_json::to_vec(msg)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(e.into()))
    }

    fn decode(&self, buf: &[u8]) -> Result<Message, CodecError> {
        serde_json::from_slice(buf).map_err(|e| CodecError::Decode(e.into()))
    }
}

/// Resolve a codec from its configuration name.
///
/// Returns `None` for names this crate does not ship.
pub fn codec_from_name(name: &str) -> Option<CodecPtr> {
    // ---
    match name.trim().to_ascii_lowercase().as_str() {
        "json" => Some(Arc::new(JsonCodec)),
        _ => None,
    }
}
