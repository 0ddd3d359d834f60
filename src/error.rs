use thiserror::Error;

use crate::protocol::{CodecError, Fault, FrameError};

/// Errors that can occur while talking to a state-machine server
#[derive(Error, Debug)]
pub enum RpcError {
    /// Socket connect, read or write failed
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame boundaries on the stream can no longer be trusted
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// The wire codec could not encode or decode a message
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A command, query or result value could not be converted to or from JSON
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connection was torn down before a response arrived
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The server executed the request and reported a fault
    #[error("server fault: {0}")]
    Fault(Fault),

    /// The response did not match the request it answered
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be registered
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A blocking call was made from a thread that is driving an async runtime
    #[error("blocking call made from within an async runtime context")]
    BlockingInAsyncContext,

    /// No wire codec is known under the configured name
    #[error("unknown wire codec: {0}")]
    UnknownCodec(String),
}

impl RpcError {
    /// True if this error ended the connection rather than a single call.
    ///
    /// An outbound payload over the frame limit is refused before it is
    /// written, so only that call fails.
    pub fn is_connection_error(&self) -> bool {
        match self {
            RpcError::Frame(FrameError::PayloadTooLarge { .. }) => false,
            RpcError::Io(_) | RpcError::Frame(_) | RpcError::ConnectionClosed(_) => true,
            _ => false,
        }
    }
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;
