//! Connection configuration.
//!
//! Holds everything needed to open a connection: where the server lives and
//! which constructed wire codec to speak. The codec is an instance, built
//! once when the config is built, not a name looked up on every connect.

use std::sync::Arc;

use crate::protocol::{codec_from_name, CodecPtr, JsonCodec, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::{Result, RpcError};

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3001;

/// Connection parameters.
///
/// # Example
///
/// ```
/// use sm_rpc::ConnectionConfig;
///
/// let config = ConnectionConfig::new("db.internal", 3001)
///     .with_codec_name("json")?
///     .with_max_frame_len(1024 * 1024);
/// # Ok::<(), sm_rpc::RpcError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    // ---
    /// Server host name or address.
    pub host: String,

    /// Server TCP port.
    pub port: u16,

    /// Codec used for every frame payload on this connection.
    pub codec: CodecPtr,

    /// Largest payload accepted in either direction.
    ///
    /// Default: 16 MiB
    pub max_frame_len: usize,

    /// Disable Nagle's algorithm on the socket.
    ///
    /// Default: true
    pub nodelay: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl ConnectionConfig {
    /// Create a config for `host:port` with the JSON codec.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            codec: Arc::new(JsonCodec),
            max_frame_len: DEFAULT_MAX_PAYLOAD_SIZE,
            nodelay: true,
        }
    }

    /// Use an explicit codec instance.
    pub fn with_codec(mut self, codec: CodecPtr) -> Self {
        self.codec = codec;
        self
    }

    /// Select a codec by its configuration name (e.g. `"json"`).
    ///
    /// # Errors
    ///
    /// Returns `RpcError::UnknownCodec` if no codec has that name.
    pub fn with_codec_name(self, name: &str) -> Result<Self> {
        let codec = codec_from_name(name).ok_or_else(|| RpcError::UnknownCodec(name.into()))?;
        Ok(self.with_codec(codec))
    }

    /// Set the largest accepted frame payload.
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Enable or disable `TCP_NODELAY`.
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// `host:port` string used when opening the socket.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
