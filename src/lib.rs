//! Typed command/query RPC over one framed duplex connection
//!
//! This library lets an application execute commands and queries against a
//! remote state-machine server. Requests and responses travel as
//! length-prefixed frames over a single socket; responses may arrive in any
//! order and are matched back to their callers by correlation ID.
//!
//! ```no_run
//! use serde::Serialize;
//! use sm_rpc::{Command, Query};
//!
//! #[derive(Serialize)]
//! struct Increment { by: i64 }
//! impl Command for Increment { const NAME: &'static str = "counter.increment"; }
//!
//! #[derive(Serialize)]
//! struct Current;
//! impl Query for Current { const NAME: &'static str = "counter.current"; }
//!
//! # async fn example() -> sm_rpc::Result<()> {
//! let conn = sm_rpc::connect("localhost", 3001).await?;
//!
//! conn.execute_command(&Increment { by: 5 }).await?;
//! let value: i64 = conn.execute_query(&Current).await?;
//!
//! conn.dispose().await;
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod macros;

mod client;
mod config;
mod error;
pub mod protocol;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use client::Connection;
pub use config::{ConnectionConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use error::{Result, RpcError};

pub use protocol::{
    //
    codec_from_name,
    Command,
    CorrelationId,
    Fault,
    JsonCodec,
    Message,
    Outcome,
    Query,
    WireCodec,
};

/// Connect to `host:port` with the default configuration.
///
/// # Errors
///
/// Returns `RpcError::Io` if the socket cannot be opened.
pub async fn connect(host: &str, port: u16) -> Result<Connection> {
    // ---
    connect_with(&ConnectionConfig::new(host, port)).await
}

/// Connect using an explicit configuration.
pub async fn connect_with(config: &ConnectionConfig) -> Result<Connection> {
    // ---
    Connection::connect(config).await
}
