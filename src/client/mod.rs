// src/client/mod.rs
//! Client connection to a state-machine server.
//!
//! This module contains the [`Connection`] type which owns one duplex byte
//! stream to the server and everything that runs on it.
//!
//! # Architecture
//!
//! ```text
//! caller ──register──▶ PendingRequests ◀──fulfill/fail_all── reader task ◀── read half
//!    │                                                                          ▲
//!    └──enqueue──▶ Dispatcher queue ──▶ writer task ──▶ write half ──▶ server ──┘
//! ```
//!
//! Each request gets a fresh correlation ID and a oneshot channel in the
//! pending table before it is queued. The reader task matches incoming
//! responses back to those channels, so responses may arrive in any order.
//!
//! # Concurrency
//!
//! Only the writer task writes and only the reader task reads. The pending
//! table is the one piece of state shared with callers; it sits behind a
//! mutex held just long enough for a HashMap insert or remove.
//!
//! # Teardown
//!
//! The writer and reader share one cancellation token. Whoever ends the
//! connection (a failed write, a failed or closed read, `dispose`, or the
//! last handle being dropped) fails the pending table before or together
//! with cancelling, so no caller is left waiting.

mod dispatcher;
mod execute;
mod pending;
mod reader;

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::protocol::{FrameReader, FrameWriter};
use crate::{log_debug, log_error, log_info, ConnectionConfig, Result};

use dispatcher::Dispatcher;
use pending::PendingRequests;

/// Open connection to a state-machine server.
///
/// Cheap to clone (internally `Arc`-backed); clones share the same socket,
/// queue and pending table.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Tasks {
    writer: JoinHandle<Result<()>>,
    reader: JoinHandle<Result<()>>,
}

struct Inner {
    // ---
    peer: String,
    pending: Arc<PendingRequests>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,

    /// Taken by the first `dispose`.
    tasks: Mutex<Option<Tasks>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // ---
        if !self.cancel.is_cancelled() {
            self.pending.fail_all("connection dropped");
            self.cancel.cancel();
        }
    }
}

impl Connection {
    // ---

    /// Open a TCP connection described by `config` and start its tasks.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Io` if the socket cannot be opened.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        // ---
        let address = config.address();
        let stream = TcpStream::connect(&address).await?;
        stream.set_nodelay(config.nodelay)?;

        log_info!("connected to {address} (codec: {})", config.codec.name());

        let (read_half, write_half) = stream.into_split();
        Ok(Self::start(read_half, write_half, config, address))
    }

    /// Run the protocol over an already-open byte stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_stream<S>(stream: S, config: &ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        // ---
        let (read_half, write_half) = tokio::io::split(stream);
        Self::start(read_half, write_half, config, "stream".to_string())
    }

    fn start<R, W>(read_half: R, write_half: W, config: &ConnectionConfig, peer: String) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        // ---
        let cancel = CancellationToken::new();
        let pending = Arc::new(PendingRequests::new());

        let (dispatcher, writer) = Dispatcher::spawn(
            FrameWriter::new(write_half, config.max_frame_len),
            config.codec.clone(),
            pending.clone(),
            cancel.clone(),
        );

        let reader = reader::spawn(
            FrameReader::new(read_half, config.codec.clone(), config.max_frame_len),
            pending.clone(),
            cancel.clone(),
        );

        Self {
            inner: Arc::new(Inner {
                peer,
                pending,
                dispatcher,
                cancel,
                tasks: Mutex::new(Some(Tasks { writer, reader })),
            }),
        }
    }

    /// Tear the connection down.
    ///
    /// Cancels both tasks, fails every pending call, then waits for the
    /// writer to shut its half of the stream and the reader to exit.
    /// Calling it again is a no-op.
    pub async fn dispose(&self) {
        // ---
        self.inner.cancel.cancel();
        let _failed = self.inner.pending.fail_all("connection disposed");

        let tasks = match self.inner.tasks.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(tasks) = tasks else {
            return;
        };

        for (_role, handle) in [("writer", tasks.writer), ("reader", tasks.reader)] {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(_err)) => {
                    log_debug!("{_role} task ended with error: {_err}");
                }
                Err(_join) => {
                    log_error!("{_role} task panicked: {_join}");
                }
            }
        }

        log_info!(
            "disposed connection to {} ({_failed} pending calls failed)",
            self.inner.peer
        );
    }

    /// True once the connection has been cancelled for any reason.
    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Resolves when the connection is closed for any reason.
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await
    }

    /// Why the connection stopped accepting requests, if it has.
    pub fn close_reason(&self) -> Option<String> {
        self.inner.pending.close_reason()
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// `host:port` for TCP connections, `"stream"` otherwise.
    pub fn peer(&self) -> &str {
        &self.inner.peer
    }
}
