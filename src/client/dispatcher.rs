//! Outbound dispatcher.
//!
//! Many callers, one writer. Callers encode their message and push the
//! payload onto an unbounded queue; a single task owns the write half of the
//! stream and frames the payloads out in queue order, flushing after each.
//! No other code touches the write half, so frames never interleave.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::pending::PendingRequests;
use crate::protocol::{CodecPtr, FrameError, FrameWriter, Message};
use crate::{log_debug, log_error, Result, RpcError};

/// Producer side of the outbound queue. Safe to share between callers.
pub(crate) struct Dispatcher {
    // ---
    tx: mpsc::UnboundedSender<Bytes>,
    codec: CodecPtr,
    max_payload: usize,
}

impl Dispatcher {
    // ---

    /// Start the writer task for `writer`.
    ///
    /// The task runs until `cancel` fires, every `Dispatcher` handle is
    /// dropped, or a write fails. A frame already being written when `cancel`
    /// fires is finished first. A write failure fails every pending call and
    /// cancels the connection.
    pub fn spawn<W>(
        writer: FrameWriter<W>,
        codec: CodecPtr,
        pending: Arc<PendingRequests>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<Result<()>>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        // ---
        let (tx, rx) = mpsc::unbounded_channel();
        let max_payload = writer.max_payload();
        let task = tokio::spawn(run_writer(writer, rx, pending, cancel));
        (
            Self {
                tx,
                codec,
                max_payload,
            },
            task,
        )
    }

    /// Encode `msg` and queue it for writing. Never waits on the socket.
    ///
    /// # Errors
    ///
    /// - `RpcError::Codec` if the message cannot be encoded
    /// - `RpcError::Frame` if the encoded message exceeds the frame limit
    /// - `RpcError::ConnectionClosed` if the writer task has stopped
    pub fn enqueue(&self, msg: &Message) -> Result<()> {
        // ---
        let payload = self.codec.encode(msg)?;
        if payload.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            }
            .into());
        }
        self.tx
            .send(payload)
            .map_err(|_| RpcError::ConnectionClosed("outbound dispatcher stopped".into()))
    }
}

async fn run_writer<W>(
    mut writer: FrameWriter<W>,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    pending: Arc<PendingRequests>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    // ---
    let outcome = loop {
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            next = rx.recv() => match next {
                Some(payload) => payload,
                None => break Ok(()),
            },
        };

        // A frame that has started goes out whole; cancellation is only
        // observed between frames.
        match writer.send(&payload).await {
            Ok(_sequence) => {
                log_debug!("wrote frame seq={_sequence} len={}", payload.len());
            }
            Err(err) => {
                log_error!("outbound write failed: {err}");
                break Err(err);
            }
        }
    };

    // Stop accepting work before the stream goes away.
    rx.close();

    if let Err(err) = &outcome {
        pending.fail_all(&format!("outbound write failed: {err}"));
        cancel.cancel();
    }

    if let Err(_err) = writer.shutdown().await {
        log_debug!("write half shutdown: {_err}");
    }

    outcome
}
