//! Inbound reader.
//!
//! One task per connection owns the read half. It reads a frame at a time,
//! decodes it, and routes responses to the correlation table. The loop ends
//! on cancellation, a clean end of stream, or the first transport or
//! framing error; frame boundaries are not trusted after an error, so there
//! is no per-frame retry.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::pending::PendingRequests;
use crate::protocol::{FrameReader, Message};
use crate::{log_debug, log_error, log_info, log_warn, Result};

/// Start the reader task for `reader`.
pub(crate) fn spawn<R>(
    reader: FrameReader<R>,
    pending: Arc<PendingRequests>,
    cancel: CancellationToken,
) -> JoinHandle<Result<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(run_reader(reader, pending, cancel))
}

/// Drive the receive loop until the connection ends.
///
/// Unless the loop was stopped by cancellation, every still-pending call is
/// failed and `cancel` is fired on the way out so the dispatcher stops too.
/// Returns the transport or framing error that ended the loop, if any.
pub(crate) async fn run_reader<R>(
    mut reader: FrameReader<R>,
    pending: Arc<PendingRequests>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    // ---
    let outcome = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log_debug!("inbound reader cancelled");
                return Ok(());
            }
            next = reader.read_next() => next,
        };

        match next {
            Ok(Some(msg)) => route(&pending, msg),
            Ok(None) => {
                log_info!("server closed the connection");
                break Ok(());
            }
            Err(err) => {
                log_error!("inbound reader stopped: {err}");
                break Err(err);
            }
        }
    };

    let reason = match &outcome {
        Ok(()) => "server closed the connection".to_string(),
        Err(err) => format!("inbound reader failed: {err}"),
    };
    let failed = pending.fail_all(&reason);
    if failed > 0 {
        log_warn!("failed {failed} pending calls: {reason}");
    }
    cancel.cancel();

    outcome
}

/// Route one decoded message. Exhaustive over the closed message set.
fn route(pending: &PendingRequests, msg: Message) {
    // ---
    match msg {
        Message::Response(response) => {
            let correlation_id = response.response_to();
            if pending.fulfill(&correlation_id, response) {
                log_debug!("delivered response (correlation_id: {correlation_id})");
            } else {
                log_warn!("dropping response for unknown correlation id {correlation_id}");
            }
        }
        Message::Request(_request) => {
            log_warn!(
                "dropping unexpected request '{}' ({}) sent by server",
                _request.name(),
                _request.id()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::protocol::{
        write_frame, CorrelationId, FrameError, JsonCodec, Outcome, Query, QueryResponse, Request,
        Response, WireCodec,
    };
    use crate::RpcError;
    use serde::Serialize;
    use tokio::io::{duplex, AsyncWriteExt};

    #[derive(Serialize)]
    struct Answer;

    impl Query for Answer {
        const NAME: &'static str = "answer";
    }

    fn frame_reader(stream: tokio::io::DuplexStream) -> FrameReader<tokio::io::DuplexStream> {
        FrameReader::new(stream, Arc::new(JsonCodec), 1024)
    }

    #[tokio::test]
    async fn test_routes_response_and_ignores_strays() {
        // ---
        let (mut server, client) = duplex(4096);
        let pending = Arc::new(PendingRequests::new());
        let cancel = CancellationToken::new();

        let request = Request::query(&Answer).unwrap();
        let rx = pending.register(request.id()).unwrap();

        let stray = Message::Response(Response::Query(QueryResponse {
            response_to: CorrelationId::generate(),
            result: Outcome::Success(0.into()),
        }));
        let unexpected = Message::Request(Request::query(&Answer).unwrap());
        let answer = Message::Response(request.respond(Outcome::Success(42.into())));

        for (seq, msg) in [stray, unexpected, answer].iter().enumerate() {
            let bytes = JsonCodec.encode(msg).unwrap();
            write_frame(&mut server, seq as u64 + 1, &bytes).await.unwrap();
        }

        let task = spawn(frame_reader(client), pending.clone(), cancel.clone());

        let response = rx.await.unwrap().unwrap();
        assert_eq!(response.into_outcome(), Outcome::Success(42.into()));

        drop(server);
        task.await.unwrap().unwrap();
        assert!(cancel.is_cancelled());
        assert_eq!(
            pending.close_reason().as_deref(),
            Some("server closed the connection")
        );
    }

    #[tokio::test]
    async fn test_truncated_frame_is_fatal() {
        // ---
        let (mut server, client) = duplex(4096);
        let pending = Arc::new(PendingRequests::new());
        let cancel = CancellationToken::new();
        let rx = pending.register(CorrelationId::generate()).unwrap();

        let mut header = Vec::new();
        header.extend_from_slice(&1u64.to_le_bytes());
        header.extend_from_slice(&100u32.to_le_bytes());
        server.write_all(&header).await.unwrap();
        server.write_all(&[b'x'; 40]).await.unwrap();
        drop(server);

        let err = run_reader(frame_reader(client), pending.clone(), cancel.clone())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RpcError::Frame(FrameError::Truncated {
                expected: 100,
                received: 40
            })
        ));

        assert!(cancel.is_cancelled());
        let failure = rx.await.unwrap().unwrap_err();
        assert!(
            matches!(failure, RpcError::ConnectionClosed(reason) if reason.contains("truncated"))
        );
    }

    #[tokio::test]
    async fn test_decode_error_is_fatal() {
        // ---
        let (mut server, client) = duplex(4096);
        let pending = Arc::new(PendingRequests::new());
        let cancel = CancellationToken::new();

        write_frame(&mut server, 1, b"{not a message").await.unwrap();

        let err = run_reader(frame_reader(client), pending, cancel.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Codec(_)));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_leaves_table_to_owner() {
        // ---
        let (_server, client) = duplex(64);
        let pending = Arc::new(PendingRequests::new());
        let cancel = CancellationToken::new();

        let task = spawn(frame_reader(client), pending.clone(), cancel.clone());
        cancel.cancel();

        task.await.unwrap().unwrap();
        assert!(pending.close_reason().is_none());
    }
}
