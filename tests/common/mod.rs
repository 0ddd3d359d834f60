// tests/common/mod.rs
//
// Scripted server used by the integration suites. It speaks the real wire
// protocol through the crate's public framer and codec, so every test
// exercises the same bytes a production server would exchange.

#![allow(dead_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

use sm_rpc::protocol::{
    write_frame, FrameReader, Packet, Request, Response, DEFAULT_MAX_PAYLOAD_SIZE,
};
use sm_rpc::{Command, Connection, ConnectionConfig, JsonCodec, Message, Outcome, Query, WireCodec};

// --- application types

#[derive(Debug, Serialize, Deserialize)]
pub struct Increment {
    pub by: i64,
}

impl Command for Increment {
    const NAME: &'static str = "counter.increment";
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Current;

impl Query for Current {
    const NAME: &'static str = "counter.current";
}

/// Query whose payload is a bare number; `reply_echo` answers with it.
#[derive(Debug, Serialize, Deserialize)]
pub struct Echo(pub i64);

impl Query for Echo {
    const NAME: &'static str = "echo";
}

// --- scripted server

pub struct ScriptedServer<S> {
    // ---
    reader: FrameReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    next_sequence: u64,
}

impl<S> ScriptedServer<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S) -> Self {
        // ---
        let (read_half, write_half) = split(stream);
        Self {
            reader: FrameReader::new(read_half, Arc::new(JsonCodec), DEFAULT_MAX_PAYLOAD_SIZE),
            writer: write_half,
            next_sequence: 1,
        }
    }

    /// Next raw frame sent by the client, `None` once it shuts its half.
    pub async fn next_packet(&mut self) -> Option<Packet> {
        self.reader.read_packet().await.expect("server read failed")
    }

    pub async fn next_request(&mut self) -> Request {
        // ---
        match self.reader.read_next().await.expect("server read failed") {
            Some(Message::Request(request)) => request,
            other => panic!("expected a request, got {other:?}"),
        }
    }

    pub async fn reply(&mut self, request: &Request, outcome: Outcome) {
        self.send(Message::Response(request.respond(outcome))).await;
    }

    /// Answer a query or command with its own payload.
    pub async fn reply_echo(&mut self, request: &Request) {
        // ---
        let payload = match request {
            Request::Command(cmd) => cmd.payload.clone(),
            Request::Query(query) => query.payload.clone(),
        };
        self.reply(request, Outcome::Success(payload)).await;
    }

    pub async fn send_response(&mut self, response: Response) {
        self.send(Message::Response(response)).await;
    }

    pub async fn send(&mut self, msg: Message) {
        // ---
        let payload = JsonCodec.encode(&msg).expect("encode failed");
        write_frame(&mut self.writer, self.next_sequence, &payload)
            .await
            .expect("server write failed");
        self.writer.flush().await.expect("server flush failed");
        self.next_sequence += 1;
    }

    /// Write bytes with no framing applied.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        // ---
        self.writer.write_all(bytes).await.expect("server write failed");
        self.writer.flush().await.expect("server flush failed");
    }
}

/// A connection wired to a scripted server through an in-memory pipe.
pub fn connection_pair() -> (Connection, ScriptedServer<DuplexStream>) {
    connection_pair_with(&ConnectionConfig::default())
}

pub fn connection_pair_with(
    config: &ConnectionConfig,
) -> (Connection, ScriptedServer<DuplexStream>) {
    // ---
    let (client, server) = tokio::io::duplex(64 * 1024);
    (Connection::from_stream(client, config), ScriptedServer::new(server))
}

// --- logging

mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }
}

pub fn init_logging() {
    imp::init();
}
