//! Protocol types: correlation IDs, the message hierarchy, the wire codec
//! and the length-prefixed packet framer.
//!
//! Everything here is usable on either side of a connection, so a server
//! (or a test double of one) can speak the same protocol.
mod codec;
mod correlation;
mod frame;
mod message;

pub use codec::{codec_from_name, BoxError, CodecError, CodecPtr, JsonCodec, WireCodec};
pub use correlation::CorrelationId;
pub use frame::{
    read_frame, write_frame, FrameError, FrameReader, FrameWriter, Packet,
    DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE,
};
pub use message::{
    Command, CommandRequest, CommandResponse, Fault, Message, Outcome, Query, QueryRequest,
    QueryResponse, Request, Response,
};
