//! Packet framing.
//!
//! Frame format: `[sequence:8][length:4][payload:N]`
//!
//! - **sequence**: per-connection counter, strictly increasing (little-endian u64)
//! - **length**: exact payload byte count (little-endian u32)
//! - **payload**: one message encoded by the [`WireCodec`]
//!
//! The correlation ID lives inside the payload; the framer never looks at it.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{CodecPtr, Message};
use crate::Result;

/// Header size: 8 (sequence) + 4 (length) = 12 bytes.
pub const HEADER_SIZE: usize = 12;

/// Default maximum payload size (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Framing errors. All of them are fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The stream closed partway through a frame.
    #[error("truncated frame: expected {expected} bytes, received {received}")]
    Truncated {
        /// Bytes the header or length field promised.
        expected: usize,
        /// Bytes actually read before the stream closed.
        received: usize,
    },

    /// Payload exceeds the configured maximum.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A frame's sequence number did not increase.
    #[error("sequence regression: {received} after {previous}")]
    SequenceRegression { previous: u64, received: u64 },
}

/// One frame as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence: u64,
    pub payload: Bytes,
}

fn encode_header(sequence: u64, length: u32) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..8].copy_from_slice(&sequence.to_le_bytes());
    buf[8..12].copy_from_slice(&length.to_le_bytes());
    buf
}

fn decode_header(buf: &[u8; HEADER_SIZE]) -> (u64, u32) {
    let mut sequence = [0u8; 8];
    let mut length = [0u8; 4];
    sequence.copy_from_slice(&buf[0..8]);
    length.copy_from_slice(&buf[8..12]);
    (u64::from_le_bytes(sequence), u32::from_le_bytes(length))
}

/// Read until `buf` is full or the stream ends. Returns the number of bytes read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Write one frame. Header and payload go out in a single `write_all`.
///
/// Does not flush; callers that need the bytes on the wire flush themselves.
pub async fn write_frame<W>(writer: &mut W, sequence: u64, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    // ---
    let length = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(&encode_header(sequence, length));
    buf.put_slice(payload);

    writer.write_all(&buf).await?;
    Ok(())
}

/// Read one frame.
///
/// Returns `Ok(None)` only when the stream closes cleanly between frames.
/// A stream that closes inside a header or payload yields
/// [`FrameError::Truncated`].
pub async fn read_frame<R>(reader: &mut R, max_payload: usize) -> Result<Option<Packet>>
where
    R: AsyncRead + Unpin,
{
    // ---
    let mut header = [0u8; HEADER_SIZE];
    let received = read_full(reader, &mut header).await?;

    if received == 0 {
        return Ok(None);
    }
    if received < HEADER_SIZE {
        return Err(FrameError::Truncated {
            expected: HEADER_SIZE,
            received,
        }
        .into());
    }

    let (sequence, length) = decode_header(&header);
    let length = length as usize;

    if length > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: length,
            max: max_payload,
        }
        .into());
    }

    let mut payload = BytesMut::zeroed(length);
    let received = read_full(reader, &mut payload).await?;

    if received < length {
        return Err(FrameError::Truncated {
            expected: length,
            received,
        }
        .into());
    }

    Ok(Some(Packet {
        sequence,
        payload: payload.freeze(),
    }))
}

/// Write half of a framed stream. Owns the outbound sequence counter.
pub struct FrameWriter<W> {
    // ---
    writer: W,
    next_sequence: u64,
    max_payload: usize,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W, max_payload: usize) -> Self {
        // ---
        Self {
            writer,
            next_sequence: 1,
            max_payload,
        }
    }

    /// Largest payload this writer accepts.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Frame `payload` with the next sequence number, write it and flush.
    ///
    /// Returns the sequence number used.
    pub async fn send(&mut self, payload: &[u8]) -> Result<u64> {
        // ---
        if payload.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            }
            .into());
        }

        let sequence = self.next_sequence;
        write_frame(&mut self.writer, sequence, payload).await?;
        self.writer.flush().await?;
        self.next_sequence += 1;

        Ok(sequence)
    }

    /// Shut down the write direction of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        // ---
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Read half of a framed stream. Decodes payloads through the codec and
/// enforces strictly increasing sequence numbers.
pub struct FrameReader<R> {
    // ---
    reader: R,
    codec: CodecPtr,
    max_payload: usize,
    last_sequence: Option<u64>,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, codec: CodecPtr, max_payload: usize) -> Self {
        // ---
        Self {
            reader,
            codec,
            max_payload,
            last_sequence: None,
        }
    }

    /// Read the next raw frame.
    pub async fn read_packet(&mut self) -> Result<Option<Packet>> {
        // ---
        let Some(packet) = read_frame(&mut self.reader, self.max_payload).await? else {
            return Ok(None);
        };

        if let Some(previous) = self.last_sequence {
            if packet.sequence <= previous {
                return Err(FrameError::SequenceRegression {
                    previous,
                    received: packet.sequence,
                }
                .into());
            }
        }
        self.last_sequence = Some(packet.sequence);

        Ok(Some(packet))
    }

    /// Read and decode the next message, or `None` at a clean end of stream.
    pub async fn read_next(&mut self) -> Result<Option<Message>> {
        // ---
        match self.read_packet().await? {
            Some(packet) => Ok(Some(self.codec.decode(&packet.payload)?)),
            None => Ok(None),
        }
    }
}
