//! Length-prefixed framing for log events.
//!
//! Format: 4-byte big-endian payload length, then a JSON-encoded [`LogEvent`].
//!
//! ```text
//! +----------------+---------------------------+
//! | len: u32 (BE)  | payload: len bytes (JSON) |
//! +----------------+---------------------------+
//! ```

use std::io;

use graphrun_core::LogEvent;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Size of the length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest payload a receiver accepts. Anything bigger is treated as garbage.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors produced while framing or unframing log events.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Payload is not a valid `LogEvent`.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Peer closed the stream in the middle of a payload.
    #[error("frame truncated: expected {expected} bytes, got {received}")]
    Truncated { expected: usize, received: usize },

    /// Declared length exceeds [`MAX_FRAME_LEN`].
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    TooLarge(usize),
}

/// Encode an event as a complete frame (header + payload).
#[allow(clippy::cast_possible_truncation)] // bounded by MAX_FRAME_LEN
pub fn encode_frame(event: &LogEvent) -> Result<Vec<u8>, FrameError> {
    let payload = serde_json::to_vec(event).map_err(FrameError::Malformed)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(payload.len()));
    }

    let mut framed = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(&payload);
    Ok(framed)
}

/// Decode one frame from the front of `buffer`.
///
/// Returns `Ok(None)` until the buffer holds a complete frame, otherwise the
/// event and the number of bytes it consumed.
pub fn decode_frame(buffer: &[u8]) -> Result<Option<(LogEvent, usize)>, FrameError> {
    let Some(len) = parse_frame_length(buffer) else {
        return Ok(None);
    };
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }

    let end = FRAME_HEADER_LEN + len;
    if buffer.len() < end {
        return Ok(None);
    }

    let event = decode_payload(&buffer[FRAME_HEADER_LEN..end])?;
    Ok(Some((event, end)))
}

/// Read the payload length from a frame header, if one is present.
pub fn parse_frame_length(buffer: &[u8]) -> Option<usize> {
    let header: [u8; FRAME_HEADER_LEN] = buffer.get(..FRAME_HEADER_LEN)?.try_into().ok()?;
    Some(u32::from_be_bytes(header) as usize)
}

fn decode_payload(payload: &[u8]) -> Result<LogEvent, FrameError> {
    serde_json::from_slice(payload).map_err(FrameError::Malformed)
}

/// Read the next event from a stream.
///
/// Returns `Ok(None)` when the peer closes before a full header arrived.
/// Payload bytes are accumulated over as many reads as the stream needs.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<LogEvent>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    let got = read_full(reader, &mut header).await?;
    if got < FRAME_HEADER_LEN {
        if got > 0 {
            debug!(bytes = got, "peer closed inside a frame header");
        }
        return Ok(None);
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }

    let mut payload = vec![0u8; len];
    let received = read_full(reader, &mut payload).await?;
    if received < len {
        return Err(FrameError::Truncated {
            expected: len,
            received,
        });
    }

    decode_payload(&payload).map(Some)
}

/// Write one event as a frame.
pub async fn write_frame<W>(writer: &mut W, event: &LogEvent) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(event)?;
    writer.write_all(&frame).await?;
    Ok(())
}

/// Fill `buf` unless EOF comes first. Returns the number of bytes read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
