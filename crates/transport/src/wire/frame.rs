//! Length-delimited frames.
//!
//! Frame format: `[length:4][kind:1][payload:N]`
//!
//! - **length**: kind byte plus payload size (little-endian u32), so never 0
//! - **kind**: frame discriminator, see [`FrameKind`]
//! - **payload**: kind-specific bytes; for `Data` one raw channel message

use super::messages::ChannelHello;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Header size: 4 (length) + 1 (kind)
pub const HEADER_SIZE: usize = 5;

/// Maximum payload of one frame (16 MiB).
///
/// Larger frames are refused on both the write and the read side.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Wire format errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("frame too large: {size} bytes (max {MAX_PAYLOAD_SIZE})")]
    FrameTooLarge { size: usize },

    #[error("invalid frame length: {length}")]
    InvalidLength { length: u32 },

    #[error("unknown frame kind: {0:#04x}")]
    UnknownKind(u8),

    #[error("malformed {kind:?} payload: {reason}")]
    MalformedPayload { kind: FrameKind, reason: String },

    #[error("stream truncated inside a frame")]
    Truncated,

    /// The TLS layer under the stream failed, e.g. a fatal alert from the peer
    #[error("tls: {0}")]
    Tls(String),

    #[error("io: {0}")]
    Io(String),
}

impl From<std::io::Error> for WireError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            WireError::Truncated
        } else if err.get_ref().is_some_and(|inner| inner.is::<rustls::Error>()) {
            WireError::Tls(err.to_string())
        } else {
            WireError::Io(err.to_string())
        }
    }
}

/// Frame discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameKind {
    Hello = 0x01,
    Accept = 0x02,
    Reject = 0x03,
    Data = 0x10,
    Close = 0x11,
    Ack = 0x12,
}

impl TryFrom<u8> for FrameKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FrameKind::Hello),
            0x02 => Ok(FrameKind::Accept),
            0x03 => Ok(FrameKind::Reject),
            0x10 => Ok(FrameKind::Data),
            0x11 => Ok(FrameKind::Close),
            0x12 => Ok(FrameKind::Ack),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

/// One unit on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Opens a channel session (client → server)
    Hello(ChannelHello),
    /// Session accepted (server → client)
    Accept,
    /// Session refused, with a human-readable reason (server → client)
    Reject(String),
    /// One raw message
    Data(Vec<u8>),
    /// End of stream from the emitting side
    Close,
    /// Close acknowledged by the consuming side
    Ack,
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Hello(_) => FrameKind::Hello,
            Frame::Accept => FrameKind::Accept,
            Frame::Reject(_) => FrameKind::Reject,
            Frame::Data(_) => FrameKind::Data,
            Frame::Close => FrameKind::Close,
            Frame::Ack => FrameKind::Ack,
        }
    }

    /// Serialize the full frame, header included
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let hello;
        let payload: &[u8] = match self {
            Frame::Hello(h) => {
                hello = bincode::serialize(h).map_err(|e| WireError::MalformedPayload {
                    kind: FrameKind::Hello,
                    reason: e.to_string(),
                })?;
                &hello
            }
            Frame::Reject(reason) => reason.as_bytes(),
            Frame::Data(data) => data,
            Frame::Accept | Frame::Close | Frame::Ack => &[],
        };

        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(WireError::FrameTooLarge {
                size: payload.len(),
            });
        }

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(&((payload.len() + 1) as u32).to_le_bytes());
        buf.push(self.kind() as u8);
        buf.extend_from_slice(payload);
        Ok(buf)
    }

    /// Rebuild a frame from its kind byte and payload
    pub fn decode(kind: u8, payload: Vec<u8>) -> Result<Self, WireError> {
        let kind = FrameKind::try_from(kind)?;
        let payload_len = payload.len();
        let expect_empty = |frame: Frame| {
            if payload_len == 0 {
                Ok(frame)
            } else {
                Err(WireError::MalformedPayload {
                    kind,
                    reason: format!("expected no payload, got {} bytes", payload_len),
                })
            }
        };

        match kind {
            FrameKind::Hello => bincode::deserialize(&payload)
                .map(Frame::Hello)
                .map_err(|e| WireError::MalformedPayload {
                    kind,
                    reason: e.to_string(),
                }),
            FrameKind::Reject => String::from_utf8(payload)
                .map(Frame::Reject)
                .map_err(|e| WireError::MalformedPayload {
                    kind,
                    reason: e.to_string(),
                }),
            FrameKind::Data => Ok(Frame::Data(payload)),
            FrameKind::Accept => expect_empty(Frame::Accept),
            FrameKind::Close => expect_empty(Frame::Close),
            FrameKind::Ack => expect_empty(Frame::Ack),
        }
    }
}

/// Write one frame and flush it
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let buf = frame.encode()?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// Returns `Ok(None)` on a clean end of stream between frames; an end of
/// stream inside a frame is `WireError::Truncated`.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(WireError::Truncated);
        }
        filled += n;
    }

    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if length == 0 {
        return Err(WireError::InvalidLength { length });
    }

    let payload_len = length as usize - 1;
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(WireError::FrameTooLarge { size: payload_len });
    }

    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).await?;

    Frame::decode(header[4], payload).map(Some)
}
