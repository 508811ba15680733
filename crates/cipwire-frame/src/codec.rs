use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::command::Command;
use crate::error::{FrameError, Result};

/// Encapsulation header: command (2) + length (2) + session (4) + status (4)
/// + sender context (8) + options (4) = 24 bytes.
pub const HEADER_SIZE: usize = 24;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Default maximum payload accepted by decoders.
pub const DEFAULT_MAX_PAYLOAD: usize = MAX_PAYLOAD;

/// Opaque 8-byte sender context echoed back by the target.
///
/// Used as the correlation token for unconnected exchanges.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SenderContext(pub [u8; 8]);

impl SenderContext {
    /// The all-zero context.
    pub const NULL: SenderContext = SenderContext([0; 8]);

    /// Build a context from a counter value (little-endian).
    pub fn from_u64(value: u64) -> Self {
        SenderContext(value.to_le_bytes())
    }

    /// Interpret the context as a little-endian counter value.
    pub fn as_u64(&self) -> u64 {
        u64::from_le_bytes(self.0)
    }
}

impl fmt::Debug for SenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SenderContext(")?;
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// An encapsulated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Encapsulation command.
    pub command: Command,
    /// Session handle assigned by RegisterSession (0 before registration).
    pub session_handle: u32,
    /// Encapsulation status (0 in requests).
    pub status: u32,
    /// Sender context echoed by the target.
    pub context: SenderContext,
    /// Options field, always 0 for current revisions.
    pub options: u32,
    /// Command-specific data.
    pub payload: Bytes,
}

impl Frame {
    /// Create a request frame with zero status and options.
    pub fn new(
        command: Command,
        session_handle: u32,
        context: SenderContext,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            command,
            session_handle,
            status: 0,
            context,
            options: 0,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode this frame into a freshly allocated buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_frame(self, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (all fields little-endian):
/// ```text
/// ┌─────────┬────────┬─────────┬────────┬──────────────┬─────────┬──────────┐
/// │ Command │ Length │ Session │ Status │ Context (8B) │ Options │ Payload  │
/// │ (2B)    │ (2B)   │ (4B)    │ (4B)   │              │ (4B)    │ (Length) │
/// └─────────┴────────┴─────────┴────────┴──────────────┴─────────┴──────────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    if frame.payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: frame.payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(frame.wire_size());
    dst.put_u16_le(frame.command.code());
    dst.put_u16_le(frame.payload.len() as u16);
    dst.put_u32_le(frame.session_handle);
    dst.put_u32_le(frame.status);
    dst.put_slice(&frame.context.0);
    dst.put_u32_le(frame.options);
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Decode a frame from a stream buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes exactly one frame; pipelined bytes stay in `src`.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let payload_len = u16::from_le_bytes([src[2], src[3]]) as usize;
    if payload_len > max_payload {
        return Err(FrameError::malformed(format!(
            "declared payload length {payload_len} exceeds maximum {max_payload}"
        )));
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None); // Need more data
    }

    let mut header = src.split_to(HEADER_SIZE);
    let command = Command::from(header.get_u16_le());
    header.advance(2);
    let session_handle = header.get_u32_le();
    let status = header.get_u32_le();
    let mut context = [0u8; 8];
    header.copy_to_slice(&mut context);
    let options = header.get_u32_le();
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        command,
        session_handle,
        status,
        context: SenderContext(context),
        options,
        payload,
    }))
}

/// Result of [`parse_frame`].
#[derive(Debug, PartialEq, Eq)]
pub enum Parsed<'a> {
    /// More bytes are needed; keep buffering. `needed` is the minimum total length.
    Incomplete { needed: usize },
    /// A complete frame and the bytes following it.
    Complete { frame: Frame, rest: &'a [u8] },
}

/// Parse one frame from a byte slice without consuming it.
///
/// The returned `rest` holds any further pipelined frames.
pub fn parse_frame(bytes: &[u8], max_payload: usize) -> Result<Parsed<'_>> {
    if bytes.len() < HEADER_SIZE {
        return Ok(Parsed::Incomplete {
            needed: HEADER_SIZE,
        });
    }
    let payload_len = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    let total = HEADER_SIZE + payload_len;
    if payload_len > max_payload {
        return Err(FrameError::malformed(format!(
            "declared payload length {payload_len} exceeds maximum {max_payload}"
        )));
    }
    if bytes.len() < total {
        return Ok(Parsed::Incomplete { needed: total });
    }

    let mut buf = BytesMut::from(&bytes[..total]);
    match decode_frame(&mut buf, max_payload)? {
        Some(frame) => Ok(Parsed::Complete {
            frame,
            rest: &bytes[total..],
        }),
        None => Ok(Parsed::Incomplete { needed: total }),
    }
}

/// Configuration for the frame reader and writer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 65535.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
