/// Errors that can occur during encapsulation encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header, a length field or an embedded item is inconsistent with the bytes present.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The payload exceeds the 16-bit length field or the configured maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The device answered with a non-zero encapsulation status.
    #[error("encapsulation status 0x{code:04X}: {description}")]
    EncapsulationStatus { code: u32, description: &'static str },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    pub(crate) fn malformed(context: impl Into<String>) -> Self {
        FrameError::MalformedFrame(context.into())
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
