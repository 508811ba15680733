/// Errors raised by the CIP codecs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipError {
    /// A path could not be decoded, or uses a segment type that is not supported.
    #[error("malformed path at byte {offset}: {reason}")]
    MalformedPath { offset: usize, reason: String },

    /// A symbolic tag name could not be parsed.
    #[error("invalid symbol {symbol:?}: {reason}")]
    InvalidSymbol { symbol: String, reason: String },

    /// A Message Router reply or service-specific reply body is inconsistent.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// The reply answers a different service than the one requested.
    #[error("reply service 0x{actual:02X} does not answer request service 0x{expected:02X}")]
    ServiceMismatch { expected: u8, actual: u8 },

    /// The target reported a non-zero general status.
    #[error("service 0x{service:02X} failed with status 0x{general:02X}{}: {description}", format_extended(.extended))]
    ProtocolStatus {
        service: u8,
        class: Option<u16>,
        general: u8,
        extended: Vec<u16>,
        description: &'static str,
        /// Route words the router had not consumed when a routing failure
        /// stopped an Unconnected Send.
        remaining_path_words: Option<u8>,
    },

    /// A value does not fit its wire field.
    #[error("cannot encode: {0}")]
    Encode(String),
}

fn format_extended(extended: &[u16]) -> String {
    if extended.is_empty() {
        return String::new();
    }
    let words: Vec<String> = extended.iter().map(|w| format!("0x{w:04X}")).collect();
    format!(" (extended {})", words.join(", "))
}

impl CipError {
    pub(crate) fn malformed_path(offset: usize, reason: impl Into<String>) -> Self {
        CipError::MalformedPath {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_reply(reason: impl Into<String>) -> Self {
        CipError::MalformedReply(reason.into())
    }

    pub(crate) fn encode(reason: impl Into<String>) -> Self {
        CipError::Encode(reason.into())
    }

    /// The general status, when this is a [`CipError::ProtocolStatus`].
    pub fn general_status(&self) -> Option<u8> {
        match self {
            CipError::ProtocolStatus { general, .. } => Some(*general),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CipError>;
