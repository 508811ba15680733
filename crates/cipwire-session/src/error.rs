use std::time::Duration;

use cipwire_cip::CipError;
use cipwire_frame::FrameError;

use crate::state::ConnectionState;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Encapsulation-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// CIP-level error, including non-zero reply status.
    #[error("cip error: {0}")]
    Cip(#[from] CipError),

    /// The Forward Open was refused, garbled or never answered.
    #[error("connection rejected: {0}")]
    ConnectionRejected(#[source] Box<SessionError>),

    /// The operation is not allowed in the current connection state.
    #[error("cannot {operation} while connection is {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    /// The next sequence count still has a request outstanding.
    #[error("sequence count {0} is still outstanding")]
    SequenceInUse(u16),

    /// No reply arrived before the deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The pending request was dropped by a close or a lost connection.
    #[error("request cancelled")]
    Cancelled,

    /// The target closed the stream.
    #[error("target disconnected: {0}")]
    Disconnected(String),

    /// A reply arrived that does not fit the exchange in progress.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl SessionError {
    pub(crate) fn rejected(cause: impl Into<SessionError>) -> Self {
        SessionError::ConnectionRejected(Box::new(cause.into()))
    }

    /// The failure behind a [`SessionError::ConnectionRejected`].
    pub fn rejection(&self) -> Option<&SessionError> {
        match self {
            SessionError::ConnectionRejected(cause) => Some(cause),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
