use std::fmt;

/// Life cycle of one connection.
///
/// ```text
/// Closed -> Opening -> Established -> Closing -> Closed
///              \-> Closed (rejected)      \-> Established (close failed)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Closed,
    /// A Forward Open is outstanding.
    Opening,
    Established,
    /// A Forward Close is outstanding.
    Closing,
}

impl ConnectionState {
    pub fn name(self) -> &'static str {
        match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Opening => "opening",
            ConnectionState::Established => "established",
            ConnectionState::Closing => "closing",
        }
    }

    /// Whether connected sends are accepted.
    pub fn is_established(self) -> bool {
        self == ConnectionState::Established
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
