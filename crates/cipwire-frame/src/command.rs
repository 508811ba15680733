//! Encapsulation command codes.
//!
//! Every encapsulation header starts with a 16-bit command. Codes the codec
//! does not know are carried through as [`Command::Unknown`] so that replies
//! can be reported rather than dropped.

/// An encapsulation command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// No operation, no reply expected.
    Nop,
    /// Query the encapsulation services a target supports.
    ListServices,
    /// Query the identity of a target (also usable over UDP broadcast).
    ListIdentity,
    /// Query the non-CIP interfaces of a target.
    ListInterfaces,
    /// Open an encapsulation session.
    RegisterSession,
    /// Close an encapsulation session.
    UnregisterSession,
    /// Request/reply transfer of unconnected messages.
    SendRRData,
    /// Transfer of connected messages.
    SendUnitData,
    /// Status indication from the target.
    IndicateStatus,
    /// Cancel a pending request.
    Cancel,
    /// A command code with no dedicated handling.
    Unknown(u16),
}

impl Command {
    /// The wire value of this command.
    pub fn code(self) -> u16 {
        match self {
            Command::Nop => 0x0000,
            Command::ListServices => 0x0004,
            Command::ListIdentity => 0x0063,
            Command::ListInterfaces => 0x0064,
            Command::RegisterSession => 0x0065,
            Command::UnregisterSession => 0x0066,
            Command::SendRRData => 0x006F,
            Command::SendUnitData => 0x0070,
            Command::IndicateStatus => 0x0072,
            Command::Cancel => 0x0073,
            Command::Unknown(code) => code,
        }
    }

    /// Human-readable name, as used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Command::Nop => "NOP",
            Command::ListServices => "ListServices",
            Command::ListIdentity => "ListIdentity",
            Command::ListInterfaces => "ListInterfaces",
            Command::RegisterSession => "RegisterSession",
            Command::UnregisterSession => "UnregisterSession",
            Command::SendRRData => "SendRRData",
            Command::SendUnitData => "SendUnitData",
            Command::IndicateStatus => "IndicateStatus",
            Command::Cancel => "Cancel",
            Command::Unknown(_) => "Unknown",
        }
    }
}

impl From<u16> for Command {
    fn from(code: u16) -> Self {
        match code {
            0x0000 => Command::Nop,
            0x0004 => Command::ListServices,
            0x0063 => Command::ListIdentity,
            0x0064 => Command::ListInterfaces,
            0x0065 => Command::RegisterSession,
            0x0066 => Command::UnregisterSession,
            0x006F => Command::SendRRData,
            0x0070 => Command::SendUnitData,
            0x0072 => Command::IndicateStatus,
            0x0073 => Command::Cancel,
            other => Command::Unknown(other),
        }
    }
}

impl From<Command> for u16 {
    fn from(command: Command) -> Self {
        command.code()
    }
}

/// Returns a description for an encapsulation header status code.
pub fn status_description(code: u32) -> &'static str {
    match code {
        0x0000 => "success",
        0x0001 => "invalid or unsupported encapsulation command",
        0x0002 => "insufficient memory resources in the receiver to handle the command",
        0x0003 => "poorly formed or incorrect data in the encapsulation message",
        0x0064 => "invalid session handle",
        0x0065 => "message of invalid length",
        0x0069 => "unsupported encapsulation protocol revision",
        _ => "unknown encapsulation status",
    }
}
