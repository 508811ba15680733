//! Per-command decoding of encapsulation replies.

use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::{Buf, Bytes};
use tracing::warn;

use crate::codec::Frame;
use crate::command::{status_description, Command};
use crate::cpf::{self, CpfItem};
use crate::error::{FrameError, Result};

/// Decoded reply, one variant per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncapsulationReply {
    RegisterSession {
        session_handle: u32,
        protocol_version: u16,
        options: u16,
    },
    UnregisterSession,
    Nop,
    SendRRData(SendData),
    SendUnitData(SendData),
    ListIdentity(Vec<IdentityItem>),
    ListServices(Vec<ServiceItem>),
    ListInterfaces(Vec<InterfaceItem>),
    IndicateStatus(Bytes),
    Cancel(Bytes),
    /// A command with no parser. Logged and passed through.
    Unknown { command: u16, payload: Bytes },
}

/// SendRRData / SendUnitData body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendData {
    pub interface_handle: u32,
    pub timeout: u16,
    pub items: Vec<CpfItem>,
}

impl SendData {
    /// The unconnected message item, if present.
    pub fn unconnected_data(&self) -> Option<&Bytes> {
        cpf::find_item(&self.items, cpf::UNCONNECTED_DATA).map(|item| &item.data)
    }

    /// The connection id from the connected address item, if present.
    pub fn connection_id(&self) -> Option<u32> {
        cpf::find_item(&self.items, cpf::CONNECTED_ADDRESS).and_then(CpfItem::connection_id)
    }

    /// The connected transport packet, if present.
    pub fn connected_data(&self) -> Option<&Bytes> {
        cpf::find_item(&self.items, cpf::CONNECTED_DATA).map(|item| &item.data)
    }
}

/// Identity state attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityState {
    Nonexistent,
    SelfTesting,
    Standby,
    Operational,
    MajorRecoverableFault,
    MajorUnrecoverableFault,
    Default,
    Other(u8),
}

impl From<u8> for IdentityState {
    fn from(value: u8) -> Self {
        match value {
            0 => IdentityState::Nonexistent,
            1 => IdentityState::SelfTesting,
            2 => IdentityState::Standby,
            3 => IdentityState::Operational,
            4 => IdentityState::MajorRecoverableFault,
            5 => IdentityState::MajorUnrecoverableFault,
            255 => IdentityState::Default,
            other => IdentityState::Other(other),
        }
    }
}

/// One ListIdentity item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityItem {
    pub protocol_version: u16,
    /// Socket address, transmitted big-endian.
    pub socket_family: i16,
    pub socket_address: SocketAddrV4,
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    pub revision: (u8, u8),
    pub status: u16,
    pub serial_number: u32,
    pub product_name: String,
    pub state: IdentityState,
}

/// One ListServices item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceItem {
    pub type_id: u16,
    pub version: u16,
    pub flags: u16,
    pub name: String,
}

impl ServiceItem {
    /// Flag bit 5.
    pub fn supports_tcp(&self) -> bool {
        self.flags & (1 << 5) != 0
    }

    /// Flag bit 8.
    pub fn supports_udp_class01(&self) -> bool {
        self.flags & (1 << 8) != 0
    }
}

/// One ListInterfaces item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceItem {
    pub type_id: u16,
    pub interface_handle: Option<u32>,
    pub data: Bytes,
}

/// Decode a reply frame into its per-command form.
///
/// A non-zero encapsulation status is returned as
/// [`FrameError::EncapsulationStatus`].
pub fn decode_reply(frame: &Frame) -> Result<EncapsulationReply> {
    if frame.status != 0 {
        return Err(FrameError::EncapsulationStatus {
            code: frame.status,
            description: status_description(frame.status),
        });
    }

    let payload = frame.payload.as_ref();
    let reply = match frame.command {
        Command::RegisterSession => {
            let mut buf = payload;
            if buf.len() < 4 {
                return Err(FrameError::malformed("RegisterSession reply shorter than 4 bytes"));
            }
            EncapsulationReply::RegisterSession {
                session_handle: frame.session_handle,
                protocol_version: buf.get_u16_le(),
                options: buf.get_u16_le(),
            }
        }
        Command::UnregisterSession => EncapsulationReply::UnregisterSession,
        Command::Nop => EncapsulationReply::Nop,
        Command::SendRRData => EncapsulationReply::SendRRData(decode_send_data(payload)?),
        Command::SendUnitData => EncapsulationReply::SendUnitData(decode_send_data(payload)?),
        Command::ListIdentity => EncapsulationReply::ListIdentity(
            cpf::decode_items(payload)?
                .iter()
                .filter(|item| item.type_id == cpf::LIST_IDENTITY)
                .map(|item| decode_identity(&item.data))
                .collect::<Result<_>>()?,
        ),
        Command::ListServices => EncapsulationReply::ListServices(
            cpf::decode_items(payload)?
                .iter()
                .map(decode_service)
                .collect::<Result<_>>()?,
        ),
        Command::ListInterfaces => EncapsulationReply::ListInterfaces(
            cpf::decode_items(payload)?
                .into_iter()
                .map(|item| InterfaceItem {
                    type_id: item.type_id,
                    interface_handle: (item.data.len() >= 4).then(|| {
                        u32::from_le_bytes([item.data[0], item.data[1], item.data[2], item.data[3]])
                    }),
                    data: item.data,
                })
                .collect(),
        ),
        Command::IndicateStatus => EncapsulationReply::IndicateStatus(frame.payload.clone()),
        Command::Cancel => EncapsulationReply::Cancel(frame.payload.clone()),
        Command::Unknown(command) => {
            warn!(command, len = payload.len(), "reply for unknown encapsulation command");
            EncapsulationReply::Unknown {
                command,
                payload: frame.payload.clone(),
            }
        }
    };
    Ok(reply)
}

fn decode_send_data(payload: &[u8]) -> Result<SendData> {
    let mut buf = payload;
    if buf.len() < 6 {
        return Err(FrameError::malformed("send data reply shorter than 6-byte prefix"));
    }
    let interface_handle = buf.get_u32_le();
    let timeout = buf.get_u16_le();
    Ok(SendData {
        interface_handle,
        timeout,
        items: cpf::decode_items(buf)?,
    })
}

fn decode_identity(data: &[u8]) -> Result<IdentityItem> {
    // version + sockaddr + vendor/type/code + revision + status + serial + name length
    const FIXED: usize = 2 + 16 + 6 + 2 + 2 + 4 + 1;
    let mut buf = data;
    if buf.len() < FIXED {
        return Err(FrameError::malformed(format!(
            "ListIdentity item of {} bytes, at least {FIXED} required",
            data.len()
        )));
    }
    let protocol_version = buf.get_u16_le();
    let socket_family = buf.get_i16();
    let port = buf.get_u16();
    let addr = Ipv4Addr::from(buf.get_u32());
    buf.advance(8);
    let vendor_id = buf.get_u16_le();
    let device_type = buf.get_u16_le();
    let product_code = buf.get_u16_le();
    let revision = (buf.get_u8(), buf.get_u8());
    let status = buf.get_u16_le();
    let serial_number = buf.get_u32_le();
    let name_len = buf.get_u8() as usize;
    if buf.len() < name_len + 1 {
        return Err(FrameError::malformed("ListIdentity product name truncated"));
    }
    let product_name = String::from_utf8_lossy(&buf[..name_len]).into_owned();
    buf.advance(name_len);
    let state = IdentityState::from(buf.get_u8());

    Ok(IdentityItem {
        protocol_version,
        socket_family,
        socket_address: SocketAddrV4::new(addr, port),
        vendor_id,
        device_type,
        product_code,
        revision,
        status,
        serial_number,
        product_name,
        state,
    })
}

fn decode_service(item: &CpfItem) -> Result<ServiceItem> {
    let mut buf = item.data.as_ref();
    if buf.len() < 4 + 16 {
        return Err(FrameError::malformed("ListServices item shorter than 20 bytes"));
    }
    let version = buf.get_u16_le();
    let flags = buf.get_u16_le();
    let name_bytes = &buf[..16];
    let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(16);
    Ok(ServiceItem {
        type_id: item.type_id,
        version,
        flags,
        name: String::from_utf8_lossy(&name_bytes[..end]).into_owned(),
    })
}
