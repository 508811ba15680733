//! Builders for outbound encapsulation requests.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{Frame, SenderContext};
use crate::command::Command;
use crate::cpf::{self, CpfItem};
use crate::error::Result;

/// Encapsulation protocol version sent in RegisterSession.
pub const PROTOCOL_VERSION: u16 = 1;

/// Interface handle for CIP, always 0.
pub const CIP_INTERFACE_HANDLE: u32 = 0;

/// RegisterSession with protocol version 1 and no options.
pub fn register_session(context: SenderContext) -> Frame {
    let mut payload = BytesMut::with_capacity(4);
    payload.put_u16_le(PROTOCOL_VERSION);
    payload.put_u16_le(0);
    Frame::new(Command::RegisterSession, 0, context, payload.freeze())
}

/// UnregisterSession for an established session. The target sends no reply.
pub fn unregister_session(session_handle: u32, context: SenderContext) -> Frame {
    Frame::new(Command::UnregisterSession, session_handle, context, Bytes::new())
}

pub fn list_identity(context: SenderContext) -> Frame {
    Frame::new(Command::ListIdentity, 0, context, Bytes::new())
}

pub fn list_services(context: SenderContext) -> Frame {
    Frame::new(Command::ListServices, 0, context, Bytes::new())
}

pub fn list_interfaces(context: SenderContext) -> Frame {
    Frame::new(Command::ListInterfaces, 0, context, Bytes::new())
}

/// NOP carrying arbitrary data. The target sends no reply.
pub fn nop(data: impl Into<Bytes>) -> Frame {
    Frame::new(Command::Nop, 0, SenderContext::NULL, data)
}

/// SendRRData carrying an unconnected message (null address + unconnected data).
///
/// `timeout` is the encapsulation-level timeout in seconds; 0 leaves it to the
/// CIP layer.
pub fn send_rr_data(
    session_handle: u32,
    context: SenderContext,
    timeout: u16,
    message: &[u8],
) -> Result<Frame> {
    let items = [
        CpfItem::null_address(),
        CpfItem::new(cpf::UNCONNECTED_DATA, Bytes::copy_from_slice(message)),
    ];
    let payload = send_data_payload(timeout, &items)?;
    Ok(Frame::new(Command::SendRRData, session_handle, context, payload))
}

/// SendUnitData carrying a connected transport packet.
///
/// `packet` already starts with the 16-bit sequence count.
pub fn send_unit_data(session_handle: u32, connection_id: u32, packet: &[u8]) -> Result<Frame> {
    let items = [
        CpfItem::connected_address(connection_id),
        CpfItem::new(cpf::CONNECTED_DATA, Bytes::copy_from_slice(packet)),
    ];
    let payload = send_data_payload(0, &items)?;
    Ok(Frame::new(
        Command::SendUnitData,
        session_handle,
        SenderContext::NULL,
        payload,
    ))
}

fn send_data_payload(timeout: u16, items: &[CpfItem]) -> Result<Bytes> {
    let size: usize = 8 + items.iter().map(|i| 4 + i.data.len()).sum::<usize>();
    let mut payload = BytesMut::with_capacity(size);
    payload.put_u32_le(CIP_INTERFACE_HANDLE);
    payload.put_u16_le(timeout);
    cpf::encode_items(items, &mut payload)?;
    Ok(payload.freeze())
}
