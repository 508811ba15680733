//! Common Packet Format.
//!
//! SendRRData, SendUnitData and the List* replies carry a CPF packet: an item
//! count followed by `(type id, length, data)` items.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Null address item (unconnected messages).
pub const NULL_ADDRESS: u16 = 0x0000;
/// ListIdentity reply item.
pub const LIST_IDENTITY: u16 = 0x000C;
/// Connected address item, carries the connection id.
pub const CONNECTED_ADDRESS: u16 = 0x00A1;
/// Connected transport packet.
pub const CONNECTED_DATA: u16 = 0x00B1;
/// Unconnected message.
pub const UNCONNECTED_DATA: u16 = 0x00B2;
/// ListServices reply item.
pub const LIST_SERVICES: u16 = 0x0100;
/// Socket address info, originator to target.
pub const SOCKADDR_O_T: u16 = 0x8000;
/// Socket address info, target to originator.
pub const SOCKADDR_T_O: u16 = 0x8001;
/// Sequenced address item.
pub const SEQUENCED_ADDRESS: u16 = 0x8002;

/// Returns the name of a CPF item type id.
pub fn item_name(type_id: u16) -> &'static str {
    match type_id {
        NULL_ADDRESS => "NullAddress",
        LIST_IDENTITY => "ListIdentity",
        CONNECTED_ADDRESS => "ConnectedAddress",
        CONNECTED_DATA => "ConnectedData",
        UNCONNECTED_DATA => "UnconnectedData",
        LIST_SERVICES => "ListServices",
        SOCKADDR_O_T => "SockaddrOtoT",
        SOCKADDR_T_O => "SockaddrTtoO",
        SEQUENCED_ADDRESS => "SequencedAddress",
        _ => "Unknown",
    }
}

/// A single CPF item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpfItem {
    pub type_id: u16,
    pub data: Bytes,
}

impl CpfItem {
    pub fn new(type_id: u16, data: impl Into<Bytes>) -> Self {
        Self {
            type_id,
            data: data.into(),
        }
    }

    /// A null address item.
    pub fn null_address() -> Self {
        Self::new(NULL_ADDRESS, Bytes::new())
    }

    /// A connected address item for the given connection id.
    pub fn connected_address(connection_id: u32) -> Self {
        Self::new(CONNECTED_ADDRESS, connection_id.to_le_bytes().to_vec())
    }

    /// The connection id of a connected address item, if this is one.
    pub fn connection_id(&self) -> Option<u32> {
        if self.type_id != CONNECTED_ADDRESS || self.data.len() < 4 {
            return None;
        }
        Some(u32::from_le_bytes([
            self.data[0],
            self.data[1],
            self.data[2],
            self.data[3],
        ]))
    }
}

/// Encode CPF items, including the leading item count.
pub fn encode_items(items: &[CpfItem], dst: &mut BytesMut) -> Result<()> {
    let count = u16::try_from(items.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: items.len(),
        max: u16::MAX as usize,
    })?;
    dst.put_u16_le(count);
    for item in items {
        let len = u16::try_from(item.data.len()).map_err(|_| FrameError::PayloadTooLarge {
            size: item.data.len(),
            max: u16::MAX as usize,
        })?;
        dst.put_u16_le(item.type_id);
        dst.put_u16_le(len);
        dst.put_slice(&item.data);
    }
    Ok(())
}

/// Decode a CPF packet. Bytes after the last item are ignored.
pub fn decode_items(mut src: &[u8]) -> Result<Vec<CpfItem>> {
    if src.len() < 2 {
        return Err(FrameError::malformed("CPF packet shorter than item count"));
    }
    let count = src.get_u16_le() as usize;
    let mut items = Vec::with_capacity(count.min(16));
    for index in 0..count {
        if src.len() < 4 {
            return Err(FrameError::malformed(format!(
                "CPF item {index} header truncated"
            )));
        }
        let type_id = src.get_u16_le();
        let len = src.get_u16_le() as usize;
        if src.len() < len {
            return Err(FrameError::malformed(format!(
                "CPF item {index} ({}) declares {len} bytes, {} present",
                item_name(type_id),
                src.len()
            )));
        }
        let data = Bytes::copy_from_slice(&src[..len]);
        src.advance(len);
        items.push(CpfItem { type_id, data });
    }
    Ok(items)
}

/// Find the first item of a given type.
pub fn find_item(items: &[CpfItem], type_id: u16) -> Option<&CpfItem> {
    items.iter().find(|item| item.type_id == type_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_unconnected_pair() {
        let items = [
            CpfItem::null_address(),
            CpfItem::new(UNCONNECTED_DATA, vec![0x0E, 0x02]),
        ];
        let mut buf = BytesMut::new();
        encode_items(&items, &mut buf).unwrap();
        assert_eq!(
            buf.as_ref(),
            &[0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0xB2, 0x00, 0x02, 0x00, 0x0E, 0x02]
        );
    }

    #[test]
    fn decodes_connected_pair() {
        let bytes = [
            0x02, 0x00, // count
            0xA1, 0x00, 0x04, 0x00, 0x01, 0x00, 0x00, 0x20, // address
            0xB1, 0x00, 0x04, 0x00, 0x07, 0x00, 0xCC, 0x00, // data
        ];
        let items = decode_items(&bytes).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].connection_id(), Some(0x2000_0001));
        assert_eq!(items[1].type_id, CONNECTED_DATA);
        assert_eq!(items[1].data.as_ref(), &[0x07, 0x00, 0xCC, 0x00]);
    }

    #[test]
    fn truncated_item_is_malformed() {
        let bytes = [0x01, 0x00, 0xB2, 0x00, 0x08, 0x00, 0x01, 0x02];
        let err = decode_items(&bytes).unwrap_err();
        assert!(matches!(err, FrameError::MalformedFrame(_)));

        let err = decode_items(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0xB2]).unwrap_err();
        assert!(matches!(err, FrameError::MalformedFrame(_)));
    }

    #[test]
    fn missing_count_is_malformed() {
        assert!(matches!(
            decode_items(&[0x01]).unwrap_err(),
            FrameError::MalformedFrame(_)
        ));
    }

    #[test]
    fn find_and_names() {
        let items = vec![
            CpfItem::null_address(),
            CpfItem::new(UNCONNECTED_DATA, Bytes::from_static(b"x")),
        ];
        assert_eq!(
            find_item(&items, UNCONNECTED_DATA).map(|i| i.data.as_ref()),
            Some(b"x".as_ref())
        );
        assert!(find_item(&items, CONNECTED_DATA).is_none());
        assert_eq!(item_name(SEQUENCED_ADDRESS), "SequencedAddress");
        assert_eq!(CpfItem::null_address().connection_id(), None);
    }
}
