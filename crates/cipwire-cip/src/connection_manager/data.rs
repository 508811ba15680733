use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{path, GET_CONNECTION_DATA, SEARCH_CONNECTION_DATA};
use crate::error::{CipError, Result};
use crate::router::Request;

const CONNECTION_DATA_LEN: usize = 56;

/// Get Connection Data for the connection with number `connection_number`.
pub fn get_connection_data(connection_number: u16) -> Result<Request> {
    Request::new(
        GET_CONNECTION_DATA,
        &path(),
        Bytes::copy_from_slice(&connection_number.to_le_bytes()),
    )
}

/// Search Connection Data by the connection triad.
pub fn search_connection_data(
    connection_serial: u16,
    vendor_id: u16,
    originator_serial: u32,
) -> Result<Request> {
    let mut data = BytesMut::with_capacity(8);
    data.put_u16_le(connection_serial);
    data.put_u16_le(vendor_id);
    data.put_u32_le(originator_serial);
    Request::new(SEARCH_CONNECTION_DATA, &path(), data.freeze())
}

/// One direction of a connection as the target sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionData {
    pub originator_connection_id: u32,
    pub target_connection_id: u32,
    pub timeout_multiplier: u8,
    /// Requested packet interval in microseconds.
    pub rpi: u32,
    /// Actual packet interval in microseconds.
    pub api: u32,
}

impl DirectionData {
    fn decode(buf: &mut &[u8]) -> Self {
        let originator_connection_id = buf.get_u32_le();
        let target_connection_id = buf.get_u32_le();
        let timeout_multiplier = buf.get_u8();
        buf.advance(3);
        let rpi = buf.get_u32_le();
        let api = buf.get_u32_le();
        Self {
            originator_connection_id,
            target_connection_id,
            timeout_multiplier,
            rpi,
            api,
        }
    }

    fn encode_into(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.originator_connection_id);
        dst.put_u32_le(self.target_connection_id);
        dst.put_u8(self.timeout_multiplier);
        dst.put_slice(&[0, 0, 0]);
        dst.put_u32_le(self.rpi);
        dst.put_u32_le(self.api);
    }
}

/// Reply data of Get Connection Data and Search Connection Data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionData {
    pub connection_number: u16,
    pub connection_state: u16,
    pub originator_port: u16,
    pub target_port: u16,
    pub connection_serial: u16,
    pub vendor_id: u16,
    pub originator_serial: u32,
    pub o_t: DirectionData,
    pub t_o: DirectionData,
}

impl ConnectionData {
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < CONNECTION_DATA_LEN {
            return Err(CipError::malformed_reply(format!(
                "connection data of {} bytes, {CONNECTION_DATA_LEN} required",
                data.len()
            )));
        }
        let mut buf = data;
        Ok(Self {
            connection_number: buf.get_u16_le(),
            connection_state: buf.get_u16_le(),
            originator_port: buf.get_u16_le(),
            target_port: buf.get_u16_le(),
            connection_serial: buf.get_u16_le(),
            vendor_id: buf.get_u16_le(),
            originator_serial: buf.get_u32_le(),
            o_t: DirectionData::decode(&mut buf),
            t_o: DirectionData::decode(&mut buf),
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(CONNECTION_DATA_LEN);
        dst.put_u16_le(self.connection_number);
        dst.put_u16_le(self.connection_state);
        dst.put_u16_le(self.originator_port);
        dst.put_u16_le(self.target_port);
        dst.put_u16_le(self.connection_serial);
        dst.put_u16_le(self.vendor_id);
        dst.put_u32_le(self.originator_serial);
        self.o_t.encode_into(&mut dst);
        self.t_o.encode_into(&mut dst);
        dst.freeze()
    }
}
