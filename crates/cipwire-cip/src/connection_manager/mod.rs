//! Connection Manager object (class 0x06).
//!
//! Builds the Forward Open / Large Forward Open / Forward Close requests that
//! set up and tear down connections, wraps requests in Unconnected Send for
//! routing, and decodes the matching replies.

mod data;
mod forward;
mod unconnected;

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::class;
use crate::epath::EPath;
use crate::error::{CipError, Result};

pub use data::{get_connection_data, search_connection_data, ConnectionData, DirectionData};
pub use forward::{
    forward_close, forward_open, ConnectionDescriptor, ForwardCloseReply, ForwardOpenReply,
    DEFAULT_O_T_RPI, DEFAULT_ORIGINATOR_SERIAL, DEFAULT_TIMEOUT_MULTIPLIER,
    DEFAULT_TRANSPORT_CLASS_TRIGGER, DEFAULT_T_O_RPI, DEFAULT_VENDOR_ID,
};
pub use unconnected::{
    unconnected_send, unconnected_send_status, unwrap_unconnected_reply, UnconnectedSendStatus,
};

pub const FORWARD_CLOSE: u8 = 0x4E;
pub const UNCONNECTED_SEND: u8 = 0x52;
pub const FORWARD_OPEN: u8 = 0x54;
pub const GET_CONNECTION_DATA: u8 = 0x56;
pub const SEARCH_CONNECTION_DATA: u8 = 0x57;
pub const GET_CONNECTION_OWNER: u8 = 0x5A;
pub const LARGE_FORWARD_OPEN: u8 = 0x5B;

/// Name of a Connection Manager service.
pub fn service_name(code: u8) -> Option<&'static str> {
    let name = match code & 0x7F {
        FORWARD_CLOSE => "Forward_Close",
        UNCONNECTED_SEND => "Unconnected_Send",
        FORWARD_OPEN => "Forward_Open",
        GET_CONNECTION_DATA => "Get_Connection_Data",
        SEARCH_CONNECTION_DATA => "Search_Connection_Data",
        GET_CONNECTION_OWNER => "Get_Connection_Owner",
        LARGE_FORWARD_OPEN => "Large_Forward_Open",
        _ => return None,
    };
    Some(name)
}

/// Path of the Connection Manager instance: class 6, instance 1.
pub fn path() -> EPath {
    EPath::object(u32::from(class::CONNECTION_MANAGER), 1)
}

/// Priority/tick time and timeout ticks of a Connection Manager request.
///
/// The request times out after `2^tick_time` ms × `timeout_ticks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub tick_time: u8,
    pub timeout_ticks: u8,
}

impl Timing {
    /// 64 ms × 156 ≈ 9.98 s.
    pub const DEFAULT: Timing = Timing::new(6, 156);
    /// 4 ms × 125 = 500 ms.
    pub const FORWARD_CLOSE: Timing = Timing::new(2, 125);

    pub const fn new(tick_time: u8, timeout_ticks: u8) -> Self {
        Self {
            tick_time,
            timeout_ticks,
        }
    }

    /// The smallest tick time able to express `timeout` within 255 ticks.
    pub fn from_timeout(timeout: Duration) -> Self {
        let millis = timeout.as_millis().max(1);
        for tick_time in 0u8..16 {
            let tick = 1u128 << tick_time;
            let ticks = millis.div_ceil(tick);
            if ticks <= 255 {
                return Timing::new(tick_time, ticks as u8);
            }
        }
        Timing::new(15, 255)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis((1u64 << (self.tick_time & 0x0F)) * u64::from(self.timeout_ticks))
    }

    pub(crate) fn encode_into(&self, dst: &mut BytesMut) {
        // Priority bit stays 0.
        dst.put_u8(self.tick_time & 0x0F);
        dst.put_u8(self.timeout_ticks);
    }
}

impl Default for Timing {
    fn default() -> Self {
        Timing::DEFAULT
    }
}

/// Connection serial number and connection ids for one Forward Open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionIds {
    pub connection_serial: u16,
    pub o_t_connection_id: u32,
    pub t_o_connection_id: u32,
}

/// Hands out connection serial numbers and proposed connection ids.
///
/// Every counter is incremented before use and wraps.
#[derive(Debug, Clone)]
pub struct ConnectionIdAllocator {
    connection_serial: u16,
    o_t_connection_id: u32,
    t_o_connection_id: u32,
}

impl ConnectionIdAllocator {
    pub const SERIAL_SEED: u16 = 0x0001;
    pub const O_T_SEED: u32 = 0x2000_0002;
    pub const T_O_SEED: u32 = 0x2000_0001;

    pub fn new() -> Self {
        Self::with_seeds(Self::SERIAL_SEED, Self::O_T_SEED, Self::T_O_SEED)
    }

    pub fn with_seeds(connection_serial: u16, o_t_connection_id: u32, t_o_connection_id: u32) -> Self {
        Self {
            connection_serial,
            o_t_connection_id,
            t_o_connection_id,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> ConnectionIds {
        self.connection_serial = self.connection_serial.wrapping_add(1);
        self.o_t_connection_id = self.o_t_connection_id.wrapping_add(1);
        self.t_o_connection_id = self.t_o_connection_id.wrapping_add(1);
        ConnectionIds {
            connection_serial: self.connection_serial,
            o_t_connection_id: self.o_t_connection_id,
            t_o_connection_id: self.t_o_connection_id,
        }
    }
}

impl Default for ConnectionIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection type field of the network connection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Null,
    Multicast,
    PointToPoint,
    Reserved,
}

impl ConnectionType {
    fn bits(self) -> u8 {
        match self {
            ConnectionType::Null => 0,
            ConnectionType::Multicast => 1,
            ConnectionType::PointToPoint => 2,
            ConnectionType::Reserved => 3,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => ConnectionType::Null,
            1 => ConnectionType::Multicast,
            2 => ConnectionType::PointToPoint,
            _ => ConnectionType::Reserved,
        }
    }
}

/// Priority field of the network connection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPriority {
    Low,
    High,
    Scheduled,
    Urgent,
}

impl ConnectionPriority {
    fn bits(self) -> u8 {
        match self {
            ConnectionPriority::Low => 0,
            ConnectionPriority::High => 1,
            ConnectionPriority::Scheduled => 2,
            ConnectionPriority::Urgent => 3,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => ConnectionPriority::Low,
            1 => ConnectionPriority::High,
            2 => ConnectionPriority::Scheduled,
            _ => ConnectionPriority::Urgent,
        }
    }
}

/// Network connection parameters of one direction.
///
/// Packed as 16 bits in Forward Open and 32 bits in Large Forward Open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConnectionParameters {
    pub redundant_owner: bool,
    pub connection_type: ConnectionType,
    pub priority: ConnectionPriority,
    /// Variable (true) or fixed (false) connection size.
    pub variable_size: bool,
    /// Connection size in bytes.
    pub size: u16,
}

impl NetworkConnectionParameters {
    /// Largest size the 16-bit form can carry.
    pub const MAX_SMALL_SIZE: u16 = 0x01FF;

    /// Low priority, variable size, point-to-point.
    pub fn point_to_point(size: u16) -> Self {
        Self {
            redundant_owner: false,
            connection_type: ConnectionType::PointToPoint,
            priority: ConnectionPriority::Low,
            variable_size: true,
            size,
        }
    }

    pub fn to_u16(&self) -> Result<u16> {
        if self.size > Self::MAX_SMALL_SIZE {
            return Err(CipError::encode(format!(
                "connection size {} needs a large forward open",
                self.size
            )));
        }
        Ok((u16::from(self.redundant_owner) << 15)
            | (u16::from(self.connection_type.bits()) << 13)
            | (u16::from(self.priority.bits()) << 10)
            | (u16::from(self.variable_size) << 9)
            | self.size)
    }

    pub fn to_u32(&self) -> u32 {
        (u32::from(self.redundant_owner) << 31)
            | (u32::from(self.connection_type.bits()) << 29)
            | (u32::from(self.priority.bits()) << 26)
            | (u32::from(self.variable_size) << 25)
            | u32::from(self.size)
    }

    pub fn from_u16(raw: u16) -> Self {
        Self {
            redundant_owner: raw & 0x8000 != 0,
            connection_type: ConnectionType::from_bits((raw >> 13) as u8),
            priority: ConnectionPriority::from_bits((raw >> 10) as u8),
            variable_size: raw & 0x0200 != 0,
            size: raw & Self::MAX_SMALL_SIZE,
        }
    }

    pub fn from_u32(raw: u32) -> Self {
        Self {
            redundant_owner: raw & 0x8000_0000 != 0,
            connection_type: ConnectionType::from_bits((raw >> 29) as u8),
            priority: ConnectionPriority::from_bits((raw >> 26) as u8),
            variable_size: raw & 0x0200_0000 != 0,
            size: raw as u16,
        }
    }
}

impl Default for NetworkConnectionParameters {
    fn default() -> Self {
        Self::point_to_point(500)
    }
}
