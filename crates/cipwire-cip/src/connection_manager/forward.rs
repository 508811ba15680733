use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use super::{
    path, ConnectionIdAllocator, NetworkConnectionParameters, Timing, FORWARD_CLOSE,
    FORWARD_OPEN, LARGE_FORWARD_OPEN,
};
use crate::epath::EPath;
use crate::error::{CipError, Result};
use crate::router::Request;

pub const DEFAULT_VENDOR_ID: u16 = 0x1337;
pub const DEFAULT_ORIGINATOR_SERIAL: u32 = 42;
/// Connection timeout is RPI × `4 << multiplier`.
pub const DEFAULT_TIMEOUT_MULTIPLIER: u8 = 3;
/// Requested packet interval, originator to target, in microseconds.
pub const DEFAULT_O_T_RPI: u32 = 0x0020_1234;
/// Requested packet interval, target to originator, in microseconds.
pub const DEFAULT_T_O_RPI: u32 = 0x0020_4001;
/// Server direction, application object trigger, transport class 3.
pub const DEFAULT_TRANSPORT_CLASS_TRIGGER: u8 = 0xA3;

const FORWARD_OPEN_FIXED_LEN: usize = 36;
const FORWARD_OPEN_REPLY_FIXED_LEN: usize = 26;
const FORWARD_CLOSE_REPLY_FIXED_LEN: usize = 10;

/// Everything needed to open and later close one connection.
///
/// The connection ids and actual packet intervals are only known once a
/// Forward Open reply has been applied; they are cleared again by
/// [`ConnectionDescriptor::invalidate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub vendor_id: u16,
    pub originator_serial: u32,
    pub connection_serial: u16,
    pub o_t_connection_id: Option<u32>,
    pub t_o_connection_id: Option<u32>,
    pub o_t_rpi: u32,
    pub t_o_rpi: u32,
    pub o_t_api: Option<u32>,
    pub t_o_api: Option<u32>,
    pub timeout_multiplier: u8,
    pub transport_class_trigger: u8,
    pub o_t_parameters: NetworkConnectionParameters,
    pub t_o_parameters: NetworkConnectionParameters,
    /// Connection path: route to the target followed by the application path.
    pub route: EPath,
    /// Use Large Forward Open with 32-bit connection parameters.
    pub large: bool,
    pub timing: Timing,
}

impl ConnectionDescriptor {
    pub fn new(route: EPath) -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            originator_serial: DEFAULT_ORIGINATOR_SERIAL,
            connection_serial: 0,
            o_t_connection_id: None,
            t_o_connection_id: None,
            o_t_rpi: DEFAULT_O_T_RPI,
            t_o_rpi: DEFAULT_T_O_RPI,
            o_t_api: None,
            t_o_api: None,
            timeout_multiplier: DEFAULT_TIMEOUT_MULTIPLIER,
            transport_class_trigger: DEFAULT_TRANSPORT_CLASS_TRIGGER,
            o_t_parameters: NetworkConnectionParameters::default(),
            t_o_parameters: NetworkConnectionParameters::default(),
            route,
            large: false,
            timing: Timing::DEFAULT,
        }
    }

    /// Set both directions to a point-to-point connection of `size` bytes.
    pub fn with_connection_size(mut self, size: u16) -> Self {
        self.o_t_parameters.size = size;
        self.t_o_parameters.size = size;
        self
    }

    /// Whether a Forward Open reply has been applied.
    pub fn is_open(&self) -> bool {
        self.o_t_connection_id.is_some() && self.t_o_connection_id.is_some()
    }

    /// Take the target's ids and actual packet intervals from a Forward Open reply.
    pub fn apply_open_reply(&mut self, reply: &ForwardOpenReply) -> Result<()> {
        if reply.connection_serial != self.connection_serial
            || reply.vendor_id != self.vendor_id
            || reply.originator_serial != self.originator_serial
        {
            return Err(CipError::malformed_reply(format!(
                "forward open reply for connection {:04X}/{:04X}/{:08X}, expected {:04X}/{:04X}/{:08X}",
                reply.connection_serial,
                reply.vendor_id,
                reply.originator_serial,
                self.connection_serial,
                self.vendor_id,
                self.originator_serial
            )));
        }
        self.o_t_connection_id = Some(reply.o_t_connection_id);
        self.t_o_connection_id = Some(reply.t_o_connection_id);
        self.o_t_api = Some(reply.o_t_api);
        self.t_o_api = Some(reply.t_o_api);
        Ok(())
    }

    /// Forget the ids and actual rates after a close or a lost connection.
    pub fn invalidate(&mut self) {
        self.o_t_connection_id = None;
        self.t_o_connection_id = None;
        self.o_t_api = None;
        self.t_o_api = None;
    }

    /// `4 × min(actual intervals) × 2^multiplier`, known once the connection is open.
    ///
    /// Reported only; nothing throttles sends with it.
    pub fn production_inhibit_interval(&self) -> Option<Duration> {
        let api = self.o_t_api?.min(self.t_o_api?);
        let factor = 1u64
            .checked_shl(u32::from(self.timeout_multiplier))
            .unwrap_or(u64::MAX);
        Some(Duration::from_micros(
            u64::from(api).saturating_mul(4).saturating_mul(factor),
        ))
    }
}

/// Build a (Large) Forward Open request, allocating a fresh connection serial
/// and proposed connection ids.
pub fn forward_open(
    descriptor: &mut ConnectionDescriptor,
    ids: &mut ConnectionIdAllocator,
) -> Result<Request> {
    let route = descriptor.route.encode()?;
    let route_words = route_words(&route)?;

    // Check the parameters before consuming ids.
    let (o_t_params, t_o_params) = if descriptor.large {
        (None, None)
    } else {
        (
            Some(descriptor.o_t_parameters.to_u16()?),
            Some(descriptor.t_o_parameters.to_u16()?),
        )
    };

    let allocated = ids.next();
    descriptor.invalidate();
    descriptor.connection_serial = allocated.connection_serial;

    let size = FORWARD_OPEN_FIXED_LEN + route.len() + if descriptor.large { 4 } else { 0 };
    let mut data = BytesMut::with_capacity(size);
    descriptor.timing.encode_into(&mut data);
    data.put_u32_le(allocated.o_t_connection_id);
    data.put_u32_le(allocated.t_o_connection_id);
    data.put_u16_le(allocated.connection_serial);
    data.put_u16_le(descriptor.vendor_id);
    data.put_u32_le(descriptor.originator_serial);
    data.put_u8(descriptor.timeout_multiplier);
    data.put_slice(&[0, 0, 0]);
    data.put_u32_le(descriptor.o_t_rpi);
    match o_t_params {
        Some(raw) => data.put_u16_le(raw),
        None => data.put_u32_le(descriptor.o_t_parameters.to_u32()),
    }
    data.put_u32_le(descriptor.t_o_rpi);
    match t_o_params {
        Some(raw) => data.put_u16_le(raw),
        None => data.put_u32_le(descriptor.t_o_parameters.to_u32()),
    }
    data.put_u8(descriptor.transport_class_trigger);
    data.put_u8(route_words);
    data.put_slice(&route);
    check_encoded_len("forward open", &data, size)?;

    let service = if descriptor.large {
        LARGE_FORWARD_OPEN
    } else {
        FORWARD_OPEN
    };
    trace!(
        service,
        connection_serial = allocated.connection_serial,
        o_t_connection_id = allocated.o_t_connection_id,
        t_o_connection_id = allocated.t_o_connection_id,
        "built forward open"
    );
    Request::new(service, &path(), data.freeze())
}

fn check_encoded_len(what: &str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() != expected {
        return Err(CipError::encode(format!(
            "{what} data is {} bytes, expected {expected}",
            data.len()
        )));
    }
    Ok(())
}

/// Successful (Large) Forward Open reply data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardOpenReply {
    pub o_t_connection_id: u32,
    pub t_o_connection_id: u32,
    pub connection_serial: u16,
    pub vendor_id: u16,
    pub originator_serial: u32,
    /// Actual packet interval, originator to target, in microseconds.
    pub o_t_api: u32,
    /// Actual packet interval, target to originator, in microseconds.
    pub t_o_api: u32,
    pub application_reply: Bytes,
}

impl ForwardOpenReply {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        if buf.len() < FORWARD_OPEN_REPLY_FIXED_LEN {
            return Err(CipError::malformed_reply(format!(
                "forward open reply of {} bytes, at least {FORWARD_OPEN_REPLY_FIXED_LEN} required",
                data.len()
            )));
        }
        let o_t_connection_id = buf.get_u32_le();
        let t_o_connection_id = buf.get_u32_le();
        let connection_serial = buf.get_u16_le();
        let vendor_id = buf.get_u16_le();
        let originator_serial = buf.get_u32_le();
        let o_t_api = buf.get_u32_le();
        let t_o_api = buf.get_u32_le();
        let application_reply = application_data(&mut buf)?;
        Ok(Self {
            o_t_connection_id,
            t_o_connection_id,
            connection_serial,
            vendor_id,
            originator_serial,
            o_t_api,
            t_o_api,
            application_reply,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(FORWARD_OPEN_REPLY_FIXED_LEN + self.application_reply.len());
        dst.put_u32_le(self.o_t_connection_id);
        dst.put_u32_le(self.t_o_connection_id);
        dst.put_u16_le(self.connection_serial);
        dst.put_u16_le(self.vendor_id);
        dst.put_u32_le(self.originator_serial);
        dst.put_u32_le(self.o_t_api);
        dst.put_u32_le(self.t_o_api);
        dst.put_u8((self.application_reply.len() / 2) as u8);
        dst.put_u8(0);
        dst.put_slice(&self.application_reply);
        dst.freeze()
    }
}

/// Build the Forward Close request for an opened connection.
pub fn forward_close(descriptor: &ConnectionDescriptor) -> Result<Request> {
    let route = descriptor.route.encode()?;
    let route_words = route_words(&route)?;

    let mut data = BytesMut::with_capacity(12 + route.len());
    Timing::FORWARD_CLOSE.encode_into(&mut data);
    data.put_u16_le(descriptor.connection_serial);
    data.put_u16_le(descriptor.vendor_id);
    data.put_u32_le(descriptor.originator_serial);
    data.put_u8(route_words);
    data.put_u8(0);
    data.put_slice(&route);

    Request::new(FORWARD_CLOSE, &path(), data.freeze())
}

/// Successful Forward Close reply data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardCloseReply {
    pub connection_serial: u16,
    pub vendor_id: u16,
    pub originator_serial: u32,
    pub application_reply: Bytes,
}

impl ForwardCloseReply {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        if buf.len() < FORWARD_CLOSE_REPLY_FIXED_LEN {
            return Err(CipError::malformed_reply(format!(
                "forward close reply of {} bytes, at least {FORWARD_CLOSE_REPLY_FIXED_LEN} required",
                data.len()
            )));
        }
        let connection_serial = buf.get_u16_le();
        let vendor_id = buf.get_u16_le();
        let originator_serial = buf.get_u32_le();
        let application_reply = application_data(&mut buf)?;
        Ok(Self {
            connection_serial,
            vendor_id,
            originator_serial,
            application_reply,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(FORWARD_CLOSE_REPLY_FIXED_LEN + self.application_reply.len());
        dst.put_u16_le(self.connection_serial);
        dst.put_u16_le(self.vendor_id);
        dst.put_u32_le(self.originator_serial);
        dst.put_u8((self.application_reply.len() / 2) as u8);
        dst.put_u8(0);
        dst.put_slice(&self.application_reply);
        dst.freeze()
    }

    /// Whether this reply closes `descriptor`'s connection.
    pub fn matches(&self, descriptor: &ConnectionDescriptor) -> bool {
        self.connection_serial == descriptor.connection_serial
            && self.vendor_id == descriptor.vendor_id
            && self.originator_serial == descriptor.originator_serial
    }
}

fn route_words(route: &[u8]) -> Result<u8> {
    u8::try_from(route.len() / 2)
        .map_err(|_| CipError::encode(format!("connection path of {} bytes is too long", route.len())))
}

/// Application reply size in words, a reserved byte, then the data.
fn application_data(buf: &mut &[u8]) -> Result<Bytes> {
    let len = usize::from(buf.get_u8()) * 2;
    buf.advance(1);
    if buf.len() < len {
        return Err(CipError::malformed_reply(format!(
            "application reply declares {len} bytes, {} present",
            buf.len()
        )));
    }
    Ok(Bytes::copy_from_slice(&buf[..len]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor::new(EPath::new().port(1, [0u8]).class(0x02).instance(0x01))
    }

    #[test]
    fn forward_open_layout() {
        let mut descriptor = descriptor();
        let mut ids = ConnectionIdAllocator::new();
        let request = forward_open(&mut descriptor, &mut ids).unwrap();

        assert_eq!(request.service, FORWARD_OPEN);
        assert_eq!(request.path.as_ref(), &[0x20, 0x06, 0x24, 0x01]);
        assert_eq!(request.data.len(), 36 + 6);
        assert_eq!(descriptor.connection_serial, 0x0002);
        assert!(!descriptor.is_open());

        #[rustfmt::skip]
        let expected: &[u8] = &[
            0x06, 0x9C,                         // timing
            0x03, 0x00, 0x00, 0x20,             // O->T id
            0x02, 0x00, 0x00, 0x20,             // T->O id
            0x02, 0x00,                         // connection serial
            0x37, 0x13,                         // vendor
            0x2A, 0x00, 0x00, 0x00,             // originator serial
            0x03, 0x00, 0x00, 0x00,             // multiplier + reserved
            0x34, 0x12, 0x20, 0x00, 0xF4, 0x43, // O->T RPI + params
            0x01, 0x40, 0x20, 0x00, 0xF4, 0x43, // T->O RPI + params
            0xA3, 0x03,                         // trigger, path words
            0x01, 0x00, 0x20, 0x02, 0x24, 0x01, // route
        ];
        assert_eq!(request.data.as_ref(), expected);
    }

    #[test]
    fn large_forward_open_layout() {
        let mut descriptor = descriptor().with_connection_size(4000);
        descriptor.large = true;
        let request = forward_open(&mut descriptor, &mut ConnectionIdAllocator::new()).unwrap();

        assert_eq!(request.service, LARGE_FORWARD_OPEN);
        assert_eq!(request.data.len(), 36 + 6 + 4);
        assert_eq!(&request.data[26..30], &0x4200_0FA0u32.to_le_bytes());
    }

    #[test]
    fn oversized_small_forward_open_keeps_ids() {
        let mut descriptor = descriptor().with_connection_size(4000);
        let mut ids = ConnectionIdAllocator::new();
        assert!(matches!(
            forward_open(&mut descriptor, &mut ids),
            Err(CipError::Encode(_))
        ));
        assert_eq!(ids.next().connection_serial, 0x0002);
    }

    #[test]
    fn encoded_length_mismatch_is_an_encode_error() {
        assert!(check_encoded_len("forward open", &[0; 42], 42).is_ok());
        let err = check_encoded_len("forward open", &[0; 40], 42).unwrap_err();
        assert!(matches!(
            err,
            CipError::Encode(ref reason) if reason == "forward open data is 40 bytes, expected 42"
        ));
    }

    #[test]
    fn open_reply_applies() {
        let mut descriptor = descriptor();
        forward_open(&mut descriptor, &mut ConnectionIdAllocator::new()).unwrap();

        let reply = ForwardOpenReply {
            o_t_connection_id: 0xDEAD_0001,
            t_o_connection_id: 0x2000_0002,
            connection_serial: descriptor.connection_serial,
            vendor_id: DEFAULT_VENDOR_ID,
            originator_serial: DEFAULT_ORIGINATOR_SERIAL,
            o_t_api: 2_000,
            t_o_api: 1_000,
            application_reply: Bytes::new(),
        };
        let decoded = ForwardOpenReply::decode(&reply.encode()).unwrap();
        assert_eq!(decoded, reply);

        descriptor.apply_open_reply(&decoded).unwrap();
        assert!(descriptor.is_open());
        assert_eq!(descriptor.o_t_connection_id, Some(0xDEAD_0001));
        // 4 × 1000 µs × 2^3
        assert_eq!(
            descriptor.production_inhibit_interval(),
            Some(Duration::from_micros(32_000))
        );

        descriptor.invalidate();
        assert!(!descriptor.is_open());
        assert_eq!(descriptor.production_inhibit_interval(), None);
    }

    #[test]
    fn open_reply_for_other_connection_is_rejected() {
        let mut descriptor = descriptor();
        let reply = ForwardOpenReply {
            o_t_connection_id: 1,
            t_o_connection_id: 2,
            connection_serial: 0x7777,
            vendor_id: DEFAULT_VENDOR_ID,
            originator_serial: DEFAULT_ORIGINATOR_SERIAL,
            o_t_api: 1,
            t_o_api: 1,
            application_reply: Bytes::new(),
        };
        assert!(matches!(
            descriptor.apply_open_reply(&reply),
            Err(CipError::MalformedReply(_))
        ));
    }

    #[test]
    fn truncated_open_reply() {
        assert!(ForwardOpenReply::decode(&[0u8; 25]).is_err());
        let mut bytes = vec![0u8; 26];
        bytes[24] = 2; // 4 bytes of application data that are missing
        assert!(ForwardOpenReply::decode(&bytes).is_err());
    }

    #[test]
    fn forward_close_layout() {
        let mut descriptor = descriptor();
        descriptor.connection_serial = 0x0002;
        let request = forward_close(&descriptor).unwrap();
        assert_eq!(request.service, FORWARD_CLOSE);
        assert_eq!(
            request.data.as_ref(),
            &[
                0x02, 0x7D, 0x02, 0x00, 0x37, 0x13, 0x2A, 0x00, 0x00, 0x00, 0x03, 0x00, 0x01,
                0x00, 0x20, 0x02, 0x24, 0x01
            ]
        );

        let reply = ForwardCloseReply {
            connection_serial: 0x0002,
            vendor_id: DEFAULT_VENDOR_ID,
            originator_serial: DEFAULT_ORIGINATOR_SERIAL,
            application_reply: Bytes::from_static(&[1, 2]),
        };
        let decoded = ForwardCloseReply::decode(&reply.encode()).unwrap();
        assert_eq!(decoded, reply);
        assert!(decoded.matches(&descriptor));
    }
}
