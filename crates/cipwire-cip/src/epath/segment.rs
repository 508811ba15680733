use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::{CipError, Result};

/// Top three bits of the first byte of every segment.
pub const SEGMENT_TYPE_MASK: u8 = 0xE0;

pub const PORT: u8 = 0x00;
pub const LOGICAL: u8 = 0x20;
pub const NETWORK: u8 = 0x40;
pub const SYMBOLIC: u8 = 0x60;
pub const DATA: u8 = 0x80;
pub const DATA_TYPE_CONSTRUCTED: u8 = 0xA0;
pub const DATA_TYPE_ELEMENTARY: u8 = 0xC0;
pub const RESERVED: u8 = 0xE0;

/// Data segment sub-type for simple data.
pub const SIMPLE_DATA: u8 = 0x80;
/// Data segment sub-type for an ANSI extended symbol.
pub const ANSI_EXTENDED_SYMBOL: u8 = 0x91;

const EXTENDED_LINK_FLAG: u8 = 0x10;
const EXTENDED_PORT_ID: u8 = 0x0F;

const LOGICAL_TYPE_MASK: u8 = 0x1C;
const LOGICAL_FORMAT_MASK: u8 = 0x03;
const LOGICAL_SPECIAL: u8 = 0x14;
const LOGICAL_EXTENDED: u8 = 0x1C;
const ELECTRONIC_KEY: u8 = LOGICAL | LOGICAL_SPECIAL;
const KEY_FORMAT_4: u8 = 0x04;

const NETWORK_SCHEDULE: u8 = 0x01;
const NETWORK_FIXED_TAG: u8 = 0x02;
const NETWORK_INHIBIT_MILLIS: u8 = 0x03;
const NETWORK_SAFETY: u8 = 0x04;
const NETWORK_INHIBIT_MICROS: u8 = 0x10;
const NETWORK_EXTENDED: u8 = 0x1F;

/// Name of a segment type, for logs and errors.
pub fn segment_type_name(segment_type: u8) -> &'static str {
    match segment_type & SEGMENT_TYPE_MASK {
        PORT => "port",
        LOGICAL => "logical",
        NETWORK => "network",
        SYMBOLIC => "symbolic",
        DATA => "data",
        DATA_TYPE_CONSTRUCTED => "constructed data type",
        DATA_TYPE_ELEMENTARY => "elementary data type",
        _ => "reserved",
    }
}

/// What a logical segment addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalKind {
    Class,
    Instance,
    /// Member id, also used for array element indices.
    Member,
    ConnectionPoint,
    Attribute,
    ServiceId,
}

impl LogicalKind {
    fn bits(self) -> u8 {
        match self {
            LogicalKind::Class => 0x00,
            LogicalKind::Instance => 0x04,
            LogicalKind::Member => 0x08,
            LogicalKind::ConnectionPoint => 0x0C,
            LogicalKind::Attribute => 0x10,
            LogicalKind::ServiceId => 0x18,
        }
    }

    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(LogicalKind::Class),
            0x04 => Some(LogicalKind::Instance),
            0x08 => Some(LogicalKind::Member),
            0x0C => Some(LogicalKind::ConnectionPoint),
            0x10 => Some(LogicalKind::Attribute),
            0x18 => Some(LogicalKind::ServiceId),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LogicalKind::Class => "class",
            LogicalKind::Instance => "instance",
            LogicalKind::Member => "member",
            LogicalKind::ConnectionPoint => "connection point",
            LogicalKind::Attribute => "attribute",
            LogicalKind::ServiceId => "service",
        }
    }
}

/// Electronic key, format 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElectronicKey {
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    /// Major revision, 7 bits.
    pub major_revision: u8,
    pub minor_revision: u8,
    /// Accept any compatible revision instead of an exact match.
    pub compatibility: bool,
}

/// Network segment payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkSegment {
    Schedule(u8),
    FixedTag(u8),
    /// Production inhibit time in milliseconds.
    InhibitTimeMillis(u8),
    /// Production inhibit time in microseconds.
    InhibitTimeMicros(u32),
}

/// One EPath segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Route hop: leave through `port` towards `link` (a node number or an
    /// IP address in ASCII).
    Port { port: u16, link: Vec<u8> },
    /// Class / instance / attribute style addressing. The encoded width
    /// follows the magnitude of `value`.
    Logical { kind: LogicalKind, value: u32 },
    ElectronicKey(ElectronicKey),
    Network(NetworkSegment),
    /// A tag or member name followed by its array subscripts.
    Symbolic { name: String, subscripts: Vec<u32> },
    /// Simple data segment.
    Data(Vec<u8>),
}

impl Segment {
    pub fn logical(kind: LogicalKind, value: u32) -> Self {
        Segment::Logical { kind, value }
    }

    /// Append the wire form of this segment. Every segment is padded to an
    /// even number of bytes.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Segment::Port { port, link } => encode_port(*port, link, dst),
            Segment::Logical { kind, value } => {
                encode_logical(*kind, *value, dst);
                Ok(())
            }
            Segment::ElectronicKey(key) => {
                dst.put_u8(ELECTRONIC_KEY);
                dst.put_u8(KEY_FORMAT_4);
                dst.put_u16_le(key.vendor_id);
                dst.put_u16_le(key.device_type);
                dst.put_u16_le(key.product_code);
                dst.put_u8((key.major_revision & 0x7F) | if key.compatibility { 0x80 } else { 0 });
                dst.put_u8(key.minor_revision);
                Ok(())
            }
            Segment::Network(network) => {
                match *network {
                    NetworkSegment::Schedule(v) => dst.put_slice(&[NETWORK | NETWORK_SCHEDULE, v]),
                    NetworkSegment::FixedTag(v) => dst.put_slice(&[NETWORK | NETWORK_FIXED_TAG, v]),
                    NetworkSegment::InhibitTimeMillis(v) => {
                        dst.put_slice(&[NETWORK | NETWORK_INHIBIT_MILLIS, v])
                    }
                    NetworkSegment::InhibitTimeMicros(v) => {
                        dst.put_u8(NETWORK | NETWORK_INHIBIT_MICROS);
                        dst.put_u8(2);
                        dst.put_u32_le(v);
                    }
                }
                Ok(())
            }
            Segment::Symbolic { name, subscripts } => {
                if name.is_empty() || !name.is_ascii() {
                    return Err(CipError::encode(format!(
                        "symbol {name:?} must be non-empty ASCII"
                    )));
                }
                let len = u8::try_from(name.len()).map_err(|_| {
                    CipError::encode(format!("symbol of {} bytes exceeds 255", name.len()))
                })?;
                dst.put_u8(ANSI_EXTENDED_SYMBOL);
                dst.put_u8(len);
                dst.put_slice(name.as_bytes());
                if len % 2 == 1 {
                    dst.put_u8(0);
                }
                for &index in subscripts {
                    encode_logical(LogicalKind::Member, index, dst);
                }
                Ok(())
            }
            Segment::Data(payload) => {
                if payload.len() % 2 != 0 {
                    return Err(CipError::encode("simple data must be a whole number of words"));
                }
                let words = u8::try_from(payload.len() / 2).map_err(|_| {
                    CipError::encode(format!("simple data of {} bytes exceeds 255 words", payload.len()))
                })?;
                dst.put_u8(SIMPLE_DATA);
                dst.put_u8(words);
                dst.put_slice(payload);
                Ok(())
            }
        }
    }
}

fn encode_port(port: u16, link: &[u8], dst: &mut BytesMut) -> Result<()> {
    if port == 0 {
        return Err(CipError::encode("port 0 is reserved"));
    }
    if link.is_empty() {
        return Err(CipError::encode("port segment needs a link address"));
    }
    let link_len = u8::try_from(link.len())
        .map_err(|_| CipError::encode(format!("link address of {} bytes exceeds 255", link.len())))?;

    let extended_link = link.len() > 1;
    let id = if port < u16::from(EXTENDED_PORT_ID) {
        port as u8
    } else {
        EXTENDED_PORT_ID
    };

    let start = dst.len();
    dst.put_u8(id | if extended_link { EXTENDED_LINK_FLAG } else { 0 });
    if extended_link {
        dst.put_u8(link_len);
    }
    if id == EXTENDED_PORT_ID {
        dst.put_u16_le(port);
    }
    dst.put_slice(link);
    if (dst.len() - start) % 2 == 1 {
        dst.put_u8(0);
    }
    Ok(())
}

fn encode_logical(kind: LogicalKind, value: u32, dst: &mut BytesMut) {
    let code = LOGICAL | kind.bits();
    if value <= 0xFF {
        dst.put_u8(code);
        dst.put_u8(value as u8);
    } else if value <= 0xFFFF {
        dst.put_u8(code | 0x01);
        dst.put_u8(0);
        dst.put_u16_le(value as u16);
    } else {
        dst.put_u8(code | 0x02);
        dst.put_u8(0);
        dst.put_u32_le(value);
    }
}

/// Decode the segment at the start of `bytes`, returning it and the number of
/// bytes it occupies (pad included).
pub fn decode_segment(bytes: &[u8]) -> Result<(Segment, usize)> {
    decode_segment_at(bytes, 0)
}

pub(crate) fn decode_segment_at(path: &[u8], offset: usize) -> Result<(Segment, usize)> {
    let code = byte(path, offset)?;
    let (segment, len) = match code & SEGMENT_TYPE_MASK {
        PORT => decode_port(path, offset)?,
        LOGICAL => decode_logical(path, offset)?,
        NETWORK => decode_network(path, offset)?,
        SYMBOLIC => {
            let len = (code & 0x1F) as usize;
            if len == 0 {
                return Err(CipError::malformed_path(
                    offset,
                    "extended string symbolic segments are not supported",
                ));
            }
            let name = ascii(path, offset + 1, len, offset)?;
            (
                Segment::Symbolic {
                    name,
                    subscripts: Vec::new(),
                },
                1 + len,
            )
        }
        DATA => match code {
            SIMPLE_DATA => {
                let words = byte(path, offset + 1)? as usize;
                let payload = take(path, offset + 2, words * 2, offset)?;
                (Segment::Data(payload.to_vec()), 2 + words * 2)
            }
            ANSI_EXTENDED_SYMBOL => {
                let len = byte(path, offset + 1)? as usize;
                let name = ascii(path, offset + 2, len, offset)?;
                (
                    Segment::Symbolic {
                        name,
                        subscripts: Vec::new(),
                    },
                    2 + len,
                )
            }
            other => {
                return Err(CipError::malformed_path(
                    offset,
                    format!("unsupported data segment sub-type 0x{other:02X}"),
                ))
            }
        },
        other => {
            return Err(CipError::malformed_path(
                offset,
                format!("{} segments are not supported", segment_type_name(other)),
            ))
        }
    };

    let padded = len + len % 2;
    Ok((segment, padded.min(path.len() - offset)))
}

fn decode_port(path: &[u8], offset: usize) -> Result<(Segment, usize)> {
    let code = path[offset];
    let extended_link = code & EXTENDED_LINK_FLAG != 0;
    let id = code & 0x0F;
    if id == 0 {
        return Err(CipError::malformed_path(offset, "port 0 is reserved"));
    }

    let mut pos = offset + 1;
    let link_len = if extended_link {
        let len = byte(path, pos)? as usize;
        pos += 1;
        len
    } else {
        1
    };
    let port = if id == EXTENDED_PORT_ID {
        let raw = take(path, pos, 2, offset)?;
        pos += 2;
        u16::from_le_bytes([raw[0], raw[1]])
    } else {
        u16::from(id)
    };
    let link = take(path, pos, link_len, offset)?.to_vec();
    pos += link_len;

    Ok((Segment::Port { port, link }, pos - offset))
}

fn decode_logical(path: &[u8], offset: usize) -> Result<(Segment, usize)> {
    let code = path[offset];
    let kind_bits = code & LOGICAL_TYPE_MASK;
    let format = code & LOGICAL_FORMAT_MASK;

    if kind_bits == LOGICAL_SPECIAL {
        let key_format = byte(path, offset + 1)?;
        if format != 0 || key_format != KEY_FORMAT_4 {
            return Err(CipError::malformed_path(
                offset,
                format!("unsupported special segment (format {format}, key format {key_format})"),
            ));
        }
        let raw = take(path, offset + 2, 8, offset)?;
        let key = ElectronicKey {
            vendor_id: u16::from_le_bytes([raw[0], raw[1]]),
            device_type: u16::from_le_bytes([raw[2], raw[3]]),
            product_code: u16::from_le_bytes([raw[4], raw[5]]),
            major_revision: raw[6] & 0x7F,
            minor_revision: raw[7],
            compatibility: raw[6] & 0x80 != 0,
        };
        return Ok((Segment::ElectronicKey(key), 10));
    }
    if kind_bits == LOGICAL_EXTENDED {
        return Err(CipError::malformed_path(
            offset,
            "extended logical segments are not supported",
        ));
    }
    let kind = LogicalKind::from_bits(kind_bits).ok_or_else(|| {
        CipError::malformed_path(offset, format!("unknown logical type 0x{kind_bits:02X}"))
    })?;

    let (value, len) = match format {
        0 => (u32::from(byte(path, offset + 1)?), 2),
        1 => {
            let raw = take(path, offset + 2, 2, offset)?;
            (u32::from(u16::from_le_bytes([raw[0], raw[1]])), 4)
        }
        2 => {
            let raw = take(path, offset + 2, 4, offset)?;
            (u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]), 6)
        }
        _ => {
            return Err(CipError::malformed_path(
                offset,
                "reserved logical segment format",
            ))
        }
    };
    Ok((Segment::Logical { kind, value }, len))
}

fn decode_network(path: &[u8], offset: usize) -> Result<(Segment, usize)> {
    let subtype = path[offset] & 0x1F;
    let network = match subtype {
        NETWORK_SCHEDULE => NetworkSegment::Schedule(byte(path, offset + 1)?),
        NETWORK_FIXED_TAG => NetworkSegment::FixedTag(byte(path, offset + 1)?),
        NETWORK_INHIBIT_MILLIS => NetworkSegment::InhibitTimeMillis(byte(path, offset + 1)?),
        NETWORK_INHIBIT_MICROS => {
            let words = byte(path, offset + 1)?;
            if words != 2 {
                return Err(CipError::malformed_path(
                    offset,
                    format!("production inhibit time carries {words} words, expected 2"),
                ));
            }
            let raw = take(path, offset + 2, 4, offset)?;
            return Ok((
                Segment::Network(NetworkSegment::InhibitTimeMicros(u32::from_le_bytes([
                    raw[0], raw[1], raw[2], raw[3],
                ]))),
                6,
            ));
        }
        NETWORK_SAFETY | NETWORK_EXTENDED => {
            return Err(CipError::malformed_path(
                offset,
                format!("network segment sub-type 0x{subtype:02X} is not supported"),
            ))
        }
        other => {
            return Err(CipError::malformed_path(
                offset,
                format!("reserved network segment sub-type 0x{other:02X}"),
            ))
        }
    };
    Ok((Segment::Network(network), 2))
}

fn byte(path: &[u8], pos: usize) -> Result<u8> {
    path.get(pos)
        .copied()
        .ok_or_else(|| CipError::malformed_path(pos, "path ends inside a segment"))
}

fn take(path: &[u8], pos: usize, len: usize, segment_offset: usize) -> Result<&[u8]> {
    path.get(pos..pos + len).ok_or_else(|| {
        CipError::malformed_path(
            segment_offset,
            format!("segment needs {len} bytes at {pos}, path has {}", path.len()),
        )
    })
}

fn ascii(path: &[u8], pos: usize, len: usize, segment_offset: usize) -> Result<String> {
    let raw = take(path, pos, len, segment_offset)?;
    if !raw.is_ascii() {
        return Err(CipError::malformed_path(segment_offset, "symbol is not ASCII"));
    }
    Ok(String::from_utf8_lossy(raw).into_owned())
}

fn is_printable_link(link: &[u8]) -> bool {
    link.len() > 1
        && link
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || b == b'.' || b == b'@')
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Port { port, link } => {
                write!(f, "port {port}, link ")?;
                if is_printable_link(link) {
                    f.write_str(&String::from_utf8_lossy(link))
                } else {
                    let parts: Vec<String> = link.iter().map(u8::to_string).collect();
                    f.write_str(&parts.join(", "))
                }
            }
            Segment::Logical {
                kind: LogicalKind::Class,
                value,
            } => write!(f, "class 0x{value:02X}"),
            Segment::Logical { kind, value } => write!(f, "{} {value}", kind.name()),
            Segment::ElectronicKey(key) => write!(
                f,
                "key vendor {}, device type {}, product {}, revision {}.{}{}",
                key.vendor_id,
                key.device_type,
                key.product_code,
                key.major_revision,
                key.minor_revision,
                if key.compatibility { " (compatible)" } else { "" }
            ),
            Segment::Network(NetworkSegment::Schedule(v)) => write!(f, "schedule {v}"),
            Segment::Network(NetworkSegment::FixedTag(v)) => write!(f, "fixed tag {v}"),
            Segment::Network(NetworkSegment::InhibitTimeMillis(v)) => write!(f, "inhibit {v} ms"),
            Segment::Network(NetworkSegment::InhibitTimeMicros(v)) => write!(f, "inhibit {v} us"),
            Segment::Symbolic { name, subscripts } => {
                f.write_str(name)?;
                if !subscripts.is_empty() {
                    let parts: Vec<String> = subscripts.iter().map(u32::to_string).collect();
                    write!(f, "[{}]", parts.join(","))?;
                }
                Ok(())
            }
            Segment::Data(payload) => write!(f, "data ({} bytes)", payload.len()),
        }
    }
}
