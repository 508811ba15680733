//! EPath encoding and decoding.
//!
//! An EPath is a sequence of segments that addresses an object inside a device
//! (`class / instance / attribute`), a tag by name (`setpoints[5]`), or a
//! route through the network (`port 1, link 0`). Encoded paths are always a
//! whole number of 16-bit words.

mod segment;

use std::fmt;

use bytes::{Bytes, BytesMut};

pub use segment::{
    decode_segment, segment_type_name, ElectronicKey, LogicalKind, NetworkSegment, Segment,
    ANSI_EXTENDED_SYMBOL, DATA, DATA_TYPE_CONSTRUCTED, DATA_TYPE_ELEMENTARY, LOGICAL, NETWORK,
    PORT, RESERVED, SEGMENT_TYPE_MASK, SIMPLE_DATA, SYMBOLIC,
};

use crate::error::{CipError, Result};

/// An ordered list of path segments.
///
/// A member segment that directly follows a symbolic segment is kept as one
/// of its subscripts, since both encode to the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EPath {
    segments: Vec<Segment>,
}

impl EPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        let mut path = Self::new();
        for segment in segments {
            path.push(segment);
        }
        path
    }

    /// `class / instance` addressing.
    pub fn object(class: u32, instance: u32) -> Self {
        Self::new().class(class).instance(instance)
    }

    /// `class / instance / attribute` addressing.
    pub fn attribute_of(class: u32, instance: u32, attribute: u32) -> Self {
        Self::object(class, instance).attribute(attribute)
    }

    pub fn push(&mut self, segment: Segment) {
        if let Segment::Logical {
            kind: LogicalKind::Member,
            value,
        } = segment
        {
            if let Some(Segment::Symbolic { subscripts, .. }) = self.segments.last_mut() {
                subscripts.push(value);
                return;
            }
        }
        self.segments.push(segment);
    }

    pub fn with(mut self, segment: Segment) -> Self {
        self.push(segment);
        self
    }

    pub fn class(self, class: u32) -> Self {
        self.with(Segment::logical(LogicalKind::Class, class))
    }

    pub fn instance(self, instance: u32) -> Self {
        self.with(Segment::logical(LogicalKind::Instance, instance))
    }

    pub fn attribute(self, attribute: u32) -> Self {
        self.with(Segment::logical(LogicalKind::Attribute, attribute))
    }

    pub fn member(self, member: u32) -> Self {
        self.with(Segment::logical(LogicalKind::Member, member))
    }

    pub fn connection_point(self, point: u32) -> Self {
        self.with(Segment::logical(LogicalKind::ConnectionPoint, point))
    }

    /// Route hop out of `port` to `link`.
    pub fn port(self, port: u16, link: impl Into<Vec<u8>>) -> Self {
        self.with(Segment::Port {
            port,
            link: link.into(),
        })
    }

    pub fn key(self, key: ElectronicKey) -> Self {
        self.with(Segment::ElectronicKey(key))
    }

    /// Concatenate another path onto this one.
    pub fn join(mut self, other: &EPath) -> Self {
        for segment in &other.segments {
            self.push(segment.clone());
        }
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The first class id in the path, if any.
    pub fn class_id(&self) -> Option<u32> {
        self.segments.iter().find_map(|segment| match segment {
            Segment::Logical {
                kind: LogicalKind::Class,
                value,
            } => Some(*value),
            _ => None,
        })
    }

    /// Append the encoded path to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        for segment in &self.segments {
            segment.encode_into(dst)?;
        }
        Ok(())
    }

    /// Encode the path. The result always has an even length.
    pub fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        self.encode_into(&mut dst)?;
        Ok(dst.freeze())
    }

    /// Decode a complete path.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut path = Self::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let (segment, consumed) = segment::decode_segment_at(bytes, offset)?;
            offset += consumed;
            path.push(segment);
        }
        Ok(path)
    }

    /// Parse a tag name such as `Program:Main.recipe[2,3].name` into one
    /// symbolic segment per `.`-separated member.
    pub fn parse_symbol(tag: &str) -> Result<Self> {
        let invalid = |reason: String| CipError::InvalidSymbol {
            symbol: tag.to_string(),
            reason,
        };

        if tag.is_empty() {
            return Err(invalid("empty tag name".into()));
        }

        let mut segments = Vec::new();
        for part in tag.split('.') {
            let (name, subscripts) = match part.find('[') {
                None => (part, Vec::new()),
                Some(open) => {
                    let inner = part[open + 1..]
                        .strip_suffix(']')
                        .ok_or_else(|| invalid(format!("unterminated subscript in {part:?}")))?;
                    if inner.contains(|c: char| c == '[' || c == ']') {
                        return Err(invalid(format!("malformed subscript in {part:?}")));
                    }
                    let subscripts = inner
                        .split(',')
                        .map(|index| {
                            index.trim().parse::<u32>().map_err(|_| {
                                invalid(format!("subscript {index:?} is not an unsigned integer"))
                            })
                        })
                        .collect::<Result<Vec<u32>>>()?;
                    (&part[..open], subscripts)
                }
            };

            if name.is_empty() {
                return Err(invalid("empty member name".into()));
            }
            if name.len() > usize::from(u8::MAX) {
                return Err(invalid(format!("member name of {} bytes exceeds 255", name.len())));
            }
            if let Some(bad) = name
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == ':'))
            {
                return Err(invalid(format!("unexpected character {bad:?}")));
            }

            segments.push(Segment::Symbolic {
                name: name.to_string(),
                subscripts,
            });
        }
        Ok(Self { segments })
    }
}

impl From<Vec<Segment>> for EPath {
    fn from(segments: Vec<Segment>) -> Self {
        Self::from_segments(segments)
    }
}

impl FromIterator<Segment> for EPath {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self::from_segments(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a EPath {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

impl fmt::Display for EPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut previous: Option<&Segment> = None;
        for segment in &self.segments {
            match (previous, segment) {
                (None, _) => {}
                (Some(Segment::Symbolic { .. }), Segment::Symbolic { .. }) => f.write_str(".")?,
                (Some(_), _) => f.write_str(" / ")?,
            }
            write!(f, "{segment}")?;
            previous = Some(segment);
        }
        Ok(())
    }
}
