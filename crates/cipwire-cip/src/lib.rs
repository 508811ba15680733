//! Common Industrial Protocol codecs.
//!
//! - [`epath`]: EPath segments, symbolic tag parsing and the path codec
//! - [`router`]: Message Router request and reply envelopes
//! - [`connection_manager`]: Forward Open / Forward Close, Unconnected Send
//!   and connection id allocation
//! - [`status`]: general and Connection Manager status descriptions
//!
//! Everything here is pure data transformation; no I/O happens in this crate.

pub mod class;
pub mod connection_manager;
pub mod epath;
pub mod error;
pub mod router;
pub mod service;
pub mod status;

pub use connection_manager::{
    ConnectionDescriptor, ConnectionIdAllocator, ConnectionIds, ForwardCloseReply,
    ForwardOpenReply, NetworkConnectionParameters, Timing,
};
pub use epath::{ElectronicKey, EPath, LogicalKind, NetworkSegment, Segment};
pub use error::{CipError, Result};
pub use router::{Reply, Request};
