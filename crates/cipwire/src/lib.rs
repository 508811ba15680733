//! EtherNet/IP and CIP client protocol engine.
//!
//! cipwire speaks the explicit-messaging side of EtherNet/IP: encapsulation
//! sessions over TCP, unconnected requests routed through the Connection
//! Manager, and Class 3 connections opened with Forward Open.
//!
//! # Crate Structure
//!
//! - [`frame`]: encapsulation header, Common Packet Format items and frame I/O
//! - [`cip`]: EPath, Message Router envelopes and Connection Manager services
//! - [`session`]: request correlation, connection lifecycle and the blocking [`Client`]

/// Re-export frame types.
pub mod frame {
    pub use cipwire_frame::*;
}

/// Re-export CIP codec types.
pub mod cip {
    pub use cipwire_cip::*;
}

/// Re-export session types.
pub mod session {
    pub use cipwire_session::*;
}

pub use cipwire_cip::{EPath, Reply, Request};
pub use cipwire_session::{Client, SessionConfig, SessionError};
