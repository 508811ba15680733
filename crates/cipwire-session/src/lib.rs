//! EtherNet/IP sessions and connected messaging.
//!
//! [`ConnectedSession`] is the connection state machine: Forward Open and
//! Forward Close transitions, sequence counts for connected sends, and the
//! table that routes connected replies back to their [`ReplyHandle`]s.
//! It performs no I/O.
//!
//! [`Client`] puts it on a stream: it registers the encapsulation session,
//! submits unconnected and connected requests, and dispatches inbound frames.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod pending;
pub mod state;

pub use client::Client;
pub use config::{SessionConfig, DEFAULT_LARGE_FORWARD_OPEN_THRESHOLD};
pub use connection::{ConnectedPacket, ConnectedSession, ConnectionClosed, ConnectionEstablished};
pub use error::{Result, SessionError};
pub use pending::{Expect, Pending, PendingTable, ReplyHandle};
pub use state::ConnectionState;
