//! Connected session state machine.
//!
//! Owns one connection's descriptor, its sequence counter and the table of
//! outstanding connected requests. Nothing here touches a stream: callers
//! send the [`Request`]s and [`ConnectedPacket`]s it hands out and feed back
//! what the target answers.

use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use cipwire_cip::class;
use cipwire_cip::connection_manager::{
    forward_close, forward_open, FORWARD_CLOSE, FORWARD_OPEN, LARGE_FORWARD_OPEN,
};
use cipwire_cip::{
    CipError, ConnectionDescriptor, ConnectionIdAllocator, ForwardCloseReply, ForwardOpenReply,
    Reply, Request,
};
use cipwire_frame::FrameError;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::pending::{direct, PendingTable, ReplyHandle};
use crate::state::ConnectionState;

/// A connected transport packet ready for SendUnitData.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedPacket {
    /// O→T connection id for the connected address item.
    pub connection_id: u32,
    pub sequence: u16,
    /// Sequence count followed by the encoded request.
    pub data: Bytes,
}

/// Outcome of a successful Forward Open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEstablished {
    pub connection_serial: u16,
    pub o_t_connection_id: u32,
    pub t_o_connection_id: u32,
    pub o_t_api: Duration,
    pub t_o_api: Duration,
    /// Minimum spacing between productions implied by the actual intervals.
    /// Reported only; sends are not throttled by it.
    pub production_inhibit_interval: Option<Duration>,
}

/// Outcome of a successful Forward Close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionClosed {
    pub connection_serial: u16,
    /// Pending connected requests cancelled by the close.
    pub cancelled: usize,
}

/// One connection and its outstanding connected requests.
#[derive(Debug, Default)]
pub struct ConnectedSession {
    state: ConnectionState,
    descriptor: Option<ConnectionDescriptor>,
    sequence: u16,
    pending: PendingTable<u16>,
}

impl ConnectedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The descriptor of the current or last attempted connection.
    pub fn descriptor(&self) -> Option<&ConnectionDescriptor> {
        self.descriptor.as_ref()
    }

    /// Number of connected requests awaiting a reply.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Start opening a connection. Returns the Forward Open request to send
    /// to the Connection Manager.
    pub fn begin_open(
        &mut self,
        mut descriptor: ConnectionDescriptor,
        ids: &mut ConnectionIdAllocator,
    ) -> Result<Request> {
        self.require(ConnectionState::Closed, "open")?;
        let request = forward_open(&mut descriptor, ids)?;
        info!(
            connection_serial = descriptor.connection_serial,
            large = descriptor.large,
            route = %descriptor.route,
            "opening connection"
        );
        self.descriptor = Some(descriptor);
        self.state = ConnectionState::Opening;
        Ok(request)
    }

    /// Apply the reply to the outstanding Forward Open.
    ///
    /// Any failure returns the session to `Closed` with
    /// [`SessionError::ConnectionRejected`].
    pub fn complete_open(&mut self, reply: Reply) -> Result<ConnectionEstablished> {
        self.require(ConnectionState::Opening, "complete open")?;
        let Some(descriptor) = self.descriptor.as_mut() else {
            self.state = ConnectionState::Closed;
            return Err(SessionError::UnexpectedReply(
                "forward open reply without a descriptor".to_string(),
            ));
        };

        let service = if descriptor.large {
            LARGE_FORWARD_OPEN
        } else {
            FORWARD_OPEN
        };
        let outcome = reply
            .expect_service(service)
            .and_then(|()| reply.into_result(Some(class::CONNECTION_MANAGER)))
            .and_then(|reply| ForwardOpenReply::decode(&reply.data))
            .and_then(|open| descriptor.apply_open_reply(&open));

        if let Err(err) = outcome {
            warn!(
                connection_serial = descriptor.connection_serial,
                error = %err,
                "forward open rejected"
            );
            descriptor.invalidate();
            self.state = ConnectionState::Closed;
            return Err(SessionError::rejected(err));
        }

        let established = match established(descriptor) {
            Ok(established) => established,
            Err(err) => {
                descriptor.invalidate();
                self.state = ConnectionState::Closed;
                return Err(SessionError::rejected(err));
            }
        };
        self.sequence = 0;
        self.state = ConnectionState::Established;
        info!(
            connection_serial = established.connection_serial,
            o_t_connection_id = established.o_t_connection_id,
            t_o_connection_id = established.t_o_connection_id,
            "connection established"
        );
        Ok(established)
    }

    /// Start closing the connection. Returns the Forward Close request.
    pub fn begin_close(&mut self) -> Result<Request> {
        self.require(ConnectionState::Established, "close")?;
        let descriptor = self.descriptor().ok_or(SessionError::InvalidState {
            operation: "close",
            state: self.state,
        })?;
        let request = forward_close(descriptor)?;
        debug!(connection_serial = descriptor.connection_serial, "closing connection");
        self.state = ConnectionState::Closing;
        Ok(request)
    }

    /// Apply the reply to the outstanding Forward Close.
    ///
    /// On success every pending connected request is cancelled and the
    /// connection ids are forgotten. On failure the connection stays
    /// established.
    pub fn complete_close(&mut self, reply: Reply) -> Result<ConnectionClosed> {
        self.require(ConnectionState::Closing, "complete close")?;
        let connection_serial = self
            .descriptor
            .as_ref()
            .map(|descriptor| descriptor.connection_serial)
            .unwrap_or_default();

        let outcome = reply
            .expect_service(FORWARD_CLOSE)
            .and_then(|()| reply.into_result(Some(class::CONNECTION_MANAGER)))
            .and_then(|reply| ForwardCloseReply::decode(&reply.data))
            .and_then(|close| match &self.descriptor {
                Some(descriptor) if !close.matches(descriptor) => Err(CipError::MalformedReply(
                    format!("forward close reply for connection {:04X}", close.connection_serial),
                )),
                _ => Ok(()),
            });

        if let Err(err) = outcome {
            warn!(connection_serial, error = %err, "forward close failed");
            self.state = ConnectionState::Established;
            return Err(err.into());
        }

        let cancelled = self.teardown();
        info!(connection_serial, cancelled, "connection closed");
        Ok(ConnectionClosed {
            connection_serial,
            cancelled,
        })
    }

    /// The Forward Open exchange ended without a reply to apply.
    ///
    /// The session falls back to `Closed`. An undecodable reply, an error
    /// status at the encapsulation layer or a timeout is reported as
    /// [`SessionError::ConnectionRejected`]; a lost or cancelled exchange
    /// keeps its own error.
    pub fn fail_open(&mut self, err: SessionError) -> SessionError {
        if self.state == ConnectionState::Opening {
            self.abort_transition();
        }
        match err {
            SessionError::Cip(_)
            | SessionError::Timeout(_)
            | SessionError::UnexpectedReply(_)
            | SessionError::Frame(FrameError::EncapsulationStatus { .. })
            | SessionError::Frame(FrameError::MalformedFrame(_)) => SessionError::rejected(err),
            other => other,
        }
    }

    /// The Forward Open or Forward Close got no usable reply at all.
    ///
    /// An open falls back to `Closed`, a close back to `Established`.
    pub fn abort_transition(&mut self) {
        match self.state {
            ConnectionState::Opening => {
                if let Some(descriptor) = self.descriptor.as_mut() {
                    descriptor.invalidate();
                }
                self.state = ConnectionState::Closed;
            }
            ConnectionState::Closing => self.state = ConnectionState::Established,
            ConnectionState::Closed | ConnectionState::Established => return,
        }
        debug!(state = %self.state, "connection transition aborted");
    }

    /// The transport went away: cancel everything and drop to `Closed`.
    pub fn connection_lost(&mut self) -> usize {
        if self.state == ConnectionState::Closed && self.pending.is_empty() {
            return 0;
        }
        let cancelled = self.teardown();
        warn!(cancelled, "connection lost");
        cancelled
    }

    /// Assign the next sequence count to `request` and register it as
    /// pending until `timeout` elapses.
    pub fn send(
        &mut self,
        request: &Request,
        timeout: Duration,
    ) -> Result<(ConnectedPacket, ReplyHandle)> {
        self.send_at(request, Instant::now(), timeout)
    }

    pub fn send_at(
        &mut self,
        request: &Request,
        now: Instant,
        timeout: Duration,
    ) -> Result<(ConnectedPacket, ReplyHandle)> {
        if !self.state.is_established() {
            return Err(SessionError::InvalidState {
                operation: "send",
                state: self.state,
            });
        }
        let connection_id = self
            .descriptor
            .as_ref()
            .and_then(|descriptor| descriptor.o_t_connection_id)
            .ok_or(SessionError::InvalidState {
                operation: "send",
                state: self.state,
            })?;

        let sequence = self.sequence.wrapping_add(1);
        let handle = self
            .pending
            .insert_at(
                sequence,
                now,
                timeout,
                direct(request.service, request.class()),
            )
            .ok_or(SessionError::SequenceInUse(sequence))?;
        self.sequence = sequence;

        let mut data = BytesMut::with_capacity(2 + request.encoded_len());
        data.put_u16_le(sequence);
        request.encode_into(&mut data);

        Ok((
            ConnectedPacket {
                connection_id,
                sequence,
                data: data.freeze(),
            },
            handle,
        ))
    }

    /// Drop a pending request whose packet never made it out.
    pub fn abandon(&mut self, sequence: u16) {
        if let Some(pending) = self.pending.take(&sequence) {
            pending.fail(SessionError::Cancelled);
        }
    }

    /// Route an inbound connected packet to the request waiting on its
    /// sequence count. Returns whether a pending request was completed.
    ///
    /// Packets for another connection, or with no pending sequence count,
    /// are logged and dropped.
    pub fn handle_connected(&mut self, connection_id: u32, data: &[u8]) -> bool {
        let expected = self
            .descriptor
            .as_ref()
            .and_then(|descriptor| descriptor.t_o_connection_id);
        if expected != Some(connection_id) {
            debug!(connection_id, ?expected, "connected packet for another connection");
            return false;
        }
        if data.len() < 2 {
            warn!(connection_id, len = data.len(), "connected packet without sequence count");
            return false;
        }

        let sequence = u16::from_le_bytes([data[0], data[1]]);
        match self.pending.take(&sequence) {
            Some(pending) => {
                pending.resolve(&data[2..]);
                true
            }
            None => {
                debug!(sequence, "late or unmatched connected reply");
                false
            }
        }
    }

    /// Fail every pending request whose deadline has passed.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        self.pending.sweep_expired(now).len()
    }

    fn require(&self, state: ConnectionState, operation: &'static str) -> Result<()> {
        if self.state != state {
            return Err(SessionError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn teardown(&mut self) -> usize {
        let cancelled = self.pending.cancel_all();
        if let Some(descriptor) = self.descriptor.as_mut() {
            descriptor.invalidate();
        }
        self.state = ConnectionState::Closed;
        cancelled
    }
}

fn established(descriptor: &ConnectionDescriptor) -> Result<ConnectionEstablished> {
    match (
        descriptor.o_t_connection_id,
        descriptor.t_o_connection_id,
        descriptor.o_t_api,
        descriptor.t_o_api,
    ) {
        (Some(o_t_connection_id), Some(t_o_connection_id), Some(o_t_api), Some(t_o_api)) => {
            Ok(ConnectionEstablished {
                connection_serial: descriptor.connection_serial,
                o_t_connection_id,
                t_o_connection_id,
                o_t_api: Duration::from_micros(u64::from(o_t_api)),
                t_o_api: Duration::from_micros(u64::from(t_o_api)),
                production_inhibit_interval: descriptor.production_inhibit_interval(),
            })
        }
        _ => Err(SessionError::UnexpectedReply(
            "forward open reply did not set connection ids".to_string(),
        )),
    }
}
