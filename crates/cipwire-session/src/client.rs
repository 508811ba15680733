//! Blocking EtherNet/IP client over any `Read`/`Write` stream pair.
//!
//! The client drives everything from the calling thread: each blocking call
//! writes its frame, then reads and dispatches inbound frames until its own
//! reply arrives. Frames for other outstanding requests that show up in the
//! meantime are routed to their [`ReplyHandle`]s on the way.
//!
//! Request deadlines are enforced by a sweep after every read. Give the
//! stream a read timeout (see [`FrameReader::with_config_tcp`]) so the sweep
//! also runs while the target is silent.

use std::io::{Read, Write};
use std::time::Instant;

use cipwire_cip::connection_manager::unconnected_send;
use cipwire_cip::{ConnectionDescriptor, ConnectionIdAllocator, EPath, Reply, Request, Timing};
use cipwire_frame::reply::InterfaceItem;
use cipwire_frame::request as encapsulation;
use cipwire_frame::{
    decode_reply, Command, EncapsulationReply, Frame, FrameError, FrameReader, FrameWriter,
    IdentityItem, SenderContext, ServiceItem,
};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::connection::{ConnectedSession, ConnectionClosed, ConnectionEstablished};
use crate::error::{Result, SessionError};
use crate::pending::{direct, Expect, PendingTable, ReplyHandle};
use crate::state::ConnectionState;

/// A registered encapsulation session with at most one connection.
pub struct Client<R: Read, W: Write> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    config: SessionConfig,
    session_handle: u32,
    protocol_version: u16,
    next_context: u64,
    ids: ConnectionIdAllocator,
    connection: ConnectedSession,
    unconnected: PendingTable<SenderContext>,
}

impl<R: Read, W: Write> Client<R, W> {
    /// Register a session with the target.
    pub fn register(
        reader: FrameReader<R>,
        writer: FrameWriter<W>,
        config: SessionConfig,
    ) -> Result<Self> {
        let mut client = Self {
            reader,
            writer,
            config,
            session_handle: 0,
            protocol_version: 0,
            next_context: 0,
            ids: ConnectionIdAllocator::new(),
            connection: ConnectedSession::new(),
            unconnected: PendingTable::new(),
        };

        let context = client.next_context();
        client
            .writer
            .write_frame(&encapsulation::register_session(context))?;
        let frame = client.await_command(Command::RegisterSession)?;
        if frame.context != context {
            return Err(SessionError::UnexpectedReply(format!(
                "RegisterSession reply for context {:?}, sent {context:?}",
                frame.context
            )));
        }
        match decode_reply(&frame)? {
            EncapsulationReply::RegisterSession {
                session_handle,
                protocol_version,
                ..
            } if session_handle != 0 => {
                client.session_handle = session_handle;
                client.protocol_version = protocol_version;
            }
            other => {
                return Err(SessionError::UnexpectedReply(format!(
                    "RegisterSession answered with {other:?}"
                )))
            }
        }

        info!(
            session_handle = client.session_handle,
            protocol_version = client.protocol_version,
            "session registered"
        );
        Ok(client)
    }

    pub fn session_handle(&self) -> u32 {
        self.session_handle
    }

    pub fn protocol_version(&self) -> u16 {
        self.protocol_version
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &ConnectedSession {
        &self.connection
    }

    /// Send `request` with unconnected messaging and wait for its reply.
    ///
    /// With a `route` the request is wrapped in an Unconnected Send and the
    /// Connection Manager forwards it; routing failures come back as
    /// [`CipError::ProtocolStatus`](cipwire_cip::CipError::ProtocolStatus)
    /// for the Unconnected Send service.
    pub fn submit_unconnected(
        &mut self,
        request: &Request,
        route: Option<&EPath>,
        timing: Timing,
    ) -> Result<Reply> {
        match route {
            Some(route) => {
                let wrapped = unconnected_send(request, route, timing)?;
                let expect = Expect::Routed {
                    service: request.service,
                    class: request.class(),
                };
                self.exchange_unconnected(&wrapped, expect)
            }
            None => self.exchange_unconnected(request, direct(request.service, request.class())),
        }
    }

    /// Open a connection along `route` with the configured parameters.
    pub fn open(&mut self, route: EPath) -> Result<ConnectionEstablished> {
        let descriptor = self.config.descriptor(route);
        self.open_with(descriptor)
    }

    /// Open a connection described by `descriptor`.
    ///
    /// A refused, undecodable or unanswered Forward Open is
    /// [`SessionError::ConnectionRejected`]; losing the stream is
    /// [`SessionError::Disconnected`].
    pub fn open_with(&mut self, descriptor: ConnectionDescriptor) -> Result<ConnectionEstablished> {
        let request = self.connection.begin_open(descriptor, &mut self.ids)?;
        match self.exchange_unconnected(&request, Expect::Raw) {
            Ok(reply) => self.connection.complete_open(reply),
            Err(err) => Err(self.connection.fail_open(err)),
        }
    }

    /// Close the open connection.
    pub fn close(&mut self) -> Result<ConnectionClosed> {
        let request = self.connection.begin_close()?;
        match self.exchange_unconnected(&request, Expect::Raw) {
            Ok(reply) => self.connection.complete_close(reply),
            Err(err) => {
                self.connection.abort_transition();
                Err(err)
            }
        }
    }

    /// Send `request` over the open connection without waiting.
    ///
    /// The returned handle completes once [`Client::poll`] reads the reply.
    pub fn send_connected(&mut self, request: &Request) -> Result<ReplyHandle> {
        let (packet, handle) = self.connection.send(request, self.config.timeout)?;
        let written =
            encapsulation::send_unit_data(self.session_handle, packet.connection_id, &packet.data)
                .and_then(|frame| self.writer.write_frame(&frame));
        if let Err(err) = written {
            self.connection.abandon(packet.sequence);
            return Err(err.into());
        }
        Ok(handle)
    }

    /// Send `request` over the open connection and wait for its reply.
    pub fn submit_connected(&mut self, request: &Request) -> Result<Reply> {
        let mut handle = self.send_connected(request)?;
        self.wait(&mut handle)
    }

    /// Read at most one frame, dispatch it, then expire overdue requests.
    ///
    /// Returns whether a frame was read. A read timeout on the stream is not
    /// an error.
    pub fn poll(&mut self) -> Result<bool> {
        let frame = self.read_frame()?;
        let read = frame.is_some();
        if let Some(frame) = frame {
            self.dispatch(frame);
        }
        self.sweep_expired(Instant::now());
        Ok(read)
    }

    /// Fail every request whose deadline has passed.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        self.unconnected.sweep_expired(now).len() + self.connection.sweep_expired(now)
    }

    /// ListIdentity over the session's stream.
    pub fn list_identity(&mut self) -> Result<Vec<IdentityItem>> {
        let context = self.next_context();
        self.writer.write_frame(&encapsulation::list_identity(context))?;
        match decode_reply(&self.await_command(Command::ListIdentity)?)? {
            EncapsulationReply::ListIdentity(items) => Ok(items),
            other => Err(SessionError::UnexpectedReply(format!(
                "ListIdentity answered with {other:?}"
            ))),
        }
    }

    /// ListServices over the session's stream.
    pub fn list_services(&mut self) -> Result<Vec<ServiceItem>> {
        let context = self.next_context();
        self.writer.write_frame(&encapsulation::list_services(context))?;
        match decode_reply(&self.await_command(Command::ListServices)?)? {
            EncapsulationReply::ListServices(items) => Ok(items),
            other => Err(SessionError::UnexpectedReply(format!(
                "ListServices answered with {other:?}"
            ))),
        }
    }

    /// ListInterfaces over the session's stream.
    pub fn list_interfaces(&mut self) -> Result<Vec<InterfaceItem>> {
        let context = self.next_context();
        self.writer.write_frame(&encapsulation::list_interfaces(context))?;
        match decode_reply(&self.await_command(Command::ListInterfaces)?)? {
            EncapsulationReply::ListInterfaces(items) => Ok(items),
            other => Err(SessionError::UnexpectedReply(format!(
                "ListInterfaces answered with {other:?}"
            ))),
        }
    }

    /// Cancel everything outstanding and unregister the session.
    ///
    /// An open connection is dropped without a Forward Close.
    pub fn unregister(mut self) -> Result<()> {
        let cancelled = self.cancel_all();
        let context = self.next_context();
        self.writer
            .write_frame(&encapsulation::unregister_session(self.session_handle, context))?;
        info!(session_handle = self.session_handle, cancelled, "session unregistered");
        Ok(())
    }

    fn exchange_unconnected(&mut self, message: &Request, expect: Expect) -> Result<Reply> {
        let context = self.next_context();
        let mut handle = self
            .unconnected
            .insert(context, self.config.timeout, expect)
            .ok_or_else(|| {
                SessionError::UnexpectedReply(format!("sender context {context:?} in use"))
            })?;

        let written =
            encapsulation::send_rr_data(self.session_handle, context, 0, &message.encode())
                .and_then(|frame| self.writer.write_frame(&frame));
        if let Err(err) = written {
            self.unconnected.take(&context);
            return Err(err.into());
        }
        self.wait(&mut handle)
    }

    fn wait(&mut self, handle: &mut ReplyHandle) -> Result<Reply> {
        loop {
            if let Some(outcome) = handle.try_recv() {
                return outcome;
            }
            self.poll()?;
        }
    }

    /// Read frames until one carries `command`, dispatching the rest.
    fn await_command(&mut self, command: Command) -> Result<Frame> {
        let deadline = Instant::now() + self.config.timeout;
        loop {
            if Instant::now() >= deadline {
                return Err(SessionError::Timeout(self.config.timeout));
            }
            match self.read_frame()? {
                Some(frame) if frame.command == command => return Ok(frame),
                Some(frame) => self.dispatch(frame),
                None => {}
            }
            self.sweep_expired(Instant::now());
        }
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        match self.reader.try_read_frame() {
            Ok(frame) => Ok(frame),
            Err(FrameError::ConnectionClosed) => {
                self.cancel_all();
                Err(SessionError::Disconnected(
                    "stream closed by target".to_string(),
                ))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn dispatch(&mut self, frame: Frame) {
        match decode_reply(&frame) {
            Ok(EncapsulationReply::SendRRData(data)) => match self.unconnected.take(&frame.context) {
                Some(pending) => match data.unconnected_data() {
                    Some(message) => pending.resolve(message),
                    None => pending.fail(SessionError::UnexpectedReply(
                        "SendRRData reply without unconnected data item".to_string(),
                    )),
                },
                None => debug!(context = ?frame.context, "late or unmatched SendRRData reply"),
            },
            Ok(EncapsulationReply::SendUnitData(data)) => {
                match (data.connection_id(), data.connected_data()) {
                    (Some(connection_id), Some(packet)) => {
                        self.connection.handle_connected(connection_id, packet);
                    }
                    _ => warn!("SendUnitData without connected address and data items"),
                }
            }
            Ok(_) => debug!(command = frame.command.name(), "ignoring unsolicited frame"),
            Err(err) => match self.unconnected.take(&frame.context) {
                Some(pending) => pending.fail(err.into()),
                None => warn!(
                    command = frame.command.name(),
                    error = %err,
                    "undecodable frame"
                ),
            },
        }
    }

    fn cancel_all(&mut self) -> usize {
        self.connection.connection_lost() + self.unconnected.cancel_all()
    }

    fn next_context(&mut self) -> SenderContext {
        self.next_context = self.next_context.wrapping_add(1);
        if self.next_context == 0 {
            self.next_context = 1;
        }
        SenderContext::from_u64(self.next_context)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use bytes::{BufMut, Bytes, BytesMut};
    use cipwire_cip::connection_manager::{
        ForwardCloseReply, ForwardOpenReply, FORWARD_CLOSE, FORWARD_OPEN, UNCONNECTED_SEND,
    };
    use cipwire_cip::service::GET_ATTRIBUTE_SINGLE;
    use cipwire_cip::CipError;
    use cipwire_frame::cpf::{self, CpfItem};

    use super::*;

    const SESSION: u32 = 0x1122_3344;
    const TARGET_O_T: u32 = 0xDEAD_0001;

    /// The target side of the stream.
    struct Device {
        reader: FrameReader<UnixStream>,
        writer: FrameWriter<UnixStream>,
    }

    impl Device {
        fn new(stream: UnixStream) -> Self {
            Self {
                reader: FrameReader::new(stream.try_clone().unwrap()),
                writer: FrameWriter::new(stream),
            }
        }

        fn register(&mut self) {
            let frame = self.reader.read_frame().unwrap();
            assert_eq!(frame.command, Command::RegisterSession);
            assert_eq!(frame.payload.as_ref(), &[0x01, 0x00, 0x00, 0x00]);
            let reply = Frame::new(Command::RegisterSession, SESSION, frame.context, vec![1, 0, 0, 0]);
            self.writer.write_frame(&reply).unwrap();
        }

        fn recv_rr(&mut self) -> (SenderContext, Request) {
            let frame = self.reader.read_frame().unwrap();
            assert_eq!(frame.command, Command::SendRRData);
            assert_eq!(frame.session_handle, SESSION);
            let EncapsulationReply::SendRRData(data) = decode_reply(&frame).unwrap() else {
                panic!("not SendRRData");
            };
            let request = Request::decode(data.unconnected_data().unwrap()).unwrap();
            (frame.context, request)
        }

        fn reply_rr(&mut self, context: SenderContext, reply: &Reply) {
            let frame = encapsulation::send_rr_data(SESSION, context, 0, &reply.encode()).unwrap();
            self.writer.write_frame(&frame).unwrap();
        }

        fn recv_unit(&mut self) -> (u32, u16, Request) {
            let frame = self.reader.read_frame().unwrap();
            assert_eq!(frame.command, Command::SendUnitData);
            let EncapsulationReply::SendUnitData(data) = decode_reply(&frame).unwrap() else {
                panic!("not SendUnitData");
            };
            let packet = data.connected_data().unwrap();
            let sequence = u16::from_le_bytes([packet[0], packet[1]]);
            let request = Request::decode(&packet[2..]).unwrap();
            (data.connection_id().unwrap(), sequence, request)
        }

        fn reply_unit(&mut self, connection_id: u32, sequence: u16, reply: &Reply) {
            let mut packet = sequence.to_le_bytes().to_vec();
            packet.extend_from_slice(&reply.encode());
            let frame = encapsulation::send_unit_data(SESSION, connection_id, &packet).unwrap();
            self.writer.write_frame(&frame).unwrap();
        }

        /// Accept a Forward Open; returns the T→O id the originator proposed.
        fn accept_open(&mut self) -> u32 {
            let (context, request) = self.recv_rr();
            assert_eq!(request.service, FORWARD_OPEN);
            let data = &request.data;
            let t_o = u32::from_le_bytes([data[6], data[7], data[8], data[9]]);
            let reply = ForwardOpenReply {
                o_t_connection_id: TARGET_O_T,
                t_o_connection_id: t_o,
                connection_serial: u16::from_le_bytes([data[10], data[11]]),
                vendor_id: u16::from_le_bytes([data[12], data[13]]),
                originator_serial: u32::from_le_bytes([data[14], data[15], data[16], data[17]]),
                o_t_api: 2_000,
                t_o_api: 2_000,
                application_reply: Bytes::new(),
            };
            self.reply_rr(context, &Reply::success(FORWARD_OPEN, reply.encode()));
            t_o
        }

        fn accept_close(&mut self) {
            let (context, request) = self.recv_rr();
            assert_eq!(request.service, FORWARD_CLOSE);
            let data = &request.data;
            let reply = ForwardCloseReply {
                connection_serial: u16::from_le_bytes([data[2], data[3]]),
                vendor_id: u16::from_le_bytes([data[4], data[5]]),
                originator_serial: u32::from_le_bytes([data[6], data[7], data[8], data[9]]),
                application_reply: Bytes::new(),
            };
            self.reply_rr(context, &Reply::success(FORWARD_CLOSE, reply.encode()));
        }
    }

    fn connect(stream: UnixStream, config: SessionConfig) -> Client<UnixStream, UnixStream> {
        let reader = FrameReader::new(stream.try_clone().unwrap());
        let writer = FrameWriter::new(stream);
        Client::register(reader, writer, config).unwrap()
    }

    fn vendor_request() -> Request {
        Request::new(GET_ATTRIBUTE_SINGLE, &EPath::attribute_of(1, 1, 1), Bytes::new()).unwrap()
    }

    #[test]
    fn unconnected_attribute_read() {
        let (left, right) = UnixStream::pair().unwrap();

        let device = thread::spawn(move || {
            let mut device = Device::new(left);
            device.register();
            let (context, request) = device.recv_rr();
            assert_eq!(request.encode().as_ref(), &[0x0E, 0x03, 0x20, 0x01, 0x24, 0x01, 0x30, 0x01]);
            device.reply_rr(context, &Reply::success(GET_ATTRIBUTE_SINGLE, vec![0x01, 0x00]));
        });

        let mut client = connect(right, SessionConfig::default());
        assert_eq!(client.session_handle(), SESSION);
        assert_eq!(client.protocol_version(), 1);

        let reply = client
            .submit_unconnected(&vendor_request(), None, Timing::DEFAULT)
            .unwrap();
        assert_eq!(reply.data.as_ref(), &[0x01, 0x00]);
        device.join().unwrap();
    }

    #[test]
    fn routed_request_failure_in_router() {
        let (left, right) = UnixStream::pair().unwrap();

        let device = thread::spawn(move || {
            let mut device = Device::new(left);
            device.register();
            let (context, request) = device.recv_rr();
            assert_eq!(request.service, UNCONNECTED_SEND);
            // timing, embedded length, then the embedded request
            assert_eq!(&request.data[..4], &[0x06, 0x9C, 0x08, 0x00]);
            assert_eq!(request.data[4], GET_ATTRIBUTE_SINGLE);
            device.reply_rr(context, &Reply::failure(UNCONNECTED_SEND, 0x01, vec![0x0204]));
        });

        let mut client = connect(right, SessionConfig::default());
        let route = EPath::new().port(1, [0u8]);
        let err = client
            .submit_unconnected(&vendor_request(), Some(&route), Timing::DEFAULT)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Cip(CipError::ProtocolStatus { service: UNCONNECTED_SEND, general: 0x01, .. })
        ));
        device.join().unwrap();
    }

    #[test]
    fn connected_exchange_with_out_of_order_replies() {
        let (left, right) = UnixStream::pair().unwrap();

        let device = thread::spawn(move || {
            let mut device = Device::new(left);
            device.register();
            let t_o = device.accept_open();

            let (first_id, first_seq, first) = device.recv_unit();
            let (_, second_seq, second) = device.recv_unit();
            assert_eq!(first_id, TARGET_O_T);
            assert_eq!(second_seq, first_seq.wrapping_add(1));
            device.reply_unit(t_o, second_seq, &Reply::success(second.service, vec![2]));
            device.reply_unit(t_o, first_seq, &Reply::success(first.service, vec![1]));

            let (_, sequence, request) = device.recv_unit();
            device.reply_unit(t_o, sequence, &Reply::success(request.service, vec![3]));

            device.accept_close();
        });

        let mut client = connect(right, SessionConfig::default());
        let established = client.open(EPath::new().port(1, [0u8])).unwrap();
        assert_eq!(established.o_t_connection_id, TARGET_O_T);
        assert_eq!(client.state(), ConnectionState::Established);

        let mut first = client.send_connected(&vendor_request()).unwrap();
        let mut second = client.send_connected(&vendor_request()).unwrap();
        let (mut first_reply, mut second_reply) = (None, None);
        while first_reply.is_none() || second_reply.is_none() {
            client.poll().unwrap();
            if first_reply.is_none() {
                first_reply = first.try_recv();
            }
            if second_reply.is_none() {
                second_reply = second.try_recv();
            }
        }
        assert_eq!(first_reply.unwrap().unwrap().data.as_ref(), &[1]);
        assert_eq!(second_reply.unwrap().unwrap().data.as_ref(), &[2]);

        let reply = client.submit_connected(&vendor_request()).unwrap();
        assert_eq!(reply.data.as_ref(), &[3]);

        client.close().unwrap();
        assert_eq!(client.state(), ConnectionState::Closed);
        device.join().unwrap();
    }

    #[test]
    fn rejected_open() {
        let (left, right) = UnixStream::pair().unwrap();

        let device = thread::spawn(move || {
            let mut device = Device::new(left);
            device.register();
            let (context, request) = device.recv_rr();
            assert_eq!(request.service, FORWARD_OPEN);
            device.reply_rr(context, &Reply::failure(FORWARD_OPEN, 0x01, vec![0x0113]));
        });

        let mut client = connect(right, SessionConfig::default());
        let err = client.open(EPath::new().port(1, [0u8])).unwrap_err();
        assert!(matches!(
            err.rejection(),
            Some(SessionError::Cip(CipError::ProtocolStatus {
                description: "Out of connections",
                ..
            }))
        ));
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(matches!(
            client.submit_connected(&vendor_request()),
            Err(SessionError::InvalidState { .. })
        ));
        device.join().unwrap();
    }

    #[test]
    fn garbled_open_reply_is_rejected() {
        let (left, right) = UnixStream::pair().unwrap();

        let device = thread::spawn(move || {
            let mut device = Device::new(left);
            device.register();
            let (context, request) = device.recv_rr();
            assert_eq!(request.service, FORWARD_OPEN);
            // Request service echoed without the reply bit.
            let frame = encapsulation::send_rr_data(SESSION, context, 0, &[0x54, 0x00, 0x00, 0x00])
                .unwrap();
            device.writer.write_frame(&frame).unwrap();
        });

        let mut client = connect(right, SessionConfig::default());
        let err = client.open(EPath::new().port(1, [0u8])).unwrap_err();
        assert!(matches!(
            err.rejection(),
            Some(SessionError::Cip(CipError::MalformedReply(_)))
        ));
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(client.connection().pending(), 0);
        device.join().unwrap();
    }

    #[test]
    fn open_timeout_returns_to_closed() {
        let (left, right) = UnixStream::pair().unwrap();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let device = thread::spawn(move || {
            let mut device = Device::new(left);
            device.register();
            let (_, request) = device.recv_rr();
            assert_eq!(request.service, FORWARD_OPEN);
            let _ = done_rx.recv();
        });

        let timeouts = right.try_clone().unwrap();
        let config = SessionConfig {
            timeout: Duration::from_millis(50),
            ..SessionConfig::default()
        };
        let mut client = connect(right, config);
        timeouts.set_read_timeout(Some(Duration::from_millis(10))).unwrap();
        let err = client.open(EPath::new().port(1, [0u8])).unwrap_err();
        assert!(matches!(err.rejection(), Some(SessionError::Timeout(_))));
        assert_eq!(client.state(), ConnectionState::Closed);

        done_tx.send(()).unwrap();
        device.join().unwrap();
    }

    #[test]
    fn unmatched_connected_replies_are_discarded() {
        let (left, right) = UnixStream::pair().unwrap();

        let device = thread::spawn(move || {
            let mut device = Device::new(left);
            device.register();
            let t_o = device.accept_open();

            let (_, sequence, request) = device.recv_unit();
            device.reply_unit(t_o ^ 1, sequence, &Reply::success(request.service, vec![0xEE]));
            device.reply_unit(
                t_o,
                sequence.wrapping_add(5),
                &Reply::success(request.service, vec![0xEF]),
            );
            device.reply_unit(t_o, sequence, &Reply::success(request.service, vec![7]));
        });

        let mut client = connect(right, SessionConfig::default());
        client.open(EPath::new().port(1, [0u8])).unwrap();
        let mut handle = client.send_connected(&vendor_request()).unwrap();

        // Wrong T→O connection id, then a sequence count nobody is waiting on.
        assert!(client.poll().unwrap());
        assert!(client.poll().unwrap());
        assert!(handle.try_recv().is_none());
        assert_eq!(client.connection().pending(), 1);

        assert!(client.poll().unwrap());
        let reply = handle.try_recv().unwrap().unwrap();
        assert_eq!(reply.data.as_ref(), &[7]);
        assert_eq!(client.connection().pending(), 0);
        device.join().unwrap();
    }

    #[test]
    fn register_reply_for_another_context() {
        let (left, right) = UnixStream::pair().unwrap();

        let device = thread::spawn(move || {
            let mut device = Device::new(left);
            let frame = device.reader.read_frame().unwrap();
            assert_eq!(frame.command, Command::RegisterSession);
            let stale = SenderContext::from_u64(frame.context.as_u64().wrapping_add(1));
            let reply = Frame::new(Command::RegisterSession, SESSION, stale, vec![1, 0, 0, 0]);
            device.writer.write_frame(&reply).unwrap();
        });

        let reader = FrameReader::new(right.try_clone().unwrap());
        let writer = FrameWriter::new(right);
        let err = Client::register(reader, writer, SessionConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::UnexpectedReply(_)));
        device.join().unwrap();
    }

    #[test]
    fn list_services_over_session() {
        let (left, right) = UnixStream::pair().unwrap();

        let device = thread::spawn(move || {
            let mut device = Device::new(left);
            device.register();
            let frame = device.reader.read_frame().unwrap();
            assert_eq!(frame.command, Command::ListServices);

            let mut item = BytesMut::new();
            item.put_u16_le(1);
            item.put_u16_le(0x0120);
            item.put_slice(b"Communications\0\0");
            let mut payload = BytesMut::new();
            cpf::encode_items(&[CpfItem::new(cpf::LIST_SERVICES, item.freeze())], &mut payload)
                .unwrap();
            let reply = Frame::new(Command::ListServices, 0, frame.context, payload.freeze());
            device.writer.write_frame(&reply).unwrap();
        });

        let mut client = connect(right, SessionConfig::default());
        let services = client.list_services().unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "Communications");
        assert!(services[0].supports_tcp());
        device.join().unwrap();
    }

    #[test]
    fn unconnected_timeout() {
        let (left, right) = UnixStream::pair().unwrap();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let device = thread::spawn(move || {
            let mut device = Device::new(left);
            device.register();
            let _ = device.recv_rr();
            // Keep the stream open without answering.
            let _ = done_rx.recv();
        });

        let timeouts = right.try_clone().unwrap();
        let config = SessionConfig {
            timeout: Duration::from_millis(50),
            ..SessionConfig::default()
        };
        let mut client = connect(right, config);
        timeouts.set_read_timeout(Some(Duration::from_millis(10))).unwrap();
        let err = client
            .submit_unconnected(&vendor_request(), None, Timing::DEFAULT)
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));

        done_tx.send(()).unwrap();
        device.join().unwrap();
    }

    #[test]
    fn disconnect_cancels_pending() {
        let (left, right) = UnixStream::pair().unwrap();

        let device = thread::spawn(move || {
            let mut device = Device::new(left);
            device.register();
            let t_o = device.accept_open();
            let _ = device.recv_unit();
            t_o
        });

        let mut client = connect(right, SessionConfig::default());
        client.open(EPath::new().port(1, [0u8])).unwrap();
        let mut handle = client.send_connected(&vendor_request()).unwrap();
        device.join().unwrap();

        assert!(matches!(client.poll(), Err(SessionError::Disconnected(_))));
        assert!(matches!(handle.try_recv(), Some(Err(SessionError::Cancelled))));
        assert_eq!(client.state(), ConnectionState::Closed);
    }
}
