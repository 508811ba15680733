use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{decode_frame, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads encapsulation frames from a byte stream.
///
/// Bytes of a partially received frame stay buffered across calls, so a read
/// that times out halfway through a reply loses nothing.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(HEADER_SIZE + READ_CHUNK_SIZE),
            config,
        }
    }

    /// Block until a whole frame is available.
    ///
    /// EOF, even in the middle of a frame, is [`FrameError::ConnectionClosed`].
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.next_buffered()? {
                return Ok(frame);
            }
            self.fill()?;
        }
    }

    /// Like [`read_frame`](Self::read_frame), but a read timeout on the
    /// stream yields `Ok(None)` instead of an error.
    pub fn try_read_frame(&mut self) -> Result<Option<Frame>> {
        match self.read_frame() {
            Ok(frame) => Ok(Some(frame)),
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    fn next_buffered(&mut self) -> Result<Option<Frame>> {
        let frame = decode_frame(&mut self.buf, self.config.max_payload_size)?;
        if let Some(frame) = &frame {
            trace!(
                command = frame.command.name(),
                session = frame.session_handle,
                status = frame.status,
                len = frame.payload.len(),
                "read encapsulation frame"
            );
        }
        Ok(frame)
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

impl FrameReader<std::net::TcpStream> {
    /// Reader over a TCP stream with the configured read timeout applied.
    pub fn with_config_tcp(inner: std::net::TcpStream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}
