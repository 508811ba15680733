use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_frame, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Writes encapsulation frames to a byte stream.
///
/// Each frame goes out with a single `write_all` followed by a flush.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(HEADER_SIZE + 512),
            config,
        }
    }

    /// Encode `frame` and push it to the stream.
    ///
    /// Payloads above the configured maximum are refused before anything is
    /// written.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_frame(frame, &mut self.buf)?;
        trace!(
            command = frame.command.name(),
            session = frame.session_handle,
            context = ?frame.context,
            len = frame.payload.len(),
            "writing encapsulation frame"
        );

        self.inner
            .write_all(&self.buf)
            .and_then(|()| self.inner.flush())
            .map_err(|err| match err.kind() {
                ErrorKind::WriteZero | ErrorKind::BrokenPipe => FrameError::ConnectionClosed,
                _ => FrameError::Io(err),
            })
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl FrameWriter<std::net::TcpStream> {
    /// Writer over a TCP stream with the configured write timeout applied.
    pub fn with_config_tcp(inner: std::net::TcpStream, config: FrameConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}
