//! Message Router request and reply envelopes.
//!
//! ```text
//! request: service | path words | path ... | data ...
//! reply:   service|0x80 | reserved | general status | ext words | ext status ... | data ...
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::epath::EPath;
use crate::error::{CipError, Result};
use crate::service::{service_name, REPLY_MASK};
use crate::status;

/// An explicit message addressed to an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub service: u8,
    /// Encoded request path, always an even number of bytes.
    pub path: Bytes,
    pub data: Bytes,
}

impl Request {
    /// Build a request for `service` on `path`.
    pub fn new(service: u8, path: &EPath, data: impl Into<Bytes>) -> Result<Self> {
        Self::with_encoded_path(service, path.encode()?, data)
    }

    /// Build a request from an already encoded path.
    pub fn with_encoded_path(service: u8, path: Bytes, data: impl Into<Bytes>) -> Result<Self> {
        if path.len() % 2 != 0 {
            return Err(CipError::encode(format!(
                "request path of {} bytes is not word aligned",
                path.len()
            )));
        }
        if path.len() / 2 > usize::from(u8::MAX) {
            return Err(CipError::encode(format!(
                "request path of {} words exceeds 255",
                path.len() / 2
            )));
        }
        if service & REPLY_MASK != 0 {
            return Err(CipError::encode(format!(
                "service 0x{service:02X} has the reply bit set"
            )));
        }
        Ok(Self {
            service,
            path,
            data: data.into(),
        })
    }

    /// Number of bytes [`Request::encode_into`] writes.
    pub fn encoded_len(&self) -> usize {
        2 + self.path.len() + self.data.len()
    }

    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(self.service);
        dst.put_u8((self.path.len() / 2) as u8);
        dst.put_slice(&self.path);
        dst.put_slice(&self.data);
    }

    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut dst);
        dst.freeze()
    }

    /// Parse a request, as a target would.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        if buf.len() < 2 {
            return Err(CipError::malformed_reply("request shorter than 2 bytes"));
        }
        let service = buf.get_u8();
        let path_len = usize::from(buf.get_u8()) * 2;
        if buf.len() < path_len {
            return Err(CipError::malformed_reply(format!(
                "request path declares {path_len} bytes, {} present",
                buf.len()
            )));
        }
        Ok(Self {
            service,
            path: Bytes::copy_from_slice(&buf[..path_len]),
            data: Bytes::copy_from_slice(&buf[path_len..]),
        })
    }

    /// Decode the request path.
    pub fn epath(&self) -> Result<EPath> {
        EPath::decode(&self.path)
    }

    /// Class addressed by the request path, if it names one.
    pub fn class(&self) -> Option<u16> {
        self.epath()
            .ok()
            .and_then(|path| path.class_id())
            .and_then(|class| u16::try_from(class).ok())
    }

    pub fn service_name(&self) -> &'static str {
        service_name(self.service).unwrap_or("object specific service")
    }
}

/// A Message Router reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Service code with the reply bit set.
    pub service: u8,
    pub general_status: u8,
    /// Additional status words.
    pub extended_status: Vec<u16>,
    pub data: Bytes,
}

impl Reply {
    /// A successful reply to `request_service`.
    pub fn success(request_service: u8, data: impl Into<Bytes>) -> Self {
        Self {
            service: request_service | REPLY_MASK,
            general_status: status::SUCCESS,
            extended_status: Vec::new(),
            data: data.into(),
        }
    }

    /// A failed reply to `request_service`.
    pub fn failure(request_service: u8, general_status: u8, extended_status: Vec<u16>) -> Self {
        Self {
            service: request_service | REPLY_MASK,
            general_status,
            extended_status,
            data: Bytes::new(),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        if buf.len() < 4 {
            return Err(CipError::malformed_reply(format!(
                "reply of {} bytes is shorter than the 4-byte header",
                bytes.len()
            )));
        }
        let service = buf.get_u8();
        if service & REPLY_MASK == 0 {
            return Err(CipError::malformed_reply(format!(
                "service 0x{service:02X} does not have the reply bit set"
            )));
        }
        buf.advance(1);
        let general_status = buf.get_u8();
        let words = usize::from(buf.get_u8());
        if buf.len() < words * 2 {
            return Err(CipError::malformed_reply(format!(
                "{words} extended status words declared, {} bytes present",
                buf.len()
            )));
        }
        let extended_status = (0..words).map(|_| buf.get_u16_le()).collect();
        Ok(Self {
            service,
            general_status,
            extended_status,
            data: Bytes::copy_from_slice(buf),
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(4 + self.extended_status.len() * 2 + self.data.len());
        dst.put_u8(self.service);
        dst.put_u8(0);
        dst.put_u8(self.general_status);
        dst.put_u8(self.extended_status.len() as u8);
        for word in &self.extended_status {
            dst.put_u16_le(*word);
        }
        dst.put_slice(&self.data);
        dst.freeze()
    }

    /// The request service this reply answers.
    pub fn request_service(&self) -> u8 {
        self.service & !REPLY_MASK
    }

    pub fn is_success(&self) -> bool {
        self.general_status == status::SUCCESS
    }

    /// Check that this reply answers `request_service`.
    pub fn expect_service(&self, request_service: u8) -> Result<()> {
        if self.request_service() != request_service {
            return Err(CipError::ServiceMismatch {
                expected: request_service,
                actual: self.request_service(),
            });
        }
        Ok(())
    }

    /// Turn a non-zero general status into [`CipError::ProtocolStatus`],
    /// described with the table of `class` when it has one.
    pub fn into_result(self, class: Option<u16>) -> Result<Reply> {
        if self.is_success() {
            return Ok(self);
        }
        Err(self.status_error(class))
    }

    /// The error for this reply's status, whatever it is.
    pub fn status_error(&self, class: Option<u16>) -> CipError {
        CipError::ProtocolStatus {
            service: self.request_service(),
            class,
            general: self.general_status,
            extended: self.extended_status.clone(),
            description: status::describe(class, self.general_status, &self.extended_status),
            remaining_path_words: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class;
    use crate::service::GET_ATTRIBUTE_SINGLE;

    #[test]
    fn encodes_get_attribute_single() {
        let request = Request::new(GET_ATTRIBUTE_SINGLE, &EPath::attribute_of(1, 1, 7), Bytes::new())
            .unwrap();
        assert_eq!(
            request.encode().as_ref(),
            &[0x0E, 0x03, 0x20, 0x01, 0x24, 0x01, 0x30, 0x07]
        );
        assert_eq!(request.class(), Some(1));
        assert_eq!(request.service_name(), "Get_Attribute_Single");
        assert_eq!(Request::decode(&request.encode()).unwrap(), request);
    }

    #[test]
    fn rejects_bad_requests() {
        assert!(Request::with_encoded_path(0x0E, Bytes::from_static(&[0x20]), Bytes::new()).is_err());
        assert!(Request::with_encoded_path(0x8E, Bytes::new(), Bytes::new()).is_err());
        assert!(Request::with_encoded_path(0x0E, Bytes::from(vec![0x20; 512]), Bytes::new()).is_err());
        assert!(Request::decode(&[0x0E, 0x02, 0x20]).is_err());
    }

    #[test]
    fn decodes_success_reply() {
        let reply = Reply::decode(&[0x8E, 0x00, 0x00, 0x00, 0x2A, 0x00]).unwrap();
        assert_eq!(reply.request_service(), GET_ATTRIBUTE_SINGLE);
        assert!(reply.is_success());
        assert_eq!(reply.data.as_ref(), &[0x2A, 0x00]);
        reply.expect_service(GET_ATTRIBUTE_SINGLE).unwrap();
        assert_eq!(Reply::decode(&reply.encode()).unwrap(), reply);
    }

    #[test]
    fn decodes_extended_status() {
        let reply = Reply::decode(&[0xD4, 0x00, 0x01, 0x01, 0x00, 0x01, 0xAA]).unwrap();
        assert_eq!(reply.general_status, 0x01);
        assert_eq!(reply.extended_status, vec![0x0100]);
        assert_eq!(reply.data.as_ref(), &[0xAA]);

        let err = reply.into_result(Some(class::CONNECTION_MANAGER)).unwrap_err();
        assert!(matches!(
            err,
            CipError::ProtocolStatus {
                service: 0x54,
                general: 0x01,
                description: "Connection in use or duplicate forward open",
                ..
            }
        ));
    }

    #[test]
    fn reply_bit_required() {
        let err = Reply::decode(&[0x0E, 0x00, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, CipError::MalformedReply(_)));
    }

    #[test]
    fn truncated_replies() {
        assert!(matches!(Reply::decode(&[0x8E, 0x00]).unwrap_err(), CipError::MalformedReply(_)));
        assert!(matches!(
            Reply::decode(&[0x8E, 0x00, 0x01, 0x02, 0x00]).unwrap_err(),
            CipError::MalformedReply(_)
        ));
    }

    #[test]
    fn service_mismatch() {
        let reply = Reply::success(0x4C, Bytes::new());
        let err = reply.expect_service(0x4D).unwrap_err();
        assert!(matches!(err, CipError::ServiceMismatch { expected: 0x4D, actual: 0x4C }));
    }

    #[test]
    fn general_status_without_class_table() {
        let err = Reply::failure(0x0E, 0x05, vec![]).into_result(None).unwrap_err();
        assert!(matches!(
            err,
            CipError::ProtocolStatus { description: "Path destination unknown", .. }
        ));
    }
}
