use bytes::{BufMut, BytesMut};
use tracing::debug;

use super::{path, Timing, UNCONNECTED_SEND};
use crate::class;
use crate::epath::EPath;
use crate::error::{CipError, Result};
use crate::router::{Reply, Request};
use crate::status;

/// Wrap `request` in an Unconnected Send that the Connection Manager
/// forwards along `route`.
///
/// ```text
/// timing | message length | message ... | pad? | route words | reserved | route ...
/// ```
pub fn unconnected_send(request: &Request, route: &EPath, timing: Timing) -> Result<Request> {
    let message = request.encode();
    let message_len = u16::try_from(message.len()).map_err(|_| {
        CipError::encode(format!("embedded request of {} bytes is too long", message.len()))
    })?;
    let route = route.encode()?;
    let route_words = u8::try_from(route.len() / 2)
        .map_err(|_| CipError::encode(format!("route of {} bytes is too long", route.len())))?;

    let pad = message.len() % 2;
    let mut data = BytesMut::with_capacity(6 + message.len() + pad + route.len());
    timing.encode_into(&mut data);
    data.put_u16_le(message_len);
    data.put_slice(&message);
    if pad == 1 {
        data.put_u8(0);
    }
    data.put_u8(route_words);
    data.put_u8(0);
    data.put_slice(&route);

    Request::new(UNCONNECTED_SEND, &path(), data.freeze())
}

/// Routing failures reported by the Connection Manager itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnconnectedSendStatus {
    Timeout,
    InvalidPort,
    InvalidNodeAddress,
    InvalidSegment,
    ResourceUnavailable,
    ParsingError,
}

impl UnconnectedSendStatus {
    pub fn description(&self) -> &'static str {
        match self {
            UnconnectedSendStatus::Timeout => "Unconnected send timed out waiting for a response",
            UnconnectedSendStatus::InvalidPort => "Invalid port ID in the route",
            UnconnectedSendStatus::InvalidNodeAddress => "Invalid node address in the route",
            UnconnectedSendStatus::InvalidSegment => "Invalid segment type in the route",
            UnconnectedSendStatus::ResourceUnavailable => {
                "No buffer available for the unconnected send"
            }
            UnconnectedSendStatus::ParsingError => "Unconnected send could not parse the route",
        }
    }

    /// Failures caused by the route itself. Their reply data starts with
    /// the remaining path size.
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            UnconnectedSendStatus::InvalidPort
                | UnconnectedSendStatus::InvalidNodeAddress
                | UnconnectedSendStatus::InvalidSegment
        )
    }
}

/// Classify an Unconnected Send failure.
pub fn unconnected_send_status(general: u8, extended: Option<u16>) -> Option<UnconnectedSendStatus> {
    match (general, extended) {
        (status::CONNECTION_FAILURE, Some(0x0204)) => Some(UnconnectedSendStatus::Timeout),
        (status::CONNECTION_FAILURE, Some(0x0311)) => Some(UnconnectedSendStatus::InvalidPort),
        (status::CONNECTION_FAILURE, Some(0x0312)) => {
            Some(UnconnectedSendStatus::InvalidNodeAddress)
        }
        (status::CONNECTION_FAILURE, Some(0x0315)) => Some(UnconnectedSendStatus::InvalidSegment),
        (status::RESOURCE_UNAVAILABLE, _) => Some(UnconnectedSendStatus::ResourceUnavailable),
        (status::PATH_SEGMENT_ERROR, _) => Some(UnconnectedSendStatus::ParsingError),
        _ => None,
    }
}

/// Resolve the reply to an Unconnected Send.
///
/// A reply carrying the Unconnected Send service is a routing failure from
/// the Connection Manager. Anything else is the embedded request's own
/// reply, checked against `embedded_service` and described with the table
/// of `embedded_class`.
pub fn unwrap_unconnected_reply(
    reply: Reply,
    embedded_service: u8,
    embedded_class: Option<u16>,
) -> Result<Reply> {
    if reply.request_service() == UNCONNECTED_SEND && embedded_service != UNCONNECTED_SEND {
        if reply.is_success() {
            return Err(CipError::malformed_reply(
                "unconnected send succeeded without an embedded reply",
            ));
        }
        let extended = reply.extended_status.first().copied();
        debug!(
            general = reply.general_status,
            ?extended,
            embedded_service,
            "unconnected send failed in the router"
        );
        let classified = unconnected_send_status(reply.general_status, extended);
        let description = match classified {
            Some(status) => status.description(),
            None => status::describe(
                Some(class::CONNECTION_MANAGER),
                reply.general_status,
                &reply.extended_status,
            ),
        };
        let remaining_path_words = classified
            .filter(UnconnectedSendStatus::is_routing)
            .and_then(|_| reply.data.first().copied());
        return Err(CipError::ProtocolStatus {
            service: UNCONNECTED_SEND,
            class: Some(class::CONNECTION_MANAGER),
            general: reply.general_status,
            extended: reply.extended_status,
            description,
            remaining_path_words,
        });
    }
    reply.expect_service(embedded_service)?;
    reply.into_result(embedded_class)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::service::GET_ATTRIBUTE_SINGLE;

    fn get_vendor() -> Request {
        Request::new(GET_ATTRIBUTE_SINGLE, &EPath::attribute_of(1, 1, 1), Bytes::new()).unwrap()
    }

    #[test]
    fn wraps_even_request() {
        let wrapped =
            unconnected_send(&get_vendor(), &EPath::new().port(1, [0u8]), Timing::DEFAULT).unwrap();
        assert_eq!(wrapped.service, UNCONNECTED_SEND);
        assert_eq!(wrapped.path.as_ref(), &[0x20, 0x06, 0x24, 0x01]);
        assert_eq!(
            wrapped.data.as_ref(),
            &[
                0x06, 0x9C, 0x08, 0x00, 0x0E, 0x03, 0x20, 0x01, 0x24, 0x01, 0x30, 0x01, 0x01,
                0x00, 0x01, 0x00
            ]
        );
    }

    #[test]
    fn pads_odd_request() {
        let request = Request::new(0x4C, &EPath::object(0x6B, 1), Bytes::from_static(&[0x01])).unwrap();
        let wrapped = unconnected_send(&request, &EPath::new().port(1, [2u8]), Timing::new(2, 10)).unwrap();
        assert_eq!(
            wrapped.data.as_ref(),
            &[0x02, 0x0A, 0x07, 0x00, 0x4C, 0x02, 0x20, 0x6B, 0x24, 0x01, 0x01, 0x00, 0x01, 0x00, 0x01, 0x02]
        );
    }

    #[test]
    fn embedded_success_passes_through() {
        let reply = Reply::success(GET_ATTRIBUTE_SINGLE, Bytes::from_static(&[0x01, 0x00]));
        let unwrapped = unwrap_unconnected_reply(reply.clone(), GET_ATTRIBUTE_SINGLE, Some(1)).unwrap();
        assert_eq!(unwrapped, reply);
    }

    #[test]
    fn embedded_failure_keeps_embedded_service() {
        let reply = Reply::failure(GET_ATTRIBUTE_SINGLE, 0x14, vec![]);
        let err = unwrap_unconnected_reply(reply, GET_ATTRIBUTE_SINGLE, Some(1)).unwrap_err();
        assert!(matches!(
            err,
            CipError::ProtocolStatus { service: GET_ATTRIBUTE_SINGLE, general: 0x14, .. }
        ));
    }

    #[test]
    fn routing_failures() {
        let reply = Reply::failure(UNCONNECTED_SEND, 0x01, vec![0x0204]);
        let err = unwrap_unconnected_reply(reply, GET_ATTRIBUTE_SINGLE, None).unwrap_err();
        assert!(matches!(
            err,
            CipError::ProtocolStatus {
                service: UNCONNECTED_SEND,
                general: 0x01,
                description: "Unconnected send timed out waiting for a response",
                ..
            }
        ));

        let reply = Reply::failure(UNCONNECTED_SEND, 0x01, vec![0x0312]);
        let err = unwrap_unconnected_reply(reply, GET_ATTRIBUTE_SINGLE, None).unwrap_err();
        assert_eq!(err.general_status(), Some(0x01));

        // Invalid node address, two route words left, then the pad byte.
        let reply = Reply::decode(&[0xD2, 0x00, 0x01, 0x01, 0x12, 0x03, 0x02, 0x00]).unwrap();
        let err = unwrap_unconnected_reply(reply, GET_ATTRIBUTE_SINGLE, None).unwrap_err();
        assert!(matches!(
            err,
            CipError::ProtocolStatus {
                description: "Invalid node address in the route",
                remaining_path_words: Some(2),
                ..
            }
        ));

        let reply = Reply::failure(UNCONNECTED_SEND, 0x01, vec![0x0100]);
        let err = unwrap_unconnected_reply(reply, GET_ATTRIBUTE_SINGLE, None).unwrap_err();
        assert!(matches!(
            err,
            CipError::ProtocolStatus { description: "Connection in use or duplicate forward open", .. }
        ));
    }

    #[test]
    fn mismatched_embedded_service() {
        let reply = Reply::success(0x4C, Bytes::new());
        assert!(matches!(
            unwrap_unconnected_reply(reply, GET_ATTRIBUTE_SINGLE, None),
            Err(CipError::ServiceMismatch { expected: GET_ATTRIBUTE_SINGLE, actual: 0x4C })
        ));
    }

    #[test]
    fn classify() {
        assert_eq!(unconnected_send_status(0x01, Some(0x0311)), Some(UnconnectedSendStatus::InvalidPort));
        assert_eq!(unconnected_send_status(0x01, Some(0x0315)), Some(UnconnectedSendStatus::InvalidSegment));
        assert_eq!(unconnected_send_status(0x02, None), Some(UnconnectedSendStatus::ResourceUnavailable));
        assert_eq!(unconnected_send_status(0x04, None), Some(UnconnectedSendStatus::ParsingError));
        assert_eq!(unconnected_send_status(0x01, Some(0x0100)), None);
    }
}
