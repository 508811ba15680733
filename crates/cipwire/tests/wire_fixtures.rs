//! Byte-exact fixtures for the layers a client request passes through.

use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::Bytes;
use cipwire::cip::connection_manager::{unconnected_send, unwrap_unconnected_reply};
use cipwire::cip::service::GET_ATTRIBUTE_SINGLE;
use cipwire::cip::{CipError, Timing};
use cipwire::frame::request::{register_session, send_rr_data};
use cipwire::frame::{decode_reply, parse_frame, EncapsulationReply, Parsed, SenderContext};
use cipwire::{EPath, Reply, Request};

const CONTEXT: SenderContext = SenderContext([1, 2, 3, 4, 5, 6, 7, 8]);

#[test]
fn symbolic_tag_with_element() {
    let path = EPath::parse_symbol("setpoints[5]").unwrap();
    assert_eq!(
        path.encode().unwrap().as_ref(),
        b"\x91\x09setpoints\x00\x28\x05"
    );
}

#[test]
fn logical_attribute_path() {
    let path = EPath::attribute_of(2, 1, 1);
    assert_eq!(path.encode().unwrap().as_ref(), [0x20, 0x02, 0x24, 0x01, 0x30, 0x01]);
}

#[test]
fn register_session_frame() {
    let bytes = register_session(SenderContext::NULL).to_bytes().unwrap();
    let mut expected = vec![0x65, 0x00, 0x04, 0x00];
    expected.extend_from_slice(&[0; 20]);
    expected.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]);
    assert_eq!(bytes.as_ref(), expected.as_slice());
}

#[test]
fn routed_get_attribute_in_send_rr_data() {
    let request = Request::new(GET_ATTRIBUTE_SINGLE, &EPath::attribute_of(1, 1, 7), Bytes::new())
        .unwrap();
    let routed = unconnected_send(&request, &EPath::new().port(1, [0u8]), Timing::DEFAULT).unwrap();
    let message = routed.encode();
    assert_eq!(
        message.as_ref(),
        [
            0x52, 0x02, 0x20, 0x06, 0x24, 0x01, // Unconnected Send to the Connection Manager
            0x06, 0x9C, 0x08, 0x00, // timing, embedded length
            0x0E, 0x03, 0x20, 0x01, 0x24, 0x01, 0x30, 0x07, // embedded request
            0x01, 0x00, 0x01, 0x00, // one route word, reserved, port 1 slot 0
        ]
    );

    let frame = send_rr_data(0x1122_3344, CONTEXT, 0, &message).unwrap();
    let bytes = frame.to_bytes().unwrap();
    let mut expected = vec![
        0x6F, 0x00, 0x26, 0x00, 0x44, 0x33, 0x22, 0x11, 0x00, 0x00, 0x00, 0x00, 1, 2, 3, 4, 5, 6,
        7, 8, 0x00, 0x00, 0x00, 0x00, // header
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, // interface, timeout, item count
        0x00, 0x00, 0x00, 0x00, // null address
        0xB2, 0x00, 0x16, 0x00, // unconnected data
    ];
    expected.extend_from_slice(&message);
    assert_eq!(bytes.as_ref(), expected.as_slice());
}

#[test]
fn router_failure_inside_unconnected_send() {
    let reply = Reply::decode(&[0xD2, 0x00, 0x01, 0x01, 0x04, 0x02]).unwrap();
    let err = unwrap_unconnected_reply(reply, GET_ATTRIBUTE_SINGLE, Some(1)).unwrap_err();
    assert!(matches!(
        err,
        CipError::ProtocolStatus {
            service: 0x52,
            general: 0x01,
            ref extended,
            remaining_path_words: None,
            ..
        } if extended == &[0x0204]
    ));

    // Invalid port: the remaining path size follows the extended status.
    let reply = Reply::decode(&[0xD2, 0x00, 0x01, 0x01, 0x11, 0x03, 0x01, 0x00]).unwrap();
    let err = unwrap_unconnected_reply(reply, GET_ATTRIBUTE_SINGLE, Some(1)).unwrap_err();
    assert!(matches!(
        err,
        CipError::ProtocolStatus {
            service: 0x52,
            remaining_path_words: Some(1),
            ..
        }
    ));
}

#[test]
fn list_identity_reply() {
    let mut item = vec![0x01, 0x00]; // protocol version
    item.extend_from_slice(&[0x00, 0x02, 0xAF, 0x12, 192, 168, 1, 10]); // big-endian sockaddr
    item.extend_from_slice(&[0; 8]);
    item.extend_from_slice(&[0x01, 0x00, 0x0E, 0x00, 0x36, 0x00]); // vendor, type, product code
    item.extend_from_slice(&[20, 11, 0x60, 0x30, 0x78, 0x56, 0x34, 0x12]); // revision, status, serial
    item.push(4);
    item.extend_from_slice(b"L85E");
    item.push(3);

    let mut payload = vec![0x01, 0x00, 0x0C, 0x00];
    payload.extend_from_slice(&(item.len() as u16).to_le_bytes());
    payload.extend_from_slice(&item);

    let mut wire = vec![0x63, 0x00];
    wire.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    wire.extend_from_slice(&[0; 20]);
    wire.extend_from_slice(&payload);

    let frame = match parse_frame(&wire, usize::from(u16::MAX)).unwrap() {
        Parsed::Complete { frame, rest } => {
            assert!(rest.is_empty());
            frame
        }
        Parsed::Incomplete { .. } => panic!("frame should be complete"),
    };
    let EncapsulationReply::ListIdentity(items) = decode_reply(&frame).unwrap() else {
        panic!("expected ListIdentity");
    };
    assert_eq!(items.len(), 1);
    let identity = &items[0];
    assert_eq!(identity.socket_family, 2);
    assert_eq!(
        identity.socket_address,
        SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 10), 0xAF12)
    );
    assert_eq!(identity.vendor_id, 1);
    assert_eq!(identity.revision, (20, 11));
    assert_eq!(identity.serial_number, 0x1234_5678);
    assert_eq!(identity.product_name, "L85E");
}

#[test]
fn short_input_is_incomplete() {
    assert_eq!(
        parse_frame(&[0x65, 0x00, 0x04, 0x00], 65535).unwrap(),
        Parsed::Incomplete { needed: 24 }
    );
    let mut header = vec![0x65, 0x00, 0x04, 0x00];
    header.extend_from_slice(&[0; 20]);
    assert_eq!(
        parse_frame(&header, 65535).unwrap(),
        Parsed::Incomplete { needed: 28 }
    );
}
