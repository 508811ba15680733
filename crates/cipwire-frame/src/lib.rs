//! EtherNet/IP encapsulation framing.
//!
//! Every message on an EtherNet/IP TCP stream is wrapped in a 24-byte
//! little-endian encapsulation header:
//! - command (2 bytes) and payload length (2 bytes)
//! - session handle (4 bytes) and status (4 bytes)
//! - sender context (8 bytes), echoed back by the target
//! - options (4 bytes)
//!
//! SendRRData / SendUnitData payloads carry a Common Packet Format list of
//! address and data items. The reader and writer here hide partial reads so
//! callers deal in whole frames only.

pub mod codec;
pub mod command;
pub mod cpf;
pub mod error;
pub mod reader;
pub mod reply;
pub mod request;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::EncapsulationCodec;
pub use codec::{
    decode_frame, encode_frame, parse_frame, Frame, FrameConfig, Parsed, SenderContext,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use command::Command;
pub use cpf::CpfItem;
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use reply::{decode_reply, EncapsulationReply, IdentityItem, SendData, ServiceItem};
pub use writer::FrameWriter;
