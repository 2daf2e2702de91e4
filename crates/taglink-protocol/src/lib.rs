pub mod builder;
pub mod codec;
pub mod commands;
pub mod frame;
pub mod message;
pub mod status;

pub use builder::RequestBuilder;
pub use codec::TagLinkCodec;
pub use commands::{CommandCode, RequestFlags};
pub use frame::{Frame, crc16};
pub use message::{ReaderInfo, Request, Response, WireMessage};
pub use status::StatusCode;

/// Protocol version spoken by this host.
///
/// Readers reporting a higher version are rejected during negotiation.
pub const PROTOCOL_VERSION: u8 = 1;
