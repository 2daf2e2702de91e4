//! Shared helpers for the protocol integration tests.

#![allow(dead_code)]

use bytes::BytesMut;
use taglink_core::TagType;
use taglink_protocol::{CommandCode, Request, RequestBuilder, Response, StatusCode, TagLinkCodec};
use tokio_util::codec::{Decoder, Encoder};

/// A Gen2 EPC used across tests.
pub const TEST_EPC: [u8; 12] = [
    0xE2, 0x00, 0x34, 0x12, 0x01, 0x3B, 0xF7, 0x00, 0x01, 0x02, 0x03, 0x04,
];

/// Encode a request the way the host does.
pub fn encode_request(request: Request) -> BytesMut {
    let mut buffer = BytesMut::new();
    TagLinkCodec::<Response>::new()
        .encode(request, &mut buffer)
        .expect("request encodes");
    buffer
}

/// Encode a response the way the reader does.
pub fn encode_response(response: Response) -> BytesMut {
    let mut buffer = BytesMut::new();
    TagLinkCodec::<Request>::new()
        .encode(response, &mut buffer)
        .expect("response encodes");
    buffer
}

/// Decode every response contained in `buffer`.
pub fn decode_responses(buffer: &mut BytesMut) -> Vec<Response> {
    let mut codec = TagLinkCodec::<Response>::new();
    let mut responses = Vec::new();
    while let Some(response) = codec.decode(buffer).expect("valid stream") {
        responses.push(response);
    }
    responses
}

pub fn read_epc_request() -> Request {
    RequestBuilder::new(CommandCode::ReadTag)
        .tag(TagType::Gen2, TEST_EPC.to_vec())
        .bank(1)
        .address(2, 6)
        .build()
        .expect("valid request")
}

pub fn tag_found(tag_type: TagType, id: &[u8]) -> Response {
    Response::new(CommandCode::SelectTag, StatusCode::TagFound).with_tag(tag_type, id.to_vec())
}
