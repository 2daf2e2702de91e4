//! `tokio_util` codec for reader frames.
//!
//! [`TagLinkCodec`] plugs the frame layer into the `Decoder`/`Encoder`
//! traits. The traits are driven synchronously over a [`BytesMut`] by the
//! blocking transports, and the same codec works with `Framed` streams.
//!
//! The decoded item type selects the direction: a host decodes
//! [`Response`](crate::Response)s, a reader (or simulator) decodes
//! [`Request`](crate::Request)s. Either side can encode any [`WireMessage`].
//!
//! ```
//! use bytes::BytesMut;
//! use tokio_util::codec::{Decoder, Encoder};
//! use taglink_protocol::{CommandCode, Request, Response, TagLinkCodec};
//!
//! let mut host = TagLinkCodec::<Response>::new();
//! let mut reader = TagLinkCodec::<Request>::new();
//!
//! let mut wire = BytesMut::new();
//! host.encode(Request::new(CommandCode::GetReaderInfo), &mut wire).unwrap();
//!
//! let request = reader.decode(&mut wire).unwrap().unwrap();
//! assert_eq!(request.command, CommandCode::GetReaderInfo);
//! ```

use std::marker::PhantomData;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{DEFAULT_MAX_PAYLOAD, Frame};
use crate::WireMessage;
use taglink_core::{Error, Result};

/// Codec decoding frames into `I`.
#[derive(Debug)]
pub struct TagLinkCodec<I> {
    max_payload: usize,
    _item: PhantomData<fn() -> I>,
}

impl<I> TagLinkCodec<I> {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Codec rejecting payloads above `max_payload` bytes.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload,
            _item: PhantomData,
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl<I> Default for TagLinkCodec<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Clone for TagLinkCodec<I> {
    fn clone(&self) -> Self {
        Self::with_max_payload(self.max_payload)
    }
}

impl<I: WireMessage> Decoder for TagLinkCodec<I> {
    type Item = I;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<I>> {
        match Frame::extract(src, self.max_payload)? {
            Some(frame) => I::decode_payload(frame.payload()).map(Some),
            None => Ok(None),
        }
    }
}

impl<I, M: WireMessage> Encoder<M> for TagLinkCodec<I> {
    type Error = Error;

    fn encode(&mut self, item: M, dst: &mut BytesMut) -> Result<()> {
        let mut payload = BytesMut::new();
        item.encode_payload(&mut payload)?;

        if payload.len() > self.max_payload {
            return Err(Error::FrameTooLarge {
                size: payload.len(),
                max_size: self.max_payload,
            });
        }

        Frame::new(payload.freeze()).encode(dst)
    }
}
