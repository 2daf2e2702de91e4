//! Binary frame layer.
//!
//! Every request and response travels inside a frame:
//!
//! ```text
//! +-----+----------+---------------+----------+
//! | STX | len: u16 | payload ...   | crc: u16 |
//! +-----+----------+---------------+----------+
//! ```
//!
//! Multi-byte fields are big endian. The CRC is CRC-16/CCITT-FALSE computed
//! over the length field and the payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use taglink_core::{Error, Result};

/// Start of frame marker.
pub const STX: u8 = 0x02;

/// Bytes added around the payload (STX, length, CRC).
pub const FRAME_OVERHEAD: usize = 5;

/// Default payload size limit in bytes.
pub const DEFAULT_MAX_PAYLOAD: usize = 4096;

const HEADER_LEN: usize = 3;

/// A complete frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Size of the frame on the wire.
    pub fn encoded_len(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }

    /// Append the framed bytes to `dst`.
    ///
    /// # Errors
    /// Returns `Error::FrameTooLarge` if the payload does not fit the length field.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let len = u16::try_from(self.payload.len()).map_err(|_| Error::FrameTooLarge {
            size: self.payload.len(),
            max_size: usize::from(u16::MAX),
        })?;

        dst.reserve(self.encoded_len());
        dst.put_u8(STX);
        dst.put_u16(len);
        dst.put_slice(&self.payload);

        let crc = crc16(&dst[dst.len() - self.payload.len() - 2..]);
        dst.put_u16(crc);
        Ok(())
    }

    /// Extract the next complete frame from `src`.
    ///
    /// Bytes preceding a start marker are discarded. Returns `Ok(None)` when
    /// more input is needed. On a CRC mismatch or an oversized length the
    /// start marker is skipped so the next call resynchronises on the
    /// following marker.
    ///
    /// # Errors
    /// `Error::FrameTooLarge` for a length above `max_payload` and
    /// `Error::Communication` for a CRC mismatch.
    pub fn extract(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
        match src.iter().position(|&b| b == STX) {
            Some(0) => {}
            Some(offset) => src.advance(offset),
            None => {
                src.clear();
                return Ok(None);
            }
        }

        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let len = usize::from(u16::from_be_bytes([src[1], src[2]]));
        if len > max_payload {
            src.advance(1);
            return Err(Error::FrameTooLarge {
                size: len,
                max_size: max_payload,
            });
        }

        let total = len + FRAME_OVERHEAD;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let expected = u16::from_be_bytes([src[total - 2], src[total - 1]]);
        let actual = crc16(&src[1..total - 2]);
        if expected != actual {
            src.advance(1);
            return Err(Error::communication(format!(
                "Frame CRC mismatch: expected 0x{expected:04X}, computed 0x{actual:04X}"
            )));
        }

        let mut frame = src.split_to(total);
        frame.advance(HEADER_LEN);
        frame.truncate(len);
        Ok(Some(Frame::new(frame.freeze())))
    }
}

/// CRC-16/CCITT-FALSE (polynomial 0x1021, initial value 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}
