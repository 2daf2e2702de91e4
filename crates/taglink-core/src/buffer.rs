//! Owned byte buffers exchanged with readers.
//!
//! Every read returns a [`DataBuffer`] owned by the caller; writes borrow
//! their payload as a plain `&[u8]`, so a buffer obtained from a read can
//! be written back without copying.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

use crate::{Result, error::Error};

/// Length-prefixed byte sequence returned by reads.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataBuffer(#[serde(with = "hex_bytes")] Bytes);

impl DataBuffer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    /// A buffer of `len` zero bytes.
    pub fn zeroed(len: usize) -> Self {
        Self(Bytes::from(vec![0u8; len]))
    }

    /// Parse an upper or lower case hex string (whitespace ignored).
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` on odd length or non-hex digits.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits: Vec<u8> = hex.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
        if digits.len() % 2 != 0 {
            return Err(Error::invalid_argument(format!(
                "Hex string has odd length {}",
                digits.len()
            )));
        }

        digits
            .chunks(2)
            .map(|pair| {
                let text = std::str::from_utf8(pair)
                    .map_err(|_| Error::invalid_argument("Hex string is not ASCII"))?;
                u8::from_str_radix(text, 16)
                    .map_err(|_| Error::invalid_argument(format!("Invalid hex digits '{text}'")))
            })
            .collect::<Result<Vec<u8>>>()
            .map(Self::new)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// First byte, used by single-byte parameters.
    #[must_use]
    pub fn first(&self) -> Option<u8> {
        self.0.first().copied()
    }

    /// Upper-case hex rendering without separators.
    #[must_use]
    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }

    /// Copy of the buffer with every byte ANDed with `mask`.
    #[must_use]
    pub fn masked(&self, mask: u8) -> Self {
        Self(self.0.iter().map(|b| b & mask).collect::<Vec<u8>>().into())
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for DataBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for DataBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for DataBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self(data.into())
    }
}

impl From<&[u8]> for DataBuffer {
    fn from(data: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(data))
    }
}

impl From<Bytes> for DataBuffer {
    fn from(data: Bytes) -> Self {
        Self(data)
    }
}

impl fmt::Debug for DataBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DataBuffer({})", self.to_hex())
    }
}

impl fmt::Display for DataBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Upper-case hex rendering of a byte slice.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

mod hex_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::DataBuffer::from_hex(&text)
            .map(super::DataBuffer::into_bytes)
            .map_err(serde::de::Error::custom)
    }
}
