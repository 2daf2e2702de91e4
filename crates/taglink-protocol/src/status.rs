//! Response status codes and their descriptions.
//!
//! Codes below `0x80` are positive responses; codes from `0x80` upwards are
//! negative acknowledgments and are preserved verbatim in
//! `taglink_core::Error::DeviceError`.

use std::fmt;
use taglink_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    /// One tag reported during an inventory round.
    TagFound,
    /// End of an inventory round.
    InventoryComplete,
    /// A previous select loop was switched off; the request must be reissued.
    LoopOff,
    InvalidCommand,
    BadFrame,
    BadCrc,
    InvalidAddress,
    NoTag,
    ReadFailed,
    WriteFailed,
    LockedMemory,
    InvalidTagType,
    InvalidParameter,
    AccessDenied,
    Unknown(u8),
}

impl StatusCode {
    #[must_use]
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x00 => Self::Success,
            0x01 => Self::TagFound,
            0x02 => Self::InventoryComplete,
            0x04 => Self::LoopOff,
            0x80 => Self::InvalidCommand,
            0x81 => Self::BadFrame,
            0x82 => Self::BadCrc,
            0x83 => Self::InvalidAddress,
            0x84 => Self::NoTag,
            0x85 => Self::ReadFailed,
            0x86 => Self::WriteFailed,
            0x87 => Self::LockedMemory,
            0x88 => Self::InvalidTagType,
            0x89 => Self::InvalidParameter,
            0x8A => Self::AccessDenied,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::TagFound => 0x01,
            Self::InventoryComplete => 0x02,
            Self::LoopOff => 0x04,
            Self::InvalidCommand => 0x80,
            Self::BadFrame => 0x81,
            Self::BadCrc => 0x82,
            Self::InvalidAddress => 0x83,
            Self::NoTag => 0x84,
            Self::ReadFailed => 0x85,
            Self::WriteFailed => 0x86,
            Self::LockedMemory => 0x87,
            Self::InvalidTagType => 0x88,
            Self::InvalidParameter => 0x89,
            Self::AccessDenied => 0x8A,
            Self::Unknown(code) => *code,
        }
    }

    /// Negative acknowledgment from the reader.
    #[must_use]
    pub fn is_nack(&self) -> bool {
        self.as_u8() >= 0x80
    }

    /// Human readable description of the status.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::TagFound => "Tag found",
            Self::InventoryComplete => "Inventory complete",
            Self::LoopOff => "Select loop switched off",
            Self::InvalidCommand => "Invalid command",
            Self::BadFrame => "Malformed request frame",
            Self::BadCrc => "Request CRC mismatch",
            Self::InvalidAddress => "Invalid address",
            Self::NoTag => "No tag in field",
            Self::ReadFailed => "Tag read failed",
            Self::WriteFailed => "Tag write failed",
            Self::LockedMemory => "Memory is locked",
            Self::InvalidTagType => "Invalid tag type",
            Self::InvalidParameter => "Invalid parameter value",
            Self::AccessDenied => "Access denied",
            Self::Unknown(_) => "Unknown status",
        }
    }

    /// Convert a negative acknowledgment into the core error.
    #[must_use]
    pub fn to_error(&self) -> Error {
        Error::device(self.as_u8(), self.description())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_every_byte() {
        for code in 0..=u8::MAX {
            assert_eq!(StatusCode::from_u8(code).as_u8(), code);
        }
    }

    #[test]
    fn test_nack_classification() {
        assert!(!StatusCode::Success.is_nack());
        assert!(!StatusCode::TagFound.is_nack());
        assert!(StatusCode::NoTag.is_nack());
        assert!(StatusCode::Unknown(0xF0).is_nack());
        assert!(!StatusCode::Unknown(0x10).is_nack());
    }

    #[test]
    fn test_to_error_preserves_code() {
        let error = StatusCode::WriteFailed.to_error();
        assert_eq!(error.device_code(), Some(0x86));
        assert_eq!(error.to_string(), "Device error 0x86: Tag write failed");
    }
}
