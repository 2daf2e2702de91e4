//! Command codes and request flags of the reader protocol.
//!
//! Command codes are 16-bit values: the high byte names the command group
//! (tag, system, reader), the low byte the command inside the group.

use std::fmt;
use taglink_core::{Error, Result};

/// Commands understood by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandCode {
    /// Select one tag, or inventory every tag when the inventory flag is set.
    SelectTag = 0x0101,
    ReadTag = 0x0102,
    WriteTag = 0x0103,
    ReadTagConfig = 0x0104,
    WriteTagConfig = 0x0105,
    SendTagPassword = 0x0106,
    ReadSystemParameter = 0x0201,
    WriteSystemParameter = 0x0202,
    /// Read a power-on default parameter.
    RetrieveDefaultParameter = 0x0203,
    /// Persist a power-on default parameter.
    StoreDefaultParameter = 0x0204,
    /// Protocol version and reader identity.
    GetReaderInfo = 0x0301,
}

impl CommandCode {
    const ALL: [CommandCode; 11] = [
        Self::SelectTag,
        Self::ReadTag,
        Self::WriteTag,
        Self::ReadTagConfig,
        Self::WriteTagConfig,
        Self::SendTagPassword,
        Self::ReadSystemParameter,
        Self::WriteSystemParameter,
        Self::RetrieveDefaultParameter,
        Self::StoreDefaultParameter,
        Self::GetReaderInfo,
    ];

    /// Decode a command code from the wire.
    ///
    /// # Errors
    /// Returns `Error::Communication` for unknown codes.
    pub fn from_u16(code: u16) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_u16() == code)
            .ok_or_else(|| Error::communication(format!("Unknown command code 0x{code:04X}")))
    }

    #[must_use]
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Commands that address a tag and therefore carry a tag identifier.
    #[must_use]
    pub fn targets_tag(&self) -> bool {
        self.as_u16() & 0xFF00 == 0x0100 && *self != Self::SelectTag
    }

    /// Commands that carry a data payload to the reader.
    #[must_use]
    pub fn carries_data(&self) -> bool {
        matches!(
            self,
            Self::WriteTag
                | Self::WriteTagConfig
                | Self::SendTagPassword
                | Self::WriteSystemParameter
                | Self::StoreDefaultParameter
        )
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectTag => "SELECT_TAG",
            Self::ReadTag => "READ_TAG",
            Self::WriteTag => "WRITE_TAG",
            Self::ReadTagConfig => "READ_TAG_CONFIG",
            Self::WriteTagConfig => "WRITE_TAG_CONFIG",
            Self::SendTagPassword => "SEND_TAG_PASSWORD",
            Self::ReadSystemParameter => "READ_SYSTEM_PARAMETER",
            Self::WriteSystemParameter => "WRITE_SYSTEM_PARAMETER",
            Self::RetrieveDefaultParameter => "RETRIEVE_DEFAULT_PARAMETER",
            Self::StoreDefaultParameter => "STORE_DEFAULT_PARAMETER",
            Self::GetReaderInfo => "GET_READER_INFO",
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Option bits sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RequestFlags {
    /// Report every tag in the field instead of the first one.
    pub inventory: bool,
    /// Keep selecting until told to stop.
    pub loop_mode: bool,
    /// Lock the written blocks.
    pub lock: bool,
    /// A tag identifier follows the tag type.
    pub tag_id_present: bool,
    /// A data block follows the address.
    pub data_present: bool,
}

impl RequestFlags {
    const INVENTORY: u8 = 0x01;
    const LOOP: u8 = 0x02;
    const LOCK: u8 = 0x04;
    const TAG_ID: u8 = 0x08;
    const DATA: u8 = 0x10;

    #[must_use]
    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.inventory {
            bits |= Self::INVENTORY;
        }
        if self.loop_mode {
            bits |= Self::LOOP;
        }
        if self.lock {
            bits |= Self::LOCK;
        }
        if self.tag_id_present {
            bits |= Self::TAG_ID;
        }
        if self.data_present {
            bits |= Self::DATA;
        }
        bits
    }

    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Self {
            inventory: bits & Self::INVENTORY != 0,
            loop_mode: bits & Self::LOOP != 0,
            lock: bits & Self::LOCK != 0,
            tag_id_present: bits & Self::TAG_ID != 0,
            data_present: bits & Self::DATA != 0,
        }
    }
}
