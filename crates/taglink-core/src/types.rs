use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical transport family of a device.
///
/// The declaration order is the discovery order: serial ports are tried
/// first, then USB endpoints, then network hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Serial,
    Usb,
    Network,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "SERIAL"),
            Self::Usb => write!(f, "USB"),
            Self::Network => write!(f, "NETWORK"),
        }
    }
}

/// Serial baud rates supported by the reader.
///
/// The protocol never carries the literal rate, only the small code
/// returned by [`BaudRate::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaudRate {
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    /// Map a literal rate to the supported enumeration.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` for any rate outside the table.
    pub fn from_rate(rate: u32) -> Result<Self> {
        match rate {
            9600 => Ok(Self::B9600),
            19200 => Ok(Self::B19200),
            38400 => Ok(Self::B38400),
            57600 => Ok(Self::B57600),
            115200 => Ok(Self::B115200),
            other => Err(Error::invalid_argument(format!(
                "Unsupported baud rate {other}"
            ))),
        }
    }

    /// Decode the protocol code returned by the reader.
    ///
    /// # Errors
    /// Returns `Error::UnknownBaud` for codes the reader should never send.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::B9600),
            1 => Ok(Self::B19200),
            2 => Ok(Self::B38400),
            3 => Ok(Self::B57600),
            4 => Ok(Self::B115200),
            other => Err(Error::UnknownBaud(other)),
        }
    }

    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            Self::B9600 => 0,
            Self::B19200 => 1,
            Self::B38400 => 2,
            Self::B57600 => 3,
            Self::B115200 => 4,
        }
    }

    #[must_use]
    pub fn rate(&self) -> u32 {
        match self {
            Self::B9600 => 9600,
            Self::B19200 => 19200,
            Self::B38400 => 38400,
            Self::B57600 => 57600,
            Self::B115200 => 115200,
        }
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.rate())
    }
}

/// Host interface the reader talks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum HostInterface {
    Serial = 0x01,
    Usb = 0x06,
}

impl HostInterface {
    /// Decode the protocol code returned by the reader.
    ///
    /// # Errors
    /// Returns `Error::UnknownInterface` rather than guessing.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0x01 => Ok(Self::Serial),
            0x06 => Ok(Self::Usb),
            other => Err(Error::UnknownInterface(other)),
        }
    }

    #[must_use]
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for HostInterface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "SERIAL"),
            Self::Usb => write!(f, "USB"),
        }
    }
}

/// Whether a parameter operation targets the live session or the
/// power-on defaults persisted by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterScope {
    Current,
    Default,
}

impl fmt::Display for ParameterScope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Current => write!(f, "current"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Step of a host interface change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconfigStep {
    BaudRate,
    HostInterface,
    /// Moving the host side serial port to the new rate.
    HostPort,
}

impl fmt::Display for ReconfigStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BaudRate => write!(f, "baud rate"),
            Self::HostInterface => write!(f, "host interface"),
            Self::HostPort => write!(f, "host port"),
        }
    }
}

/// Supported tag classes.
///
/// Codes with a zero low byte name a whole family; selecting with one of
/// them asks the reader to sniff the concrete type within that family.
/// [`TagType::AutoDetect`] sniffs across every family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum TagType {
    AutoDetect = 0x0000,
    Iso15693 = 0x0100,
    TagItHfi = 0x0101,
    ICode = 0x0102,
    Iso14443A = 0x0200,
    MifareUltralight = 0x0201,
    MifareClassic1K = 0x0202,
    MifareClassic4K = 0x0203,
    Iso14443B = 0x0300,
    Iso18000_6B = 0x0400,
    Gen2 = 0x0500,
    Em4x44 = 0x0600,
    Em4444 = 0x0601,
}

impl TagType {
    const ALL: [TagType; 13] = [
        Self::AutoDetect,
        Self::Iso15693,
        Self::TagItHfi,
        Self::ICode,
        Self::Iso14443A,
        Self::MifareUltralight,
        Self::MifareClassic1K,
        Self::MifareClassic4K,
        Self::Iso14443B,
        Self::Iso18000_6B,
        Self::Gen2,
        Self::Em4x44,
        Self::Em4444,
    ];

    /// Decode a tag type code.
    ///
    /// # Errors
    /// Returns `Error::UnknownTagType` for codes outside the enumeration.
    pub fn from_code(code: u16) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.code() == code)
            .ok_or(Error::UnknownTagType(code))
    }

    #[must_use]
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// True when the reader is asked to detect the type itself.
    #[must_use]
    pub fn is_auto_detect(&self) -> bool {
        self.code() & 0x00FF == 0
    }

    /// True when `other` satisfies this type used as a filter.
    #[must_use]
    pub fn matches(&self, other: TagType) -> bool {
        match self {
            Self::AutoDetect => true,
            t if t.is_auto_detect() => t.code() & 0xFF00 == other.code() & 0xFF00,
            t => *t == other,
        }
    }

    /// Human readable name of the tag type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AutoDetect => "AUTO DETECT",
            Self::Iso15693 => "ISO 15693",
            Self::TagItHfi => "Tag-it HF-I",
            Self::ICode => "I-CODE SLI",
            Self::Iso14443A => "ISO 14443A",
            Self::MifareUltralight => "MIFARE Ultralight",
            Self::MifareClassic1K => "MIFARE Classic 1K",
            Self::MifareClassic4K => "MIFARE Classic 4K",
            Self::Iso14443B => "ISO 14443B",
            Self::Iso18000_6B => "ISO 18000-6B",
            Self::Gen2 => "ISO 18000-6C (EPC Gen2)",
            Self::Em4x44 => "EM4x44",
            Self::Em4444 => "EM4444",
        }
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
