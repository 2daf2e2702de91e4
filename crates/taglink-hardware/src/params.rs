//! Reader system parameters.
//!
//! Parameters live in the reader's system parameter space, one byte per
//! block. Every parameter has a current value (what the reader runs with)
//! and a default value (restored at power-up); [`ParameterScope`] picks one.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use taglink_core::{
    AddressSpace, BaudRate, DataBuffer, Error, HostInterface, MemoryAddress, ParameterScope,
    ReconfigStep, Result, TransportKind,
};
use taglink_protocol::CommandCode;
use tracing::{info, warn};

use crate::memory::Target;
use crate::session::ReaderSession;

/// Named reader parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemParameter {
    SerialNumber,
    FirmwareVersion,
    HardwareVersion,
    ProductCode,
    ReaderId,
    ReaderName,
    HostInterface,
    BaudRate,
    UserPortDirection,
    UserPortValue,
    MuxControl,
    BeeperControl,
    OperatingMode,
    TagPopulation,
    CommandRetry,
    TxPower,
}

impl SystemParameter {
    pub const ALL: [SystemParameter; 16] = [
        Self::SerialNumber,
        Self::FirmwareVersion,
        Self::HardwareVersion,
        Self::ProductCode,
        Self::ReaderId,
        Self::ReaderName,
        Self::HostInterface,
        Self::BaudRate,
        Self::UserPortDirection,
        Self::UserPortValue,
        Self::MuxControl,
        Self::BeeperControl,
        Self::OperatingMode,
        Self::TagPopulation,
        Self::CommandRetry,
        Self::TxPower,
    ];

    /// First block of the parameter in the system parameter space.
    pub fn address(&self) -> u16 {
        match self {
            Self::SerialNumber => 0x00,
            Self::FirmwareVersion => 0x04,
            Self::HardwareVersion => 0x08,
            Self::ProductCode => 0x0A,
            Self::ReaderId => 0x0C,
            Self::ReaderName => 0x10,
            Self::HostInterface => 0x30,
            Self::BaudRate => 0x31,
            Self::UserPortDirection => 0x32,
            Self::UserPortValue => 0x33,
            Self::MuxControl => 0x34,
            Self::BeeperControl => 0x35,
            Self::OperatingMode => 0x36,
            Self::TagPopulation => 0x37,
            Self::CommandRetry => 0x38,
            Self::TxPower => 0x39,
        }
    }

    /// Width of the value in bytes.
    pub fn width(&self) -> u16 {
        match self {
            Self::SerialNumber | Self::FirmwareVersion | Self::ReaderId => 4,
            Self::HardwareVersion | Self::ProductCode => 2,
            Self::ReaderName => 32,
            _ => 1,
        }
    }

    /// Factory-set parameters cannot be written.
    pub fn is_writable(&self) -> bool {
        !matches!(
            self,
            Self::SerialNumber | Self::FirmwareVersion | Self::HardwareVersion | Self::ProductCode
        )
    }

    pub fn range(&self) -> MemoryAddress {
        MemoryAddress::new(self.address(), self.width())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SerialNumber => "serial number",
            Self::FirmwareVersion => "firmware version",
            Self::HardwareVersion => "hardware version",
            Self::ProductCode => "product code",
            Self::ReaderId => "reader id",
            Self::ReaderName => "reader name",
            Self::HostInterface => "host interface",
            Self::BaudRate => "baud rate",
            Self::UserPortDirection => "user port direction",
            Self::UserPortValue => "user port value",
            Self::MuxControl => "mux control",
            Self::BeeperControl => "beeper control",
            Self::OperatingMode => "operating mode",
            Self::TagPopulation => "tag population",
            Self::CommandRetry => "command retry",
            Self::TxPower => "tx power",
        }
    }
}

impl std::fmt::Display for SystemParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Target of a host interface change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceChange {
    /// Serial at the given baud rate.
    Serial(BaudRate),
    Usb,
}

/// Typed access to one session's system parameters.
pub struct ParameterManager<'s> {
    session: &'s mut ReaderSession,
}

impl ReaderSession {
    pub fn parameters(&mut self) -> ParameterManager<'_> {
        ParameterManager { session: self }
    }
}

impl ParameterManager<'_> {
    /// Raw value of `key`.
    pub fn get(&self, key: SystemParameter, scope: ParameterScope) -> Result<DataBuffer> {
        let command = match scope {
            ParameterScope::Current => CommandCode::ReadSystemParameter,
            ParameterScope::Default => CommandCode::RetrieveDefaultParameter,
        };
        self.session.read_with(
            command,
            Target::Reader,
            &AddressSpace::system_parameters(),
            key.range(),
        )
    }

    /// Write the raw value of `key`.
    ///
    /// # Errors
    /// `InvalidArgument` before any I/O when `value` does not match the
    /// width of `key` or `key` is read-only.
    pub fn set(&self, key: SystemParameter, value: &[u8], scope: ParameterScope) -> Result<()> {
        if !key.is_writable() {
            return Err(Error::invalid_argument(format!("{key} is read-only")));
        }
        if value.len() != usize::from(key.width()) {
            return Err(Error::invalid_argument(format!(
                "{key} takes {} bytes, got {}",
                key.width(),
                value.len()
            )));
        }

        let command = match scope {
            ParameterScope::Current => CommandCode::WriteSystemParameter,
            ParameterScope::Default => CommandCode::StoreDefaultParameter,
        };
        self.session.write_with(
            command,
            Target::Reader,
            &AddressSpace::system_parameters(),
            key.range(),
            value,
            false,
        )
    }

    fn get_byte(&self, key: SystemParameter, scope: ParameterScope) -> Result<u8> {
        self.get(key, scope)?
            .first()
            .ok_or_else(|| Error::communication(format!("Empty value for {key}")))
    }

    pub fn host_interface(&self, scope: ParameterScope) -> Result<HostInterface> {
        HostInterface::from_code(self.get_byte(SystemParameter::HostInterface, scope)?)
    }

    pub fn set_host_interface(&self, interface: HostInterface, scope: ParameterScope) -> Result<()> {
        self.set(SystemParameter::HostInterface, &[interface.code()], scope)
    }

    pub fn baud_rate(&self, scope: ParameterScope) -> Result<BaudRate> {
        BaudRate::from_code(self.get_byte(SystemParameter::BaudRate, scope)?)
    }

    /// Write the baud rate parameter.
    ///
    /// The reader keeps listening at its old rate until the serial host
    /// interface is selected again, so the host port is left as is;
    /// [`change_interface`](Self::change_interface) moves it along.
    pub fn set_baud_rate(&self, rate: BaudRate, scope: ParameterScope) -> Result<()> {
        self.set(SystemParameter::BaudRate, &[rate.code()], scope)
    }

    fn retune_host_port(&self, rate: BaudRate) -> Result<()> {
        let device = self.session.device();
        device
            .lock()
            .and_then(|mut link| link.set_baud_rate(rate.rate()))
            .inspect_err(|e| {
                warn!(
                    device = device.id(),
                    rate = rate.rate(),
                    error = %e,
                    "Host port did not follow the reader baud rate"
                );
            })
    }

    pub fn retry_count(&self, scope: ParameterScope) -> Result<u8> {
        self.get_byte(SystemParameter::CommandRetry, scope)
    }

    /// Write the command retry parameter.
    ///
    /// In current scope the session adopts the new budget as well, and so
    /// does any session negotiated on the device later.
    pub fn set_retry_count(&mut self, retry_count: u8, scope: ParameterScope) -> Result<()> {
        self.set(SystemParameter::CommandRetry, &[retry_count], scope)?;
        if scope == ParameterScope::Current {
            self.session.adopt_retry_count(retry_count);
        }
        Ok(())
    }

    /// Firmware version as hex.
    pub fn firmware_version(&self) -> Result<String> {
        Ok(self
            .get(SystemParameter::FirmwareVersion, ParameterScope::Current)?
            .to_hex())
    }

    /// Reader name, NUL padding stripped.
    pub fn reader_name(&self) -> Result<String> {
        let raw = self.get(SystemParameter::ReaderName, ParameterScope::Current)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Store a reader name, NUL padded to the parameter width.
    pub fn set_reader_name(&self, name: &str, scope: ParameterScope) -> Result<()> {
        let width = usize::from(SystemParameter::ReaderName.width());
        if name.len() > width {
            return Err(Error::invalid_argument(format!(
                "Reader name longer than {width} bytes"
            )));
        }
        let mut value = name.as_bytes().to_vec();
        value.resize(width, 0);
        self.set(SystemParameter::ReaderName, &value, scope)
    }

    /// Extra host-side wait added to every exchange on this device.
    pub fn set_additional_timeout(&self, additional: Duration) {
        self.session.device().set_additional_timeout(additional);
    }

    pub fn additional_timeout(&self) -> Duration {
        self.session.device().timeouts().additional
    }

    /// Move the reader to another host interface.
    ///
    /// Serial targets set the baud rate first and switch the interface only
    /// once the reader acknowledged it. The reader listens at the new rate
    /// from the interface switch on; in current scope on a serial device the
    /// host port follows right after that acknowledgment.
    ///
    /// A failure names the step that failed and leaves earlier steps
    /// applied. A `HostPort` failure means the reader already moved while
    /// the host port did not.
    pub fn change_interface(&self, change: InterfaceChange, scope: ParameterScope) -> Result<()> {
        let interface = match change {
            InterfaceChange::Serial(rate) => {
                self.set_baud_rate(rate, scope)
                    .map_err(|e| Error::reconfiguration(ReconfigStep::BaudRate, e))?;
                HostInterface::Serial
            }
            InterfaceChange::Usb => HostInterface::Usb,
        };

        self.set_host_interface(interface, scope)
            .map_err(|e| Error::reconfiguration(ReconfigStep::HostInterface, e))?;

        if let InterfaceChange::Serial(rate) = change {
            if scope == ParameterScope::Current
                && self.session.device().kind() == TransportKind::Serial
            {
                self.retune_host_port(rate)
                    .map_err(|e| Error::reconfiguration(ReconfigStep::HostPort, e))?;
            }
        }

        info!(
            device = self.session.device().id(),
            change = ?change,
            scope = %scope,
            "Host interface changed"
        );
        Ok(())
    }
}
