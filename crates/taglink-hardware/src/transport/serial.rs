//! Serial port transport.
//!
//! Readers attached over RS-232 or a USB virtual COM port. Ports are opened
//! 8N1 without flow control at the configured baud rate.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use taglink_core::{Error, Result, TransportKind, constants::DEFAULT_BAUD_RATE};
use tracing::{debug, trace};

use super::{Transport, millis};

/// Serial port transport.
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_baud_rate(path, DEFAULT_BAUD_RATE)
    }

    pub fn with_baud_rate(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            port: None,
        }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Names of the serial ports known to the operating system, in
    /// enumeration order.
    pub fn available_ports() -> Result<Vec<String>> {
        let ports = serialport::available_ports().map_err(map_serial_error)?;
        Ok(ports.into_iter().map(|info| info.port_name).collect())
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| Error::fatal(format!("Serial port {} is not open", self.path)))
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn address(&self) -> &str {
        &self.path
    }

    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let port = serialport::new(&self.path, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(map_serial_error)?;

        debug!(port = %self.path, baud = self.baud_rate, "Serial port opened");
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!(port = %self.path, "Serial port closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port()?;
        port.write_all(data).map_err(|e| Error::from_io(e, 0))?;
        port.flush().map_err(|e| Error::from_io(e, 0))
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port()?;
        port.set_timeout(timeout).map_err(map_serial_error)?;
        match port.read(buf) {
            Ok(0) => Err(Error::timeout(millis(timeout))),
            Ok(n) => Ok(n),
            Err(e) => Err(Error::from_io(e, millis(timeout))),
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port()?
            .clear(ClearBuffer::Input)
            .map_err(map_serial_error)
    }

    fn set_baud_rate(&mut self, rate: u32) -> Result<()> {
        self.baud_rate = rate;
        if let Some(port) = self.port.as_mut() {
            port.set_baud_rate(rate).map_err(map_serial_error)?;
            trace!(port = %self.path, baud = rate, "Host baud rate changed");
        }
        Ok(())
    }
}

fn map_serial_error(error: serialport::Error) -> Error {
    match error.kind() {
        serialport::ErrorKind::NoDevice => Error::fatal(error.to_string()),
        serialport::ErrorKind::Io(kind) => {
            Error::from_io(std::io::Error::new(kind, error.description), 0)
        }
        serialport::ErrorKind::InvalidInput => Error::invalid_argument(error.to_string()),
        serialport::ErrorKind::Unknown => Error::communication(error.to_string()),
    }
}
