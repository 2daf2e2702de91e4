//! USB HID transport.
//!
//! Frames are carried in 64-byte HID reports. Outgoing data is split into
//! reports of 63 payload bytes behind a zero report id.

use std::ffi::CString;
use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use taglink_core::{Error, Result, TransportKind};
use tracing::debug;

use super::{Transport, millis};

const REPORT_SIZE: usize = 64;

/// USB HID transport addressed by its platform path.
pub struct HidTransport {
    path: String,
    device: Option<HidDevice>,
}

impl HidTransport {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            device: None,
        }
    }

    /// Paths of the HID endpoints with the given vendor id, in enumeration
    /// order.
    pub fn available_paths(vendor_id: u16) -> Result<Vec<String>> {
        let api = HidApi::new().map_err(map_hid_error)?;
        Ok(api
            .device_list()
            .filter(|info| info.vendor_id() == vendor_id)
            .map(|info| info.path().to_string_lossy().into_owned())
            .collect())
    }

    fn device(&self) -> Result<&HidDevice> {
        self.device
            .as_ref()
            .ok_or_else(|| Error::fatal(format!("HID device {} is not open", self.path)))
    }
}

impl std::fmt::Debug for HidTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HidTransport")
            .field("path", &self.path)
            .field("open", &self.device.is_some())
            .finish()
    }
}

impl Transport for HidTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Usb
    }

    fn address(&self) -> &str {
        &self.path
    }

    fn open(&mut self) -> Result<()> {
        if self.device.is_some() {
            return Ok(());
        }

        let path = CString::new(self.path.as_str())
            .map_err(|_| Error::invalid_argument("HID path contains a NUL byte"))?;
        let api = HidApi::new().map_err(map_hid_error)?;
        let device = api.open_path(&path).map_err(map_hid_error)?;

        debug!(path = %self.path, "HID device opened");
        self.device = Some(device);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.device.take().is_some() {
            debug!(path = %self.path, "HID device closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        let device = self.device()?;
        for chunk in data.chunks(REPORT_SIZE - 1) {
            let mut report = [0u8; REPORT_SIZE];
            report[1..=chunk.len()].copy_from_slice(chunk);
            device.write(&report).map_err(map_hid_error)?;
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let device = self.device()?;
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let mut report = [0u8; REPORT_SIZE];

        let n = device
            .read_timeout(&mut report, timeout_ms)
            .map_err(map_hid_error)?;
        if n == 0 {
            return Err(Error::timeout(millis(timeout)));
        }

        let n = n.min(buf.len());
        buf[..n].copy_from_slice(&report[..n]);
        Ok(n)
    }

    fn clear_input(&mut self) -> Result<()> {
        let device = self.device()?;
        let mut report = [0u8; REPORT_SIZE];
        while device.read_timeout(&mut report, 0).map_err(map_hid_error)? > 0 {}
        Ok(())
    }
}

fn map_hid_error(error: hidapi::HidError) -> Error {
    match error {
        hidapi::HidError::IoError { error } => Error::from_io(error, 0),
        other => Error::fatal(other.to_string()),
    }
}
