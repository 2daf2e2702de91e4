//! Byte-level transports to a reader.
//!
//! A [`Transport`] moves raw bytes over one physical channel and knows
//! nothing about frames or commands. Framing, retries and command
//! serialization live in [`TransportDevice`](crate::TransportDevice) and
//! [`ReaderSession`](crate::ReaderSession).
//!
//! Available implementations:
//!
//! - [`SerialTransport`] (feature `hardware-serial`)
//! - [`HidTransport`] (feature `hardware-usb`)
//! - [`NetworkTransport`] (always available)
//! - [`SimulatedReader`](crate::mock::SimulatedReader) for tests

use std::time::Duration;

use serde::{Deserialize, Serialize};
use taglink_core::{
    Result, TransportKind,
    constants::{DEFAULT_ADDITIONAL_TIMEOUT_MS, DEFAULT_BASE_TIMEOUT_MS},
};

#[cfg(feature = "hardware-usb")]
pub mod hid;
pub mod network;
#[cfg(feature = "hardware-serial")]
pub mod serial;

#[cfg(feature = "hardware-usb")]
pub use hid::HidTransport;
pub use network::NetworkTransport;
#[cfg(feature = "hardware-serial")]
pub use serial::SerialTransport;

/// Blocking byte-level transport.
///
/// Implementations must be `Send` so a device can be driven from the
/// inventory scan thread.
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Transport-specific address (port name, HID path, `host:port`).
    fn address(&self) -> &str;

    fn open(&mut self) -> Result<()>;

    /// Close the channel. Closing a closed transport is a no-op.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Write all of `data`.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Read whatever is available into `buf`, waiting at most `timeout`.
    ///
    /// Returns `Error::Timeout` when nothing arrives in time.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Discard unread input.
    fn clear_input(&mut self) -> Result<()>;

    /// Change the host side line rate. Transports without a line rate
    /// ignore this.
    fn set_baud_rate(&mut self, _rate: u32) -> Result<()> {
        Ok(())
    }
}

/// Response timeouts of a device.
///
/// One exchange waits `base + additional` for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportTimeouts {
    pub base: Duration,
    pub additional: Duration,
}

impl TransportTimeouts {
    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    pub fn with_additional(mut self, additional: Duration) -> Self {
        self.additional = additional;
        self
    }

    /// Total wait for one response.
    pub fn total(&self) -> Duration {
        self.base.saturating_add(self.additional)
    }
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(DEFAULT_BASE_TIMEOUT_MS),
            additional: Duration::from_millis(DEFAULT_ADDITIONAL_TIMEOUT_MS),
        }
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
