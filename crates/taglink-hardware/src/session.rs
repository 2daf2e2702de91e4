//! Reader sessions.
//!
//! A [`ReaderSession`] is a negotiated binding to the reader behind one
//! [`TransportDevice`]. It knows the reader's identity and its command retry
//! budget, and funnels every command through [`ReaderSession::exchange`].
//!
//! # Latency bound
//!
//! Every call on a session blocks for at most
//! [`worst_case_latency`](ReaderSession::worst_case_latency):
//! `(base timeout + additional timeout) * (retry count + 1)`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use taglink_core::{
    Error, Result,
    constants::{DEFAULT_COMMAND_RETRIES, DEFAULT_NEGOTIATE_TIMEOUT_MS},
};
use taglink_protocol::{CommandCode, PROTOCOL_VERSION, ReaderInfo, Request, RequestBuilder};
use tracing::{debug, info};

use crate::device::TransportDevice;
use crate::params::SystemParameter;

/// Identity reported by a reader during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderIdentity {
    pub manufacturer: String,
    pub model: String,
    pub firmware: String,
    pub serial_number: String,
    /// `"{model} {serial_number}"`.
    pub friendly_name: String,
    pub protocol_version: u8,
}

impl ReaderIdentity {
    fn from_info(info: ReaderInfo) -> Self {
        Self {
            friendly_name: format!("{} {}", info.model, info.serial_number),
            manufacturer: info.manufacturer,
            model: info.model,
            firmware: info.firmware,
            serial_number: info.serial_number,
            protocol_version: info.protocol_version,
        }
    }
}

/// A negotiated reader on a transport device.
///
/// Sessions are `Send`; the inventory scan moves one onto its own thread.
/// A session does not own its device: dropping it leaves the device open.
#[derive(Debug)]
pub struct ReaderSession {
    device: TransportDevice,
    identity: ReaderIdentity,
    retry_count: u8,
}

impl ReaderSession {
    /// Negotiate a session on `device`.
    ///
    /// The device is opened if needed. A device that already carries a
    /// negotiated identity is reused without any I/O.
    ///
    /// # Errors
    /// Transport errors, `Timeout` when the reader stays silent within
    /// `timeout`, `Communication` for an unsupported protocol version.
    pub fn negotiate(device: TransportDevice, timeout: Duration) -> Result<Self> {
        if let Some((identity, retry_count)) = device.bound_reader() {
            debug!(device = device.id(), reader = %identity.friendly_name, "Reusing bound reader");
            return Ok(Self {
                device,
                identity,
                retry_count,
            });
        }

        if !device.is_open() {
            device.open()?;
        }

        let info = {
            let mut link = device.lock()?;
            let request = Request::new(CommandCode::GetReaderInfo);
            let response = link.transact(&request, timeout, DEFAULT_COMMAND_RETRIES)?;
            ReaderInfo::from_bytes(&response.data)?
        };

        if info.protocol_version == 0 || info.protocol_version > PROTOCOL_VERSION {
            return Err(Error::communication(format!(
                "Unsupported protocol version {} (host speaks {})",
                info.protocol_version, PROTOCOL_VERSION
            )));
        }

        let identity = ReaderIdentity::from_info(info);
        let session = Self::attach(device, identity);

        info!(
            device = session.device.id(),
            address = %session.device.address(),
            reader = %session.identity.friendly_name,
            firmware = %session.identity.firmware,
            retries = session.retry_count,
            "Reader session negotiated"
        );
        session
            .device
            .bind(session.identity.clone(), session.retry_count);
        Ok(session)
    }

    /// Negotiate with the default negotiation timeout.
    pub fn open(device: TransportDevice) -> Result<Self> {
        Self::negotiate(device, Duration::from_millis(DEFAULT_NEGOTIATE_TIMEOUT_MS))
    }

    fn attach(device: TransportDevice, identity: ReaderIdentity) -> Self {
        let mut session = Self {
            device,
            identity,
            retry_count: DEFAULT_COMMAND_RETRIES,
        };
        session.retry_count = session.read_retry_count();
        session
    }

    // A reader without the retry parameter keeps the default budget.
    fn read_retry_count(&self) -> u8 {
        let request = RequestBuilder::new(CommandCode::ReadSystemParameter)
            .address(SystemParameter::CommandRetry.address(), 1)
            .build();
        let result = request.and_then(|request| self.exchange(&request));
        match result {
            Ok(response) => response.data.first().copied().unwrap_or(DEFAULT_COMMAND_RETRIES),
            Err(e) => {
                debug!(device = self.device.id(), error = %e, "Retry count unavailable, using default");
                DEFAULT_COMMAND_RETRIES
            }
        }
    }

    pub fn identity(&self) -> &ReaderIdentity {
        &self.identity
    }

    pub fn device(&self) -> &TransportDevice {
        &self.device
    }

    /// Number of extra attempts for a failed exchange.
    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    /// Change the host-side retry budget of this session.
    ///
    /// The budget applies to every later call on the session. Callers that
    /// need a different budget for one operation save and restore it.
    pub fn set_retry_count(&mut self, retry_count: u8) {
        self.retry_count = retry_count;
    }

    /// Adopt a retry count the reader now holds as its current parameter.
    ///
    /// Later sessions negotiated on the same device start from it too.
    pub(crate) fn adopt_retry_count(&mut self, retry_count: u8) {
        self.retry_count = retry_count;
        self.device.bind(self.identity.clone(), retry_count);
    }

    /// Upper bound on the time one call may block.
    pub fn worst_case_latency(&self) -> Duration {
        self.device.exchange_timeout() * (u32::from(self.retry_count) + 1)
    }

    /// Run one command with the session's timeout and retry policy.
    ///
    /// # Errors
    /// `Timeout`, `Communication` or `DeviceError` once every attempt
    /// failed, `Fatal` as soon as the device becomes unusable.
    pub fn exchange(&self, request: &Request) -> Result<taglink_protocol::Response> {
        let timeout = self.device.exchange_timeout();
        self.device
            .lock()?
            .transact(request, timeout, self.retry_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::SimulatedReader;

    #[test]
    fn test_negotiate_reads_identity() {
        let (reader, handle) = SimulatedReader::new();
        handle.set_current_parameter(SystemParameter::CommandRetry, &[3]);
        let device = TransportDevice::new(Box::new(reader));

        let session = ReaderSession::open(device.clone()).unwrap();
        assert_eq!(session.identity().model, "SIM-1");
        assert_eq!(session.identity().friendly_name, "SIM-1 00000001");
        assert_eq!(session.retry_count(), 3);
        assert_eq!(device.bound_identity().as_ref(), Some(session.identity()));
    }

    #[test]
    fn test_bound_device_is_not_renegotiated() {
        let (reader, handle) = SimulatedReader::new();
        let device = TransportDevice::new(Box::new(reader));
        let first = ReaderSession::open(device.clone()).unwrap();

        let before = handle.request_count();
        let second = ReaderSession::open(device).unwrap();
        assert_eq!(handle.request_count(), before);
        assert_eq!(first.identity(), second.identity());
        assert_eq!(first.retry_count(), second.retry_count());
    }

    #[test]
    fn test_unsupported_protocol_version() {
        let (reader, handle) = SimulatedReader::new();
        handle.set_protocol_version(PROTOCOL_VERSION + 1);
        let device = TransportDevice::new(Box::new(reader));

        let error = ReaderSession::open(device.clone()).unwrap_err();
        assert!(matches!(error, Error::Communication(_)));
        assert!(device.bound_identity().is_none());
    }

    #[test]
    fn test_worst_case_latency() {
        let (reader, _handle) = SimulatedReader::new();
        let device = TransportDevice::new(Box::new(reader));
        let mut session = ReaderSession::open(device.clone()).unwrap();

        device.set_base_timeout(Duration::from_millis(100));
        device.set_additional_timeout(Duration::from_millis(50));
        session.set_retry_count(3);
        assert_eq!(session.worst_case_latency(), Duration::from_millis(600));
    }
}
