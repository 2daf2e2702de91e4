//! Device and reader discovery.
//!
//! Discovery runs in two phases. [`Discovery::enumerate_devices`] finds
//! transport devices that answer a liveness check (a successful open), and
//! [`Discovery::discover_readers`] negotiates a [`ReaderSession`] with each
//! of them. Devices that fail negotiation are skipped, not closed.
//!
//! ```
//! use taglink_hardware::discovery::Discovery;
//! use taglink_hardware::mock::SimulatedReader;
//!
//! let (reader, _handle) = SimulatedReader::new();
//! let discovery = Discovery::from_transports(vec![Box::new(reader)]);
//!
//! let devices = discovery.enumerate_devices();
//! let readers = discovery.discover_readers(&devices);
//! assert_eq!(readers.len(), 1);
//! devices.close_all().unwrap();
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use taglink_core::{
    TransportKind,
    constants::{
        DEFAULT_BAUD_RATE, DEFAULT_NEGOTIATE_TIMEOUT_MS, DEFAULT_LIVENESS_TIMEOUT_MS,
        DEFAULT_USB_VENDOR_ID,
    },
};
use tracing::{debug, info};

use crate::device::{DeviceList, TransportDevice};
use crate::session::ReaderSession;
use crate::transport::{NetworkTransport, Transport, TransportTimeouts};

/// Serial port scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialDiscovery {
    pub enabled: bool,
    pub baud_rate: u32,
    /// Ports to check. Empty means every port the system reports.
    pub ports: Vec<String>,
}

impl Default for SerialDiscovery {
    fn default() -> Self {
        Self {
            enabled: true,
            baud_rate: DEFAULT_BAUD_RATE,
            ports: Vec::new(),
        }
    }
}

/// USB HID scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbDiscovery {
    pub enabled: bool,
    pub vendor_id: u16,
}

impl Default for UsbDiscovery {
    fn default() -> Self {
        Self {
            enabled: true,
            vendor_id: DEFAULT_USB_VENDOR_ID,
        }
    }
}

/// What to scan and how long to wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub serial: SerialDiscovery,
    pub usb: UsbDiscovery,
    /// `host:port` of network attached readers.
    pub network: Vec<String>,
    /// Connect timeout of network liveness checks.
    pub liveness_timeout: Duration,
    /// Response timeout while negotiating a session.
    pub negotiate_timeout: Duration,
    /// Timeouts given to every discovered device.
    pub timeouts: TransportTimeouts,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            serial: SerialDiscovery::default(),
            usb: UsbDiscovery::default(),
            network: Vec::new(),
            liveness_timeout: Duration::from_millis(DEFAULT_LIVENESS_TIMEOUT_MS),
            negotiate_timeout: Duration::from_millis(DEFAULT_NEGOTIATE_TIMEOUT_MS),
            timeouts: TransportTimeouts::default(),
        }
    }
}

impl DiscoveryConfig {
    /// A configuration with every scan disabled.
    pub fn none() -> Self {
        Self {
            serial: SerialDiscovery {
                enabled: false,
                ..SerialDiscovery::default()
            },
            usb: UsbDiscovery {
                enabled: false,
                ..UsbDiscovery::default()
            },
            ..Self::default()
        }
    }

    pub fn with_serial_ports(mut self, ports: Vec<String>) -> Self {
        self.serial.enabled = true;
        self.serial.ports = ports;
        self
    }

    pub fn with_usb_vendor(mut self, vendor_id: u16) -> Self {
        self.usb.enabled = true;
        self.usb.vendor_id = vendor_id;
        self
    }

    pub fn with_network_host(mut self, address: impl Into<String>) -> Self {
        self.network.push(address.into());
        self
    }

    pub fn with_negotiate_timeout(mut self, timeout: Duration) -> Self {
        self.negotiate_timeout = timeout;
        self
    }
}

fn kind_rank(kind: TransportKind) -> u8 {
    match kind {
        TransportKind::Serial => 0,
        TransportKind::Usb => 1,
        TransportKind::Network => 2,
    }
}

/// Finds devices and readers.
#[derive(Debug)]
pub struct Discovery {
    config: DiscoveryConfig,
    known: Vec<TransportDevice>,
}

impl Discovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            known: Vec::new(),
        }
    }

    /// Discovery over caller-supplied transports only, no system scan.
    pub fn from_transports(transports: Vec<Box<dyn Transport>>) -> Self {
        Self::new(DiscoveryConfig::none()).with_transports(transports)
    }

    /// Add transports the caller already knows the address of.
    pub fn with_transports(mut self, transports: Vec<Box<dyn Transport>>) -> Self {
        let timeouts = self.config.timeouts;
        self.known.extend(
            transports
                .into_iter()
                .map(|t| TransportDevice::with_timeouts(t, timeouts)),
        );
        self
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Open every candidate device and keep the ones that open.
    ///
    /// Devices are ordered by transport kind (serial, USB, network), then
    /// in enumeration order. Finding nothing yields an empty list.
    pub fn enumerate_devices(&self) -> DeviceList {
        let mut candidates = self.scan();
        candidates.extend(self.known.iter().cloned());
        candidates.sort_by_key(|d| kind_rank(d.kind()));

        let devices: Vec<TransportDevice> = candidates
            .into_iter()
            .filter(|device| {
                if device.is_open() {
                    return true;
                }
                match device.open() {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(address = %device.address(), kind = %device.kind(), error = %e, "Liveness check failed");
                        false
                    }
                }
            })
            .collect();

        info!(count = devices.len(), "Device enumeration complete");
        DeviceList::new(devices)
    }

    /// Negotiate a session with every device in `devices`.
    ///
    /// Devices that fail are skipped and left open. Sessions come back in
    /// device order.
    pub fn discover_readers(&self, devices: &DeviceList) -> Vec<ReaderSession> {
        let sessions: Vec<ReaderSession> = devices
            .iter()
            .filter_map(|device| {
                match ReaderSession::negotiate(device.clone(), self.config.negotiate_timeout) {
                    Ok(session) => Some(session),
                    Err(e) => {
                        debug!(address = %device.address(), error = %e, "No reader found on device");
                        None
                    }
                }
            })
            .collect();

        info!(
            devices = devices.len(),
            readers = sessions.len(),
            "Reader discovery complete"
        );
        sessions
    }

    fn scan(&self) -> Vec<TransportDevice> {
        let timeouts = self.config.timeouts;
        let mut transports: Vec<Box<dyn Transport>> = Vec::new();
        transports.extend(self.scan_serial());
        transports.extend(self.scan_usb());
        transports.extend(self.config.network.iter().map(|address| {
            Box::new(
                NetworkTransport::new(address.clone())
                    .with_connect_timeout(self.config.liveness_timeout),
            ) as Box<dyn Transport>
        }));

        transports
            .into_iter()
            .map(|t| TransportDevice::with_timeouts(t, timeouts))
            .collect()
    }

    #[cfg(feature = "hardware-serial")]
    fn scan_serial(&self) -> Vec<Box<dyn Transport>> {
        use crate::transport::SerialTransport;

        let serial = &self.config.serial;
        if !serial.enabled {
            return Vec::new();
        }

        let ports = if serial.ports.is_empty() {
            match SerialTransport::available_ports() {
                Ok(ports) => ports,
                Err(e) => {
                    debug!(error = %e, "Serial port enumeration failed");
                    Vec::new()
                }
            }
        } else {
            serial.ports.clone()
        };

        ports
            .into_iter()
            .map(|port| {
                Box::new(SerialTransport::with_baud_rate(port, serial.baud_rate))
                    as Box<dyn Transport>
            })
            .collect()
    }

    #[cfg(not(feature = "hardware-serial"))]
    fn scan_serial(&self) -> Vec<Box<dyn Transport>> {
        if self.config.serial.enabled {
            debug!("Serial discovery requested but serial support is not compiled in");
        }
        Vec::new()
    }

    #[cfg(feature = "hardware-usb")]
    fn scan_usb(&self) -> Vec<Box<dyn Transport>> {
        use crate::transport::HidTransport;

        let usb = &self.config.usb;
        if !usb.enabled {
            return Vec::new();
        }

        match HidTransport::available_paths(usb.vendor_id) {
            Ok(paths) => paths
                .into_iter()
                .map(|path| Box::new(HidTransport::new(path)) as Box<dyn Transport>)
                .collect(),
            Err(e) => {
                debug!(error = %e, "USB enumeration failed");
                Vec::new()
            }
        }
    }

    #[cfg(not(feature = "hardware-usb"))]
    fn scan_usb(&self) -> Vec<Box<dyn Transport>> {
        if self.config.usb.enabled {
            debug!("USB discovery requested but USB support is not compiled in");
        }
        Vec::new()
    }
}
