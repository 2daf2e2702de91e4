//! Reader sessions, tag memory access and inventory scanning over physical
//! transports.
//!
//! The crate is layered bottom-up:
//!
//! - [`transport`]: byte channels (serial, USB HID, TCP) behind the
//!   [`Transport`] trait.
//! - [`device`]: a [`TransportDevice`] owns one transport and runs framed
//!   exchanges on it with timeouts and retries.
//! - [`session`]: a [`ReaderSession`] is a negotiated reader on a device.
//! - [`memory`], [`tag`] and [`params`]: what a session can do with tags
//!   and with the reader's own parameters.
//! - [`discovery`] finds devices and readers; [`scan`] runs a cancellable
//!   inventory loop.
//!
//! # Example
//!
//! ```
//! use taglink_core::{AddressSpace, MemoryAddress, TagType};
//! use taglink_hardware::mock::SimulatedReader;
//! use taglink_hardware::{ReaderSession, TransportDevice};
//!
//! # fn main() -> taglink_core::Result<()> {
//! let (reader, handle) = SimulatedReader::new();
//! handle.add_tag(TagType::Gen2, &[0xE2, 0x80, 0x11, 0x05]);
//!
//! let session = ReaderSession::open(TransportDevice::new(Box::new(reader)))?;
//! if let Some(tag) = session.select_tag(TagType::AutoDetect)? {
//!     let tid = session.read_tag_data(&tag, &AddressSpace::gen2_tid(), MemoryAddress::new(0, 2))?;
//!     assert_eq!(tid.len(), 4);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! Every fallible call returns [`taglink_core::Result`]. Range and argument
//! checks fail before any I/O; device failures are classified as
//! retryable (`Timeout`, `Communication`, `DeviceError`) or `Fatal`.
//!
//! # Threads
//!
//! Devices serialize exchanges internally and can be shared between
//! threads. A session is `Send` and is normally driven by one thread at a
//! time; [`scan::InventoryScan::spawn`] moves one onto its own thread.

pub mod debug_sink;
pub mod device;
pub mod discovery;
pub mod memory;
pub mod mock;
pub mod params;
pub mod scan;
pub mod session;
pub mod tag;
pub mod transport;

pub use device::{DeviceList, TransportDevice};
pub use discovery::{Discovery, DiscoveryConfig};
pub use memory::Target;
pub use params::{InterfaceChange, ParameterManager, SystemParameter};
pub use scan::{CancellationToken, InventoryScan, ScanConfig, ScanHandle, ScanReport, ScanState, StopReason};
pub use session::{ReaderIdentity, ReaderSession};
pub use tag::Tag;
pub use transport::{Transport, TransportTimeouts};

pub use taglink_core::{Error, Result};
