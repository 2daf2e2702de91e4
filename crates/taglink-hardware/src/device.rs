//! Transport devices and device lists.
//!
//! A [`TransportDevice`] is a cheap, cloneable handle to one physical
//! channel. Clones share the transport, its receive buffer and its
//! timeouts. Every exchange takes the device lock for its whole duration,
//! retries included, so two exchanges on one device never interleave.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use taglink_core::{
    Error, Result, TransportKind, buffer::to_hex, constants::MAX_LOOP_OFF_REISSUES,
};
use taglink_protocol::{Request, Response, StatusCode, TagLinkCodec};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};

use crate::debug_sink;
use crate::session::ReaderIdentity;
use crate::transport::{Transport, TransportTimeouts, millis};

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

const READ_CHUNK: usize = 256;

/// Shared handle to one transport channel.
#[derive(Clone)]
pub struct TransportDevice {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    id: u64,
    kind: TransportKind,
    address: String,
    link: Mutex<Link>,
    timeouts: RwLock<TransportTimeouts>,
    bound: RwLock<Option<BoundReader>>,
}

#[derive(Clone)]
struct BoundReader {
    identity: ReaderIdentity,
    retry_count: u8,
}

struct Link {
    transport: Box<dyn Transport>,
    codec: TagLinkCodec<Response>,
    rx: BytesMut,
    closed: bool,
}

impl TransportDevice {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_timeouts(transport, TransportTimeouts::default())
    }

    pub fn with_timeouts(transport: Box<dyn Transport>, timeouts: TransportTimeouts) -> Self {
        let inner = DeviceInner {
            id: NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed),
            kind: transport.kind(),
            address: transport.address().to_string(),
            link: Mutex::new(Link {
                transport,
                codec: TagLinkCodec::new(),
                rx: BytesMut::with_capacity(READ_CHUNK),
                closed: false,
            }),
            timeouts: RwLock::new(timeouts),
            bound: RwLock::new(None),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Process-unique id of this device.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> TransportKind {
        self.inner.kind
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Whether two handles refer to the same device.
    pub fn same_device(&self, other: &TransportDevice) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn open(&self) -> Result<()> {
        let mut link = self.lock_link()?;
        link.transport.open()?;
        link.closed = false;
        link.rx.clear();
        Ok(())
    }

    /// Close the device. Closing a closed device succeeds.
    pub fn close(&self) -> Result<()> {
        let mut link = self.lock_link()?;
        if link.closed {
            return Ok(());
        }
        link.closed = true;
        link.rx.clear();
        debug!(device = self.inner.id, address = %self.inner.address, "Device closed");
        link.transport.close()
    }

    pub fn is_open(&self) -> bool {
        self.lock_link()
            .map(|link| !link.closed && link.transport.is_open())
            .unwrap_or(false)
    }

    pub fn timeouts(&self) -> TransportTimeouts {
        match self.inner.timeouts.read() {
            Ok(timeouts) => *timeouts,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_timeouts(&self, timeouts: TransportTimeouts) {
        match self.inner.timeouts.write() {
            Ok(mut slot) => *slot = timeouts,
            Err(poisoned) => *poisoned.into_inner() = timeouts,
        }
    }

    pub fn set_base_timeout(&self, base: Duration) {
        self.set_timeouts(self.timeouts().with_base(base));
    }

    /// Extra wait added on top of the base timeout for every exchange.
    pub fn set_additional_timeout(&self, additional: Duration) {
        self.set_timeouts(self.timeouts().with_additional(additional));
    }

    /// Wait for one response: base plus additional timeout.
    pub fn exchange_timeout(&self) -> Duration {
        self.timeouts().total()
    }

    /// Identity of the reader negotiated on this device, if any.
    pub fn bound_identity(&self) -> Option<ReaderIdentity> {
        self.bound().map(|bound| bound.identity)
    }

    /// Identity and retry count cached at negotiation.
    pub(crate) fn bound_reader(&self) -> Option<(ReaderIdentity, u8)> {
        self.bound().map(|bound| (bound.identity, bound.retry_count))
    }

    pub(crate) fn bind(&self, identity: ReaderIdentity, retry_count: u8) {
        let bound = Some(BoundReader {
            identity,
            retry_count,
        });
        match self.inner.bound.write() {
            Ok(mut slot) => *slot = bound,
            Err(poisoned) => *poisoned.into_inner() = bound,
        }
    }

    fn bound(&self) -> Option<BoundReader> {
        match self.inner.bound.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Lock the device for a sequence of frame exchanges.
    pub(crate) fn lock(&self) -> Result<DeviceLink<'_>> {
        let link = self.lock_link()?;
        if link.closed || !link.transport.is_open() {
            return Err(Error::fatal(format!(
                "Device {} ({}) is closed",
                self.inner.id, self.inner.address
            )));
        }
        Ok(DeviceLink {
            device: &self.inner,
            link,
        })
    }

    fn lock_link(&self) -> Result<MutexGuard<'_, Link>> {
        self.inner
            .link
            .lock()
            .map_err(|_| Error::fatal(format!("Device {} lock poisoned", self.inner.id)))
    }
}

impl std::fmt::Debug for TransportDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportDevice")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("address", &self.inner.address)
            .finish()
    }
}

/// Exclusive access to an open device.
pub(crate) struct DeviceLink<'d> {
    device: &'d DeviceInner,
    link: MutexGuard<'d, Link>,
}

impl DeviceLink<'_> {
    /// One logical command: up to `retries + 1` attempts.
    ///
    /// Negative acknowledgments are retried like timeouts and surface as
    /// `Error::DeviceError` once the budget is spent. Fatal errors end the
    /// exchange immediately. A `LoopOff` status reissues the request without
    /// consuming an attempt.
    pub(crate) fn transact(
        &mut self,
        request: &Request,
        timeout: Duration,
        retries: u8,
    ) -> Result<Response> {
        let attempts = u32::from(retries) + 1;
        let mut attempt = 0;
        let mut reissues = 0;

        loop {
            attempt += 1;
            let error = match self.attempt(request, timeout) {
                Ok(response) if response.status == StatusCode::LoopOff => {
                    if reissues < MAX_LOOP_OFF_REISSUES {
                        reissues += 1;
                        attempt -= 1;
                        debug!(
                            device = self.device.id,
                            command = %request.command,
                            reissues,
                            "Select loop switched off, reissuing request"
                        );
                        continue;
                    }
                    response.status.to_error()
                }
                Ok(response) if response.is_nack() => response.status.to_error(),
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            if attempt >= attempts {
                debug!(
                    device = self.device.id,
                    command = %request.command,
                    attempts,
                    error = %error,
                    "Exchange failed"
                );
                return Err(error);
            }

            warn!(
                device = self.device.id,
                command = %request.command,
                attempt,
                attempts,
                error = %error,
                "Exchange attempt failed, retrying"
            );
        }
    }

    fn attempt(&mut self, request: &Request, timeout: Duration) -> Result<Response> {
        self.send(request)?;
        let response = self.receive(timeout)?;
        if response.command != request.command {
            return Err(Error::communication(format!(
                "Response for {} while waiting for {}",
                response.command, request.command
            )));
        }
        Ok(response)
    }

    /// Discard stale input and send one request frame.
    pub(crate) fn send(&mut self, request: &Request) -> Result<()> {
        let link = &mut *self.link;
        link.rx.clear();
        link.transport.clear_input()?;

        let mut frame = BytesMut::new();
        link.codec.encode(request.clone(), &mut frame)?;

        trace!(
            device = self.device.id,
            command = %request.command,
            frame = %to_hex(&frame),
            "TX"
        );
        debug_sink::emit(format_args!(
            "[{}] TX {} {}",
            self.device.address,
            request.command,
            to_hex(&frame)
        ));

        link.transport.send(&frame)
    }

    /// Wait up to `timeout` for the next response.
    pub(crate) fn receive(&mut self, timeout: Duration) -> Result<Response> {
        self.poll(timeout)?
            .ok_or_else(|| Error::timeout(millis(timeout)))
    }

    /// Next response already received, without touching the transport.
    pub(crate) fn buffered(&mut self) -> Result<Option<Response>> {
        let link = &mut *self.link;
        let Some(response) = link.codec.decode(&mut link.rx)? else {
            return Ok(None);
        };
        trace!(
            device = self.device.id,
            command = %response.command,
            status = %response.status,
            tag_id = %to_hex(&response.tag_id),
            data = %to_hex(&response.data),
            "RX"
        );
        debug_sink::emit(format_args!(
            "[{}] RX {} {} id={} data={}",
            self.device.address,
            response.command,
            response.status,
            to_hex(&response.tag_id),
            to_hex(&response.data)
        ));
        Ok(Some(response))
    }

    /// Wait up to `wait` for the next response, `Ok(None)` if none arrived.
    pub(crate) fn poll(&mut self, wait: Duration) -> Result<Option<Response>> {
        let deadline = Instant::now() + wait;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(response) = self.buffered()? {
                return Ok(Some(response));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let link = &mut *self.link;
            match link.transport.receive(&mut chunk, remaining) {
                Ok(n) => link.rx.extend_from_slice(&chunk[..n]),
                Err(Error::Timeout { .. }) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }

    pub(crate) fn set_baud_rate(&mut self, rate: u32) -> Result<()> {
        self.link.transport.set_baud_rate(rate)
    }
}

/// Devices returned by discovery.
///
/// The list owns handles only; [`close_all`](Self::close_all) closes every
/// device once. Dropping the list leaves devices open so sessions created
/// from them keep working.
#[derive(Debug, Default, Clone)]
pub struct DeviceList {
    devices: Vec<TransportDevice>,
}

impl DeviceList {
    pub fn new(devices: Vec<TransportDevice>) -> Self {
        Self { devices }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TransportDevice> {
        self.devices.iter()
    }

    pub fn get(&self, index: usize) -> Option<&TransportDevice> {
        self.devices.get(index)
    }

    /// Close every device. An empty list is a no-op.
    ///
    /// All devices are attempted; the first error is returned.
    pub fn close_all(self) -> Result<()> {
        let mut first_error = None;
        for device in self.devices {
            if let Err(e) = device.close() {
                warn!(device = device.id(), error = %e, "Failed to close device");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl IntoIterator for DeviceList {
    type Item = TransportDevice;
    type IntoIter = std::vec::IntoIter<TransportDevice>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.into_iter()
    }
}

impl<'a> IntoIterator for &'a DeviceList {
    type Item = &'a TransportDevice;
    type IntoIter = std::slice::Iter<'a, TransportDevice>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}
