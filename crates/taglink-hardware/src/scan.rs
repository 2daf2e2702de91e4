//! Continuous inventory scan.
//!
//! An [`InventoryScan`] repeats inventory rounds on one session and hands
//! every tag found to a visitor, until a [`CancellationToken`] is set or the
//! device fails fatally.
//!
//! ```text
//! Idle ──► Discovering ──► Visiting ──► Discovering ...
//!               │              │
//!               └──────────────┴──────► Stopped
//! ```
//!
//! Tags are visited as the reader reports them, while the round is still
//! in flight, so readers that stream tags without ever completing a round
//! are served too. The visitor runs while the scan holds the device, so it
//! must not issue commands on the same device.
//!
//! The token is observed at the top of every iteration, before every wait
//! for the reader while a round is in flight, during the idle pause, and
//! before each tag visit when [`ScanConfig::continue_after_each`] is set.
//!
//! ```
//! use std::time::Duration;
//! use taglink_core::TagType;
//! use taglink_hardware::mock::SimulatedReader;
//! use taglink_hardware::scan::{InventoryScan, ScanConfig};
//! use taglink_hardware::{ReaderSession, TransportDevice};
//!
//! let (reader, handle) = SimulatedReader::new();
//! handle.add_tag(TagType::Gen2, &[0xE2, 0x00, 0x00, 0x01]);
//! let session = ReaderSession::open(TransportDevice::new(Box::new(reader))).unwrap();
//!
//! let scan = InventoryScan::new(session, ScanConfig::default());
//! let mut running = scan.spawn(|tag| {
//!     println!("{tag}");
//!     true
//! }).unwrap();
//!
//! std::thread::sleep(Duration::from_millis(50));
//! let report = running.stop(Duration::from_secs(5)).unwrap();
//! assert!(report.stop_reason.is_cancelled());
//! ```

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taglink_core::{
    Error, Result, TagType,
    constants::{DEFAULT_SCAN_IDLE_MS, POLL_SLICE_MS},
};
use tracing::{debug, info, trace, warn};

use crate::session::ReaderSession;
use crate::tag::Tag;
use crate::transport::millis;

/// Phase of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Discovering,
    Visiting,
    /// Terminal.
    Stopped,
}

impl ScanState {
    pub fn can_transition_to(&self, next: ScanState) -> bool {
        use ScanState::*;
        matches!(
            (self, next),
            (Idle, Discovering)
                | (Idle, Stopped)
                | (Discovering, Visiting)
                | (Discovering, Stopped)
                | (Visiting, Discovering)
                | (Visiting, Stopped)
        )
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Discovering,
            2 => Self::Visiting,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Discovering => 1,
            Self::Visiting => 2,
            Self::Stopped => 3,
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Discovering => write!(f, "discovering"),
            Self::Visiting => write!(f, "visiting"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Cross-thread stop signal.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Tag type filter of every round.
    pub tag_type: TagType,
    /// Also observe cancellation between two tag visits.
    pub continue_after_each: bool,
    /// Ask the reader to stream tags continuously instead of running
    /// discrete rounds.
    pub loop_mode: bool,
    /// Pause between iterations.
    pub idle_delay: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            tag_type: TagType::AutoDetect,
            continue_after_each: true,
            loop_mode: false,
            idle_delay: Duration::from_millis(DEFAULT_SCAN_IDLE_MS),
        }
    }
}

impl ScanConfig {
    pub fn with_tag_type(mut self, tag_type: TagType) -> Self {
        self.tag_type = tag_type;
        self
    }

    pub fn with_idle_delay(mut self, idle_delay: Duration) -> Self {
        self.idle_delay = idle_delay;
        self
    }

    pub fn with_continue_after_each(mut self, continue_after_each: bool) -> Self {
        self.continue_after_each = continue_after_each;
        self
    }

    pub fn with_loop_mode(mut self, loop_mode: bool) -> Self {
        self.loop_mode = loop_mode;
        self
    }
}

/// Why a scan ended.
#[derive(Debug)]
pub enum StopReason {
    Cancelled,
    /// The device became unusable.
    Fatal(Error),
}

impl StopReason {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Outcome of a finished scan.
#[derive(Debug)]
pub struct ScanReport {
    /// Inventory rounds that ran to an outcome. A round cut short by
    /// cancellation is not counted, even when it visited tags.
    pub iterations: u64,
    /// Rounds that failed with a recoverable error.
    pub failed_iterations: u64,
    pub tags_visited: u64,
    /// Visits where the visitor returned `false`.
    pub tags_declined: u64,
    pub max_tags_per_iteration: usize,
    pub stop_reason: StopReason,
}

impl ScanReport {
    /// Share of rounds that succeeded, in percent. Zero without rounds.
    pub fn success_percentage(&self) -> f64 {
        if self.iterations == 0 {
            return 0.0;
        }
        let succeeded = self.iterations - self.failed_iterations;
        succeeded as f64 * 100.0 / self.iterations as f64
    }
}

#[derive(Debug, Default)]
struct Counters {
    iterations: u64,
    failed_iterations: u64,
    tags_visited: u64,
    tags_declined: u64,
    max_tags_per_iteration: usize,
}

impl Counters {
    fn into_report(self, stop_reason: StopReason) -> ScanReport {
        ScanReport {
            iterations: self.iterations,
            failed_iterations: self.failed_iterations,
            tags_visited: self.tags_visited,
            tags_declined: self.tags_declined,
            max_tags_per_iteration: self.max_tags_per_iteration,
            stop_reason,
        }
    }
}

/// Repeated inventory over one session.
#[derive(Debug)]
pub struct InventoryScan {
    session: ReaderSession,
    config: ScanConfig,
    state: Arc<AtomicU8>,
}

impl InventoryScan {
    pub fn new(session: ReaderSession, config: ScanConfig) -> Self {
        Self {
            session,
            config,
            state: Arc::new(AtomicU8::new(ScanState::Idle.as_u8())),
        }
    }

    pub fn state(&self) -> ScanState {
        ScanState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn session(&self) -> &ReaderSession {
        &self.session
    }

    /// Give the session back, for example after the scan stopped.
    pub fn into_session(self) -> ReaderSession {
        self.session
    }

    fn transition(&self, next: ScanState) {
        let current = self.state();
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "Unexpected scan state transition");
        }
        trace!(from = %current, to = %next, "Scan state");
        self.state.store(next.as_u8(), Ordering::Release);
    }

    /// Scan until `token` is cancelled or the device fails fatally.
    ///
    /// The visitor is called once per tag found, in discovery order, and
    /// owns the tag. Its return value is advisory: `false` is counted in
    /// [`ScanReport::tags_declined`] but does not stop the scan.
    ///
    /// # Errors
    /// `InvalidArgument` when the scan already stopped. Device failures are
    /// reported through [`ScanReport::stop_reason`].
    pub fn run<F>(&mut self, mut visitor: F, token: &CancellationToken) -> Result<ScanReport>
    where
        F: FnMut(Tag) -> bool,
    {
        if self.state() == ScanState::Stopped {
            return Err(Error::invalid_argument("Scan already stopped"));
        }

        info!(
            device = self.session.device().id(),
            reader = %self.session.identity().friendly_name,
            tag_type = %self.config.tag_type,
            "Inventory scan started"
        );

        let mut counters = Counters::default();
        let reason = self.scan_loop(&mut visitor, token, &mut counters);
        self.transition(ScanState::Stopped);

        let report = counters.into_report(reason);
        info!(
            device = self.session.device().id(),
            iterations = report.iterations,
            failed = report.failed_iterations,
            tags = report.tags_visited,
            success = %format_args!("{:.1}%", report.success_percentage()),
            reason = ?report.stop_reason,
            "Inventory scan stopped"
        );
        Ok(report)
    }

    fn scan_loop(
        &self,
        visitor: &mut dyn FnMut(Tag) -> bool,
        token: &CancellationToken,
        counters: &mut Counters,
    ) -> StopReason {
        loop {
            if token.is_cancelled() {
                return StopReason::Cancelled;
            }

            self.transition(ScanState::Discovering);
            let mut in_round = 0usize;
            let round = self.session.inventory_round(
                self.config.tag_type,
                self.config.loop_mode,
                Some(token),
                |tag| {
                    if self.config.continue_after_each && token.is_cancelled() {
                        return ControlFlow::Break(());
                    }
                    self.transition(ScanState::Visiting);
                    debug!(tag = %tag, "Visiting tag");
                    in_round += 1;
                    counters.tags_visited += 1;
                    counters.max_tags_per_iteration = counters.max_tags_per_iteration.max(in_round);
                    if !visitor(tag) {
                        counters.tags_declined += 1;
                    }
                    self.transition(ScanState::Discovering);
                    ControlFlow::Continue(())
                },
            );

            match round {
                Ok(true) => counters.iterations += 1,
                Ok(false) => return StopReason::Cancelled,
                Err(e) if e.is_fatal() => {
                    warn!(device = self.session.device().id(), error = %e, "Scan stopped by device failure");
                    return StopReason::Fatal(e);
                }
                Err(e) => {
                    counters.iterations += 1;
                    counters.failed_iterations += 1;
                    warn!(
                        device = self.session.device().id(),
                        iteration = counters.iterations,
                        error = %e,
                        "Inventory iteration failed"
                    );
                }
            }

            if self.idle(token) {
                return StopReason::Cancelled;
            }
        }
    }

    // Returns whether cancellation arrived during the pause.
    fn idle(&self, token: &CancellationToken) -> bool {
        let slice = Duration::from_millis(POLL_SLICE_MS);
        let mut remaining = self.config.idle_delay;
        while !remaining.is_zero() {
            if token.is_cancelled() {
                return true;
            }
            let step = remaining.min(slice);
            std::thread::sleep(step);
            remaining -= step;
        }
        token.is_cancelled()
    }

    /// Run the scan on its own thread.
    ///
    /// # Errors
    /// `Io` when the thread cannot be spawned.
    pub fn spawn<F>(mut self, visitor: F) -> Result<ScanHandle>
    where
        F: FnMut(Tag) -> bool + Send + 'static,
    {
        let token = CancellationToken::new();
        let state = self.state.clone();
        let (tx, rx) = mpsc::channel();
        let thread_token = token.clone();

        let thread = std::thread::Builder::new()
            .name(format!("taglink-scan-{}", self.session.device().id()))
            .spawn(move || {
                let result = self.run(visitor, &thread_token);
                // The handle may be gone already.
                let _ = tx.send(result);
            })?;

        Ok(ScanHandle {
            token,
            state,
            rx,
            thread: Some(thread),
        })
    }
}

/// Control of a scan running on its own thread.
///
/// Dropping the handle cancels the scan without waiting for it.
#[derive(Debug)]
pub struct ScanHandle {
    token: CancellationToken,
    state: Arc<AtomicU8>,
    rx: mpsc::Receiver<Result<ScanReport>>,
    thread: Option<JoinHandle<()>>,
}

impl ScanHandle {
    pub fn state(&self) -> ScanState {
        ScanState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the scan and wait up to `timeout` for it to stop.
    ///
    /// # Errors
    /// `Timeout` when the scan is still running after `timeout`; calling
    /// `stop` again keeps waiting. `Fatal` when the scan thread died, and
    /// `InvalidArgument` when the report was already collected.
    pub fn stop(&mut self, timeout: Duration) -> Result<ScanReport> {
        self.token.cancel();
        let Some(thread) = self.thread.take() else {
            return Err(Error::invalid_argument("Scan report already collected"));
        };

        match self.rx.recv_timeout(timeout) {
            Ok(result) => {
                // The thread has sent its last message.
                let _ = thread.join();
                result
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                self.thread = Some(thread);
                Err(Error::timeout(millis(timeout)))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                Err(Error::fatal("Scan thread ended without a report"))
            }
        }
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
