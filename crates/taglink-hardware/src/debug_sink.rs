//! Process-wide debug observer.
//!
//! An application may register one callback that receives a human readable
//! line for every frame exchanged with any reader. The observer only adds
//! visibility: with or without it, every operation behaves the same.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use taglink_hardware::debug_sink;
//!
//! let lines = Arc::new(Mutex::new(Vec::new()));
//! let sink = lines.clone();
//! let guard = debug_sink::register(Arc::new(move |line: &str| {
//!     sink.lock().unwrap().push(line.to_string());
//! }));
//!
//! debug_sink::emit(format_args!("hello {}", 42));
//! drop(guard);
//! debug_sink::emit(format_args!("not delivered"));
//!
//! assert!(lines.lock().unwrap().iter().any(|l| l == "hello 42"));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

/// Callback receiving debug lines.
pub type DebugSink = Arc<dyn Fn(&str) + Send + Sync>;

/// The installed observer and the registration it came from.
static SINK: RwLock<Option<(u64, DebugSink)>> = RwLock::new(None);
static NEXT_REGISTRATION: AtomicU64 = AtomicU64::new(1);

/// Unregisters the observer when dropped.
///
/// A guard only removes its own registration: once a newer observer
/// replaced it, dropping the old guard leaves the newer one installed.
#[must_use = "dropping the guard unregisters the observer"]
pub struct SinkGuard {
    registration: u64,
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        let mut slot = write_slot();
        if slot.as_ref().is_some_and(|(id, _)| *id == self.registration) {
            *slot = None;
        }
    }
}

fn write_slot() -> RwLockWriteGuard<'static, Option<(u64, DebugSink)>> {
    SINK.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install `sink`, replacing any previous observer.
pub fn register(sink: DebugSink) -> SinkGuard {
    let registration = NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed);
    *write_slot() = Some((registration, sink));
    SinkGuard { registration }
}

/// Remove the current observer. Removing when none is set is a no-op.
pub fn unregister() {
    *write_slot() = None;
}

pub fn is_registered() -> bool {
    SINK.read().map(|slot| slot.is_some()).unwrap_or(false)
}

/// Deliver one line to the observer, if any.
///
/// The line is only formatted when an observer is installed.
pub fn emit(args: fmt::Arguments<'_>) {
    let sink = match SINK.read() {
        Ok(slot) => slot.as_ref().map(|(_, sink)| sink.clone()),
        Err(_) => None,
    };
    if let Some(sink) = sink {
        sink(&args.to_string());
    }
}
