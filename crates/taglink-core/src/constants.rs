//! Protocol-independent constants shared across the taglink crates.
//!
//! Timing values are the defaults used when a device or session is created;
//! every one of them can be overridden at runtime.
//!
//! # Timeout budget
//!
//! A single exchange waits at most `base + additional` for a response and is
//! attempted `retry_count + 1` times, so the worst case latency of one
//! logical operation is:
//!
//! ```
//! use std::time::Duration;
//! use taglink_core::constants::*;
//!
//! let per_attempt = Duration::from_millis(DEFAULT_BASE_TIMEOUT_MS)
//!     + Duration::from_millis(DEFAULT_ADDITIONAL_TIMEOUT_MS);
//! let worst_case = per_attempt * (u32::from(DEFAULT_COMMAND_RETRIES) + 1);
//! assert_eq!(worst_case, Duration::from_millis(4000));
//! ```

// ============================================================================
// Timing
// ============================================================================

/// Base response timeout of a transport device in milliseconds.
pub const DEFAULT_BASE_TIMEOUT_MS: u64 = 2000;

/// Additional response timeout added on top of the base timeout.
///
/// Slow readers (long inventories, noisy RF fields) are commonly given
/// several extra seconds.
pub const DEFAULT_ADDITIONAL_TIMEOUT_MS: u64 = 0;

/// Timeout used for the liveness check during device enumeration.
pub const DEFAULT_LIVENESS_TIMEOUT_MS: u64 = 500;

/// Timeout used when negotiating a reader session during discovery.
pub const DEFAULT_NEGOTIATE_TIMEOUT_MS: u64 = 1000;

/// Slice used while polling for streamed inventory responses.
///
/// Cancellation is observed at least this often while a scan waits
/// for the reader.
pub const POLL_SLICE_MS: u64 = 50;

/// Pause between two inventory iterations of a scan.
pub const DEFAULT_SCAN_IDLE_MS: u64 = 100;

// ============================================================================
// Retries
// ============================================================================

/// Retry count used when the reader does not report one.
pub const DEFAULT_COMMAND_RETRIES: u8 = 1;

/// Maximum number of times a request is reissued after the reader reports
/// that a previous select loop was switched off.
pub const MAX_LOOP_OFF_REISSUES: u8 = 3;

// ============================================================================
// Addressing
// ============================================================================

/// Block size of EPC Gen2 memory banks (one 16-bit word).
pub const GEN2_BLOCK_SIZE: usize = 2;

/// Number of addressable system parameter blocks.
pub const SYSTEM_PARAMETER_SPACE_SIZE: u32 = 0x100;

/// Maximum number of blocks moved by a single exchange.
///
/// Larger reads and writes are chunked transparently.
pub const MAX_BLOCKS_PER_EXCHANGE: u16 = 32;

// ============================================================================
// Serial defaults
// ============================================================================

/// Baud rate assumed when opening a serial port for the first time.
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// USB vendor id used to filter HID endpoints during discovery.
pub const DEFAULT_USB_VENDOR_ID: u16 = 0xAFEF;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_slice_is_shorter_than_timeouts() {
        assert!(POLL_SLICE_MS < DEFAULT_LIVENESS_TIMEOUT_MS);
        assert!(DEFAULT_LIVENESS_TIMEOUT_MS < DEFAULT_BASE_TIMEOUT_MS);
    }

    #[test]
    fn test_system_parameter_space_fits_addresses() {
        assert!(SYSTEM_PARAMETER_SPACE_SIZE <= u32::from(u16::MAX) + 1);
    }
}
