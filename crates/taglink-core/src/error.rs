//! Error taxonomy shared by every taglink crate.
//!
//! Errors fall into three families that drive the retry and scan-loop policy:
//!
//! - **Validation** (`InvalidArgument`, `OutOfRange`) is detected before any
//!   transport I/O and is never retried.
//! - **Transient** (`Timeout`, `Communication`, `DeviceError`) is retried up
//!   to the session's command retry count before it reaches the caller.
//! - **Fatal** means the transport device is unusable; nothing is retried and
//!   the inventory scan loop stops.

use thiserror::Error;

use crate::types::ReconfigStep;

#[derive(Error, Debug)]
pub enum Error {
    // Validation errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Address out of range: start {start} + {blocks} blocks exceeds {size} blocks")]
    OutOfRange { start: u32, blocks: u32, size: u32 },

    // Transport errors
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Device error 0x{code:02X}: {description}")]
    DeviceError { code: u8, description: String },

    #[error("Fatal transport error: {0}")]
    Fatal(String),

    // Decoding errors for values returned by hardware
    #[error("Unknown host interface code 0x{0:02X}")]
    UnknownInterface(u8),

    #[error("Unknown baud rate code 0x{0:02X}")]
    UnknownBaud(u8),

    #[error("Unknown tag type code 0x{0:04X}")]
    UnknownTagType(u16),

    // Higher level failures
    #[error("Verification failed: wrote {expected}, read back {actual}")]
    VerificationFailed { expected: String, actual: String },

    #[error("Interface change failed at {step} step: {source}")]
    Reconfiguration {
        step: ReconfigStep,
        #[source]
        source: Box<Error>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Frame too large: {size} bytes (max: {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication(message.into())
    }

    /// Create a fatal transport error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Create a negative acknowledgment error, preserving the device code.
    pub fn device(code: u8, description: impl Into<String>) -> Self {
        Self::DeviceError {
            code,
            description: description.into(),
        }
    }

    /// Wrap an error with the interface-change step that produced it.
    pub fn reconfiguration(step: ReconfigStep, source: Error) -> Self {
        Self::Reconfiguration {
            step,
            source: Box::new(source),
        }
    }

    /// Whether another attempt of the same exchange may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Communication(_) | Self::DeviceError { .. }
        )
    }

    /// Whether the underlying transport device became unusable.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Fatal(_) => true,
            Self::Io(e) => is_fatal_io(e.kind()),
            Self::Reconfiguration { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// The device status code carried by a negative acknowledgment, if any.
    pub fn device_code(&self) -> Option<u8> {
        match self {
            Self::DeviceError { code, .. } => Some(*code),
            Self::Reconfiguration { source, .. } => source.device_code(),
            _ => None,
        }
    }

    /// Classify an I/O error from a transport into the taglink taxonomy.
    ///
    /// `timeout_ms` is reported when the I/O error is a timeout.
    pub fn from_io(error: std::io::Error, timeout_ms: u64) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::timeout(timeout_ms),
            kind if is_fatal_io(kind) => Self::fatal(error.to_string()),
            _ => Self::communication(error.to_string()),
        }
    }
}

fn is_fatal_io(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind;

    matches!(
        kind,
        ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotFound
            | ErrorKind::PermissionDenied
    )
}

pub type Result<T> = std::result::Result<T, Error>;
