pub mod address;
pub mod buffer;
pub mod constants;
pub mod error;
pub mod types;

pub use address::{AddressSpace, MemoryAddress, SpaceKind};
pub use buffer::DataBuffer;
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
