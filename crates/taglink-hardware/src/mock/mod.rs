//! Simulated hardware for testing and development.
//!
//! The simulator speaks the real wire protocol, so everything above the
//! transport runs unchanged against it.

pub mod simulator;

pub use simulator::{SimulatedReader, SimulatorHandle};
