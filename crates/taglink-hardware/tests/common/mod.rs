//! Shared helpers for the hardware integration tests.

#![allow(dead_code)]

use taglink_core::{TagType, address::BANK_EPC, address::BANK_TID};
use taglink_hardware::mock::{SimulatedReader, SimulatorHandle};
use taglink_hardware::{ReaderSession, Tag, TransportDevice};

/// A 96-bit Gen2 EPC used across tests.
pub const TEST_EPC: [u8; 12] = [
    0xE2, 0x00, 0x34, 0x12, 0x01, 0x3B, 0xF7, 0x00, 0x01, 0x02, 0x03, 0x04,
];

/// First two TID words of the test tag.
pub const TEST_TID: [u8; 4] = [0xE2, 0x80, 0x11, 0x05];

/// A session on a fresh simulated reader.
pub fn session() -> (ReaderSession, SimulatorHandle) {
    let (reader, handle) = SimulatedReader::new();
    let session = ReaderSession::open(TransportDevice::new(Box::new(reader)))
        .expect("simulated reader negotiates");
    (session, handle)
}

/// A session with one Gen2 tag in the field, EPC and TID banks populated.
pub fn session_with_gen2_tag() -> (ReaderSession, SimulatorHandle, Tag) {
    let (session, handle) = session();
    handle.add_tag(TagType::Gen2, &TEST_EPC);

    // CRC and PC words precede the EPC.
    let mut epc_bank = vec![0x12, 0x34, 0x30, 0x00];
    epc_bank.extend_from_slice(&TEST_EPC);
    handle.set_tag_memory(&TEST_EPC, BANK_EPC, 0, &epc_bank);
    handle.set_tag_memory(&TEST_EPC, BANK_TID, 0, &TEST_TID);

    let tag = session
        .select_tag(TagType::AutoDetect)
        .expect("select succeeds")
        .expect("tag in field");
    (session, handle, tag)
}

/// Install a tracing subscriber once, honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
