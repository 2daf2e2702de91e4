//! Addressed memory access against the simulated reader.

mod common;

use common::{TEST_EPC, TEST_TID, session, session_with_gen2_tag};
use proptest::prelude::*;
use rstest::rstest;
use taglink_core::{AddressSpace, Error, MemoryAddress, TagType, address::BANK_USER};
use taglink_hardware::{SystemParameter, Target};
use taglink_protocol::{CommandCode, StatusCode};

#[test]
fn test_read_gen2_epc_words() {
    let (session, _handle, tag) = session_with_gen2_tag();
    let epc = session
        .read_tag_data(&tag, &AddressSpace::gen2_epc(), MemoryAddress::new(2, 6))
        .unwrap();
    assert_eq!(epc.len(), 12);
    assert_eq!(epc.as_slice(), &TEST_EPC);
    assert_eq!(tag.tag_type, TagType::Gen2);
}

#[test]
fn test_read_gen2_tid_words() {
    let (session, _handle, tag) = session_with_gen2_tag();
    let tid = session
        .read_tag_data(&tag, &AddressSpace::gen2_tid(), MemoryAddress::new(0, 2))
        .unwrap();
    assert_eq!(tid.len(), 4);
    assert_eq!(tid.as_slice(), &TEST_TID);
}

#[test]
fn test_odd_write_to_word_bank_rejected_without_io() {
    let (session, handle, tag) = session_with_gen2_tag();
    let before = handle.request_count();

    let error = session
        .write_tag_data(
            &tag,
            &AddressSpace::gen2_user(8),
            MemoryAddress::new(0, 1),
            &[0x01, 0x02, 0x03],
        )
        .unwrap_err();
    assert!(matches!(error, Error::InvalidArgument(_)));
    assert_eq!(handle.request_count(), before);
}

#[rstest]
#[case(AddressSpace::gen2_epc(), MemoryAddress::new(7, 2))]
#[case(AddressSpace::gen2_tid(), MemoryAddress::new(6, 1))]
#[case(AddressSpace::gen2_reserved(), MemoryAddress::new(0, 5))]
#[case(AddressSpace::gen2_user(16), MemoryAddress::new(u16::MAX, 1))]
fn test_out_of_range_fails_before_io(#[case] space: AddressSpace, #[case] address: MemoryAddress) {
    let (session, handle, tag) = session_with_gen2_tag();
    let before = handle.request_count();

    let read = session.read(Target::Tag(&tag), &space, address).unwrap_err();
    assert!(matches!(read, Error::OutOfRange { .. }));

    let data = vec![0u8; space.byte_len(&address)];
    let write = session
        .write(Target::Tag(&tag), &space, address, &data)
        .unwrap_err();
    assert!(matches!(write, Error::OutOfRange { .. }));

    assert_eq!(handle.request_count(), before);
}

#[test]
fn test_failure_between_chunks_keeps_earlier_chunks() {
    let (session, handle, tag) = session_with_gen2_tag();
    let space = AddressSpace::gen2_user(64);
    let address = MemoryAddress::new(0, 40);
    let data: Vec<u8> = (0..space.byte_len(&address)).map(|i| i as u8).collect();
    handle.fail_after(CommandCode::WriteTag, 1, StatusCode::WriteFailed);
    let before = handle.count_of(CommandCode::WriteTag);

    let error = session
        .write(Target::Tag(&tag), &space, address, &data)
        .unwrap_err();
    assert_eq!(error.device_code(), Some(0x86));

    // First chunk once, second chunk with its own retry.
    assert_eq!(handle.count_of(CommandCode::WriteTag) - before, 3);
    let written = handle.tag_memory(&TEST_EPC, BANK_USER);
    assert_eq!(written, &data[..64]);
}

#[test]
fn test_zero_blocks_is_invalid_argument() {
    let (session, handle, tag) = session_with_gen2_tag();
    let before = handle.request_count();
    let error = session
        .read(Target::Tag(&tag), &AddressSpace::gen2_epc(), MemoryAddress::new(0, 0))
        .unwrap_err();
    assert!(matches!(error, Error::InvalidArgument(_)));
    assert_eq!(handle.request_count(), before);
}

#[test]
fn test_system_parameter_read_through_memory_model() {
    let (session, _handle) = session();
    let retry = session
        .read(
            Target::Reader,
            &AddressSpace::system_parameters(),
            SystemParameter::CommandRetry.range(),
        )
        .unwrap();
    assert_eq!(retry.as_slice(), &[1]);
}

#[test]
fn test_device_error_keeps_code() {
    let (session, handle, tag) = session_with_gen2_tag();
    handle.fail_command(CommandCode::ReadTag, StatusCode::ReadFailed);

    let error = session
        .read_tag_data(&tag, &AddressSpace::gen2_tid(), MemoryAddress::new(0, 2))
        .unwrap_err();
    assert_eq!(error.device_code(), Some(0x85));
}

#[test]
fn test_removed_tag_is_no_tag() {
    let (session, handle, tag) = session_with_gen2_tag();
    handle.remove_tag(&TEST_EPC);

    let error = session
        .read_tag_data(&tag, &AddressSpace::gen2_tid(), MemoryAddress::new(0, 2))
        .unwrap_err();
    assert_eq!(error.device_code(), Some(0x84));
}

#[test]
fn test_tag_config_round_trip() {
    let (session, _handle, tag) = session_with_gen2_tag();
    session
        .write_tag_config(&tag, 64, MemoryAddress::new(4, 3), &[0x10, 0x20, 0x30])
        .unwrap();
    let config = session
        .read_tag_config(&tag, 64, MemoryAddress::new(4, 3))
        .unwrap();
    assert_eq!(config.as_slice(), &[0x10, 0x20, 0x30]);
}

#[test]
fn test_protected_write_after_password() {
    let (session, handle, tag) = session_with_gen2_tag();
    handle.set_tag_password(&TEST_EPC, &[0xDE, 0xAD, 0xBE, 0xEF]);

    let denied = session.send_tag_password(&tag, &[0, 0, 0, 0]).unwrap_err();
    assert_eq!(denied.device_code(), Some(0x8A));
    session
        .send_tag_password(&tag, &[0xDE, 0xAD, 0xBE, 0xEF])
        .unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_write_then_read_returns_data(
        start in 0u16..96,
        blocks in 1u16..=32,
        seed in any::<u8>(),
    ) {
        let space = AddressSpace::gen2_user(128);
        let address = MemoryAddress::new(start, blocks);
        let data: Vec<u8> = (0..space.byte_len(&address))
            .map(|i| seed.wrapping_add(i as u8))
            .collect();

        let (session, _handle, tag) = session_with_gen2_tag();
        session.write(Target::Tag(&tag), &space, address, &data).unwrap();
        let read = session.read(Target::Tag(&tag), &space, address).unwrap();
        prop_assert_eq!(read.as_slice(), &data[..]);
    }

    #[test]
    fn prop_out_of_range_never_reaches_the_reader(
        size in 1u32..=64,
        start in 0u16..=96,
        blocks in 1u16..=96,
    ) {
        let space = AddressSpace::gen2_user(size);
        let address = MemoryAddress::new(start, blocks);
        prop_assume!(address.end() > size);

        let (session, handle, tag) = session_with_gen2_tag();
        let before = handle.request_count();

        let read = session.read(Target::Tag(&tag), &space, address);
        prop_assert!(
            matches!(read, Err(Error::OutOfRange { .. })),
            "read of {} in {} blocks: {:?}",
            address,
            size,
            read
        );
        let data = vec![0u8; space.byte_len(&address)];
        let write = session.write(Target::Tag(&tag), &space, address, &data);
        prop_assert!(matches!(write, Err(Error::OutOfRange { .. })), "expected OutOfRange, got {:?}", write);
        prop_assert_eq!(handle.request_count(), before);
    }

    #[test]
    fn prop_chunk_count_matches_range(blocks in 1u16..=200) {
        let space = AddressSpace::gen2_user(256);
        let (session, handle, tag) = session_with_gen2_tag();
        let before = handle.count_of(CommandCode::ReadTag);

        session
            .read(Target::Tag(&tag), &space, MemoryAddress::new(0, blocks))
            .unwrap();
        let expected = usize::from(blocks.div_ceil(32));
        prop_assert_eq!(handle.count_of(CommandCode::ReadTag) - before, expected);
    }
}
