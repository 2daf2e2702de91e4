//! Block addressing for tag memory, tag configuration and reader parameters.
//!
//! All three address spaces share one scheme: a range starts at a block
//! offset and spans a number of fixed-size blocks. The block size and the
//! declared size belong to the space, never to the call site.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    Result,
    constants::{GEN2_BLOCK_SIZE, SYSTEM_PARAMETER_SPACE_SIZE},
    error::Error,
};

/// Gen2 memory bank holding the kill and access passwords.
pub const BANK_RESERVED: u8 = 0b00;
/// Gen2 memory bank holding CRC, PC and EPC words.
pub const BANK_EPC: u8 = 0b01;
/// Gen2 memory bank holding the tag identifier.
pub const BANK_TID: u8 = 0b10;
/// Gen2 user memory bank.
pub const BANK_USER: u8 = 0b11;

/// Blocks reachable with a 16-bit wire address.
pub const ADDRESSABLE_BLOCKS: u32 = u16::MAX as u32 + 1;

/// Family of an address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceKind {
    /// Tag data memory, optionally split in banks.
    TagData,
    /// Tag configuration registers.
    TagConfig,
    /// Reader system parameters.
    SystemParameters,
}

/// A contiguous range inside an address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryAddress {
    /// First block of the range.
    pub start: u16,
    /// Number of blocks, at least one.
    pub blocks: u16,
}

impl MemoryAddress {
    pub const fn new(start: u16, blocks: u16) -> Self {
        Self { start, blocks }
    }

    /// Exclusive end block, computed without overflow.
    #[must_use]
    pub fn end(&self) -> u32 {
        u32::from(self.start) + u32::from(self.blocks)
    }

    /// Split into consecutive ranges of at most `max_blocks` blocks.
    ///
    /// Chunks are returned in ascending address order and stop at the end
    /// of the 16-bit address range; [`AddressSpace::validate`] rejects
    /// ranges that run past it.
    pub fn chunks(&self, max_blocks: u16) -> impl Iterator<Item = MemoryAddress> {
        let max_blocks = max_blocks.max(1);
        let start = u32::from(self.start);
        let end = self.end().min(ADDRESSABLE_BLOCKS);

        (start..end)
            .step_by(usize::from(max_blocks))
            .map_while(move |chunk_start| {
                let blocks = (end - chunk_start).min(u32::from(max_blocks));
                Some(MemoryAddress::new(
                    u16::try_from(chunk_start).ok()?,
                    u16::try_from(blocks).ok()?,
                ))
            })
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:04X}+{}", self.start, self.blocks)
    }
}

/// Descriptor of a named address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressSpace {
    pub kind: SpaceKind,
    /// Bank selector sent with tag data requests.
    pub bank: u8,
    /// Size of one block in bytes.
    pub block_size: usize,
    /// Declared size of the space in blocks.
    pub size_blocks: u32,
}

impl AddressSpace {
    /// Generic tag data bank.
    pub const fn tag_data(bank: u8, block_size: usize, size_blocks: u32) -> Self {
        Self {
            kind: SpaceKind::TagData,
            bank,
            block_size,
            size_blocks,
        }
    }

    /// Gen2 reserved bank: kill and access passwords (4 words).
    pub const fn gen2_reserved() -> Self {
        Self::tag_data(BANK_RESERVED, GEN2_BLOCK_SIZE, 4)
    }

    /// Gen2 EPC bank: CRC, PC and a 96-bit EPC (8 words).
    pub const fn gen2_epc() -> Self {
        Self::tag_data(BANK_EPC, GEN2_BLOCK_SIZE, 8)
    }

    /// Gen2 TID bank (6 words).
    pub const fn gen2_tid() -> Self {
        Self::tag_data(BANK_TID, GEN2_BLOCK_SIZE, 6)
    }

    /// Gen2 user bank of `size_blocks` words.
    pub const fn gen2_user(size_blocks: u32) -> Self {
        Self::tag_data(BANK_USER, GEN2_BLOCK_SIZE, size_blocks)
    }

    /// Tag configuration registers, one byte per block.
    pub const fn tag_config(size_blocks: u32) -> Self {
        Self {
            kind: SpaceKind::TagConfig,
            bank: 0,
            block_size: 1,
            size_blocks,
        }
    }

    /// Reader system parameter table, one byte per block.
    pub const fn system_parameters() -> Self {
        Self {
            kind: SpaceKind::SystemParameters,
            bank: 0,
            block_size: 1,
            size_blocks: SYSTEM_PARAMETER_SPACE_SIZE,
        }
    }

    /// Whether requests against this space need a selected tag.
    #[must_use]
    pub fn requires_tag(&self) -> bool {
        matches!(self.kind, SpaceKind::TagData | SpaceKind::TagConfig)
    }

    /// Check an address against the declared size.
    ///
    /// # Errors
    /// - `Error::InvalidArgument` when the block count is zero
    /// - `Error::OutOfRange` when the range runs past the end of the space
    ///   or past the last block a 16-bit address can reach
    pub fn validate(&self, address: &MemoryAddress) -> Result<()> {
        if address.blocks == 0 {
            return Err(Error::invalid_argument("Block count must be at least 1"));
        }

        let size = self.size_blocks.min(ADDRESSABLE_BLOCKS);
        if address.end() > size {
            return Err(Error::OutOfRange {
                start: u32::from(address.start),
                blocks: u32::from(address.blocks),
                size,
            });
        }

        Ok(())
    }

    /// Number of bytes covered by `address`.
    #[must_use]
    pub fn byte_len(&self, address: &MemoryAddress) -> usize {
        usize::from(address.blocks) * self.block_size
    }

    /// Check that `data` exactly covers `address`.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` on a length mismatch.
    pub fn check_payload(&self, address: &MemoryAddress, data: &[u8]) -> Result<()> {
        let expected = self.byte_len(address);
        if data.len() != expected {
            return Err(Error::invalid_argument(format!(
                "Write of {} blocks needs {expected} bytes, got {}",
                address.blocks,
                data.len()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            SpaceKind::TagData => write!(f, "tag data bank {}", self.bank),
            SpaceKind::TagConfig => write!(f, "tag config"),
            SpaceKind::SystemParameters => write!(f, "system parameters"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_epc_read_length() {
        let space = AddressSpace::gen2_epc();
        let address = MemoryAddress::new(0x02, 6);
        space.validate(&address).unwrap();
        assert_eq!(space.byte_len(&address), 12);
    }

    #[test]
    fn test_tid_read_length() {
        let space = AddressSpace::gen2_tid();
        let address = MemoryAddress::new(0x00, 2);
        space.validate(&address).unwrap();
        assert_eq!(space.byte_len(&address), 4);
    }

    #[rstest]
    #[case(0, 9)]
    #[case(7, 2)]
    #[case(8, 1)]
    #[case(u16::MAX, u16::MAX)]
    fn test_out_of_range(#[case] start: u16, #[case] blocks: u16) {
        let space = AddressSpace::gen2_epc();
        assert!(matches!(
            space.validate(&MemoryAddress::new(start, blocks)),
            Err(Error::OutOfRange { size: 8, .. })
        ));
    }

    #[test]
    fn test_zero_blocks_is_invalid() {
        let space = AddressSpace::gen2_epc();
        assert!(matches!(
            space.validate(&MemoryAddress::new(0, 0)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_payload_length_check() {
        let space = AddressSpace::gen2_user(32);
        let address = MemoryAddress::new(0, 1);
        assert!(space.check_payload(&address, &[0x01, 0x02]).is_ok());
        assert!(matches!(
            space.check_payload(&address, &[0x01, 0x02, 0x03]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_chunks_cover_range_in_order() {
        let address = MemoryAddress::new(10, 70);
        let chunks: Vec<_> = address.chunks(32).collect();
        assert_eq!(
            chunks,
            vec![
                MemoryAddress::new(10, 32),
                MemoryAddress::new(42, 32),
                MemoryAddress::new(74, 6),
            ]
        );
    }

    #[test]
    fn test_single_chunk() {
        let address = MemoryAddress::new(0x0F, 1);
        let chunks: Vec<_> = address.chunks(32).collect();
        assert_eq!(chunks, vec![address]);
    }

    #[test]
    fn test_chunks_never_wrap() {
        let address = MemoryAddress::new(65500, 100);
        let chunks: Vec<_> = address.chunks(32).collect();
        assert_eq!(
            chunks,
            vec![MemoryAddress::new(65500, 32), MemoryAddress::new(65532, 4)]
        );
    }

    #[test]
    fn test_oversized_space_capped_at_address_range() {
        let space = AddressSpace::gen2_user(200_000);
        let error = space.validate(&MemoryAddress::new(65500, 100)).unwrap_err();
        assert!(matches!(
            error,
            Error::OutOfRange {
                start: 65500,
                blocks: 100,
                size: ADDRESSABLE_BLOCKS
            }
        ));
        assert!(space.validate(&MemoryAddress::new(65500, 36)).is_ok());
    }

    #[test]
    fn test_requires_tag() {
        assert!(AddressSpace::gen2_epc().requires_tag());
        assert!(AddressSpace::tag_config(16).requires_tag());
        assert!(!AddressSpace::system_parameters().requires_tag());
    }

    proptest! {
        #[test]
        fn prop_validate_matches_declared_size(
            start in any::<u16>(),
            blocks in 1u16..=u16::MAX,
            size in 1u32..=100_000,
        ) {
            let space = AddressSpace::gen2_user(size);
            let address = MemoryAddress::new(start, blocks);
            let fits = address.end() <= size.min(ADDRESSABLE_BLOCKS);
            match space.validate(&address) {
                Ok(()) => prop_assert!(fits),
                Err(Error::OutOfRange { .. }) => prop_assert!(!fits),
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }

        #[test]
        fn prop_chunks_tile_valid_ranges(start in 0u16..=60_000, blocks in 1u16..=5_000, max in 1u16..=64) {
            let address = MemoryAddress::new(start, blocks);
            let chunks: Vec<_> = address.chunks(max).collect();

            let mut next = u32::from(start);
            for chunk in &chunks {
                prop_assert_eq!(u32::from(chunk.start), next);
                prop_assert!(chunk.blocks >= 1 && chunk.blocks <= max);
                next = chunk.end();
            }
            prop_assert_eq!(next, address.end());
        }
    }
}
