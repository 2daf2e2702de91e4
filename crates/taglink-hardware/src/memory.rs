//! Addressed memory access.
//!
//! Tag data banks, tag configuration registers and reader system parameters
//! share one addressing model: an [`AddressSpace`] plus a
//! [`MemoryAddress`] range. Every operation validates the range against
//! the space before any transport I/O, then moves the data in chunks of at
//! most [`MAX_BLOCKS_PER_EXCHANGE`] blocks, in ascending address order.
//! Each chunk is one logical exchange with its own retry budget.
//!
//! Writes are never verified implicitly. Use
//! [`write_and_verify`](ReaderSession::write_and_verify) for an explicit
//! read-after-write check.

use bytes::BytesMut;
use taglink_core::{
    AddressSpace, DataBuffer, Error, MemoryAddress, Result, SpaceKind,
    constants::MAX_BLOCKS_PER_EXCHANGE,
};
use taglink_protocol::{CommandCode, RequestBuilder};
use tracing::debug;

use crate::session::ReaderSession;
use crate::tag::Tag;

/// What an operation addresses.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// The reader itself (system parameters).
    Reader,
    /// A selected or caller-known tag.
    Tag(&'a Tag),
}

impl Target<'_> {
    fn tag(&self) -> Option<&Tag> {
        match self {
            Target::Reader => None,
            Target::Tag(tag) => Some(tag),
        }
    }
}

fn read_command(kind: SpaceKind) -> CommandCode {
    match kind {
        SpaceKind::TagData => CommandCode::ReadTag,
        SpaceKind::TagConfig => CommandCode::ReadTagConfig,
        SpaceKind::SystemParameters => CommandCode::ReadSystemParameter,
    }
}

fn write_command(kind: SpaceKind) -> CommandCode {
    match kind {
        SpaceKind::TagData => CommandCode::WriteTag,
        SpaceKind::TagConfig => CommandCode::WriteTagConfig,
        SpaceKind::SystemParameters => CommandCode::WriteSystemParameter,
    }
}

fn check_target(target: &Target<'_>, space: &AddressSpace) -> Result<()> {
    match (space.requires_tag(), target.tag()) {
        (true, None) => Err(Error::invalid_argument(format!(
            "Access to {space} requires a tag"
        ))),
        (false, Some(_)) => Err(Error::invalid_argument(format!(
            "{space} belong to the reader, not to a tag"
        ))),
        _ => Ok(()),
    }
}

impl ReaderSession {
    /// Read `address` from `space`.
    ///
    /// # Errors
    /// - `OutOfRange` or `InvalidArgument` before any I/O
    /// - `Timeout`, `DeviceError`, `Fatal` from the exchange
    pub fn read(
        &self,
        target: Target<'_>,
        space: &AddressSpace,
        address: MemoryAddress,
    ) -> Result<DataBuffer> {
        self.read_with(read_command(space.kind), target, space, address)
    }

    /// Write `data` to `address` in `space`.
    ///
    /// `data` must cover the range exactly.
    ///
    /// # Errors
    /// - `OutOfRange` or `InvalidArgument` before any I/O
    /// - `Timeout`, `DeviceError`, `Fatal` from the exchange
    pub fn write(
        &self,
        target: Target<'_>,
        space: &AddressSpace,
        address: MemoryAddress,
        data: &[u8],
    ) -> Result<()> {
        self.write_with(write_command(space.kind), target, space, address, data, false)
    }

    /// Write, then read back and compare.
    ///
    /// With a `mask`, only the masked bits of every byte are compared, for
    /// registers where the reader or tag owns some of the bits.
    ///
    /// # Errors
    /// `VerificationFailed` when the read-back differs, plus the errors of
    /// [`write`](Self::write) and [`read`](Self::read).
    pub fn write_and_verify(
        &self,
        target: Target<'_>,
        space: &AddressSpace,
        address: MemoryAddress,
        data: &[u8],
        mask: Option<u8>,
    ) -> Result<()> {
        self.write(target, space, address, data)?;
        let actual = self.read(target, space, address)?;

        let expected = DataBuffer::from(data);
        let (expected, actual) = match mask {
            Some(mask) => (expected.masked(mask), actual.masked(mask)),
            None => (expected, actual),
        };

        if expected != actual {
            return Err(Error::VerificationFailed {
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }

    /// Write `data` and lock the written blocks.
    pub fn lock(
        &self,
        target: Target<'_>,
        space: &AddressSpace,
        address: MemoryAddress,
        data: &[u8],
    ) -> Result<()> {
        self.write_with(write_command(space.kind), target, space, address, data, true)
    }

    pub fn read_tag_data(
        &self,
        tag: &Tag,
        space: &AddressSpace,
        address: MemoryAddress,
    ) -> Result<DataBuffer> {
        self.read(Target::Tag(tag), space, address)
    }

    pub fn write_tag_data(
        &self,
        tag: &Tag,
        space: &AddressSpace,
        address: MemoryAddress,
        data: &[u8],
    ) -> Result<()> {
        self.write(Target::Tag(tag), space, address, data)
    }

    /// Read tag configuration registers.
    pub fn read_tag_config(
        &self,
        tag: &Tag,
        size_blocks: u32,
        address: MemoryAddress,
    ) -> Result<DataBuffer> {
        self.read(Target::Tag(tag), &AddressSpace::tag_config(size_blocks), address)
    }

    /// Write tag configuration registers.
    pub fn write_tag_config(
        &self,
        tag: &Tag,
        size_blocks: u32,
        address: MemoryAddress,
        data: &[u8],
    ) -> Result<()> {
        self.write(
            Target::Tag(tag),
            &AddressSpace::tag_config(size_blocks),
            address,
            data,
        )
    }

    pub(crate) fn read_with(
        &self,
        command: CommandCode,
        target: Target<'_>,
        space: &AddressSpace,
        address: MemoryAddress,
    ) -> Result<DataBuffer> {
        space.validate(&address)?;
        check_target(&target, space)?;

        let mut data = BytesMut::with_capacity(space.byte_len(&address));
        for chunk in address.chunks(MAX_BLOCKS_PER_EXCHANGE) {
            let mut builder = RequestBuilder::new(command)
                .bank(space.bank)
                .address(chunk.start, chunk.blocks);
            if let Some(tag) = target.tag() {
                builder = builder.tag(tag.tag_type, tag.id.clone());
            }

            let response = self.exchange(&builder.build()?)?;
            let expected = space.byte_len(&chunk);
            if response.data.len() != expected {
                return Err(Error::communication(format!(
                    "{command} at {chunk} returned {} bytes, expected {expected}",
                    response.data.len()
                )));
            }
            data.extend_from_slice(&response.data);
        }

        debug!(
            device = self.device().id(),
            command = %command,
            space = %space,
            address = %address,
            bytes = data.len(),
            "Read complete"
        );
        Ok(DataBuffer::new(data.freeze()))
    }

    pub(crate) fn write_with(
        &self,
        command: CommandCode,
        target: Target<'_>,
        space: &AddressSpace,
        address: MemoryAddress,
        data: &[u8],
        lock: bool,
    ) -> Result<()> {
        space.validate(&address)?;
        space.check_payload(&address, data)?;
        check_target(&target, space)?;

        let mut offset = 0;
        for chunk in address.chunks(MAX_BLOCKS_PER_EXCHANGE) {
            let len = space.byte_len(&chunk);
            let mut builder = RequestBuilder::new(command)
                .bank(space.bank)
                .address(chunk.start, chunk.blocks)
                .data(data[offset..offset + len].to_vec())
                .lock(lock);
            if let Some(tag) = target.tag() {
                builder = builder.tag(tag.tag_type, tag.id.clone());
            }

            self.exchange(&builder.build()?)?;
            offset += len;
        }

        debug!(
            device = self.device().id(),
            command = %command,
            space = %space,
            address = %address,
            bytes = data.len(),
            lock,
            "Write complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportDevice;
    use crate::mock::{SimulatedReader, SimulatorHandle};
    use taglink_core::TagType;

    fn session() -> (ReaderSession, SimulatorHandle) {
        let (reader, handle) = SimulatedReader::new();
        let session = ReaderSession::open(TransportDevice::new(Box::new(reader))).unwrap();
        (session, handle)
    }

    fn gen2_tag(handle: &SimulatorHandle) -> Tag {
        let id = vec![0xE2, 0x00, 0x10, 0x20];
        handle.add_tag(TagType::Gen2, &id);
        Tag::new(TagType::Gen2, id)
    }

    #[test]
    fn test_tag_space_requires_tag() {
        let (session, handle) = session();
        let before = handle.request_count();

        let error = session
            .read(Target::Reader, &AddressSpace::gen2_epc(), MemoryAddress::new(0, 1))
            .unwrap_err();
        assert!(matches!(error, Error::InvalidArgument(_)));
        assert_eq!(handle.request_count(), before);
    }

    #[test]
    fn test_system_space_rejects_tag() {
        let (session, handle) = session();
        let tag = gen2_tag(&handle);
        let error = session
            .read(
                Target::Tag(&tag),
                &AddressSpace::system_parameters(),
                MemoryAddress::new(0, 1),
            )
            .unwrap_err();
        assert!(matches!(error, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_large_read_is_chunked_in_order() {
        let (session, handle) = session();
        let tag = gen2_tag(&handle);
        let space = AddressSpace::gen2_user(80);
        let pattern: Vec<u8> = (0..160).map(|i| i as u8).collect();
        handle.set_tag_memory(&tag.id, space.bank, 0, &pattern);

        let before = handle.count_of(CommandCode::ReadTag);
        let data = session
            .read(Target::Tag(&tag), &space, MemoryAddress::new(0, 80))
            .unwrap();
        assert_eq!(data.as_slice(), &pattern[..]);
        // 80 blocks in chunks of 32: 32 + 32 + 16.
        assert_eq!(handle.count_of(CommandCode::ReadTag) - before, 3);
    }

    #[test]
    fn test_write_and_verify_with_mask() {
        let (session, handle) = session();
        let tag = gen2_tag(&handle);
        let space = AddressSpace::tag_config(16);
        // The simulated tag forces the low two bits of register 7.
        handle.set_config_force_bits(&tag.id, 7, 0x03);

        session
            .write_and_verify(
                Target::Tag(&tag),
                &space,
                MemoryAddress::new(7, 1),
                &[0x3C],
                Some(0x3C),
            )
            .unwrap();

        let error = session
            .write_and_verify(
                Target::Tag(&tag),
                &space,
                MemoryAddress::new(7, 1),
                &[0x3C],
                None,
            )
            .unwrap_err();
        assert!(matches!(error, Error::VerificationFailed { .. }));
    }

    #[test]
    fn test_lock_sets_flag() {
        let (session, handle) = session();
        let tag = gen2_tag(&handle);
        session
            .lock(
                Target::Tag(&tag),
                &AddressSpace::gen2_user(8),
                MemoryAddress::new(0, 1),
                &[0xAA, 0xBB],
            )
            .unwrap();

        let error = session
            .write_tag_data(
                &tag,
                &AddressSpace::gen2_user(8),
                MemoryAddress::new(0, 1),
                &[0x00, 0x00],
            )
            .unwrap_err();
        assert_eq!(error.device_code(), Some(0x87));
    }
}
