//! Fluent construction of requests.

use bytes::Bytes;
use taglink_core::{Error, Result, TagType};

use crate::{CommandCode, Request};

/// Builder for [`Request`].
///
/// # Example
///
/// ```
/// use taglink_protocol::{CommandCode, RequestBuilder};
/// use taglink_core::TagType;
///
/// let request = RequestBuilder::new(CommandCode::ReadTag)
///     .tag(TagType::Gen2, vec![0xE2, 0x00, 0x34, 0x12])
///     .bank(1)
///     .address(2, 6)
///     .build()
///     .unwrap();
///
/// assert_eq!(request.blocks, 6);
/// assert!(request.tag_id.is_some());
/// ```
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn new(command: CommandCode) -> Self {
        Self {
            request: Request::new(command),
        }
    }

    /// Address a specific tag.
    pub fn tag(mut self, tag_type: TagType, tag_id: impl Into<Bytes>) -> Self {
        self.request.tag_type = tag_type;
        self.request.tag_id = Some(tag_id.into());
        self
    }

    /// Filter by tag type without naming a tag.
    pub fn tag_type(mut self, tag_type: TagType) -> Self {
        self.request.tag_type = tag_type;
        self
    }

    pub fn bank(mut self, bank: u8) -> Self {
        self.request.bank = bank;
        self
    }

    pub fn address(mut self, start: u16, blocks: u16) -> Self {
        self.request.address = start;
        self.request.blocks = blocks;
        self
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.request.data = Some(data.into());
        self
    }

    pub fn inventory(mut self, enabled: bool) -> Self {
        self.request.flags.inventory = enabled;
        self
    }

    pub fn loop_mode(mut self, enabled: bool) -> Self {
        self.request.flags.loop_mode = enabled;
        self
    }

    pub fn lock(mut self, enabled: bool) -> Self {
        self.request.flags.lock = enabled;
        self
    }

    /// Validate and return the request.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` when a tag command has no tag id or a
    /// write command has no data.
    pub fn build(self) -> Result<Request> {
        let request = self.request;
        if request.command.targets_tag() && request.tag_id.is_none() {
            return Err(Error::invalid_argument(format!(
                "{} requires a tag identifier",
                request.command
            )));
        }
        if request.command.carries_data() && request.data.is_none() {
            return Err(Error::invalid_argument(format!(
                "{} requires a data payload",
                request.command
            )));
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_select_inventory() {
        let request = RequestBuilder::new(CommandCode::SelectTag)
            .tag_type(TagType::Iso15693)
            .inventory(true)
            .loop_mode(true)
            .build()
            .unwrap();

        assert!(request.flags.inventory);
        assert!(request.flags.loop_mode);
        assert_eq!(request.tag_type, TagType::Iso15693);
        assert!(request.tag_id.is_none());
    }

    #[test]
    fn test_tag_command_requires_id() {
        let result = RequestBuilder::new(CommandCode::ReadTag).address(0, 1).build();
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_write_requires_data() {
        let result = RequestBuilder::new(CommandCode::WriteSystemParameter)
            .address(0x07, 1)
            .build();
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_system_read_needs_no_tag() {
        let request = RequestBuilder::new(CommandCode::ReadSystemParameter)
            .address(0x06, 1)
            .build()
            .unwrap();
        assert_eq!(request.address, 0x06);
        assert_eq!(request.blocks, 1);
    }
}
