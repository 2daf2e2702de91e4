//! Requests, responses and their payload layout.
//!
//! Request payload:
//!
//! ```text
//! command:u16 flags:u8 tag_type:u16 [id_len:u8 id] bank:u8 address:u16 blocks:u16 [data_len:u16 data]
//! ```
//!
//! The bracketed parts are present only when the matching request flag is set.
//!
//! Response payload:
//!
//! ```text
//! command:u16 status:u8 tag_type:u16 id_len:u8 id data_len:u16 data
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use taglink_core::{Error, Result, TagType};

use crate::{CommandCode, RequestFlags, StatusCode};

/// Payload encoding shared by requests and responses.
pub trait WireMessage: Sized {
    fn encode_payload(&self, dst: &mut BytesMut) -> Result<()>;

    fn decode_payload(payload: &[u8]) -> Result<Self>;
}

/// Request sent from the host to the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: CommandCode,
    pub flags: RequestFlags,
    pub tag_type: TagType,
    pub tag_id: Option<Bytes>,
    pub bank: u8,
    pub address: u16,
    pub blocks: u16,
    pub data: Option<Bytes>,
}

impl Request {
    /// Request with no tag, address or data.
    pub fn new(command: CommandCode) -> Self {
        Self {
            command,
            flags: RequestFlags::default(),
            tag_type: TagType::AutoDetect,
            tag_id: None,
            bank: 0,
            address: 0,
            blocks: 0,
            data: None,
        }
    }

    /// Flags as they appear on the wire, presence bits included.
    pub fn wire_flags(&self) -> RequestFlags {
        RequestFlags {
            tag_id_present: self.tag_id.is_some(),
            data_present: self.data.is_some(),
            ..self.flags
        }
    }
}

impl WireMessage for Request {
    fn encode_payload(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u16(self.command.as_u16());
        dst.put_u8(self.wire_flags().bits());
        dst.put_u16(self.tag_type.code());
        if let Some(id) = &self.tag_id {
            put_short_bytes(dst, id)?;
        }
        dst.put_u8(self.bank);
        dst.put_u16(self.address);
        dst.put_u16(self.blocks);
        if let Some(data) = &self.data {
            put_long_bytes(dst, data)?;
        }
        Ok(())
    }

    fn decode_payload(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        let command = CommandCode::from_u16(get_u16(&mut buf)?)?;
        let flags = RequestFlags::from_bits(get_u8(&mut buf)?);
        let tag_type = TagType::from_code(get_u16(&mut buf)?)?;
        let tag_id = if flags.tag_id_present {
            Some(get_short_bytes(&mut buf)?)
        } else {
            None
        };
        let bank = get_u8(&mut buf)?;
        let address = get_u16(&mut buf)?;
        let blocks = get_u16(&mut buf)?;
        let data = if flags.data_present {
            Some(get_long_bytes(&mut buf)?)
        } else {
            None
        };
        ensure_consumed(buf)?;

        Ok(Self {
            command,
            flags: RequestFlags {
                tag_id_present: false,
                data_present: false,
                ..flags
            },
            tag_type,
            tag_id,
            bank,
            address,
            blocks,
            data,
        })
    }
}

/// Response sent from the reader to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub command: CommandCode,
    pub status: StatusCode,
    pub tag_type: TagType,
    pub tag_id: Bytes,
    pub data: Bytes,
}

impl Response {
    pub fn new(command: CommandCode, status: StatusCode) -> Self {
        Self {
            command,
            status,
            tag_type: TagType::AutoDetect,
            tag_id: Bytes::new(),
            data: Bytes::new(),
        }
    }

    pub fn with_tag(mut self, tag_type: TagType, tag_id: impl Into<Bytes>) -> Self {
        self.tag_type = tag_type;
        self.tag_id = tag_id.into();
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub fn is_nack(&self) -> bool {
        self.status.is_nack()
    }

    /// Turn a negative acknowledgment into `Error::DeviceError`.
    ///
    /// # Errors
    /// Returns the device error carried by a NACK status.
    pub fn into_result(self) -> Result<Self> {
        if self.is_nack() {
            Err(self.status.to_error())
        } else {
            Ok(self)
        }
    }
}

impl WireMessage for Response {
    fn encode_payload(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u16(self.command.as_u16());
        dst.put_u8(self.status.as_u8());
        dst.put_u16(self.tag_type.code());
        put_short_bytes(dst, &self.tag_id)?;
        put_long_bytes(dst, &self.data)?;
        Ok(())
    }

    fn decode_payload(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        let command = CommandCode::from_u16(get_u16(&mut buf)?)?;
        let status = StatusCode::from_u8(get_u8(&mut buf)?);
        let tag_type = TagType::from_code(get_u16(&mut buf)?)?;
        let tag_id = get_short_bytes(&mut buf)?;
        let data = get_long_bytes(&mut buf)?;
        ensure_consumed(buf)?;

        Ok(Self {
            command,
            status,
            tag_type,
            tag_id,
            data,
        })
    }
}

/// Identity block returned by `GetReaderInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderInfo {
    pub protocol_version: u8,
    pub manufacturer: String,
    pub model: String,
    pub firmware: String,
    pub serial_number: String,
}

impl ReaderInfo {
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        dst.put_u8(self.protocol_version);
        for field in [
            &self.manufacturer,
            &self.model,
            &self.firmware,
            &self.serial_number,
        ] {
            put_short_bytes(&mut dst, field.as_bytes())?;
        }
        Ok(dst.freeze())
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        let protocol_version = get_u8(&mut buf)?;
        let manufacturer = get_string(&mut buf)?;
        let model = get_string(&mut buf)?;
        let firmware = get_string(&mut buf)?;
        let serial_number = get_string(&mut buf)?;
        ensure_consumed(buf)?;

        Ok(Self {
            protocol_version,
            manufacturer,
            model,
            firmware,
            serial_number,
        })
    }
}

fn truncated() -> Error {
    Error::communication("Truncated payload")
}

fn get_u8(buf: &mut &[u8]) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(truncated());
    }
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut &[u8]) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(truncated());
    }
    Ok(buf.get_u16())
}

fn get_bytes(buf: &mut &[u8], len: usize) -> Result<Bytes> {
    if buf.remaining() < len {
        return Err(truncated());
    }
    Ok(buf.copy_to_bytes(len))
}

fn get_short_bytes(buf: &mut &[u8]) -> Result<Bytes> {
    let len = usize::from(get_u8(buf)?);
    get_bytes(buf, len)
}

fn get_long_bytes(buf: &mut &[u8]) -> Result<Bytes> {
    let len = usize::from(get_u16(buf)?);
    get_bytes(buf, len)
}

fn get_string(buf: &mut &[u8]) -> Result<String> {
    let raw = get_short_bytes(buf)?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| Error::communication("Invalid UTF-8 in reader info"))
}

fn put_short_bytes(dst: &mut BytesMut, data: &[u8]) -> Result<()> {
    let len = u8::try_from(data.len())
        .map_err(|_| Error::invalid_argument(format!("Field of {} bytes exceeds 255", data.len())))?;
    dst.put_u8(len);
    dst.put_slice(data);
    Ok(())
}

fn put_long_bytes(dst: &mut BytesMut, data: &[u8]) -> Result<()> {
    let len = u16::try_from(data.len()).map_err(|_| Error::FrameTooLarge {
        size: data.len(),
        max_size: usize::from(u16::MAX),
    })?;
    dst.put_u16(len);
    dst.put_slice(data);
    Ok(())
}

fn ensure_consumed(buf: &[u8]) -> Result<()> {
    if buf.is_empty() {
        Ok(())
    } else {
        Err(Error::communication(format!(
            "{} trailing bytes in payload",
            buf.len()
        )))
    }
}
