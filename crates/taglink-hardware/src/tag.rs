//! Tags and tag selection.

use std::ops::ControlFlow;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taglink_core::{
    DataBuffer, Error, Result, TagType,
    buffer::to_hex,
    constants::{MAX_LOOP_OFF_REISSUES, POLL_SLICE_MS},
};
use taglink_protocol::{CommandCode, RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::device::DeviceLink;
use crate::scan::CancellationToken;
use crate::session::ReaderSession;
use crate::transport::millis;

/// A transponder seen by a reader.
///
/// A tag identifier is only meaningful to the session that reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag_type: TagType,
    #[serde(with = "id_hex")]
    pub id: Bytes,
    /// Upper-case hex rendering of `id`.
    pub friendly: String,
    pub observed_at: DateTime<Utc>,
}

impl Tag {
    /// A tag whose type and identifier are already known, for addressing
    /// it without a select round trip.
    pub fn new(tag_type: TagType, id: impl Into<Bytes>) -> Self {
        let id = id.into();
        Self {
            tag_type,
            friendly: to_hex(&id),
            id,
            observed_at: Utc::now(),
        }
    }

    pub(crate) fn from_response(response: &Response, requested: TagType) -> Self {
        // Readers answer auto-detect requests with the concrete type.
        let tag_type = if response.tag_type == TagType::AutoDetect {
            requested
        } else {
            response.tag_type
        };
        Self::new(tag_type, response.tag_id.clone())
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.tag_type.name(), self.friendly)
    }
}

mod id_hex {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};
    use taglink_core::DataBuffer;

    pub fn serialize<S: Serializer>(id: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&taglink_core::buffer::to_hex(id))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let hex = String::deserialize(deserializer)?;
        DataBuffer::from_hex(&hex)
            .map(DataBuffer::into_bytes)
            .map_err(serde::de::Error::custom)
    }
}

const NO_TAG: u8 = 0x84;

impl ReaderSession {
    /// Select the first tag of `tag_type` in the field.
    ///
    /// `TagType::AutoDetect` (or a family code) lets the reader pick the
    /// protocol; the returned tag carries the concrete type. An empty field
    /// is `Ok(None)`.
    pub fn select_tag(&self, tag_type: TagType) -> Result<Option<Tag>> {
        let request = RequestBuilder::new(CommandCode::SelectTag)
            .tag_type(tag_type)
            .build()?;

        match self.exchange(&request) {
            Ok(response) if response.tag_id.is_empty() => Ok(None),
            Ok(response) => {
                let tag = Tag::from_response(&response, tag_type);
                debug!(device = self.device().id(), tag = %tag, "Tag selected");
                Ok(Some(tag))
            }
            Err(e) if e.device_code() == Some(NO_TAG) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Run one inventory round and return every tag of `tag_type` found.
    pub fn get_tags(&self, tag_type: TagType) -> Result<Vec<Tag>> {
        let mut tags = Vec::new();
        self.inventory_round(tag_type, false, None, |tag| {
            tags.push(tag);
            ControlFlow::Continue(())
        })?;
        Ok(tags)
    }

    /// Present an access password to `tag`.
    pub fn send_tag_password(&self, tag: &Tag, password: &[u8]) -> Result<()> {
        if password.is_empty() {
            return Err(Error::invalid_argument("Password must not be empty"));
        }
        let request = RequestBuilder::new(CommandCode::SendTagPassword)
            .tag(tag.tag_type, tag.id.clone())
            .data(DataBuffer::from(password).into_bytes())
            .build()?;
        self.exchange(&request).map(|_| ())
    }

    /// One inventory round, handing each tag to `on_tag` as it arrives.
    ///
    /// A plain round ends on `InventoryComplete`. With `loop_mode` the reader
    /// streams tags until it falls quiet for one exchange timeout, which
    /// also ends the round. `on_tag` may stop the round early with
    /// `ControlFlow::Break`. When `cancel` is given it is checked before
    /// every wait on the transport; tags already received are still handed
    /// out first.
    ///
    /// A `LoopOff` answer reissues the request without consuming an attempt,
    /// like [`ReaderSession::exchange`] does.
    ///
    /// Returns `true` when the round ran to its end, `false` when it was
    /// cancelled or stopped.
    pub(crate) fn inventory_round(
        &self,
        tag_type: TagType,
        loop_mode: bool,
        cancel: Option<&CancellationToken>,
        mut on_tag: impl FnMut(Tag) -> ControlFlow<()>,
    ) -> Result<bool> {
        let request = RequestBuilder::new(CommandCode::SelectTag)
            .tag_type(tag_type)
            .inventory(true)
            .loop_mode(loop_mode)
            .build()?;

        let attempts = u32::from(self.retry_count()) + 1;
        let mut attempt = 0;
        let mut reissues = 0;

        loop {
            attempt += 1;
            let ending = {
                let mut link = self.device().lock()?;
                match link.send(&request) {
                    Ok(()) => self.stream_round(&mut link, tag_type, loop_mode, cancel, &mut on_tag),
                    Err(e) => RoundEnding::Failed(e),
                }
            };

            let error = match ending {
                RoundEnding::Complete => return Ok(true),
                RoundEnding::Stopped => return Ok(false),
                RoundEnding::LoopOff if reissues < MAX_LOOP_OFF_REISSUES => {
                    reissues += 1;
                    attempt -= 1;
                    debug!(
                        device = self.device().id(),
                        reissues,
                        "Select loop switched off, reissuing inventory"
                    );
                    continue;
                }
                RoundEnding::LoopOff => StatusCode::LoopOff.to_error(),
                RoundEnding::Failed(e) if e.device_code() == Some(NO_TAG) => return Ok(true),
                RoundEnding::Failed(e) => e,
            };

            if !error.is_retryable() || attempt >= attempts {
                return Err(error);
            }
            debug!(attempt, attempts, error = %error, "Inventory round failed, retrying");
        }
    }

    fn stream_round(
        &self,
        link: &mut DeviceLink<'_>,
        tag_type: TagType,
        loop_mode: bool,
        cancel: Option<&CancellationToken>,
        on_tag: &mut dyn FnMut(Tag) -> ControlFlow<()>,
    ) -> RoundEnding {
        let timeout = self.device().exchange_timeout();
        let slice = Duration::from_millis(POLL_SLICE_MS).min(timeout);
        let mut quiet = Duration::ZERO;

        loop {
            let polled = match link.buffered() {
                Ok(Some(response)) => Ok(Some(response)),
                Ok(None) if cancel.is_some_and(CancellationToken::is_cancelled) => {
                    return RoundEnding::Stopped;
                }
                Ok(None) => link.poll(slice),
                Err(e) => Err(e),
            };

            let response = match polled {
                Ok(Some(response)) => response,
                Ok(None) => {
                    quiet += slice;
                    if quiet < timeout {
                        continue;
                    }
                    if loop_mode {
                        return RoundEnding::Complete;
                    }
                    return RoundEnding::Failed(Error::timeout(millis(timeout)));
                }
                Err(e) => return RoundEnding::Failed(e),
            };

            if response.command != CommandCode::SelectTag {
                return RoundEnding::Failed(Error::communication(format!(
                    "Unexpected {} during inventory",
                    response.command
                )));
            }

            match response.status {
                StatusCode::TagFound => {
                    quiet = Duration::ZERO;
                    if on_tag(Tag::from_response(&response, tag_type)).is_break() {
                        return RoundEnding::Stopped;
                    }
                }
                StatusCode::InventoryComplete => return RoundEnding::Complete,
                StatusCode::LoopOff => return RoundEnding::LoopOff,
                status if status.is_nack() => return RoundEnding::Failed(status.to_error()),
                status => {
                    return RoundEnding::Failed(Error::communication(format!(
                        "Unexpected status {status} during inventory"
                    )));
                }
            }
        }
    }
}

enum RoundEnding {
    Complete,
    Stopped,
    LoopOff,
    Failed(Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportDevice;
    use crate::mock::SimulatedReader;

    #[test]
    fn test_tag_new_friendly_hex() {
        let tag = Tag::new(TagType::Iso15693, vec![0xE0, 0x04, 0x01, 0xAB]);
        assert_eq!(tag.friendly, "E00401AB");
        assert_eq!(tag.to_string(), "ISO 15693 E00401AB");
    }

    #[test]
    fn test_tag_serde_uses_hex() {
        let tag = Tag::new(TagType::Gen2, vec![0xE2, 0x00]);
        let json = serde_json::to_value(&tag).unwrap();
        assert_eq!(json["id"], "E200");
        let back: Tag = serde_json::from_value(json).unwrap();
        assert_eq!(back, tag);
    }

    #[test]
    fn test_select_empty_field() {
        let (reader, _handle) = SimulatedReader::new();
        let session = ReaderSession::open(TransportDevice::new(Box::new(reader))).unwrap();
        assert!(session.select_tag(TagType::AutoDetect).unwrap().is_none());
    }

    #[test]
    fn test_select_auto_detect_resolves_type() {
        let (reader, handle) = SimulatedReader::new();
        handle.add_tag(TagType::Iso14443A, &[0x04, 0xA1, 0xB2, 0xC3]);
        let session = ReaderSession::open(TransportDevice::new(Box::new(reader))).unwrap();

        let tag = session.select_tag(TagType::AutoDetect).unwrap().unwrap();
        assert_eq!(tag.tag_type, TagType::Iso14443A);
        assert_eq!(tag.friendly, "04A1B2C3");
    }

    #[test]
    fn test_get_tags_filters_by_type() {
        let (reader, handle) = SimulatedReader::new();
        handle.add_tag(TagType::Gen2, &[0xE2, 0x01]);
        handle.add_tag(TagType::Iso15693, &[0xE0, 0x02]);
        handle.add_tag(TagType::Gen2, &[0xE2, 0x03]);
        let session = ReaderSession::open(TransportDevice::new(Box::new(reader))).unwrap();

        let all = session.get_tags(TagType::AutoDetect).unwrap();
        assert_eq!(all.len(), 3);

        let gen2 = session.get_tags(TagType::Gen2).unwrap();
        assert_eq!(gen2.len(), 2);
        assert!(gen2.iter().all(|t| t.tag_type == TagType::Gen2));
    }

    #[test]
    fn test_send_tag_password() {
        let (reader, handle) = SimulatedReader::new();
        handle.add_tag(TagType::Gen2, &[0xE2, 0x01]);
        let session = ReaderSession::open(TransportDevice::new(Box::new(reader))).unwrap();
        let tag = Tag::new(TagType::Gen2, vec![0xE2, 0x01]);

        session.send_tag_password(&tag, &[0, 0, 0, 0]).unwrap();
        assert_eq!(handle.count_of(CommandCode::SendTagPassword), 1);
        assert!(session.send_tag_password(&tag, &[]).is_err());
    }

    #[test]
    fn test_inventory_reissued_after_loop_off() {
        let (reader, handle) = SimulatedReader::new();
        handle.add_tag(TagType::Gen2, &[0xE2, 0x01]);
        let session = ReaderSession::open(TransportDevice::new(Box::new(reader))).unwrap();
        let before = handle.count_of(CommandCode::SelectTag);

        handle.loop_off_next(2);
        let tags = session.get_tags(TagType::AutoDetect).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(handle.count_of(CommandCode::SelectTag) - before, 3);
    }

    #[test]
    fn test_loop_mode_round_ends_when_reader_falls_quiet() {
        let (reader, handle) = SimulatedReader::new();
        let device = TransportDevice::new(Box::new(reader));
        device.set_base_timeout(Duration::from_millis(40));
        let session = ReaderSession::open(device).unwrap();

        let completed = session
            .inventory_round(TagType::AutoDetect, true, None, |_| ControlFlow::Continue(()))
            .unwrap();
        assert!(completed);
        assert!(handle.requests().last().unwrap().flags.loop_mode);
    }

    #[test]
    fn test_tags_are_handed_out_while_streaming() {
        let (reader, handle) = SimulatedReader::new();
        handle.add_tag(TagType::Gen2, &[0xE2, 0x01]);
        handle.set_endless_inventory(true);
        let session = ReaderSession::open(TransportDevice::new(Box::new(reader))).unwrap();

        let mut seen = 0;
        let completed = session
            .inventory_round(TagType::AutoDetect, false, None, |_| {
                seen += 1;
                if seen == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert!(!completed);
        assert_eq!(seen, 3);
    }
}
