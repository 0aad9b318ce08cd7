//! FLV file header and the linear tag reader.
//!
//! An FLV stream is a 9 byte header followed by alternating 4 byte
//! previous-tag-size fields and tags:
//!
//! ```text
//! header | pts0 | tag1 | pts1 | tag2 | ... | tagN | ptsN
//! ```
//!
//! Each tag is an 11 byte header followed by `data_size` payload bytes.

use crate::amf0::{self, Amf0Value};
use crate::av_headers::{AudioTagHeader, VideoTagHeader};
use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Result};
use serde::Serialize;
use std::fmt;

pub const FLV_HEADER_SIZE: usize = 9;
pub const PREV_TAG_SIZE_FIELD_SIZE: usize = 4;
pub const TAG_HEADER_SIZE: usize = 11;

const FLV_SIGNATURE: &[u8; 3] = b"FLV";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlvHeader {
    pub version: u8,
    pub has_audio: bool,
    pub has_video: bool,
    /// Length of the header; the first previous-tag-size field starts here.
    pub data_offset: u32,
}

impl FlvHeader {
    /// Parses the FLV header at the start of `buf`.
    ///
    /// Fails with [`DecodeError::InvalidSignature`] unless the buffer starts
    /// with `FLV`, and with [`DecodeError::MalformedLength`] when
    /// `data_offset` is shorter than the header or past the buffer.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let cur = ByteCursor::new(buf);
        if cur.read_bytes(0, 3)? != FLV_SIGNATURE {
            return Err(DecodeError::InvalidSignature);
        }

        let version = cur.read_u8(3)?;
        let flags = cur.read_u8(4)?;
        let data_offset = cur.read_u32(5)?;
        if (data_offset as usize) < FLV_HEADER_SIZE || data_offset as usize > buf.len() {
            return Err(DecodeError::MalformedLength);
        }

        Ok(FlvHeader {
            version,
            has_audio: flags & 0b0000_0100 != 0,
            has_video: flags & 0b0000_0001 != 0,
            data_offset,
        })
    }
}

impl fmt::Display for FlvHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FLV v{} audio={} video={} data_offset={}",
            self.version, self.has_audio, self.has_video, self.data_offset
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlvTagType {
    Audio = 8,
    Video = 9,
    ScriptData = 18,
}

impl TryFrom<u8> for FlvTagType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            8 => Ok(Self::Audio),
            9 => Ok(Self::Video),
            18 => Ok(Self::ScriptData),
            other => Err(other),
        }
    }
}

impl fmt::Display for FlvTagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlvTagType::Audio => "audio",
            FlvTagType::Video => "video",
            FlvTagType::ScriptData => "script",
        };
        f.write_str(name)
    }
}

/// One FLV tag, borrowing its payload from the input buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlvTag<'a> {
    /// The previous-tag-size field read just before this tag.
    pub previous_tag_size: u32,
    pub tag_type: FlvTagType,
    /// Filter bit: the payload is encrypted or otherwise preprocessed.
    pub filtered: bool,
    pub data_size: u32,
    /// Milliseconds, with the extension byte as the top 8 bits.
    pub timestamp: u32,
    pub stream_id: u32,
    /// Absolute offset of the tag header.
    pub offset: usize,
    #[serde(skip)]
    pub payload: &'a [u8],
}

impl<'a> FlvTag<'a> {
    /// Offset of the payload within the input buffer.
    pub fn payload_offset(&self) -> usize {
        self.offset + TAG_HEADER_SIZE
    }

    pub fn is_script_tag(&self) -> bool {
        self.tag_type == FlvTagType::ScriptData
    }

    /// Decode a script-data payload as AMF0 values. `None` for other tags.
    pub fn script_data(&self) -> Option<Result<Vec<Amf0Value>>> {
        self.is_script_tag()
            .then(|| amf0::decode_script_data(self.payload))
    }

    pub fn audio_header(&self) -> Option<Result<AudioTagHeader>> {
        (self.tag_type == FlvTagType::Audio).then(|| AudioTagHeader::parse(self.payload))
    }

    pub fn video_header(&self) -> Option<Result<VideoTagHeader>> {
        (self.tag_type == FlvTagType::Video).then(|| VideoTagHeader::parse(self.payload))
    }
}

/// What the reader found at its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlvItem<'a> {
    Tag(FlvTag<'a>),
    /// The buffer ended cleanly, either exactly where a previous-tag-size
    /// field would start or right after one.
    EndOfStream { previous_tag_size: Option<u32> },
}

/// Linear cursor over the tags of an FLV buffer.
///
/// A truncated or invalid tag ends the scan with
/// [`DecodeError::MalformedTag`], a cut-off previous-tag-size field with
/// [`DecodeError::OutOfBounds`]. Calling [`FlvTagReader::next_tag`] again
/// after an error reports end of stream.
#[derive(Debug, Clone)]
pub struct FlvTagReader<'a> {
    cur: ByteCursor<'a>,
    pos: usize,
    done: bool,
}

impl<'a> FlvTagReader<'a> {
    /// Start at the first previous-tag-size field after the file header.
    pub fn new(buf: &'a [u8], header: &FlvHeader) -> Self {
        Self::at(buf, header.data_offset as usize)
    }

    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        Self {
            cur: ByteCursor::new(buf),
            pos: offset,
            done: false,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn next_tag(&mut self) -> Result<FlvItem<'a>> {
        if self.done {
            return Ok(FlvItem::EndOfStream {
                previous_tag_size: None,
            });
        }
        let item = self.read_item();
        if !matches!(item, Ok(FlvItem::Tag(_))) {
            self.done = true;
        }
        item
    }

    fn read_item(&mut self) -> Result<FlvItem<'a>> {
        if self.cur.remaining(self.pos) == 0 {
            return Ok(FlvItem::EndOfStream {
                previous_tag_size: None,
            });
        }

        // 1-3 trailing bytes are a cut-off field, not a clean end
        let previous_tag_size = self.cur.read_u32(self.pos)?;
        let offset = self.pos + PREV_TAG_SIZE_FIELD_SIZE;

        let available = self.cur.remaining(offset);
        if available == 0 {
            self.pos = offset;
            return Ok(FlvItem::EndOfStream {
                previous_tag_size: Some(previous_tag_size),
            });
        }
        if available < TAG_HEADER_SIZE {
            return Err(DecodeError::MalformedTag {
                offset,
                reason: format!("{available} bytes cannot hold an {TAG_HEADER_SIZE} byte tag header"),
            });
        }

        let h = self.cur.read_bytes(offset, TAG_HEADER_SIZE)?;
        if h[0] & 0b1100_0000 != 0 {
            return Err(DecodeError::MalformedTag {
                offset,
                reason: format!("reserved bits set in 0x{:02x}", h[0]),
            });
        }
        let filtered = h[0] & 0b0010_0000 != 0;
        let tag_type = FlvTagType::try_from(h[0] & 0x1F).map_err(|t| DecodeError::MalformedTag {
            offset,
            reason: format!("tag type {t} is not audio, video or script data"),
        })?;
        let data_size = self.cur.read_u24(offset + 1)?;
        let timestamp = self.cur.read_u24(offset + 4)? | (u32::from(h[7]) << 24);
        let stream_id = self.cur.read_u24(offset + 8)?;
        if stream_id != 0 {
            return Err(DecodeError::MalformedTag {
                offset,
                reason: format!("stream id {stream_id} is not 0"),
            });
        }

        let payload_start = offset + TAG_HEADER_SIZE;
        let remaining = self.cur.remaining(payload_start);
        if remaining < data_size as usize {
            return Err(DecodeError::MalformedTag {
                offset,
                reason: format!("payload of {data_size} bytes truncated to {remaining}"),
            });
        }
        let payload = self.cur.read_bytes(payload_start, data_size as usize)?;
        self.pos = payload_start + data_size as usize;

        Ok(FlvItem::Tag(FlvTag {
            previous_tag_size,
            tag_type,
            filtered,
            data_size,
            timestamp,
            stream_id,
            offset,
            payload,
        }))
    }
}

impl<'a> Iterator for FlvTagReader<'a> {
    type Item = Result<FlvTag<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_tag() {
            Ok(FlvItem::Tag(tag)) => Some(Ok(tag)),
            Ok(FlvItem::EndOfStream { .. }) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
