//! Bit-field extraction for the first bytes of FLV audio and video payloads.
//!
//! Only the legacy (non-enhanced) layouts are decoded. The codec data that
//! follows the header is exposed as an offset into the tag payload.

use crate::cursor::ByteCursor;
use crate::error::Result;
use serde::Serialize;

pub const SOUND_FORMAT_AAC: u8 = 10;
pub const CODEC_ID_AVC: u8 = 7;
pub const CODEC_ID_HEVC: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioTagHeader {
    pub sound_format: u8,
    /// 0 = 5.5 kHz, 1 = 11 kHz, 2 = 22 kHz, 3 = 44 kHz
    pub sound_rate: u8,
    /// 0 = 8-bit, 1 = 16-bit
    pub sound_size: u8,
    /// 0 = mono, 1 = stereo
    pub sound_type: u8,
    /// Present for AAC only: 0 = sequence header, 1 = raw.
    pub aac_packet_type: Option<u8>,
    /// Offset of the codec data within the tag payload.
    pub data_offset: usize,
}

impl AudioTagHeader {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let cur = ByteCursor::new(payload);
        let b0 = cur.read_u8(0)?;
        let sound_format = b0 >> 4;

        let (aac_packet_type, data_offset) = if sound_format == SOUND_FORMAT_AAC {
            (Some(cur.read_u8(1)?), 2)
        } else {
            (None, 1)
        };

        Ok(AudioTagHeader {
            sound_format,
            sound_rate: (b0 >> 2) & 0x3,
            sound_size: (b0 >> 1) & 0x1,
            sound_type: b0 & 0x1,
            aac_packet_type,
            data_offset,
        })
    }

    pub fn sample_rate_hz(&self) -> u32 {
        match self.sound_rate {
            0 => 5_500,
            1 => 11_025,
            2 => 22_050,
            _ => 44_100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoTagHeader {
    /// 1 = keyframe, 2 = inter frame, 3 = disposable, 4 = generated, 5 = command
    pub frame_type: u8,
    pub codec_id: u8,
    /// Present for AVC/HEVC only: 0 = sequence header, 1 = NALU, 2 = end of sequence.
    pub packet_type: Option<u8>,
    /// Present for AVC/HEVC only, in milliseconds.
    pub composition_time: Option<i32>,
    /// Offset of the codec data within the tag payload.
    pub data_offset: usize,
}

impl VideoTagHeader {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let cur = ByteCursor::new(payload);
        let b0 = cur.read_u8(0)?;
        let codec_id = b0 & 0x0F;

        let (packet_type, composition_time, data_offset) =
            if codec_id == CODEC_ID_AVC || codec_id == CODEC_ID_HEVC {
                (Some(cur.read_u8(1)?), Some(cur.read_i24(2)?), 5)
            } else {
                (None, None, 1)
            };

        Ok(VideoTagHeader {
            frame_type: b0 >> 4,
            codec_id,
            packet_type,
            composition_time,
            data_offset,
        })
    }

    pub fn is_keyframe(&self) -> bool {
        self.frame_type == 1
    }
}
