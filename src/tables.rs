//! Typed decoders for the sample table boxes the keyframe index is built from.
//!
//! Every decoder receives the payload of its box (everything after the box
//! header) and never reads past it, even when the enclosing box would allow
//! it. The shared layout is: byte 0 version, bytes 1-3 flags, bytes 4-7 the
//! entry count, then fixed-width records.

use crate::boxes::FourCC;
use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FullBoxHeader {
    pub version: u8,
    pub flags: u32,
}

pub(crate) fn read_full_box(cur: &ByteCursor<'_>) -> Result<FullBoxHeader> {
    Ok(FullBoxHeader {
        version: cur.read_u8(0)?,
        flags: cur.read_u24(1)?,
    })
}

/// Validate that `entry_count` records of `width` bytes fit after `start`.
pub(crate) fn check_entries(
    cur: &ByteCursor<'_>,
    box_type: &[u8; 4],
    entry_count: u32,
    start: usize,
    width: usize,
) -> Result<()> {
    let available = cur.remaining(start);
    let fits = (entry_count as usize)
        .checked_mul(width)
        .is_some_and(|needed| needed <= available);
    if fits {
        Ok(())
    } else {
        Err(DecodeError::TruncatedTable {
            box_type: FourCC(*box_type),
            entry_count,
            available,
        })
    }
}

/// Read the entry count at offset 4 and validate the records that follow it.
fn counted_entries(cur: &ByteCursor<'_>, box_type: &[u8; 4], width: usize) -> Result<u32> {
    let entry_count = cur.read_u32(4)?;
    check_entries(cur, box_type, entry_count, 8, width)?;
    Ok(entry_count)
}

fn lang_from_u16(code: u16) -> String {
    if code == 0 {
        return "und".to_string();
    }
    let c1 = ((code >> 10) & 0x1F) as u8 + 0x60;
    let c2 = ((code >> 5) & 0x1F) as u8 + 0x60;
    let c3 = (code & 0x1F) as u8 + 0x60;
    format!("{}{}{}", c1 as char, c2 as char, c3 as char)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaTimescale {
    pub ticks_per_second: u32,
}

/// Media Header Box (mdhd)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaHeader {
    pub version: u8,
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: MediaTimescale,
    pub duration: u64,
    pub language: String,
}

pub fn decode_mdhd(payload: &[u8]) -> Result<MediaHeader> {
    let cur = ByteCursor::new(payload);
    let FullBoxHeader { version, flags } = read_full_box(&cur)?;

    // version 1 widens the times and the duration to 64 bits
    let (creation_time, modification_time, ticks_per_second, duration, lang_at) = if version == 1 {
        (
            cur.read_u64(4)?,
            cur.read_u64(12)?,
            cur.read_u32(20)?,
            cur.read_u64(24)?,
            32,
        )
    } else {
        (
            cur.read_u32(4)? as u64,
            cur.read_u32(8)? as u64,
            cur.read_u32(12)?,
            cur.read_u32(16)? as u64,
            20,
        )
    };

    // Some writers truncate the language/quality trailer.
    let language = match cur.read_u16(lang_at) {
        Ok(code) => lang_from_u16(code & 0x7FFF),
        Err(_) => "und".to_string(),
    };

    Ok(MediaHeader {
        version,
        flags,
        creation_time,
        modification_time,
        timescale: MediaTimescale { ticks_per_second },
        duration,
        language,
    })
}

/// Sync Sample Box (stss): 1-based sample numbers of keyframes, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSampleTable {
    pub version: u8,
    pub flags: u32,
    pub sample_numbers: Vec<u32>,
}

pub fn decode_stss(payload: &[u8]) -> Result<SyncSampleTable> {
    let cur = ByteCursor::new(payload);
    let FullBoxHeader { version, flags } = read_full_box(&cur)?;
    let count = counted_entries(&cur, b"stss", 4)?;

    let sample_numbers = (0..count as usize)
        .map(|i| cur.read_u32(8 + i * 4))
        .collect::<Result<Vec<_>>>()?;

    Ok(SyncSampleTable {
        version,
        flags,
        sample_numbers,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SttsRun {
    pub sample_count: u32,
    pub sample_duration: u32,
}

/// Decoding Time-to-Sample Box (stts): run-length encoded sample durations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeToSampleTable {
    pub version: u8,
    pub flags: u32,
    pub runs: Vec<SttsRun>,
}

impl TimeToSampleTable {
    pub fn sample_count(&self) -> u64 {
        self.runs.iter().map(|r| r.sample_count as u64).sum()
    }
}

pub fn decode_stts(payload: &[u8]) -> Result<TimeToSampleTable> {
    let cur = ByteCursor::new(payload);
    let FullBoxHeader { version, flags } = read_full_box(&cur)?;
    let count = counted_entries(&cur, b"stts", 8)?;

    let mut runs = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let at = 8 + i * 8;
        runs.push(SttsRun {
            sample_count: cur.read_u32(at)?,
            sample_duration: cur.read_u32(at + 4)?,
        });
    }

    Ok(TimeToSampleTable {
        version,
        flags,
        runs,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StscRun {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

/// Sample-to-Chunk Box (stsc). Run *i* spans the chunks up to the next run's
/// `first_chunk`; the last run spans to the last chunk of the offset table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleToChunkTable {
    pub version: u8,
    pub flags: u32,
    pub runs: Vec<StscRun>,
}

pub fn decode_stsc(payload: &[u8]) -> Result<SampleToChunkTable> {
    let cur = ByteCursor::new(payload);
    let FullBoxHeader { version, flags } = read_full_box(&cur)?;
    let count = counted_entries(&cur, b"stsc", 12)?;

    let mut runs = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let at = 8 + i * 12;
        runs.push(StscRun {
            first_chunk: cur.read_u32(at)?,
            samples_per_chunk: cur.read_u32(at + 4)?,
            sample_description_index: cur.read_u32(at + 8)?,
        });
    }

    Ok(SampleToChunkTable {
        version,
        flags,
        runs,
    })
}

/// Chunk Offset Box (stco) or 64-bit Chunk Offset Box (co64).
/// Chunk *n* (1-based) lives at `offsets[n - 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkOffsetTable {
    pub version: u8,
    pub flags: u32,
    /// Decoded from `co64` (8-byte offsets) rather than `stco`.
    pub wide: bool,
    pub offsets: Vec<u64>,
}

impl ChunkOffsetTable {
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

pub fn decode_stco(payload: &[u8]) -> Result<ChunkOffsetTable> {
    decode_chunk_offsets(payload, false)
}

pub fn decode_co64(payload: &[u8]) -> Result<ChunkOffsetTable> {
    decode_chunk_offsets(payload, true)
}

fn decode_chunk_offsets(payload: &[u8], wide: bool) -> Result<ChunkOffsetTable> {
    let cur = ByteCursor::new(payload);
    let FullBoxHeader { version, flags } = read_full_box(&cur)?;
    let (typ, width) = if wide { (b"co64", 8) } else { (b"stco", 4) };
    let count = counted_entries(&cur, typ, width)?;

    let offsets = (0..count as usize)
        .map(|i| {
            let at = 8 + i * width;
            if wide {
                cur.read_u64(at)
            } else {
                cur.read_u32(at).map(u64::from)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ChunkOffsetTable {
        version,
        flags,
        wide,
        offsets,
    })
}

/// Sample Size Box (stsz)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleSizeTable {
    pub version: u8,
    pub flags: u32,
    pub sample_size: u32,
    pub sample_count: u32,
    pub sample_sizes: Vec<u32>, // Empty if sample_size > 0
}

pub fn decode_stsz(payload: &[u8]) -> Result<SampleSizeTable> {
    let cur = ByteCursor::new(payload);
    let FullBoxHeader { version, flags } = read_full_box(&cur)?;
    let sample_size = cur.read_u32(4)?;
    let sample_count = cur.read_u32(8)?;

    // If sample_size is 0, each sample has its own size
    let sample_sizes = if sample_size == 0 {
        check_entries(&cur, b"stsz", sample_count, 12, 4)?;
        (0..sample_count as usize)
            .map(|i| cur.read_u32(12 + i * 4))
            .collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };

    Ok(SampleSizeTable {
        version,
        flags,
        sample_size,
        sample_count,
        sample_sizes,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CttsRun {
    pub sample_count: u32,
    pub sample_offset: i64,
}

/// Composition Time-to-Sample Box (ctts)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositionOffsetTable {
    pub version: u8,
    pub flags: u32,
    pub runs: Vec<CttsRun>,
}

pub fn decode_ctts(payload: &[u8]) -> Result<CompositionOffsetTable> {
    let cur = ByteCursor::new(payload);
    let FullBoxHeader { version, flags } = read_full_box(&cur)?;
    let count = counted_entries(&cur, b"ctts", 8)?;

    let mut runs = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let at = 8 + i * 8;
        // offsets are signed only from version 1 on
        let sample_offset = if version == 0 {
            cur.read_u32(at + 4)? as i64
        } else {
            cur.read_i32(at + 4)? as i64
        };
        runs.push(CttsRun {
            sample_count: cur.read_u32(at)?,
            sample_offset,
        });
    }

    Ok(CompositionOffsetTable {
        version,
        flags,
        runs,
    })
}
