//! Keyframe index: maps every sync sample of a track to its presentation
//! time, its chunk and the byte offset of that chunk.

use crate::boxes::Mp4Box;
use crate::error::{DecodeError, Result};
use crate::parser::{ParseOptions, parse_boxes_with};
use crate::tables::{
    ChunkOffsetTable, MediaHeader, SampleToChunkTable, SyncSampleTable, TimeToSampleTable,
    decode_co64, decode_mdhd, decode_stco, decode_stsc, decode_stss, decode_stts,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KeyframeEntry {
    /// 1-based sample number, as listed in `stss`.
    pub sample_number: u32,
    pub time_seconds: f64,
    /// 1-based chunk number.
    pub chunk_number: u32,
    /// Offset of the chunk within the file. This is the start of the chunk,
    /// not of the sample inside it.
    pub byte_offset: u64,
}

/// The tables of the one track an index is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackTables {
    pub media_header: MediaHeader,
    pub sync_samples: SyncSampleTable,
    pub time_to_sample: TimeToSampleTable,
    pub sample_to_chunk: SampleToChunkTable,
    pub chunk_offsets: ChunkOffsetTable,
}

impl TrackTables {
    pub fn build_index(&self) -> Result<Vec<KeyframeEntry>> {
        build_index(
            self.media_header.timescale.ticks_per_second,
            &self.sync_samples,
            &self.time_to_sample,
            &self.sample_to_chunk,
            &self.chunk_offsets,
        )
    }
}

/// Build the keyframe index from already decoded tables.
///
/// Entries come out in `stss` order. Any sync sample that cannot be placed
/// fails the whole index.
pub fn build_index(
    timescale: u32,
    stss: &SyncSampleTable,
    stts: &TimeToSampleTable,
    stsc: &SampleToChunkTable,
    stco: &ChunkOffsetTable,
) -> Result<Vec<KeyframeEntry>> {
    if timescale == 0 {
        return Err(DecodeError::InvalidTimescale);
    }

    stss.sample_numbers
        .iter()
        .map(|&sample| {
            let ticks = sample_ticks(sample, stts)?;
            let chunk = sample_chunk(sample, stsc, stco.len())?;
            let byte_offset = chunk_offset(chunk, stco)?;
            Ok(KeyframeEntry {
                sample_number: sample,
                time_seconds: ticks as f64 / timescale as f64,
                chunk_number: chunk,
                byte_offset,
            })
        })
        .collect()
}

/// Decode time of a 1-based sample, in media ticks.
fn sample_ticks(sample: u32, stts: &TimeToSampleTable) -> Result<u64> {
    if sample == 0 {
        return Err(DecodeError::InconsistentTables(
            "sync sample number 0".to_string(),
        ));
    }
    let remaining = (sample - 1) as u64;
    let mut total_count = 0u64;
    let mut total_duration = 0u64;

    for run in &stts.runs {
        let count = run.sample_count as u64;
        let duration = run.sample_duration as u64;
        if total_count + count > remaining {
            let extra = remaining - total_count;
            return extra
                .checked_mul(duration)
                .and_then(|d| d.checked_add(total_duration))
                .ok_or(DecodeError::MalformedLength);
        }
        total_count += count;
        total_duration = count
            .checked_mul(duration)
            .and_then(|d| d.checked_add(total_duration))
            .ok_or(DecodeError::MalformedLength)?;
    }

    Err(DecodeError::InconsistentTables(format!(
        "sample {sample} lies past the {total_count} samples of stts"
    )))
}

/// 1-based chunk that holds a 1-based sample.
fn sample_chunk(sample: u32, stsc: &SampleToChunkTable, chunk_count: usize) -> Result<u32> {
    if sample == 0 {
        return Err(DecodeError::InconsistentTables(
            "sync sample number 0".to_string(),
        ));
    }
    let sample = sample as u64;
    let mut total = 0u64;

    for (i, run) in stsc.runs.iter().enumerate() {
        let first = run.first_chunk as u64;
        // the last run extends to the last chunk of the offset table
        let span = match stsc.runs.get(i + 1) {
            Some(next) => (next.first_chunk as u64).checked_sub(first),
            None => (chunk_count as u64 + 1).checked_sub(first),
        }
        .ok_or_else(|| {
            DecodeError::InconsistentTables(format!(
                "stsc run {i} starts at chunk {first} after the chunk that ends it"
            ))
        })?;

        let per_chunk = run.samples_per_chunk as u64;
        let run_samples = span
            .checked_mul(per_chunk)
            .ok_or(DecodeError::MalformedLength)?;
        if total + run_samples >= sample {
            if per_chunk == 0 {
                return Err(DecodeError::InconsistentTables(format!(
                    "stsc run {i} has zero samples per chunk"
                )));
            }
            let chunk = first + (sample - total - 1) / per_chunk;
            return u32::try_from(chunk).map_err(|_| DecodeError::MalformedLength);
        }
        total = total
            .checked_add(run_samples)
            .ok_or(DecodeError::MalformedLength)?;
    }

    Err(DecodeError::InconsistentTables(format!(
        "sample {sample} lies past the {total} samples mapped by stsc"
    )))
}

fn chunk_offset(chunk: u32, stco: &ChunkOffsetTable) -> Result<u64> {
    let out_of_range = || DecodeError::ChunkIndexOutOfRange {
        chunk,
        chunk_count: stco.len(),
    };
    let index = (chunk as usize).checked_sub(1).ok_or_else(out_of_range)?;
    stco.offsets.get(index).copied().ok_or_else(out_of_range)
}

/// Collect the tables of the first track in `moov` that has a non-empty
/// `stss`. Every table, and the timescale, comes from that one track.
///
/// Returns `Ok(None)` when no track carries sync samples, e.g. a movie with
/// only audio tracks or one where every sample is a sync sample.
pub fn select_keyframe_track(data: &[u8]) -> Result<Option<TrackTables>> {
    select_keyframe_track_with(data, ParseOptions::default())
}

pub fn select_keyframe_track_with(data: &[u8], opts: ParseOptions) -> Result<Option<TrackTables>> {
    let mut moov = None;
    for b in parse_boxes_with(data, opts) {
        let b = b?;
        if &b.hdr.typ.0 == b"moov" {
            moov = Some(b);
            break;
        }
    }
    let Some(moov) = moov else {
        return Ok(None);
    };

    for trak in moov.children()? {
        let trak = trak?;
        if &trak.hdr.typ.0 != b"trak" {
            continue;
        }
        if let Some(tables) = track_tables(&trak)? {
            return Ok(Some(tables));
        }
    }
    Ok(None)
}

fn track_tables(trak: &Mp4Box<'_>) -> Result<Option<TrackTables>> {
    let Some(stbl) = trak.descend(&[b"mdia", b"minf", b"stbl"])? else {
        return Ok(None);
    };
    let sync_samples = match stbl.child(b"stss")? {
        Some(b) => decode_stss(b.payload())?,
        None => return Ok(None),
    };
    if sync_samples.sample_numbers.is_empty() {
        return Ok(None);
    }

    let media_header = match trak.descend(&[b"mdia", b"mdhd"])? {
        Some(b) => decode_mdhd(b.payload())?,
        None => return Err(missing("mdhd")),
    };
    let time_to_sample = match stbl.child(b"stts")? {
        Some(b) => decode_stts(b.payload())?,
        None => return Err(missing("stts")),
    };
    let sample_to_chunk = match stbl.child(b"stsc")? {
        Some(b) => decode_stsc(b.payload())?,
        None => return Err(missing("stsc")),
    };
    let chunk_offsets = match (stbl.child(b"stco")?, stbl.child(b"co64")?) {
        (Some(b), _) => decode_stco(b.payload())?,
        (None, Some(b)) => decode_co64(b.payload())?,
        (None, None) => return Err(missing("stco")),
    };

    Ok(Some(TrackTables {
        media_header,
        sync_samples,
        time_to_sample,
        sample_to_chunk,
        chunk_offsets,
    }))
}

fn missing(table: &str) -> DecodeError {
    DecodeError::InconsistentTables(format!("track with sync samples has no {table}"))
}

/// Index the keyframes of an in-memory MP4 file.
pub fn index_keyframes(data: &[u8]) -> Result<Option<Vec<KeyframeEntry>>> {
    match select_keyframe_track(data)? {
        Some(tables) => tables.build_index().map(Some),
        None => Ok(None),
    }
}
