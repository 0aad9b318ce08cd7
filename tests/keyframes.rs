use mediabox::error::DecodeError;
use mediabox::keyframes::{KeyframeEntry, build_index, index_keyframes, select_keyframe_track};
use mediabox::tables::{
    ChunkOffsetTable, SampleToChunkTable, StscRun, SttsRun, SyncSampleTable, TimeToSampleTable,
};

fn stss(samples: &[u32]) -> SyncSampleTable {
    SyncSampleTable {
        version: 0,
        flags: 0,
        sample_numbers: samples.to_vec(),
    }
}

fn stts(runs: &[(u32, u32)]) -> TimeToSampleTable {
    TimeToSampleTable {
        version: 0,
        flags: 0,
        runs: runs
            .iter()
            .map(|&(sample_count, sample_duration)| SttsRun {
                sample_count,
                sample_duration,
            })
            .collect(),
    }
}

fn stsc(runs: &[(u32, u32)]) -> SampleToChunkTable {
    SampleToChunkTable {
        version: 0,
        flags: 0,
        runs: runs
            .iter()
            .map(|&(first_chunk, samples_per_chunk)| StscRun {
                first_chunk,
                samples_per_chunk,
                sample_description_index: 1,
            })
            .collect(),
    }
}

fn stco(offsets: &[u64]) -> ChunkOffsetTable {
    ChunkOffsetTable {
        version: 0,
        flags: 0,
        wide: false,
        offsets: offsets.to_vec(),
    }
}

#[test]
fn index_of_single_run_track() {
    let index = build_index(
        1000,
        &stss(&[1, 10]),
        &stts(&[(20, 1000)]),
        &stsc(&[(1, 10)]),
        &stco(&[100, 5000]),
    )
    .unwrap();

    // sample 10 is still in chunk 1 (samples 1-10)
    assert_eq!(
        index,
        vec![
            KeyframeEntry {
                sample_number: 1,
                time_seconds: 0.0,
                chunk_number: 1,
                byte_offset: 100
            },
            KeyframeEntry {
                sample_number: 10,
                time_seconds: 9.0,
                chunk_number: 1,
                byte_offset: 100
            },
        ]
    );
}

#[test]
fn sample_after_chunk_boundary_moves_to_next_chunk() {
    let index = build_index(
        1000,
        &stss(&[11, 20]),
        &stts(&[(20, 1000)]),
        &stsc(&[(1, 10)]),
        &stco(&[100, 5000]),
    )
    .unwrap();
    assert_eq!(index[0].chunk_number, 2);
    assert_eq!(index[0].byte_offset, 5000);
    assert_eq!(index[0].time_seconds, 10.0);
    assert_eq!(index[1].chunk_number, 2);
}

#[test]
fn times_do_not_decrease() {
    let index = build_index(
        90000,
        &stss(&[1, 4, 9, 15, 30]),
        &stts(&[(5, 3000), (0, 7000), (10, 1500), (15, 3003)]),
        &stsc(&[(1, 4), (3, 2), (8, 1)]),
        &stco(&(0..40u64).map(|i| i * 1000).collect::<Vec<_>>()),
    )
    .unwrap();

    assert_eq!(index.len(), 5);
    for pair in index.windows(2) {
        assert!(pair[0].time_seconds <= pair[1].time_seconds);
    }
    // sample 9: 5 * 3000 + 3 * 1500 ticks
    assert_eq!(index[2].time_seconds, 19500.0 / 90000.0);
}

#[test]
fn output_keeps_sync_table_order() {
    let index = build_index(
        1,
        &stss(&[5, 2]),
        &stts(&[(10, 1)]),
        &stsc(&[(1, 1)]),
        &stco(&(0..10u64).collect::<Vec<_>>()),
    )
    .unwrap();
    let samples: Vec<_> = index.iter().map(|k| k.sample_number).collect();
    assert_eq!(samples, vec![5, 2]);
}

#[test]
fn zero_timescale_is_rejected() {
    let res = build_index(
        0,
        &stss(&[1]),
        &stts(&[(1, 1)]),
        &stsc(&[(1, 1)]),
        &stco(&[0]),
    );
    assert_eq!(res, Err(DecodeError::InvalidTimescale));
}

#[test]
fn sample_outside_stts_is_inconsistent() {
    let res = build_index(
        1000,
        &stss(&[25]),
        &stts(&[(20, 1000)]),
        &stsc(&[(1, 10)]),
        &stco(&[100, 5000, 9000]),
    );
    assert!(matches!(res, Err(DecodeError::InconsistentTables(_))));
}

#[test]
fn sample_outside_stsc_is_inconsistent() {
    let res = build_index(
        1000,
        &stss(&[15]),
        &stts(&[(20, 1000)]),
        &stsc(&[(1, 10)]),
        &stco(&[100]),
    );
    assert!(matches!(res, Err(DecodeError::InconsistentTables(_))));
}

#[test]
fn empty_last_run_is_inconsistent() {
    // the second run starts after the last chunk with an offset
    let res = build_index(
        1000,
        &stss(&[21]),
        &stts(&[(30, 1000)]),
        &stsc(&[(1, 10), (3, 10)]),
        &stco(&[100, 5000]),
    );
    assert!(matches!(res, Err(DecodeError::InconsistentTables(_))));
}

#[test]
fn chunk_past_offset_table_is_out_of_range() {
    // stsc maps chunks 1-4 while stco only has two
    let res = build_index(
        1000,
        &stss(&[35]),
        &stts(&[(50, 1000)]),
        &stsc(&[(1, 10), (5, 10)]),
        &stco(&[100, 200]),
    );
    assert_eq!(
        res,
        Err(DecodeError::ChunkIndexOutOfRange {
            chunk: 4,
            chunk_count: 2
        })
    );

    let res = build_index(
        1000,
        &stss(&[1]),
        &stts(&[(10, 1000)]),
        &stsc(&[(0, 10)]),
        &stco(&[100]),
    );
    assert_eq!(
        res,
        Err(DecodeError::ChunkIndexOutOfRange {
            chunk: 0,
            chunk_count: 1
        })
    );
}

#[test]
fn extreme_counts_do_not_overflow() {
    let res = build_index(
        1,
        &stss(&[3]),
        &stts(&[(2, u32::MAX), (u32::MAX, u32::MAX)]),
        &stsc(&[(1, 3)]),
        &stco(&[0]),
    );
    assert_eq!(res.unwrap()[0].time_seconds, 2.0 * u32::MAX as f64);

    let res = build_index(
        1,
        &stss(&[u32::MAX]),
        &stts(&[(u32::MAX, u32::MAX)]),
        &stsc(&[(1, u32::MAX)]),
        &stco(&[0]),
    );
    assert_eq!(res.unwrap()[0].chunk_number, 1);
}

// ---------- whole-file workflow ----------

fn bx(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&(8 + payload.len() as u32).to_be_bytes());
    v.extend_from_slice(typ);
    v.extend_from_slice(payload);
    v
}

fn full(typ: &[u8; 4], body: &[u32]) -> Vec<u8> {
    let mut payload = vec![0, 0, 0, 0];
    payload.extend(body.iter().flat_map(|v| v.to_be_bytes()));
    bx(typ, &payload)
}

fn mdhd(timescale: u32) -> Vec<u8> {
    let mut m = full(b"mdhd", &[0, 0, timescale, 0]);
    m.extend_from_slice(&[0x55, 0xC4, 0, 0]);
    // fix the size to cover the language trailer
    let size = m.len() as u32;
    m[..4].copy_from_slice(&size.to_be_bytes());
    m
}

fn trak(timescale: u32, stbl_children: &[Vec<u8>]) -> Vec<u8> {
    let stbl = bx(b"stbl", &stbl_children.concat());
    let minf = bx(b"minf", &stbl);
    let mdia = bx(b"mdia", &[mdhd(timescale), minf].concat());
    bx(b"trak", &mdia)
}

fn video_tables(first_offset: u32) -> Vec<Vec<u8>> {
    vec![
        full(b"stts", &[1, 20, 1000]),
        full(b"stss", &[2, 1, 10]),
        full(b"stsc", &[1, 1, 10, 1]),
        full(b"stco", &[2, first_offset, first_offset + 4900]),
    ]
}

#[test]
fn first_track_with_sync_samples_is_used() {
    // audio track: no stss, different timescale
    let audio = trak(
        48000,
        &[
            full(b"stts", &[1, 100, 1024]),
            full(b"stsc", &[1, 1, 100, 1]),
            full(b"stco", &[1, 40]),
        ],
    );
    let video1 = trak(1000, &video_tables(100));
    let video2 = trak(90000, &video_tables(7000));
    let moov = bx(b"moov", &[audio, video1, video2].concat());
    let data = [bx(b"ftyp", b"isom\0\0\0\0"), moov].concat();

    let tables = select_keyframe_track(&data).unwrap().expect("video track");
    assert_eq!(tables.media_header.timescale.ticks_per_second, 1000);
    assert_eq!(tables.chunk_offsets.offsets, vec![100, 5000]);

    let index = index_keyframes(&data).unwrap().unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index[1].time_seconds, 9.0);
    assert_eq!(index[1].byte_offset, 100);
}

#[test]
fn empty_sync_table_is_skipped() {
    let mut first = video_tables(100);
    first[1] = full(b"stss", &[0]);
    let moov = bx(
        b"moov",
        &[trak(1000, &first), trak(2000, &video_tables(300))].concat(),
    );

    let tables = select_keyframe_track(&moov).unwrap().unwrap();
    assert_eq!(tables.media_header.timescale.ticks_per_second, 2000);
    assert_eq!(tables.chunk_offsets.offsets[0], 300);
}

#[test]
fn no_sync_samples_means_no_index() {
    let audio = trak(
        48000,
        &[
            full(b"stts", &[1, 10, 1024]),
            full(b"stsc", &[1, 1, 10, 1]),
            full(b"stco", &[1, 40]),
        ],
    );
    let data = bx(b"moov", &audio);
    assert_eq!(index_keyframes(&data).unwrap(), None);
    assert_eq!(index_keyframes(&bx(b"free", &[])).unwrap(), None);
}

#[test]
fn co64_is_used_when_stco_is_absent() {
    let mut tables = video_tables(0);
    let mut co64 = vec![0, 0, 0, 0];
    co64.extend_from_slice(&2u32.to_be_bytes());
    co64.extend_from_slice(&0x2_0000_0000u64.to_be_bytes());
    co64.extend_from_slice(&0x2_0000_1000u64.to_be_bytes());
    tables[3] = bx(b"co64", &co64);
    let data = bx(b"moov", &trak(1000, &tables));

    let index = index_keyframes(&data).unwrap().unwrap();
    assert_eq!(index[0].byte_offset, 0x2_0000_0000);
}

#[test]
fn missing_table_fails_the_index() {
    let mut tables = video_tables(100);
    tables.remove(2); // stsc
    let data = bx(b"moov", &trak(1000, &tables));
    assert!(matches!(
        select_keyframe_track(&data),
        Err(DecodeError::InconsistentTables(_))
    ));
}

#[test]
fn truncated_table_fails_the_index() {
    let mut tables = video_tables(100);
    tables[3] = full(b"stco", &[9, 100]);
    let data = bx(b"moov", &trak(1000, &tables));
    assert!(matches!(
        select_keyframe_track(&data),
        Err(DecodeError::TruncatedTable { .. })
    ));
}
