use crate::boxes::{BoxHeader, FourCC, Mp4Box};
use crate::cursor::ByteCursor;
use crate::known_boxes::KnownBox;
use crate::tables::{
    self, ChunkOffsetTable, CompositionOffsetTable, FullBoxHeader, MediaHeader, SampleSizeTable,
    SampleToChunkTable, SyncSampleTable, TimeToSampleTable, check_entries, read_full_box,
};
use serde::Serialize;
use std::collections::HashMap;

/// A value returned from a box decoder.
///
/// Decoders return structured data; boxes without a typed layout may be
/// handed back as raw bytes.
#[derive(Debug, Clone)]
pub enum BoxValue {
    Bytes(Vec<u8>),
    Structured(StructuredData),
}

/// Structured data for the leaf boxes with a known layout.
#[derive(Debug, Clone, Serialize)]
pub enum StructuredData {
    /// File Type Box (ftyp / styp)
    FileType(FtypData),
    /// Movie Header Box (mvhd)
    MovieHeader(MvhdData),
    /// Track Header Box (tkhd)
    TrackHeader(TkhdData),
    /// Media Header Box (mdhd)
    MediaHeader(MediaHeader),
    /// Handler Reference Box (hdlr)
    HandlerReference(HdlrData),
    /// Sample Description Box (stsd); the entries are its child boxes
    SampleDescription(StsdData),
    /// Decoding Time-to-Sample Box (stts)
    DecodingTimeToSample(TimeToSampleTable),
    /// Composition Time-to-Sample Box (ctts)
    CompositionTimeToSample(CompositionOffsetTable),
    /// Sample-to-Chunk Box (stsc)
    SampleToChunk(SampleToChunkTable),
    /// Sample Size Box (stsz)
    SampleSize(SampleSizeTable),
    /// Sync Sample Box (stss)
    SyncSample(SyncSampleTable),
    /// Chunk Offset Box (stco / co64)
    ChunkOffset(ChunkOffsetTable),
    /// Movie Fragment Header Box (mfhd)
    MovieFragmentHeader(MfhdData),
    /// Track Fragment Header Box (tfhd)
    TrackFragmentHeader(TfhdData),
    /// Track Fragment Run Box (trun)
    TrackRun(TrunData),
    /// Track Extends Box (trex)
    TrackExtends(TrexData),
    /// Original Format Box (frma)
    OriginalFormat(FourCC),
    /// Scheme Type Box (schm)
    SchemeType(SchmData),
}

#[derive(Debug, Clone, Serialize)]
pub struct FtypData {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MvhdData {
    pub version: u8,
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub rate: f64,
    pub volume: f32,
    pub next_track_id: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TkhdData {
    pub version: u8,
    pub flags: u32,
    pub track_id: u32,
    pub duration: u64,
    pub layer: i16,
    pub alternate_group: i16,
    pub volume: f32,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HdlrData {
    pub version: u8,
    pub flags: u32,
    pub handler_type: FourCC,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StsdData {
    pub version: u8,
    pub flags: u32,
    pub entry_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MfhdData {
    pub sequence_number: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TfhdData {
    pub version: u8,
    pub flags: u32,
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrunSample {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub composition_time_offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrunData {
    pub version: u8,
    pub flags: u32,
    pub sample_count: u32,
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub samples: Vec<TrunSample>,
}

/// The 32-bit sample flags word of `trex`/`tfhd`/`trun`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SampleFlags {
    pub is_leading: u8,
    pub depends_on: u8,
    pub is_depended_on: u8,
    pub has_redundancy: u8,
    pub padding_value: u8,
    pub is_non_sync_sample: bool,
    pub degradation_priority: u16,
}

impl From<u32> for SampleFlags {
    fn from(v: u32) -> Self {
        SampleFlags {
            is_leading: ((v >> 26) & 0x3) as u8,
            depends_on: ((v >> 24) & 0x3) as u8,
            is_depended_on: ((v >> 22) & 0x3) as u8,
            has_redundancy: ((v >> 20) & 0x3) as u8,
            padding_value: ((v >> 17) & 0x7) as u8,
            is_non_sync_sample: (v >> 16) & 0x1 == 1,
            degradation_priority: (v & 0xFFFF) as u16,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrexData {
    pub track_id: u32,
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: SampleFlags,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchmData {
    pub version: u8,
    pub flags: u32,
    pub scheme_type: FourCC,
    pub scheme_version: u32,
    pub scheme_uri: Option<String>,
}

/// Trait for box decoders.
///
/// A decoder interprets the payload of one box type (everything after the
/// box header) and returns a [`BoxValue`]. It must not assume anything about
/// bytes outside the payload slice.
pub trait BoxDecoder: Send + Sync {
    fn decode(&self, payload: &[u8], hdr: &BoxHeader) -> anyhow::Result<BoxValue>;
}

/// Structural category of a box type.
pub enum BoxCategory<'r> {
    /// Children start `child_offset` bytes into the payload.
    Container { child_offset: usize },
    /// A leaf with a registered decoder.
    Leaf(&'r dyn BoxDecoder),
    /// A leaf left as raw bytes.
    Opaque,
}

/// Registry of decoders keyed by box type.
///
/// The registry is immutable once constructed; use [`Registry::with_decoder`]
/// to build it fluently.
pub struct Registry {
    map: HashMap<FourCC, BoxDecoderEntry>,
}

struct BoxDecoderEntry {
    inner: Box<dyn BoxDecoder>,
    name: String,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Return a new registry with the given decoder added.
    ///
    /// `name` is human-readable and used only for diagnostics.
    pub fn with_decoder(mut self, key: FourCC, name: &str, dec: Box<dyn BoxDecoder>) -> Self {
        self.map.insert(
            key,
            BoxDecoderEntry {
                inner: dec,
                name: name.to_string(),
            },
        );
        self
    }

    /// Classify a box type. Container knowledge is static; a leaf is typed
    /// only when a decoder is registered for it.
    pub fn classify(&self, typ: FourCC) -> BoxCategory<'_> {
        if let Some(child_offset) = KnownBox::from(typ).child_offset() {
            return BoxCategory::Container { child_offset };
        }
        match self.map.get(&typ) {
            Some(entry) => BoxCategory::Leaf(entry.inner.as_ref()),
            None => BoxCategory::Opaque,
        }
    }

    pub fn decoder_name(&self, typ: FourCC) -> Option<&str> {
        self.map.get(&typ).map(|e| e.name.as_str())
    }

    /// Try to decode the payload of a box using a registered decoder.
    ///
    /// Returns `None` if no decoder exists for the box type.
    pub fn decode(&self, b: &Mp4Box<'_>) -> Option<anyhow::Result<BoxValue>> {
        self.map
            .get(&b.hdr.typ)
            .map(|d| d.inner.decode(b.payload(), &b.hdr))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------- Helpers ----------

fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

fn fixed_16_16(v: u32) -> f64 {
    v as f64 / 65536.0
}

fn fixed_8_8(v: u16) -> f32 {
    v as f32 / 256.0
}

// ---------- Sample table decoders ----------

macro_rules! table_decoder {
    ($name:ident, $decode:path, $variant:ident) => {
        pub struct $name;

        impl BoxDecoder for $name {
            fn decode(&self, payload: &[u8], _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
                Ok(BoxValue::Structured(StructuredData::$variant($decode(
                    payload,
                )?)))
            }
        }
    };
}

table_decoder!(MdhdDecoder, tables::decode_mdhd, MediaHeader);
table_decoder!(StssDecoder, tables::decode_stss, SyncSample);
table_decoder!(SttsDecoder, tables::decode_stts, DecodingTimeToSample);
table_decoder!(StscDecoder, tables::decode_stsc, SampleToChunk);
table_decoder!(StcoDecoder, tables::decode_stco, ChunkOffset);
table_decoder!(Co64Decoder, tables::decode_co64, ChunkOffset);
table_decoder!(StszDecoder, tables::decode_stsz, SampleSize);
table_decoder!(CttsDecoder, tables::decode_ctts, CompositionTimeToSample);

// ---------- Other leaf decoders ----------

// ftyp / styp: major + minor + compatible brands
pub struct FtypDecoder;

impl BoxDecoder for FtypDecoder {
    fn decode(&self, payload: &[u8], _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let cur = ByteCursor::new(payload);
        let major_brand = FourCC(cur.read_fourcc(0)?);
        let minor_version = cur.read_u32(4)?;
        let compatible_brands = payload[8..]
            .chunks_exact(4)
            .map(|c| FourCC([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(BoxValue::Structured(StructuredData::FileType(FtypData {
            major_brand,
            minor_version,
            compatible_brands,
        })))
    }
}

// mvhd: timescale + duration
pub struct MvhdDecoder;

impl BoxDecoder for MvhdDecoder {
    fn decode(&self, payload: &[u8], _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let cur = ByteCursor::new(payload);
        let FullBoxHeader { version, flags } = read_full_box(&cur)?;

        let (creation_time, modification_time, timescale, duration, rest) = if version == 1 {
            (cur.read_u64(4)?, cur.read_u64(12)?, cur.read_u32(20)?, cur.read_u64(24)?, 32)
        } else {
            (
                cur.read_u32(4)? as u64,
                cur.read_u32(8)? as u64,
                cur.read_u32(12)?,
                cur.read_u32(16)? as u64,
                20,
            )
        };
        // rate(4) volume(2) reserved(10) matrix(36) pre_defined(24) next_track_ID(4)
        let rate = fixed_16_16(cur.read_u32(rest)?);
        let volume = fixed_8_8(cur.read_u16(rest + 4)?);
        let next_track_id = cur.read_u32(rest + 76)?;

        Ok(BoxValue::Structured(StructuredData::MovieHeader(MvhdData {
            version,
            flags,
            creation_time,
            modification_time,
            timescale,
            duration,
            rate,
            volume,
            next_track_id,
        })))
    }
}

// tkhd: track id, duration, width, height
pub struct TkhdDecoder;

impl BoxDecoder for TkhdDecoder {
    fn decode(&self, payload: &[u8], _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let cur = ByteCursor::new(payload);
        let FullBoxHeader { version, flags } = read_full_box(&cur)?;

        // version 1: creation(8) modification(8) track_ID(4) reserved(4) duration(8)
        // version 0: creation(4) modification(4) track_ID(4) reserved(4) duration(4)
        let (track_id, duration, rest) = if version == 1 {
            (cur.read_u32(20)?, cur.read_u64(28)?, 36)
        } else {
            (cur.read_u32(12)?, cur.read_u32(20)? as u64, 24)
        };
        // reserved(8) layer(2) alternate_group(2) volume(2) reserved(2) matrix(36) width height
        let layer = cur.read_i16(rest + 8)?;
        let alternate_group = cur.read_i16(rest + 10)?;
        let volume = fixed_8_8(cur.read_u16(rest + 12)?);
        let width = fixed_16_16(cur.read_u32(rest + 52)?);
        let height = fixed_16_16(cur.read_u32(rest + 56)?);

        Ok(BoxValue::Structured(StructuredData::TrackHeader(TkhdData {
            version,
            flags,
            track_id,
            duration,
            layer,
            alternate_group,
            volume,
            width,
            height,
        })))
    }
}

// hdlr: handler type + name
pub struct HdlrDecoder;

impl BoxDecoder for HdlrDecoder {
    fn decode(&self, payload: &[u8], _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let cur = ByteCursor::new(payload);
        let FullBoxHeader { version, flags } = read_full_box(&cur)?;

        // pre_defined (4 bytes) + handler_type (4 bytes) + reserved (3 * 4 bytes)
        let handler_type = FourCC(cur.read_fourcc(8)?);
        let name = nul_terminated(payload.get(24..).unwrap_or_default());

        Ok(BoxValue::Structured(StructuredData::HandlerReference(
            HdlrData {
                version,
                flags,
                handler_type,
                name,
            },
        )))
    }
}

// stsd: entry count; the sample entries are walked as child boxes
pub struct StsdDecoder;

impl BoxDecoder for StsdDecoder {
    fn decode(&self, payload: &[u8], _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let cur = ByteCursor::new(payload);
        let FullBoxHeader { version, flags } = read_full_box(&cur)?;
        let entry_count = cur.read_u32(4)?;

        Ok(BoxValue::Structured(StructuredData::SampleDescription(
            StsdData {
                version,
                flags,
                entry_count,
            },
        )))
    }
}

// mfhd: fragment sequence number
pub struct MfhdDecoder;

impl BoxDecoder for MfhdDecoder {
    fn decode(&self, payload: &[u8], _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let cur = ByteCursor::new(payload);
        Ok(BoxValue::Structured(StructuredData::MovieFragmentHeader(
            MfhdData {
                sequence_number: cur.read_u32(4)?,
            },
        )))
    }
}

// tfhd: track id + optional defaults selected by flag bits
pub struct TfhdDecoder;

impl BoxDecoder for TfhdDecoder {
    fn decode(&self, payload: &[u8], _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let cur = ByteCursor::new(payload);
        let FullBoxHeader { version, flags } = read_full_box(&cur)?;
        let track_id = cur.read_u32(4)?;
        let mut pos = 8;

        let base_data_offset = if flags & 0x01 != 0 {
            pos += 8;
            Some(cur.read_u64(pos - 8)?)
        } else {
            None
        };
        let mut optional_u32 = |bit: u32| -> anyhow::Result<Option<u32>> {
            if flags & bit == 0 {
                return Ok(None);
            }
            pos += 4;
            Ok(Some(cur.read_u32(pos - 4)?))
        };
        let sample_description_index = optional_u32(0x02)?;
        let default_sample_duration = optional_u32(0x08)?;
        let default_sample_size = optional_u32(0x10)?;
        let default_sample_flags = optional_u32(0x20)?;

        Ok(BoxValue::Structured(StructuredData::TrackFragmentHeader(
            TfhdData {
                version,
                flags,
                track_id,
                base_data_offset,
                sample_description_index,
                default_sample_duration,
                default_sample_size,
                default_sample_flags,
            },
        )))
    }
}

// trun: per-sample table whose columns are selected by flag bits
pub struct TrunDecoder;

impl BoxDecoder for TrunDecoder {
    fn decode(&self, payload: &[u8], _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let cur = ByteCursor::new(payload);
        let FullBoxHeader { version, flags } = read_full_box(&cur)?;
        let sample_count = cur.read_u32(4)?;
        let mut pos = 8;

        let data_offset = if flags & 0x001 != 0 {
            pos += 4;
            Some(cur.read_i32(pos - 4)?)
        } else {
            None
        };
        let first_sample_flags = if flags & 0x004 != 0 {
            pos += 4;
            Some(cur.read_u32(pos - 4)?)
        } else {
            None
        };

        let columns = [0x100, 0x200, 0x400, 0x800]
            .iter()
            .filter(|&&bit| flags & bit != 0)
            .count();
        check_entries(&cur, b"trun", sample_count, pos, columns * 4)?;

        let mut samples = Vec::with_capacity(sample_count as usize);
        for _ in 0..sample_count {
            let mut s = TrunSample::default();
            if flags & 0x100 != 0 {
                s.duration = Some(cur.read_u32(pos)?);
                pos += 4;
            }
            if flags & 0x200 != 0 {
                s.size = Some(cur.read_u32(pos)?);
                pos += 4;
            }
            if flags & 0x400 != 0 {
                s.flags = Some(cur.read_u32(pos)?);
                pos += 4;
            }
            if flags & 0x800 != 0 {
                s.composition_time_offset = Some(if version == 0 {
                    cur.read_u32(pos)? as i64
                } else {
                    cur.read_i32(pos)? as i64
                });
                pos += 4;
            }
            samples.push(s);
        }

        Ok(BoxValue::Structured(StructuredData::TrackRun(TrunData {
            version,
            flags,
            sample_count,
            data_offset,
            first_sample_flags,
            samples,
        })))
    }
}

// trex: per-track fragment defaults
pub struct TrexDecoder;

impl BoxDecoder for TrexDecoder {
    fn decode(&self, payload: &[u8], _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let cur = ByteCursor::new(payload);
        Ok(BoxValue::Structured(StructuredData::TrackExtends(TrexData {
            track_id: cur.read_u32(4)?,
            default_sample_description_index: cur.read_u32(8)?,
            default_sample_duration: cur.read_u32(12)?,
            default_sample_size: cur.read_u32(16)?,
            default_sample_flags: SampleFlags::from(cur.read_u32(20)?),
        })))
    }
}

// frma: original sample entry format of a protected track
pub struct FrmaDecoder;

impl BoxDecoder for FrmaDecoder {
    fn decode(&self, payload: &[u8], _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let cur = ByteCursor::new(payload);
        Ok(BoxValue::Structured(StructuredData::OriginalFormat(FourCC(
            cur.read_fourcc(0)?,
        ))))
    }
}

// schm: protection scheme type
pub struct SchmDecoder;

impl BoxDecoder for SchmDecoder {
    fn decode(&self, payload: &[u8], _hdr: &BoxHeader) -> anyhow::Result<BoxValue> {
        let cur = ByteCursor::new(payload);
        let FullBoxHeader { version, flags } = read_full_box(&cur)?;
        let scheme_type = FourCC(cur.read_fourcc(4)?);
        let scheme_version = cur.read_u32(8)?;
        let scheme_uri = if flags & 0x1 != 0 {
            Some(nul_terminated(payload.get(12..).unwrap_or_default()))
        } else {
            None
        };

        Ok(BoxValue::Structured(StructuredData::SchemeType(SchmData {
            version,
            flags,
            scheme_type,
            scheme_version,
            scheme_uri,
        })))
    }
}

// ---------- Default registry ----------
pub fn default_registry() -> Registry {
    let fourcc = |s: &[u8; 4]| FourCC(*s);

    Registry::new()
        .with_decoder(fourcc(b"ftyp"), "ftyp", Box::new(FtypDecoder))
        .with_decoder(fourcc(b"styp"), "styp", Box::new(FtypDecoder))
        .with_decoder(fourcc(b"mvhd"), "mvhd", Box::new(MvhdDecoder))
        .with_decoder(fourcc(b"tkhd"), "tkhd", Box::new(TkhdDecoder))
        .with_decoder(fourcc(b"mdhd"), "mdhd", Box::new(MdhdDecoder))
        .with_decoder(fourcc(b"hdlr"), "hdlr", Box::new(HdlrDecoder))
        .with_decoder(fourcc(b"stsd"), "stsd", Box::new(StsdDecoder))
        .with_decoder(fourcc(b"stts"), "stts", Box::new(SttsDecoder))
        .with_decoder(fourcc(b"ctts"), "ctts", Box::new(CttsDecoder))
        .with_decoder(fourcc(b"stss"), "stss", Box::new(StssDecoder))
        .with_decoder(fourcc(b"stsc"), "stsc", Box::new(StscDecoder))
        .with_decoder(fourcc(b"stsz"), "stsz", Box::new(StszDecoder))
        .with_decoder(fourcc(b"stco"), "stco", Box::new(StcoDecoder))
        .with_decoder(fourcc(b"co64"), "co64", Box::new(Co64Decoder))
        .with_decoder(fourcc(b"mfhd"), "mfhd", Box::new(MfhdDecoder))
        .with_decoder(fourcc(b"tfhd"), "tfhd", Box::new(TfhdDecoder))
        .with_decoder(fourcc(b"trun"), "trun", Box::new(TrunDecoder))
        .with_decoder(fourcc(b"trex"), "trex", Box::new(TrexDecoder))
        .with_decoder(fourcc(b"frma"), "frma", Box::new(FrmaDecoder))
        .with_decoder(fourcc(b"schm"), "schm", Box::new(SchmDecoder))
}
