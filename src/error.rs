use crate::boxes::FourCC;

/// Errors raised while decoding MP4 boxes, sample tables, FLV tags or AMF0 values.
///
/// Every variant fails the current unit only (one box, one table, one tag,
/// one AMF0 value); the caller decides whether to skip to the next sibling or
/// abort.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("read of {len} bytes at offset {offset} exceeds buffer of {available} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },
    #[error("length or offset arithmetic overflowed")]
    MalformedLength,
    #[error("malformed box at offset {offset}: {reason}")]
    MalformedBox { offset: u64, reason: String },
    #[error("malformed FLV tag at offset {offset}: {reason}")]
    MalformedTag { offset: usize, reason: String },
    #[error("{box_type} declares {entry_count} entries but only {available} payload bytes remain")]
    TruncatedTable {
        box_type: FourCC,
        entry_count: u32,
        available: usize,
    },
    #[error("inconsistent sample tables: {0}")]
    InconsistentTables(String),
    #[error("media timescale is zero")]
    InvalidTimescale,
    #[error("chunk {chunk} is outside the chunk offset table ({chunk_count} chunks)")]
    ChunkIndexOutOfRange { chunk: u32, chunk_count: usize },
    #[error("nesting deeper than {max_depth} levels")]
    NestingTooDeep { max_depth: usize },
    #[error("invalid FLV signature")]
    InvalidSignature,
    #[error("unsupported AMF0 marker 0x{0:02x}")]
    UnknownMarker(u8),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
