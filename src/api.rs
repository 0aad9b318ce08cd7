use crate::{
    boxes::Mp4Box,
    cursor::ByteCursor,
    known_boxes::KnownBox,
    parser::{ParseOptions, parse_boxes_with},
    registry::{BoxCategory, BoxValue, Registry, StructuredData, default_registry},
    tables::read_full_box,
    util::{hex_dump, uuid_hex},
};
use serde::Serialize;

/// A JSON-serializable representation of a single MP4 box.
///
/// Suitable for serialization to JSON for use in web UIs, CLIs, or APIs.
#[derive(Debug, Serialize)]
pub struct Box {
    /// Absolute byte offset of this box in the buffer
    pub offset: u64,
    /// Total size of this box including header and payload
    pub size: u64,
    /// 8, 16, or 24/32 for `uuid` boxes
    pub header_size: u64,
    pub payload_offset: u64,
    pub payload_size: u64,

    /// Four-character box type code (e.g., "ftyp", "moov")
    pub typ: String,
    /// Extended type of `uuid` boxes, as hex
    pub uuid: Option<String>,
    /// Version field for FullBox types
    pub version: Option<u8>,
    /// Flags field for FullBox types
    pub flags: Option<u32>,
    /// "container", "leaf" (registered decoder) or "opaque"
    pub kind: String,
    /// Typed content, when decoding was requested and a decoder exists
    pub decoded: Option<StructuredData>,
    /// Byte count of payloads a decoder returned untyped
    pub raw_bytes: Option<usize>,
    /// Decode failure of this box, or the failure that ended its child list
    pub error: Option<String>,
    /// Child boxes for container types
    pub children: Option<Vec<Box>>,
}

/// Top-level boxes of a buffer, plus the failure that ended the walk early.
#[derive(Debug, Serialize)]
pub struct BoxTree {
    pub boxes: Vec<Box>,
    pub error: Option<String>,
}

/// Walk an in-memory MP4/ISOBMFF buffer and return the box tree.
///
/// A failing leaf decoder only marks its own box. A malformed box header
/// ends the list it belongs to; the boxes already read are kept and the
/// error is recorded on the enclosing container (or on the tree for the
/// top level).
///
/// ```no_run
/// let data = std::fs::read("video.mp4")?;
/// let tree = mediabox::get_boxes(&data, true);
/// println!("{}", serde_json::to_string_pretty(&tree)?);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_boxes(data: &[u8], decode: bool) -> BoxTree {
    get_boxes_with(data, decode, ParseOptions::default(), &default_registry())
}

pub fn get_boxes_with(data: &[u8], decode: bool, opts: ParseOptions, reg: &Registry) -> BoxTree {
    let mut boxes = Vec::new();
    let mut error = None;
    for b in parse_boxes_with(data, opts) {
        match b {
            Ok(b) => boxes.push(describe_box(&b, decode, reg)),
            Err(e) => error = Some(e.to_string()),
        }
    }
    BoxTree { boxes, error }
}

fn decode_value(b: &Mp4Box<'_>, reg: &Registry) -> (Option<StructuredData>, Option<usize>, Option<String>) {
    match reg.decode(b) {
        Some(Ok(BoxValue::Structured(data))) => (Some(data), None, None),
        Some(Ok(BoxValue::Bytes(bytes))) => (None, Some(bytes.len()), None),
        Some(Err(e)) => (None, None, Some(format!("{e:#}"))),
        None => (None, None, None),
    }
}

/// Serializable view of one box and its subtree.
pub fn describe_box(b: &Mp4Box<'_>, decode: bool, reg: &Registry) -> Box {
    let hdr = &b.hdr;
    let payload = b.payload();

    let (version, flags) = if KnownBox::from(hdr.typ).is_full_box() {
        match read_full_box(&ByteCursor::new(payload)) {
            Ok(fb) => (Some(fb.version), Some(fb.flags)),
            Err(_) => (None, None),
        }
    } else {
        (None, None)
    };

    let (kind, children, mut error) = match reg.classify(hdr.typ) {
        BoxCategory::Container { .. } => {
            let (kids, err) = build_children(b, decode, reg);
            ("container", Some(kids), err)
        }
        BoxCategory::Leaf(_) => ("leaf", None, None),
        BoxCategory::Opaque => ("opaque", None, None),
    };

    let (decoded, raw_bytes) = if decode {
        let (decoded, raw_bytes, decode_err) = decode_value(b, reg);
        error = error.or(decode_err);
        (decoded, raw_bytes)
    } else {
        (None, None)
    };

    Box {
        offset: hdr.start,
        size: hdr.size,
        header_size: hdr.header_size,
        payload_offset: hdr.payload_offset(),
        payload_size: payload.len() as u64,

        typ: hdr.typ.to_string(),
        uuid: hdr.uuid.as_ref().map(uuid_hex),
        version,
        flags,
        kind: kind.to_string(),
        decoded,
        raw_bytes,
        error,
        children,
    }
}

fn build_children(b: &Mp4Box<'_>, decode: bool, reg: &Registry) -> (Vec<Box>, Option<String>) {
    let mut kids = Vec::new();
    let iter = match b.children() {
        Ok(iter) => iter,
        Err(e) => return (kids, Some(e.to_string())),
    };
    for kid in iter {
        match kid {
            Ok(kid) => kids.push(describe_box(&kid, decode, reg)),
            Err(e) => return (kids, Some(e.to_string())),
        }
    }
    (kids, None)
}

/// Result of a hex dump operation containing the formatted hex output.
#[derive(Debug, Serialize)]
pub struct HexDump {
    /// Starting offset of the dumped data
    pub offset: u64,
    /// Actual number of bytes that were dumped
    pub length: u64,
    /// Formatted hex dump string with addresses and ASCII representation
    pub hex: String,
}

/// Hex-dump a range of an in-memory buffer.
///
/// Never reads past the end; if `offset + max_len` goes beyond the buffer the
/// returned length is smaller than `max_len`, and an offset past the end
/// yields an empty dump.
pub fn hex_range(data: &[u8], offset: u64, max_len: u64) -> HexDump {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
    let available = (data.len() - start) as u64;
    let to_read = available.min(max_len) as usize;

    HexDump {
        offset,
        length: to_read as u64,
        hex: hex_dump(&data[start..start + to_read], offset),
    }
}
