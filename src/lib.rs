//! Decoders for MP4 (ISO-BMFF) box trees and FLV tag streams over in-memory
//! buffers, plus a keyframe index built from the MP4 sample tables.

pub mod amf0;
pub mod api;
pub mod av_headers;
pub mod boxes;
pub mod cursor;
pub mod error;
pub mod flv;
pub mod keyframes;
pub mod known_boxes;
pub mod nal;
pub mod parser;
pub mod registry;
pub mod tables;
pub mod util;

pub use amf0::{Amf0Decoder, Amf0Value, decode_script_data, decode_value};
pub use api::{BoxTree, HexDump, get_boxes, hex_range};
pub use boxes::{BoxHeader, FourCC, Mp4Box};
pub use cursor::ByteCursor;
pub use error::{DecodeError, Result};
pub use flv::{FlvHeader, FlvItem, FlvTag, FlvTagReader, FlvTagType};
pub use keyframes::{KeyframeEntry, build_index, index_keyframes, select_keyframe_track};
pub use parser::{ParseOptions, parse_boxes, parse_children, read_box_header};
pub use registry::{BoxCategory, BoxDecoder, BoxValue, Registry, default_registry};
