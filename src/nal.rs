//! NAL unit type classification for `mdat` payloads.
//!
//! Samples in MP4 store NAL units with a 4 byte big-endian length prefix.
//! Only the NAL header is looked at; nothing past it is parsed.

use crate::boxes::Mp4Box;
use crate::cursor::ByteCursor;
use crate::error::Result;
use crate::parser::{ParseOptions, parse_boxes_with};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NalCodec {
    H264,
    Hevc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum H264NalType {
    NonIdrSlice,
    SliceDataPartitionA,
    SliceDataPartitionB,
    SliceDataPartitionC,
    IdrSlice,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    EndOfSequence,
    EndOfStream,
    Filler,
    SpsExtension,
    AuxiliarySlice,
    Unknown,
}

impl From<u8> for H264NalType {
    fn from(t: u8) -> Self {
        match t {
            1 => Self::NonIdrSlice,
            2 => Self::SliceDataPartitionA,
            3 => Self::SliceDataPartitionB,
            4 => Self::SliceDataPartitionC,
            5 => Self::IdrSlice,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::AccessUnitDelimiter,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::Filler,
            13 => Self::SpsExtension,
            19 => Self::AuxiliarySlice,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HevcNalType {
    /// TRAIL_N / TRAIL_R
    Slice,
    /// TSA_N / TSA_R
    TsaSlice,
    RaslN,
    RaslR,
    /// IDR_W_RADL / IDR_N_LP
    Idr,
    Vps,
    Sps,
    Pps,
    AccessUnitDelimiter,
    /// prefix or suffix SEI
    Sei,
    Undefined,
}

impl From<u8> for HevcNalType {
    fn from(t: u8) -> Self {
        match t {
            0 | 1 => Self::Slice,
            2 | 3 => Self::TsaSlice,
            8 => Self::RaslN,
            9 => Self::RaslR,
            19 | 20 => Self::Idr,
            32 => Self::Vps,
            33 => Self::Sps,
            34 => Self::Pps,
            35 => Self::AccessUnitDelimiter,
            39 | 40 => Self::Sei,
            _ => Self::Undefined,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NalHeader {
    H264 {
        nal_ref_idc: u8,
        nal_unit_type: u8,
        kind: H264NalType,
    },
    Hevc {
        nal_unit_type: u8,
        nuh_layer_id: u8,
        nuh_temporal_id_plus1: u8,
        kind: HevcNalType,
    },
}

impl NalHeader {
    pub fn parse(unit: &[u8], codec: NalCodec) -> Result<Self> {
        let cur = ByteCursor::new(unit);
        match codec {
            NalCodec::H264 => {
                let b = cur.read_u8(0)?;
                let nal_unit_type = b & 0x1F;
                Ok(NalHeader::H264 {
                    nal_ref_idc: (b >> 5) & 0x3,
                    nal_unit_type,
                    kind: H264NalType::from(nal_unit_type),
                })
            }
            NalCodec::Hevc => {
                let h = cur.read_u16(0)?;
                let nal_unit_type = ((h >> 9) & 0x3F) as u8;
                Ok(NalHeader::Hevc {
                    nal_unit_type,
                    nuh_layer_id: ((h >> 3) & 0x3F) as u8,
                    nuh_temporal_id_plus1: (h & 0x7) as u8,
                    kind: HevcNalType::from(nal_unit_type),
                })
            }
        }
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(
            self,
            NalHeader::H264 {
                kind: H264NalType::Sps | H264NalType::Pps,
                ..
            } | NalHeader::Hevc {
                kind: HevcNalType::Vps | HevcNalType::Sps | HevcNalType::Pps,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NalUnit {
    /// Absolute offset of the unit, just past its length prefix.
    pub offset: usize,
    pub length: u32,
    pub header: NalHeader,
}

/// Split a length-prefixed payload into NAL units and classify each one.
///
/// `base_offset` is the absolute offset of `payload` in the file. A length
/// that runs past the payload fails with `OutOfBounds`.
pub fn scan_nal_units(payload: &[u8], codec: NalCodec, base_offset: usize) -> Result<Vec<NalUnit>> {
    let cur = ByteCursor::new(payload);
    let mut units = Vec::new();
    let mut pos = 0;

    while pos < payload.len() {
        let length = cur.read_u32(pos)?;
        let unit = cur.read_bytes(pos + 4, length as usize)?;
        units.push(NalUnit {
            offset: base_offset + pos + 4,
            length,
            header: NalHeader::parse(unit, codec)?,
        });
        pos += 4 + length as usize;
    }
    Ok(units)
}

/// Pick the codec from the decoder configuration boxes of the movie.
///
/// An `avcC` anywhere under `moov` selects H.264, an `hvcC` selects HEVC.
/// Without either, HEVC is assumed.
pub fn detect_codec(moov: &Mp4Box<'_>) -> Result<NalCodec> {
    Ok(find_config(moov)?.unwrap_or(NalCodec::Hevc))
}

/// NAL units of every top-level `mdat` in file order, classified with the
/// codec picked by [`detect_codec`].
pub fn scan_mdat(data: &[u8], opts: ParseOptions) -> Result<Vec<NalUnit>> {
    let mut codec = NalCodec::Hevc;
    let mut mdats = Vec::new();
    for b in parse_boxes_with(data, opts) {
        let b = b?;
        match &b.hdr.typ.0 {
            b"moov" => codec = detect_codec(&b)?,
            b"mdat" => mdats.push(b),
            _ => {}
        }
    }

    let mut units = Vec::new();
    for mdat in mdats {
        units.extend(scan_nal_units(
            mdat.payload(),
            codec,
            mdat.hdr.payload_offset() as usize,
        )?);
    }
    Ok(units)
}

fn find_config(b: &Mp4Box<'_>) -> Result<Option<NalCodec>> {
    for kid in b.children()? {
        let kid = kid?;
        match &kid.hdr.typ.0 {
            b"avcC" => return Ok(Some(NalCodec::H264)),
            b"hvcC" => return Ok(Some(NalCodec::Hevc)),
            _ => {}
        }
        if let Some(codec) = find_config(&kid)? {
            return Ok(Some(codec));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    #[test]
    fn test_h264_units() {
        let mut data = Vec::new();
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&[0x67, 0x42]); // SPS
        data.extend_from_slice(&1u32.to_be_bytes());
        data.push(0x65); // IDR, nal_ref_idc 3

        let units = scan_nal_units(&data, NalCodec::H264, 100).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].offset, 104);
        assert!(units[0].header.is_parameter_set());
        assert_eq!(
            units[1].header,
            NalHeader::H264 {
                nal_ref_idc: 3,
                nal_unit_type: 5,
                kind: H264NalType::IdrSlice
            }
        );
    }

    #[test]
    fn test_hevc_header_fields() {
        // IDR_W_RADL, layer 0, temporal id plus1 = 1
        let h = NalHeader::parse(&[0x26, 0x01], NalCodec::Hevc).unwrap();
        assert_eq!(
            h,
            NalHeader::Hevc {
                nal_unit_type: 19,
                nuh_layer_id: 0,
                nuh_temporal_id_plus1: 1,
                kind: HevcNalType::Idr
            }
        );
        // VPS with temporal id plus1 = 4 needs all three bits
        let h = NalHeader::parse(&[0x40, 0x04], NalCodec::Hevc).unwrap();
        assert!(matches!(
            h,
            NalHeader::Hevc {
                kind: HevcNalType::Vps,
                nuh_temporal_id_plus1: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_length_past_payload() {
        let mut data = Vec::new();
        data.extend_from_slice(&10u32.to_be_bytes());
        data.extend_from_slice(&[0x65, 0x00]);
        assert!(matches!(
            scan_nal_units(&data, NalCodec::H264, 0),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }

    fn bx(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut v = (8 + payload.len() as u32).to_be_bytes().to_vec();
        v.extend_from_slice(typ);
        v.extend_from_slice(payload);
        v
    }

    fn movie_with_config(config: &[u8; 4]) -> Vec<u8> {
        let mut avc1 = vec![0u8; 78];
        avc1.extend(bx(config, &[1]));
        let mut stsd = vec![0, 0, 0, 0, 0, 0, 0, 1];
        stsd.extend(bx(b"avc1", &avc1));
        let stbl = bx(b"stbl", &bx(b"stsd", &stsd));
        let mdia = bx(b"mdia", &bx(b"minf", &stbl));
        bx(b"moov", &bx(b"trak", &mdia))
    }

    #[test]
    fn test_scan_mdat_uses_movie_codec() {
        let mut units = 1u32.to_be_bytes().to_vec();
        units.push(0x65);
        let mut data = movie_with_config(b"avcC");
        data.extend(bx(b"mdat", &units));
        data.extend(bx(b"free", &[]));
        let second = data.len();
        data.extend(bx(b"mdat", &units));

        let found = scan_mdat(&data, ParseOptions::default()).unwrap();
        assert_eq!(found.len(), 2);
        assert!(matches!(
            found[0].header,
            NalHeader::H264 {
                kind: H264NalType::IdrSlice,
                ..
            }
        ));
        // box header, then the length prefix
        assert_eq!(found[1].offset, second + 8 + 4);
    }

    #[test]
    fn test_codec_from_config_box() {
        let data = movie_with_config(b"hvcC");
        let moov = parse_boxes_with(&data, ParseOptions::default())
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(detect_codec(&moov).unwrap(), NalCodec::Hevc);

        let data = movie_with_config(b"btrt");
        let moov = parse_boxes_with(&data, ParseOptions::default())
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(detect_codec(&moov).unwrap(), NalCodec::Hevc);

        let data = movie_with_config(b"avcC");
        let moov = parse_boxes_with(&data, ParseOptions::default())
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(detect_codec(&moov).unwrap(), NalCodec::H264);
    }
}
