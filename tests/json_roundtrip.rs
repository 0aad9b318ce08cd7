use mediabox::get_boxes;
use serde_json::{self, Value};

/// [ftyp] [free] [mdat]
///
/// These are all leaf boxes so we don't need valid nested structures.
fn make_minimal_mp4() -> Vec<u8> {
    let mut data = Vec::new();

    // ftyp: size=20, major brand, minor version, one compatible brand
    data.extend_from_slice(&20u32.to_be_bytes());
    data.extend_from_slice(b"ftyp");
    data.extend_from_slice(b"isom");
    data.extend_from_slice(&512u32.to_be_bytes());
    data.extend_from_slice(b"isom");

    // free: size=8, no payload
    data.extend_from_slice(&8u32.to_be_bytes());
    data.extend_from_slice(b"free");

    // mdat: size=16, 8 bytes payload
    data.extend_from_slice(&16u32.to_be_bytes());
    data.extend_from_slice(b"mdat");
    data.extend_from_slice(&[0u8; 8]);
    data
}

#[test]
fn analyze_and_serialize_to_json() {
    let data = make_minimal_mp4();

    let tree = get_boxes(&data, false);
    assert!(tree.error.is_none());
    assert_eq!(tree.boxes.len(), 3);
    assert_eq!(tree.boxes[0].typ, "ftyp");

    // ftyp: size 20, header 8, payload 12
    assert_eq!(tree.boxes[0].size, 20);
    assert_eq!(tree.boxes[0].header_size, 8);
    assert_eq!(tree.boxes[0].payload_size, 12);
    assert_eq!(tree.boxes[2].offset, 28);
    assert_eq!(tree.boxes[2].kind, "opaque");

    let json_str = serde_json::to_string(&tree).expect("serialize to JSON failed");
    let v: Value = serde_json::from_str(&json_str).expect("parse JSON failed");

    let first = &v["boxes"][0];
    assert_eq!(first["typ"], "ftyp");
    assert_eq!(first["header_size"], 8);
    assert_eq!(first["payload_offset"], 8);
    assert_eq!(first["kind"], "leaf");
    // nothing decoded unless asked
    assert!(first["decoded"].is_null());
    assert!(v["error"].is_null());
}

#[test]
fn decoded_values_are_serialized() {
    let data = make_minimal_mp4();
    let tree = get_boxes(&data, true);

    let v = serde_json::to_value(&tree).unwrap();
    let ftyp = &v["boxes"][0]["decoded"]["FileType"];
    assert_eq!(ftyp["major_brand"], "isom");
    assert_eq!(ftyp["minor_version"], 512);
    assert_eq!(ftyp["compatible_brands"][0], "isom");
}

#[test]
fn nested_boxes_and_full_box_fields() {
    // moov > trak > tkhd (version 0, flags 3, truncated body)
    let mut tkhd = Vec::new();
    tkhd.extend_from_slice(&16u32.to_be_bytes());
    tkhd.extend_from_slice(b"tkhd");
    tkhd.extend_from_slice(&[0, 0, 0, 3]);
    tkhd.extend_from_slice(&[0; 4]);

    let mut trak = (8 + tkhd.len() as u32).to_be_bytes().to_vec();
    trak.extend_from_slice(b"trak");
    trak.extend(tkhd);
    let mut moov = (8 + trak.len() as u32).to_be_bytes().to_vec();
    moov.extend_from_slice(b"moov");
    moov.extend(trak);

    let tree = get_boxes(&moov, true);
    let moov = &tree.boxes[0];
    assert_eq!(moov.kind, "container");
    let trak = &moov.children.as_ref().unwrap()[0];
    let tkhd = &trak.children.as_ref().unwrap()[0];
    assert_eq!(tkhd.typ, "tkhd");
    assert_eq!(tkhd.version, Some(0));
    assert_eq!(tkhd.flags, Some(3));
    // the decoder fails on the short body; the box itself is still listed
    assert!(tkhd.decoded.is_none());
    assert!(tkhd.error.is_some());
    assert!(trak.error.is_none());
}

#[test]
fn malformed_child_is_recorded_on_parent() {
    // moov holds a valid free box, then a child claiming more than is left
    let mut data = Vec::new();
    data.extend_from_slice(&28u32.to_be_bytes());
    data.extend_from_slice(b"moov");
    data.extend_from_slice(&8u32.to_be_bytes());
    data.extend_from_slice(b"free");
    data.extend_from_slice(&64u32.to_be_bytes());
    data.extend_from_slice(b"trak");
    data.extend_from_slice(&[0; 4]);
    // a sibling after moov is still reached
    data.extend_from_slice(&8u32.to_be_bytes());
    data.extend_from_slice(b"free");

    let tree = get_boxes(&data, false);
    assert!(tree.error.is_none());
    assert_eq!(tree.boxes.len(), 2);
    let moov = &tree.boxes[0];
    assert_eq!(moov.children.as_ref().unwrap().len(), 1);
    assert!(moov.error.as_ref().unwrap().contains("offset 16"));
}

#[test]
fn malformed_top_level_box_is_recorded_on_tree() {
    let mut data = make_minimal_mp4();
    data.extend_from_slice(&3u32.to_be_bytes());
    data.extend_from_slice(b"free");

    let tree = get_boxes(&data, false);
    assert_eq!(tree.boxes.len(), 3);
    assert!(tree.error.is_some());
}
