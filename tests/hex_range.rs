use mediabox::hex_range;

#[test]
fn hex_range_reads_within_bounds() {
    let data = (0u8..64u8).collect::<Vec<_>>();

    let dump = hex_range(&data, 16, 16);

    assert_eq!(dump.offset, 16);
    assert_eq!(dump.length, 16);
    // addresses follow the requested offset
    assert!(dump.hex.starts_with("00000010  10 11 12"));
}

#[test]
fn hex_range_clamps_to_end() {
    let data = (0u8..32u8).collect::<Vec<_>>();

    // ask past the end
    let dump = hex_range(&data, 24, 32);

    // we only have 8 bytes from 24..32
    assert_eq!(dump.offset, 24);
    assert_eq!(dump.length, 8);
    assert_eq!(dump.hex.lines().count(), 1);
}

#[test]
fn hex_range_past_end_is_empty() {
    let data = [0u8; 8];
    let dump = hex_range(&data, 100, 16);
    assert_eq!(dump.length, 0);
    assert!(dump.hex.is_empty());
}
