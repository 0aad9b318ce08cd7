/// Classic 16-bytes-per-line hex dump with an ASCII column.
///
/// `start_offset` is the address printed for the first byte.
pub fn hex_dump(bytes: &[u8], start_offset: u64) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let offs = start_offset + (i as u64) * 16;
        let hexs: String = chunk.iter().map(|b| format!("{:02x} ", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}  {:<48}  |{}|\n", offs, hexs, ascii));
    }
    out
}

/// Hex dump of at most `limit` bytes, noting how many were left out.
pub fn hex_dump_truncated(bytes: &[u8], start_offset: u64, limit: usize) -> String {
    if bytes.len() <= limit {
        return hex_dump(bytes, start_offset);
    }
    let mut out = hex_dump(&bytes[..limit], start_offset);
    out.push_str(&format!("... {} more bytes\n", bytes.len() - limit));
    out
}

/// Lowercase hex of a `uuid` box extended type.
pub fn uuid_hex(uuid: &[u8; 16]) -> String {
    hex::encode(uuid)
}
