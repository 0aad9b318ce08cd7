use crate::boxes::{BoxHeader, FourCC, Mp4Box};
use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Result};

/// Limits applied while walking a box tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Deepest container nesting allowed; top-level boxes are depth 0.
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

fn malformed(offset: usize, reason: impl Into<String>) -> DecodeError {
    DecodeError::MalformedBox {
        offset: offset as u64,
        reason: reason.into(),
    }
}

/// Read the box header at `offset`, validating it against `range_end`.
///
/// `size32 == 1` selects the 64-bit size that follows the type, `size32 == 0`
/// makes the box run to `range_end`, and a `uuid` type carries a 16 byte
/// extended type after the size fields.
pub fn read_box_header(data: &[u8], offset: usize, range_end: usize) -> Result<BoxHeader> {
    if range_end > data.len() || offset > range_end {
        return Err(malformed(offset, "range lies outside the buffer"));
    }
    let cur = ByteCursor::new(&data[..range_end]);
    let avail = cur.remaining(offset);
    if avail < 8 {
        return Err(malformed(
            offset,
            format!("{avail} trailing bytes cannot hold a box header"),
        ));
    }

    let size32 = cur.read_u32(offset)?;
    let typ = FourCC(cur.read_fourcc(offset + 4)?);
    let mut header_size = 8usize;
    let mut size = size32 as u64;

    if size32 == 1 {
        if avail < 16 {
            return Err(malformed(offset, "truncated 64-bit box size"));
        }
        size = cur.read_u64(offset + 8)?;
        header_size = 16;
    }

    let mut uuid = None;
    if &typ.0 == b"uuid" {
        if avail < header_size + 16 {
            return Err(malformed(offset, "truncated uuid extended type"));
        }
        let mut u = [0u8; 16];
        u.copy_from_slice(cur.read_bytes(offset + header_size, 16)?);
        uuid = Some(u);
        header_size += 16;
    }

    let to_end = size32 == 0;
    if to_end {
        size = avail as u64;
    }

    if size < header_size as u64 {
        return Err(malformed(
            offset,
            format!("{typ} size {size} is smaller than its {header_size} byte header"),
        ));
    }
    let size_usize = usize::try_from(size).map_err(|_| DecodeError::MalformedLength)?;
    let end = offset
        .checked_add(size_usize)
        .ok_or(DecodeError::MalformedLength)?;
    if end > range_end {
        return Err(malformed(
            offset,
            format!("{typ} size {size} overruns its enclosing range ending at {range_end}"),
        ));
    }

    Ok(BoxHeader {
        size,
        typ,
        uuid,
        header_size: header_size as u64,
        start: offset as u64,
        to_end,
    })
}

/// Lazy, single-pass walk over the boxes of `[start, end)`.
///
/// Each step advances by the declared box size, never by what a decoder
/// consumed. The first malformed header ends the walk: it is yielded once as
/// an error and the iterator is exhausted afterwards, while the boxes already
/// yielded stay valid.
#[derive(Debug, Clone)]
pub struct BoxIter<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
    depth: usize,
    opts: ParseOptions,
    done: bool,
}

impl<'a> BoxIter<'a> {
    pub fn new(data: &'a [u8], start: usize, end: usize, depth: usize, opts: ParseOptions) -> Self {
        Self {
            data,
            pos: start,
            end,
            depth,
            opts,
            done: false,
        }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = Result<Mp4Box<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.end {
            return None;
        }
        if self.depth > self.opts.max_depth {
            self.done = true;
            return Some(Err(DecodeError::NestingTooDeep {
                max_depth: self.opts.max_depth,
            }));
        }
        match read_box_header(self.data, self.pos, self.end) {
            Ok(hdr) => {
                self.pos = hdr.end() as usize;
                Some(Ok(Mp4Box {
                    hdr,
                    data: self.data,
                    depth: self.depth,
                    opts: self.opts,
                }))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Walk the top-level boxes of a whole buffer.
pub fn parse_boxes(data: &[u8]) -> BoxIter<'_> {
    parse_boxes_with(data, ParseOptions::default())
}

pub fn parse_boxes_with(data: &[u8], opts: ParseOptions) -> BoxIter<'_> {
    BoxIter::new(data, 0, data.len(), 0, opts)
}

/// Walk the boxes of an arbitrary sub-range at the given nesting depth.
pub fn parse_children(
    data: &[u8],
    start: usize,
    end: usize,
    depth: usize,
    opts: ParseOptions,
) -> BoxIter<'_> {
    BoxIter::new(data, start, end.min(data.len()), depth, opts)
}
