use crate::error::{DecodeError, Result};
use crate::known_boxes::KnownBox;
use crate::parser::{BoxIter, ParseOptions};
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub fn from_str(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() == 4 {
            Some(FourCC([b[0], b[1], b[2], b[3]]))
        } else {
            None
        }
    }
    pub fn as_str_lossy(&self) -> String {
        self.0
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect()
    }
}
impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}
impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}
impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.as_str_lossy())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxHeader {
    pub size: u64,          // total size including header, resolved when the box runs to range end
    pub typ: FourCC,        // 4CC or b"uuid"
    pub uuid: Option<[u8; 16]>,
    pub header_size: u64,   // 8, 16, 24 or 32
    pub start: u64,         // absolute offset of header start
    pub to_end: bool,       // declared size was 0
}

impl BoxHeader {
    pub fn payload_offset(&self) -> u64 {
        self.start + self.header_size
    }

    pub fn end(&self) -> u64 {
        self.start + self.size
    }
}

/// One box of the tree: its header plus a view of its payload.
///
/// The payload range is always `[start + header_size, start + size)`.
/// Children are not parsed until [`Mp4Box::children`] is called.
#[derive(Debug, Clone)]
pub struct Mp4Box<'a> {
    pub hdr: BoxHeader,
    pub(crate) data: &'a [u8],
    pub(crate) depth: usize,
    pub(crate) opts: ParseOptions,
}

impl<'a> Mp4Box<'a> {
    pub fn typ(&self) -> FourCC {
        self.hdr.typ
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn payload(&self) -> &'a [u8] {
        // Range was validated against the buffer when the header was read.
        &self.data[self.hdr.payload_offset() as usize..self.hdr.end() as usize]
    }

    pub fn is_container(&self) -> bool {
        KnownBox::from(self.hdr.typ).child_offset().is_some()
    }

    /// Lazily walk the child boxes of a container.
    ///
    /// Leaves yield an empty iterator. Containers with a fixed prefix
    /// (e.g. `stsd`, sample entries) start their children after it.
    pub fn children(&self) -> Result<BoxIter<'a>> {
        let start = self.hdr.payload_offset() as usize;
        let end = self.hdr.end() as usize;
        let Some(skip) = KnownBox::from(self.hdr.typ).child_offset() else {
            return Ok(BoxIter::new(self.data, end, end, self.depth + 1, self.opts));
        };
        if skip > end - start {
            return Err(DecodeError::MalformedBox {
                offset: self.hdr.start,
                reason: format!(
                    "{} payload of {} bytes is shorter than its {} byte prefix",
                    self.hdr.typ,
                    end - start,
                    skip
                ),
            });
        }
        Ok(BoxIter::new(
            self.data,
            start + skip,
            end,
            self.depth + 1,
            self.opts,
        ))
    }

    /// First direct child of the given type.
    pub fn child(&self, typ: &[u8; 4]) -> Result<Option<Mp4Box<'a>>> {
        for kid in self.children()? {
            let kid = kid?;
            if &kid.hdr.typ.0 == typ {
                return Ok(Some(kid));
            }
        }
        Ok(None)
    }

    /// Follow a chain of direct children, e.g. `[b"mdia", b"minf", b"stbl"]`.
    pub fn descend(&self, path: &[&[u8; 4]]) -> Result<Option<Mp4Box<'a>>> {
        let mut cur = self.clone();
        for typ in path {
            match cur.child(typ)? {
                Some(next) => cur = next,
                None => return Ok(None),
            }
        }
        Ok(Some(cur))
    }
}
