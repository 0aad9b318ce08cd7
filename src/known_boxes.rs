use crate::boxes::FourCC;

/// Typed view over the MP4 / ISOBMFF boxes this crate knows the structure of.
///
/// Anything not in this list becomes `KnownBox::Unknown(fourcc)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownBox {
    // File-level / top-level
    Ftyp,
    Styp,
    Moov,
    Mdat,
    Free,
    Skip,
    Mfra,

    // moov children
    Mvhd,
    Iods,
    Trak,
    Mvex,
    Udta,

    // trak children
    Tkhd,
    Edts,
    Mdia,

    // edts children
    Elst,

    // mdia children
    Mdhd,
    Hdlr,
    Minf,

    // minf children
    Vmhd,
    Smhd,
    Dinf,
    Stbl,

    // dinf children
    Dref,

    // stbl children
    Stsd,
    Stts,
    Ctts,
    Stsc,
    Stsz,
    Stco,
    Co64,
    Stss,
    Subs,

    // fragmented / mvex / moof / traf
    Mehd,
    Trex,
    Moof,
    Mfhd,
    Traf,
    Tfhd,
    Tfdt,
    Trun,

    // Encryption / CENC
    Sinf,
    Frma,
    Schm,
    Schi,
    Tenc,
    Saio,
    Saiz,
    Senc,

    // Sample entries (video)
    Avc1,
    Avc3,
    Hev1,
    Hvc1,
    Encv,

    // Sample entries (audio)
    Mp4a,
    Enca,

    // Sample entry children
    Avcc,
    Hvcc,
    Btrt,
    Ctab,
    Stpp,
    Mime,

    // Raw UUID/vendor
    Uuid,

    // Anything else
    Unknown(FourCC),
}

impl From<FourCC> for KnownBox {
    fn from(cc: FourCC) -> Self {
        match &cc.0 {
            b"ftyp" => KnownBox::Ftyp,
            b"styp" => KnownBox::Styp,
            b"moov" => KnownBox::Moov,
            b"mdat" => KnownBox::Mdat,
            b"free" => KnownBox::Free,
            b"skip" => KnownBox::Skip,
            b"mfra" => KnownBox::Mfra,

            b"mvhd" => KnownBox::Mvhd,
            b"iods" => KnownBox::Iods,
            b"trak" => KnownBox::Trak,
            b"mvex" => KnownBox::Mvex,
            b"udta" => KnownBox::Udta,

            b"tkhd" => KnownBox::Tkhd,
            b"edts" => KnownBox::Edts,
            b"mdia" => KnownBox::Mdia,

            b"elst" => KnownBox::Elst,

            b"mdhd" => KnownBox::Mdhd,
            b"hdlr" => KnownBox::Hdlr,
            b"minf" => KnownBox::Minf,

            b"vmhd" => KnownBox::Vmhd,
            b"smhd" => KnownBox::Smhd,
            b"dinf" => KnownBox::Dinf,
            b"stbl" => KnownBox::Stbl,

            b"dref" => KnownBox::Dref,

            b"stsd" => KnownBox::Stsd,
            b"stts" => KnownBox::Stts,
            b"ctts" => KnownBox::Ctts,
            b"stsc" => KnownBox::Stsc,
            b"stsz" => KnownBox::Stsz,
            b"stco" => KnownBox::Stco,
            b"co64" => KnownBox::Co64,
            b"stss" => KnownBox::Stss,
            b"subs" => KnownBox::Subs,

            b"mehd" => KnownBox::Mehd,
            b"trex" => KnownBox::Trex,
            b"moof" => KnownBox::Moof,
            b"mfhd" => KnownBox::Mfhd,
            b"traf" => KnownBox::Traf,
            b"tfhd" => KnownBox::Tfhd,
            b"tfdt" => KnownBox::Tfdt,
            b"trun" => KnownBox::Trun,

            b"sinf" => KnownBox::Sinf,
            b"frma" => KnownBox::Frma,
            b"schm" => KnownBox::Schm,
            b"schi" => KnownBox::Schi,
            b"tenc" => KnownBox::Tenc,
            b"saio" => KnownBox::Saio,
            b"saiz" => KnownBox::Saiz,
            b"senc" => KnownBox::Senc,

            b"avc1" => KnownBox::Avc1,
            b"avc3" => KnownBox::Avc3,
            b"hev1" => KnownBox::Hev1,
            b"hvc1" => KnownBox::Hvc1,
            b"encv" => KnownBox::Encv,

            b"mp4a" => KnownBox::Mp4a,
            b"enca" => KnownBox::Enca,

            b"avcC" => KnownBox::Avcc,
            b"hvcC" => KnownBox::Hvcc,
            b"btrt" => KnownBox::Btrt,
            b"ctab" => KnownBox::Ctab,
            b"stpp" => KnownBox::Stpp,
            b"mime" => KnownBox::Mime,

            b"uuid" => KnownBox::Uuid,

            _ => KnownBox::Unknown(cc),
        }
    }
}

/// Bytes before the first child of a visual sample entry (SampleEntry +
/// VisualSampleEntry fields).
const VISUAL_SAMPLE_ENTRY_PREFIX: usize = 78;
/// Bytes before the first child of an audio sample entry.
const AUDIO_SAMPLE_ENTRY_PREFIX: usize = 28;
/// version/flags + entry_count.
const STSD_PREFIX: usize = 8;

impl KnownBox {
    /// Does this box *contain* child boxes (container semantics)?
    pub fn is_container(&self) -> bool {
        self.child_offset().is_some()
    }

    /// Offset of the first child box inside the payload, for containers.
    pub fn child_offset(&self) -> Option<usize> {
        match self {
            KnownBox::Moov
            | KnownBox::Trak
            | KnownBox::Mdia
            | KnownBox::Minf
            | KnownBox::Stbl
            | KnownBox::Edts
            | KnownBox::Dinf
            | KnownBox::Udta
            | KnownBox::Moof
            | KnownBox::Mvex
            | KnownBox::Mfra
            | KnownBox::Traf
            | KnownBox::Sinf
            | KnownBox::Schi
            | KnownBox::Ctab => Some(0),
            KnownBox::Stsd => Some(STSD_PREFIX),
            KnownBox::Avc1 | KnownBox::Avc3 | KnownBox::Hev1 | KnownBox::Hvc1 | KnownBox::Encv => {
                Some(VISUAL_SAMPLE_ENTRY_PREFIX)
            }
            KnownBox::Mp4a | KnownBox::Enca => Some(AUDIO_SAMPLE_ENTRY_PREFIX),
            _ => None,
        }
    }

    /// Is this a FullBox (version + flags)?
    pub fn is_full_box(&self) -> bool {
        matches!(
            self,
            KnownBox::Mvhd
                | KnownBox::Iods
                | KnownBox::Tkhd
                | KnownBox::Mdhd
                | KnownBox::Hdlr
                | KnownBox::Vmhd
                | KnownBox::Smhd
                | KnownBox::Dref
                | KnownBox::Stsd
                | KnownBox::Stts
                | KnownBox::Ctts
                | KnownBox::Stsc
                | KnownBox::Stsz
                | KnownBox::Stco
                | KnownBox::Co64
                | KnownBox::Stss
                | KnownBox::Subs
                | KnownBox::Elst
                | KnownBox::Mehd
                | KnownBox::Trex
                | KnownBox::Mfhd
                | KnownBox::Tfhd
                | KnownBox::Tfdt
                | KnownBox::Trun
                | KnownBox::Schm
                | KnownBox::Tenc
                | KnownBox::Saio
                | KnownBox::Saiz
                | KnownBox::Senc
        )
    }

    /// Is this a sample entry of a video track?
    pub fn is_visual_sample_entry(&self) -> bool {
        matches!(
            self,
            KnownBox::Avc1 | KnownBox::Avc3 | KnownBox::Hev1 | KnownBox::Hvc1 | KnownBox::Encv
        )
    }
}
