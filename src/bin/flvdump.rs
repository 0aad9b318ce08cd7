mod common;

use anyhow::Context;
use clap::{ArgAction, Parser};
use mediabox::{
    amf0::{Amf0Value, decode_script_data_with},
    av_headers::{AudioTagHeader, VideoTagHeader},
    flv::{FlvHeader, FlvItem, FlvTag, FlvTagReader, FlvTagType},
    util::hex_dump_truncated,
};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(version, about = "FLV tag stream explorer")]
struct Args {
    /// FLV file path
    path: String,

    /// Stop after this many tags
    #[arg(long)]
    limit: Option<usize>,

    /// Maximum AMF0 nesting in script-data tags
    #[arg(long, default_value_t = 64)]
    max_depth: usize,

    /// Hex dump this many bytes of each audio/video payload
    #[arg(long, default_value_t = 0)]
    raw: usize,

    /// Emit JSON instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum TagBody {
    Script(Vec<Amf0Value>),
    Audio(AudioTagHeader),
    Video(VideoTagHeader),
    Error(String),
}

#[derive(Serialize)]
struct TagReport<'a> {
    #[serde(flatten)]
    tag: FlvTag<'a>,
    body: TagBody,
}

#[derive(Serialize)]
struct FlvReport<'a> {
    header: FlvHeader,
    tags: Vec<TagReport<'a>>,
    /// The previous-tag-size field closing the stream, if present
    trailing_tag_size: Option<u32>,
    /// The failure that ended the scan early
    error: Option<String>,
}

fn decode_body(tag: &FlvTag<'_>, max_depth: usize) -> TagBody {
    let body = match tag.tag_type {
        FlvTagType::ScriptData => decode_script_data_with(tag.payload, max_depth).map(TagBody::Script),
        FlvTagType::Audio => AudioTagHeader::parse(tag.payload).map(TagBody::Audio),
        FlvTagType::Video => VideoTagHeader::parse(tag.payload).map(TagBody::Video),
    };
    body.unwrap_or_else(|e| {
        warn!("{} tag at {:#x}: {e}", tag.tag_type, tag.offset);
        TagBody::Error(e.to_string())
    })
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    common::init_logging(args.verbose);

    let data = std::fs::read(&args.path).with_context(|| format!("reading {}", args.path))?;
    let header = FlvHeader::parse(&data).with_context(|| format!("{} is not an FLV file", args.path))?;
    debug!(%header, "parsed FLV header");

    let mut reader = FlvTagReader::new(&data, &header);
    let mut report = FlvReport {
        header,
        tags: Vec::new(),
        trailing_tag_size: None,
        error: None,
    };

    while args.limit.is_none_or(|n| report.tags.len() < n) {
        match reader.next_tag() {
            Ok(FlvItem::Tag(tag)) => {
                let body = decode_body(&tag, args.max_depth);
                report.tags.push(TagReport { tag, body });
            }
            Ok(FlvItem::EndOfStream { previous_tag_size }) => {
                report.trailing_tag_size = previous_tag_size;
                break;
            }
            Err(e) => {
                warn!("tag scan stopped at {:#x}: {e}", reader.position());
                report.error = Some(e.to_string());
                break;
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", report.header);
    for t in &report.tags {
        let tag = &t.tag;
        println!(
            "{:#10x} {:<6} size={:<7} ts={:<9} prev={}{}",
            tag.offset,
            tag.tag_type.to_string(),
            tag.data_size,
            tag.timestamp,
            tag.previous_tag_size,
            if tag.filtered { " filtered" } else { "" }
        );
        match &t.body {
            TagBody::Script(values) => {
                for v in values {
                    print_amf0(v, 1, None);
                }
            }
            TagBody::Audio(a) => println!(
                "    format={} rate={}Hz size={} type={} aac_packet={:?}",
                a.sound_format,
                a.sample_rate_hz(),
                a.sound_size,
                a.sound_type,
                a.aac_packet_type
            ),
            TagBody::Video(v) => println!(
                "    frame={} codec={} packet={:?} cts={:?}",
                v.frame_type, v.codec_id, v.packet_type, v.composition_time
            ),
            TagBody::Error(e) => println!("    [error: {e}]"),
        }
        if args.raw > 0 && tag.tag_type != FlvTagType::ScriptData {
            print!(
                "{}",
                hex_dump_truncated(tag.payload, tag.payload_offset() as u64, args.raw)
            );
        }
    }
    if let Some(e) = &report.error {
        println!("[error: {e}]");
    }
    Ok(())
}

fn print_amf0(v: &Amf0Value, depth: usize, name: Option<&str>) {
    let indent = "    ".repeat(depth);
    let label = name.map(|n| format!("{n}: ")).unwrap_or_default();
    match v {
        Amf0Value::Object(props) | Amf0Value::EcmaArray(props) => {
            println!("{indent}{label}{:?} ({} properties)", v.marker(), props.len());
            for (k, val) in props {
                print_amf0(val, depth + 1, Some(k));
            }
        }
        Amf0Value::StrictArray(items) => {
            println!("{indent}{label}StrictArray ({} items)", items.len());
            for val in items {
                print_amf0(val, depth + 1, None);
            }
        }
        Amf0Value::Number(n) => println!("{indent}{label}{n}"),
        Amf0Value::Boolean(b) => println!("{indent}{label}{b}"),
        Amf0Value::String(s) | Amf0Value::LongString(s) => println!("{indent}{label}{s:?}"),
        other => println!("{indent}{label}{other:?}"),
    }
}
