mod common;

use anyhow::Context;
use clap::{ArgAction, Parser};
use mediabox::{
    api::describe_box,
    boxes::{BoxHeader, FourCC, Mp4Box},
    nal::scan_mdat,
    parser::{ParseOptions, parse_boxes_with},
    registry::{BoxCategory, BoxValue, Registry, default_registry},
    util::{hex_dump_truncated, uuid_hex},
};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(version, about = "MP4/ISOBMFF box explorer")]
struct Args {
    /// MP4/ISOBMFF file path
    path: String,

    /// Only print subtree(s) matching a dotted path (e.g. moov.trak[0].mdia.minf.stbl)
    #[arg(long = "filter")]
    filter: Option<String>,

    /// Dump raw payload of this 4CC (e.g. --raw stsd) or uuid:xxxxxxxx...
    #[arg(long = "raw")]
    raw: Option<String>,

    /// Maximum container nesting
    #[arg(long, default_value_t = 64)]
    max_depth: usize,

    /// Print structured values when a decoder exists
    #[arg(long, action = ArgAction::SetTrue)]
    decode: bool,

    /// Bytes to show when dumping raw payloads (0 means the entire payload)
    #[arg(long, default_value_t = 0)]
    limit: usize,

    /// Classify the NAL units stored in mdat
    #[arg(long, action = ArgAction::SetTrue)]
    nal: bool,

    /// Emit JSON instead of a human-readable tree
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    common::init_logging(args.verbose);

    let data = std::fs::read(&args.path).with_context(|| format!("reading {}", args.path))?;
    let opts = ParseOptions {
        max_depth: args.max_depth,
    };
    let reg = default_registry();

    let mut top = Vec::new();
    for b in parse_boxes_with(&data, opts) {
        match b {
            Ok(b) => top.push(b),
            Err(e) => {
                warn!("top-level walk stopped: {e}");
                break;
            }
        }
    }

    // Target roots for printing/JSON
    let targets = match &args.filter {
        Some(path) => select_by_path(&top, path)?,
        None => top.clone(),
    };

    // JSON mode: output JSON and exit (no tree or raw to keep output clean)
    if args.json {
        let json_boxes: Vec<_> = targets
            .iter()
            .map(|b| describe_box(b, args.decode, &reg))
            .collect();
        println!("{}", serde_json::to_string_pretty(&json_boxes)?);
        return Ok(());
    }

    for b in &targets {
        print_box(b, 0, args.decode, &reg);
    }

    if let Some(sel) = args.raw.as_ref() {
        dump_raw(&top, sel, args.limit);
    }

    if args.nal {
        let units = scan_mdat(&data, opts).context("scanning mdat NAL units")?;
        println!("\n== {} NAL units ==", units.len());
        for u in units {
            println!("{:#10x} {:>8} {:?}", u.offset, u.length, u.header);
        }
    }

    Ok(())
}

// ---------- Human-readable tree ----------

fn print_box(b: &Mp4Box<'_>, depth: usize, decode: bool, reg: &Registry) {
    let indent = "  ".repeat(depth);
    let hdr = &b.hdr;
    let category = reg.classify(hdr.typ);
    let note = match category {
        BoxCategory::Container { .. } => " (container)",
        BoxCategory::Leaf(_) | BoxCategory::Opaque => "",
    };
    println!(
        "{indent}{:>8} {:>10} {}{note}",
        format!("{:#x}", hdr.start),
        hdr.size,
        display_type(hdr),
    );

    if decode {
        match reg.decode(b) {
            Some(Ok(BoxValue::Structured(data))) => println!("{indent}  -> {:?}", data),
            Some(Ok(BoxValue::Bytes(bytes))) => println!("{indent}  -> {} bytes", bytes.len()),
            Some(Err(e)) => {
                warn!("{} at {:#x}: {e:#}", hdr.typ, hdr.start);
                println!("{indent}  -> [decode error: {e:#}]");
            }
            None => {}
        }
    }

    if let BoxCategory::Container { .. } = category {
        let kids = match b.children() {
            Ok(kids) => kids,
            Err(e) => {
                warn!("{} at {:#x}: {e}", hdr.typ, hdr.start);
                return;
            }
        };
        for kid in kids {
            match kid {
                Ok(kid) => print_box(&kid, depth + 1, decode, reg),
                Err(e) => {
                    warn!("children of {} at {:#x} cut short: {e}", hdr.typ, hdr.start);
                    println!("{indent}  [error: {e}]");
                }
            }
        }
    }
}

fn display_type(h: &BoxHeader) -> String {
    match &h.uuid {
        Some(u) => format!("uuid:{}", uuid_hex(u)),
        None => h.typ.to_string(),
    }
}

// ---------- Raw dump ----------

fn dump_raw(boxes: &[Mp4Box<'_>], sel: &str, limit: usize) {
    let mut matches = Vec::new();
    select_boxes(boxes, sel, &mut matches);
    for (i, b) in matches.iter().enumerate() {
        let payload = b.payload();
        let shown = if limit == 0 { payload.len() } else { limit };
        println!(
            "\n== Dump {} ({}) payload: offset={:#x}, len={} ==",
            i,
            display_type(&b.hdr),
            b.hdr.payload_offset(),
            payload.len()
        );
        print!("{}", hex_dump_truncated(payload, b.hdr.payload_offset(), shown));
    }
}

fn select_boxes<'a>(list: &[Mp4Box<'a>], sel: &str, out: &mut Vec<Mp4Box<'a>>) {
    for b in list {
        let matches_sel = match (&b.hdr.uuid, sel.strip_prefix("uuid:")) {
            (Some(u), Some(prefix)) => uuid_hex(u).starts_with(&prefix.to_ascii_lowercase()),
            (None, None) => FourCC::from_str(sel) == Some(b.hdr.typ),
            _ => false,
        };
        if matches_sel {
            out.push(b.clone());
        }

        // malformed subtrees were already reported by the tree walk
        if let Ok(kids) = b.children() {
            let kids: Vec<_> = kids.filter_map(Result::ok).collect();
            select_boxes(&kids, sel, out);
        }
    }
}

// ---------- Filter path: moov.trak[0].mdia.minf.stbl ----------

fn select_by_path<'a>(roots: &[Mp4Box<'a>], path: &str) -> anyhow::Result<Vec<Mp4Box<'a>>> {
    let mut current: Vec<Mp4Box<'a>> = Vec::new();

    for (depth, seg) in path.split('.').enumerate() {
        let (name, idx) = parse_segment(seg);
        let fourcc = FourCC::from_str(name)
            .with_context(|| format!("path segment {seg:?} is not a four character code"))?;

        // candidates: top level for the first segment, children afterwards
        let mut candidates = Vec::new();
        if depth == 0 {
            candidates.extend(roots.iter().cloned());
        } else {
            for b in &current {
                for kid in b.children()? {
                    candidates.push(kid?);
                }
            }
        }

        let matches: Vec<_> = candidates
            .into_iter()
            .filter(|b| b.hdr.typ == fourcc)
            .collect();
        current = match idx {
            Some(i) => matches.into_iter().nth(i).into_iter().collect(),
            None => matches,
        };
        if current.is_empty() {
            break;
        }
    }

    Ok(current)
}

fn parse_segment(seg: &str) -> (&str, Option<usize>) {
    if let Some(l) = seg.find('[') {
        let name = &seg[..l];
        if let Some(r) = seg[l + 1..].find(']') {
            let idx_str = &seg[l + 1..l + 1 + r];
            let idx = idx_str.parse::<usize>().ok();
            return (name, idx);
        }
        (name, None)
    } else {
        (seg, None)
    }
}
