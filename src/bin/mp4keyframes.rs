mod common;

use anyhow::Context;
use clap::{ArgAction, Parser};
use mediabox::{keyframes::select_keyframe_track_with, parser::ParseOptions};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(version, about = "List the keyframes of an MP4 file with their times and chunk offsets")]
struct Args {
    /// MP4/ISOBMFF file path
    path: String,

    /// Maximum container nesting
    #[arg(long, default_value_t = 64)]
    max_depth: usize,

    /// Emit JSON instead of a table
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

    let Some(tables) = select_keyframe_track_with(&data, opts)
        .with_context(|| format!("locating sample tables in {}", args.path))?
    else {
        anyhow::bail!("{}: no track has a sync sample table", args.path);
    };
    info!(
        timescale = tables.media_header.timescale.ticks_per_second,
        sync_samples = tables.sync_samples.sample_numbers.len(),
        chunks = tables.chunk_offsets.len(),
        "selected keyframe track"
    );
    debug!(
        stts_runs = tables.time_to_sample.runs.len(),
        stsc_runs = tables.sample_to_chunk.runs.len(),
        wide_offsets = tables.chunk_offsets.wide
    );

    let index = tables.build_index().context("building keyframe index")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&index)?);
        return Ok(());
    }

    println!("{:>8} {:>12} {:>8} {:>14}", "sample", "time (s)", "chunk", "offset");
    for k in &index {
        println!(
            "{:>8} {:>12.3} {:>8} {:>#14x}",
            k.sample_number, k.time_seconds, k.chunk_number, k.byte_offset
        );
    }
    Ok(())
}
