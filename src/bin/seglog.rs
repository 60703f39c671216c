/// seglog: operator CLI for segment directories
///
/// Commands:
/// - append <values..>   append UTF-8 values, stop early if the segment fills
/// - read <offset>       print one record
/// - dump                print every record, one JSON document per line
/// - stat                print offsets, sizes and capacity state
/// - segments            list base offsets of segments found in --dir
///
/// All output is JSON for script-friendly parsing. Logs go to stderr and
/// are filtered with RUST_LOG (default: warn).
use anyhow::Context;
use clap::{Parser, Subcommand};
use seglog::config::Config;
use seglog::record::Record;
use seglog::storage::segment::{Segment, STORE_EXTENSION};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "seglog", version, about = "Inspect and append to seglog segments")]
struct Cli {
    /// Directory holding `<base>.store` / `<base>.index` files
    #[arg(long)]
    dir: PathBuf,

    /// Base offset of the segment to open
    #[arg(long, default_value_t = 0)]
    base: u64,

    /// Store rollover threshold in bytes
    #[arg(long)]
    max_store_bytes: Option<u64>,

    /// Index capacity in bytes (12 bytes per record)
    #[arg(long)]
    max_index_bytes: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Segment(SegmentCommand),
    /// List segments in the directory
    Segments,
}

/// Commands that operate on the single segment at `--base`.
#[derive(Subcommand, Debug)]
enum SegmentCommand {
    /// Append values to the segment
    Append {
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Read the record at a global offset
    Read { offset: u64 },
    /// Print every record in the segment
    Dump,
    /// Print segment offsets and sizes
    Stat,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::default();
    if let Some(bytes) = cli.max_store_bytes {
        config.segment.max_store_bytes = bytes;
    }
    if let Some(bytes) = cli.max_index_bytes {
        config.segment.max_index_bytes = bytes;
    }

    std::fs::create_dir_all(&cli.dir)
        .with_context(|| format!("failed to create {}", cli.dir.display()))?;

    match cli.command {
        Command::Segments => {
            let bases = list_segments(&cli.dir)?;
            println!("{}", serde_json::to_string_pretty(&json!({ "segments": bases }))?);
            Ok(())
        }
        Command::Segment(command) => run_on_segment(&cli.dir, cli.base, config, command),
    }
}

fn run_on_segment(
    dir: &Path,
    base: u64,
    config: Config,
    command: SegmentCommand,
) -> anyhow::Result<()> {
    let mut segment = Segment::open(dir, base, config)
        .with_context(|| format!("failed to open segment {} in {}", base, dir.display()))?;

    match command {
        SegmentCommand::Append { values } => {
            let mut offsets = Vec::with_capacity(values.len());
            let mut full = false;

            for value in values {
                match segment.append(&mut Record::new(value)) {
                    Ok(offset) => offsets.push(offset),
                    Err(e) if e.is_end_of_data() => {
                        full = true;
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
                if segment.is_maxed() {
                    full = true;
                    break;
                }
            }

            let output = json!({
                "offsets": offsets,
                "next_offset": segment.next_offset(),
                "maxed": full,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        SegmentCommand::Read { offset } => {
            let record = segment
                .read(offset)
                .with_context(|| format!("failed to read offset {}", offset))?;
            println!("{}", serde_json::to_string_pretty(&record_json(&record))?);
        }
        SegmentCommand::Dump => {
            for offset in segment.base_offset()..segment.next_offset() {
                let record = segment.read(offset)?;
                println!("{}", serde_json::to_string(&record_json(&record))?);
            }
        }
        SegmentCommand::Stat => {
            let output = json!({
                "base_offset": segment.base_offset(),
                "next_offset": segment.next_offset(),
                "records": segment.record_count(),
                "store_bytes": segment.store_size(),
                "index_bytes": segment.index_size(),
                "maxed": segment.is_maxed(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    segment.close()?;

    Ok(())
}

fn record_json(record: &Record) -> serde_json::Value {
    json!({
        "offset": record.offset,
        "value": String::from_utf8_lossy(&record.value),
    })
}

fn list_segments(dir: &Path) -> anyhow::Result<Vec<u64>> {
    let mut bases = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(STORE_EXTENSION) {
            continue;
        }
        if let Some(base) = Segment::parse_base_offset(&path) {
            bases.push(base);
        }
    }
    bases.sort_unstable();
    Ok(bases)
}
