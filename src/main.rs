//! flightrec: inspect flight recording files

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use flightrec::chunk::read_chunk_info;
use flightrec::config::LoaderConfig;
use flightrec::parser::{load_file, LoadedRecording};

#[derive(Parser)]
#[command(name = "flightrec")]
#[command(about = "Inspect flight recording files")]
#[command(version)]
struct Cli {
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the chunks of a recording
    Chunks {
        /// Path to the recording
        file: PathBuf,
    },
    /// Load a recording and summarize its event types
    Summary {
        /// Path to the recording
        file: PathBuf,

        /// Output format: table, json
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Leave out event types and fields marked experimental
        #[arg(long)]
        hide_experimental: bool,

        /// Keep the chunks before a truncated one instead of failing
        #[arg(long)]
        ignore_truncated: bool,
    },
}

fn run_chunks(file: PathBuf) -> Result<()> {
    let input = File::open(&file).with_context(|| format!("Failed to open {}", file.display()))?;
    let chunks = read_chunk_info(BufReader::new(input))?;
    println!(
        "{:>5}  {:>12}  {:>10}  {:>7}  {:>22}  {:>14}",
        "chunk", "offset", "size", "version", "start (ns)", "duration (ns)"
    );
    for info in &chunks {
        println!(
            "{:>5}  {:>12}  {:>10}  {:>7}  {:>22}  {:>14}",
            info.index,
            info.offset,
            info.header.size,
            format!("{}.{}", info.header.major, info.header.minor),
            info.header.start_nanos,
            info.header.duration_nanos
        );
    }
    println!("\n{} chunks", chunks.len());
    Ok(())
}

fn print_table(recording: &LoadedRecording) {
    let summaries = recording.events.summaries();
    let width = summaries
        .iter()
        .map(|s| s.internal_id.len())
        .max()
        .unwrap_or(10)
        .max(10);
    println!("{:<width$}  {:>10}  {:>5}  label", "event type", "count", "lanes");
    println!("{}", "-".repeat(width + 26));
    for s in &summaries {
        println!(
            "{:<width$}  {:>10}  {:>5}  {}",
            s.internal_id, s.count, s.lanes, s.label
        );
    }
    let stats = &recording.stats;
    println!();
    println!("chunks:         {}", stats.chunk_count);
    println!("events:         {}", recording.events.item_count());
    println!("skipped events: {}", stats.skipped_event_count);
    if let Some((start, end)) = recording.events.time_range() {
        println!("time range:     {start} .. {end}");
    }
    for error in &stats.recent_errors {
        println!("  skipped: {error}");
    }
}

fn run_summary(file: PathBuf, format: &str, config: LoaderConfig) -> Result<()> {
    let recording = load_file(&file, &config)?;
    match format {
        "table" => print_table(&recording),
        "json" => {
            let out = serde_json::json!({
                "events": recording.events.summaries(),
                "stats": recording.stats,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        other => bail!("Unknown format: {}. Use table or json.", other),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chunks { file } => run_chunks(file),
        Commands::Summary {
            file,
            format,
            hide_experimental,
            ignore_truncated,
        } => {
            let config = LoaderConfig {
                hide_experimentals: hide_experimental,
                ignore_truncated_chunk: ignore_truncated,
                ..LoaderConfig::from_env()
            };
            run_summary(file, &format, config)
        }
    }
}
