//! Command-line argument parsing for the memory-forensics pipeline.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Default concurrency: the host's logical CPU count, clamped to a sane
/// range (spec §5, §2.1).
fn default_concurrency() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).clamp(1, 8)
}

#[derive(Parser)]
#[command(name = "memforensics")]
#[command(about = "Memory-image forensic analysis pipeline", long_about = None)]
pub struct Cli {
    /// Path to the memory image to analyze
    #[arg(short = 'f', long = "dump", value_name = "MEMORY_DUMP")]
    pub dump: PathBuf,

    /// Output directory for reports and raw plugin dumps
    #[arg(short, long, value_name = "DIR", default_value = "analysis_output")]
    pub output: PathBuf,

    /// Path to the external memory-forensics engine executable
    #[arg(long, value_name = "BINARY", default_value = "vol")]
    pub engine: String,

    /// Maximum number of plugins to run concurrently
    #[arg(long, default_value_t = default_concurrency())]
    pub concurrency: usize,

    /// Which report to also print to stdout, in addition to the files
    /// always written to the output directory
    #[arg(long, value_enum, default_value = "text")]
    pub format: ReportFormatArg,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Enable verbose logging (info and warnings)
    #[arg(short, long)]
    pub verbose: bool,

    /// List the plugin catalogue and exit
    #[arg(long)]
    pub list_plugins: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ReportFormatArg {
    Text,
    Json,
}
