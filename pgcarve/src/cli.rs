use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Forensic carver for PostgreSQL heap files: locates heap pages in a raw
/// byte stream and recovers rows without catalog metadata.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// File or directory to scan. Directories are expanded to their regular
    /// file children, non-recursively.
    #[arg(long)]
    pub input: PathBuf,

    /// Case-insensitive substring filter applied to each tuple's body bytes
    /// before schema inference. Omit to keep every tuple.
    #[arg(long)]
    pub keyword: Option<String>,

    /// Output table format.
    #[arg(long, value_enum, default_value = "csv")]
    pub output_type: OutputType,

    /// Directory to write output files into.
    #[arg(long, default_value = ".")]
    pub output: PathBuf,

    /// Emit debug-level logging to the log file in addition to info level.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputType {
    Csv,
    Xlsx,
}
