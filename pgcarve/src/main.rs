mod cli;
mod error;
mod output;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use log::{info, warn, LevelFilter};

use carve_core::carve_file;
use cli::{Args, OutputType};
use error::CliError;

const LOG_FILE: &str = "pgcarve.log";
const MIN_INPUT_SIZE: u64 = 8192;

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_FILE)
        .with_context(|| format!("opening log file {LOG_FILE}"))?;

    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();
    Ok(())
}

/// Expand `input` into the list of regular files it refers to. A plain file
/// is passed through; a directory is expanded to its direct regular-file
/// children only.
fn input_files(input: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if input.is_dir() {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(input)
            .with_context(|| format!("reading directory {}", input.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    } else {
        Ok(vec![input.to_path_buf()])
    }
}

fn sanitize_basename(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c == '\\' || c == ':' { '_' } else { c })
        .collect()
}

fn output_filename(keyword: &str, input_path: &Path, index: usize, output_type: OutputType) -> String {
    let basename = input_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let basename = sanitize_basename(&basename);
    let keyword = sanitize_basename(keyword);
    let ext = match output_type {
        OutputType::Csv => "csv",
        OutputType::Xlsx => "xlsx",
    };
    format!("carved_{keyword}_{basename}_{index}.{ext}")
}

fn process_file(args: &Args, path: &Path) -> anyhow::Result<()> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("reading metadata for {}", path.display()))?
        .len();
    if size < MIN_INPUT_SIZE {
        let err = CliError::InputTooSmall { path: path.to_path_buf(), size };
        warn!("{err}");
        println!("skipping {}: {err}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let keyword_bytes = args.keyword.as_ref().map(|k| k.as_bytes());
    let relations = carve_file(&mut reader, keyword_bytes)
        .with_context(|| format!("carving {}", path.display()))?;

    info!("{}: located {} relation(s)", path.display(), relations.len());

    // The source lowercases the keyword once and reuses it for both body
    // matching and the output filename; mirrored here rather than keeping
    // the original case for the filename.
    let keyword_for_filename = args.keyword.as_deref().unwrap_or("").to_lowercase();
    for (index, relation) in relations.iter().enumerate() {
        if relation.rows.is_empty() {
            continue;
        }
        let filename = output_filename(&keyword_for_filename, path, index + 1, args.output_type);
        let out_path = args.output.join(filename);
        match args.output_type {
            OutputType::Csv => output::write_csv(relation, &out_path)?,
            OutputType::Xlsx => output::write_xlsx(relation, &out_path)?,
        }
        info!(
            "{}: wrote {} row(s) to {}",
            path.display(),
            relation.rows.len(),
            out_path.display()
        );
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;
    info!("pgcarve starting up");

    let files = input_files(&args.input)?;
    for path in &files {
        if let Err(e) = process_file(&args, path) {
            eprintln!("error processing {}: {e:#}", path.display());
        }
    }

    info!("pgcarve shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_filename_replaces_separators_and_uses_one_based_index() {
        let name = output_filename("pass", Path::new("/var/data/pg_base:1.bin"), 1, OutputType::Csv);
        assert_eq!(name, "carved_pass_pg_base_1.bin_1.csv");
    }

    #[test]
    fn output_filename_switches_extension_for_xlsx() {
        let name = output_filename("", Path::new("heap.bin"), 3, OutputType::Xlsx);
        assert_eq!(name, "carved__heap.bin_3.xlsx");
    }
}
