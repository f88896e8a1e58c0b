use std::path::PathBuf;

/// Errors surfaced at the CLI boundary. Per-file anomalies the core pipeline
/// tolerates (short files, header rejections, tuple failures) never reach
/// here; this covers only conditions the user needs to act on.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{path:?} is {size} bytes, smaller than a single heap page (8192 bytes)")]
    InputTooSmall { path: PathBuf, size: u64 },

    #[error("failed to write output file {path:?}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
