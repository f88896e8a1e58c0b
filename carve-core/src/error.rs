/// Errors surfaced by the core carving pipeline.
///
/// Per-page and per-tuple anomalies (invalid headers, short bodies, exhausted
/// schema inference) are not represented here: they are logged and the
/// pipeline keeps going. Only I/O on the input stream is fatal.
#[derive(Debug, thiserror::Error)]
pub enum CarveError {
    #[error("I/O error while scanning input")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CarveError>;
