//! Pipeline error type spanning all three stages

use std::io;
use std::path::PathBuf;

use epo_core::StreamError;

use crate::parser::XmlError;

/// Error from one pipeline stage.
///
/// Transport failures wrap [`StreamError`], per-document failures wrap
/// [`XmlError`]; the rest carry enough context to name the stage, the
/// item, and the cause in one log line.
#[derive(Debug)]
pub enum PipelineError {
    /// Invalid or inconsistent configuration.
    Config(String),
    /// Product catalog could not be fetched or decoded.
    Catalog { url: String, message: String },
    /// A delivery item failed to download after retries.
    Download { url: String, source: StreamError },
    /// A downloaded file did not match its catalog checksum.
    Checksum {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    /// A ZIP archive could not be extracted.
    Archive { path: PathBuf, message: String },
    /// An XML file was rejected.
    Xml { path: PathBuf, source: XmlError },
    /// The CSV sink failed.
    CsvWrite(csv::Error),
    /// Filesystem failure outside the cases above.
    Io(io::Error),
    /// A shutdown signal interrupted the stage.
    Cancelled,
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Catalog { url, message } => {
                write!(f, "catalog fetch failed for {url}: {message}")
            }
            Self::Download { url, source } => write!(f, "download failed for {url}: {source}"),
            Self::Checksum {
                path,
                expected,
                actual,
            } => write!(
                f,
                "checksum mismatch for {}: expected {expected}, got {actual}",
                path.display()
            ),
            Self::Archive { path, message } => {
                write!(f, "archive error at {}: {message}", path.display())
            }
            Self::Xml { path, source } => write!(f, "{}: {source}", path.display()),
            Self::CsvWrite(e) => write!(f, "csv write failed: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Cancelled => write!(f, "cancelled by shutdown signal"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Download { source, .. } => Some(source),
            Self::Xml { source, .. } => Some(source),
            Self::CsvWrite(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Anything short of cancellation earns another attempt; the retry
    /// budget, not the error kind, decides when to give up.
    pub fn is_retryable(&self) -> bool {
        !self.is_cancelled()
    }
}

impl epo_core::Retryable for PipelineError {
    fn is_retryable(&self) -> bool {
        PipelineError::is_retryable(self)
    }
}

impl From<io::Error> for PipelineError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        Self::CsvWrite(e)
    }
}

/// One-slot error cell shared by a stage's workers.
///
/// The first recorded error becomes the stage's terminal error; later
/// ones are dropped (the per-item log line and failure counter already
/// happened at the call site).
#[derive(Default)]
pub struct ErrorSlot(std::sync::Mutex<Option<PipelineError>>);

impl ErrorSlot {
    pub fn record(&self, e: PipelineError) {
        let mut slot = self.0.lock().unwrap();
        if slot.is_none() {
            *slot = Some(e);
        }
    }

    pub fn take(&self) -> Option<PipelineError> {
        self.0.lock().unwrap().take()
    }
}
