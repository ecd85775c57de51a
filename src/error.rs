use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum StagerError {
    #[error("identifier is empty or blank")]
    MissingIdentifier,

    #[error("OA metadata request failed: {0}")]
    MetadataHttp(String),

    #[error("OA metadata service returned status {status}: {message}")]
    MetadataStatus { status: u16, message: String },

    #[error("archive request failed: {0}")]
    ArchiveHttp(String),

    #[error("archive host returned status {status}: {message}")]
    ArchiveStatus { status: u16, message: String },

    #[error("archive missing after download: {0}")]
    ArchiveMissing(String),

    #[error("archive extraction failed: {0}")]
    Extract(String),

    #[error("failed to build HTTP client: {0}")]
    Http(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read input file at {0}")]
    InputRead(PathBuf),

    #[error("failed to parse input table: {0}")]
    InputParse(String),

    #[error("input table has no column named {0:?}")]
    #[diagnostic(help("pass --id-column to choose the identifier column"))]
    MissingIdColumn(String),

    #[error("ledger not found at {0}")]
    #[diagnostic(help("run `guideline-stager fetch` first"))]
    LedgerNotFound(PathBuf),

    #[error("failed to read ledger: {0}")]
    LedgerRead(String),

    #[error("failed to write ledger: {0}")]
    LedgerWrite(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl StagerError {
    /// HTTP status carried by the error, when the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            StagerError::MetadataStatus { status, .. }
            | StagerError::ArchiveStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
