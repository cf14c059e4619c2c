// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the extraction client. None of these abort the
/// batch by themselves; the pipeline records them per document.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to reach extraction service: {0}")]
    Connection(#[source] reqwest::Error),

    #[error("extraction service returned code {code}: {message}")]
    Service { code: u16, message: String },

    #[error("extraction service response was not valid JSON")]
    MalformedResponse,

    #[error("extraction request was blocked by the service: {0}")]
    Blocked(String),

    #[error("unexpected extraction response structure: {0}")]
    UnexpectedStructure(String),
}

/// Failures from the ledger store (rusqlite-backed).
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("no ledger row found for handle {0}")]
    RowMissing(i64),
}

/// Failures from the source/archive folder layer.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to create archive folder {path}: {source}")]
    CreateFolder {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to list source folder {path}: {source}")]
    ListSource {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to relocate {path}: {source}")]
    Relocate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not format the current date: {0}")]
    DateFormat(#[from] time::error::Format),
}

/// Configuration problems are fatal and checked before any document is
/// touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("source folder does not exist: {0}")]
    SourceDirMissing(PathBuf),
}
