// src/error.rs

//! Error types for the build pipeline
//!
//! Every variant is fatal to a pipeline run. Nothing is retried, and the
//! source and package directories are left in place for inspection.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading a recipe or running the pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// A mandatory recipe field is missing or malformed
    #[error("invalid recipe: {0}")]
    RecipeInvalid(String),

    /// The recipe (or a manifest) could not be parsed at all
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A local source file does not exist
    #[error("source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// Network or transport failure while fetching a source
    #[error("failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    /// Detached signature verification failed
    #[error("signature verification failed for {file}: {reason}")]
    SignatureFailed { file: String, reason: String },

    /// Computed digest does not match the declared digest
    #[error("{algorithm} checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        algorithm: String,
        expected: String,
        actual: String,
    },

    /// A recognized archive could not be extracted
    #[error("failed to extract {file}: {reason}")]
    ExtractionFailed { file: String, reason: String },

    /// A mandatory stage hook is not declared
    #[error("missing {0} step")]
    StageMissing(&'static str),

    /// A stage hook could not be spawned or exited unsuccessfully
    #[error("{stage} step failed: {reason}")]
    StageFailed { stage: &'static str, reason: String },

    /// The package archive could not be produced
    #[error("failed to create archive {}: {reason}", .path.display())]
    ArchiveCreationFailed { path: PathBuf, reason: String },

    /// The configuration file is unreadable or invalid
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
