//! Error types for the satchel library
//!
//! This module defines all error types that can occur while opening,
//! building, or verifying a bag. Errors carry enough context (paths,
//! algorithm names, manifest filenames) for a caller to locate the
//! discrepancy without re-running with extra instrumentation.

use std::path::PathBuf;
use thiserror::Error;

use crate::verification::VerificationReport;

/// Type alias for Results in the satchel library
pub type Result<T> = std::result::Result<T, BagError>;

/// Main error type for all bag operations
#[derive(Debug, Error)]
pub enum BagError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors while walking the bag directory tree
    #[error("Walk directory error")]
    WalkDir(#[from] walkdir::Error),

    /// The bag root directory does not exist
    #[error("Bag root does not exist: {0:?}")]
    MissingRoot(PathBuf),

    /// The payload directory is absent under the bag root
    #[error("Payload directory does not exist: {0:?}")]
    MissingPayloadDir(PathBuf),

    /// The directory carries no `bagit.txt` declaration
    #[error("Not a bag (no bagit.txt declaration): {0:?}")]
    NotABag(PathBuf),

    /// A tag or manifest file is structurally malformed
    #[error("Parse error in {file:?}: {message}")]
    Parse {
        /// File that failed to parse
        file: PathBuf,
        /// What was wrong with it
        message: String,
    },

    /// The declared bag version is older than the minimum this engine supports
    #[error("Unsupported bag version {declared} (minimum supported is {minimum})")]
    UnsupportedVersion {
        /// Version declared in bagit.txt
        declared: String,
        /// Oldest version the engine accepts
        minimum: String,
    },

    /// An algorithm name cannot be turned into (or recovered from) a
    /// manifest filename. This indicates a layout bug, not a data error.
    #[error("Cannot derive manifest path: {0}")]
    PathDerivation(String),

    /// The manifest for the bag's primary algorithm is absent
    #[error("Required manifest is missing or not a regular file: {0:?}")]
    MissingManifest(PathBuf),

    /// A computed digest disagrees with the manifest entry
    #[error(
        "Checksum mismatch for {path} ({algorithm}, listed in {manifest}): \
         expected {expected}, actual {actual}"
    )]
    ChecksumMismatch {
        /// Root-relative path of the offending file
        path: String,
        /// Algorithm whose digest disagreed
        algorithm: String,
        /// Digest recorded in the manifest
        expected: String,
        /// Digest computed from the file on disk
        actual: String,
        /// Manifest file that listed the entry
        manifest: String,
    },

    /// A file promised by a manifest is absent on disk
    #[error("File listed in {manifest} is missing from the bag: {path}")]
    MissingFile {
        /// Root-relative path of the absent file
        path: String,
        /// Manifest file that promised it
        manifest: String,
    },

    /// A file present on disk is absent from the manifest
    #[error("File is not listed in {manifest}: {path}")]
    UnexpectedFile {
        /// Root-relative path of the untracked file
        path: String,
        /// Manifest the file should have appeared in
        manifest: String,
    },

    /// Collected verification failures (collect-all-errors mode)
    #[error("Bag verification failed: {}", .0.summary())]
    Invalid(Box<VerificationReport>),

    /// The declared Payload-Oxum disagrees with the payload on disk
    #[error("Payload-Oxum mismatch: declared {declared}, actual {actual}")]
    OxumMismatch {
        /// Oxum recorded in bag-info.txt
        declared: String,
        /// Oxum computed from the payload directory
        actual: String,
    },

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BagError {
    /// Create a parse error with a custom message
    pub fn parse(file: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        BagError::Parse {
            file: file.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        BagError::Internal(msg.into())
    }

    /// Check if this error indicates a structural bag defect
    ///
    /// Structural errors (layout, parse, version, missing or unexpected
    /// files) always abort the surrounding operation and are never subject
    /// to the collect-all-errors policy.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            BagError::MissingRoot(_)
                | BagError::MissingPayloadDir(_)
                | BagError::NotABag(_)
                | BagError::Parse { .. }
                | BagError::UnsupportedVersion { .. }
                | BagError::PathDerivation(_)
                | BagError::MissingManifest(_)
                | BagError::MissingFile { .. }
                | BagError::UnexpectedFile { .. }
        )
    }

    /// Check if this error is a content (fixity) disagreement
    pub fn is_fixity(&self) -> bool {
        matches!(
            self,
            BagError::ChecksumMismatch { .. } | BagError::Invalid(_) | BagError::OxumMismatch { .. }
        )
    }
}
