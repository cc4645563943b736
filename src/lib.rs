//! # satchel - BagIt packaging and verification
//!
//! A library for creating, completing, and verifying BagIt bags: directory
//! trees that package a payload together with self-describing metadata and
//! checksum manifests, so a collection of files can be shipped, archived,
//! and later proven unaltered.
//!
//! ## Overview
//!
//! A bag is a plain directory:
//!
//! ```text
//! my_collection/
//! ├── bagit.txt                 version and encoding declaration
//! ├── bag-info.txt              ordered label: value metadata
//! ├── manifest-sha256.txt       payload digests, one line per file
//! ├── tagmanifest-sha256.txt    digests of the tag files above
//! └── data/                     the payload
//!     └── ...
//! ```
//!
//! satchel gives you:
//! - In-place bag creation from an existing directory of files
//! - Two-mode verification: fail on the first disagreement, or collect
//!   every fixity error into one report
//! - Structural checks: files missing from the bag and files the
//!   manifests do not know about are detected in either mode
//! - A pluggable, ordered checksum registry (MD5, SHA-256, SHA-512 built
//!   in; custom algorithms registered by name at runtime)
//! - Order-preserving `bag-info.txt` handling, safe for human-edited
//!   metadata
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use satchel::{Bag, VerifyOptions};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Turn a directory into a bag in place
//! let bag = Bag::create(PathBuf::from("./my_collection"))?;
//! println!("Payload-Oxum: {}", bag.info().first("Payload-Oxum").unwrap_or("?"));
//!
//! // Later: open and verify it
//! let bag = Bag::open(PathBuf::from("./my_collection"))?;
//! let report = bag.verify(VerifyOptions { return_all_errors: true })?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Verification Semantics
//!
//! Verification reconciles manifests against the files actually present,
//! in two scopes: payload manifests against the payload tree, then
//! tag-manifests against everything else. Three failure classes exist:
//!
//! - **Checksum mismatch**: the file's digest disagrees with its manifest
//!   entry. Fail-fast mode aborts on the first; collect-all mode gathers
//!   the full set.
//! - **Missing file**: a manifest entry with no file on disk. Always fails.
//! - **Unexpected file**: a file on disk no manifest lists. Always fails,
//!   immediately, in either mode; an unrecognized file is a structural
//!   defect rather than content drift.
//!
//! A manifest naming an algorithm the registry does not hold is skipped
//! and reported distinctly as unverifiable; it does not fail the bag.
//!
//! ## Error Handling
//!
//! All operations return `Result<T, BagError>`. Failed verification
//! reports the path, algorithm, expected and actual digests, and the
//! manifest file implicated, so a discrepancy can be located without
//! re-running under extra instrumentation.
//!
//! ## Module Organization
//!
//! - [`bag`]: the [`Bag`] type, [`BagBuilder`], open / create / store
//! - [`layout`]: path resolution and the payload vs tag file partition
//! - [`fixity`]: checksum algorithms and the registry
//! - [`tagfile`]: the `bag-info.txt` codec
//! - [`manifest`]: the manifest / tag-manifest codec
//! - [`verification`]: the reconciliation engine and reports
//! - [`error`]: error types

// Public API modules
pub mod bag;
pub mod error;
pub mod fixity;
pub mod layout;
pub mod manifest;
pub mod tagfile;
pub mod verification;

// Internal modules (not part of public API)
mod utils;

// Re-export main types for convenience
pub use bag::{Bag, BagBuilder, BagVersion, Oxum, BAG_DECLARATION, BAG_INFO};
pub use error::{BagError, Result};
pub use fixity::{AlgorithmRegistry, FixityAlgorithm};
pub use layout::{BagLayout, FilePartition};
pub use manifest::{Manifest, ManifestKind};
pub use tagfile::{BagInfo, BagInfoField};
pub use verification::{BagVerifier, VerificationReport, VerifyOptions};

#[cfg(test)]
mod tests;
