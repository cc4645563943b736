//! Bag verification and fixity checking
//!
//! Verification reconciles what the manifests promise against what is on
//! disk. It runs in two independently invocable scopes, payload and tag,
//! and each scope walks the same three questions:
//!
//! 1. Is every live file listed in the manifest? A file the manifest does
//!    not know about is a structural defect and fails immediately in
//!    either mode.
//! 2. Does every live file's digest match its manifest entry? Disagreement
//!    is a content error: fail-fast mode aborts on the first one,
//!    collect-all mode gathers the full set before failing.
//! 3. Is every manifest entry backed by a live file? A promised-but-absent
//!    file fails verification in either mode.
//!
//! A manifest naming an algorithm with no registered implementation cannot
//! be checked; its entries are skipped and the algorithm is reported under
//! a distinct "unverifiable" category that does not by itself fail the
//! bag.
//!
//! Digest computation for independent files is parallelized with rayon.
//! Results aggregate in path order regardless of execution order, and
//! fail-fast mode surfaces a mismatch as soon as any worker finds one.

use crate::error::{BagError, Result};
use crate::fixity::AlgorithmRegistry;
use crate::layout::BagLayout;
use crate::manifest::{self, Manifest, ManifestKind};
use crate::utils;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Options controlling a verification run
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    /// Collect every fixity mismatch instead of aborting on the first
    pub return_all_errors: bool,
}

/// A digest disagreement between a manifest entry and the file on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumFailure {
    /// Root-relative path of the file
    pub path: String,
    /// Algorithm whose digest disagreed
    pub algorithm: String,
    /// Digest recorded in the manifest
    pub expected: String,
    /// Digest computed from the file on disk
    pub actual: String,
    /// Manifest file that listed the entry
    pub manifest: String,
}

/// A manifest entry with no corresponding file on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingEntry {
    /// Root-relative path the manifest promised
    pub path: String,
    /// Algorithm of the manifest that promised it
    pub algorithm: String,
    /// Manifest file that promised it
    pub manifest: String,
}

/// A manifest whose algorithm has no registered implementation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnverifiableAlgorithm {
    /// Algorithm name as derived from the manifest filename
    pub algorithm: String,
    /// The manifest file that could not be checked
    pub manifest: String,
    /// How many entries went unchecked
    pub entry_count: usize,
}

/// Outcome of one verification run
///
/// Produced fresh for every call. [`is_ok`](VerificationReport::is_ok)
/// ignores the unverifiable category: entries that cannot be checked are
/// flagged, not failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Digest disagreements
    pub mismatches: Vec<ChecksumFailure>,
    /// Manifest entries with no file on disk
    pub missing: Vec<MissingEntry>,
    /// Files on disk with no manifest entry
    pub unexpected: Vec<String>,
    /// Manifests skipped for lack of a registered algorithm
    pub unverifiable: Vec<UnverifiableAlgorithm>,
    /// Number of (file, algorithm) digest checks performed
    pub files_checked: usize,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
}

impl VerificationReport {
    /// Whether the run found no failures
    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty() && self.missing.is_empty() && self.unexpected.is_empty()
    }

    /// One-line human-readable outcome
    pub fn summary(&self) -> String {
        if self.is_ok() {
            let note = if self.unverifiable.is_empty() {
                String::new()
            } else {
                format!(" ({} unverifiable manifest(s))", self.unverifiable.len())
            };
            format!(
                "{} checks passed in {}ms{}",
                self.files_checked, self.duration_ms, note
            )
        } else {
            format!(
                "{} mismatch(es), {} missing, {} unexpected after {} checks",
                self.mismatches.len(),
                self.missing.len(),
                self.unexpected.len(),
                self.files_checked
            )
        }
    }

    /// Fold another scope's results into this report
    pub fn merge(&mut self, other: VerificationReport) {
        self.mismatches.extend(other.mismatches);
        self.missing.extend(other.missing);
        self.unexpected.extend(other.unexpected);
        self.unverifiable.extend(other.unverifiable);
        self.files_checked += other.files_checked;
        self.duration_ms += other.duration_ms;
    }
}

/// Reconciles manifests against the live file set of one bag
#[derive(Debug)]
pub struct BagVerifier<'a> {
    layout: &'a BagLayout,
    registry: &'a AlgorithmRegistry,
}

impl<'a> BagVerifier<'a> {
    /// Create a verifier over a bag's layout and algorithm table
    pub fn new(layout: &'a BagLayout, registry: &'a AlgorithmRegistry) -> Self {
        Self { layout, registry }
    }

    /// Verify the payload scope (`manifest-<algo>.txt` files)
    pub fn verify_payload(&self, options: VerifyOptions) -> Result<VerificationReport> {
        self.verify_scope(ManifestKind::Payload, options)
    }

    /// Verify the tag scope (`tagmanifest-<algo>.txt` files)
    ///
    /// The tag-manifest files themselves are excluded from the live set;
    /// they are not expected to list themselves.
    pub fn verify_tags(&self, options: VerifyOptions) -> Result<VerificationReport> {
        self.verify_scope(ManifestKind::Tag, options)
    }

    fn verify_scope(
        &self,
        kind: ManifestKind,
        options: VerifyOptions,
    ) -> Result<VerificationReport> {
        let start = Instant::now();
        let mut report = VerificationReport::default();

        let live = self.live_set(kind)?;
        let manifest_paths = manifest::find_manifests(self.layout.metadata_path(), kind)?;
        debug!(
            "Verifying {:?} scope: {} manifest(s), {} live file(s)",
            kind,
            manifest_paths.len(),
            live.len()
        );

        for manifest_path in &manifest_paths {
            let loaded = Manifest::load(manifest_path)?;
            let manifest_name = loaded.file_name()?;

            let algorithm = match self.registry.get(loaded.algorithm()) {
                Some(a) => a,
                None => {
                    warn!(
                        "No registered implementation for {:?}; skipping {}",
                        loaded.algorithm(),
                        manifest_name
                    );
                    report.unverifiable.push(UnverifiableAlgorithm {
                        algorithm: loaded.algorithm().to_string(),
                        manifest: manifest_name,
                        entry_count: loaded.len(),
                    });
                    continue;
                }
            };

            // Every live file must be listed before any digest is computed.
            // An unrecognized file is a structural defect, never collected.
            let mut pairs = Vec::with_capacity(live.len());
            for file in &live {
                match loaded.digest_for(file) {
                    Some(expected) => pairs.push((file.as_str(), expected)),
                    None => {
                        return Err(BagError::UnexpectedFile {
                            path: file.clone(),
                            manifest: manifest_name,
                        });
                    }
                }
            }

            if options.return_all_errors {
                let failures = pairs
                    .par_iter()
                    .map(|(file, expected)| self.compare_file(file, expected, algorithm.as_ref(), &manifest_name))
                    .collect::<Result<Vec<_>>>()?;
                report.mismatches.extend(failures.into_iter().flatten());
            } else {
                pairs.par_iter().try_for_each(|(file, expected)| {
                    match self.compare_file(file, expected, algorithm.as_ref(), &manifest_name)? {
                        Some(failure) => Err(BagError::ChecksumMismatch {
                            path: failure.path,
                            algorithm: failure.algorithm,
                            expected: failure.expected,
                            actual: failure.actual,
                            manifest: failure.manifest,
                        }),
                        None => Ok(()),
                    }
                })?;
            }
            report.files_checked += pairs.len();

            // Entries never seen during the live scan are missing files.
            let live_set: HashSet<&str> = live.iter().map(String::as_str).collect();
            for (entry_path, _) in loaded.entries() {
                if !live_set.contains(entry_path) {
                    report.missing.push(MissingEntry {
                        path: entry_path.to_string(),
                        algorithm: loaded.algorithm().to_string(),
                        manifest: manifest_name.clone(),
                    });
                }
            }

            // A missing file fails verification in either mode; fail-fast
            // surfaces the first one as soon as this manifest is settled.
            if !options.return_all_errors {
                if let Some(missing) = report.missing.first() {
                    return Err(BagError::MissingFile {
                        path: missing.path.clone(),
                        manifest: missing.manifest.clone(),
                    });
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;

        if !report.is_ok() {
            return Err(BagError::Invalid(Box::new(report)));
        }

        info!(
            "{:?} scope valid: {} checks in {}ms",
            kind, report.files_checked, report.duration_ms
        );
        Ok(report)
    }

    /// Digest one live file and compare against its manifest entry
    fn compare_file(
        &self,
        file: &str,
        expected: &str,
        algorithm: &dyn crate::fixity::FixityAlgorithm,
        manifest_name: &str,
    ) -> Result<Option<ChecksumFailure>> {
        let absolute = self.layout.resolve(&utils::decode_relative(file));
        let actual = algorithm.digest_file(&absolute)?;

        if actual.eq_ignore_ascii_case(expected) {
            return Ok(None);
        }
        Ok(Some(ChecksumFailure {
            path: file.to_string(),
            algorithm: algorithm.name().to_string(),
            expected: expected.to_string(),
            actual,
            manifest: manifest_name.to_string(),
        }))
    }

    /// The root-relative live file set for a scope
    fn live_set(&self, kind: ManifestKind) -> Result<Vec<String>> {
        let files = match kind {
            ManifestKind::Payload => self.layout.payload_files()?,
            ManifestKind::Tag => self.layout.tag_files()?,
        };

        let mut live: Vec<String> = files.iter().map(|p| utils::encode_relative(p)).collect();
        if kind == ManifestKind::Tag {
            live.retain(|path| {
                !matches!(Manifest::from_file_name(path), Some((ManifestKind::Tag, _)))
            });
        }
        Ok(live)
    }
}
