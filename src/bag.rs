//! Main bag implementation
//!
//! This module provides the core [`Bag`] struct, the entry point for
//! opening, creating, completing, and verifying bags. It coordinates the
//! other subsystems:
//!
//! - **Layout**: resolves the payload and metadata directories and
//!   partitions the files on disk
//! - **Fixity registry**: the named checksum algorithms available to this
//!   bag instance
//! - **Codecs**: the tag-file and manifest readers and writers
//! - **Verification**: the two-scope reconciliation engine
//!
//! A bag is created (or completed in place) with [`BagBuilder`], which
//! writes the declaration, maintains the standard `bag-info.txt` fields,
//! and generates every payload manifest before any tag-manifest, so the
//! tag-manifests can cover the manifest files themselves.

use crate::error::{BagError, Result};
use crate::fixity::{AlgorithmRegistry, FixityAlgorithm, MD5, SHA256};
use crate::layout::BagLayout;
use crate::manifest::{Manifest, ManifestKind};
use crate::tagfile::BagInfo;
use crate::utils;
use crate::verification::{BagVerifier, VerificationReport, VerifyOptions};
use chrono::Utc;
use rayon::prelude::*;
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, instrument};

/// Filename of the version and encoding declaration
pub const BAG_DECLARATION: &str = "bagit.txt";
/// Filename of the bag metadata tag file
pub const BAG_INFO: &str = "bag-info.txt";

/// Version written into newly created bags
pub const DEFAULT_VERSION: BagVersion = BagVersion { major: 1, minor: 0 };
/// Oldest declared version the engine accepts
pub const MIN_SUPPORTED_VERSION: BagVersion = BagVersion {
    major: 0,
    minor: 97,
};

const TAG_ENCODING_LINE: &str = "Tag-File-Character-Encoding: UTF-8";

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"BagIt-Version: ([0-9.]+)").unwrap());

/// The version declared in a bag's `bagit.txt`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BagVersion {
    /// Major version number
    pub major: u32,
    /// Minor version number
    pub minor: u32,
}

impl fmt::Display for BagVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for BagVersion {
    type Err = BagError;

    fn from_str(s: &str) -> Result<Self> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| BagError::internal(format!("invalid version string {s:?}")))?;
        let major = major
            .parse()
            .map_err(|_| BagError::internal(format!("invalid version string {s:?}")))?;
        let minor = minor
            .parse()
            .map_err(|_| BagError::internal(format!("invalid version string {s:?}")))?;
        Ok(Self { major, minor })
    }
}

/// Payload octet and stream counts, the `Payload-Oxum`
///
/// Displays as `<octets>.<streams>`, the quick-completeness summary
/// recorded in `bag-info.txt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Oxum {
    /// Total payload bytes
    pub octets: u64,
    /// Number of payload files
    pub streams: u64,
}

impl fmt::Display for Oxum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.octets, self.streams)
    }
}

impl FromStr for Oxum {
    type Err = BagError;

    fn from_str(s: &str) -> Result<Self> {
        let (octets, streams) = s
            .split_once('.')
            .ok_or_else(|| BagError::internal(format!("invalid oxum {s:?}")))?;
        let octets = octets
            .parse()
            .map_err(|_| BagError::internal(format!("invalid oxum {s:?}")))?;
        let streams = streams
            .parse()
            .map_err(|_| BagError::internal(format!("invalid oxum {s:?}")))?;
        Ok(Self { octets, streams })
    }
}

/// The `Bag-Software-Agent` value this crate writes
fn software_agent() -> String {
    format!("satchel v{}", env!("CARGO_PKG_VERSION"))
}

/// Parse the declared version out of a `bagit.txt` file
fn parse_declaration(path: &Path) -> Result<BagVersion> {
    let text = fs::read_to_string(path)?;
    let captures = VERSION_PATTERN
        .captures(&text)
        .ok_or_else(|| BagError::parse(path, "missing BagIt-Version declaration"))?;
    captures[1]
        .parse()
        .map_err(|_| BagError::parse(path, format!("unparseable version {:?}", &captures[1])))
}

/// A bag on disk
///
/// Holds the resolved layout, the declared version, the in-memory
/// `bag-info.txt` metadata, and the fixity registry. Derived paths are
/// resolved once at open or create time; metadata edits stay in memory
/// until [`store`](Bag::store) rewrites the tag files and manifests.
///
/// # Examples
///
/// ```rust,no_run
/// use satchel::{Bag, VerifyOptions};
/// use std::path::PathBuf;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // Turn a directory of files into a bag in place
/// Bag::create(PathBuf::from("./my_collection"))?;
///
/// // Later, verify it
/// let bag = Bag::open(PathBuf::from("./my_collection"))?;
/// let report = bag.verify(VerifyOptions { return_all_errors: true })?;
/// println!("{}", report.summary());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Bag {
    /// Resolved directory layout
    layout: BagLayout,
    /// Version declared in bagit.txt
    version: BagVersion,
    /// Ordered bag-info metadata
    info: BagInfo,
    /// Checksum algorithms available to this bag
    registry: AlgorithmRegistry,
    /// Algorithm whose payload manifest must exist for verification
    primary_algorithm: String,
}

impl Bag {
    /// Open an existing bag
    ///
    /// Reads the version declaration and `bag-info.txt` (when present) and
    /// registers the default algorithms, MD5 and SHA-256, so bags written
    /// with either generation of defaults verify without further setup.
    ///
    /// # Errors
    ///
    /// - [`BagError::MissingRoot`] if the directory does not exist
    /// - [`BagError::NotABag`] if there is no `bagit.txt`
    /// - [`BagError::Parse`] if a declaration or tag file is malformed
    #[instrument]
    pub fn open(root: PathBuf) -> Result<Self> {
        if !root.is_dir() {
            return Err(BagError::MissingRoot(root));
        }

        let declaration = root.join(BAG_DECLARATION);
        if !declaration.is_file() {
            return Err(BagError::NotABag(root));
        }
        let version = parse_declaration(&declaration)?;

        let info_path = root.join(BAG_INFO);
        let info = if info_path.is_file() {
            BagInfo::load(&info_path)?
        } else {
            BagInfo::new()
        };

        info!("Opened bag at {:?} (version {})", root, version);
        Ok(Self {
            layout: BagLayout::new(root),
            version,
            info,
            registry: AlgorithmRegistry::with_defaults(),
            primary_algorithm: SHA256.to_string(),
        })
    }

    /// Create (or complete in place) a bag with default settings
    ///
    /// Equivalent to `BagBuilder::new().create(root)`.
    pub fn create(root: PathBuf) -> Result<Self> {
        BagBuilder::new().create(root)
    }

    /// Bag root directory
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Resolved directory layout
    pub fn layout(&self) -> &BagLayout {
        &self.layout
    }

    /// Declared bag version
    pub fn version(&self) -> BagVersion {
        self.version
    }

    /// Bag metadata (the in-memory `bag-info.txt`)
    pub fn info(&self) -> &BagInfo {
        &self.info
    }

    /// Mutable bag metadata; call [`store`](Bag::store) to persist edits
    pub fn info_mut(&mut self) -> &mut BagInfo {
        &mut self.info
    }

    /// The fixity registry for this bag
    pub fn registry(&self) -> &AlgorithmRegistry {
        &self.registry
    }

    /// Register a further checksum algorithm
    ///
    /// Registration is idempotent; re-registering a loaded algorithm is a
    /// no-op. Returns `true` when the algorithm was added.
    pub fn register_algorithm(&mut self, algorithm: Arc<dyn FixityAlgorithm>) -> bool {
        self.registry.register(algorithm)
    }

    /// Name of the algorithm whose payload manifest verification requires
    pub fn primary_algorithm(&self) -> &str {
        &self.primary_algorithm
    }

    /// Compute the live payload oxum (total bytes, file count)
    pub fn payload_oxum(&self) -> Result<Oxum> {
        let files = self.layout.payload_files()?;
        let mut oxum = Oxum {
            octets: 0,
            streams: 0,
        };
        for file in &files {
            let metadata = fs::metadata(self.layout.resolve(file))?;
            oxum.octets += metadata.len();
            oxum.streams += 1;
        }
        Ok(oxum)
    }

    /// Rewrite the bag's tag files and manifests from current state
    ///
    /// Writes the declaration, refreshes the maintained `bag-info.txt`
    /// fields (`Bagging-Date`, `Bag-Software-Agent`, `Payload-Oxum`,
    /// `Bag-Size`) with insert-or-replace-by-label semantics, then rebuilds
    /// every payload manifest and, only after all of them are on disk,
    /// every tag-manifest. Manifests are rebuilt from scratch; there is no
    /// incremental update.
    #[instrument(skip(self))]
    pub fn store(&mut self) -> Result<()> {
        self.layout.ensure_exists()?;
        let root = self.layout.root().to_path_buf();

        let declaration = format!("BagIt-Version: {}\n{}\n", self.version, TAG_ENCODING_LINE);
        utils::atomic_write(&root.join(BAG_DECLARATION), declaration.as_bytes())?;

        let oxum = self.payload_oxum()?;
        self.info
            .insert_or_replace("Bagging-Date", Utc::now().format("%Y-%m-%d").to_string());
        self.info
            .insert_or_replace("Bag-Software-Agent", software_agent());
        self.info.insert_or_replace("Payload-Oxum", oxum.to_string());
        self.info
            .insert_or_replace("Bag-Size", utils::format_bag_size(oxum.octets));
        self.info.save(&root.join(BAG_INFO))?;

        // Payload manifests must all exist before the first tag-manifest is
        // generated, so the tag-manifests can cover them.
        let payload_files = self.layout.payload_files()?;
        for algorithm in self.registry.iter() {
            let manifest =
                build_manifest(ManifestKind::Payload, algorithm.as_ref(), &payload_files, &self.layout)?;
            manifest.save_to(self.layout.metadata_path())?;
            debug!(
                "Wrote payload manifest for {} ({} entries)",
                algorithm.name(),
                manifest.len()
            );
        }

        let tag_files: Vec<PathBuf> = self
            .layout
            .tag_files()?
            .into_iter()
            .filter(|path| {
                let encoded = utils::encode_relative(path);
                !matches!(
                    Manifest::from_file_name(&encoded),
                    Some((ManifestKind::Tag, _))
                )
            })
            .collect();
        for algorithm in self.registry.iter() {
            let manifest =
                build_manifest(ManifestKind::Tag, algorithm.as_ref(), &tag_files, &self.layout)?;
            manifest.save_to(self.layout.metadata_path())?;
            debug!(
                "Wrote tag manifest for {} ({} entries)",
                algorithm.name(),
                manifest.len()
            );
        }

        info!(
            "Stored bag at {:?}: oxum {}, algorithms [{}]",
            root,
            oxum,
            self.registry.names().join(", ")
        );
        Ok(())
    }

    /// Verify the whole bag
    ///
    /// Requires the payload directory, a supported declared version, and
    /// the payload manifest of the primary algorithm; then runs payload
    /// verification followed by tag verification. Both scopes must pass.
    ///
    /// In fail-fast mode (the default) the first fixity mismatch aborts
    /// with a [`BagError::ChecksumMismatch`]; with
    /// [`VerifyOptions::return_all_errors`] every mismatch is gathered into
    /// a [`BagError::Invalid`] report. Missing and unexpected files fail
    /// verification in either mode.
    #[instrument(skip(self))]
    pub fn verify(&self, options: VerifyOptions) -> Result<VerificationReport> {
        self.layout.ensure_exists()?;

        if self.version < MIN_SUPPORTED_VERSION {
            return Err(BagError::UnsupportedVersion {
                declared: self.version.to_string(),
                minimum: MIN_SUPPORTED_VERSION.to_string(),
            });
        }

        let primary_name =
            Manifest::file_name_for(ManifestKind::Payload, &self.primary_algorithm)?;
        let primary_path = self.layout.metadata_path().join(primary_name);
        if !primary_path.is_file() {
            return Err(BagError::MissingManifest(primary_path));
        }

        let verifier = BagVerifier::new(&self.layout, &self.registry);
        let mut report = verifier.verify_payload(options)?;
        report.merge(verifier.verify_tags(options)?);

        info!("Bag at {:?} is valid: {}", self.root(), report.summary());
        Ok(report)
    }

    /// Verify only the payload scope
    pub fn verify_payload(&self, options: VerifyOptions) -> Result<VerificationReport> {
        BagVerifier::new(&self.layout, &self.registry).verify_payload(options)
    }

    /// Verify only the tag scope
    pub fn verify_tags(&self, options: VerifyOptions) -> Result<VerificationReport> {
        BagVerifier::new(&self.layout, &self.registry).verify_tags(options)
    }

    /// Quick completeness check against the declared `Payload-Oxum`
    ///
    /// Compares byte and stream counts only; no digests are computed. Far
    /// cheaper than [`verify`](Bag::verify), and sufficient to catch
    /// truncated or partially transferred payloads.
    pub fn verify_oxum(&self) -> Result<()> {
        let declared = self
            .info
            .first("Payload-Oxum")
            .ok_or_else(|| {
                BagError::parse(self.root().join(BAG_INFO), "no Payload-Oxum field")
            })?
            .parse::<Oxum>()?;
        let actual = self.payload_oxum()?;

        if declared != actual {
            return Err(BagError::OxumMismatch {
                declared: declared.to_string(),
                actual: actual.to_string(),
            });
        }
        debug!("Payload-Oxum {} matches payload", declared);
        Ok(())
    }
}

/// Digest a file list into a manifest, in parallel
fn build_manifest(
    kind: ManifestKind,
    algorithm: &dyn FixityAlgorithm,
    files: &[PathBuf],
    layout: &BagLayout,
) -> Result<Manifest> {
    let entries = files
        .par_iter()
        .map(|relative| -> Result<(String, String)> {
            let digest = algorithm.digest_file(&layout.resolve(relative))?;
            Ok((utils::encode_relative(relative), digest))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut manifest = Manifest::new(kind, algorithm.name());
    for (path, digest) in entries {
        manifest.insert(path, digest);
    }
    Ok(manifest)
}

/// Builder for creating or completing bags
///
/// # Examples
///
/// ```rust,no_run
/// use satchel::BagBuilder;
/// use std::path::PathBuf;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bag = BagBuilder::new()
///     .algorithm("sha512")
///     .info_field("Source-Organization", "Example Archives")
///     .create(PathBuf::from("./collection"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BagBuilder {
    version: BagVersion,
    algorithms: Vec<String>,
    info: BagInfo,
}

impl Default for BagBuilder {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION,
            algorithms: vec![MD5.to_string(), SHA256.to_string()],
            info: BagInfo::new(),
        }
    }
}

impl BagBuilder {
    /// Create a builder with the default version and algorithms
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the version to declare
    pub fn version(mut self, version: BagVersion) -> Self {
        self.version = version;
        self
    }

    /// Add a built-in algorithm by name (in addition to the defaults)
    pub fn algorithm(mut self, name: impl Into<String>) -> Self {
        self.algorithms.push(name.into());
        self
    }

    /// Replace the algorithm list entirely
    pub fn algorithms(mut self, names: Vec<String>) -> Self {
        self.algorithms = names;
        self
    }

    /// Seed a `bag-info.txt` field
    pub fn info_field(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.push(label, value);
        self
    }

    /// Create a bag at `root`, writing all tag files and manifests
    ///
    /// The directory is created if absent. If it exists, is non-empty, and
    /// has no payload subdirectory yet, its contents are relocated into
    /// one: the directory is renamed aside, an empty directory is recreated
    /// at the root, and the aside directory is renamed into the payload
    /// position. The two renames are not atomic as a pair; on failure the
    /// aside directory is renamed back into place, but a bag interrupted
    /// here should be inspected before reuse.
    ///
    /// # Errors
    ///
    /// Fails when directories cannot be created or renamed, when an
    /// algorithm name is unknown, or when writing any tag file or manifest
    /// fails.
    #[instrument(skip(self))]
    pub fn create(self, root: PathBuf) -> Result<Bag> {
        if !root.exists() {
            fs::create_dir_all(&root)?;
        }

        let layout = BagLayout::new(root.clone());
        if !layout.payload_path().exists() {
            if fs::read_dir(&root)?.next().is_none() {
                fs::create_dir(layout.payload_path())?;
            } else {
                info!("Relocating contents of {:?} into payload directory", root);
                relocate_into_payload(&root, layout.payload_path())?;
            }
        }

        let mut registry = AlgorithmRegistry::empty();
        for name in &self.algorithms {
            registry.register_builtin(name)?;
        }
        let primary_algorithm = if registry.contains(SHA256) {
            SHA256.to_string()
        } else {
            registry
                .names()
                .first()
                .map(|n| n.to_string())
                .ok_or_else(|| BagError::internal("a bag needs at least one algorithm"))?
        };

        let mut bag = Bag {
            layout,
            version: self.version,
            info: self.info,
            registry,
            primary_algorithm,
        };
        bag.store()?;
        Ok(bag)
    }
}

/// Move a populated directory's contents into its own payload subdirectory
///
/// Renames the root aside into a staging directory, recreates the root
/// empty, and renames the aside directory into the payload position. If
/// either later step fails, the aside directory is renamed back; the
/// rollback itself is best-effort and its failure is reported in the error.
fn relocate_into_payload(root: &Path, payload: &Path) -> Result<()> {
    let parent = root
        .parent()
        .ok_or_else(|| BagError::internal("bag root has no parent directory"))?;
    let aside = parent.join(format!(".satchel-relocate-{}", std::process::id()));
    if aside.exists() {
        return Err(BagError::internal(format!(
            "stale relocation directory in the way: {aside:?}"
        )));
    }

    fs::rename(root, &aside)?;

    let restore = |error: BagError| -> BagError {
        let _ = fs::remove_dir(root);
        match fs::rename(&aside, root) {
            Ok(()) => error,
            Err(undo) => BagError::internal(format!(
                "{error}; rollback also failed ({undo}), contents left at {aside:?}"
            )),
        }
    };

    if let Err(e) = fs::create_dir(root) {
        return Err(restore(e.into()));
    }
    if let Err(e) = fs::rename(&aside, payload) {
        return Err(restore(e.into()));
    }
    Ok(())
}
