//! Bag directory layout and file partitioning
//!
//! A bag is a plain directory tree: the payload lives under a dedicated
//! subdirectory (`data/` by convention) and everything else under the root
//! is tag material (declarations, metadata, manifests). This module
//! resolves those paths and partitions the files on disk into the two sets.
//!
//! The partition is structural, not name-based: a file is payload if and
//! only if its path is nested under the payload directory. When one of the
//! two roots is nested inside the other, traversal prunes into the other
//! root so no file is counted twice.

use crate::error::{BagError, Result};
use crate::utils;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Conventional name of the payload directory under the bag root
pub const PAYLOAD_DIR_NAME: &str = "data";

/// Resolved paths for a single bag on disk
///
/// Paths are resolved once at construction and cached for the lifetime of
/// the value. The metadata directory defaults to the bag root itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagLayout {
    /// Bag root directory
    root: PathBuf,
    /// Directory holding the payload files
    payload_dir: PathBuf,
    /// Directory holding tag files (defaults to the root)
    metadata_dir: PathBuf,
}

/// The structural split of a bag's regular files
#[derive(Debug, Clone, Default)]
pub struct FilePartition {
    /// Root-relative paths of every payload file
    pub payload: Vec<PathBuf>,
    /// Root-relative paths of every tag file
    pub tags: Vec<PathBuf>,
}

impl BagLayout {
    /// Resolve the layout for a bag rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let payload_dir = root.join(PAYLOAD_DIR_NAME);
        let metadata_dir = root.clone();
        Self {
            root,
            payload_dir,
            metadata_dir,
        }
    }

    /// Bag root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the payload directory
    pub fn payload_path(&self) -> &Path {
        &self.payload_dir
    }

    /// Absolute path of the metadata directory
    pub fn metadata_path(&self) -> &Path {
        &self.metadata_dir
    }

    /// Root-relative name of the payload directory
    pub fn payload_relative(&self) -> &str {
        PAYLOAD_DIR_NAME
    }

    /// Resolve an absolute path for a root-relative bag path
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Check that the root and payload directories exist
    ///
    /// # Errors
    ///
    /// Returns [`BagError::MissingRoot`] or [`BagError::MissingPayloadDir`]
    /// when either directory is absent.
    pub fn ensure_exists(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(BagError::MissingRoot(self.root.clone()));
        }
        if !self.payload_dir.is_dir() {
            return Err(BagError::MissingPayloadDir(self.payload_dir.clone()));
        }
        Ok(())
    }

    /// Collect every regular payload file, as root-relative paths
    ///
    /// Walks the payload directory, pruning into the metadata directory if
    /// it happens to be nested inside the payload tree. Directories and
    /// symbolic links are skipped. The result is sorted by path.
    pub fn payload_files(&self) -> Result<Vec<PathBuf>> {
        self.ensure_exists()?;
        self.collect_files(&self.payload_dir, &self.metadata_dir)
    }

    /// Collect every regular tag file, as root-relative paths
    ///
    /// Walks the metadata directory, pruning into the payload tree so that
    /// payload files never appear in the tag set. The result is sorted by
    /// path.
    pub fn tag_files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(BagError::MissingRoot(self.root.clone()));
        }
        self.collect_files(&self.metadata_dir, &self.payload_dir)
    }

    /// Partition the bag's files into payload and tag sets
    pub fn partition(&self) -> Result<FilePartition> {
        Ok(FilePartition {
            payload: self.payload_files()?,
            tags: self.tag_files()?,
        })
    }

    /// Walk `walk_root`, pruning `pruned` subtrees, yielding regular files
    fn collect_files(&self, walk_root: &Path, pruned: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        let walker = WalkDir::new(walk_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.path() != pruned);

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                trace!("Skipping non-regular entry {:?}", entry.path());
                continue;
            }
            files.push(utils::make_relative(entry.path(), &self.root)?);
        }

        files.sort();
        debug!("Collected {} files under {:?}", files.len(), walk_root);
        Ok(files)
    }
}
