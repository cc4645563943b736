//! Manifest and tag-manifest codec
//!
//! A manifest file carries one line per tracked file, `<digest>
//! <relative-path>`, and is named after the algorithm that produced the
//! digests (`manifest-<algo>.txt` for payload files, `tagmanifest-<algo>.txt`
//! for tag files). Malformed lines are tolerated and skipped; a manifest
//! filename that cannot carry an algorithm name is a layout fault and is
//! fatal.

use crate::error::{BagError, Result};
use crate::utils;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Whether a manifest covers payload files or tag files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// `manifest-<algo>.txt`, covering files under the payload directory
    Payload,
    /// `tagmanifest-<algo>.txt`, covering everything else
    Tag,
}

impl ManifestKind {
    /// Filename prefix for this kind
    pub fn prefix(&self) -> &'static str {
        match self {
            ManifestKind::Payload => "manifest-",
            ManifestKind::Tag => "tagmanifest-",
        }
    }
}

/// One algorithm's digest table for one scope of a bag
///
/// Within a manifest a relative path maps to exactly one digest; parsing a
/// duplicate path keeps the last occurrence. Entries serialize in path
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    kind: ManifestKind,
    algorithm: String,
    entries: BTreeMap<String, String>,
}

impl Manifest {
    /// Create an empty manifest for `algorithm`
    pub fn new(kind: ManifestKind, algorithm: impl Into<String>) -> Self {
        Self {
            kind,
            algorithm: algorithm.into(),
            entries: BTreeMap::new(),
        }
    }

    /// The scope this manifest covers
    pub fn kind(&self) -> ManifestKind {
        self.kind
    }

    /// Name of the algorithm whose digests this manifest records
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Build the manifest filename for an algorithm name
    ///
    /// # Errors
    ///
    /// Returns [`BagError::PathDerivation`] when the algorithm name is
    /// empty or would smuggle a path separator or whitespace into the
    /// filename. That situation is an internal-consistency fault, not bad
    /// input data.
    pub fn file_name_for(kind: ManifestKind, algorithm: &str) -> Result<String> {
        if algorithm.is_empty()
            || algorithm.contains(['/', '\\'])
            || algorithm.chars().any(char::is_whitespace)
        {
            return Err(BagError::PathDerivation(format!(
                "algorithm name {algorithm:?} cannot form a manifest filename"
            )));
        }
        Ok(format!("{}{}.txt", kind.prefix(), algorithm))
    }

    /// The filename this manifest serializes to
    pub fn file_name(&self) -> Result<String> {
        Self::file_name_for(self.kind, &self.algorithm)
    }

    /// Recover (kind, algorithm) from a manifest filename
    ///
    /// Returns `None` when the name is not a manifest filename. The
    /// tag-manifest prefix is tested first since it embeds the payload
    /// manifest prefix.
    pub fn from_file_name(name: &str) -> Option<(ManifestKind, &str)> {
        let stem = name.strip_suffix(".txt")?;
        if let Some(algorithm) = stem.strip_prefix(ManifestKind::Tag.prefix()) {
            if !algorithm.is_empty() {
                return Some((ManifestKind::Tag, algorithm));
            }
            return None;
        }
        let algorithm = stem.strip_prefix(ManifestKind::Payload.prefix())?;
        if algorithm.is_empty() {
            return None;
        }
        Some((ManifestKind::Payload, algorithm))
    }

    /// Parse manifest text
    ///
    /// Each line must split into exactly two whitespace-separated tokens,
    /// digest then relative path. Lines that do not are skipped with a
    /// warning rather than failing the parse; permissive consumers of the
    /// format behave the same way. `source` is only used in log output.
    pub fn parse(
        text: &str,
        kind: ManifestKind,
        algorithm: impl Into<String>,
        source: &Path,
    ) -> Self {
        let mut manifest = Self::new(kind, algorithm);

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != 2 {
                warn!("Skipping malformed manifest line in {:?}: {:?}", source, line);
                continue;
            }
            manifest.insert(tokens[1], tokens[0]);
        }

        debug!(
            "Parsed {} entries from {:?} ({})",
            manifest.len(),
            source,
            manifest.algorithm
        );
        manifest
    }

    /// Read a manifest from disk, deriving kind and algorithm from its name
    ///
    /// # Errors
    ///
    /// Returns [`BagError::PathDerivation`] when the filename does not
    /// carry an algorithm name, and [`BagError::Io`] when the file cannot
    /// be read.
    pub fn load(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (kind, algorithm) = Self::from_file_name(&name).ok_or_else(|| {
            BagError::PathDerivation(format!("no algorithm derivable from {name:?}"))
        })?;
        let algorithm = algorithm.to_string();

        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text, kind, algorithm, path))
    }

    /// Serialize to manifest text, one `<digest>  <relative-path>` per line
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (path, digest) in &self.entries {
            out.push_str(digest);
            out.push_str("  ");
            out.push_str(path);
            out.push('\n');
        }
        out
    }

    /// Atomically write the manifest into `dir`, returning the path written
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name()?);
        utils::atomic_write(&path, self.serialize().as_bytes())?;
        Ok(path)
    }

    /// Record a digest for a relative path, replacing any previous digest
    pub fn insert(&mut self, relative: impl Into<String>, digest: impl Into<String>) {
        self.entries.insert(relative.into(), digest.into());
    }

    /// The digest recorded for a relative path
    pub fn digest_for(&self, relative: &str) -> Option<&str> {
        self.entries.get(relative).map(String::as_str)
    }

    /// Iterate over (relative path, digest) entries in path order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, d)| (p.as_str(), d.as_str()))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// List the manifest files of one kind present in a directory
///
/// Only the directory itself is examined; manifests never nest. The result
/// is sorted by filename so verification output is deterministic.
pub fn find_manifests(dir: &Path, kind: ManifestKind) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match Manifest::from_file_name(&name) {
            Some((k, _)) if k == kind => found.push(entry.path()),
            _ => {}
        }
    }

    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_name_round_trip() {
        let name = Manifest::file_name_for(ManifestKind::Payload, "sha256").unwrap();
        assert_eq!(name, "manifest-sha256.txt");
        assert_eq!(
            Manifest::from_file_name(&name),
            Some((ManifestKind::Payload, "sha256"))
        );

        let name = Manifest::file_name_for(ManifestKind::Tag, "md5").unwrap();
        assert_eq!(name, "tagmanifest-md5.txt");
        assert_eq!(
            Manifest::from_file_name(&name),
            Some((ManifestKind::Tag, "md5"))
        );
    }

    #[test]
    fn test_file_name_rejects_separators() {
        assert!(matches!(
            Manifest::file_name_for(ManifestKind::Payload, "sha/256"),
            Err(BagError::PathDerivation(_))
        ));
        assert!(matches!(
            Manifest::file_name_for(ManifestKind::Payload, ""),
            Err(BagError::PathDerivation(_))
        ));
        assert!(matches!(
            Manifest::file_name_for(ManifestKind::Tag, "sha 256"),
            Err(BagError::PathDerivation(_))
        ));
    }

    #[test]
    fn test_from_file_name_non_manifests() {
        assert_eq!(Manifest::from_file_name("bag-info.txt"), None);
        assert_eq!(Manifest::from_file_name("manifest-.txt"), None);
        assert_eq!(Manifest::from_file_name("manifest-sha256"), None);
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let text = "deadbeef  data/a.txt\n\nnot-a-valid-line\naa bb data/too many.txt\ncafe  data/b.txt\n";
        let manifest = Manifest::parse(text, ManifestKind::Payload, "md5", Path::new("m"));

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.digest_for("data/a.txt"), Some("deadbeef"));
        assert_eq!(manifest.digest_for("data/b.txt"), Some("cafe"));
    }

    #[test]
    fn test_parse_last_duplicate_wins() {
        let text = "aaaa  data/a.txt\nbbbb  data/a.txt\n";
        let manifest = Manifest::parse(text, ManifestKind::Payload, "md5", Path::new("m"));
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.digest_for("data/a.txt"), Some("bbbb"));
    }

    #[test]
    fn test_serialize_format() {
        let mut manifest = Manifest::new(ManifestKind::Payload, "sha256");
        manifest.insert("data/b.txt", "bb");
        manifest.insert("data/a.txt", "aa");

        assert_eq!(manifest.serialize(), "aa  data/a.txt\nbb  data/b.txt\n");
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let mut manifest = Manifest::new(ManifestKind::Tag, "sha256");
        manifest.insert("bag-info.txt", "00ff");

        let path = manifest.save_to(dir.path()).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "tagmanifest-sha256.txt"
        );

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_load_underivable_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest-.txt");
        std::fs::write(&path, "aa  data/a.txt\n").unwrap();

        assert!(matches!(
            Manifest::load(&path),
            Err(BagError::PathDerivation(_))
        ));
    }

    #[test]
    fn test_find_manifests() {
        let dir = TempDir::new().unwrap();
        for name in [
            "manifest-md5.txt",
            "manifest-sha256.txt",
            "tagmanifest-md5.txt",
            "bag-info.txt",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let payload = find_manifests(dir.path(), ManifestKind::Payload).unwrap();
        let names: Vec<_> = payload
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["manifest-md5.txt", "manifest-sha256.txt"]);

        let tag = find_manifests(dir.path(), ManifestKind::Tag).unwrap();
        assert_eq!(tag.len(), 1);
    }
}
