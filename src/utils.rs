//! Utility functions shared across the satchel library
//!
//! Path manipulation (bag-relative paths are always recorded with forward
//! slashes, regardless of platform), atomic tag-file writing, and the
//! human-readable size formatting used for the `Bag-Size` field.

use crate::error::{BagError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Encode a relative path the way manifests record it
///
/// Joins the path components with `/` so that bags written on Windows and
/// Unix produce identical manifest lines.
pub fn encode_relative(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.join("/")
}

/// Decode a manifest-recorded relative path into a platform path
pub fn decode_relative(encoded: &str) -> PathBuf {
    encoded.split('/').collect()
}

/// Make a path relative to a base path
///
/// Tries a plain lexical strip first so that symbolic links in the base are
/// preserved, and only falls back to canonicalizing both sides when the
/// lexical strip fails (relative components, differing normalisation).
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| {
            BagError::internal(format!(
                "Path {:?} is not relative to {:?}",
                path_canon, base_canon
            ))
        })
}

/// Atomic file write (write to temp file then rename)
///
/// Tag files and manifests are always written this way so a crash never
/// leaves a half-written declaration in the bag.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;

    trace!("Wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}

/// Format a payload size for the `Bag-Size` field
///
/// Uses binary (1024-based) unit steps. Byte counts below 1 KB print as a
/// whole number, intermediate units print with one decimal, and the top
/// unit (which can exceed 1024) prints with two.
pub fn format_bag_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else if unit_idx < UNITS.len() - 1 {
        format!("{:.1} {}", size, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encode_decode_relative() {
        let path = Path::new("data").join("sub").join("file.txt");
        let encoded = encode_relative(&path);
        assert_eq!(encoded, "data/sub/file.txt");
        assert_eq!(decode_relative(&encoded), path);
    }

    #[test]
    fn test_make_relative() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let subdir = base.join("subdir");
        let file = subdir.join("file.txt");

        fs::create_dir_all(&subdir).unwrap();
        fs::write(&file, b"test").unwrap();

        let relative = make_relative(&file, base).unwrap();
        assert_eq!(relative, PathBuf::from("subdir/file.txt"));
    }

    #[test]
    fn test_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("bag-info.txt");

        atomic_write(&file_path, b"Source-Organization: test\n").unwrap();

        let content = fs::read(&file_path).unwrap();
        assert_eq!(content, b"Source-Organization: test\n");
        assert!(!file_path.with_extension("tmp").exists());
    }

    #[test]
    fn test_format_bag_size() {
        assert_eq!(format_bag_size(0), "0 B");
        assert_eq!(format_bag_size(8), "8 B");
        assert_eq!(format_bag_size(1023), "1023 B");
        assert_eq!(format_bag_size(1024), "1.0 KB");
        assert_eq!(format_bag_size(1536), "1.5 KB");
        assert_eq!(format_bag_size(10 * 1024 * 1024), "10.0 MB");
        assert_eq!(format_bag_size(1_099_511_627_776), "1.00 TB");
        assert_eq!(format_bag_size(2 * 1_099_511_627_776), "2.00 TB");
    }
}
