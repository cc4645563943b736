//! Checksum algorithms and the fixity registry
//!
//! Every manifest in a bag is tied to a named checksum algorithm. This
//! module provides the [`FixityAlgorithm`] contract (file to lower-case hex
//! digest), built-in MD5 / SHA-256 / SHA-512 implementations, and an
//! ordered [`AlgorithmRegistry`] that maps names to implementations for a
//! given bag instance.
//!
//! The registry is populated at startup and can be extended at runtime by
//! registering further implementations under their manifest name. There is
//! no dynamic loading: an algorithm a bag names but the registry does not
//! hold is simply reported as unverifiable during verification.

use crate::error::{BagError, Result};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Manifest name of the legacy default algorithm
pub const MD5: &str = "md5";
/// Manifest name of the modern default algorithm
pub const SHA256: &str = "sha256";
/// Manifest name of the strongest built-in algorithm
pub const SHA512: &str = "sha512";

/// A pluggable checksum algorithm
///
/// Implementations are pure: the same file content always yields the same
/// digest, and the reported [`name`](FixityAlgorithm::name) is used to
/// build manifest filenames (`manifest-<name>.txt`).
pub trait FixityAlgorithm: Send + Sync {
    /// Short lower-case name as it appears in manifest filenames
    fn name(&self) -> &str;

    /// Compute the hex digest of a file's content
    ///
    /// # Errors
    ///
    /// Returns [`BagError::Io`] if the file cannot be read.
    fn digest_file(&self, path: &Path) -> Result<String>;

    /// Compute the hex digest of in-memory data
    fn digest_bytes(&self, data: &[u8]) -> String;
}

/// Stream a file through a SHA-family hasher in 8 KiB chunks
fn digest_file_with<D: Digest>(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// MD5, kept for verifying bags written by older tooling
#[derive(Debug, Default)]
pub struct Md5Fixity;

impl FixityAlgorithm for Md5Fixity {
    fn name(&self) -> &str {
        MD5
    }

    fn digest_file(&self, path: &Path) -> Result<String> {
        let mut file = File::open(path)?;
        let mut context = md5::Context::new();
        let mut buffer = vec![0u8; 8192];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            context.consume(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", context.compute()))
    }

    fn digest_bytes(&self, data: &[u8]) -> String {
        format!("{:x}", md5::compute(data))
    }
}

/// SHA-256, the modern default
#[derive(Debug, Default)]
pub struct Sha256Fixity;

impl FixityAlgorithm for Sha256Fixity {
    fn name(&self) -> &str {
        SHA256
    }

    fn digest_file(&self, path: &Path) -> Result<String> {
        digest_file_with::<Sha256>(path)
    }

    fn digest_bytes(&self, data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }
}

/// SHA-512
#[derive(Debug, Default)]
pub struct Sha512Fixity;

impl FixityAlgorithm for Sha512Fixity {
    fn name(&self) -> &str {
        SHA512
    }

    fn digest_file(&self, path: &Path) -> Result<String> {
        digest_file_with::<Sha512>(path)
    }

    fn digest_bytes(&self, data: &[u8]) -> String {
        hex::encode(Sha512::digest(data))
    }
}

/// Ordered table of the algorithms available to one bag instance
///
/// Registration order is preserved: manifests are generated in the order
/// algorithms were registered. Re-registering a name that is already
/// present is a no-op, not an error.
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    algorithms: Vec<Arc<dyn FixityAlgorithm>>,
}

impl fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AlgorithmRegistry")
            .field(&self.names())
            .finish()
    }
}

impl AlgorithmRegistry {
    /// Create a registry with no algorithms
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a registry holding the two defaults
    ///
    /// MD5 (legacy default) and SHA-256 (modern default) are registered so
    /// that bags created with either generation of defaults verify without
    /// further setup.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Md5Fixity));
        registry.register(Arc::new(Sha256Fixity));
        registry
    }

    /// Look up a built-in implementation by name
    pub fn builtin(name: &str) -> Option<Arc<dyn FixityAlgorithm>> {
        match name {
            MD5 => Some(Arc::new(Md5Fixity)),
            SHA256 => Some(Arc::new(Sha256Fixity)),
            SHA512 => Some(Arc::new(Sha512Fixity)),
            _ => None,
        }
    }

    /// Register an algorithm implementation
    ///
    /// Returns `true` if the algorithm was added, `false` if one with the
    /// same name was already registered (in which case nothing changes).
    pub fn register(&mut self, algorithm: Arc<dyn FixityAlgorithm>) -> bool {
        if self.contains(algorithm.name()) {
            debug!("Algorithm {} already registered", algorithm.name());
            return false;
        }
        self.algorithms.push(algorithm);
        true
    }

    /// Register a built-in algorithm by name
    ///
    /// # Errors
    ///
    /// Returns an error when `name` does not match a built-in algorithm.
    pub fn register_builtin(&mut self, name: &str) -> Result<()> {
        let algorithm = Self::builtin(name)
            .ok_or_else(|| BagError::internal(format!("no built-in algorithm named {name}")))?;
        self.register(algorithm);
        Ok(())
    }

    /// Look up a registered algorithm by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn FixityAlgorithm>> {
        self.algorithms.iter().find(|a| a.name() == name)
    }

    /// Check whether an algorithm name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered algorithm names, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.algorithms.iter().map(|a| a.name()).collect()
    }

    /// Iterate over registered algorithms in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn FixityAlgorithm>> {
        self.algorithms.iter()
    }

    /// Number of registered algorithms
    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    /// Whether the registry holds no algorithms
    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_known_digests() {
        let data = b"abc";
        assert_eq!(
            Md5Fixity.digest_bytes(data),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            Sha256Fixity.digest_bytes(data),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            Sha512Fixity.digest_bytes(data),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn test_file_and_bytes_digests_agree() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.bin");
        fs::write(&path, b"fixity sample content").unwrap();

        for name in [MD5, SHA256, SHA512] {
            let algorithm = AlgorithmRegistry::builtin(name).unwrap();
            assert_eq!(
                algorithm.digest_file(&path).unwrap(),
                algorithm.digest_bytes(b"fixity sample content"),
                "file/bytes disagree for {name}"
            );
        }
    }

    #[test]
    fn test_defaults() {
        let registry = AlgorithmRegistry::with_defaults();
        assert_eq!(registry.names(), vec![MD5, SHA256]);
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut registry = AlgorithmRegistry::with_defaults();
        assert!(!registry.register(Arc::new(Sha256Fixity)));
        assert_eq!(registry.len(), 2);

        assert!(registry.register(Arc::new(Sha512Fixity)));
        assert_eq!(registry.names(), vec![MD5, SHA256, SHA512]);
    }

    #[test]
    fn test_register_builtin_unknown() {
        let mut registry = AlgorithmRegistry::empty();
        assert!(registry.register_builtin("whirlpool").is_err());
        assert!(registry.register_builtin("sha512").is_ok());
        assert!(registry.contains("sha512"));
    }
}
