//! File resolution - turning asset names into readable files.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use lodestone_core::alloc::HashMap;

use crate::error::{AssetError, AssetResult};

/// Where the bytes of a resolved file come from.
#[derive(Debug, Clone)]
enum FileSource {
    /// A file on disk.
    Disk(PathBuf),
    /// Bytes already in memory (embedded data, tests).
    Memory(Arc<[u8]>),
}

/// A successfully resolved file, handed to loader capabilities.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    name: String,
    source: FileSource,
}

impl ResolvedFile {
    /// Create a resolved file backed by a path on disk.
    pub fn disk(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Disk(path.into()),
        }
    }

    /// Create a resolved file backed by in-memory bytes.
    pub fn memory(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Memory(bytes.into()),
        }
    }

    /// The logical asset name this file was resolved from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The on-disk path, if this file lives on disk.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            FileSource::Disk(path) => Some(path),
            FileSource::Memory(_) => None,
        }
    }

    /// Read the entire file contents.
    pub fn read_bytes(&self) -> AssetResult<Vec<u8>> {
        match &self.source {
            FileSource::Disk(path) => std::fs::read(path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AssetError::NotFound {
                        name: self.name.clone(),
                    }
                } else {
                    AssetError::Io {
                        path: path.clone(),
                        source: e,
                    }
                }
            }),
            FileSource::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// Maps asset names to readable files.
pub trait FileResolver: Send + Sync {
    /// Resolve a name, failing with [`AssetError::NotFound`] if absent.
    fn resolve(&self, name: &str) -> AssetResult<ResolvedFile>;
}

impl<R: FileResolver + ?Sized> FileResolver for Arc<R> {
    fn resolve(&self, name: &str) -> AssetResult<ResolvedFile> {
        (**self).resolve(name)
    }
}

/// Filesystem resolver rooted at a base directory.
pub struct FsResolver {
    base: PathBuf,
}

impl FsResolver {
    /// Create a resolver rooted at `base`. Absolute names bypass the base.
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    fn full_path(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}

impl FileResolver for FsResolver {
    fn resolve(&self, name: &str) -> AssetResult<ResolvedFile> {
        let path = self.full_path(name);
        if !path.is_file() {
            return Err(AssetError::NotFound {
                name: name.to_string(),
            });
        }
        Ok(ResolvedFile::disk(name, path))
    }
}

/// In-memory resolver for tests and embedded assets.
///
/// Insertion takes `&self` so fixtures can be added after the resolver has
/// been handed to a manager (share it via `Arc`).
#[derive(Default)]
pub struct MemoryResolver {
    files: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add bytes for a name.
    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.files
            .write()
            .expect("memory resolver lock poisoned")
            .insert(name.into(), bytes.into());
    }

    /// Remove the bytes for a name.
    pub fn remove(&self, name: &str) -> bool {
        self.files
            .write()
            .expect("memory resolver lock poisoned")
            .remove(name)
            .is_some()
    }
}

impl FileResolver for MemoryResolver {
    fn resolve(&self, name: &str) -> AssetResult<ResolvedFile> {
        let files = self.files.read().expect("memory resolver lock poisoned");
        match files.get(name) {
            Some(bytes) => Ok(ResolvedFile::memory(name, bytes.clone())),
            None => Err(AssetError::NotFound {
                name: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_memory_resolver_roundtrip() {
        let resolver = MemoryResolver::new();
        resolver.insert("data/blob.bin", vec![1u8, 2, 3]);

        let file = resolver.resolve("data/blob.bin").unwrap();
        assert_eq!(file.name(), "data/blob.bin");
        assert_eq!(file.read_bytes().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_memory_resolver_missing() {
        let resolver = MemoryResolver::new();
        let err = resolver.resolve("nope.txt").unwrap_err();
        assert!(matches!(err, AssetError::NotFound { .. }));
    }

    #[test]
    fn test_fs_resolver_base_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("hello.txt")).unwrap();
        writeln!(f, "hi").unwrap();

        let resolver = FsResolver::new(dir.path());
        let file = resolver.resolve("hello.txt").unwrap();
        assert_eq!(file.read_bytes().unwrap(), b"hi\n");

        assert!(matches!(
            resolver.resolve("missing.txt"),
            Err(AssetError::NotFound { .. })
        ));
    }
}
