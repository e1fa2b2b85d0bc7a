use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Content-addressed key: the hex SHA-256 of every input that affects the
/// artifact. Two different input sets cannot collide by construction, and
/// identical inputs always resolve to the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives a key from an ordered list of input parts. Parts are hashed
    /// with a separator so that `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn of(parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        CacheKey(format!("{:x}", hasher.finalize()))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

/// Shared artifact store on disk. Entries are immutable once written;
/// concurrent writers for the same key race harmlessly because each write
/// lands in a unique temp file and is renamed into place atomically, so a
/// reader never observes a partial entry.
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create cache folder {:?}", root))?;
        Ok(Self { root })
    }

    fn entry_path(&self, key: &CacheKey, ext: &str) -> PathBuf {
        self.root.join(format!("{}.{}", key.as_hex(), ext))
    }

    /// Returns the path of a stored artifact, or `None` on a miss.
    pub fn get(&self, key: &CacheKey, ext: &str) -> Option<PathBuf> {
        let path = self.entry_path(key, ext);
        path.exists().then_some(path)
    }

    /// Stores an artifact under `key` and returns its final path. If the
    /// entry already exists the existing path is returned untouched; with a
    /// content-derived key the bytes are identical anyway. Each writer gets
    /// its own randomly named temp file, so concurrent same-key writers
    /// race harmlessly and whichever rename lands first wins.
    pub fn put(&self, key: &CacheKey, ext: &str, bytes: &[u8]) -> Result<PathBuf> {
        let final_path = self.entry_path(key, ext);
        if final_path.exists() {
            return Ok(final_path);
        }

        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(&self.root)
            .with_context(|| format!("failed to create cache temp in {:?}", self.root))?;
        tmp.write_all(bytes)
            .with_context(|| format!("failed to write cache temp for {}", key.as_hex()))?;

        match tmp.persist(&final_path) {
            Ok(_) => Ok(final_path),
            // Lost the race to another writer of the same key; their entry
            // is byte-identical, so use it.
            Err(_) if final_path.exists() => Ok(final_path),
            Err(e) => Err(e.error)
                .with_context(|| format!("failed to publish cache entry {:?}", final_path)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
