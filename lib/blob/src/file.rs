use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BlobError;
use crate::traits::BlobStore;

/// FileStore is a BlobStore backed by the local filesystem.
///
/// Keys are mapped to paths under `base_dir`:
///   key "var/users.json" → `{base_dir}/var/users.json`
///
/// Writes go to a sibling temp file first and are moved into place with a
/// rename, so readers never observe a half-written artifact.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a new FileStore rooted at `base_dir`.
    /// The directory is created if it doesn't exist.
    pub fn open(base_dir: &Path) -> Result<Self, BlobError> {
        fs::create_dir_all(base_dir).map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// Resolve a key to a filesystem path. Rejects keys that escape
    /// base_dir.
    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        if key.is_empty() || key.starts_with('/') || key.starts_with('\\') {
            return Err(BlobError::Io(format!("invalid blob key: {:?}", key)));
        }
        if key.split(['/', '\\']).any(|part| part == "..") {
            return Err(BlobError::Io(format!(
                "path traversal detected in key: {:?}",
                key
            )));
        }
        Ok(self.base_dir.join(key))
    }
}

impl BlobStore for FileStore {
    fn get_json(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.resolve(key)?;
        if !path.is_file() {
            return Err(BlobError::NotFound(key.to_string()));
        }
        fs::read(&path).map_err(|e| BlobError::Io(e.to_string()))
    }

    fn put_json(&self, key: &str, data: &[u8]) -> Result<(), BlobError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BlobError::Io(e.to_string()))?;
        }

        let tmp = {
            let mut name = path.clone().into_os_string();
            name.push(".tmp");
            PathBuf::from(name)
        };
        fs::write(&tmp, data).map_err(|e| BlobError::Io(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.resolve(key)?;
        Ok(path.is_file())
    }
}
