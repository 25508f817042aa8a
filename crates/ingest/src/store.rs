use std::fmt::Write;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },
    #[error("{message}")]
    Unavailable { message: String },
}

/// Object body plus the fingerprint the backend reports for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectData {
    pub bytes: Vec<u8>,
    pub fingerprint: String,
}

/// Read side of a report delivery location.
pub trait ObjectStore: Send + Sync {
    /// Human readable name of the location, used in error messages.
    fn location(&self) -> &str;

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Fingerprint of the object without transferring its body.
    fn head(&self, key: &str) -> Result<String, StoreError>;

    fn get(&self, key: &str) -> Result<ObjectData, StoreError>;
}

pub(crate) fn normalize_key(key: &str) -> &str {
    key.trim_start_matches('/')
}

pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut out, "{:02x}", byte);
    }
    out
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_digest(&hasher.finalize())
}

/// Objects are the regular files below `root`, keyed by their relative path.
pub struct FsObjectStore {
    root: PathBuf,
    location: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let location = root.to_string_lossy().to_string();
        Self { root, location }
    }

    pub fn with_location(root: impl Into<PathBuf>, location: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            location: location.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self) -> Result<(), StoreError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Unavailable {
                message: format!("directory {} does not exist", self.root.display()),
            })
        }
    }

    /// Keys must stay below the root: parent or absolute components are
    /// treated as missing objects.
    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(normalize_key(key));
        let contained = relative
            .components()
            .all(|part| matches!(part, Component::Normal(_) | Component::CurDir));
        if !contained || relative.as_os_str().is_empty() {
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.ensure_root()?;
        let path = self.object_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            Err(err) => Err(StoreError::Unavailable {
                message: format!("{}: {}", path.display(), err),
            }),
        }
    }
}

impl ObjectStore for FsObjectStore {
    fn location(&self) -> &str {
        &self.location
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.ensure_root()?;
        let prefix = normalize_key(prefix);
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|err| StoreError::Unavailable {
                message: err.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn head(&self, key: &str) -> Result<String, StoreError> {
        Ok(sha256_hex(&self.read(key)?))
    }

    fn get(&self, key: &str) -> Result<ObjectData, StoreError> {
        let bytes = self.read(key)?;
        let fingerprint = sha256_hex(&bytes);
        Ok(ObjectData { bytes, fingerprint })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_store_lists_relative_keys_under_prefix() {
        let dir = tempfile::tempdir().expect("temp dir");
        let nested = dir.path().join("koku/20180901-20181001");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(nested.join("koku-Manifest.json"), "{}").expect("write");
        fs::write(dir.path().join("other.txt"), "x").expect("write");

        let store = FsObjectStore::new(dir.path());
        let keys = store.list("/koku").expect("list");
        assert_eq!(keys, vec!["koku/20180901-20181001/koku-Manifest.json"]);
        assert_eq!(store.list("").expect("list all").len(), 2);
    }

    #[test]
    fn fs_store_distinguishes_missing_key_from_missing_root() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FsObjectStore::new(dir.path());
        assert!(matches!(store.head("nope.csv"), Err(StoreError::NotFound { .. })));

        let missing = FsObjectStore::new(dir.path().join("absent"));
        assert!(matches!(missing.list(""), Err(StoreError::Unavailable { .. })));
    }

    #[test]
    fn fs_store_refuses_keys_outside_root() {
        let dir = tempfile::tempdir().expect("temp dir");
        let bucket = dir.path().join("bucket");
        fs::create_dir_all(bucket.join("koku")).expect("mkdir");
        fs::write(dir.path().join("secret.txt"), "outside").expect("write");
        fs::write(bucket.join("koku/report.csv"), "inside").expect("write");

        let store = FsObjectStore::new(&bucket);
        for key in ["../secret.txt", "koku/../../secret.txt", "/../secret.txt"] {
            assert!(
                matches!(store.get(key), Err(StoreError::NotFound { .. })),
                "{key} escaped the store root"
            );
            assert!(matches!(store.head(key), Err(StoreError::NotFound { .. })));
        }
        assert_eq!(store.get("./koku/report.csv").expect("inside").bytes, b"inside");
    }
}
