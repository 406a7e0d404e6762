use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::{decode_yaml, encode_yaml, ObjectStorageBackend, StorageBackend, StorageOperation};
use crate::error::{AppError, Result};

/// A backend storing one YAML document per key beneath a base directory.
///
/// Writes land in a temporary sibling file which is then renamed over the target, so readers
/// observe either the previous or the new document and never a partial one.
#[derive(Clone, Debug)]
pub struct YamlFileStorageBackend {
    base_dir: PathBuf,
}

impl YamlFileStorageBackend {
    /// Create a new instance rooted at the given directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    /// The directory holding this backend's files.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::IllegalArgument("key must not be empty".into()));
        }
        if Path::new(key).components().any(|comp| !matches!(comp, std::path::Component::Normal(_))) {
            return Err(AppError::IllegalArgument(format!("key must be a plain relative file name, got {}", key)));
        }
        Ok(self.base_dir.join(key))
    }
}

#[async_trait]
impl StorageBackend for YamlFileStorageBackend {
    fn is_supported(&self, _op: StorageOperation) -> bool {
        true
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(AppError::StorageBackend(format!("error listing {:?}: {}", self.base_dir, err))),
        };
        let mut keys = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| AppError::StorageBackend(format!("error listing {:?}: {}", self.base_dir, err)))?
        {
            let is_file = entry.file_type().await.map(|ft| ft.is_file()).unwrap_or(false);
            if let (true, Some(name)) = (is_file, entry.file_name().to_str()) {
                if !name.starts_with('.') {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn read_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => AppError::StorageBackend(format!("key not found: {}", key)),
            _ => AppError::StorageBackend(format!("error reading {:?}: {}", path, err)),
        })
    }

    #[tracing::instrument(level = "debug", skip(self, data), err)]
    async fn write_bytes(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|err| AppError::StorageBackend(format!("error creating {:?}: {}", self.base_dir, err)))?;
        let tmp_path = self.base_dir.join(format!(".{}.tmp", key.trim()));
        tokio::fs::write(&tmp_path, data)
            .await
            .map_err(|err| AppError::StorageBackend(format!("error writing {:?}: {}", tmp_path, err)))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|err| AppError::StorageBackend(format!("error moving {:?} into place: {}", path, err)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::remove_file(&path).await.map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => AppError::StorageBackend(format!("key not found: {}", key)),
            _ => AppError::StorageBackend(format!("error deleting {:?}: {}", path, err)),
        })
    }
}

#[async_trait]
impl ObjectStorageBackend for YamlFileStorageBackend {
    async fn read_object(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => decode_yaml(key, &bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::StorageBackend(format!("error reading {:?}: {}", path, err))),
        }
    }

    async fn write_object(&self, key: &str, data: &Value) -> Result<()> {
        let bytes = encode_yaml(key, data)?;
        self.write_bytes(key, &bytes).await
    }
}
