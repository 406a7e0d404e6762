use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::backend::{decode_yaml, encode_yaml, ObjectStorageBackend, StorageBackend, StorageOperation};
use crate::error::{AppError, Result};

/// A backend over a map of keys to YAML documents, such as the `data` of a ConfigMap.
///
/// The map lives in memory. Callers which own the real medium take a snapshot with `data`
/// after writing and push it wherever it needs to go.
#[derive(Debug, Default)]
pub struct YamlMapStorageBackend {
    data: RwLock<BTreeMap<String, String>>,
}

impl YamlMapStorageBackend {
    /// Create a new instance over the given data.
    pub fn new(data: BTreeMap<String, String>) -> Self {
        Self { data: RwLock::new(data) }
    }

    /// A snapshot of the current data.
    pub async fn data(&self) -> BTreeMap<String, String> {
        self.data.read().await.clone()
    }
}

#[async_trait]
impl StorageBackend for YamlMapStorageBackend {
    fn is_supported(&self, _op: StorageOperation) -> bool {
        true
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.data.read().await.keys().cloned().collect())
    }

    async fn read_bytes(&self, key: &str) -> Result<Vec<u8>> {
        self.data
            .read()
            .await
            .get(key)
            .map(|val| val.clone().into_bytes())
            .ok_or_else(|| AppError::StorageBackend(format!("key not found: {}", key)))
    }

    async fn write_bytes(&self, key: &str, data: &[u8]) -> Result<()> {
        if key.trim().is_empty() {
            return Err(AppError::IllegalArgument("key must not be empty".into()));
        }
        let text = std::str::from_utf8(data).map_err(|err| AppError::StorageBackend(format!("data for key {} is not valid utf-8: {}", key, err)))?;
        self.data.write().await.insert(key.to_string(), text.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.data.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(AppError::StorageBackend(format!("key not found: {}", key))),
        }
    }
}

#[async_trait]
impl ObjectStorageBackend for YamlMapStorageBackend {
    async fn read_object(&self, key: &str) -> Result<Option<Value>> {
        let text = match self.data.read().await.get(key) {
            Some(text) => text.clone(),
            None => return Ok(None),
        };
        decode_yaml(key, text.as_bytes())
    }

    async fn write_object(&self, key: &str, data: &Value) -> Result<()> {
        let bytes = encode_yaml(key, data)?;
        self.write_bytes(key, &bytes).await
    }
}
