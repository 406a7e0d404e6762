use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::{ObjectStorageBackend, StorageBackend, StorageOperation};
use crate::error::{AppError, Result};
use crate::key::{ConfigKeyFormatter, EnvironmentKeyFormatter, KeyFormatter, Prefix};
use crate::mapper::ObjectMapper;

/// A read-only backend over environment variables.
///
/// Given the prefix `TOPOLOGY`, the variable `TOPOLOGY_CACHE_DIR` is listed as `CACHE_DIR`
/// and `TOPOLOGY_DEPLOYMENTS_0_NAME=a` reads as the object `{deployments: [{name: a}]}`.
#[derive(Clone, Debug, Default)]
pub struct EnvironmentStorageBackend {
    prefix: Option<String>,
    /// A fixed set of variables. When `None`, the process environment is read on each call.
    vars: Option<BTreeMap<String, String>>,
}

impl EnvironmentStorageBackend {
    /// Create a backend over the live process environment.
    pub fn new(prefix: Option<&str>) -> Self {
        Self {
            prefix: prefix.map(String::from),
            vars: None,
        }
    }

    /// Create a backend over a fixed set of variables.
    pub fn from_iter<I>(prefix: Option<&str>, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            prefix: prefix.map(String::from),
            vars: Some(vars.into_iter().collect()),
        }
    }

    /// The prefix of this backend's variables.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        match &self.vars {
            Some(vars) => vars.clone(),
            None => std::env::vars().collect(),
        }
    }

    /// All variables beneath the prefix, keyed by their prefix-stripped names.
    pub fn entries(&self) -> BTreeMap<String, String> {
        let formatter = EnvironmentKeyFormatter;
        self.snapshot()
            .into_iter()
            .filter(|(key, _)| Prefix::matches(key, self.prefix(), &formatter))
            .map(|(key, val)| (Prefix::strip(&key, self.prefix(), &formatter), val))
            .collect()
    }
}

#[async_trait]
impl StorageBackend for EnvironmentStorageBackend {
    fn is_supported(&self, op: StorageOperation) -> bool {
        matches!(op, StorageOperation::List | StorageOperation::ReadBytes)
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.entries().into_keys().collect())
    }

    async fn read_bytes(&self, key: &str) -> Result<Vec<u8>> {
        if key.trim().is_empty() {
            return Err(AppError::IllegalArgument("key must not be empty".into()));
        }
        let name = Prefix::add(key, self.prefix(), &EnvironmentKeyFormatter);
        match self.snapshot().remove(&name) {
            Some(val) if !val.is_empty() => Ok(val.into_bytes()),
            _ => Err(AppError::StorageBackend(format!("key not found: {}", key))),
        }
    }

    async fn write_bytes(&self, _key: &str, _data: &[u8]) -> Result<()> {
        Err(AppError::UnsupportedStorageOperation(format!(
            "{} is not supported by the environment storage backend",
            StorageOperation::WriteBytes
        )))
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(AppError::UnsupportedStorageOperation(format!(
            "{} is not supported by the environment storage backend",
            StorageOperation::Delete
        )))
    }
}

#[async_trait]
impl ObjectStorageBackend for EnvironmentStorageBackend {
    /// Read every variable beneath the prefix as one object. The key is ignored.
    async fn read_object(&self, _key: &str) -> Result<Option<Value>> {
        let formatter = ConfigKeyFormatter;
        let entries = self.entries();
        if entries.is_empty() {
            return Ok(None);
        }
        let flat = entries.into_iter().map(|(key, val)| (formatter.normalize(&key), val));
        Ok(Some(ObjectMapper::new().from_flat_key_map(flat)))
    }

    async fn write_object(&self, _key: &str, _data: &Value) -> Result<()> {
        Err(AppError::UnsupportedStorageOperation(format!(
            "{} is not supported by the environment storage backend",
            StorageOperation::WriteBytes
        )))
    }
}
