//! Storage backends.
//!
//! A backend reads and writes raw bytes over some medium. Object backends additionally marshal
//! those bytes to and from untyped objects. Keys are backend specific: a file name, a
//! ConfigMap data key, or an environment variable.

mod environment;
mod file;
mod yaml_map;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use environment::EnvironmentStorageBackend;
pub use file::YamlFileStorageBackend;
pub use yaml_map::YamlMapStorageBackend;

/// The operations a backend may support.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageOperation {
    List,
    ReadBytes,
    WriteBytes,
    Delete,
}

impl std::fmt::Display for StorageOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::List => "list",
                Self::ReadBytes => "readBytes",
                Self::WriteBytes => "writeBytes",
                Self::Delete => "delete",
            }
        )
    }
}

/// Raw byte storage.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Check if this backend supports the given operation.
    fn is_supported(&self, op: StorageOperation) -> bool;

    /// List all keys held by this backend.
    async fn list(&self) -> Result<Vec<String>>;

    /// Read the bytes stored under the given key.
    async fn read_bytes(&self, key: &str) -> Result<Vec<u8>>;

    /// Write the given bytes under the given key, replacing any previous value.
    async fn write_bytes(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Delete the value stored under the given key.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Storage of untyped objects.
#[async_trait]
pub trait ObjectStorageBackend: StorageBackend {
    /// Read the object stored under the given key, returning `None` if the key is absent.
    async fn read_object(&self, key: &str) -> Result<Option<Value>>;

    /// Write the given object under the given key.
    async fn write_object(&self, key: &str, data: &Value) -> Result<()>;
}

/// Decode YAML bytes into an untyped object. Empty documents decode to `None`.
pub(crate) fn decode_yaml(key: &str, bytes: &[u8]) -> Result<Option<Value>> {
    if bytes.iter().all(|byte| byte.is_ascii_whitespace()) {
        return Ok(None);
    }
    let value: Value = serde_yaml::from_slice(bytes).map_err(|err| crate::AppError::StorageBackend(format!("error parsing yaml under key {}: {}", key, err)))?;
    Ok(match value {
        Value::Null => None,
        value => Some(value),
    })
}

/// Encode an untyped object as YAML bytes.
pub(crate) fn encode_yaml(key: &str, data: &Value) -> Result<Vec<u8>> {
    serde_yaml::to_vec(data).map_err(|err| crate::AppError::StorageBackend(format!("error serializing yaml under key {}: {}", key, err)))
}
