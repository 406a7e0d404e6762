use std::any::Any;

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::{EnvironmentStorageBackend, ObjectStorageBackend};
use crate::config::{ConfigSource, DEFAULTS_ORDINAL, ENVIRONMENT_ORDINAL};
use crate::error::{AppError, Result};

/// The defaults shipped with the tool.
const DEFAULTS_YAML: &str = include_str!("../../resources/defaults.yaml");

/// A source over a fixed YAML document.
#[derive(Clone, Debug)]
pub struct StaticConfigSource {
    name: String,
    ordinal: i32,
    yaml: String,
    tree: Option<Value>,
}

impl StaticConfigSource {
    /// Create a new instance over the given YAML document.
    pub fn new(name: impl Into<String>, ordinal: i32, yaml: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ordinal,
            yaml: yaml.into(),
            tree: None,
        }
    }

    /// The built-in defaults of the tool.
    pub fn defaults() -> Self {
        Self::new("defaults", DEFAULTS_ORDINAL, DEFAULTS_YAML)
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
    }

    fn tree(&self) -> Option<&Value> {
        self.tree.as_ref()
    }

    async fn load(&mut self) -> Result<()> {
        self.tree = crate::backend::decode_yaml(&self.name, self.yaml.as_bytes())
            .map_err(|err| AppError::Configuration(format!("invalid static config {}: {}", self.name, err)))?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A source over environment variables beneath a prefix.
///
/// Variable names map to dot separated keys, so `TOPOLOGY_CACHE_DIR` reads as `cache.dir`.
/// All values are strings; typed reads convert them.
#[derive(Clone, Debug)]
pub struct EnvironmentConfigSource {
    backend: EnvironmentStorageBackend,
    tree: Option<Value>,
}

impl EnvironmentConfigSource {
    /// Create a new instance over the live process environment.
    pub fn new(prefix: Option<&str>) -> Self {
        Self::with_backend(EnvironmentStorageBackend::new(prefix))
    }

    /// Create a new instance over the given backend.
    pub fn with_backend(backend: EnvironmentStorageBackend) -> Self {
        Self { backend, tree: None }
    }
}

#[async_trait]
impl ConfigSource for EnvironmentConfigSource {
    fn name(&self) -> &str {
        "environment"
    }

    fn ordinal(&self) -> i32 {
        ENVIRONMENT_ORDINAL
    }

    fn prefix(&self) -> Option<&str> {
        self.backend.prefix()
    }

    fn tree(&self) -> Option<&Value> {
        self.tree.as_ref()
    }

    fn is_refreshable(&self) -> bool {
        true
    }

    async fn load(&mut self) -> Result<()> {
        self.tree = self.backend.read_object("").await?;
        tracing::debug!(prefix = ?self.backend.prefix(), "loaded environment config");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
