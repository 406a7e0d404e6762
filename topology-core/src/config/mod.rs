//! Layered configuration.
//!
//! A `LayeredConfig` aggregates config sources, each identified by a name and an ordinal.
//! Lookups consult sources from the highest ordinal down; the first source defining a key wins,
//! unless source values are merged, in which case object values are combined field by field.

mod layered;
mod model;
mod sources;

use std::any::Any;
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::key::{ConfigKeyFormatter, KeyFormatter};
use crate::mapper::ObjectMapper;

pub use layered::{LayeredConfig, LayeredConfigBuilder};
pub use model::ModelConfigSource;
pub use sources::{EnvironmentConfigSource, StaticConfigSource};

/// The ordinal of the built-in defaults.
pub const DEFAULTS_ORDINAL: i32 = 0;
/// The ordinal of environment variables.
pub const ENVIRONMENT_ORDINAL: i32 = 100;
/// The ordinal of the local user config.
pub const LOCAL_CONFIG_ORDINAL: i32 = 200;
/// The ordinal of a deployment's remote config.
pub const REMOTE_CONFIG_ORDINAL: i32 = 300;

/// The prefix of environment variables read as configuration.
pub const DEFAULT_ENV_PREFIX: &str = "TOPOLOGY";

/// A source of configuration values.
///
/// Two sources are duplicates when both their name and ordinal match.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &str;

    fn ordinal(&self) -> i32;

    /// The prefix of this source's keys within its medium, if any.
    fn prefix(&self) -> Option<&str> {
        None
    }

    /// This source's data as a tree, or `None` when there is nothing loaded.
    fn tree(&self) -> Option<&Value>;

    /// The value at the given dot separated key.
    fn value(&self, key: &str) -> Option<Value> {
        lookup(self.tree()?, key).cloned()
    }

    /// This source's data flattened into dot separated keys.
    fn properties(&self) -> BTreeMap<String, String> {
        self.tree().map(|tree| ObjectMapper::new().to_flat_key_map(tree)).unwrap_or_default()
    }

    fn property_names(&self) -> Vec<String> {
        self.properties().into_keys().collect()
    }

    /// Check if this source's data can be reloaded after construction.
    fn is_refreshable(&self) -> bool {
        false
    }

    /// Load this source's data from its medium.
    async fn load(&mut self) -> Result<()>;

    /// Reload this source's data. Its name, ordinal and registration never change.
    async fn refresh(&mut self) -> Result<()> {
        if self.is_refreshable() {
            self.load().await?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Find the value at the given key within a tree. Numeric segments index into arrays.
pub(crate) fn lookup<'a>(tree: &'a Value, key: &str) -> Option<&'a Value> {
    let formatter = ConfigKeyFormatter;
    let key = formatter.normalize(key);
    if key.is_empty() {
        return Some(tree);
    }
    let mut node = tree;
    for segment in formatter.split(&key).ok()? {
        node = match node {
            Value::Object(map) => map.get(&segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match node {
        Value::Null => None,
        node => Some(node),
    }
}

/// Merge `overlay` into `base`, field by field.
///
/// Objects merge recursively, any other overlay value replaces the base value, and null overlay
/// values leave the base untouched.
pub(crate) fn merge_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (_, Value::Null) => (),
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, val) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge_values(existing, val),
                    None => {
                        if !val.is_null() {
                            base.insert(key.clone(), val.clone());
                        }
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}
