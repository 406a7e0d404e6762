use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::backend::EnvironmentStorageBackend;
use crate::config::{merge_values, ConfigSource, EnvironmentConfigSource, StaticConfigSource, DEFAULT_ENV_PREFIX};
use crate::error::{AppError, Result};
use crate::mapper::ObjectMapper;

/// Configuration aggregated from a set of sources, ordered by descending ordinal.
pub struct LayeredConfig {
    /// Sorted by descending ordinal. Sources of equal ordinal keep registration order.
    sources: Vec<Box<dyn ConfigSource>>,
    merge_source_values: bool,
    mapper: ObjectMapper,
}

impl std::fmt::Debug for LayeredConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources: Vec<(&str, i32)> = self.sources.iter().map(|src| (src.name(), src.ordinal())).collect();
        f.debug_struct("LayeredConfig")
            .field("sources", &sources)
            .field("merge_source_values", &self.merge_source_values)
            .finish()
    }
}

impl LayeredConfig {
    pub fn builder() -> LayeredConfigBuilder {
        LayeredConfigBuilder::default()
    }

    /// Check if object values are merged across sources.
    pub fn merges_source_values(&self) -> bool {
        self.merge_source_values
    }

    /// Register an already loaded source.
    ///
    /// Fails with `DuplicateConfigSource` when a source with the same name and ordinal exists.
    pub fn add_source(&mut self, source: Box<dyn ConfigSource>) -> Result<()> {
        if self.sources.iter().any(|src| src.name() == source.name() && src.ordinal() == source.ordinal()) {
            return Err(AppError::DuplicateConfigSource {
                name: source.name().into(),
                ordinal: source.ordinal(),
            });
        }
        tracing::debug!(name = source.name(), ordinal = source.ordinal(), "registered config source");
        let pos = self.sources.iter().position(|src| src.ordinal() < source.ordinal()).unwrap_or(self.sources.len());
        self.sources.insert(pos, source);
        Ok(())
    }

    /// All registered sources, from the highest ordinal down.
    pub fn sources(&self) -> impl Iterator<Item = &dyn ConfigSource> {
        self.sources.iter().map(|src| src.as_ref())
    }

    /// Find a registered source by name and concrete type.
    pub fn source<S: ConfigSource + 'static>(&self, name: &str) -> Option<&S> {
        self.sources.iter().filter(|src| src.name() == name).find_map(|src| src.as_any().downcast_ref::<S>())
    }

    /// Find a registered source by name and concrete type, for mutation.
    pub fn source_mut<S: ConfigSource + 'static>(&mut self, name: &str) -> Option<&mut S> {
        self.sources
            .iter_mut()
            .filter(|src| src.name() == name)
            .find_map(|src| src.as_any_mut().downcast_mut::<S>())
    }

    /// Reload the data of every refreshable source.
    pub async fn refresh(&mut self) -> Result<()> {
        for src in self.sources.iter_mut().filter(|src| src.is_refreshable()) {
            src.refresh().await?;
        }
        Ok(())
    }

    /// The value at the given key, or the whole configuration when `key` is `None`.
    pub fn get(&self, key: Option<&str>) -> Option<Value> {
        let key = key.unwrap_or("");
        let mut found = self.sources.iter().filter_map(|src| src.value(key));
        let first = found.next()?;
        if !self.merge_source_values || !first.is_object() {
            return Some(first);
        }
        // Layer objects from the lowest ordinal up, stopping below a non-object value.
        let mut layers = vec![first];
        layers.extend(found.take_while(Value::is_object));
        let mut merged = Value::Object(Default::default());
        for layer in layers.iter().rev() {
            merge_values(&mut merged, layer);
        }
        Some(merged)
    }

    pub fn as_string(&self, key: &str) -> Result<Option<String>> {
        match self.get(Some(key)) {
            None => Ok(None),
            Some(Value::String(val)) => Ok(Some(val)),
            Some(val @ Value::Bool(_)) | Some(val @ Value::Number(_)) => Ok(Some(val.to_string())),
            Some(val) => Err(self.conversion_error(key, "string", &val)),
        }
    }

    pub fn as_boolean(&self, key: &str) -> Result<Option<bool>> {
        match self.get(Some(key)) {
            None => Ok(None),
            Some(Value::Bool(val)) => Ok(Some(val)),
            Some(Value::String(val)) => match val.trim().to_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(self.conversion_error(key, "boolean", &Value::String(val))),
            },
            Some(val) => Err(self.conversion_error(key, "boolean", &val)),
        }
    }

    pub fn as_number(&self, key: &str) -> Result<Option<f64>> {
        match self.get(Some(key)) {
            None => Ok(None),
            Some(Value::Number(val)) => val.as_f64().map(Some).ok_or_else(|| self.conversion_error(key, "number", &Value::Number(val))),
            Some(Value::String(val)) => match val.trim().parse::<f64>() {
                Ok(num) => Ok(Some(num)),
                Err(_) => Err(self.conversion_error(key, "number", &Value::String(val))),
            },
            Some(val) => Err(self.conversion_error(key, "number", &val)),
        }
    }

    /// As `as_number`, rejecting values with a fractional part.
    pub fn as_integer(&self, key: &str) -> Result<Option<i64>> {
        match self.get(Some(key)) {
            None => Ok(None),
            Some(Value::Number(val)) => val.as_i64().map(Some).ok_or_else(|| self.conversion_error(key, "integer", &Value::Number(val))),
            Some(Value::String(val)) => match val.trim().parse::<i64>() {
                Ok(num) => Ok(Some(num)),
                Err(_) => Err(self.conversion_error(key, "integer", &Value::String(val))),
            },
            Some(val) => Err(self.conversion_error(key, "integer", &val)),
        }
    }

    /// An array of scalars, or a comma separated string as set in the environment.
    pub fn as_string_array(&self, key: &str) -> Result<Option<Vec<String>>> {
        match self.get(Some(key)) {
            None => Ok(None),
            Some(Value::String(val)) => Ok(Some(val.split(',').map(str::trim).filter(|item| !item.is_empty()).map(String::from).collect())),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(val) => Ok(val),
                    val @ Value::Bool(_) | val @ Value::Number(_) => Ok(val.to_string()),
                    val => Err(self.conversion_error(key, "string array", &val)),
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(val) => Err(self.conversion_error(key, "string array", &val)),
        }
    }

    /// The value at the given key, or the whole configuration, mapped into `T`.
    ///
    /// Values read from the environment are strings; when they do not map as they are, booleans
    /// and numbers spelled as strings are converted and the mapping is retried.
    pub fn as_object<T: DeserializeOwned>(&self, key: Option<&str>) -> Result<Option<T>> {
        let val = match self.get(key) {
            Some(val) => val,
            None => return Ok(None),
        };
        self.map_value(key, val).map(Some)
    }

    pub fn as_object_array<T: DeserializeOwned>(&self, key: Option<&str>) -> Result<Option<Vec<T>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Array(items)) => items.into_iter().map(|item| self.map_value(key, item)).collect::<Result<Vec<_>>>().map(Some),
            Some(val) => Err(self.conversion_error(key.unwrap_or(""), "array", &val)),
        }
    }

    fn map_value<T: DeserializeOwned>(&self, key: Option<&str>, val: Value) -> Result<T> {
        match self.mapper.from_object(&val) {
            Ok(obj) => Ok(obj),
            Err(err) => self
                .mapper
                .from_object(&coerce_scalars(val))
                .map_err(|_| AppError::Configuration(format!("error mapping {}: {}", key.unwrap_or("<root>"), err))),
        }
    }

    /// Every property of every source, flattened; higher ordinals win.
    pub fn properties(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for src in self.sources.iter().rev() {
            out.extend(src.properties());
        }
        out
    }

    pub fn property_names(&self) -> Vec<String> {
        self.properties().into_keys().collect()
    }

    fn conversion_error(&self, key: &str, target: &str, val: &Value) -> AppError {
        AppError::Configuration(format!("value of {} cannot be read as a {}: {}", key, target, val))
    }
}

/// Convert strings spelling booleans or numbers into those types, recursively.
fn coerce_scalars(val: Value) -> Value {
    match val {
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if trimmed.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else if let Ok(num) = trimmed.parse::<i64>() {
                Value::from(num)
            } else if let Some(num) = trimmed.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                Value::Number(num)
            } else {
                Value::String(raw)
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(coerce_scalars).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(key, val)| (key, coerce_scalars(val))).collect()),
        other => other,
    }
}

/// A builder of `LayeredConfig` instances.
#[derive(Default)]
pub struct LayeredConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    merge_source_values: bool,
}

impl LayeredConfigBuilder {
    /// Add the built-in defaults and the environment beneath the default prefix.
    pub fn with_default_sources(self) -> Self {
        self.with_default_sources_from(EnvironmentStorageBackend::new(Some(DEFAULT_ENV_PREFIX)))
    }

    /// Add the built-in defaults and the environment as read through the given backend.
    pub fn with_default_sources_from(self, env: EnvironmentStorageBackend) -> Self {
        self.with_source(Box::new(StaticConfigSource::defaults()))
            .with_source(Box::new(EnvironmentConfigSource::with_backend(env)))
    }

    pub fn with_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_sources<I>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn ConfigSource>>,
    {
        self.sources.extend(sources);
        self
    }

    /// Merge object values across sources instead of taking the first defining source.
    pub fn with_merge_source_values(mut self, merge: bool) -> Self {
        self.merge_source_values = merge;
        self
    }

    /// Load every source and build the config.
    pub async fn build(self) -> Result<LayeredConfig> {
        let mut config = LayeredConfig {
            sources: Vec::with_capacity(self.sources.len()),
            merge_source_values: self.merge_source_values,
            mapper: ObjectMapper::new(),
        };
        for mut src in self.sources {
            src.load().await?;
            config.add_source(src)?;
        }
        Ok(config)
    }
}
