//! Conversion between untyped data and typed models.
//!
//! Untyped data is always a `serde_json::Value`, regardless of the medium it was read from.
//! Model types describe their persisted shape through their serde derives.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AppError, Result};
use crate::key::{ConfigKeyFormatter, KeyFormatter};

/// Maps untyped data to and from typed models.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjectMapper {
    formatter: ConfigKeyFormatter,
}

impl ObjectMapper {
    /// Create a new instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert the given untyped object into an instance of `T`.
    pub fn from_object<T: DeserializeOwned>(&self, obj: &Value) -> Result<T> {
        T::deserialize(obj).map_err(|err| AppError::Mapping(format!("error mapping object to {}: {}", std::any::type_name::<T>(), err)))
    }

    /// Convert the given model into an untyped object.
    pub fn to_object<T: Serialize>(&self, data: &T) -> Result<Value> {
        serde_json::to_value(data).map_err(|err| AppError::Mapping(format!("error mapping {} to object: {}", std::any::type_name::<T>(), err)))
    }

    /// Convert each of the given untyped objects into an instance of `T`.
    pub fn from_array<T: DeserializeOwned>(&self, arr: &[Value]) -> Result<Vec<T>> {
        arr.iter().map(|obj| self.from_object(obj)).collect()
    }

    /// Convert each of the given models into an untyped object.
    pub fn to_array<T: Serialize>(&self, data: &[T]) -> Result<Vec<Value>> {
        data.iter().map(|item| self.to_object(item)).collect()
    }

    /// Flatten the given object into dot separated keys.
    ///
    /// Array elements are keyed by index. Null values and empty containers produce no keys.
    pub fn to_flat_key_map(&self, obj: &Value) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        self.flatten_into(None, obj, &mut out);
        out
    }

    fn flatten_into(&self, path: Option<&str>, value: &Value, out: &mut BTreeMap<String, String>) {
        let child_path = |segment: &str| match path {
            Some(path) => self.formatter.join(&[path, segment]).unwrap_or_default(),
            None => segment.to_string(),
        };
        match value {
            Value::Null => (),
            Value::Object(map) => {
                for (key, val) in map {
                    self.flatten_into(Some(&child_path(key)), val, out);
                }
            }
            Value::Array(items) => {
                for (idx, val) in items.iter().enumerate() {
                    self.flatten_into(Some(&child_path(&idx.to_string())), val, out);
                }
            }
            Value::String(val) => {
                if let Some(path) = path {
                    out.insert(path.to_string(), val.clone());
                }
            }
            Value::Bool(_) | Value::Number(_) => {
                if let Some(path) = path {
                    out.insert(path.to_string(), value.to_string());
                }
            }
        }
    }

    /// Build a tree of objects from dot separated keys.
    ///
    /// Objects whose keys are all integers become arrays ordered by index. When a key is both a
    /// leaf and a branch (`cache=a`, `cache.dir=b`), the branch wins.
    pub fn from_flat_key_map<I>(&self, entries: I) -> Value
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut root = Map::new();
        for (key, val) in entries {
            let segments: Vec<&str> = key.split(self.formatter.separator()).filter(|seg| !seg.is_empty()).collect();
            if segments.is_empty() {
                continue;
            }
            insert_path(&mut root, &segments, val);
        }
        arrayify(Value::Object(root))
    }
}

fn insert_path(node: &mut Map<String, Value>, segments: &[&str], val: String) {
    let (head, rest) = (segments[0], &segments[1..]);
    if rest.is_empty() {
        if !matches!(node.get(head), Some(Value::Object(_))) {
            node.insert(head.to_string(), Value::String(val));
        }
        return;
    }
    let child = node.entry(head.to_string()).or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        tracing::debug!(key = head, "key is both a leaf and a branch, keeping the branch");
        *child = Value::Object(Map::new());
    }
    if let Value::Object(map) = child {
        insert_path(map, rest, val);
    }
}

fn arrayify(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let all_indexes = !map.is_empty() && map.keys().all(|key| key.parse::<usize>().is_ok());
            if all_indexes {
                let mut items: Vec<(usize, Value)> = map.into_iter().filter_map(|(key, val)| key.parse().ok().map(|idx| (idx, arrayify(val)))).collect();
                items.sort_by_key(|(idx, _)| *idx);
                Value::Array(items.into_iter().map(|(_, val)| val).collect())
            } else {
                Value::Object(map.into_iter().map(|(key, val)| (key, arrayify(val))).collect())
            }
        }
        other => other,
    }
}
