//! Versioned document schemas and the migration chain which upgrades persisted documents.
//!
//! Every persisted document carries a `schemaVersion` field, treated as `0` when absent. A
//! `SchemaDefinition` owns an ordered chain of migrations, each upgrading a document by exactly
//! one version, and applies them in order until the document reaches the current version.

pub mod local;
#[cfg(test)]
mod mod_test;
pub mod remote;

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AppError, Result};
use crate::mapper::ObjectMapper;

/// The name of the version field carried by every persisted document.
pub const SCHEMA_VERSION_FIELD: &str = "schemaVersion";

/// An inclusive range of schema versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionRange {
    min: u64,
    max: u64,
}

impl VersionRange {
    /// A range covering exactly one version.
    pub fn single(version: u64) -> Self {
        Self { min: version, max: version }
    }

    /// A range covering `min..=max`.
    pub fn new(min: u64, max: u64) -> Result<Self> {
        if min > max {
            return Err(AppError::IllegalArgument(format!("version range minimum {} exceeds maximum {}", min, max)));
        }
        Ok(Self { min, max })
    }

    /// Check if the given version falls within this range.
    pub fn contains(&self, version: u64) -> bool {
        self.min <= version && version <= self.max
    }
}

impl std::fmt::Display for VersionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.min == self.max {
            write!(f, "[{}]", self.min)
        } else {
            write!(f, "[{}, {}]", self.min, self.max)
        }
    }
}

/// A single step of a migration chain.
pub trait SchemaMigration: Send + Sync {
    /// The versions this migration accepts as input.
    fn range(&self) -> VersionRange;

    /// The version of the documents this migration produces.
    fn version(&self) -> u64;

    /// Upgrade the given document, returning a new document. The input is never mutated.
    fn migrate(&self, source: &Value) -> Result<Value>;
}

/// Clone the given migration input as an object, checking that it is at the expected version.
pub(crate) fn clone_source(source: &Value, expected: u64) -> Result<Map<String, Value>> {
    let obj = match source {
        Value::Null => return Err(AppError::IllegalArgument("source must not be null".into())),
        Value::Object(obj) => obj.clone(),
        other => return Err(AppError::IllegalArgument(format!("source must be an object, got {}", other))),
    };
    match obj.get(SCHEMA_VERSION_FIELD) {
        None | Some(Value::Null) => Ok(obj),
        Some(found) => match found.as_u64() {
            Some(found) if found == expected => Ok(obj),
            Some(found) => Err(AppError::InvalidSchemaVersion { found, expected }),
            None => Err(AppError::IllegalArgument(format!("invalid schema version {}", found))),
        },
    }
}

/// The schema of a persisted model `T`: its name, current version and migration chain.
pub struct SchemaDefinition<T> {
    name: &'static str,
    version: u64,
    migrations: Vec<Box<dyn SchemaMigration>>,
    mapper: ObjectMapper,
    _model: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for SchemaDefinition<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let versions: Vec<u64> = self.migrations.iter().map(|mig| mig.version()).collect();
        f.debug_struct("SchemaDefinition")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("migrations", &versions)
            .finish()
    }
}

impl<T> SchemaDefinition<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a new instance, validating the migration chain.
    ///
    /// Migration versions must ascend by exactly one and the last must equal `version`.
    pub fn new(name: &'static str, version: u64, migrations: Vec<Box<dyn SchemaMigration>>) -> Result<Self> {
        let invalid = |reason: String| AppError::InvalidMigrationChain { model: name.into(), reason };
        let mut prev: Option<u64> = None;
        for mig in migrations.iter() {
            let ver = mig.version();
            if let Some(prev) = prev {
                if ver != prev + 1 {
                    return Err(invalid(format!("migration to version {} follows version {}", ver, prev)));
                }
            }
            if mig.range().contains(ver) {
                return Err(invalid(format!("migration to version {} accepts its own output range {}", ver, mig.range())));
            }
            prev = Some(ver);
        }
        match prev {
            Some(last) if last != version => return Err(invalid(format!("last migration produces version {}, schema is at {}", last, version))),
            None if version != 0 => return Err(invalid(format!("no migrations lead to version {}", version))),
            _ => (),
        }
        Ok(Self {
            name,
            version,
            migrations,
            mapper: ObjectMapper::new(),
            _model: PhantomData,
        })
    }

    /// The name of the model this schema describes.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The current version of this schema.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// This schema's migration chain in ascending order.
    pub fn migrations(&self) -> &[Box<dyn SchemaMigration>] {
        &self.migrations
    }

    /// Read the schema version of the given document. An absent field is version `0`.
    pub fn schema_version_of(&self, raw: &Value) -> Result<u64> {
        match raw.get(SCHEMA_VERSION_FIELD) {
            None | Some(Value::Null) => Ok(0),
            Some(val) => val.as_u64().ok_or_else(|| AppError::MalformedSchemaVersion {
                model: self.name.into(),
                value: val.to_string(),
            }),
        }
    }

    /// Upgrade the given document to the current schema version.
    ///
    /// Fails when the document is from a newer lineage, or when the chain cannot take it all the
    /// way to the current version. On failure no partially migrated document is returned.
    pub fn migrate_to_current(&self, raw: &Value) -> Result<Value> {
        if !raw.is_object() {
            return Err(AppError::IllegalArgument(format!("{} document must be an object", self.name)));
        }
        let found = self.schema_version_of(raw)?;
        if found > self.version {
            return Err(AppError::UnsupportedSchemaVersion {
                model: self.name.into(),
                found,
                current: self.version,
            });
        }

        let mut current = raw.clone();
        let mut tracked = found;
        for mig in self.migrations.iter() {
            if tracked == self.version {
                break;
            }
            if !mig.range().contains(tracked) {
                continue;
            }
            current = mig.migrate(&current)?;
            tracing::debug!(model = self.name, from = tracked, to = mig.version(), "migrated document");
            tracked = mig.version();
        }

        if tracked != self.version {
            return Err(AppError::MigrationChainExhausted {
                model: self.name.into(),
                found,
                target: self.version,
            });
        }
        Ok(current)
    }

    /// Upgrade the given document and map it into the model type.
    pub fn transform(&self, raw: &Value) -> Result<T> {
        let migrated = self.migrate_to_current(raw)?;
        self.mapper.from_object(&migrated)
    }

    /// Convert the given model into its persisted form.
    pub fn to_raw(&self, model: &T) -> Result<Value> {
        self.mapper.to_object(model)
    }
}
