//! The local config schema.

use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::model::LocalConfig;
use crate::schema::{clone_source, SchemaDefinition, SchemaMigration, VersionRange, SCHEMA_VERSION_FIELD};

/// The current version of the local config schema.
pub const LOCAL_CONFIG_SCHEMA_VERSION: u64 = 1;

/// The local config schema, with its full migration chain.
pub fn schema_definition() -> Result<SchemaDefinition<LocalConfig>> {
    SchemaDefinition::new("LocalConfig", LOCAL_CONFIG_SCHEMA_VERSION, vec![Box::new(LocalConfigV1Migration)])
}

/// Upgrades the unversioned layout, which keys deployments by name and records no user identity.
pub struct LocalConfigV1Migration;

impl SchemaMigration for LocalConfigV1Migration {
    fn range(&self) -> VersionRange {
        VersionRange::single(0)
    }

    fn version(&self) -> u64 {
        1
    }

    fn migrate(&self, source: &Value) -> Result<Value> {
        let mut doc = clone_source(source, 0)?;

        let deployments: Vec<Value> = match doc.remove("deployments") {
            Some(Value::Array(deployments)) => deployments,
            Some(Value::Object(deployments)) => deployments
                .into_iter()
                .map(|(name, dep)| {
                    let mut dep = match dep {
                        Value::Object(dep) => dep,
                        _ => Map::new(),
                    };
                    dep.insert("name".into(), Value::String(name));
                    Value::Object(dep)
                })
                .collect(),
            _ => vec![],
        };
        doc.insert("deployments".into(), Value::Array(deployments));

        if !matches!(doc.get("clusterRefs"), Some(Value::Object(_))) {
            doc.insert("clusterRefs".into(), Value::Object(Map::new()));
        }
        if !matches!(doc.get("userIdentity"), Some(Value::Object(_))) {
            doc.insert("userIdentity".into(), json!({"name": "", "hostname": ""}));
        }
        let mut versions = match doc.remove("versions") {
            Some(Value::Object(versions)) => versions,
            _ => Map::new(),
        };
        versions.entry("cli").or_insert_with(|| Value::String(crate::TOOL_VERSION.into()));
        doc.insert("versions".into(), Value::Object(versions));

        doc.insert(SCHEMA_VERSION_FIELD.into(), json!(self.version()));
        Ok(Value::Object(doc))
    }
}
