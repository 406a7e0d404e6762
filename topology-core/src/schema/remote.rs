//! The remote config schema and its migrations.

use serde_json::{json, Map, Value};

use crate::error::{AppError, Result};
use crate::model::{ComponentKind, RemoteConfig};
use crate::schema::{clone_source, SchemaDefinition, SchemaMigration, VersionRange, SCHEMA_VERSION_FIELD};

/// The current version of the remote config schema.
pub const REMOTE_CONFIG_SCHEMA_VERSION: u64 = 5;

/// The remote config schema, with its full migration chain.
pub fn schema_definition() -> Result<SchemaDefinition<RemoteConfig>> {
    SchemaDefinition::new(
        "RemoteConfig",
        REMOTE_CONFIG_SCHEMA_VERSION,
        vec![
            Box::new(RemoteConfigV1Migration),
            Box::new(RemoteConfigV2Migration),
            Box::new(RemoteConfigV3Migration),
            Box::new(RemoteConfigV4Migration),
            Box::new(RemoteConfigV5Migration),
        ],
    )
}

/// The timestamp given to legacy documents which never recorded one.
const EPOCH: &str = "1970-01-01T00:00:00Z";

/// Legacy metadata fields holding versions, and the `versions` field each moves to.
///
/// Each version went by more than one name in legacy documents; the first name present wins.
const LEGACY_VERSION_FIELDS: [(&[&str], &str); 6] = [
    (&["soloVersion", "toolVersion"], "cli"),
    (&["soloChartVersion", "chartVersion"], "chart"),
    (&["hederaPlatformVersion", "platformVersion"], "consensusNode"),
    (&["hederaMirrorNodeChartVersion", "mirrorNodeChartVersion"], "mirrorNodeChart"),
    (&["hederaExplorerChartVersion", "explorerChartVersion"], "explorerChart"),
    (&["hederaJsonRpcRelayChartVersion", "relayChartVersion"], "jsonRpcRelayChart"),
];

/// Legacy component group names which differ from the current kind names.
const LEGACY_COMPONENT_GROUPS: [(&str, ComponentKind); 2] = [("relays", ComponentKind::RelayNodes), ("mirrorNodeExplorers", ComponentKind::Explorers)];

/// Upgrades the unversioned layout.
///
/// The unversioned layout keeps versions as fields of `metadata`, clusters as a map keyed by
/// cluster name, components as maps keyed by component name beneath `components`, and command
/// history at the top level.
pub struct RemoteConfigV1Migration;

impl SchemaMigration for RemoteConfigV1Migration {
    fn range(&self) -> VersionRange {
        VersionRange::single(0)
    }

    fn version(&self) -> u64 {
        1
    }

    fn migrate(&self, source: &Value) -> Result<Value> {
        let mut doc = clone_source(source, 0)?;

        let mut metadata = match doc.remove("metadata") {
            Some(Value::Object(metadata)) => metadata,
            _ => Map::new(),
        };
        let mut versions = Map::new();
        for (names, field) in LEGACY_VERSION_FIELDS.iter() {
            let removed: Vec<Value> = names.iter().filter_map(|name| metadata.remove(*name)).collect();
            let found = removed.into_iter().find_map(|val| match val {
                Value::String(val) => Some(val),
                _ => None,
            });
            let val = match (found, *field) {
                (Some(val), _) => val,
                (None, "cli") => crate::TOOL_VERSION.to_string(),
                (None, _) => "0.0.0".to_string(),
            };
            versions.insert(field.to_string(), Value::String(val));
        }
        versions.insert("blockNodeChart".into(), Value::String("0.0.0".into()));
        let legacy_namespace = metadata.remove("namespace");
        let legacy_deployment = metadata.remove("deploymentName");
        if !matches!(metadata.get("lastUpdatedAt"), Some(Value::String(_))) {
            metadata.insert("lastUpdatedAt".into(), Value::String(EPOCH.into()));
        }
        metadata.insert("lastUpdatedBy".into(), json!({"name": "system", "hostname": "migration"}));

        let clusters = match doc.remove("clusters") {
            Some(Value::Array(clusters)) => clusters,
            Some(Value::Object(clusters)) => clusters
                .into_iter()
                .map(|(name, cluster)| legacy_cluster(name, cluster, legacy_namespace.as_ref(), legacy_deployment.as_ref()))
                .collect(),
            _ => vec![],
        };

        let mut state = Map::new();
        state.insert("ledgerPhase".into(), Value::String("initialized".into()));
        let mut groups = match doc.remove("components") {
            Some(Value::Object(groups)) => groups,
            _ => Map::new(),
        };
        for (legacy, kind) in LEGACY_COMPONENT_GROUPS.iter() {
            if let Some(group) = groups.remove(*legacy) {
                groups.entry(kind.as_str()).or_insert(group);
            }
        }
        for kind in ComponentKind::ALL.iter() {
            let list = match groups.remove(kind.as_str()) {
                Some(Value::Object(group)) => group.into_iter().enumerate().map(|(idx, (_, comp))| legacy_component(*kind, idx, comp)).collect(),
                _ => vec![],
            };
            state.insert(kind.as_str().into(), Value::Array(list));
        }

        let commands: Vec<Value> = match doc.remove("commandHistory") {
            Some(Value::Array(commands)) => commands,
            Some(Value::Object(commands)) => commands.into_iter().map(|(cmd, _)| Value::String(cmd)).collect(),
            _ => vec![],
        };
        let mut history = Map::new();
        history.insert("commandHistory".into(), Value::Array(commands));
        if let Some(cmd) = doc.remove("lastExecutedCommand") {
            history.insert("lastExecutedCommand".into(), cmd);
        }

        doc.insert("metadata".into(), Value::Object(metadata));
        doc.insert("versions".into(), Value::Object(versions));
        doc.insert("clusters".into(), Value::Array(clusters));
        doc.insert("state".into(), Value::Object(state));
        doc.insert("history".into(), Value::Object(history));
        doc.insert(SCHEMA_VERSION_FIELD.into(), json!(self.version()));
        Ok(Value::Object(doc))
    }
}

fn legacy_cluster(name: String, cluster: Value, namespace: Option<&Value>, deployment: Option<&Value>) -> Value {
    let field = |key: &str| cluster.get(key).cloned();
    let mut out = Map::new();
    out.insert("name".into(), field("name").unwrap_or(Value::String(name)));
    let namespace = match &cluster {
        // The oldest layout maps cluster names straight to namespaces.
        Value::String(_) => Some(cluster.clone()),
        _ => field("namespace").or_else(|| namespace.cloned()),
    };
    if let Some(namespace) = namespace {
        out.insert("namespace".into(), namespace);
    }
    if let Some(deployment) = field("deployment").or_else(|| field("deploymentName")).or_else(|| deployment.cloned()) {
        out.insert("deploymentName".into(), deployment);
    }
    for key in ["dnsBaseDomain", "dnsConsensusNodePattern"] {
        if let Some(val) = field(key) {
            out.insert(key.into(), val);
        }
    }
    Value::Object(out)
}

fn legacy_component(kind: ComponentKind, idx: usize, comp: Value) -> Value {
    let id = match kind {
        ComponentKind::ConsensusNodes => comp.get("nodeId").cloned().unwrap_or_else(|| json!(idx)),
        _ => json!(idx),
    };
    let mut metadata = Map::new();
    metadata.insert("id".into(), id);
    for key in ["cluster", "namespace"] {
        if let Some(val) = comp.get(key) {
            metadata.insert(key.into(), val.clone());
        }
    }
    metadata.insert("phase".into(), Value::String("started".into()));
    if let (ComponentKind::RelayNodes, Some(aliases)) = (kind, comp.get("consensusNodeAliases")) {
        metadata.insert("consensusNodeIds".into(), aliases.clone());
    }
    json!({ "metadata": metadata })
}

/// Apply `f` to the object of every component in the document's state.
fn for_each_component(doc: &mut Map<String, Value>, mut f: impl FnMut(ComponentKind, &mut Map<String, Value>) -> Result<()>) -> Result<()> {
    let state = match doc.get_mut("state") {
        Some(Value::Object(state)) => state,
        _ => return Ok(()),
    };
    for kind in ComponentKind::ALL.iter() {
        if let Some(Value::Array(list)) = state.get_mut(kind.as_str()) {
            for comp in list.iter_mut() {
                if let Value::Object(comp) = comp {
                    f(*kind, comp)?;
                }
            }
        }
    }
    Ok(())
}

/// Apply `f` to the object holding the document's state, created when absent.
fn with_state<R>(doc: &mut Map<String, Value>, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
    let mut state = match doc.remove("state") {
        Some(Value::Object(state)) => state,
        _ => Map::new(),
    };
    let out = f(&mut state);
    doc.insert("state".into(), Value::Object(state));
    out
}

/// Adds `portForwardConfigs` to the metadata of every component.
pub struct RemoteConfigV2Migration;

impl SchemaMigration for RemoteConfigV2Migration {
    fn range(&self) -> VersionRange {
        VersionRange::single(1)
    }

    fn version(&self) -> u64 {
        2
    }

    fn migrate(&self, source: &Value) -> Result<Value> {
        let mut doc = clone_source(source, 1)?;
        for_each_component(&mut doc, |_, comp| {
            if let Some(Value::Object(metadata)) = comp.get_mut("metadata") {
                metadata.entry("portForwardConfigs").or_insert_with(|| Value::Array(vec![]));
            }
            Ok(())
        })?;
        doc.insert(SCHEMA_VERSION_FIELD.into(), json!(self.version()));
        Ok(Value::Object(doc))
    }
}

/// Moves component ids to a 1-based scheme and establishes the per kind id counters.
///
/// Relays referencing consensus nodes by alias (`node1`) or id move those references out of their
/// metadata into `consensusNodeIds`, as node ids.
pub struct RemoteConfigV3Migration;

impl SchemaMigration for RemoteConfigV3Migration {
    fn range(&self) -> VersionRange {
        VersionRange::single(2)
    }

    fn version(&self) -> u64 {
        3
    }

    fn migrate(&self, source: &Value) -> Result<Value> {
        let mut doc = clone_source(source, 2)?;
        let mut counters: Map<String, Value> = ComponentKind::ALL.iter().map(|kind| (kind.as_str().to_string(), json!(0))).collect();

        for_each_component(&mut doc, |kind, comp| {
            if let Some(Value::Object(metadata)) = comp.get_mut("metadata") {
                if let Some(id) = metadata.get("id").and_then(Value::as_i64) {
                    let id = id + 1;
                    metadata.insert("id".into(), json!(id));
                    let highest = counters.get(kind.as_str()).and_then(Value::as_i64).unwrap_or(0);
                    counters.insert(kind.as_str().into(), json!(highest.max(id)));
                }
            }
            if kind != ComponentKind::RelayNodes {
                return Ok(());
            }
            let refs = match comp.get_mut("metadata") {
                Some(Value::Object(metadata)) => metadata.remove("consensusNodeIds"),
                _ => None,
            };
            if let Some(Value::Array(refs)) = refs {
                let ids = refs.iter().map(node_id_from_ref).collect::<Result<Vec<_>>>()?;
                comp.insert("consensusNodeIds".into(), json!(ids));
            }
            Ok(())
        })?;

        with_state(&mut doc, |state| state.insert("componentIds".into(), Value::Object(counters)));
        doc.insert(SCHEMA_VERSION_FIELD.into(), json!(self.version()));
        Ok(Value::Object(doc))
    }
}

/// Resolve a relay's reference to a consensus node, either a node id or an alias like `node3`.
fn node_id_from_ref(node: &Value) -> Result<i64> {
    match node {
        Value::Number(num) => num.as_i64().ok_or_else(|| AppError::IllegalArgument(format!("invalid node id {}", num))),
        Value::String(alias) => node_id_from_alias(alias),
        other => Err(AppError::IllegalArgument(format!("invalid node reference {}", other))),
    }
}

/// The node id of an alias, its trailing number minus one: `node1` is node `0`.
///
/// Node ids are the 0-based ids of the ledger itself, and are what relays reference in
/// `consensusNodeIds`. The `metadata.id` of a consensus node component is its 1-based component
/// id instead, see `component_id_from_alias`.
pub fn node_id_from_alias(alias: &str) -> Result<i64> {
    let alias = alias.trim();
    let digits_at = alias.trim_end_matches(|ch: char| ch.is_ascii_digit()).len();
    alias[digits_at..]
        .parse::<i64>()
        .map(|num| num - 1)
        .map_err(|_| AppError::IllegalArgument(format!("cannot derive a node id from node alias {}", alias)))
}

/// The component id of the consensus node with the given alias, its node id plus one: `node1`
/// is component `1`.
///
/// Component ids are 1-based from schema version 3 on, so a consensus node created today and one
/// migrated from a legacy document get the same id for the same alias.
pub fn component_id_from_alias(alias: &str) -> Result<i64> {
    node_id_from_alias(alias).map(|id| id + 1)
}

/// Connects every consensus node to every block node.
pub struct RemoteConfigV4Migration;

impl SchemaMigration for RemoteConfigV4Migration {
    fn range(&self) -> VersionRange {
        VersionRange::single(3)
    }

    fn version(&self) -> u64 {
        4
    }

    fn migrate(&self, source: &Value) -> Result<Value> {
        let mut doc = clone_source(source, 3)?;
        with_state(&mut doc, |state| {
            let block_node_ids: Vec<Value> = match state.get("blockNodes") {
                Some(Value::Array(nodes)) => nodes.iter().filter_map(|node| node.pointer("/metadata/id").cloned()).collect(),
                _ => vec![],
            };
            if let Some(Value::Array(nodes)) = state.get_mut("consensusNodes") {
                for node in nodes.iter_mut().filter_map(Value::as_object_mut) {
                    node.insert("blockNodeIds".into(), Value::Array(block_node_ids.clone()));
                }
            }
        });
        doc.insert(SCHEMA_VERSION_FIELD.into(), json!(self.version()));
        Ok(Value::Object(doc))
    }
}

/// Introduces the `tssEnabled` flag, off for existing deployments.
pub struct RemoteConfigV5Migration;

impl SchemaMigration for RemoteConfigV5Migration {
    fn range(&self) -> VersionRange {
        VersionRange::single(4)
    }

    fn version(&self) -> u64 {
        5
    }

    fn migrate(&self, source: &Value) -> Result<Value> {
        let mut doc = clone_source(source, 4)?;
        with_state(&mut doc, |state| state.insert("tssEnabled".into(), Value::Bool(false)));
        doc.insert(SCHEMA_VERSION_FIELD.into(), json!(self.version()));
        Ok(Value::Object(doc))
    }
}
