use anyhow::Result;
use serde_json::{json, Value};

use crate::fixtures::{legacy_remote_config, remote_config_v3};
use crate::model::{parse_version, LocalConfig, RemoteConfig};
use crate::schema::remote::{self, component_id_from_alias, node_id_from_alias, RemoteConfigV1Migration, RemoteConfigV3Migration, RemoteConfigV4Migration, RemoteConfigV5Migration};
use crate::schema::{local, SchemaDefinition, SchemaMigration, VersionRange};
use crate::AppError;

/// A migration accepting its own output version.
struct LoopingMigration;

impl SchemaMigration for LoopingMigration {
    fn range(&self) -> VersionRange {
        VersionRange::single(1)
    }

    fn version(&self) -> u64 {
        1
    }

    fn migrate(&self, source: &Value) -> crate::Result<Value> {
        Ok(source.clone())
    }
}

#[test]
fn version_ranges_are_inclusive() -> Result<()> {
    let range = VersionRange::new(1, 3)?;
    assert!(range.contains(1) && range.contains(3), "expected range bounds to be included");
    assert!(!range.contains(0) && !range.contains(4), "expected values outside the range to be excluded");
    assert!(range.to_string() == "[1, 3]", "unexpected range display {}", range);
    assert!(VersionRange::single(2).to_string() == "[2]", "unexpected single range display");

    let res = VersionRange::new(3, 1);
    assert!(matches!(res, Err(AppError::IllegalArgument(_))), "expected inverted range to be rejected, got {:?}", res);
    Ok(())
}

#[test]
fn every_remote_config_version_migrates_to_current() -> Result<()> {
    let schema = remote::schema_definition()?;
    let expected = schema.migrate_to_current(&legacy_remote_config())?;
    assert!(schema.schema_version_of(&expected)? == 5, "unexpected migrated version {}", expected["schemaVersion"]);

    let mut doc = legacy_remote_config();
    for (idx, mig) in schema.migrations().iter().enumerate() {
        let found = schema.schema_version_of(&doc)?;
        assert!(found == idx as u64, "unexpected intermediate version {}, expected {}", found, idx);
        let migrated = schema.migrate_to_current(&doc)?;
        assert!(migrated == expected, "expected version {} to migrate to the same document, got {}", idx, migrated);
        doc = mig.migrate(&doc)?;
    }
    assert!(doc == expected, "expected stepwise migration to match, got {}", doc);
    assert!(schema.migrate_to_current(&expected)? == expected, "expected a current document to be left as is");
    Ok(())
}

#[test]
fn legacy_remote_config_is_restructured() -> Result<()> {
    let schema = remote::schema_definition()?;
    let doc = schema.migrate_to_current(&legacy_remote_config())?;

    assert!(doc["versions"]["cli"] == json!("v0.30.1"), "unexpected cli version {}", doc["versions"]["cli"]);
    assert!(doc["versions"]["consensusNode"] == json!("v0.56.0"), "unexpected node version {}", doc["versions"]["consensusNode"]);
    assert!(doc["metadata"]["lastUpdatedAt"] == json!("2024-03-01T10:00:00Z"), "expected legacy timestamp to be kept");
    assert!(
        doc["metadata"]["lastUpdatedBy"] == json!({"name": "system", "hostname": "migration"}),
        "unexpected last updated by {}",
        doc["metadata"]["lastUpdatedBy"]
    );
    assert!(doc["metadata"].get("namespace").is_none(), "expected legacy namespace to move to the clusters");

    let cluster = &doc["clusters"][0];
    assert!(cluster["namespace"] == json!("ledger") && cluster["deploymentName"] == json!("alpha"), "unexpected cluster {}", cluster);

    let state = &doc["state"];
    let node_ids: Vec<i64> = state["consensusNodes"].as_array().into_iter().flatten().filter_map(|node| node["metadata"]["id"].as_i64()).collect();
    assert!(node_ids == vec![1, 2], "unexpected consensus node ids {:?}", node_ids);
    assert!(state["relayNodes"][0]["consensusNodeIds"] == json!([0, 1]), "unexpected relay references {}", state["relayNodes"][0]);
    assert!(state["relayNodes"][0]["metadata"].get("consensusNodeIds").is_none(), "expected relay references to leave the metadata");
    assert!(state["mirrorNodes"][0]["metadata"]["portForwardConfigs"] == json!([]), "expected port forwards to be added");
    assert!(
        state["componentIds"]["consensusNodes"] == json!(2) && state["componentIds"]["relayNodes"] == json!(1),
        "unexpected counters {}",
        state["componentIds"]
    );
    assert!(state["tssEnabled"] == json!(false), "expected tss to be disabled");
    assert!(doc["history"]["commandHistory"].as_array().map(Vec::len) == Some(2), "unexpected history {}", doc["history"]);

    let model: RemoteConfig = schema.transform(&legacy_remote_config())?;
    model.state.validate()?;
    assert!(model.versions.cli == semver::Version::new(0, 30, 1), "unexpected mapped cli version {}", model.versions.cli);
    assert!(model.history.last_executed_command.as_deref() == Some("network deploy"), "unexpected last command");
    Ok(())
}

#[test]
fn block_nodes_are_linked_to_consensus_nodes() -> Result<()> {
    let schema = remote::schema_definition()?;
    let model: RemoteConfig = schema.transform(&remote_config_v3())?;
    let node = &model.state.consensus_nodes[0];
    assert!(node.block_node_ids == vec![0], "unexpected block node ids {:?}", node.block_node_ids);
    assert!(!model.state.tss_enabled, "expected tss to be disabled");
    assert!(model.schema_version == 5, "unexpected schema version {}", model.schema_version);
    Ok(())
}

#[test]
fn migrations_leave_their_input_untouched() -> Result<()> {
    let source = legacy_remote_config();
    let before = source.clone();
    let first = RemoteConfigV1Migration.migrate(&source)?;
    let second = RemoteConfigV1Migration.migrate(&source)?;
    assert!(source == before, "expected migration input to be untouched");
    assert!(first == second, "expected migration output to be deterministic");
    Ok(())
}

#[test]
fn migrations_reject_bad_input() -> Result<()> {
    let res = RemoteConfigV4Migration.migrate(&Value::Null);
    assert!(matches!(res, Err(AppError::IllegalArgument(_))), "expected null input to be rejected, got {:?}", res);

    let res = RemoteConfigV4Migration.migrate(&json!("state"));
    assert!(matches!(res, Err(AppError::IllegalArgument(_))), "expected non-object input to be rejected, got {:?}", res);

    let res = RemoteConfigV5Migration.migrate(&remote_config_v3());
    assert!(
        matches!(res, Err(AppError::InvalidSchemaVersion { found: 3, expected: 4 })),
        "expected version mismatch to be rejected, got {:?}",
        res
    );
    Ok(())
}

#[test]
fn relay_references_must_resolve_to_node_ids() -> Result<()> {
    let doc = json!({
        "schemaVersion": 2,
        "state": {"relayNodes": [{"metadata": {"id": 0, "cluster": "a", "namespace": "b", "consensusNodeIds": ["primary"]}}]},
    });
    let res = RemoteConfigV3Migration.migrate(&doc);
    assert!(matches!(res, Err(AppError::IllegalArgument(_))), "expected unresolvable alias to be rejected, got {:?}", res);
    Ok(())
}

#[test]
fn node_aliases_map_to_node_ids() -> Result<()> {
    let cases = [("node1", 0), ("node10", 9), (" node3 ", 2)];
    for (alias, expected) in cases.iter() {
        let id = node_id_from_alias(alias)?;
        assert!(id == *expected, "unexpected node id for {}, got {}, expected {}", alias, id, expected);
    }
    assert!(node_id_from_alias("node").is_err(), "expected alias without a number to be rejected");
    Ok(())
}

#[test]
fn created_and_migrated_consensus_nodes_share_component_ids() -> Result<()> {
    let cases = [("node1", 1), ("node2", 2), ("node10", 10)];
    for (alias, expected) in cases.iter() {
        let id = component_id_from_alias(alias)?;
        assert!(id == *expected, "unexpected component id for {}, got {}, expected {}", alias, id, expected);
    }
    assert!(component_id_from_alias("node").is_err(), "expected alias without a number to be rejected");

    // The legacy fixture carries `node1` and `node2` with node ids 0 and 1.
    let model: RemoteConfig = remote::schema_definition()?.transform(&legacy_remote_config())?;
    let migrated: Vec<i64> = model.state.consensus_nodes.iter().map(|node| node.metadata.id).collect();
    let created = vec![component_id_from_alias("node1")?, component_id_from_alias("node2")?];
    assert!(migrated == created, "expected migrated ids {:?} to match created ids {:?}", migrated, created);
    assert!(model.state.relay_nodes[0].consensus_node_ids == vec![0, 1], "expected relays to keep referencing node ids");
    Ok(())
}

#[test]
fn legacy_version_fields_are_read_under_either_name() -> Result<()> {
    let schema = remote::schema_definition()?;
    let doc = json!({
        "metadata": {
            "soloVersion": "0.31.0",
            "soloChartVersion": "0.44.0",
            "hederaPlatformVersion": "v0.57.2",
            "hederaMirrorNodeChartVersion": "v0.120.0",
            "hederaExplorerChartVersion": "24.12.0",
            "hederaJsonRpcRelayChartVersion": "v0.63.0",
        },
    });
    let migrated = schema.migrate_to_current(&doc)?;
    let expected = json!({
        "cli": "0.31.0",
        "chart": "0.44.0",
        "consensusNode": "v0.57.2",
        "mirrorNodeChart": "v0.120.0",
        "explorerChart": "24.12.0",
        "jsonRpcRelayChart": "v0.63.0",
        "blockNodeChart": "0.0.0",
    });
    assert!(migrated["versions"] == expected, "unexpected migrated versions {}", migrated["versions"]);
    assert!(migrated["metadata"].get("soloVersion").is_none(), "expected legacy version fields to leave the metadata");
    Ok(())
}

#[test]
fn newer_documents_are_rejected() -> Result<()> {
    let schema = remote::schema_definition()?;
    let res = schema.migrate_to_current(&json!({"schemaVersion": 6}));
    assert!(
        matches!(res, Err(AppError::UnsupportedSchemaVersion { found: 6, current: 5, .. })),
        "expected newer document to be rejected, got {:?}",
        res
    );

    let res = schema.migrate_to_current(&json!({"schemaVersion": "five"}));
    assert!(matches!(res, Err(AppError::MalformedSchemaVersion { .. })), "expected malformed version to be rejected, got {:?}", res);
    Ok(())
}

#[test]
fn documents_older_than_the_chain_are_rejected() -> Result<()> {
    let schema = SchemaDefinition::<RemoteConfig>::new("RemoteConfig", 5, vec![Box::new(RemoteConfigV4Migration), Box::new(RemoteConfigV5Migration)])?;
    let res = schema.migrate_to_current(&json!({"schemaVersion": 1}));
    assert!(
        matches!(res, Err(AppError::MigrationChainExhausted { found: 1, target: 5, .. })),
        "expected exhausted chain, got {:?}",
        res
    );
    Ok(())
}

#[test]
fn invalid_migration_chains_are_rejected() -> Result<()> {
    let gap = SchemaDefinition::<RemoteConfig>::new("RemoteConfig", 3, vec![Box::new(RemoteConfigV1Migration), Box::new(RemoteConfigV3Migration)]);
    assert!(matches!(gap, Err(AppError::InvalidMigrationChain { .. })), "expected gap in chain to be rejected, got {:?}", gap);

    let short = SchemaDefinition::<RemoteConfig>::new("RemoteConfig", 5, vec![Box::new(RemoteConfigV1Migration)]);
    assert!(matches!(short, Err(AppError::InvalidMigrationChain { .. })), "expected short chain to be rejected, got {:?}", short);

    let empty = SchemaDefinition::<RemoteConfig>::new("RemoteConfig", 2, vec![]);
    assert!(matches!(empty, Err(AppError::InvalidMigrationChain { .. })), "expected empty chain to be rejected, got {:?}", empty);

    let looping = SchemaDefinition::<RemoteConfig>::new("RemoteConfig", 1, vec![Box::new(LoopingMigration)]);
    assert!(matches!(looping, Err(AppError::InvalidMigrationChain { .. })), "expected looping migration to be rejected, got {:?}", looping);

    let unversioned = SchemaDefinition::<RemoteConfig>::new("RemoteConfig", 0, vec![])?;
    let doc = unversioned.migrate_to_current(&json!({"clusters": []}))?;
    assert!(doc == json!({"clusters": []}), "unexpected unversioned document {}", doc);
    Ok(())
}

#[test]
fn legacy_local_config_is_restructured() -> Result<()> {
    let schema = local::schema_definition()?;
    let legacy = json!({
        "deployments": {"alpha": {"namespace": "ledger", "clusters": ["cluster-a"]}},
        "clusterRefs": {"cluster-a": "kind-cluster-a"},
    });
    let model: LocalConfig = schema.transform(&legacy)?;

    assert!(model.schema_version == 1, "unexpected schema version {}", model.schema_version);
    let dep = model.deployment_by_name("alpha");
    assert!(
        dep.map(|dep| dep.clusters.clone()) == Some(vec!["cluster-a".to_string()]),
        "unexpected deployment {:?}",
        dep
    );
    assert!(model.user_identity.name.is_empty(), "unexpected user identity {:?}", model.user_identity);
    assert!(model.versions.cli == parse_version(crate::TOOL_VERSION), "unexpected cli version {}", model.versions.cli);
    assert!(model.cluster_refs.get("cluster-a").map(String::as_str) == Some("kind-cluster-a"), "unexpected cluster refs {:?}", model.cluster_refs);
    Ok(())
}
