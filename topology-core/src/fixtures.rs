use serde_json::{json, Value};

use crate::lease::LeaseGuard;

/// A remote config document in the unversioned layout.
pub fn legacy_remote_config() -> Value {
    json!({
        "metadata": {
            "namespace": "ledger",
            "deploymentName": "alpha",
            "lastUpdatedAt": "2024-03-01T10:00:00Z",
            "toolVersion": "v0.30.1",
            "chartVersion": "0.42.0",
            "platformVersion": "v0.56.0",
        },
        "clusters": {
            "cluster-a": {
                "name": "cluster-a",
                "namespace": "ledger",
                "deployment": "alpha",
                "dnsBaseDomain": "cluster.local",
                "dnsConsensusNodePattern": "network-{nodeAlias}-svc.{namespace}.svc",
            },
        },
        "components": {
            "consensusNodes": {
                "node1": {"name": "node1", "nodeId": 0, "cluster": "cluster-a", "namespace": "ledger"},
                "node2": {"name": "node2", "nodeId": 1, "cluster": "cluster-a", "namespace": "ledger"},
            },
            "mirrorNodes": {
                "mirror": {"name": "mirror", "cluster": "cluster-a", "namespace": "ledger"},
            },
            "relays": {
                "relay": {"name": "relay", "cluster": "cluster-a", "namespace": "ledger", "consensusNodeAliases": ["node1", "node2"]},
            },
        },
        "commandHistory": ["deployment create", "network deploy"],
        "lastExecutedCommand": "network deploy",
    })
}

/// A remote config document at schema version 3, with one block node and one consensus node.
pub fn remote_config_v3() -> Value {
    json!({
        "schemaVersion": 3,
        "metadata": {
            "lastUpdatedAt": "2024-06-01T00:00:00Z",
            "lastUpdatedBy": {"name": "alice", "hostname": "workstation"},
        },
        "versions": {"cli": "0.36.0", "chart": "0.50.0", "consensusNode": "0.61.0"},
        "clusters": [{"name": "cluster-a", "namespace": "ledger", "deploymentName": "alpha"}],
        "state": {
            "ledgerPhase": "initialized",
            "componentIds": {"consensusNodes": 0, "blockNodes": 0},
            "consensusNodes": [
                {"metadata": {"id": 0, "cluster": "cluster-a", "namespace": "ledger", "phase": "started", "portForwardConfigs": []}},
            ],
            "blockNodes": [
                {"metadata": {"id": 0, "cluster": "cluster-a", "namespace": "ledger", "phase": "started", "portForwardConfigs": []}},
            ],
            "mirrorNodes": [],
            "relayNodes": [],
            "haProxies": [],
            "envoyProxies": [],
            "explorers": [],
        },
        "history": {"commandHistory": ["block node add"], "lastExecutedCommand": "block node add"},
    })
}

/// A lease with a fixed held state.
#[derive(Debug)]
pub struct StaticLease(pub bool);

impl LeaseGuard for StaticLease {
    fn name(&self) -> &str {
        "alpha"
    }

    fn holder_identity(&self) -> &str {
        "alice@workstation"
    }

    fn is_held(&self) -> bool {
        self.0
    }
}
