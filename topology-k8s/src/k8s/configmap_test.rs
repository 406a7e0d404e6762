use std::collections::BTreeMap;

use anyhow::Result;
use topology_core::{REMOTE_CONFIG_CONFIGMAP_NAME, REMOTE_CONFIG_DATA_KEY};

use crate::k8s::{remote_config_labels, remote_config_map};

#[test]
fn remote_config_labels_match_selector() -> Result<()> {
    let labels = remote_config_labels();
    assert!(labels.len() == 1, "expected a single label, got {:?}", labels);
    assert!(labels.get("topology.io/type").map(String::as_str) == Some("remote-config"), "unexpected labels {:?}", labels);
    Ok(())
}

#[test]
fn remote_config_map_carries_data_and_labels() -> Result<()> {
    let mut data = BTreeMap::new();
    data.insert(REMOTE_CONFIG_DATA_KEY.to_string(), "schemaVersion: 5\n".to_string());
    let cm = remote_config_map("ledger", REMOTE_CONFIG_CONFIGMAP_NAME, data.clone());

    assert!(cm.metadata.name.as_deref() == Some(REMOTE_CONFIG_CONFIGMAP_NAME), "unexpected name {:?}", cm.metadata.name);
    assert!(cm.metadata.namespace.as_deref() == Some("ledger"), "unexpected namespace {:?}", cm.metadata.namespace);
    assert!(cm.data == Some(data), "unexpected data {:?}", cm.data);
    let labels = cm.metadata.labels.unwrap_or_default();
    assert!(
        remote_config_labels().iter().all(|(key, val)| labels.get(key) == Some(val)),
        "expected the selector labels to be applied, got {:?}",
        labels
    );
    assert!(cm.metadata.resource_version.is_none(), "expected no resource version on a fresh ConfigMap");

    let renamed = remote_config_map("ledger", "alpha-topology", BTreeMap::new());
    assert!(renamed.metadata.name.as_deref() == Some("alpha-topology"), "expected the configured name, got {:?}", renamed.metadata.name);
    Ok(())
}
