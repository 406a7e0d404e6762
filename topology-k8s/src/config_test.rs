use anyhow::Result;
use topology_core::backend::EnvironmentStorageBackend;
use topology_core::config::{LayeredConfig, StaticConfigSource, LOCAL_CONFIG_ORDINAL};
use topology_core::model::LocalConfig;
use topology_core::REMOTE_CONFIG_CONFIGMAP_NAME;

use crate::config::{Config, LeaseSettings, Settings};

fn full_env() -> Vec<(String, String)> {
    vec![
        ("RUST_LOG".into(), "error".into()),
        ("NAMESPACE".into(), "ledger".into()),
        ("DEPLOYMENT".into(), "alpha".into()),
        ("CONTEXTS".into(), "kind-a, kind-b".into()),
        ("LEASE_HOLDER".into(), "alice@workstation".into()),
        ("LOCAL_CONFIG_PATH".into(), "/home/alice/.topology/local-config.yaml".into()),
    ]
}

#[test]
fn config_deserializes_from_full_env() -> Result<()> {
    let config: Config = envy::from_iter(full_env())?;
    config.validate()?;

    assert!(config.rust_log == "error", "unexpected value parsed for RUST_LOG, got {}, expected {}", config.rust_log, "error");
    assert!(config.namespace == "ledger", "unexpected value parsed for NAMESPACE, got {}, expected {}", config.namespace, "ledger");
    assert!(config.deployment == "alpha", "unexpected value parsed for DEPLOYMENT, got {}, expected {}", config.deployment, "alpha");
    assert!(
        config.contexts == vec!["kind-a".to_string(), "kind-b".to_string()],
        "unexpected value parsed for CONTEXTS, got {:?}",
        config.contexts
    );
    assert!(
        config.local_config_path.as_deref() == Some("/home/alice/.topology/local-config.yaml"),
        "unexpected value parsed for LOCAL_CONFIG_PATH, got {:?}",
        config.local_config_path
    );
    let user = config.user_identity();
    assert!(user.name == "alice" && user.hostname == "workstation", "unexpected user identity {:?}", user);
    let identity = config.lease_identity();
    assert!(identity == format!("alice@workstation#{}", std::process::id()), "unexpected lease identity {}", identity);
    Ok(())
}

#[test]
fn config_deserializes_from_sparse_env() -> Result<()> {
    let config: Config = envy::from_iter(vec![
        ("NAMESPACE".into(), "ledger".into()),
        ("DEPLOYMENT".into(), "alpha".into()),
        ("LEASE_HOLDER".into(), "alice@workstation".into()),
    ])?;
    config.validate()?;

    assert!(config.rust_log == "info", "unexpected default for RUST_LOG, got {}", config.rust_log);
    assert!(config.contexts.is_empty(), "unexpected default for CONTEXTS, got {:?}", config.contexts);
    assert!(config.local_config_path.is_none(), "unexpected default for LOCAL_CONFIG_PATH, got {:?}", config.local_config_path);
    Ok(())
}

#[test]
fn config_rejects_malformed_lease_holders() -> Result<()> {
    let mut env = full_env();
    env.retain(|(key, _)| key != "LEASE_HOLDER");
    env.push(("LEASE_HOLDER".into(), "alice".into()));
    let config: Config = envy::from_iter(env)?;
    assert!(config.validate().is_err(), "expected lease holder without a host to be rejected");
    Ok(())
}

#[test]
fn contexts_resolve_from_env_then_local_config() -> Result<()> {
    let config: Config = envy::from_iter(full_env())?;
    let contexts = config.resolve_contexts(None);
    assert!(
        contexts == vec![Some("kind-a".to_string()), Some("kind-b".to_string())],
        "expected contexts from env, got {:?}",
        contexts
    );

    let mut sparse = config.clone();
    sparse.contexts.clear();
    assert!(sparse.resolve_contexts(None) == vec![None], "expected the current context without a local config");

    let mut local = LocalConfig::default();
    local.add_cluster_ref("cluster-a", "kind-cluster-a");
    local.add_deployment("alpha", "ledger", 0, 0)?;
    local.add_cluster_ref_to_deployment("cluster-a", "alpha")?;
    local.add_cluster_ref_to_deployment("cluster-unmapped", "alpha")?;
    let contexts = sparse.resolve_contexts(Some(&local));
    assert!(contexts == vec![Some("kind-cluster-a".to_string())], "expected contexts from the local config, got {:?}", contexts);
    Ok(())
}

async fn layered(env: &[(&str, &str)], local: Option<&str>) -> Result<LayeredConfig> {
    let env = env.iter().map(|(key, val)| (key.to_string(), val.to_string()));
    let mut builder = LayeredConfig::builder().with_default_sources_from(EnvironmentStorageBackend::from_iter(Some("TOPOLOGY"), env));
    if let Some(local) = local {
        builder = builder.with_source(Box::new(StaticConfigSource::new("local", LOCAL_CONFIG_ORDINAL, local)));
    }
    Ok(builder.with_merge_source_values(true).build().await?)
}

#[tokio::test]
async fn settings_layer_environment_and_local_config_over_defaults() -> Result<()> {
    let settings = Settings::from_layered(&layered(&[], None).await?)?;
    let expected = LeaseSettings { duration: 20, renew: 10, timeout: 60 };
    assert!(settings.lease == expected, "unexpected default lease settings {:?}", settings.lease);
    assert!(settings.remote.configmap == REMOTE_CONFIG_CONFIGMAP_NAME, "unexpected default configmap {}", settings.remote.configmap);

    let env = [("TOPOLOGY_LEASE_DURATION", "30"), ("TOPOLOGY_LEASE_TIMEOUT", "90"), ("TOPOLOGY_REMOTE_CONFIGMAP", "alpha-topology")];
    let settings = Settings::from_layered(&layered(&env, Some("lease:\n  timeout: 120\n")).await?)?;
    let expected = LeaseSettings { duration: 30, renew: 10, timeout: 120 };
    assert!(settings.lease == expected, "unexpected layered lease settings {:?}", settings.lease);
    assert!(settings.remote.configmap == "alpha-topology", "expected the environment to name the configmap, got {}", settings.remote.configmap);
    Ok(())
}

#[tokio::test]
async fn settings_reject_renewal_slower_than_expiry() -> Result<()> {
    let res = Settings::from_layered(&layered(&[("TOPOLOGY_LEASE_RENEW", "20")], None).await?);
    assert!(res.is_err(), "expected a renew interval equal to the lease duration to be rejected");

    let unmerged = LayeredConfig::builder()
        .with_default_sources_from(EnvironmentStorageBackend::from_iter(Some("TOPOLOGY"), Vec::<(String, String)>::new()))
        .build()
        .await?;
    assert!(Settings::from_layered(&unmerged).is_err(), "expected settings to require merged source values");
    Ok(())
}
