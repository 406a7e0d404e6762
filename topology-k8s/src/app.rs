use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use topology_core::backend::YamlFileStorageBackend;
use topology_core::config::{LayeredConfig, ModelConfigSource, LOCAL_CONFIG_ORDINAL};
use topology_core::model::LocalConfig;
use topology_core::schema::local;

use crate::config::{Config, Settings};
use crate::k8s::{client_for_context, lease_name, ConfigMapStore, DeploymentLease, LeaseConfig};
use crate::remote::RemoteConfigRuntimeState;

/// The path of the local config file when none is configured.
pub fn default_local_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    Path::new(&home).join(".topology").join("local-config.yaml")
}

/// Build the source of the local config file at the given path. Nothing is read until loaded.
pub fn local_config_source(path: &Path) -> Result<ModelConfigSource<LocalConfig>> {
    let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid local config path {:?}", path))?;
    let backend = Arc::new(YamlFileStorageBackend::new(dir));
    Ok(ModelConfigSource::new("local", LOCAL_CONFIG_ORDINAL, file_name, backend, local::schema_definition()?))
}

/// Build the layered configuration of this tool: the built-in defaults, then `TOPOLOGY_`
/// prefixed environment variables, then the local config file at the given path.
pub async fn layered_config(local_path: &Path) -> Result<LayeredConfig> {
    LayeredConfig::builder()
        .with_default_sources()
        .with_source(Box::new(local_config_source(local_path)?))
        .with_merge_source_values(true)
        .build()
        .await
        .context("error loading configuration")
}

/// The application object for operating on one deployment.
pub struct App {
    /// The application's runtime config.
    config: Arc<Config>,
    /// The path of the local config file.
    local_path: PathBuf,
    /// The local config, if the user has one.
    local: Option<LocalConfig>,
    /// The remote config ConfigMaps of every cluster of the deployment.
    store: Arc<ConfigMapStore>,
    /// The deployment's lease, held in the first cluster of the deployment.
    lease: DeploymentLease,
}

impl App {
    /// Create a new instance.
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        let local_path = config.local_config_path.as_ref().map(PathBuf::from).unwrap_or_else(default_local_config_path);
        let layered = layered_config(&local_path).await?;
        let settings = Settings::from_layered(&layered)?;
        tracing::debug!(?settings, "resolved settings");
        let local = layered
            .source::<ModelConfigSource<LocalConfig>>("local")
            .and_then(|source| source.model_data().ok())
            .cloned();

        // Initialize a K8s client per cluster of the deployment.
        let mut clients = vec![];
        for context in config.resolve_contexts(local.as_ref()) {
            let client = client_for_context(context.as_deref()).await?;
            clients.push((context, client));
        }
        let lease_client = clients.first().map(|(_, client)| client.clone()).context("no cluster configured for deployment")?;
        let store = Arc::new(ConfigMapStore::new(&config.namespace, &settings.remote.configmap, clients));

        let lease_config = LeaseConfig::new(
            &config.namespace,
            lease_name(&config.deployment),
            config.lease_identity(),
            Duration::seconds(settings.lease.duration.into()),
            Duration::seconds(settings.lease.renew.into()),
            Duration::seconds(settings.lease.timeout.into()),
        )?;
        let lease = DeploymentLease::new(lease_client, lease_config);

        Ok(Self {
            config,
            local_path,
            local,
            store,
            lease,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn local_config(&self) -> Option<&LocalConfig> {
        self.local.as_ref()
    }

    /// Load the remote config of the deployment from its first cluster.
    pub async fn load_remote(&self) -> Result<RemoteConfigRuntimeState> {
        let mut state = RemoteConfigRuntimeState::new(self.store.clone())?;
        state.load().await?;
        Ok(state)
    }

    /// Load the remote config of the deployment from the cluster of the given context.
    pub async fn load_remote_from(&self, context: &str) -> Result<RemoteConfigRuntimeState> {
        let mut state = RemoteConfigRuntimeState::new(self.store.clone())?;
        state.load_from(Some(context)).await?;
        Ok(state)
    }

    /// The layered configuration with the deployment's remote config on top.
    pub async fn layered_config_with_remote(&self) -> Result<LayeredConfig> {
        let mut layered = layered_config(&self.local_path).await?;
        let state = self.load_remote().await?;
        layered.add_source(Box::new(state.into_source()))?;
        Ok(layered)
    }

    /// Acquire the deployment's lease, which is then held until `release_lease`.
    pub async fn acquire_lease(&mut self) -> Result<()> {
        self.lease.acquire().await
    }

    pub fn lease(&self) -> &DeploymentLease {
        &self.lease
    }

    pub async fn release_lease(&mut self) -> Result<()> {
        self.lease.release().await
    }
}
