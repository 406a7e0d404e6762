//! The remote config of a deployment, as persisted in each of its clusters.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use topology_core::backend::{ObjectStorageBackend, YamlMapStorageBackend};
use topology_core::components::ComponentsDataWrapper;
use topology_core::config::{ConfigSource, ModelConfigSource, REMOTE_CONFIG_ORDINAL};
use topology_core::lease::{ensure_held, LeaseGuard};
use topology_core::model::{parse_version, Cluster, ComponentKind, DeploymentPhase, LedgerPhase, RemoteConfig, UserIdentity};
use topology_core::schema::{remote, remote::REMOTE_CONFIG_SCHEMA_VERSION};
use topology_core::{REMOTE_CONFIG_DATA_KEY, TOOL_VERSION};

use crate::k8s::RemoteConfigStore;

/// The inputs of a brand new remote config.
#[derive(Clone, Debug)]
pub struct NewRemoteConfig {
    /// The cluster the deployment starts out in.
    pub cluster: Cluster,
    /// The aliases of the consensus nodes to request, such as `node1`.
    pub node_aliases: Vec<String>,
    pub ledger_phase: LedgerPhase,
    /// The consensus node release to deploy.
    pub consensus_node_version: String,
    /// The command creating the deployment, recorded in its history.
    pub command: String,
    pub user: UserIdentity,
}

/// Build a brand new remote config document.
pub fn new_remote_config(params: &NewRemoteConfig) -> Result<RemoteConfig> {
    let mut config = RemoteConfig {
        schema_version: REMOTE_CONFIG_SCHEMA_VERSION,
        ..Default::default()
    };
    config.versions.cli = parse_version(TOOL_VERSION);
    config.versions.consensus_node = parse_version(&params.consensus_node_version);
    config.state.ledger_phase = params.ledger_phase;
    config.add_cluster(params.cluster.clone())?;

    let mut components = ComponentsDataWrapper::new(&mut config.state);
    for alias in params.node_aliases.iter() {
        let id = remote::component_id_from_alias(alias)?;
        let node = components.create_new_consensus_node_component(id, &params.cluster.name, &params.cluster.namespace, DeploymentPhase::Requested, vec![])?;
        components.add_new_component(node).with_context(|| format!("error adding consensus node {}", alias))?;
    }
    components.update_highest_component_id(ComponentKind::ConsensusNodes);

    config.add_command_to_history(params.command.clone());
    config.update_last_updated(params.user.clone());
    config.validate()?;
    Ok(config)
}

/// Runtime access to the remote config of one deployment.
///
/// The document is loaded from a single cluster, and every write is pushed to all clusters of
/// the deployment. Writes require the deployment's lease.
pub struct RemoteConfigRuntimeState {
    store: Arc<dyn RemoteConfigStore>,
    backend: Arc<YamlMapStorageBackend>,
    source: ModelConfigSource<RemoteConfig>,
    /// The schema version of the document as found, before migration.
    loaded_version: Option<u64>,
}

impl RemoteConfigRuntimeState {
    /// Create a new instance. Nothing is read until `load` is called.
    pub fn new(store: Arc<dyn RemoteConfigStore>) -> Result<Self> {
        let backend = Arc::new(YamlMapStorageBackend::default());
        let source = Self::build_source(backend.clone())?;
        Ok(Self {
            store,
            backend,
            source,
            loaded_version: None,
        })
    }

    fn build_source(backend: Arc<YamlMapStorageBackend>) -> Result<ModelConfigSource<RemoteConfig>> {
        let schema = remote::schema_definition()?;
        Ok(ModelConfigSource::new("RemoteConfig", REMOTE_CONFIG_ORDINAL, REMOTE_CONFIG_DATA_KEY, backend, schema).with_validator(RemoteConfig::validate))
    }

    /// Load the document from the first context of the deployment.
    pub async fn load(&mut self) -> Result<()> {
        let context = self.store.contexts().into_iter().next().flatten();
        self.load_from(context.as_deref()).await
    }

    /// Load the document from the given context and migrate it to the current schema.
    ///
    /// On failure the previously loaded document, if any, is kept.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn load_from(&mut self, context: Option<&str>) -> Result<()> {
        let data = self.store.read(context).await?.unwrap_or_default();
        let backend = Arc::new(YamlMapStorageBackend::new(data));
        let loaded_version = match backend.read_object(REMOTE_CONFIG_DATA_KEY).await? {
            Some(raw) => Some(self.source.schema().schema_version_of(&raw)?),
            None => None,
        };
        let mut source = Self::build_source(backend.clone())?;
        source.load().await.context("error loading remote config")?;

        self.backend = backend;
        self.source = source;
        self.loaded_version = loaded_version;
        match loaded_version {
            Some(version) => tracing::debug!(version, current = REMOTE_CONFIG_SCHEMA_VERSION, "remote config loaded"),
            None => tracing::debug!("no remote config found"),
        }
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.source.is_loaded()
    }

    /// The schema version of the document as it was found, before migration.
    pub fn loaded_schema_version(&self) -> Option<u64> {
        self.loaded_version
    }

    /// Give up runtime access, keeping the loaded document as a config source to layer.
    pub fn into_source(self) -> ModelConfigSource<RemoteConfig> {
        self.source
    }

    /// The loaded document.
    pub fn model_data(&self) -> topology_core::Result<&RemoteConfig> {
        self.source.model_data()
    }

    /// Create and persist a brand new document.
    pub async fn create(&mut self, lease: &dyn LeaseGuard, params: &NewRemoteConfig) -> Result<()> {
        ensure_held(lease)?;
        let config = new_remote_config(params)?;
        self.source.set_model_data(config)?;
        self.persist(lease).await
    }

    /// Validate the document and write it to every cluster of the deployment.
    #[tracing::instrument(level = "debug", skip(self, lease), fields(lease = lease.name()))]
    pub async fn persist(&self, lease: &dyn LeaseGuard) -> Result<()> {
        self.source.persist_with_lease(lease).await?;
        let data: BTreeMap<String, String> = self.backend.data().await;
        for context in self.store.contexts() {
            ensure_held(lease)?;
            self.store
                .write(context.as_deref(), data.clone())
                .await
                .with_context(|| format!("error persisting remote config to context {}", context.as_deref().unwrap_or("<current>")))?;
        }
        Ok(())
    }

    /// Apply a mutation to the document, then persist it.
    ///
    /// A mutation which fails leaves the loaded document untouched and writes nothing.
    pub async fn modify<F>(&mut self, lease: &dyn LeaseGuard, mutation: F) -> Result<()>
    where
        F: FnOnce(&mut RemoteConfig) -> topology_core::Result<()>,
    {
        ensure_held(lease)?;
        self.source.modify(mutation)?;
        self.persist(lease).await
    }
}
