use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::{lenient_version, millis_timestamp, zero_version, ComponentIds, ComponentKind, ComponentState, ConsensusNodeState, LedgerPhase, RelayNodeState};

/// The most recent commands kept in a deployment's history.
pub const MAX_COMMAND_HISTORY: usize = 50;

/// The document persisted in every cluster of a deployment, describing its topology.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(default)]
    pub schema_version: u64,
    #[serde(default)]
    pub metadata: RemoteConfigMetadata,
    #[serde(default)]
    pub versions: ApplicationVersions,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
    #[serde(default)]
    pub state: DeploymentState,
    #[serde(default)]
    pub history: DeploymentHistory,
}

impl RemoteConfig {
    /// Add a cluster to this deployment. Cluster names are unique.
    pub fn add_cluster(&mut self, cluster: Cluster) -> crate::error::Result<()> {
        if self.clusters.iter().any(|existing| existing.name == cluster.name) {
            return Err(AppError::IllegalArgument(format!("cluster {} is already part of this deployment", cluster.name)));
        }
        self.clusters.push(cluster);
        Ok(())
    }

    /// Find a cluster of this deployment by name.
    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|cluster| cluster.name == name)
    }

    /// Record a command as the most recently executed one.
    pub fn add_command_to_history(&mut self, command: impl Into<String>) {
        let command = command.into();
        self.history.command_history.push(command.clone());
        self.history.last_executed_command = Some(command);
        let len = self.history.command_history.len();
        if len > MAX_COMMAND_HISTORY {
            self.history.command_history.drain(..len - MAX_COMMAND_HISTORY);
        }
    }

    /// Check every component and that cluster names are unique.
    pub fn validate(&self) -> crate::error::Result<()> {
        for (idx, cluster) in self.clusters.iter().enumerate() {
            if self.clusters[..idx].iter().any(|prev| prev.name == cluster.name) {
                return Err(AppError::IllegalArgument(format!("cluster {} appears more than once", cluster.name)));
            }
        }
        self.state.validate()
    }

    /// Stamp this document as last updated now by the given user.
    pub fn update_last_updated(&mut self, user: UserIdentity) {
        self.metadata.last_updated_at = Utc::now();
        self.metadata.last_updated_by = user;
    }
}

/// Who last changed a document, and when.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigMetadata {
    #[serde(with = "millis_timestamp", default = "epoch")]
    #[schemars(with = "DateTime<Utc>")]
    pub last_updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_updated_by: UserIdentity,
}

impl Default for RemoteConfigMetadata {
    fn default() -> Self {
        Self {
            last_updated_at: epoch(),
            last_updated_by: UserIdentity::default(),
        }
    }
}

pub(crate) fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from(std::time::UNIX_EPOCH)
}

/// A user of the tool on a given machine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: String,
}

impl UserIdentity {
    pub fn new(name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
        }
    }
}

/// The versions of the tool and of each component's chart or release deployed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationVersions {
    #[serde(with = "lenient_version", default = "zero_version")]
    #[schemars(with = "String")]
    pub cli: semver::Version,
    #[serde(with = "lenient_version", default = "zero_version")]
    #[schemars(with = "String")]
    pub chart: semver::Version,
    #[serde(with = "lenient_version", default = "zero_version")]
    #[schemars(with = "String")]
    pub consensus_node: semver::Version,
    #[serde(with = "lenient_version", default = "zero_version")]
    #[schemars(with = "String")]
    pub mirror_node_chart: semver::Version,
    #[serde(with = "lenient_version", default = "zero_version")]
    #[schemars(with = "String")]
    pub explorer_chart: semver::Version,
    #[serde(with = "lenient_version", default = "zero_version")]
    #[schemars(with = "String")]
    pub json_rpc_relay_chart: semver::Version,
    #[serde(with = "lenient_version", default = "zero_version")]
    #[schemars(with = "String")]
    pub block_node_chart: semver::Version,
}

impl Default for ApplicationVersions {
    fn default() -> Self {
        Self {
            cli: zero_version(),
            chart: zero_version(),
            consensus_node: zero_version(),
            mirror_node_chart: zero_version(),
            explorer_chart: zero_version(),
            json_rpc_relay_chart: zero_version(),
            block_node_chart: zero_version(),
        }
    }
}

impl ApplicationVersions {
    fn field_mut(&mut self, kind: ComponentKind) -> crate::error::Result<&mut semver::Version> {
        match kind {
            ComponentKind::ConsensusNodes => Ok(&mut self.consensus_node),
            ComponentKind::BlockNodes => Ok(&mut self.block_node_chart),
            ComponentKind::MirrorNodes => Ok(&mut self.mirror_node_chart),
            ComponentKind::RelayNodes => Ok(&mut self.json_rpc_relay_chart),
            ComponentKind::Explorers => Ok(&mut self.explorer_chart),
            ComponentKind::HaProxies | ComponentKind::EnvoyProxies => Err(AppError::IllegalArgument(format!("no version is tracked for {}", kind))),
        }
    }

    /// The version deployed for the given component kind.
    pub fn component_version(&self, kind: ComponentKind) -> crate::error::Result<&semver::Version> {
        match kind {
            ComponentKind::ConsensusNodes => Ok(&self.consensus_node),
            ComponentKind::BlockNodes => Ok(&self.block_node_chart),
            ComponentKind::MirrorNodes => Ok(&self.mirror_node_chart),
            ComponentKind::RelayNodes => Ok(&self.json_rpc_relay_chart),
            ComponentKind::Explorers => Ok(&self.explorer_chart),
            ComponentKind::HaProxies | ComponentKind::EnvoyProxies => Err(AppError::IllegalArgument(format!("no version is tracked for {}", kind))),
        }
    }

    /// Record the version deployed for the given component kind.
    pub fn update_component_version(&mut self, kind: ComponentKind, version: semver::Version) -> crate::error::Result<()> {
        *self.field_mut(kind)? = version;
        Ok(())
    }
}

/// A cluster hosting part of a deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub deployment_name: String,
    #[serde(default)]
    pub dns_base_domain: String,
    #[serde(default)]
    pub dns_consensus_node_pattern: String,
}

/// The live state of every component of a deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentState {
    pub ledger_phase: LedgerPhase,
    pub component_ids: ComponentIds,
    pub consensus_nodes: Vec<ConsensusNodeState>,
    pub block_nodes: Vec<ComponentState>,
    pub mirror_nodes: Vec<ComponentState>,
    pub relay_nodes: Vec<RelayNodeState>,
    pub ha_proxies: Vec<ComponentState>,
    pub envoy_proxies: Vec<ComponentState>,
    pub explorers: Vec<ComponentState>,
    pub tss_enabled: bool,
}

/// The commands run against a deployment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentHistory {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_executed_command: Option<String>,
    pub command_history: Vec<String>,
}
