use lazy_static::lazy_static;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::model::{ComponentKind, DeploymentPhase};

lazy_static! {
    /// Cluster references, as named by users in their local config.
    static ref RE_CLUSTER: Regex = Regex::new(r"^[-_.a-zA-Z0-9]{1,100}$").expect("failed to compile RE_CLUSTER regex");
    /// Kubernetes namespaces, which are DNS labels.
    static ref RE_NAMESPACE: Regex = Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").expect("failed to compile RE_NAMESPACE regex");
}

/// The identity of a component within its kind.
///
/// Signed so that invalid negative ids read from user input or legacy documents can be
/// represented and rejected by validation instead of failing to parse.
pub type ComponentId = i64;

/// A local port forwarded to a component's pod.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortForwardConfig {
    pub local_port: u16,
    pub pod_port: u16,
}

/// The fields shared by every component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMetadata {
    pub id: ComponentId,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub phase: DeploymentPhase,
    #[serde(default)]
    pub port_forward_configs: Vec<PortForwardConfig>,
}

impl ComponentMetadata {
    /// Create a new instance without port forwards.
    pub fn new(id: ComponentId, cluster: impl Into<String>, namespace: impl Into<String>, phase: DeploymentPhase) -> Self {
        Self {
            id,
            cluster: cluster.into(),
            namespace: namespace.into(),
            phase,
            port_forward_configs: vec![],
        }
    }
}

/// The state of a component kind with no fields beyond the shared metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ComponentState {
    pub metadata: ComponentMetadata,
}

/// The preference of a consensus node for one block node. Lower values are preferred.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriorityMapping {
    pub block_node_id: ComponentId,
    pub priority: u32,
}

/// The state of a consensus node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusNodeState {
    pub metadata: ComponentMetadata,
    /// The block nodes this consensus node streams to.
    #[serde(default)]
    pub block_node_ids: Vec<ComponentId>,
    #[serde(default)]
    pub block_node_map: Vec<PriorityMapping>,
}

/// The state of a JSON-RPC relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelayNodeState {
    pub metadata: ComponentMetadata,
    /// The consensus nodes this relay submits transactions to.
    #[serde(default)]
    pub consensus_node_ids: Vec<ComponentId>,
}

/// The highest id allocated so far for each component kind.
///
/// Counters only ever move forward, so an id is never handed out twice even after the component
/// holding it is removed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ComponentIds {
    consensus_nodes: ComponentId,
    block_nodes: ComponentId,
    mirror_nodes: ComponentId,
    relay_nodes: ComponentId,
    ha_proxies: ComponentId,
    envoy_proxies: ComponentId,
    explorers: ComponentId,
}

impl ComponentIds {
    /// The highest id allocated for the given kind.
    pub fn get(&self, kind: ComponentKind) -> ComponentId {
        match kind {
            ComponentKind::ConsensusNodes => self.consensus_nodes,
            ComponentKind::BlockNodes => self.block_nodes,
            ComponentKind::MirrorNodes => self.mirror_nodes,
            ComponentKind::RelayNodes => self.relay_nodes,
            ComponentKind::HaProxies => self.ha_proxies,
            ComponentKind::EnvoyProxies => self.envoy_proxies,
            ComponentKind::Explorers => self.explorers,
        }
    }

    /// Move the counter of the given kind forward to `id`. Lower values are ignored.
    pub fn advance(&mut self, kind: ComponentKind, id: ComponentId) {
        let counter = match kind {
            ComponentKind::ConsensusNodes => &mut self.consensus_nodes,
            ComponentKind::BlockNodes => &mut self.block_nodes,
            ComponentKind::MirrorNodes => &mut self.mirror_nodes,
            ComponentKind::RelayNodes => &mut self.relay_nodes,
            ComponentKind::HaProxies => &mut self.ha_proxies,
            ComponentKind::EnvoyProxies => &mut self.envoy_proxies,
            ComponentKind::Explorers => &mut self.explorers,
        };
        if id > *counter {
            *counter = id;
        }
    }
}

/// A single component of a deployment, of any kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Component {
    ConsensusNode(ConsensusNodeState),
    BlockNode(ComponentState),
    MirrorNode(ComponentState),
    RelayNode(RelayNodeState),
    HaProxy(ComponentState),
    EnvoyProxy(ComponentState),
    Explorer(ComponentState),
}

impl Component {
    /// Build a component of the given kind from its metadata, with empty kind specific fields.
    pub fn from_metadata(kind: ComponentKind, metadata: ComponentMetadata) -> Self {
        match kind {
            ComponentKind::ConsensusNodes => Self::ConsensusNode(ConsensusNodeState {
                metadata,
                block_node_ids: vec![],
                block_node_map: vec![],
            }),
            ComponentKind::RelayNodes => Self::RelayNode(RelayNodeState {
                metadata,
                consensus_node_ids: vec![],
            }),
            ComponentKind::BlockNodes => Self::BlockNode(ComponentState { metadata }),
            ComponentKind::MirrorNodes => Self::MirrorNode(ComponentState { metadata }),
            ComponentKind::HaProxies => Self::HaProxy(ComponentState { metadata }),
            ComponentKind::EnvoyProxies => Self::EnvoyProxy(ComponentState { metadata }),
            ComponentKind::Explorers => Self::Explorer(ComponentState { metadata }),
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::ConsensusNode(_) => ComponentKind::ConsensusNodes,
            Self::BlockNode(_) => ComponentKind::BlockNodes,
            Self::MirrorNode(_) => ComponentKind::MirrorNodes,
            Self::RelayNode(_) => ComponentKind::RelayNodes,
            Self::HaProxy(_) => ComponentKind::HaProxies,
            Self::EnvoyProxy(_) => ComponentKind::EnvoyProxies,
            Self::Explorer(_) => ComponentKind::Explorers,
        }
    }

    pub fn metadata(&self) -> &ComponentMetadata {
        match self {
            Self::ConsensusNode(state) => &state.metadata,
            Self::RelayNode(state) => &state.metadata,
            Self::BlockNode(state) | Self::MirrorNode(state) | Self::HaProxy(state) | Self::EnvoyProxy(state) | Self::Explorer(state) => &state.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ComponentMetadata {
        match self {
            Self::ConsensusNode(state) => &mut state.metadata,
            Self::RelayNode(state) => &mut state.metadata,
            Self::BlockNode(state) | Self::MirrorNode(state) | Self::HaProxy(state) | Self::EnvoyProxy(state) | Self::Explorer(state) => &mut state.metadata,
        }
    }

    pub fn id(&self) -> ComponentId {
        self.metadata().id
    }

    /// Check the invariants of this component: non-negative ids and a well formed placement.
    pub fn validate(&self) -> Result<()> {
        let kind = self.kind();
        let meta = self.metadata();
        validate_id(kind, "id", meta.id)?;
        validate_name(kind, "cluster", &meta.cluster, &RE_CLUSTER, "must contain only letters, digits, `-`, `_` and `.`")?;
        validate_name(kind, "namespace", &meta.namespace, &RE_NAMESPACE, "must be a lowercase DNS label")?;
        match self {
            Self::ConsensusNode(state) => {
                for id in state.block_node_ids.iter() {
                    validate_id(kind, "blockNodeIds", *id)?;
                }
                for mapping in state.block_node_map.iter() {
                    validate_id(kind, "blockNodeMap", mapping.block_node_id)?;
                }
            }
            Self::RelayNode(state) => {
                for id in state.consensus_node_ids.iter() {
                    validate_id(kind, "consensusNodeIds", *id)?;
                }
            }
            _ => (),
        }
        Ok(())
    }
}

fn validate_id(kind: ComponentKind, field: &'static str, id: ComponentId) -> Result<()> {
    if id < 0 {
        return Err(AppError::ComponentValidation {
            kind,
            field,
            value: id.to_string(),
            reason: "must be a non-negative integer",
        });
    }
    Ok(())
}

fn validate_name(kind: ComponentKind, field: &'static str, val: &str, pattern: &Regex, rule: &'static str) -> Result<()> {
    let reason = if val.trim().is_empty() {
        "must not be empty"
    } else if !pattern.is_match(val) {
        rule
    } else {
        return Ok(());
    };
    Err(AppError::ComponentValidation {
        kind,
        field,
        value: val.into(),
        reason,
    })
}
