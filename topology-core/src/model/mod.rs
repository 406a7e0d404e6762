//! Persisted document models.

mod component;
mod local;
mod remote;

use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;

pub use component::{
    Component, ComponentId, ComponentIds, ComponentMetadata, ComponentState, ConsensusNodeState, PortForwardConfig, PriorityMapping, RelayNodeState,
};
pub use local::{ClusterRef, Deployment, LocalConfig, LocalVersions};
pub use remote::{ApplicationVersions, Cluster, DeploymentHistory, DeploymentState, RemoteConfig, RemoteConfigMetadata, UserIdentity};

/// The kinds of components making up a deployment.
///
/// The serialized names double as the keys of the per kind lists of a deployment's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ComponentKind {
    ConsensusNodes,
    BlockNodes,
    MirrorNodes,
    RelayNodes,
    HaProxies,
    EnvoyProxies,
    Explorers,
}

impl ComponentKind {
    /// Every component kind, in the order their lists appear in a deployment's state.
    pub const ALL: [ComponentKind; 7] = [
        Self::ConsensusNodes,
        Self::BlockNodes,
        Self::MirrorNodes,
        Self::RelayNodes,
        Self::HaProxies,
        Self::EnvoyProxies,
        Self::Explorers,
    ];

    /// The serialized name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConsensusNodes => "consensusNodes",
            Self::BlockNodes => "blockNodes",
            Self::MirrorNodes => "mirrorNodes",
            Self::RelayNodes => "relayNodes",
            Self::HaProxies => "haProxies",
            Self::EnvoyProxies => "envoyProxies",
            Self::Explorers => "explorers",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = AppError;

    fn from_str(val: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(val.trim()))
            .copied()
            .ok_or_else(|| AppError::IllegalArgument(format!("unknown component kind {}", val)))
    }
}

/// Lowercase, trim and use `-` as the word separator.
fn normalize_phase(val: &str) -> String {
    val.trim().to_lowercase().replace('_', "-")
}

/// The lifecycle phase of a single component.
///
/// Only membership is enforced; which transitions are legal is decided by the commands driving
/// a deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentPhase {
    Requested,
    Deployed,
    Configured,
    Started,
    Stopped,
    Frozen,
}

impl DeploymentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Deployed => "deployed",
            Self::Configured => "configured",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Frozen => "frozen",
        }
    }
}

impl Default for DeploymentPhase {
    fn default() -> Self {
        Self::Requested
    }
}

impl std::fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentPhase {
    type Err = AppError;

    fn from_str(val: &str) -> Result<Self, Self::Err> {
        match normalize_phase(val).as_str() {
            "requested" => Ok(Self::Requested),
            "deployed" => Ok(Self::Deployed),
            "configured" => Ok(Self::Configured),
            "started" => Ok(Self::Started),
            "stopped" => Ok(Self::Stopped),
            "frozen" => Ok(Self::Frozen),
            _ => Err(AppError::IllegalArgument(format!("unknown deployment phase {}", val))),
        }
    }
}

impl<'de> Deserialize<'de> for DeploymentPhase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The lifecycle phase of the ledger as a whole.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LedgerPhase {
    Uninitialized,
    Initialized,
}

impl Default for LedgerPhase {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl FromStr for LedgerPhase {
    type Err = AppError;

    fn from_str(val: &str) -> Result<Self, Self::Err> {
        match normalize_phase(val).as_str() {
            "uninitialized" | "un-initialized" => Ok(Self::Uninitialized),
            "initialized" => Ok(Self::Initialized),
            _ => Err(AppError::IllegalArgument(format!("unknown ledger phase {}", val))),
        }
    }
}

impl<'de> Deserialize<'de> for LedgerPhase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a semantic version leniently: a leading `v` is dropped and anything unparsable is
/// read as `0.0.0`.
pub fn parse_version(raw: &str) -> semver::Version {
    let raw = raw.trim();
    let raw = raw.strip_prefix('v').or_else(|| raw.strip_prefix('V')).unwrap_or(raw);
    semver::Version::parse(raw).unwrap_or_else(|_| zero_version())
}

pub(crate) fn zero_version() -> semver::Version {
    semver::Version::new(0, 0, 0)
}

/// Serde adapter persisting semantic versions as strings and reading them leniently.
pub(crate) mod lenient_version {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(version: &semver::Version, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(version)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<semver::Version, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(raw) => super::parse_version(&raw),
            _ => super::zero_version(),
        })
    }
}

/// Serde adapter persisting timestamps as RFC 3339 UTC with millisecond precision, such as
/// `2024-06-01T00:00:00.000Z`.
pub(crate) mod millis_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(deserializer)
    }
}
