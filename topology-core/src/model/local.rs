use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::{lenient_version, zero_version, UserIdentity};

/// The name a user gives to a cluster, mapped to a kube context in their local config.
pub type ClusterRef = String;

/// The versions recorded in a local config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LocalVersions {
    #[serde(with = "lenient_version", default = "zero_version")]
    #[schemars(with = "String")]
    pub cli: semver::Version,
}

impl Default for LocalVersions {
    fn default() -> Self {
        Self { cli: zero_version() }
    }
}

/// A deployment known to the local user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub clusters: Vec<ClusterRef>,
    #[serde(default)]
    pub realm: u64,
    #[serde(default)]
    pub shard: u64,
}

/// The per user config, kept on the local filesystem.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalConfig {
    pub schema_version: u64,
    pub versions: LocalVersions,
    pub user_identity: UserIdentity,
    pub deployments: Vec<Deployment>,
    /// Cluster references mapped to kube contexts.
    pub cluster_refs: BTreeMap<ClusterRef, String>,
}

impl LocalConfig {
    /// Map a cluster reference to a kube context, replacing any previous mapping.
    pub fn add_cluster_ref(&mut self, cluster_ref: impl Into<ClusterRef>, context: impl Into<String>) {
        self.cluster_refs.insert(cluster_ref.into(), context.into());
    }

    /// Remove a cluster reference, returning the context it mapped to.
    pub fn remove_cluster_ref(&mut self, cluster_ref: &str) -> Option<String> {
        self.cluster_refs.remove(cluster_ref)
    }

    /// Register a new deployment with no clusters. Deployment names are unique.
    pub fn add_deployment(&mut self, name: impl Into<String>, namespace: impl Into<String>, realm: u64, shard: u64) -> crate::error::Result<()> {
        let name = name.into();
        if self.deployment_by_name(&name).is_some() {
            return Err(AppError::IllegalArgument(format!("deployment {} already exists", name)));
        }
        self.deployments.push(Deployment {
            name,
            namespace: namespace.into(),
            clusters: vec![],
            realm,
            shard,
        });
        Ok(())
    }

    /// Remove a deployment, returning it if it existed.
    pub fn remove_deployment(&mut self, name: &str) -> Option<Deployment> {
        let idx = self.deployments.iter().position(|dep| dep.name == name)?;
        Some(self.deployments.remove(idx))
    }

    /// Attach a cluster reference to an existing deployment.
    pub fn add_cluster_ref_to_deployment(&mut self, cluster_ref: impl Into<ClusterRef>, deployment: &str) -> crate::error::Result<()> {
        let cluster_ref = cluster_ref.into();
        let dep = self
            .deployments
            .iter_mut()
            .find(|dep| dep.name == deployment)
            .ok_or_else(|| AppError::IllegalArgument(format!("deployment {} does not exist", deployment)))?;
        if !dep.clusters.contains(&cluster_ref) {
            dep.clusters.push(cluster_ref);
        }
        Ok(())
    }

    pub fn deployment_by_name(&self, name: &str) -> Option<&Deployment> {
        self.deployments.iter().find(|dep| dep.name == name)
    }
}
