//! Runtime configuration.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Deserializer};
use topology_core::config::LayeredConfig;
use topology_core::model::{LocalConfig, UserIdentity};

use crate::k8s::process_identity;

/// Runtime configuration data.
///
/// This selects the deployment to operate on. Tunables shared with other tools, such as lease
/// timings, live in the layered configuration instead, see `Settings`.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The logging config, which uses Rust's `env_logger` directives.
    #[serde(default = "Config::default_rust_log")]
    pub rust_log: String,

    /// The Kubernetes namespace of the deployment.
    pub namespace: String,
    /// The name of the deployment.
    pub deployment: String,
    /// The kube contexts of every cluster of the deployment, comma separated.
    ///
    /// When empty, the clusters of the deployment in the local config are used, and failing
    /// that, the current context.
    #[serde(default, deserialize_with = "Config::parse_contexts")]
    pub contexts: Vec<String>,

    /// The user and host acting on the deployment, formatted as `user@host`.
    ///
    /// Recorded as the author of changes. Leases are held under this name suffixed with the
    /// process id, so two runs on one machine never share a lease.
    #[serde(default = "Config::default_lease_holder")]
    pub lease_holder: String,

    /// The path of the local config file.
    #[serde(default)]
    pub local_config_path: Option<String>,
}

impl Config {
    /// Create a new config instance from the runtime environment.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        let config: Config = envy::from_env().context("error building config from env")?;
        config.validate()?;
        Ok(config)
    }

    /// Check the relationships between config values.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.namespace.trim().is_empty(), "NAMESPACE must not be empty");
        ensure!(!self.deployment.trim().is_empty(), "DEPLOYMENT must not be empty");
        ensure!(
            self.lease_holder.split_once('@').map(|(user, host)| !user.is_empty() && !host.is_empty()) == Some(true),
            "LEASE_HOLDER must be formatted as user@host, got {}",
            self.lease_holder,
        );
        Ok(())
    }

    /// The user recorded as the author of changes.
    pub fn user_identity(&self) -> UserIdentity {
        match self.lease_holder.split_once('@') {
            Some((user, host)) => UserIdentity::new(user, host),
            None => UserIdentity::new(self.lease_holder.as_str(), ""),
        }
    }

    /// The identity under which this process holds leases.
    pub fn lease_identity(&self) -> String {
        process_identity(&self.lease_holder)
    }

    /// The kube contexts to operate on. `None` stands for the current context.
    pub fn resolve_contexts(&self, local: Option<&LocalConfig>) -> Vec<Option<String>> {
        if !self.contexts.is_empty() {
            return self.contexts.iter().cloned().map(Some).collect();
        }
        let from_local: Vec<Option<String>> = local
            .and_then(|local| {
                let dep = local.deployment_by_name(&self.deployment)?;
                Some(dep.clusters.iter().filter_map(|cluster| local.cluster_refs.get(cluster).cloned()).map(Some).collect())
            })
            .unwrap_or_default();
        if from_local.is_empty() {
            vec![None]
        } else {
            from_local
        }
    }

    fn parse_contexts<'de, D: Deserializer<'de>>(val: D) -> Result<Vec<String>, D::Error> {
        let raw: String = Deserialize::deserialize(val)?;
        Ok(raw.split(',').map(str::trim).filter(|ctx| !ctx.is_empty()).map(String::from).collect())
    }

    fn default_rust_log() -> String {
        "info".into()
    }

    fn default_lease_holder() -> String {
        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".into());
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into());
        format!("{}@{}", user, host)
    }
}

/// Lease timings in seconds, from the `lease` section of the layered configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LeaseSettings {
    /// Seconds a lease is valid for without renewal.
    pub duration: u32,
    /// Seconds between renewals.
    pub renew: u32,
    /// Seconds to wait for a lease held by another process.
    pub timeout: u32,
}

impl LeaseSettings {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.renew >= 1, "lease.renew must be at least 1");
        ensure!(
            self.duration > self.renew,
            "lease.duration ({}) must be greater than lease.renew ({})",
            self.duration,
            self.renew,
        );
        Ok(())
    }
}

/// Where remote configs are kept, from the `remote` section of the layered configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RemoteSettings {
    /// The name of the ConfigMap holding a deployment's remote config.
    pub configmap: String,
}

/// Settings resolved from the layered configuration.
///
/// The built-in defaults are overridden by `TOPOLOGY_` prefixed environment variables, which are
/// overridden by the local config. `TOPOLOGY_LEASE_DURATION=30` sets `lease.duration`.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub lease: LeaseSettings,
    pub remote: RemoteSettings,
}

impl Settings {
    /// Read and validate the settings. Object values must be merged across sources.
    pub fn from_layered(config: &LayeredConfig) -> Result<Self> {
        ensure!(config.merges_source_values(), "settings require a layered config merging source values");
        let lease: LeaseSettings = config.as_object(Some("lease"))?.context("no lease settings configured")?;
        lease.validate()?;
        let remote: RemoteSettings = config.as_object(Some("remote"))?.context("no remote config settings configured")?;
        ensure!(!remote.configmap.trim().is_empty(), "remote.configmap must not be empty");
        Ok(Self { lease, remote })
    }
}
