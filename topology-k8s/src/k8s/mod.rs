//! Kubernetes integration.
//!
//! A deployment may span several clusters. Every cluster holds its own copy of the deployment's
//! remote config in a ConfigMap, while the deployment's lease lives in the first cluster only.

mod configmap;
#[cfg(test)]
mod configmap_test;
mod lease;
#[cfg(test)]
mod lease_test;

use anyhow::{Context, Result};
use kube::client::Client;
use kube::config::{Config as KubeConfig, KubeConfigOptions};

pub use configmap::{remote_config_labels, remote_config_map, ConfigMapStore, RemoteConfigStore};
pub use lease::{claim, next_action, process_identity, DeploymentLease, LeaseAction, LeaseConfig};

/// Build a K8s client for the given kube context, or for the current context when `None`.
#[tracing::instrument(level = "debug")]
pub async fn client_for_context(context: Option<&str>) -> Result<Client> {
    let config = match context {
        Some(context) => {
            let options = KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            };
            KubeConfig::from_kubeconfig(&options)
                .await
                .with_context(|| format!("error loading kubeconfig for context {}", context))?
        }
        None => KubeConfig::infer().await.context("error inferring K8s client config")?,
    };
    Client::try_from(config).context("error initializing K8s client")
}

/// The name of the lease guarding the given deployment.
pub fn lease_name(deployment: &str) -> String {
    format!("topology-{}-lease", deployment)
}

/// The default timeout to use for interacting with the K8s API.
pub(crate) fn api_timeout() -> std::time::Duration {
    std::time::Duration::from_secs(10)
}
