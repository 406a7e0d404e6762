//! Remote config ConfigMaps.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use kube::client::Client;
use maplit::btreemap;
use topology_core::REMOTE_CONFIG_LABEL_SELECTOR;

use crate::k8s::api_timeout;

/// Storage of the remote config data of a deployment, one copy per cluster context.
#[async_trait]
pub trait RemoteConfigStore: Send + Sync {
    /// The contexts holding a copy. `None` stands for the current context.
    fn contexts(&self) -> Vec<Option<String>>;

    /// Read the ConfigMap data held in the given context, if the ConfigMap exists.
    async fn read(&self, context: Option<&str>) -> Result<Option<BTreeMap<String, String>>>;

    /// Replace the ConfigMap data held in the given context, creating the ConfigMap as needed.
    async fn write(&self, context: Option<&str>, data: BTreeMap<String, String>) -> Result<()>;
}

/// The labels of the remote config ConfigMap, parsed from its label selector.
pub fn remote_config_labels() -> BTreeMap<String, String> {
    REMOTE_CONFIG_LABEL_SELECTOR
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, val)| (key.trim().to_string(), val.trim().to_string()))
        .collect()
}

/// Build the remote config ConfigMap with the given name in the given namespace.
pub fn remote_config_map(namespace: &str, name: &str, data: BTreeMap<String, String>) -> ConfigMap {
    let mut labels = remote_config_labels();
    labels.insert("app.kubernetes.io/managed-by".into(), "topology".into());
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            labels: Some(labels),
            annotations: Some(btreemap! {
                "topology.io/cli-version".into() => topology_core::TOOL_VERSION.into(),
            }),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// The remote config ConfigMap of one namespace, in every cluster of a deployment.
pub struct ConfigMapStore {
    namespace: String,
    name: String,
    clients: Vec<(Option<String>, Client)>,
}

impl ConfigMapStore {
    /// Create a new instance over the given clients, each keyed by its kube context.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, clients: Vec<(Option<String>, Client)>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            clients,
        }
    }

    fn api(&self, context: Option<&str>) -> Result<Api<ConfigMap>> {
        let (_, client) = self
            .clients
            .iter()
            .find(|(ctx, _)| ctx.as_deref() == context)
            .with_context(|| format!("no client configured for context {}", context.unwrap_or("<current>")))?;
        Ok(Api::namespaced(client.clone(), &self.namespace))
    }
}

#[async_trait]
impl RemoteConfigStore for ConfigMapStore {
    fn contexts(&self) -> Vec<Option<String>> {
        self.clients.iter().map(|(ctx, _)| ctx.clone()).collect()
    }

    #[tracing::instrument(level = "debug", skip(self), fields(namespace = %self.namespace, name = %self.name))]
    async fn read(&self, context: Option<&str>) -> Result<Option<BTreeMap<String, String>>> {
        let api = self.api(context)?;
        let res = tokio::time::timeout(api_timeout(), api.get(&self.name))
            .await
            .context("timeout while fetching remote config")?;
        match res {
            Ok(cm) => Ok(Some(cm.data.unwrap_or_default())),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
            Err(err) => Err(err).context("error fetching remote config"),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, data), fields(namespace = %self.namespace, name = %self.name))]
    async fn write(&self, context: Option<&str>, data: BTreeMap<String, String>) -> Result<()> {
        let api = self.api(context)?;
        let mut cm = remote_config_map(&self.namespace, &self.name, data);
        let params = PostParams::default();
        let existing = tokio::time::timeout(api_timeout(), api.get(&self.name))
            .await
            .context("timeout while fetching remote config")?;
        match existing {
            Ok(current) => {
                // Replacing requires the resource version last observed.
                cm.metadata.resource_version = current.metadata.resource_version;
                tokio::time::timeout(api_timeout(), api.replace(&self.name, &params, &cm))
                    .await
                    .context("timeout while updating remote config")?
                    .context("error updating remote config")?;
            }
            Err(kube::Error::Api(err)) if err.code == 404 => {
                tokio::time::timeout(api_timeout(), api.create(&params, &cm))
                    .await
                    .context("timeout while creating remote config")?
                    .context("error creating remote config")?;
            }
            Err(err) => return Err(err).context("error fetching remote config"),
        }
        tracing::debug!(context = context.unwrap_or("<current>"), "remote config written");
        Ok(())
    }
}
