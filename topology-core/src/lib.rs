//! Versioned configuration and remote topology state for ledger network deployments.

pub mod backend;
pub mod components;
#[cfg(test)]
mod components_test;
pub mod config;
pub mod error;
#[cfg(test)]
mod fixtures;
pub mod key;
pub mod lease;
pub mod mapper;
pub mod model;
pub mod schema;

pub use error::{AppError, Result};

/// The version of this tool, recorded in documents it writes.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The default name of the ConfigMap holding a deployment's remote config, see `remote.configmap`.
pub const REMOTE_CONFIG_CONFIGMAP_NAME: &str = "topology-remote-config";

/// The data key of the remote config document within its ConfigMap.
pub const REMOTE_CONFIG_DATA_KEY: &str = "remote-config-data";

/// Labels applied to the remote config ConfigMap.
pub const REMOTE_CONFIG_LABEL_SELECTOR: &str = "topology.io/type=remote-config";
