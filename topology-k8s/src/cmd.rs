//! The topology CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use structopt::StructOpt;
use topology_core::model::{Cluster, LedgerPhase, LocalConfig, RemoteConfig};
use topology_core::schema::remote::REMOTE_CONFIG_SCHEMA_VERSION;

use crate::app::{default_local_config_path, layered_config, App};
use crate::config::Config;
use crate::remote::NewRemoteConfig;

/// Inspect and maintain the remote topology state of ledger network deployments.
///
/// The deployment is selected with the NAMESPACE and DEPLOYMENT environment variables.
#[derive(StructOpt)]
#[structopt(name = "topology")]
pub struct Topology {
    #[structopt(subcommand)]
    action: TopologySubcommands,
}

impl Topology {
    pub async fn run(self) -> Result<()> {
        match &self.action {
            TopologySubcommands::Show(inner) => inner.run(&self).await,
            TopologySubcommands::History(inner) => inner.run(&self).await,
            TopologySubcommands::Migrate(inner) => inner.run(&self).await,
            TopologySubcommands::Create(inner) => inner.run(&self).await,
            TopologySubcommands::Schema(inner) => inner.run(&self),
            TopologySubcommands::Config(inner) => inner.run(&self).await,
        }
    }

    /// Build the application object from the runtime environment.
    pub async fn app(&self) -> Result<App> {
        let config = Arc::new(Config::new()?);
        App::new(config).await
    }
}

#[derive(StructOpt)]
enum TopologySubcommands {
    /// Print the remote config of the deployment.
    Show(Show),
    /// Print the commands run against the deployment.
    History(History),
    /// Upgrade the remote config of the deployment to the current schema.
    Migrate(Migrate),
    /// Create the remote config of a new deployment.
    Create(Create),
    /// Print the JSON schema of a persisted document.
    Schema(Schema),
    /// Print the effective configuration of this tool.
    Config(ShowConfig),
}

/// Print the remote config of the deployment.
#[derive(StructOpt)]
pub struct Show {
    /// The kube context to read from, instead of the first cluster of the deployment.
    #[structopt(long)]
    context: Option<String>,
}

impl Show {
    pub async fn run(&self, base: &Topology) -> Result<()> {
        let app = base.app().await?;
        let state = match &self.context {
            Some(context) => app.load_remote_from(context).await?,
            None => app.load_remote().await?,
        };
        let doc = serde_yaml::to_string(state.model_data()?).context("error serializing remote config")?;
        println!("{}", doc);
        Ok(())
    }
}

/// Print the commands run against the deployment.
#[derive(StructOpt)]
pub struct History {
    /// Print only the most recent commands.
    #[structopt(short, long)]
    last: Option<usize>,
}

impl History {
    pub async fn run(&self, base: &Topology) -> Result<()> {
        let app = base.app().await?;
        let state = app.load_remote().await?;
        let history = &state.model_data()?.history.command_history;
        let skip = self.last.map(|last| history.len().saturating_sub(last)).unwrap_or(0);
        for command in history.iter().skip(skip) {
            println!("{}", command);
        }
        Ok(())
    }
}

/// Upgrade the remote config of the deployment to the current schema.
#[derive(StructOpt)]
pub struct Migrate {
    /// Report what would be done without writing anything.
    #[structopt(long)]
    dry_run: bool,
}

impl Migrate {
    pub async fn run(&self, base: &Topology) -> Result<()> {
        let mut app = base.app().await?;
        let state = app.load_remote().await?;
        let found = match state.loaded_schema_version() {
            Some(found) => found,
            None => bail!("no remote config found for deployment {}", app.config().deployment),
        };
        if found == REMOTE_CONFIG_SCHEMA_VERSION {
            tracing::info!(version = found, "remote config is already at the current schema version");
            return Ok(());
        }
        if self.dry_run {
            tracing::info!(from = found, to = REMOTE_CONFIG_SCHEMA_VERSION, "remote config would be migrated");
            return Ok(());
        }

        app.acquire_lease().await?;
        let res = Self::migrate_locked(&app).await;
        if let Err(err) = app.release_lease().await {
            tracing::error!(error = ?err, "error releasing lease");
        }
        res?;
        tracing::info!(from = found, to = REMOTE_CONFIG_SCHEMA_VERSION, "remote config migrated");
        Ok(())
    }

    async fn migrate_locked(app: &App) -> Result<()> {
        // Reload under the lease, as the document may have changed while we waited for it.
        let mut state = app.load_remote().await?;
        state
            .modify(app.lease(), |config: &mut RemoteConfig| {
                config.add_command_to_history(command_line());
                config.update_last_updated(app.config().user_identity());
                Ok(())
            })
            .await
    }
}

/// Create the remote config of a new deployment.
#[derive(StructOpt)]
pub struct Create {
    /// The name of the cluster the deployment starts out in.
    #[structopt(long)]
    cluster: String,
    /// The consensus nodes of the deployment, comma separated, such as `node1,node2`.
    #[structopt(long, use_delimiter = true)]
    node_aliases: Vec<String>,
    /// The DNS base domain of the cluster.
    #[structopt(long, default_value = "cluster.local")]
    dns_base_domain: String,
    /// The DNS pattern of consensus node services.
    #[structopt(long, default_value = "network-{nodeAlias}-svc.{namespace}.svc")]
    dns_consensus_node_pattern: String,
    /// The consensus node release to deploy.
    #[structopt(long, default_value = "0.0.0")]
    consensus_node_version: String,
}

impl Create {
    pub async fn run(&self, base: &Topology) -> Result<()> {
        let mut app = base.app().await?;
        app.acquire_lease().await?;
        let res = self.create_locked(&app).await;
        if let Err(err) = app.release_lease().await {
            tracing::error!(error = ?err, "error releasing lease");
        }
        res
    }

    async fn create_locked(&self, app: &App) -> Result<()> {
        let mut state = app.load_remote().await?;
        if state.loaded_schema_version().is_some() {
            bail!("deployment {} already has a remote config", app.config().deployment);
        }
        let config = app.config();
        let params = NewRemoteConfig {
            cluster: Cluster {
                name: self.cluster.clone(),
                namespace: config.namespace.clone(),
                deployment_name: config.deployment.clone(),
                dns_base_domain: self.dns_base_domain.clone(),
                dns_consensus_node_pattern: self.dns_consensus_node_pattern.clone(),
            },
            node_aliases: self.node_aliases.clone(),
            ledger_phase: LedgerPhase::Uninitialized,
            consensus_node_version: self.consensus_node_version.clone(),
            command: command_line(),
            user: config.user_identity(),
        };
        state.create(app.lease(), &params).await?;
        tracing::info!(deployment = %config.deployment, nodes = self.node_aliases.len(), "remote config created");
        Ok(())
    }
}

/// Print the JSON schema of a persisted document.
#[derive(StructOpt)]
pub struct Schema {
    /// Print the schema of the local config instead of the remote config.
    #[structopt(long)]
    local: bool,
}

impl Schema {
    pub fn run(&self, _base: &Topology) -> Result<()> {
        let schema = if self.local {
            schemars::schema_for!(LocalConfig)
        } else {
            schemars::schema_for!(RemoteConfig)
        };
        let json = serde_json::to_string_pretty(&schema).context("error serializing schema")?;
        println!("{}", json);
        Ok(())
    }
}

/// Print the effective configuration of this tool.
///
/// Values come from the built-in defaults, `TOPOLOGY_` prefixed environment variables, the local
/// config and, with `--remote`, the deployment's remote config, in increasing order of precedence.
#[derive(StructOpt)]
pub struct ShowConfig {
    /// The path of the local config file.
    #[structopt(long, parse(from_os_str))]
    local_config: Option<PathBuf>,
    /// Layer the remote config of the deployment selected by the environment on top.
    #[structopt(long, conflicts_with = "local-config")]
    remote: bool,
}

impl ShowConfig {
    pub async fn run(&self, base: &Topology) -> Result<()> {
        let config = if self.remote {
            base.app().await?.layered_config_with_remote().await?
        } else {
            let path = self.local_config.clone().unwrap_or_else(default_local_config_path);
            layered_config(&path).await?
        };
        for (key, val) in config.properties() {
            println!("{}={}", key, val);
        }
        Ok(())
    }
}

/// The command line of this invocation, as recorded in a deployment's history.
fn command_line() -> String {
    std::env::args().skip(1).collect::<Vec<_>>().join(" ")
}
