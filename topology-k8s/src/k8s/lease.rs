//! Deployment leases built around the `coordination.k8s.io/v1` API.
//!
//! Only the holder of a deployment's lease may change the deployment's remote config. The lease
//! is acquired once per logical operation, renewed in the background while the operation runs,
//! and released when it completes.
//!
//! The `coordination.k8s.io/v1` API does not itself guarantee mutual exclusion. Updates carry the
//! resource version last observed, so two processes racing for a free lease cannot both win, and
//! every persistence call checks `is_held` first. As long as all clients follow this protocol a
//! strong degree of fencing is achieved.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, PostParams};
use kube::client::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use topology_core::lease::LeaseGuard;
use topology_core::AppError;

use crate::k8s::api_timeout;

/// The duration which clients wait between attempts to acquire a lease held elsewhere.
///
/// Core K8s clients default this value to 2 seconds.
const LEASE_RETRY_SECONDS: i64 = 2;

/// Configuration of a deployment lease.
#[derive(Clone, Debug)]
pub struct LeaseConfig {
    /// The name of the lease object.
    name: String,
    /// The namespace of the lease object.
    namespace: String,
    /// The identity to use when the lease is acquired.
    identity: String,
    /// The duration a lease is valid for without renewal.
    ///
    /// A lease whose holder crashed is only taken over once this has elapsed since its last
    /// renewal, so it should be as short as the tolerance for clock skew allows.
    lease_duration: Duration,
    /// The interval at which a held lease is renewed.
    renew_interval: Duration,
    /// The duration to wait for a lease held elsewhere before giving up.
    acquire_timeout: Duration,
    /// The duration to wait between acquisition attempts.
    retry_period: Duration,
}

impl LeaseConfig {
    /// Create a new instance, validating given inputs.
    pub fn new(
        namespace: impl AsRef<str>, name: impl AsRef<str>, identity: String, lease_duration: Duration, renew_interval: Duration, acquire_timeout: Duration,
    ) -> Result<Self> {
        ensure!(!identity.trim().is_empty(), "lease identity must not be empty");
        ensure!(lease_duration > renew_interval, "lease_duration must be greater than renew_interval");
        ensure!(renew_interval.num_seconds() >= 1, "renew_interval must be at least 1 second");
        ensure!(acquire_timeout >= Duration::zero(), "acquire_timeout must not be negative");
        Ok(Self {
            name: name.as_ref().to_string(),
            namespace: namespace.as_ref().to_string(),
            identity,
            lease_duration,
            renew_interval,
            acquire_timeout,
            retry_period: Duration::seconds(LEASE_RETRY_SECONDS),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// The lease identity of this process for the given `user@host` holder: `user@host#pid`.
///
/// A lease held under our own identity is renewed without waiting, so the identity has to be
/// unique to the process.
pub fn process_identity(holder: &str) -> String {
    format!("{}#{}", holder, std::process::id())
}

/// The action to take on a lease, as last observed.
#[derive(Clone, Debug, PartialEq)]
pub enum LeaseAction {
    /// The lease is held by this client and is to be renewed.
    Renew,
    /// The lease is absent, free or expired and is to be taken over.
    TakeOver,
    /// The lease is held by another client until the given time.
    Wait { holder: String, expires_at: DateTime<Utc> },
}

/// Decide what to do with a lease held, or not, as described by `spec`.
pub fn next_action(spec: Option<&LeaseSpec>, identity: &str, now: DateTime<Utc>) -> LeaseAction {
    let spec = match spec {
        Some(spec) => spec,
        None => return LeaseAction::TakeOver,
    };
    let holder = match spec.holder_identity.as_deref() {
        Some(holder) if !holder.is_empty() => holder,
        _ => return LeaseAction::TakeOver,
    };
    if holder == identity {
        return LeaseAction::Renew;
    }
    let last_renewal = spec.renew_time.as_ref().or_else(|| spec.acquire_time.as_ref()).map(|time| time.0);
    let duration = Duration::seconds(spec.lease_duration_seconds.unwrap_or(0) as i64);
    match last_renewal {
        Some(last_renewal) if last_renewal + duration > now => LeaseAction::Wait {
            holder: holder.into(),
            expires_at: last_renewal + duration,
        },
        _ => LeaseAction::TakeOver,
    }
}

/// Build the lease to write for the given action, from the lease as last observed.
pub fn claim(observed: Option<&Lease>, config: &LeaseConfig, action: &LeaseAction, now: DateTime<Utc>) -> Lease {
    let mut lease = observed.cloned().unwrap_or_else(|| Lease {
        metadata: ObjectMeta {
            name: Some(config.name.clone()),
            namespace: Some(config.namespace.clone()),
            ..Default::default()
        },
        spec: None,
    });
    let spec = lease.spec.get_or_insert_with(Default::default);
    spec.lease_duration_seconds = Some(config.lease_duration.num_seconds() as i32);
    spec.renew_time = Some(MicroTime(now));
    if !matches!(action, LeaseAction::Renew) {
        spec.holder_identity = Some(config.identity.clone());
        spec.acquire_time = Some(MicroTime(now));
        spec.lease_transitions = Some(spec.lease_transitions.map(|val| val + 1).unwrap_or(0));
    }
    lease.metadata.managed_fields = None;
    lease
}

/// Check if a lease last renewed at `renewed_at` (unix millis) is still valid at `now`.
pub(crate) fn is_within_lease(renewed_at: i64, lease_duration: Duration, now: DateTime<Utc>) -> bool {
    now.timestamp_millis() < renewed_at.saturating_add(lease_duration.num_milliseconds())
}

/// API access to a single lease object.
#[derive(Clone)]
struct LeaseClient {
    api: Api<Lease>,
    config: Arc<LeaseConfig>,
}

impl LeaseClient {
    /// Make one attempt at taking or renewing the lease.
    ///
    /// Returns the action taken, or `Wait` when the lease is held elsewhere or was changed by
    /// another client between our read and our write.
    async fn try_acquire_or_renew(&self) -> Result<LeaseAction> {
        let now = Utc::now();
        let observed = match timeout(api_timeout(), self.api.get(&self.config.name)).await.context("timeout fetching lease")? {
            Ok(lease) => Some(lease),
            Err(kube::Error::Api(err)) if err.code == 404 => None,
            Err(err) => return Err(err).context("error fetching lease"),
        };
        let action = next_action(observed.as_ref().and_then(|lease| lease.spec.as_ref()), &self.config.identity, now);
        if matches!(action, LeaseAction::Wait { .. }) {
            return Ok(action);
        }

        let lease = claim(observed.as_ref(), &self.config, &action, now);
        let params = PostParams::default();
        let res = match observed {
            Some(_) => timeout(api_timeout(), self.api.replace(&self.config.name, &params, &lease))
                .await
                .context("timeout updating lease")?,
            None => timeout(api_timeout(), self.api.create(&params, &lease)).await.context("timeout creating lease")?,
        };
        match res {
            Ok(_) => Ok(action),
            Err(kube::Error::Api(err)) if err.code == 409 => {
                tracing::debug!(name = %self.config.name, "lease changed concurrently");
                Ok(LeaseAction::Wait {
                    holder: "another client".into(),
                    expires_at: now,
                })
            }
            Err(err) => Err(err).context("error writing lease"),
        }
    }

    /// Give up the lease if this client still holds it.
    async fn release(&self) -> Result<()> {
        let mut lease = match timeout(api_timeout(), self.api.get(&self.config.name)).await.context("timeout fetching lease")? {
            Ok(lease) => lease,
            Err(kube::Error::Api(err)) if err.code == 404 => return Ok(()),
            Err(err) => return Err(err).context("error fetching lease"),
        };
        let spec = lease.spec.get_or_insert_with(Default::default);
        if spec.holder_identity.as_deref() != Some(self.config.identity.as_str()) {
            return Ok(());
        }
        spec.holder_identity = None;
        spec.renew_time = None;
        lease.metadata.managed_fields = None;
        timeout(api_timeout(), self.api.replace(&self.config.name, &PostParams::default(), &lease))
            .await
            .context("timeout releasing lease")?
            .context("error releasing lease")?;
        Ok(())
    }
}

/// The lease of one deployment, held for the duration of one logical operation.
pub struct DeploymentLease {
    client: LeaseClient,
    held: Arc<AtomicBool>,
    /// Unix millis of the last successful acquisition or renewal.
    renewed_at: Arc<AtomicI64>,
    shutdown_tx: Option<watch::Sender<bool>>,
    renewer: Option<JoinHandle<()>>,
}

impl DeploymentLease {
    /// Create a new instance. Nothing is acquired until `acquire` is called.
    pub fn new(client: Client, config: LeaseConfig) -> Self {
        Self {
            client: LeaseClient {
                api: Api::namespaced(client, &config.namespace),
                config: Arc::new(config),
            },
            held: Arc::new(AtomicBool::new(false)),
            renewed_at: Arc::new(AtomicI64::new(0)),
            shutdown_tx: None,
            renewer: None,
        }
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.client.config
    }

    /// Acquire the lease, waiting for another holder's lease to expire up to the acquire timeout.
    ///
    /// Fails with `AppError::LeaseHeld` when the lease is still held elsewhere at the timeout.
    #[tracing::instrument(level = "debug", skip(self), fields(name = %self.client.config.name), err)]
    pub async fn acquire(&mut self) -> Result<()> {
        if self.is_held() {
            return Ok(());
        }
        let config = self.client.config.clone();
        let deadline = Utc::now() + config.acquire_timeout;
        loop {
            match self.client.try_acquire_or_renew().await? {
                LeaseAction::Wait { holder, expires_at } => {
                    let now = Utc::now();
                    if now >= deadline {
                        return Err(AppError::LeaseHeld { name: config.name.clone(), holder }.into());
                    }
                    tracing::info!(%holder, %expires_at, "lease is held by another client, waiting");
                    let delay = std::cmp::min(config.retry_period, deadline - now);
                    tokio::time::sleep(to_std(delay)).await;
                }
                LeaseAction::Renew | LeaseAction::TakeOver => break,
            }
        }
        self.renewed_at.store(Utc::now().timestamp_millis(), Ordering::SeqCst);
        self.held.store(true, Ordering::SeqCst);
        self.spawn_renewer();
        tracing::info!(name = %config.name, identity = %config.identity, "lease acquired");
        Ok(())
    }

    fn spawn_renewer(&mut self) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (client, held, renewed_at) = (self.client.clone(), self.held.clone(), self.renewed_at.clone());
        let interval = to_std(client.config.renew_interval);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => (),
                    _ = shutdown_rx.changed() => break,
                }
                match client.try_acquire_or_renew().await {
                    Ok(LeaseAction::Wait { holder, .. }) => {
                        tracing::error!(%holder, "lease was lost to another client");
                        held.store(false, Ordering::SeqCst);
                        break;
                    }
                    Ok(_) => {
                        renewed_at.store(Utc::now().timestamp_millis(), Ordering::SeqCst);
                        tracing::debug!("lease renewed");
                    }
                    // The lease lapses on its own once renewals fail for a full lease duration.
                    Err(err) => tracing::error!(error = ?err, "error renewing lease"),
                }
            }
        });
        self.shutdown_tx = Some(shutdown_tx);
        self.renewer = Some(handle);
    }

    /// Stop renewing and give up the lease.
    #[tracing::instrument(level = "debug", skip(self), fields(name = %self.client.config.name), err)]
    pub async fn release(&mut self) -> Result<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(renewer) = self.renewer.take() {
            if let Err(err) = renewer.await {
                tracing::error!(error = ?err, "error joining lease renewal task");
            }
        }
        if self.held.swap(false, Ordering::SeqCst) {
            self.client.release().await?;
            tracing::info!(name = %self.client.config.name, "lease released");
        }
        Ok(())
    }
}

impl LeaseGuard for DeploymentLease {
    fn name(&self) -> &str {
        &self.client.config.name
    }

    fn holder_identity(&self) -> &str {
        &self.client.config.identity
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst) && is_within_lease(self.renewed_at.load(Ordering::SeqCst), self.client.config.lease_duration, Utc::now())
    }
}

fn to_std(duration: Duration) -> std::time::Duration {
    duration.to_std().unwrap_or_default()
}
