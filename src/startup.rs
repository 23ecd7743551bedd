//! Startup sequencing around the external replicator.
//!
//! Order matters: the liveness probe listens before any waiting begins, the
//! replica restore runs before the store is opened, and replication only
//! begins once the store file exists on disk. Restore failures other than
//! "nothing to restore" are deliberately non-fatal: the service starts with
//! an empty store instead of refusing to start.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use axum::{Router, routing::get};
use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::core::{AppError, Result};
use crate::storage::persistence::{snapshot_path, wal_path};

const STORE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The generated configuration consumed by the replicator process.
#[derive(Debug, Serialize)]
struct ReplicatorConfig<'a> {
    data_dir: &'a str,
    snapshot_file: String,
    wal_file: String,
    replica_url: &'a str,
}

pub struct ReadinessGate {
    data_dir: PathBuf,
    probe_address: String,
    replica_url: Option<String>,
    replicator_cmd: Option<String>,
    replicator_config_path: PathBuf,
}

impl ReadinessGate {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            probe_address: config.probe_address(),
            replica_url: config.replica_url.clone(),
            replicator_cmd: config.replicator_cmd.clone(),
            replicator_config_path: config.replicator_config_path.clone(),
        }
    }

    /// Runs the startup sequence up to the point where the store may be
    /// opened: write the replicator configuration, expose the liveness
    /// probe, restore from the replica. Returns the probe server task.
    pub async fn await_ready(&self) -> Result<JoinHandle<()>> {
        self.write_replicator_config();
        let probe = self.serve_probe().await?;
        self.restore_replica().await;
        Ok(probe)
    }

    fn write_replicator_config(&self) {
        let Some(replica_url) = &self.replica_url else {
            info!("no replica configured, running local-only");
            return;
        };
        let data_dir = self.data_dir.to_string_lossy();
        let config = ReplicatorConfig {
            data_dir: &data_dir,
            snapshot_file: snapshot_path(&self.data_dir).to_string_lossy().into_owned(),
            wal_file: wal_path(&self.data_dir).to_string_lossy().into_owned(),
            replica_url,
        };
        match self.try_write_replicator_config(&config) {
            Ok(()) => info!(
                path = %self.replicator_config_path.display(),
                "replicator configuration written"
            ),
            Err(err) => {
                let err = AppError::startup(format!("failed to write replicator config: {err}"));
                warn!(error = %err, "continuing without replication");
            }
        }
    }

    fn try_write_replicator_config(&self, config: &ReplicatorConfig<'_>) -> Result<()> {
        if let Some(parent) = self.replicator_config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(config)
            .map_err(|e| AppError::startup(format!("failed to encode replicator config: {e}")))?;
        fs::write(&self.replicator_config_path, body)?;
        Ok(())
    }

    /// Binds and serves the liveness probe immediately, so the hosting
    /// platform keeps the process alive through the unbounded waits below.
    async fn serve_probe(&self) -> Result<JoinHandle<()>> {
        let listener = tokio::net::TcpListener::bind(&self.probe_address)
            .await
            .map_err(|e| {
                AppError::startup(format!(
                    "failed to bind liveness probe on {}: {e}",
                    self.probe_address
                ))
            })?;
        info!(address = %self.probe_address, "liveness probe listening");

        let router = Router::new().route("/healthz", get(|| async { "ok" }));
        Ok(tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                warn!(error = %err, "liveness probe server exited");
            }
        }))
    }

    /// Restores the store's durable image into the local data directory.
    /// `--if-not-exists` makes "nothing to restore" a success on first-ever
    /// runs; any other failure is logged and startup proceeds with an empty
    /// store.
    async fn restore_replica(&self) {
        let Some(cmd) = &self.replicator_cmd else {
            info!("no replicator configured, skipping restore");
            return;
        };
        let result = Command::new(cmd)
            .arg("restore")
            .arg("--if-not-exists")
            .arg("--config")
            .arg(&self.replicator_config_path)
            .status()
            .await;
        match result {
            Ok(status) if status.success() => info!("replica restore finished"),
            Ok(status) => {
                let err = AppError::startup(format!("replicator restore exited with {status}"));
                warn!(error = %err, "continuing with local store");
            }
            Err(err) => {
                let err = AppError::startup(format!("failed to run replicator restore: {err}"));
                warn!(error = %err, "continuing with local store");
            }
        }
    }

    /// Polls until the store's data file exists. The wait is unbounded;
    /// nothing else guarantees startup ordering, and the probe above keeps
    /// the process alive meanwhile.
    pub async fn wait_for_store(&self) {
        let path = snapshot_path(&self.data_dir);
        let mut logged = false;
        while !path.exists() {
            if !logged {
                info!(path = %path.display(), "waiting for store file");
                logged = true;
            }
            sleep(STORE_POLL_INTERVAL).await;
        }
        info!(path = %path.display(), "store file present");
    }

    /// Launches the long-running replication child, if one is configured.
    /// The caller keeps the handle for the life of the process.
    pub fn begin_replication(&self) -> Option<Child> {
        let cmd = self.replicator_cmd.as_ref()?;
        match Command::new(cmd)
            .arg("replicate")
            .arg("--config")
            .arg(&self.replicator_config_path)
            .spawn()
        {
            Ok(child) => {
                info!("replication started");
                Some(child)
            }
            Err(err) => {
                let err = AppError::startup(format!("failed to start replication: {err}"));
                warn!(error = %err, "continuing without replication");
                None
            }
        }
    }
}
