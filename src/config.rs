use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub probe_port: u16,
    pub data_dir: PathBuf,
    pub replica_url: Option<String>,
    pub replicator_cmd: Option<String>,
    pub replicator_config_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("APP_PORT must be a valid u16")?;

        let probe_port = env::var("PROBE_PORT")
            .unwrap_or_else(|_| "8081".to_string())
            .parse::<u16>()
            .context("PROBE_PORT must be a valid u16")?;

        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()));

        // Replication is optional: without a replica URL and replicator
        // binary the service runs local-only.
        let replica_url = env::var("REPLICA_URL").ok().filter(|v| !v.is_empty());
        let replicator_cmd = env::var("REPLICATOR_CMD").ok().filter(|v| !v.is_empty());

        let replicator_config_path = env::var("REPLICATOR_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("replicator.json"));

        Ok(Self {
            host,
            port,
            probe_port,
            data_dir,
            replica_url,
            replicator_cmd,
            replicator_config_path,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn probe_address(&self) -> String {
        format!("{}:{}", self.host, self.probe_port)
    }
}
