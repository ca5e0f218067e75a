use std::time::Duration;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Name of the folder that marks a sub-tree as "do not migrate"
pub const DEFAULT_SENTINEL_NAME: &str = "Do Not Migrate";

/// Tuning and credential locations of a migration.
///
/// Every field is optional in the JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Google "installed" application secret file
    pub client_secret: Option<Utf8PathBuf>,
    /// Token cache file, overriding the per-user default
    pub token_cache: Option<Utf8PathBuf>,
    /// Maximum number of attempts of a remote call
    pub attempts: u32,
    /// Delay between two attempts of a remote call, in seconds
    pub backoff_secs: u64,
    /// Number of folders listed concurrently while loading a tree
    pub list_concurrency: usize,
    /// Folders with this name are left out of the migration
    pub sentinel_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_secret: None,
            token_cache: None,
            attempts: 3,
            backoff_secs: 10,
            list_concurrency: 4,
            sentinel_name: DEFAULT_SENTINEL_NAME.to_string(),
        }
    }
}

impl Config {
    pub async fn load_from_file(path: &Utf8Path) -> anyhow::Result<Self> {
        let config_json = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read config from {path}"))?;
        let config_json = std::str::from_utf8(&config_json)?;
        Self::from_json(config_json).with_context(|| format!("Invalid config in {path}"))
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> crate::Result<()> {
        if self.attempts == 0 {
            return Err(crate::Error::Config("attempts must be at least 1".into()));
        }
        if self.list_concurrency == 0 {
            return Err(crate::Error::Config(
                "list_concurrency must be at least 1".into(),
            ));
        }
        if self.sentinel_name.contains('\n') {
            return Err(crate::Error::Config(
                "sentinel_name can't contain a new line".into(),
            ));
        }
        Ok(())
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}
