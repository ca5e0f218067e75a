//! Locations module

/// Locations for the user
pub mod user {
    use camino::Utf8PathBuf;

    pub fn config_dir() -> anyhow::Result<Utf8PathBuf> {
        let dir =
            dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Can't get config directory"))?;
        let dir = Utf8PathBuf::try_from(dir)?;
        Ok(dir.join("dmig"))
    }

    pub fn cache_dir() -> anyhow::Result<Utf8PathBuf> {
        let dir = dirs::cache_dir().ok_or_else(|| anyhow::anyhow!("Can't get cache directory"))?;
        let dir = Utf8PathBuf::try_from(dir)?;
        Ok(dir.join("dmig"))
    }

    pub fn config_file() -> anyhow::Result<Utf8PathBuf> {
        Ok(config_dir()?.join("config.json"))
    }

    pub fn oauth_secret_file() -> anyhow::Result<Utf8PathBuf> {
        Ok(config_dir()?.join("client_secret.json"))
    }

    pub fn token_cache_file() -> anyhow::Result<Utf8PathBuf> {
        Ok(cache_dir()?.join("token_cache.json"))
    }
}
