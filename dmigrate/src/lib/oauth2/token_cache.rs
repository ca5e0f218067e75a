use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Duration, Utc};
use oauth2::{AccessToken, RefreshToken, TokenResponse, TokenType};
use serde::{Deserialize, Serialize};

/// Margin under which a token is considered expired already
fn expiry_margin() -> Duration {
    Duration::seconds(60)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenEntry {
    access_token: AccessToken,
    refresh_token: Option<RefreshToken>,
    expiration: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum CacheResult {
    None,
    Expired(RefreshToken),
    Ok(AccessToken),
}

/// Token cache persisted as JSON
#[derive(Debug)]
pub struct TokenCache {
    path: Utf8PathBuf,
    entry: Option<TokenEntry>,
}

impl TokenCache {
    /// Reads the cache at `path`.
    /// A missing file gives an empty cache.
    pub async fn load(path: Utf8PathBuf) -> anyhow::Result<Self> {
        log::info!("reading cached tokens from {path}");
        let entry = match tokio::fs::read_to_string(&path).await {
            Ok(json) => Some(serde_json::from_str(&json)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, entry })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn check(&self, now: DateTime<Utc>) -> CacheResult {
        let Some(entry) = &self.entry else {
            return CacheResult::None;
        };
        match entry.expiration {
            Some(expiration) if expiration - expiry_margin() < now => match &entry.refresh_token {
                Some(refresh_token) => CacheResult::Expired(refresh_token.clone()),
                None => CacheResult::None,
            },
            _ => CacheResult::Ok(entry.access_token.clone()),
        }
    }

    /// Stores a token response.
    /// Google does not always send a new refresh token, the previous one is kept in that case.
    pub fn put<T, TT>(&mut self, tok: &T)
    where
        T: TokenResponse<TT>,
        TT: TokenType,
    {
        log::trace!("put token, expires in {:?}", tok.expires_in());
        let refresh_token = tok
            .refresh_token()
            .cloned()
            .or_else(|| self.entry.as_ref().and_then(|e| e.refresh_token.clone()));
        let expiration = tok
            .expires_in()
            .and_then(|exp| Duration::from_std(exp).ok())
            .map(|exp| Utc::now() + exp);
        self.entry = Some(TokenEntry {
            access_token: tok.access_token().clone(),
            refresh_token,
            expiration,
        });
    }

    pub async fn write_to_disk(&self) -> anyhow::Result<()> {
        let Some(entry) = &self.entry else {
            return Ok(());
        };
        log::info!("caching tokens to {}", self.path);
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string_pretty(entry)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
