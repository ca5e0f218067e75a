use std::sync::Arc;

use chrono::Utc;
use futures::prelude::*;
use oauth2::{basic::BasicClient, HttpRequest, HttpResponse};
pub use oauth2::{AccessToken, RefreshToken, Scope};
use tokio::sync::RwLock;

mod token_cache;

pub use self::token_cache::{CacheResult, TokenCache};

pub trait GetToken: Send + Sync + 'static {
    fn get_token(
        &self,
        scopes: Vec<Scope>,
    ) -> impl Future<Output = anyhow::Result<AccessToken>> + Send;
}

/// A token obtained out of band, e.g. from `DMIG_ACCESS_TOKEN`
#[derive(Clone, Debug)]
pub struct StaticToken(AccessToken);

impl StaticToken {
    pub fn new(token: String) -> Self {
        Self(AccessToken::new(token))
    }
}

impl GetToken for StaticToken {
    async fn get_token(&self, _scopes: Vec<Scope>) -> anyhow::Result<AccessToken> {
        Ok(self.0.clone())
    }
}

#[derive(Debug)]
struct Inner {
    cache: RwLock<TokenCache>,
    http: reqwest::Client,
    oauth2: BasicClient,
}

/// Access tokens from a previously authorized token cache,
/// refreshed when they expire.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    pub fn new(
        secret: dmig::oauth2::Secret,
        cache: TokenCache,
        http: Option<reqwest::Client>,
    ) -> Self {
        let oauth2 = BasicClient::new(
            secret.client_id,
            Some(secret.client_secret),
            secret.auth_url,
            Some(secret.token_url),
        );
        let http = http.unwrap_or_default();

        Self {
            inner: Arc::new(Inner {
                cache: RwLock::new(cache),
                http,
                oauth2,
            }),
        }
    }

    async fn refresh_token(
        &self,
        refresh_token: RefreshToken,
        scopes: Vec<Scope>,
    ) -> anyhow::Result<AccessToken> {
        use oauth2::TokenResponse;

        log::info!("refreshing access token");
        let token_response = self
            .inner
            .oauth2
            .exchange_refresh_token(&refresh_token)
            .add_scopes(scopes)
            .request_async(|req| async { self.http(req).await })
            .await?;

        let access = token_response.access_token().to_owned();

        let mut cache = self.inner.cache.write().await;
        cache.put(&token_response);
        cache.write_to_disk().await?;

        Ok(access)
    }

    async fn http(&self, req: HttpRequest) -> reqwest::Result<HttpResponse> {
        let method = req.method.clone();
        let url = req.url.clone();

        let resp = self
            .inner
            .http
            .request(req.method, req.url)
            .headers(req.headers)
            .body(req.body)
            .send()
            .await?;

        let status_code = resp.status();
        let headers = resp.headers().to_owned();
        let body = resp.bytes().await?.to_vec();

        if !status_code.is_success() {
            log::error!("{method} {url} received error {status_code}");
            if let Ok(body) = std::str::from_utf8(&body) {
                log::error!("{body}");
            }
        }

        Ok(HttpResponse {
            status_code,
            headers,
            body,
        })
    }
}

impl GetToken for Client {
    async fn get_token(&self, scopes: Vec<Scope>) -> anyhow::Result<AccessToken> {
        let cache = self.inner.cache.read().await;
        match cache.check(Utc::now()) {
            CacheResult::Ok(access_token) => Ok(access_token),
            CacheResult::Expired(refresh_token) => {
                drop(cache);
                self.refresh_token(refresh_token, scopes).await
            }
            CacheResult::None => anyhow::bail!(
                "No usable token in {}. Authorize the application first.",
                cache.path()
            ),
        }
    }
}
