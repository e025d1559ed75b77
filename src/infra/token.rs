//! Expiring access tokens for collaborators that authenticate with OAuth.
//!
//! A [`TokenProvider`] owns the cached token and is handed to whichever
//! client needs it; the clock is injected so expiry is testable.

use std::{future::Future, sync::Arc};

use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::util::version::user_agent;

/// Tokens are refreshed this long before they actually expire.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::seconds(60);

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> OffsetDateTime {
        (**self).now()
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// A freshly issued token; `expires_in` is in seconds.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: u64,
}

pub trait TokenSource: Send + Sync {
    fn request_token(&self) -> impl Future<Output = Result<IssuedToken, TokenError>> + Send;
}

struct CachedToken {
    value: String,
    expires_at: OffsetDateTime,
}

pub struct TokenProvider<S, C = SystemClock> {
    source: S,
    clock: C,
    refresh_margin: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl<S: TokenSource> TokenProvider<S, SystemClock> {
    pub fn with_system_clock(source: S) -> Self {
        Self::new(source, SystemClock)
    }
}

impl<S: TokenSource, C: Clock> TokenProvider<S, C> {
    pub fn new(source: S, clock: C) -> Self {
        Self {
            source,
            clock,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            cached: Mutex::new(None),
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Returns the cached token, refreshing it first when it is missing or
    /// about to expire. Concurrent callers share one refresh.
    pub async fn access_token(&self) -> Result<String, TokenError> {
        let mut cached = self.cached.lock().await;
        let now = self.clock.now();
        if let Some(token) = cached.as_ref() {
            if now + self.refresh_margin < token.expires_at {
                return Ok(token.value.clone());
            }
            debug!("access token expiring; refreshing");
        }

        let issued = self.source.request_token().await?;
        let lifetime = Duration::seconds(i64::try_from(issued.expires_in).unwrap_or(i64::MAX / 2));
        let expires_at = now.saturating_add(lifetime);
        info!(expires_in = issued.expires_in, "obtained access token");
        *cached = Some(CachedToken {
            value: issued.access_token.clone(),
            expires_at,
        });
        Ok(issued.access_token)
    }

    /// Drops the cached token, e.g. after the remote side reported it invalid.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

/// OAuth client-credentials grant against a token endpoint.
pub struct ClientCredentialsSource {
    http: Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl ClientCredentialsSource {
    pub fn new(
        token_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Result<Self, TokenError> {
        Ok(Self {
            http: Client::builder().user_agent(user_agent()).build()?,
            token_url: Url::parse(token_url)?,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
        })
    }
}

impl TokenSource for ClientCredentialsSource {
    async fn request_token(&self) -> Result<IssuedToken, TokenError> {
        let response = self
            .http
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<IssuedToken>().await?)
    }
}
