// SPDX-License-Identifier: Apache-2.0

//! OAuth bearer tokens for Google REST APIs.

use crate::backend::{StoreError, StoreErrorCode};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

pub const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before the server-reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    /// `None` means requests go out unauthenticated.
    async fn token(&self) -> Result<Option<String>, StoreError>;
}

pub struct Anonymous;

#[async_trait]
impl TokenSource for Anonymous {
    async fn token(&self) -> Result<Option<String>, StoreError> {
        Ok(None)
    }
}

pub struct StaticToken(String);

impl StaticToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<Option<String>, StoreError> {
        Ok(Some(self.0.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Service account token from the GCE metadata server.
pub struct MetadataServerToken {
    url: String,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataServerToken {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_url(client, DEFAULT_METADATA_TOKEN_URL)
    }

    #[must_use]
    pub fn with_url(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client,
            cached: Mutex::new(None),
        }
    }

    #[instrument(name = "metadata_server_token_fetch", skip(self))]
    async fn fetch(&self) -> Result<CachedToken, StoreError> {
        let resp = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| StoreError::new(StoreErrorCode::Auth, format!("token request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(StoreError::new(
                StoreErrorCode::Auth,
                format!("token request failed status={}", resp.status()),
            ));
        }
        let body: MetadataTokenResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::new(StoreErrorCode::Auth, format!("token parse failed: {e}")))?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(EXPIRY_MARGIN);
        debug!(expires_in = body.expires_in, "metadata server token refreshed");
        Ok(CachedToken {
            value: body.access_token,
            refresh_at: Instant::now() + lifetime,
        })
    }
}

#[async_trait]
impl TokenSource for MetadataServerToken {
    async fn token(&self) -> Result<Option<String>, StoreError> {
        if let Some(cached) = self.cached.lock().await.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(Some(cached.value.clone()));
            }
        }
        // Lock released before the request; concurrent refreshes are harmless.
        let fresh = self.fetch().await?;
        let value = fresh.value.clone();
        *self.cached.lock().await = Some(fresh);
        Ok(Some(value))
    }
}
