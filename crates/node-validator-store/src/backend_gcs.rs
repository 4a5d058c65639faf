// SPDX-License-Identifier: Apache-2.0

use crate::auth::TokenSource;
use crate::backend::{ObjectAttrs, ObjectStore, StoreError, StoreErrorCode};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub const DEFAULT_STORAGE_BASE_URL: &str = "https://storage.googleapis.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListItem {
    name: String,
    /// The JSON API encodes sizes as decimal strings.
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    md5_hash: Option<String>,
    #[serde(default)]
    crc32c: Option<String>,
}

impl TryFrom<ListItem> for ObjectAttrs {
    type Error = StoreError;

    fn try_from(item: ListItem) -> Result<Self, Self::Error> {
        let size = match item.size.as_deref() {
            None => 0,
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                StoreError::new(
                    StoreErrorCode::Validation,
                    format!("object {} has invalid size {raw:?}: {e}", item.name),
                )
            })?,
        };
        Ok(Self {
            name: item.name,
            size,
            md5_hash: item.md5_hash,
            crc32c: item.crc32c,
        })
    }
}

/// Cloud Storage JSON API backend. Performs no retries of its own.
pub struct GcsObjectStore {
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl GcsObjectStore {
    #[must_use]
    pub fn new(client: reqwest::Client, tokens: Arc<dyn TokenSource>) -> Self {
        Self::with_base_url(client, tokens, DEFAULT_STORAGE_BASE_URL)
    }

    #[must_use]
    pub fn with_base_url(
        client: reqwest::Client,
        tokens: Arc<dyn TokenSource>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            tokens,
        }
    }

    /// Client with the timeout and redirect policy used for every backend call.
    pub fn default_client(timeout: Duration) -> Result<reqwest::Client, StoreError> {
        reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| StoreError::new(StoreErrorCode::Network, format!("http client: {e}")))
    }

    fn objects_url(&self, bucket: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            StoreError::new(StoreErrorCode::Validation, format!("invalid store url: {e}"))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                StoreError::new(StoreErrorCode::Validation, "store url cannot be a base")
            })?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o"]);
        Ok(url)
    }

    fn object_url(&self, bucket: &str, name: &str) -> Result<Url, StoreError> {
        let mut url = self.objects_url(bucket)?;
        url.path_segments_mut()
            .map_err(|()| {
                StoreError::new(StoreErrorCode::Validation, "store url cannot be a base")
            })?
            .push(name);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    async fn auth_headers(&self) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.tokens.token().await? {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                StoreError::new(StoreErrorCode::Auth, format!("invalid auth header: {e}"))
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, StoreError> {
        let headers = self.auth_headers().await?;
        let resp = self
            .client
            .get(url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| StoreError::new(StoreErrorCode::Network, format!("GET {url}: {e}")))?;
        match resp.status() {
            s if s.is_success() => Ok(resp),
            StatusCode::NOT_FOUND => Err(StoreError::new(
                StoreErrorCode::NotFound,
                format!("GET {url}: 404"),
            )),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::new(
                StoreErrorCode::Auth,
                format!("GET {url}: {}", resp.status()),
            )),
            s => Err(StoreError::new(
                StoreErrorCode::Network,
                format!("GET {url}: {s}"),
            )),
        }
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    fn backend_tag(&self) -> &'static str {
        "gcs"
    }

    #[instrument(name = "gcs_list_objects", skip(self))]
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectAttrs>, StoreError> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.objects_url(bucket)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }
            let page: ListResponse = self.get(url).await?.json().await.map_err(|e| {
                StoreError::new(StoreErrorCode::Validation, format!("listing parse failed: {e}"))
            })?;
            for item in page.items {
                out.push(ObjectAttrs::try_from(item)?);
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => return Ok(out),
            }
        }
    }

    #[instrument(name = "gcs_read_object", skip(self))]
    async fn read_object(&self, bucket: &str, name: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.object_url(bucket, name)?;
        self.get(url)
            .await?
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| StoreError::new(StoreErrorCode::Network, format!("read body failed: {e}")))
    }
}
