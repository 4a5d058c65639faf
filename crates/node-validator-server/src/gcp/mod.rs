// SPDX-License-Identifier: Apache-2.0

//! Minimal REST clients for the Compute Engine and GKE APIs.

use crate::instances::{InstanceApi, InstanceRef};
use async_trait::async_trait;
use node_validator_core::{
    ClusterLookup, ComputeLookup, Instance, InstanceGroupManager, InstanceTemplate, NodePool,
    NodePoolName, TemplateRef, ValidatorError, ZonalResource,
};
use node_validator_store::TokenSource;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::instrument;

pub const DEFAULT_COMPUTE_BASE_URL: &str = "https://compute.googleapis.com";
pub const DEFAULT_CONTAINER_BASE_URL: &str = "https://container.googleapis.com";

const COMPUTE: &str = "compute";
const CONTAINER: &str = "container";

pub struct GcpRestClient {
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    compute_base: String,
    container_base: String,
}

impl GcpRestClient {
    #[must_use]
    pub fn new(client: reqwest::Client, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client,
            tokens,
            compute_base: DEFAULT_COMPUTE_BASE_URL.to_string(),
            container_base: DEFAULT_CONTAINER_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_urls(
        mut self,
        compute_base: impl Into<String>,
        container_base: impl Into<String>,
    ) -> Self {
        self.compute_base = compute_base.into().trim_end_matches('/').to_string();
        self.container_base = container_base.into().trim_end_matches('/').to_string();
        self
    }

    fn url(
        &self,
        service: &'static str,
        base: &str,
        segments: &[&str],
    ) -> Result<Url, ValidatorError> {
        let mut url = Url::parse(base)
            .map_err(|e| ValidatorError::upstream(service, format!("invalid base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ValidatorError::upstream(service, "base url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn compute_url(&self, path: &str) -> Result<Url, ValidatorError> {
        let mut segments = vec!["compute", "v1"];
        segments.extend(path.split('/'));
        self.url(COMPUTE, &self.compute_base, &segments)
    }

    fn container_url(&self, path: &str) -> Result<Url, ValidatorError> {
        let mut segments = vec!["v1"];
        segments.extend(path.split('/'));
        self.url(CONTAINER, &self.container_base, &segments)
    }

    async fn auth_headers(&self, service: &'static str) -> Result<HeaderMap, ValidatorError> {
        let mut headers = HeaderMap::new();
        let token = self
            .tokens
            .token()
            .await
            .map_err(|e| ValidatorError::upstream(service, e.to_string()))?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ValidatorError::upstream(service, format!("invalid auth header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn send(
        &self,
        service: &'static str,
        method: Method,
        url: Url,
    ) -> Result<reqwest::Response, ValidatorError> {
        let headers = self.auth_headers(service).await?;
        let resp = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| ValidatorError::upstream(service, format!("{method} {url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(ValidatorError::upstream(
                service,
                format!("{method} {url}: {}", resp.status()),
            ));
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        service: &'static str,
        url: Url,
    ) -> Result<T, ValidatorError> {
        self.send(service, Method::GET, url)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ValidatorError::upstream(service, format!("response parse failed: {e}")))
    }
}

#[async_trait]
impl ClusterLookup for GcpRestClient {
    #[instrument(name = "gke_get_node_pool", skip_all, fields(node_pool = %name))]
    async fn get_node_pool(&self, name: &NodePoolName) -> Result<NodePool, ValidatorError> {
        let url = self.container_url(&name.to_string())?;
        self.get_json(CONTAINER, url).await
    }
}

#[async_trait]
impl ComputeLookup for GcpRestClient {
    #[instrument(name = "compute_get_instance_group_manager", skip_all, fields(manager = %manager))]
    async fn get_instance_group_manager(
        &self,
        manager: &ZonalResource,
    ) -> Result<InstanceGroupManager, ValidatorError> {
        let path = format!(
            "projects/{}/zones/{}/instanceGroupManagers/{}",
            manager.project, manager.zone, manager.name
        );
        let url = self.compute_url(&path)?;
        self.get_json(COMPUTE, url).await
    }

    #[instrument(name = "compute_get_instance_template", skip_all, fields(template = %template))]
    async fn get_instance_template(
        &self,
        template: &TemplateRef,
    ) -> Result<InstanceTemplate, ValidatorError> {
        let url = self.compute_url(&template.resource_path())?;
        self.get_json(COMPUTE, url).await
    }
}

#[async_trait]
impl InstanceApi for GcpRestClient {
    #[instrument(name = "compute_get_instance", skip_all, fields(instance = %instance))]
    async fn get_instance(&self, instance: &InstanceRef) -> Result<Instance, ValidatorError> {
        let url = self.compute_url(&instance.to_string())?;
        self.get_json(COMPUTE, url).await
    }

    #[instrument(name = "compute_delete_instance", skip_all, fields(instance = %instance))]
    async fn delete_instance(&self, instance: &InstanceRef) -> Result<(), ValidatorError> {
        let url = self.compute_url(&instance.to_string())?;
        self.send(COMPUTE, Method::DELETE, url).await.map(|_| ())
    }
}
