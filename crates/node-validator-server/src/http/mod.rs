// SPDX-License-Identifier: Apache-2.0

mod audit_log;

pub use audit_log::{
    AuditLogEntry, MonitoredResource, ProtoPayload, ResourceLabels, AUTOPILOT_INSTANCE_PREFIX,
    COMPUTE_SERVICE_NAME, INSTANCE_INSERT_METHOD,
};

use crate::config::ServerConfig;
use crate::instances::InstanceApi;
use crate::retry::RetryPolicy;
use axum::routing::{get, post};
use axum::Router;
use node_validator_core::{Instance, InstanceValidator, LABEL_CAST_CLUSTER_ID, LABEL_CAST_MANAGED_BY};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Which instances the webhook acts on, and how.
#[derive(Debug, Clone)]
pub struct WebhookPolicy {
    pub project_id: String,
    pub cluster_ids: Vec<String>,
    pub delete_invalid: bool,
    pub validation_timeout: Duration,
}

impl WebhookPolicy {
    #[must_use]
    pub fn from_config(cfg: &ServerConfig) -> Self {
        Self {
            project_id: cfg.project_id.clone(),
            cluster_ids: cfg.cluster_ids.clone(),
            delete_invalid: cfg.delete_invalid,
            validation_timeout: cfg.validation_timeout,
        }
    }

    /// Only CAST-managed instances are validated, optionally narrowed to a set of
    /// cluster ids.
    #[must_use]
    pub fn considers(&self, instance: &Instance) -> bool {
        if instance.label(LABEL_CAST_MANAGED_BY).is_none() {
            info!(instance_name = %instance.name, "instance is not managed by CAST, skip instance");
            return false;
        }
        if self.cluster_ids.is_empty() {
            return true;
        }
        match instance.label(LABEL_CAST_CLUSTER_ID) {
            None => {
                info!(instance_name = %instance.name, "missing CAST cluster id, skip instance");
                false
            }
            Some(id) if !self.cluster_ids.iter().any(|c| c == id) => {
                info!(
                    instance_name = %instance.name,
                    cast_cluster_id = id,
                    "instance not part of monitored clusters, skip instance"
                );
                false
            }
            Some(_) => true,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub(crate) policy: Arc<WebhookPolicy>,
    pub(crate) validator: Arc<InstanceValidator>,
    pub(crate) instances: Arc<dyn InstanceApi>,
    pub(crate) retry: RetryPolicy,
}

impl AppState {
    #[must_use]
    pub fn new(
        policy: WebhookPolicy,
        validator: InstanceValidator,
        instances: Arc<dyn InstanceApi>,
    ) -> Self {
        Self {
            policy: Arc::new(policy),
            validator: Arc::new(validator),
            instances,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

async fn healthz_handler() -> &'static str {
    "ok"
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(audit_log::audit_log_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(state)
}
