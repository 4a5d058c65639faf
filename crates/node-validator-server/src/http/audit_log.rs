// SPDX-License-Identifier: Apache-2.0

use super::AppState;
use crate::instances::InstanceRef;
use crate::retry::retry_async;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use node_validator_core::{
    Instance, ValidationOutcome, ValidatorError, LABEL_CAST_CLUSTER_ID, LABEL_CLUSTER_NAME,
};
use serde::Deserialize;
use tracing::{debug, error, info, info_span, Instrument};

pub const COMPUTE_SERVICE_NAME: &str = "compute.googleapis.com";
pub const INSTANCE_INSERT_METHOD: &str = "v1.compute.instances.insert";
pub const AUTOPILOT_INSTANCE_PREFIX: &str = "gk3-";

const OK: (StatusCode, &str) = (StatusCode::OK, "OK");
const INVALID_REQUEST: (StatusCode, &str) = (StatusCode::BAD_REQUEST, "Invalid request");

/// The subset of a Cloud Audit Log entry the webhook reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    #[serde(default)]
    pub proto_payload: ProtoPayload,
    #[serde(default)]
    pub resource: MonitoredResource,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtoPayload {
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub method_name: String,
    #[serde(default)]
    pub resource_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitoredResource {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub labels: ResourceLabels,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceLabels {
    #[serde(default)]
    pub project_id: String,
}

impl AuditLogEntry {
    #[must_use]
    pub fn is_instance_insert(&self) -> bool {
        self.proto_payload.service_name == COMPUTE_SERVICE_NAME
            && self.proto_payload.method_name == INSTANCE_INSERT_METHOD
    }

    /// `projects/{p}/zones/{z}/instances/{n}`; the project is taken from the resource
    /// labels rather than the path.
    #[must_use]
    pub fn instance_ref(&self) -> Option<InstanceRef> {
        let parts: Vec<&str> = self.proto_payload.resource_name.split('/').collect();
        if parts.len() != 6 {
            return None;
        }
        Some(InstanceRef {
            project: self.resource.labels.project_id.clone(),
            zone: parts[3].to_string(),
            name: parts[5].to_string(),
        })
    }
}

pub(crate) async fn audit_log_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    debug!(payload = %String::from_utf8_lossy(&body), "received audit log");
    let entry: AuditLogEntry = match serde_json::from_slice(&body) {
        Ok(entry) => entry,
        Err(e) => {
            error!(error = %e, "failed to decode audit log payload");
            return INVALID_REQUEST;
        }
    };
    if !entry.is_instance_insert() {
        return OK;
    }

    let span = info_span!("instance_insert", resource_name = %entry.proto_payload.resource_name);
    async move {
        let Some(target) = entry.instance_ref() else {
            error!("failed to get instance request from resource name");
            return INVALID_REQUEST;
        };
        process_insert(&state, &target).await;
        info!("request processed");
        OK
    }
    .instrument(span)
    .await
}

async fn process_insert(state: &AppState, target: &InstanceRef) {
    // Autopilot control plane events arrive from Google-owned projects.
    if target.project != state.policy.project_id {
        debug!(project = %target.project, "event from another project, ignored");
        return;
    }
    if target.name.starts_with(AUTOPILOT_INSTANCE_PREFIX) {
        debug!(instance_name = %target.name, "autopilot node, ignored");
        return;
    }

    let instance = match retry_async(&state.retry, "get instance", || {
        state.instances.get_instance(target)
    })
    .await
    {
        Ok(instance) => instance,
        Err(e) => {
            error!(error = %e, "failed to get instance");
            return;
        }
    };

    if !state.policy.considers(&instance) {
        return;
    }

    let outcome = validate_with_timeout(state, &instance).await;
    let cluster_name = instance.label(LABEL_CLUSTER_NAME).unwrap_or_default();
    let cast_cluster_id = instance.label(LABEL_CAST_CLUSTER_ID).unwrap_or_default();
    match &outcome {
        ValidationOutcome::Valid => info!(
            instance_name = %instance.name,
            cluster_name,
            cast_cluster_id,
            "instance is valid"
        ),
        ValidationOutcome::Invalid(failure) => error!(
            instance_name = %instance.name,
            instance_self_link = %instance.self_link,
            cluster_name,
            cast_cluster_id,
            field = %failure.field,
            unknown_commands = %failure.unknown_commands,
            "instance validation failed"
        ),
        ValidationOutcome::Error(e) => error!(
            instance_name = %instance.name,
            instance_self_link = %instance.self_link,
            cluster_name,
            cast_cluster_id,
            error = %e,
            "failed to validate instance, skipping instance"
        ),
    }

    if outcome.permits_deletion() && state.policy.delete_invalid {
        match state.instances.delete_instance(target).await {
            Ok(()) => info!(instance_name = %target.name, "instance deleted"),
            Err(e) => error!(instance_name = %target.name, error = %e, "failed to delete instance"),
        }
    }
}

async fn validate_with_timeout(state: &AppState, instance: &Instance) -> ValidationOutcome {
    let budget = state.policy.validation_timeout;
    match tokio::time::timeout(budget, state.validator.validate(instance)).await {
        Ok(result) => ValidationOutcome::from(result),
        Err(_) => ValidationOutcome::Error(ValidatorError::upstream(
            "validator",
            format!("validation timed out after {}ms", budget.as_millis()),
        )),
    }
}
