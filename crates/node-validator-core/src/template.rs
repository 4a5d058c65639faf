// SPDX-License-Identifier: Apache-2.0

//! Whitelist derived from the instance template the node pool currently creates
//! nodes from.
//!
//! Resolution walks node pool → instance group manager → instance template, so a
//! template rollout is picked up on the next validation without redeploying anything.

use crate::error::{StepExt, ValidatorError};
use crate::instance::{
    Instance, Metadata, TemplateRef, ZonalResource, LABEL_CLUSTER_NAME, LABEL_NODE_POOL_NAME,
    METADATA_CONFIGURE_SH_KEY, METADATA_USER_DATA_KEY,
};
use crate::whitelist::WhitelistProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePool {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub instance_group_urls: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupManager {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub instance_template: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTemplate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub properties: InstanceProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceProperties {
    #[serde(default)]
    pub metadata: Metadata,
}

/// Fully qualified GKE node pool name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodePoolName {
    pub project: String,
    pub location: String,
    pub cluster: String,
    pub node_pool: String,
}

impl fmt::Display for NodePoolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/clusters/{}/nodePools/{}",
            self.project, self.location, self.cluster, self.node_pool
        )
    }
}

#[async_trait]
pub trait ClusterLookup: Send + Sync + 'static {
    async fn get_node_pool(&self, name: &NodePoolName) -> Result<NodePool, ValidatorError>;
}

#[async_trait]
pub trait ComputeLookup: Send + Sync + 'static {
    async fn get_instance_group_manager(
        &self,
        manager: &ZonalResource,
    ) -> Result<InstanceGroupManager, ValidatorError>;

    async fn get_instance_template(
        &self,
        template: &TemplateRef,
    ) -> Result<InstanceTemplate, ValidatorError>;
}

pub struct InstanceTemplateWhitelistProvider {
    clusters: Arc<dyn ClusterLookup>,
    compute: Arc<dyn ComputeLookup>,
}

impl InstanceTemplateWhitelistProvider {
    #[must_use]
    pub fn new(clusters: Arc<dyn ClusterLookup>, compute: Arc<dyn ComputeLookup>) -> Self {
        Self { clusters, compute }
    }

    #[instrument(name = "resolve_instance_template", skip_all, fields(instance = %instance.name))]
    async fn resolve_template(&self, instance: &Instance) -> Result<InstanceTemplate, ValidatorError> {
        let cluster = instance
            .require_label(LABEL_CLUSTER_NAME)
            .step("read cluster name")?;
        let node_pool = instance
            .require_label(LABEL_NODE_POOL_NAME)
            .step("read node pool name")?;

        let link = instance.zonal_link().step("parse instance self link")?;
        let location = link.location().step("derive location from zone")?;

        let pool_name = NodePoolName {
            project: link.project.clone(),
            location,
            cluster: cluster.to_string(),
            node_pool: node_pool.to_string(),
        };
        let pool = self
            .clusters
            .get_node_pool(&pool_name)
            .await
            .step("get node pool")?;

        let manager_ref = find_instance_group_for_zone(&pool.instance_group_urls, &link.zone)
            .step("find instance group for zone")?;
        debug!(manager = %manager_ref, "instance group manager selected");

        let manager = self
            .compute
            .get_instance_group_manager(&manager_ref)
            .await
            .step("get instance group manager")?;
        let template_ref =
            TemplateRef::parse(&manager.instance_template).step("parse instance template link")?;

        self.compute
            .get_instance_template(&template_ref)
            .await
            .step("get instance template")
    }
}

#[async_trait]
impl WhitelistProvider for InstanceTemplateWhitelistProvider {
    fn provider_tag(&self) -> &'static str {
        "instance_template"
    }

    async fn get_whitelist(&self, instance: &Instance) -> Result<Vec<String>, ValidatorError> {
        let template = self
            .resolve_template(instance)
            .await
            .step("resolve instance template")?;
        let metadata = &template.properties.metadata;
        let configure_sh = metadata
            .require(METADATA_CONFIGURE_SH_KEY)
            .step("read configure-sh from instance template")?;
        let user_data = metadata
            .require(METADATA_USER_DATA_KEY)
            .step("read user-data from instance template")?;
        Ok(vec![configure_sh.to_string(), user_data.to_string()])
    }
}

/// Pick the group manager URL that lives in `zone`. Any unparsable URL fails the
/// lookup rather than being skipped.
pub fn find_instance_group_for_zone(
    urls: &[String],
    zone: &str,
) -> Result<ZonalResource, ValidatorError> {
    for url in urls {
        let parsed = ZonalResource::parse_instance_group_manager_link(url)?;
        if parsed.zone == zone {
            return Ok(parsed);
        }
    }
    Err(ValidatorError::not_found(format!(
        "instance group manager for zone `{zone}`"
    )))
}
