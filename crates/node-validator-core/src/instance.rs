// SPDX-License-Identifier: Apache-2.0

use crate::error::ValidatorError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

pub const METADATA_CONFIGURE_SH_KEY: &str = "configure-sh";
pub const METADATA_USER_DATA_KEY: &str = "user-data";

pub const LABEL_CLUSTER_NAME: &str = "goog-k8s-cluster-name";
pub const LABEL_NODE_POOL_NAME: &str = "goog-k8s-node-pool-name";
pub const LABEL_CAST_MANAGED_BY: &str = "cast-managed-by";
pub const LABEL_CAST_CLUSTER_ID: &str = "cast-cluster-id";

static INSTANCE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://(?:www|compute)\.googleapis\.com/compute/v1/projects/(.+?)/zones/(.+?)/instances/(.+)")
        .expect("instance self link pattern")
});

static INSTANCE_GROUP_MANAGER_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://(?:www|compute)\.googleapis\.com/compute/v1/projects/(.+?)/zones/(.+?)/instanceGroupManagers/(.+)")
        .expect("instance group manager self link pattern")
});

static REGION_TEMPLATE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://(?:www|compute)\.googleapis\.com/compute/v1/projects/(.+?)/regions/(.+?)/instanceTemplates/(.+)")
        .expect("regional instance template self link pattern")
});

static GLOBAL_TEMPLATE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://(?:www|compute)\.googleapis\.com/compute/v1/projects/(.+?)/global/instanceTemplates/(.+)")
        .expect("global instance template self link pattern")
});

/// Snapshot of a compute instance as returned by the Compute API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub self_link: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Instance {
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn require_label(&self, key: &str) -> Result<&str, ValidatorError> {
        self.label(key)
            .ok_or_else(|| ValidatorError::not_found(format!("label `{key}`")))
    }

    pub fn zonal_link(&self) -> Result<ZonalResource, ValidatorError> {
        ZonalResource::parse_instance_link(&self.self_link)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl Metadata {
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            items: pairs
                .into_iter()
                .map(|(key, value)| MetadataItem {
                    key: key.into(),
                    value: value.into(),
                })
                .collect(),
        }
    }

    /// First value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.value.as_str())
    }

    pub fn require(&self, key: &str) -> Result<&str, ValidatorError> {
        self.get(key)
            .ok_or_else(|| ValidatorError::not_found(format!("metadata key `{key}`")))
    }
}

/// A project/zone/name triple parsed out of a zonal resource link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZonalResource {
    pub project: String,
    pub zone: String,
    pub name: String,
}

impl ZonalResource {
    pub fn parse_instance_link(link: &str) -> Result<Self, ValidatorError> {
        Self::parse_with(&INSTANCE_LINK_RE, link, "instance self link")
    }

    pub fn parse_instance_group_manager_link(link: &str) -> Result<Self, ValidatorError> {
        Self::parse_with(
            &INSTANCE_GROUP_MANAGER_LINK_RE,
            link,
            "instance group manager self link",
        )
    }

    fn parse_with(re: &Regex, link: &str, what: &'static str) -> Result<Self, ValidatorError> {
        let caps = re
            .captures(link)
            .ok_or_else(|| ValidatorError::malformed(what, link))?;
        Ok(Self {
            project: caps[1].to_string(),
            zone: caps[2].to_string(),
            name: caps[3].to_string(),
        })
    }

    /// Region the zone belongs to, e.g. `europe-west1` for `europe-west1-b`.
    pub fn location(&self) -> Result<String, ValidatorError> {
        location_from_zone(&self.zone)
    }
}

impl fmt::Display for ZonalResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.zone, self.name)
    }
}

/// Zone names end in `-<letter>`; dropping those two characters yields the region.
pub fn location_from_zone(zone: &str) -> Result<String, ValidatorError> {
    if zone.len() <= 2 || !zone.is_ascii() {
        return Err(ValidatorError::malformed("zone", zone));
    }
    Ok(zone[..zone.len() - 2].to_string())
}

/// Reference to the instance template a group manager creates instances from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateRef {
    Regional {
        project: String,
        region: String,
        name: String,
    },
    Global {
        project: String,
        name: String,
    },
}

impl TemplateRef {
    pub fn parse(link: &str) -> Result<Self, ValidatorError> {
        if let Some(caps) = REGION_TEMPLATE_LINK_RE.captures(link) {
            return Ok(Self::Regional {
                project: caps[1].to_string(),
                region: caps[2].to_string(),
                name: caps[3].to_string(),
            });
        }
        if let Some(caps) = GLOBAL_TEMPLATE_LINK_RE.captures(link) {
            return Ok(Self::Global {
                project: caps[1].to_string(),
                name: caps[2].to_string(),
            });
        }
        Err(ValidatorError::malformed("instance template self link", link))
    }

    /// API path below `compute/v1/`.
    #[must_use]
    pub fn resource_path(&self) -> String {
        match self {
            Self::Regional {
                project,
                region,
                name,
            } => format!("projects/{project}/regions/{region}/instanceTemplates/{name}"),
            Self::Global { project, name } => {
                format!("projects/{project}/global/instanceTemplates/{name}")
            }
        }
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resource_path())
    }
}
