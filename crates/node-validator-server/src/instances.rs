// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use node_validator_core::{Instance, ValidatorError};
use std::fmt;

/// Identity of one compute instance as named in an audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceRef {
    pub project: String,
    pub zone: String,
    pub name: String,
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/zones/{}/instances/{}",
            self.project, self.zone, self.name
        )
    }
}

#[async_trait]
pub trait InstanceApi: Send + Sync + 'static {
    async fn get_instance(&self, instance: &InstanceRef) -> Result<Instance, ValidatorError>;

    async fn delete_instance(&self, instance: &InstanceRef) -> Result<(), ValidatorError>;
}
