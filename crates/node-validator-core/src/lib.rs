// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Validation engine for the boot scripts of managed node pool instances.
//!
//! An [`InstanceValidator`] gathers known-good fragments from its
//! [`WhitelistProvider`]s, redacts per-node secrets from the instance's `configure-sh`
//! and strips every fragment from both scripts. Anything left over is reported as a
//! [`ValidationFailure`].

pub mod error;
pub mod instance;
pub mod outcome;
pub mod preprocess;
pub mod template;
pub mod validate;
pub mod whitelist;

pub const CRATE_NAME: &str = "node-validator-core";

pub use error::{StepExt, ValidatorError};
pub use instance::{
    location_from_zone, Instance, Metadata, MetadataItem, TemplateRef, ZonalResource,
    LABEL_CAST_CLUSTER_ID, LABEL_CAST_MANAGED_BY, LABEL_CLUSTER_NAME, LABEL_NODE_POOL_NAME,
    METADATA_CONFIGURE_SH_KEY, METADATA_USER_DATA_KEY,
};
pub use outcome::ValidationOutcome;
pub use preprocess::{PreprocessorChain, RedactionRule};
pub use template::{
    ClusterLookup, ComputeLookup, InstanceGroupManager, InstanceProperties, InstanceTemplate,
    InstanceTemplateWhitelistProvider, NodePool, NodePoolName,
};
pub use validate::{strip_whitelist, InstanceValidator, ScriptField, ValidationFailure, Verdict};
pub use whitelist::{StaticWhitelist, WhitelistProvider};
