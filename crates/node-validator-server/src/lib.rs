// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

pub mod config;
pub mod gcp;
pub mod http;
pub mod instances;
pub mod retry;
pub mod telemetry;

pub const CRATE_NAME: &str = "node-validator-server";

pub use config::{validate_startup_config, ConfigError, ServerConfig};
pub use gcp::GcpRestClient;
pub use http::{build_router, AppState, AuditLogEntry, WebhookPolicy};
pub use instances::{InstanceApi, InstanceRef};
pub use retry::{retry_async, RetryPolicy};
pub use telemetry::init_tracing;
