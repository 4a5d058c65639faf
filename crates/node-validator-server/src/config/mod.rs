// SPDX-License-Identifier: Apache-2.0

use crate::retry::RetryPolicy;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const ENV_PREFIX: &str = "APP_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid configuration: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub log_level: String,
    pub log_json: bool,
    pub project_id: String,
    pub delete_invalid: bool,
    pub port: u16,
    pub cluster_ids: Vec<String>,
    pub whitelist_bucket: String,
    pub whitelist_prefix: String,
    pub whitelist_cache_ttl: Duration,
    pub redact_user_data: bool,
    pub validation_timeout: Duration,
    pub instance_fetch_attempts: usize,
    pub instance_fetch_backoff: Duration,
    pub instance_fetch_max_elapsed: Duration,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub http_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            log_level: "info".to_string(),
            log_json: true,
            project_id: String::new(),
            delete_invalid: false,
            port: 8080,
            cluster_ids: Vec::new(),
            whitelist_bucket: String::new(),
            whitelist_prefix: String::new(),
            whitelist_cache_ttl: Duration::from_secs(300),
            redact_user_data: false,
            validation_timeout: Duration::from_secs(30),
            instance_fetch_attempts: retry.max_attempts,
            instance_fetch_backoff: retry.backoff,
            instance_fetch_max_elapsed: retry.max_elapsed,
            access_token: None,
            http_timeout: Duration::from_secs(15),
        }
    }
}

fn env_string<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(&format!("{ENV_PREFIX}{name}"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    env_string(lookup, name)
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    env_string(lookup, name)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_duration_ms<F>(lookup: &F, name: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    Duration::from_millis(env_u64(lookup, name, default.as_millis() as u64))
}

fn env_list<F>(lookup: &F, name: &str) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    env_string(lookup, name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads every `APP_*` setting through `lookup`. Unparsable numbers and booleans
    /// fall back to their defaults; only the port is strict.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let port = match env_string(&lookup, "PORT").or_else(|| lookup("PORT")) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError(format!("port {raw:?}: {e}")))?,
            None => d.port,
        };
        Ok(Self {
            log_level: env_string(&lookup, "LOG_LEVEL").unwrap_or(d.log_level),
            log_json: env_bool(&lookup, "LOG_JSON", d.log_json),
            project_id: env_string(&lookup, "PROJECT_ID").unwrap_or_default(),
            delete_invalid: env_bool(&lookup, "DELETE_INVALID", d.delete_invalid),
            port,
            cluster_ids: env_list(&lookup, "CLUSTER_IDS"),
            whitelist_bucket: env_string(&lookup, "WHITELIST_BUCKET").unwrap_or_default(),
            whitelist_prefix: env_string(&lookup, "WHITELIST_PREFIX").unwrap_or_default(),
            whitelist_cache_ttl: Duration::from_secs(env_u64(
                &lookup,
                "WHITELIST_CACHE_TTL_SECS",
                d.whitelist_cache_ttl.as_secs(),
            )),
            redact_user_data: env_bool(&lookup, "REDACT_USER_DATA", d.redact_user_data),
            validation_timeout: env_duration_ms(
                &lookup,
                "VALIDATION_TIMEOUT_MS",
                d.validation_timeout,
            ),
            instance_fetch_attempts: usize::try_from(env_u64(
                &lookup,
                "INSTANCE_FETCH_ATTEMPTS",
                d.instance_fetch_attempts as u64,
            ))
            .unwrap_or(d.instance_fetch_attempts),
            instance_fetch_backoff: env_duration_ms(
                &lookup,
                "INSTANCE_FETCH_BACKOFF_MS",
                d.instance_fetch_backoff,
            ),
            instance_fetch_max_elapsed: env_duration_ms(
                &lookup,
                "INSTANCE_FETCH_MAX_ELAPSED_MS",
                d.instance_fetch_max_elapsed,
            ),
            access_token: env_string(&lookup, "ACCESS_TOKEN"),
            http_timeout: env_duration_ms(&lookup, "HTTP_TIMEOUT_MS", d.http_timeout),
        })
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.instance_fetch_attempts,
            backoff: self.instance_fetch_backoff,
            max_elapsed: self.instance_fetch_max_elapsed,
        }
    }
}

pub fn validate_startup_config(cfg: &ServerConfig) -> Result<(), ConfigError> {
    if cfg.project_id.is_empty() {
        return Err(ConfigError("APP_PROJECT_ID is required".to_string()));
    }
    if cfg.whitelist_bucket.is_empty() {
        return Err(ConfigError("APP_WHITELIST_BUCKET is required".to_string()));
    }
    if cfg.whitelist_cache_ttl.is_zero() {
        return Err(ConfigError("whitelist cache ttl must be > 0".to_string()));
    }
    if cfg.validation_timeout.is_zero() || cfg.http_timeout.is_zero() {
        return Err(ConfigError("timeouts must be > 0".to_string()));
    }
    if cfg.instance_fetch_attempts == 0 {
        return Err(ConfigError("instance fetch attempts must be > 0".to_string()));
    }
    Ok(())
}
