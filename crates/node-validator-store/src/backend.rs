// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use node_validator_core::ValidatorError;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreErrorCode {
    NotFound,
    Network,
    Validation,
    Auth,
}

impl StoreErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Network => "network_error",
            Self::Validation => "validation_error",
            Self::Auth => "auth_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub code: StoreErrorCode,
    pub message: String,
}

impl StoreError {
    #[must_use]
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for ValidatorError {
    fn from(err: StoreError) -> Self {
        ValidatorError::upstream("cloud_storage", err.to_string())
    }
}

/// Listing entry for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAttrs {
    pub name: String,
    pub size: u64,
    /// Base64 MD5 digest as reported by the store. Composite objects have none.
    pub md5_hash: Option<String>,
    pub crc32c: Option<String>,
}

impl ObjectAttrs {
    /// Content checksum used for cache keys; prefers MD5 and falls back to CRC32C.
    #[must_use]
    pub fn checksum(&self) -> Option<&str> {
        self.md5_hash.as_deref().or(self.crc32c.as_deref())
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    fn backend_tag(&self) -> &'static str;

    async fn list_objects(&self, bucket: &str, prefix: &str)
        -> Result<Vec<ObjectAttrs>, StoreError>;

    async fn read_object(&self, bucket: &str, name: &str) -> Result<Vec<u8>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_become_retryable_upstream_failures() {
        let err: ValidatorError =
            StoreError::new(StoreErrorCode::Network, "connection reset").into();
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "cloud_storage request failed: network_error: connection reset"
        );
    }

    #[test]
    fn checksum_prefers_md5() {
        let mut attrs = ObjectAttrs {
            name: "a.sh".to_string(),
            size: 3,
            md5_hash: Some("bWQ1".to_string()),
            crc32c: Some("Y3Jj".to_string()),
        };
        assert_eq!(attrs.checksum(), Some("bWQ1"));
        attrs.md5_hash = None;
        assert_eq!(attrs.checksum(), Some("Y3Jj"));
    }
}
