// SPDX-License-Identifier: Apache-2.0

use crate::error::ValidatorError;
use crate::instance::Instance;
use async_trait::async_trait;

/// A source of known-good script fragments.
///
/// Implementations either return every fragment they know about or fail; a partial
/// list would make legitimate scripts look tampered with.
#[async_trait]
pub trait WhitelistProvider: Send + Sync + 'static {
    fn provider_tag(&self) -> &'static str;

    async fn get_whitelist(&self, instance: &Instance) -> Result<Vec<String>, ValidatorError>;
}

/// Fixed fragments, mostly useful for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct StaticWhitelist {
    fragments: Vec<String>,
}

impl StaticWhitelist {
    #[must_use]
    pub fn new<S: Into<String>>(fragments: impl IntoIterator<Item = S>) -> Self {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl WhitelistProvider for StaticWhitelist {
    fn provider_tag(&self) -> &'static str {
        "static"
    }

    async fn get_whitelist(&self, _instance: &Instance) -> Result<Vec<String>, ValidatorError> {
        Ok(self.fragments.clone())
    }
}
