// SPDX-License-Identifier: Apache-2.0

use crate::error::{StepExt, ValidatorError};
use crate::instance::{Instance, METADATA_CONFIGURE_SH_KEY, METADATA_USER_DATA_KEY};
use crate::preprocess::PreprocessorChain;
use crate::whitelist::WhitelistProvider;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptField {
    ConfigureSh,
    UserData,
}

impl ScriptField {
    /// Check order used by the validator.
    pub const ALL: [ScriptField; 2] = [ScriptField::ConfigureSh, ScriptField::UserData];

    #[must_use]
    pub const fn metadata_key(self) -> &'static str {
        match self {
            Self::ConfigureSh => METADATA_CONFIGURE_SH_KEY,
            Self::UserData => METADATA_USER_DATA_KEY,
        }
    }
}

impl fmt::Display for ScriptField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metadata_key())
    }
}

/// Content in a boot script that no whitelist fragment accounts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub field: ScriptField,
    pub unknown_commands: String,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed: unknown commands in {}", self.field)
    }
}

impl std::error::Error for ValidationFailure {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(ValidationFailure),
}

impl Verdict {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

pub struct InstanceValidator {
    providers: Vec<Arc<dyn WhitelistProvider>>,
    preprocessor: PreprocessorChain,
    redact_user_data: bool,
}

impl InstanceValidator {
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn WhitelistProvider>>) -> Self {
        Self {
            providers,
            preprocessor: PreprocessorChain::builtin(),
            redact_user_data: false,
        }
    }

    #[must_use]
    pub fn with_preprocessor(mut self, preprocessor: PreprocessorChain) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// `configure-sh` is always redacted; `user-data` only when enabled here.
    #[must_use]
    pub fn with_user_data_redaction(mut self, enabled: bool) -> Self {
        self.redact_user_data = enabled;
        self
    }

    #[must_use]
    pub fn redacts(&self, field: ScriptField) -> bool {
        match field {
            ScriptField::ConfigureSh => true,
            ScriptField::UserData => self.redact_user_data,
        }
    }

    /// Judge an instance's boot scripts.
    ///
    /// `Err` means the check could not be carried out and says nothing about the
    /// instance. `Ok(Verdict::Invalid(..))` carries the residue of the first script
    /// that failed.
    #[instrument(name = "validate_instance", skip_all, fields(instance = %instance.name))]
    pub async fn validate(&self, instance: &Instance) -> Result<Verdict, ValidatorError> {
        let whitelist = self.collect_whitelist(instance).await?;
        debug!(fragments = whitelist.len(), "whitelist assembled");

        for field in ScriptField::ALL {
            let script = instance
                .metadata
                .require(field.metadata_key())
                .step("read instance metadata")?;
            let script = if self.redacts(field) {
                self.preprocessor.apply(script)
            } else {
                script.to_string()
            };
            let residue = strip_whitelist(&script, &whitelist);
            if !residue.trim().is_empty() {
                return Ok(Verdict::Invalid(ValidationFailure {
                    field,
                    unknown_commands: residue,
                }));
            }
        }
        Ok(Verdict::Valid)
    }

    async fn collect_whitelist(&self, instance: &Instance) -> Result<Vec<String>, ValidatorError> {
        let mut whitelist = Vec::new();
        for provider in &self.providers {
            let fragments = provider
                .get_whitelist(instance)
                .await
                .step("get whitelist")?;
            debug!(
                provider = provider.provider_tag(),
                fragments = fragments.len(),
                "whitelist provider answered"
            );
            whitelist.extend(fragments);
        }
        Ok(whitelist)
    }
}

/// Remove every occurrence of every fragment, in order.
///
/// A fragment that is itself contained in a later, longer fragment can break that
/// longer fragment apart before it is matched and leave part of it behind.
#[must_use]
pub fn strip_whitelist(script: &str, whitelist: &[String]) -> String {
    whitelist
        .iter()
        .filter(|fragment| !fragment.is_empty())
        .fold(script.to_string(), |acc, fragment| {
            acc.replace(fragment.as_str(), "")
        })
}
