// SPDX-License-Identifier: Apache-2.0

use crate::error::ValidatorError;
use crate::validate::{ValidationFailure, Verdict};

/// Flattened result of one validation, as consumed by the webhook.
#[derive(Debug)]
pub enum ValidationOutcome {
    Valid,
    Invalid(ValidationFailure),
    Error(ValidatorError),
}

impl ValidationOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid(_) => "invalid",
            Self::Error(_) => "error",
        }
    }

    /// Only a found residue justifies destructive action. An instance that could not
    /// be checked is left alone.
    #[must_use]
    pub fn permits_deletion(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    #[must_use]
    pub fn residue(&self) -> Option<&str> {
        match self {
            Self::Invalid(failure) => Some(failure.unknown_commands.as_str()),
            _ => None,
        }
    }
}

impl From<Result<Verdict, ValidatorError>> for ValidationOutcome {
    fn from(result: Result<Verdict, ValidatorError>) -> Self {
        match result {
            Ok(Verdict::Valid) => Self::Valid,
            Ok(Verdict::Invalid(failure)) => Self::Invalid(failure),
            Err(err) => Self::Error(err),
        }
    }
}
