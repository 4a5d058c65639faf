// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Failure to run a validation at all.
///
/// None of these variants say anything about whether the instance is tampered with;
/// that verdict is carried by [`crate::Verdict::Invalid`] instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ValidatorError {
    /// A required label, metadata key or resource reference is absent.
    #[error("{0} not found")]
    NotFound(String),

    /// A resource reference could not be parsed.
    #[error("malformed {what}: {value:?}")]
    Malformed {
        /// Kind of reference being parsed.
        what: &'static str,
        /// The offending value.
        value: String,
    },

    /// A call to the object store, cluster or compute API failed.
    #[error("{service} request failed: {message}")]
    Upstream {
        /// Backend tag of the failing service.
        service: &'static str,
        /// Human-readable reason.
        message: String,
    },

    /// A lower-level error wrapped with the resolution step that produced it.
    #[error("failed to {step}: {source}")]
    Step {
        /// Name of the step, phrased as an action.
        step: &'static str,
        /// Underlying cause.
        #[source]
        source: Box<ValidatorError>,
    },
}

impl ValidatorError {
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    #[must_use]
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn malformed(what: &'static str, value: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn in_step(self, step: &'static str) -> Self {
        Self::Step {
            step,
            source: Box::new(self),
        }
    }

    /// Innermost error below any step wrappers.
    #[must_use]
    pub fn root(&self) -> &ValidatorError {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Upstream failures may succeed on a later attempt; missing or malformed
    /// configuration will not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), Self::Upstream { .. })
    }

    /// Step names from the outermost wrapper inwards.
    #[must_use]
    pub fn steps(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        let mut cur = self;
        while let Self::Step { step, source } = cur {
            out.push(*step);
            cur = source;
        }
        out
    }
}

pub trait StepExt<T> {
    fn step(self, step: &'static str) -> Result<T, ValidatorError>;
}

impl<T> StepExt<T> for Result<T, ValidatorError> {
    fn step(self, step: &'static str) -> Result<T, ValidatorError> {
        self.map_err(|e| e.in_step(step))
    }
}
