// SPDX-License-Identifier: Apache-2.0

//! Redaction of per-node secrets before a script is compared with the whitelist.
//!
//! Rules run in registration order and each sees the output of the previous one. The
//! built-in rules mask values that legitimately differ between nodes (API keys, cluster
//! and node ids, per-node log URLs) so that a static whitelist can carry the masked form.
//!
//! The quoted-value rules are greedy: on a single line they consume everything up to the
//! last `"`, including any commands placed between two quoted values.

use regex::{NoExpand, Regex};
use std::sync::LazyLock;

const BUILTIN_RULE_SPECS: &[(&str, &str)] = &[
    (r#"CASTAI_API_KEY=".+""#, "CASTAI_API_KEY=****"),
    (r#"CASTAI_CLUSTER_ID=".+""#, "CASTAI_CLUSTER_ID=****"),
    (r#"CASTAI_NODE_ID=".+""#, "CASTAI_NODE_ID=****"),
    (r#"-H "X-Api-Key: .+?""#, r#"-H "X-Api-Key: ****""#),
    (
        r"https://.+?/v1/kubernetes/external-clusters/.+?/nodes/.+?/logs",
        "https://****/v1/kubernetes/external-clusters/****/nodes/****/logs",
    ),
];

static BUILTIN_RULES: LazyLock<Vec<RedactionRule>> = LazyLock::new(|| {
    BUILTIN_RULE_SPECS
        .iter()
        .map(|(pattern, replacement)| {
            RedactionRule::new(pattern, *replacement).expect("builtin redaction pattern")
        })
        .collect()
});

/// A single global pattern replacement. The replacement is inserted literally.
#[derive(Debug, Clone)]
pub struct RedactionRule {
    pattern: Regex,
    replacement: String,
}

impl RedactionRule {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    #[must_use]
    pub fn apply(&self, script: &str) -> String {
        self.pattern
            .replace_all(script, NoExpand(&self.replacement))
            .into_owned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreprocessorChain {
    rules: Vec<RedactionRule>,
}

impl PreprocessorChain {
    /// Chain with no rules; `apply` returns its input unchanged.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builtin() -> Self {
        Self {
            rules: BUILTIN_RULES.clone(),
        }
    }

    #[must_use]
    pub fn with_rule(mut self, rule: RedactionRule) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn rules(&self) -> &[RedactionRule] {
        &self.rules
    }

    #[must_use]
    pub fn apply(&self, script: &str) -> String {
        self.rules
            .iter()
            .fold(script.to_string(), |acc, rule| rule.apply(&acc))
    }
}
