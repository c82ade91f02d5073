// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Removal eligibility rules.
//!
//! Not everything that appears new since the baseline should be removed.
//! System components may create namespaces at any time, so a namespace that
//! came into existence between snapshot and revert is not proof that an
//! operator created it. A [`PolicyRule`] splits a set of names into the ones
//! that may be acted upon and the ones that must be left alone.

use glob::Pattern;
use std::collections::BTreeSet;

/// Classify names as protected or eligible for removal.
///
/// A name is protected if it starts with any protected prefix, equals any
/// protected literal name, or matches any protected glob pattern.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PolicyRule {
    prefixes: Vec<String>,
    names: BTreeSet<String>,
    patterns: Vec<Pattern>,
}

impl PolicyRule {
    /// Rule that protects nothing.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Construct new rule.
    ///
    /// # Errors
    ///
    /// - Return [`PolicyError::Pattern`] if a glob pattern is malformed.
    pub fn new(
        prefixes: impl IntoIterator<Item = impl Into<String>>,
        names: impl IntoIterator<Item = impl Into<String>>,
        patterns: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self> {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                Pattern::new(pattern.as_ref()).map_err(|source| PolicyError::Pattern {
                    source,
                    pattern: pattern.as_ref().to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            names: names.into_iter().map(Into::into).collect(),
            patterns,
        })
    }

    /// Check if name must never be removed.
    pub fn is_protected(&self, name: impl AsRef<str>) -> bool {
        let name = name.as_ref();
        self.names.contains(name)
            || self
                .prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
            || self.patterns.iter().any(|pattern| pattern.matches(name))
    }

    /// Split names into eligible and skipped sets.
    pub fn filter<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> Partition {
        let (skipped, eligible) = names
            .into_iter()
            .cloned()
            .partition::<BTreeSet<_>, _>(|name| self.is_protected(name));

        Partition { eligible, skipped }
    }
}

/// Result of applying a [`PolicyRule`].
///
/// # Invariant
///
/// - `eligible` and `skipped` are disjoint.
/// - Their union is exactly the filtered input.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Partition {
    pub eligible: BTreeSet<String>,
    pub skipped: BTreeSet<String>,
}

/// Policy rule error types.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Protected glob pattern cannot be compiled.
    #[error("invalid protected pattern {pattern:?}")]
    Pattern {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PolicyError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn system_namespaces() -> PolicyRule {
        PolicyRule::new(
            ["openshift-", "kube-"],
            ["default", "openshift"],
            ["*-system"],
        )
        .unwrap()
    }

    #[test_case("openshift-monitoring", true; "protected prefix")]
    #[test_case("kube-node-lease", true; "second protected prefix")]
    #[test_case("default", true; "protected literal")]
    #[test_case("openshift", true; "literal without prefix dash")]
    #[test_case("istio-system", true; "protected glob pattern")]
    #[test_case("ns-c", false; "user namespace")]
    #[test_case("my-openshift-app", false; "prefix only counts at start")]
    #[test_case("defaults", false; "literal must match exactly")]
    #[test]
    fn is_protected_classifies_names(name: &str, expect: bool) {
        pretty_assertions::assert_eq!(system_namespaces().is_protected(name), expect);
    }

    #[test]
    fn filter_partitions_input() {
        let input = BTreeSet::from([
            "ns-c".to_string(),
            "openshift-foo".to_string(),
            "kube-public".to_string(),
            "team-a".to_string(),
        ]);
        let result = system_namespaces().filter(&input);
        let expect = Partition {
            eligible: BTreeSet::from(["ns-c".to_string(), "team-a".to_string()]),
            skipped: BTreeSet::from(["kube-public".to_string(), "openshift-foo".to_string()]),
        };
        assert_eq!(result, expect);

        assert!(result.eligible.is_disjoint(&result.skipped));
        let union = result
            .eligible
            .union(&result.skipped)
            .cloned()
            .collect::<BTreeSet<_>>();
        assert_eq!(union, input);
    }

    #[test]
    fn allow_all_skips_nothing() {
        let input = BTreeSet::from(["openshift-foo".to_string(), "default".to_string()]);
        let result = PolicyRule::allow_all().filter(&input);
        assert_eq!(result.eligible, input);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        let result = PolicyRule::new(Vec::<String>::new(), Vec::<String>::new(), ["[unclosed"]);
        assert!(matches!(result, Err(PolicyError::Pattern { .. })));
    }
}
