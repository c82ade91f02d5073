// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the settings file that ocrevert reads to determine
//! how to reach the cluster, where to keep its baseline, and what it is
//! allowed to remove. Every field has a sensible default, so an empty file
//! (or no file at all) is a valid configuration. File I/O is left to the
//! caller to figure out.

use crate::{
    policy::{PolicyError, PolicyRule},
    snapshot::ResourceKind,
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Namespace prefixes that are protected regardless of settings.
pub const SYSTEM_NAMESPACE_PREFIXES: [&str; 2] = ["openshift-", "kube-"];

/// Namespace names that are protected regardless of settings.
pub const SYSTEM_NAMESPACE_NAMES: [&str; 5] = [
    "default",
    "openshift",
    "kube-system",
    "kube-public",
    "kube-node-lease",
];

const DEFAULT_SECRETS_NAMESPACE: &str = "openshift-config";
const DEFAULT_TEMPLATES_NAMESPACE: &str = "openshift";

/// Settings layout.
///
/// # General Layout
///
/// Top-level keys configure the cluster CLI binary, credentials, baseline
/// location, and deletion wait timeout. Each tracked resource kind gets its
/// own table holding its protection rule, and for namespaced kinds, the
/// namespace it is scoped to. The `role_binding` table names the binding that
/// revert re-establishes.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Cluster CLI binary to invoke.
    pub oc: String,

    /// Credentials location handed to every cluster CLI call.
    pub kubeconfig: Option<PathBuf>,

    /// Directory holding baseline snapshot files.
    pub baseline_dir: Option<PathBuf>,

    /// Seconds to wait for each deleted namespace to disappear.
    pub wait_timeout: u64,

    /// Additional protection rule for namespaces.
    ///
    /// System namespaces are always protected on top of whatever this rule
    /// lists.
    pub namespaces: ProtectionSettings,

    /// Scope and protection rule for secrets.
    pub secrets: ScopedSettings,

    /// Scope and protection rule for templates.
    pub templates: ScopedSettings,

    /// Self-provisioner role binding to ensure.
    pub role_binding: RoleBindingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            oc: "oc".into(),
            kubeconfig: None,
            baseline_dir: None,
            wait_timeout: 120,
            namespaces: ProtectionSettings::default(),
            secrets: ScopedSettings {
                namespace: Some(DEFAULT_SECRETS_NAMESPACE.into()),
                protection: ProtectionSettings::default(),
            },
            templates: ScopedSettings {
                namespace: Some(DEFAULT_TEMPLATES_NAMESPACE.into()),
                protection: ProtectionSettings::default(),
            },
            role_binding: RoleBindingSettings::default(),
        }
    }
}

impl Settings {
    /// Namespace a resource kind is scoped to, if any.
    pub fn scope(&self, kind: ResourceKind) -> Option<&str> {
        match kind {
            ResourceKind::Namespaces => None,
            ResourceKind::Secrets => Some(self.secrets.scope(DEFAULT_SECRETS_NAMESPACE)),
            ResourceKind::Templates => Some(self.templates.scope(DEFAULT_TEMPLATES_NAMESPACE)),
        }
    }

    /// Build protection rule for a resource kind.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Policy`] if a protected pattern is malformed.
    pub fn policy(&self, kind: ResourceKind) -> Result<PolicyRule> {
        let rule = match kind {
            ResourceKind::Namespaces => PolicyRule::new(
                SYSTEM_NAMESPACE_PREFIXES
                    .iter()
                    .map(ToString::to_string)
                    .chain(self.namespaces.protected_prefixes.iter().cloned()),
                SYSTEM_NAMESPACE_NAMES
                    .iter()
                    .map(ToString::to_string)
                    .chain(self.namespaces.protected_names.iter().cloned()),
                &self.namespaces.protected_patterns,
            )?,
            ResourceKind::Secrets => self.secrets.protection.to_rule()?,
            ResourceKind::Templates => self.templates.protection.to_rule()?,
        };

        Ok(rule)
    }

    /// Apply command-line path overrides, expanded like file values.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ShellExpansion`] if a path cannot be expanded.
    pub fn override_paths(
        &mut self,
        kubeconfig: Option<&Path>,
        baseline_dir: Option<&Path>,
    ) -> Result<()> {
        if let Some(kubeconfig) = kubeconfig {
            self.kubeconfig = Some(expand_path(kubeconfig)?);
        }

        if let Some(baseline_dir) = baseline_dir {
            self.baseline_dir = Some(expand_path(baseline_dir)?);
        }

        Ok(())
    }

    /// Deletion wait timeout as a [`Duration`].
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout)
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on path fields.
        settings.kubeconfig = settings.kubeconfig.as_deref().map(expand_path).transpose()?;
        settings.baseline_dir = settings
            .baseline_dir
            .as_deref()
            .map(expand_path)
            .transpose()?;

        // INVARIANT: Reject bad patterns and blank scopes at load time, not mid-revert.
        for kind in ResourceKind::ALL {
            settings.policy(kind)?;
            if settings.scope(kind).is_some_and(|namespace| namespace.trim().is_empty()) {
                return Err(ConfigError::EmptyNamespace { kind });
            }
        }

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Names that must never be removed.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtectionSettings {
    /// Protect names starting with any of these prefixes.
    pub protected_prefixes: Vec<String>,

    /// Protect names equal to any of these.
    pub protected_names: Vec<String>,

    /// Protect names matching any of these glob patterns.
    pub protected_patterns: Vec<String>,
}

impl ProtectionSettings {
    fn to_rule(&self) -> Result<PolicyRule, PolicyError> {
        PolicyRule::new(
            &self.protected_prefixes,
            &self.protected_names,
            &self.protected_patterns,
        )
    }
}

/// Settings of a namespaced resource kind.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScopedSettings {
    /// Namespace to track, or the built-in one of the kind if unset.
    pub namespace: Option<String>,

    #[serde(flatten)]
    pub protection: ProtectionSettings,
}

impl ScopedSettings {
    fn scope<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(fallback)
    }
}

/// Cluster role binding granting self-service project creation.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoleBindingSettings {
    /// Name of cluster role binding.
    pub name: String,

    /// Cluster role the binding must reference.
    pub cluster_role: String,

    /// Group subject the binding must include.
    pub group: String,
}

impl Default for RoleBindingSettings {
    fn default() -> Self {
        Self {
            name: "self-provisioners".into(),
            cluster_role: "self-provisioner".into(),
            group: "system:authenticated:oauth".into(),
        }
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Protection rule cannot be built.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Namespaced resource kind is scoped to a blank namespace.
    #[error("{kind} must be scoped to a non-empty namespace")]
    EmptyNamespace { kind: ResourceKind },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
