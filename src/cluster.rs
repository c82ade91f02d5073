// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Cluster API access.
//!
//! Ocrevert never talks to the cluster API server directly. Every read and
//! mutation goes through the narrow [`ClusterApi`] interface, whose
//! production implementation, [`OcCli`](crate::cluster::oc::OcCli), shells
//! out to the OpenShift `oc` binary. Keeping the interface this small lets
//! the reconciliation logic run against an in-memory fake in tests.
//!
//! # Idempotent Deletion
//!
//! Deleting something that is already gone is not an error. Instead,
//! [`ClusterApi::delete`] reports [`Deletion::AlreadyAbsent`], so re-running
//! a revert after a partial failure is always safe.

pub mod oc;

use crate::config::RoleBindingSettings;

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};

/// Reference to a single cluster object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRef<'a> {
    /// Resource type, e.g., "namespace" or "clusterrolebinding".
    pub kind: &'a str,

    /// Name of the object.
    pub name: &'a str,

    /// Namespace of the object, if it is namespaced.
    pub namespace: Option<&'a str>,
}

impl<'a> ObjectRef<'a> {
    /// Reference cluster-scoped object.
    pub fn cluster(kind: &'a str, name: &'a str) -> Self {
        Self {
            kind,
            name,
            namespace: None,
        }
    }

    /// Reference object that may be namespaced.
    pub fn scoped(kind: &'a str, name: &'a str, namespace: Option<&'a str>) -> Self {
        Self {
            kind,
            name,
            namespace,
        }
    }
}

impl Display for ObjectRef<'_> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self.namespace {
            Some(namespace) => write!(fmt, "{}/{} in {}", self.kind, self.name, namespace),
            None => write!(fmt, "{}/{}", self.kind, self.name),
        }
    }
}

/// Cluster-wide OAuth configuration.
pub const OAUTH_CONFIG: ObjectRef<'static> = ObjectRef {
    kind: "oauth.config.openshift.io",
    name: "cluster",
    namespace: None,
};

/// Cluster-wide project configuration.
pub const PROJECT_CONFIG: ObjectRef<'static> = ObjectRef {
    kind: "project.config.openshift.io",
    name: "cluster",
    namespace: None,
};

/// What a delete call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// Object existed and deletion was issued.
    Deleted,

    /// Object did not exist to begin with.
    AlreadyAbsent,
}

/// How waiting for deletion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Object is gone.
    Gone,

    /// Object still existed when the timeout elapsed.
    TimedOut,
}

/// Layer of indirection for cluster access.
pub trait ClusterApi {
    /// Verify that the cluster CLI can be executed at all.
    fn check_tool(&self) -> Result<()>;

    /// Name of currently authenticated user.
    fn whoami(&self) -> Result<String>;

    /// List names of all objects of a kind, optionally in one namespace.
    fn list_names(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<String>>;

    /// Fetch serialized JSON form of an object, or nothing if it is absent.
    fn get_object(&self, object: &ObjectRef<'_>) -> Result<Option<String>>;

    /// Delete an object, treating absence as success.
    fn delete(&self, object: &ObjectRef<'_>) -> Result<Deletion>;

    /// Block until an object is gone or the timeout elapses.
    fn wait_for_deletion(&self, object: &ObjectRef<'_>, timeout: Duration) -> Result<WaitStatus>;

    /// Replace an existing object wholesale with a serialized manifest.
    ///
    /// Unlike a merging apply, fields absent from the manifest are removed
    /// from the live object.
    fn replace(&self, manifest: &str) -> Result<()>;

    /// Apply a JSON merge patch to an object.
    fn patch_merge(&self, object: &ObjectRef<'_>, patch: &str) -> Result<()>;

    /// Grant cluster role to group under a named cluster role binding.
    fn grant_cluster_role(&self, binding: &RoleBindingSettings) -> Result<()>;
}

/// Fetch object and decode it as JSON.
///
/// # Errors
///
/// - Return [`ClusterError::MalformedObject`] if the object is not valid
///   JSON.
/// - Return any error of [`ClusterApi::get_object`].
pub fn get_json(
    cluster: &impl ClusterApi,
    object: &ObjectRef<'_>,
) -> Result<Option<serde_json::Value>> {
    cluster
        .get_object(object)?
        .map(|content| {
            serde_json::from_str(&content).map_err(|err| ClusterError::MalformedObject {
                source: err,
                object: object.to_string(),
            })
        })
        .transpose()
}

/// Cluster access error types.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// Cluster CLI binary cannot be found.
    #[error("required tool {binary:?} not found in PATH")]
    MissingTool {
        #[source]
        source: std::io::Error,
        binary: String,
    },

    /// No valid session with the cluster.
    #[error("not authenticated to cluster: {message}")]
    NotAuthenticated { message: String },

    /// Cluster CLI reported failure.
    #[error("command {command:?} failed:\n{message}")]
    Command { command: String, message: String },

    /// Object was expected to be serialized JSON.
    #[error("malformed object returned for {object}")]
    MalformedObject {
        #[source]
        source: serde_json::Error,
        object: String,
    },

    /// Style template cannot be set for progress spinner.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Cluster CLI process cannot be spawned or talked to.
    #[error(transparent)]
    Syscall(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = ClusterError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn object_ref_display() {
        let result = ObjectRef::cluster("namespace", "ns2").to_string();
        assert_eq!(result, "namespace/ns2");

        let result = ObjectRef::scoped("secret", "htpass", Some("openshift-config")).to_string();
        assert_eq!(result, "secret/htpass in openshift-config");
    }
}
