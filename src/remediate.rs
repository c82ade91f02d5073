// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remediation execution.
//!
//! The executor turns a remediation plan into cluster API calls. Every
//! operation is best-effort: a failing item is recorded and logged, then
//! execution moves on to the next item. Nothing here aborts a revert.
//!
//! # Dry Run
//!
//! In [`ApplyMode::DryRun`] the executor performs exactly the same reads and
//! eligibility decisions as a live run, but never issues a mutating call.
//! Each action that would have been taken is reported as
//! [`Outcome::Planned`], so a dry run is a faithful preview of the live run.

use crate::{
    cluster::{self, ClusterApi, Deletion, ObjectRef, WaitStatus, OAUTH_CONFIG, PROJECT_CONFIG},
    config::RoleBindingSettings,
    policy::Partition,
    snapshot::{OAuthCapture, ResourceKind},
};

use serde_json::{json, Value};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};
use tracing::{info, instrument, warn};

/// Whether mutating calls are actually issued.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Report intended actions only.
    #[default]
    DryRun,

    /// Issue mutating calls.
    Live,
}

impl ApplyMode {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun)
    }
}

/// Action a plan item calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Delete object.
    Delete,

    /// Leave object alone because policy protects it.
    Keep,
}

/// One entry of a remediation plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanItem {
    pub kind: ResourceKind,
    pub name: String,
    pub action: Action,
}

/// Ordered remediation plan for one resource kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemediationPlan {
    pub items: Vec<PlanItem>,
}

impl RemediationPlan {
    /// Build plan from filtered diff.
    ///
    /// Protected names are kept in the plan as [`Action::Keep`] so they are
    /// reported, never silently dropped.
    pub fn from_partition(kind: ResourceKind, partition: Partition) -> Self {
        let deletes = partition.eligible.into_iter().map(|name| PlanItem {
            kind,
            name,
            action: Action::Delete,
        });
        let keeps = partition.skipped.into_iter().map(|name| PlanItem {
            kind,
            name,
            action: Action::Keep,
        });

        Self {
            items: deletes.chain(keeps).collect(),
        }
    }

    /// Names the plan will delete.
    pub fn deletions(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|item| item.action == Action::Delete)
            .map(|item| item.name.as_str())
    }
}

/// Why an item required no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Object was already gone.
    AlreadyAbsent,

    /// Object already matches desired state.
    AlreadyCorrect,

    /// Policy protects object from removal.
    Protected,

    /// Baseline holds nothing to restore.
    NothingToRestore,
}

impl Display for SkipReason {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::AlreadyAbsent => fmt.write_str("already absent"),
            Self::AlreadyCorrect => fmt.write_str("already correct"),
            Self::Protected => fmt.write_str("protected"),
            Self::NothingToRestore => fmt.write_str("nothing to restore"),
        }
    }
}

/// Result of one remediation item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Mutation was issued and accepted.
    Succeeded,

    /// Mutation would have been issued, but this is a dry run.
    Planned,

    /// No mutation was needed.
    Skipped(SkipReason),

    /// Mutation failed; execution continued.
    Failed(String),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Check if outcome involved, or would involve, a mutating call.
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Planned)
    }
}

impl Display for Outcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Succeeded => fmt.write_str("done"),
            Self::Planned => fmt.write_str("planned"),
            Self::Skipped(reason) => write!(fmt, "skipped ({reason})"),
            Self::Failed(message) => write!(fmt, "FAILED: {message}"),
        }
    }
}

/// Outcome of one remediation item with what it targeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub target: String,
    pub outcome: Outcome,
}

impl ItemReport {
    pub fn new(target: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            target: target.into(),
            outcome,
        }
    }
}

/// Server-managed metadata that must not be sent back on replace.
const VOLATILE_METADATA: [&str; 5] = [
    "resourceVersion",
    "uid",
    "creationTimestamp",
    "generation",
    "managedFields",
];

const DEFAULT_PROJECT_CONFIG: &str = r#"apiVersion: config.openshift.io/v1
kind: Project
metadata:
  name: cluster
spec: {}
"#;

/// Remediation executor.
#[derive(Debug)]
pub struct Executor<'c, C>
where
    C: ClusterApi,
{
    cluster: &'c C,
    mode: ApplyMode,
    wait_timeout: Duration,
}

impl<'c, C> Executor<'c, C>
where
    C: ClusterApi,
{
    /// Construct new executor.
    pub fn new(cluster: &'c C, mode: ApplyMode, wait_timeout: Duration) -> Self {
        Self {
            cluster,
            mode,
            wait_timeout,
        }
    }

    /// Delete every eligible namespace of plan, then wait for each to vanish.
    ///
    /// Waiting is best-effort confirmation. A timeout is logged, but the
    /// namespace still counts as deleted since the delete call succeeded.
    #[instrument(skip(self, plan), level = "debug")]
    pub fn delete_namespaces(&self, plan: &RemediationPlan) -> Vec<ItemReport> {
        let mut reports = self.report_kept(plan);
        let mut issued = Vec::new();
        for name in plan.deletions() {
            let object = ObjectRef::cluster(ResourceKind::Namespaces.api_kind(), name);
            let outcome = self.delete_one(&object);
            if outcome == Outcome::Succeeded {
                issued.push(name);
            }
            reports.push(ItemReport::new(object.to_string(), outcome));
        }

        for name in issued {
            let object = ObjectRef::cluster(ResourceKind::Namespaces.api_kind(), name);
            match self.cluster.wait_for_deletion(&object, self.wait_timeout) {
                Ok(WaitStatus::Gone) => info!("{object} is gone"),
                Ok(WaitStatus::TimedOut) => warn!(
                    "{object} still terminating after {}s",
                    self.wait_timeout.as_secs()
                ),
                Err(error) => warn!("cannot confirm deletion of {object}: {error}"),
            }
        }

        reports
    }

    /// Delete every eligible object of plan within one namespace.
    #[instrument(skip(self, plan), level = "debug")]
    pub fn delete_scoped(&self, plan: &RemediationPlan, namespace: Option<&str>) -> Vec<ItemReport> {
        let mut reports = self.report_kept(plan);
        for item in plan.items.iter().filter(|item| item.action == Action::Delete) {
            let object = ObjectRef::scoped(item.kind.api_kind(), &item.name, namespace);
            let outcome = self.delete_one(&object);
            reports.push(ItemReport::new(object.to_string(), outcome));
        }

        reports
    }

    /// Restore OAuth configuration from baseline capture.
    #[instrument(skip(self, baseline), level = "debug")]
    pub fn restore_oauth(&self, baseline: &OAuthCapture) -> ItemReport {
        let target = OAUTH_CONFIG.to_string();
        let content = match baseline {
            OAuthCapture::Placeholder => {
                warn!("baseline holds no OAuth configuration, nothing to restore");
                return ItemReport::new(target, Outcome::Skipped(SkipReason::NothingToRestore));
            }
            OAuthCapture::Object(content) => content,
        };

        let mut desired: Value = match serde_json::from_str(content) {
            Ok(value) => value,
            Err(error) => return self.failed(target, format!("baseline OAuth is malformed: {error}")),
        };

        match cluster::get_json(self.cluster, &OAUTH_CONFIG) {
            Ok(Some(live)) if live.get("spec") == desired.get("spec") => {
                info!("{target} already matches baseline");
                return ItemReport::new(target, Outcome::Skipped(SkipReason::AlreadyCorrect));
            }
            Ok(_) => {}
            Err(error) => return self.failed(target, error.to_string()),
        }

        strip_volatile_metadata(&mut desired);
        let manifest = desired.to_string();
        let outcome = self.mutate(format!("restore {target} from baseline"), || {
            self.cluster.replace(&manifest)
        });

        ItemReport::new(target, outcome)
    }

    /// Ensure cluster role binding grants configured role to configured group.
    ///
    /// A binding that already grants the role to the group is never touched.
    /// A binding referencing the wrong role is deleted and recreated, since
    /// the role reference of a binding cannot be changed in place.
    #[instrument(skip(self), level = "debug")]
    pub fn ensure_role_binding(&self, binding: &RoleBindingSettings) -> ItemReport {
        let object = ObjectRef::cluster("clusterrolebinding", &binding.name);
        let target = object.to_string();

        let state = match cluster::get_json(self.cluster, &object) {
            Ok(live) => BindingState::inspect(live.as_ref(), binding),
            Err(error) => return self.failed(target, error.to_string()),
        };

        let outcome = match state {
            BindingState::Correct => {
                info!("{target} already grants {} to {}", binding.cluster_role, binding.group);
                Outcome::Skipped(SkipReason::AlreadyCorrect)
            }
            BindingState::Missing => self.mutate(
                format!("create {target} granting {} to {}", binding.cluster_role, binding.group),
                || self.cluster.grant_cluster_role(binding),
            ),
            BindingState::MissingSubject => self.mutate(
                format!("add group {} to {target}", binding.group),
                || self.cluster.grant_cluster_role(binding),
            ),
            BindingState::WrongRole(role) => self.mutate(
                format!("recreate {target} referencing {} instead of {role}", binding.cluster_role),
                || {
                    self.cluster.delete(&object)?;
                    self.cluster.grant_cluster_role(binding)
                },
            ),
        };

        ItemReport::new(target, outcome)
    }

    /// Reset project request template of cluster project configuration.
    ///
    /// Patch first. Only if patching fails, replace the object with a minimal
    /// default manifest.
    #[instrument(skip(self), level = "debug")]
    pub fn reset_project_defaults(&self) -> ItemReport {
        let target = PROJECT_CONFIG.to_string();
        match cluster::get_json(self.cluster, &PROJECT_CONFIG) {
            Ok(Some(live)) if !has_project_template(&live) => {
                info!("{target} already uses default project template");
                return ItemReport::new(target, Outcome::Skipped(SkipReason::AlreadyCorrect));
            }
            Ok(_) => {}
            Err(error) => return self.failed(target, error.to_string()),
        }

        let patch = json!({ "spec": { "projectRequestTemplate": null } }).to_string();
        let outcome = self.mutate(format!("clear project request template of {target}"), || {
            match self.cluster.patch_merge(&PROJECT_CONFIG, &patch) {
                Ok(()) => Ok(()),
                Err(error) => {
                    warn!("patch of {target} failed, replacing with default manifest instead: {error}");
                    self.cluster.replace(DEFAULT_PROJECT_CONFIG)
                }
            }
        });

        ItemReport::new(target, outcome)
    }

    fn report_kept(&self, plan: &RemediationPlan) -> Vec<ItemReport> {
        plan.items
            .iter()
            .filter(|item| item.action == Action::Keep)
            .map(|item| {
                info!("skip protected {} {:?}", item.kind, item.name);
                ItemReport::new(
                    format!("{}/{}", item.kind.api_kind(), item.name),
                    Outcome::Skipped(SkipReason::Protected),
                )
            })
            .collect()
    }

    fn delete_one(&self, object: &ObjectRef<'_>) -> Outcome {
        if self.mode.is_dry_run() {
            info!("[dry-run] delete {object}");
            return Outcome::Planned;
        }

        info!("delete {object}");
        match self.cluster.delete(object) {
            Ok(Deletion::Deleted) => Outcome::Succeeded,
            Ok(Deletion::AlreadyAbsent) => {
                info!("{object} already absent");
                Outcome::Skipped(SkipReason::AlreadyAbsent)
            }
            Err(error) => {
                warn!("failed to delete {object}: {error}");
                Outcome::Failed(error.to_string())
            }
        }
    }

    fn mutate(&self, intent: String, call: impl FnOnce() -> cluster::Result<()>) -> Outcome {
        if self.mode.is_dry_run() {
            info!("[dry-run] {intent}");
            return Outcome::Planned;
        }

        info!("{intent}");
        match call() {
            Ok(()) => Outcome::Succeeded,
            Err(error) => {
                warn!("failed to {intent}: {error}");
                Outcome::Failed(error.to_string())
            }
        }
    }

    fn failed(&self, target: String, message: String) -> ItemReport {
        warn!("{target}: {message}");
        ItemReport::new(target, Outcome::Failed(message))
    }
}

/// How a live cluster role binding compares to the desired one.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BindingState {
    Correct,
    Missing,
    MissingSubject,
    WrongRole(String),
}

impl BindingState {
    fn inspect(live: Option<&Value>, binding: &RoleBindingSettings) -> Self {
        let Some(live) = live else {
            return Self::Missing;
        };

        let role = live
            .pointer("/roleRef/name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if role != binding.cluster_role {
            return Self::WrongRole(role.to_string());
        }

        let has_group = live
            .get("subjects")
            .and_then(Value::as_array)
            .map(|subjects| {
                subjects.iter().any(|subject| {
                    subject.get("kind").and_then(Value::as_str) == Some("Group")
                        && subject.get("name").and_then(Value::as_str) == Some(binding.group.as_str())
                })
            })
            .unwrap_or(false);
        if !has_group {
            return Self::MissingSubject;
        }

        Self::Correct
    }
}

fn has_project_template(project: &Value) -> bool {
    project
        .pointer("/spec/projectRequestTemplate/name")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.is_empty())
}

fn strip_volatile_metadata(object: &mut Value) {
    if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        for key in VOLATILE_METADATA {
            metadata.remove(key);
        }
    }
    if let Some(object) = object.as_object_mut() {
        object.remove("status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn binding() -> RoleBindingSettings {
        RoleBindingSettings::default()
    }

    #[test]
    fn plan_keeps_protected_names() {
        let partition = Partition {
            eligible: BTreeSet::from(["ns2".to_string()]),
            skipped: BTreeSet::from(["openshift-extra".to_string()]),
        };
        let result = RemediationPlan::from_partition(ResourceKind::Namespaces, partition);
        let expect = RemediationPlan {
            items: vec![
                PlanItem {
                    kind: ResourceKind::Namespaces,
                    name: "ns2".into(),
                    action: Action::Delete,
                },
                PlanItem {
                    kind: ResourceKind::Namespaces,
                    name: "openshift-extra".into(),
                    action: Action::Keep,
                },
            ],
        };
        assert_eq!(result, expect);
        assert_eq!(result.deletions().collect::<Vec<_>>(), vec!["ns2"]);
    }

    #[test]
    fn binding_state_inspection() {
        assert_eq!(BindingState::inspect(None, &binding()), BindingState::Missing);

        let correct = json!({
            "roleRef": { "kind": "ClusterRole", "name": "self-provisioner" },
            "subjects": [
                { "kind": "Group", "name": "system:authenticated:oauth" }
            ]
        });
        assert_eq!(BindingState::inspect(Some(&correct), &binding()), BindingState::Correct);

        let no_subjects = json!({ "roleRef": { "name": "self-provisioner" } });
        assert_eq!(
            BindingState::inspect(Some(&no_subjects), &binding()),
            BindingState::MissingSubject
        );

        let user_subject = json!({
            "roleRef": { "name": "self-provisioner" },
            "subjects": [{ "kind": "User", "name": "system:authenticated:oauth" }]
        });
        assert_eq!(
            BindingState::inspect(Some(&user_subject), &binding()),
            BindingState::MissingSubject
        );

        let wrong = json!({
            "roleRef": { "name": "basic-user" },
            "subjects": [{ "kind": "Group", "name": "system:authenticated:oauth" }]
        });
        assert_eq!(
            BindingState::inspect(Some(&wrong), &binding()),
            BindingState::WrongRole("basic-user".into())
        );
    }

    #[test]
    fn project_template_detection() {
        assert!(has_project_template(&json!({
            "spec": { "projectRequestTemplate": { "name": "custom-request" } }
        })));
        assert!(!has_project_template(&json!({
            "spec": { "projectRequestTemplate": { "name": "" } }
        })));
        assert!(!has_project_template(&json!({ "spec": {} })));
    }

    #[test]
    fn volatile_metadata_is_stripped() {
        let mut object = json!({
            "apiVersion": "config.openshift.io/v1",
            "kind": "OAuth",
            "metadata": {
                "name": "cluster",
                "resourceVersion": "123",
                "uid": "abc",
                "generation": 4,
                "creationTimestamp": "2024-01-01T00:00:00Z",
                "managedFields": [],
                "annotations": { "keep": "me" }
            },
            "spec": { "identityProviders": [] },
            "status": {}
        });
        strip_volatile_metadata(&mut object);

        let expect = json!({
            "apiVersion": "config.openshift.io/v1",
            "kind": "OAuth",
            "metadata": {
                "name": "cluster",
                "annotations": { "keep": "me" }
            },
            "spec": { "identityProviders": [] }
        });
        assert_eq!(object, expect);
    }

    #[test]
    fn outcome_display() {
        assert_eq!(Outcome::Succeeded.to_string(), "done");
        assert_eq!(
            Outcome::Skipped(SkipReason::AlreadyAbsent).to_string(),
            "skipped (already absent)"
        );
        assert_eq!(Outcome::Failed("boom".into()).to_string(), "FAILED: boom");
    }
}
