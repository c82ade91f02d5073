// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Snapshot and revert orchestration.
//!
//! The orchestrator is the only component that knows the order in which
//! things happen. A process runs exactly one of two paths:
//!
//! - __snapshot__: capture every tracked resource kind and the OAuth
//!   configuration into the baseline store.
//! - __revert__: remediate the cluster back toward the baseline.
//!
//! # Revert Order
//!
//! Revert runs its steps in a fixed order:
//!
//! 1. Ensure the self-provisioner role binding, restoring self-service
//!    project creation before anything that depends on permissions.
//! 2. Restore OAuth configuration, so authentication is correct before
//!    namespaces are touched.
//! 3. Reset project request defaults.
//! 4. Delete namespaces created since the baseline.
//! 5. Delete secrets created since the baseline.
//! 6. Delete templates created since the baseline.
//!
//! Steps are independent. A failing step is reported and the next step runs
//! anyway. Only precondition failures, i.e., missing cluster CLI, no
//! authenticated session, or missing baseline files, abort a run, and they
//! do so before anything is mutated.

use crate::{
    capture::{CaptureError, StateCapture},
    cluster::{ClusterApi, ClusterError},
    config::{ConfigError, Settings},
    remediate::{ApplyMode, Executor, ItemReport, Outcome, RemediationPlan},
    snapshot::{self, OAuthCapture, ResourceKind, Snapshot, SnapshotError},
    store::{BaselineStore, StoreError},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};
use tracing::{info, instrument, warn};

/// Sequencer of snapshot and revert paths.
#[derive(Debug)]
pub struct Orchestrator<C>
where
    C: ClusterApi,
{
    cluster: C,
    store: BaselineStore,
    settings: Settings,
}

impl<C> Orchestrator<C>
where
    C: ClusterApi,
{
    /// Construct new orchestrator.
    pub fn new(cluster: C, store: BaselineStore, settings: Settings) -> Self {
        Self {
            cluster,
            store,
            settings,
        }
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    pub fn store(&self) -> &BaselineStore {
        &self.store
    }

    /// Check that cluster can be reached and acted upon.
    ///
    /// # Errors
    ///
    /// - Return [`OrchestrateError::Cluster`] if the cluster CLI is missing,
    ///   or if there is no authenticated session.
    #[instrument(skip(self), level = "debug")]
    pub fn preflight(&self) -> Result<String> {
        self.cluster.check_tool()?;
        let user = self.cluster.whoami()?;
        info!("authenticated as {user}");

        Ok(user)
    }

    /// Capture baseline of all tracked state.
    ///
    /// # Errors
    ///
    /// - Return [`OrchestrateError::Cluster`] if preflight fails.
    /// - Return [`OrchestrateError::Capture`] if any capture fails. If
    ///   reading the cluster fails, no baseline file is touched.
    pub fn snapshot(&self) -> Result<SnapshotReport> {
        self.preflight()?;
        info!("capture baseline into {:?}", self.store.path().display());

        // INVARIANT: Observe everything before writing anything, so a failed
        // read leaves the previous baseline untouched.
        let capture = StateCapture::new(&self.cluster, &self.settings);
        let baseline = Baseline {
            namespaces: capture.observe(ResourceKind::Namespaces)?,
            oauth: capture.observe_oauth()?,
            secrets: capture.observe(ResourceKind::Secrets)?,
            templates: capture.observe(ResourceKind::Templates)?,
        };

        for kind in ResourceKind::ALL {
            capture.persist(baseline.snapshot(kind), &self.store)?;
        }
        capture.persist_oauth(&baseline.oauth, &self.store)?;

        Ok(SnapshotReport {
            store_path: self.store.path().to_path_buf(),
            counts: ResourceKind::ALL
                .into_iter()
                .map(|kind| (kind, baseline.snapshot(kind).len()))
                .collect(),
            oauth_captured: !baseline.oauth.is_placeholder(),
        })
    }

    /// Revert cluster toward baseline.
    ///
    /// # Errors
    ///
    /// - Return [`OrchestrateError::Cluster`] if preflight fails.
    /// - Return [`OrchestrateError::Store`] if any baseline file is missing
    ///   or unreadable.
    pub fn revert(&self, mode: ApplyMode) -> Result<RevertReport> {
        self.preflight()?;
        let baseline = Baseline::load(&self.store)?;
        match mode {
            ApplyMode::DryRun => info!(
                "[dry-run] preview revert to baseline at {:?}",
                self.store.path().display()
            ),
            ApplyMode::Live => info!("revert to baseline at {:?}", self.store.path().display()),
        }

        let executor = Executor::new(&self.cluster, mode, self.settings.wait_timeout());
        let capture = StateCapture::new(&self.cluster, &self.settings);
        let mut report = RevertReport::new(mode);

        report.push(
            Step::EnsureRoleBinding,
            vec![executor.ensure_role_binding(&self.settings.role_binding)],
        );
        report.push(Step::RestoreOAuth, vec![executor.restore_oauth(&baseline.oauth)]);
        report.push(
            Step::ResetProjectDefaults,
            vec![executor.reset_project_defaults()],
        );

        for kind in ResourceKind::ALL {
            let items = match self.plan(&capture, baseline.snapshot(kind)) {
                Ok(plan) if kind == ResourceKind::Namespaces => executor.delete_namespaces(&plan),
                Ok(plan) => executor.delete_scoped(&plan, self.settings.scope(kind)),
                Err(error) => {
                    warn!("cannot plan removal of new {kind}: {error}");
                    vec![ItemReport::new(kind.to_string(), Outcome::Failed(error.to_string()))]
                }
            };
            report.push(Step::DeleteNew(kind), items);
        }

        if report.failures() > 0 {
            warn!("revert finished with {} failure(s)", report.failures());
        } else {
            info!("revert finished");
        }

        Ok(report)
    }

    /// Compute remediation plan of one resource kind against its baseline.
    ///
    /// # Errors
    ///
    /// - Return [`OrchestrateError::Capture`] if current state cannot be read.
    /// - Return [`OrchestrateError::Snapshot`] if snapshots cannot be diffed.
    /// - Return [`OrchestrateError::Config`] if policy rule is malformed.
    #[instrument(skip(self, capture, baseline), level = "debug")]
    pub fn plan(
        &self,
        capture: &StateCapture<'_, C>,
        baseline: &Snapshot,
    ) -> Result<RemediationPlan> {
        let kind = baseline.kind();
        let current = capture.observe(kind)?;
        let diff = snapshot::diff(baseline, &current)?;
        let partition = self.settings.policy(kind)?.filter(diff.names());
        info!(
            "{} new {kind} since baseline: {} eligible, {} protected",
            diff.names().len(),
            partition.eligible.len(),
            partition.skipped.len()
        );

        Ok(RemediationPlan::from_partition(kind, partition))
    }
}

/// All baseline files, loaded up front.
#[derive(Debug, Clone)]
struct Baseline {
    namespaces: Snapshot,
    oauth: OAuthCapture,
    secrets: Snapshot,
    templates: Snapshot,
}

impl Baseline {
    fn load(store: &BaselineStore) -> Result<Self> {
        Ok(Self {
            namespaces: store.load(ResourceKind::Namespaces)?,
            oauth: store.load_oauth()?,
            secrets: store.load(ResourceKind::Secrets)?,
            templates: store.load(ResourceKind::Templates)?,
        })
    }

    fn snapshot(&self, kind: ResourceKind) -> &Snapshot {
        match kind {
            ResourceKind::Namespaces => &self.namespaces,
            ResourceKind::Secrets => &self.secrets,
            ResourceKind::Templates => &self.templates,
        }
    }
}

/// Revert step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    EnsureRoleBinding,
    RestoreOAuth,
    ResetProjectDefaults,
    DeleteNew(ResourceKind),
}

impl Display for Step {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::EnsureRoleBinding => fmt.write_str("ensure self-provisioner role binding"),
            Self::RestoreOAuth => fmt.write_str("restore OAuth configuration"),
            Self::ResetProjectDefaults => fmt.write_str("reset project defaults"),
            Self::DeleteNew(kind) => write!(fmt, "delete new {kind}"),
        }
    }
}

/// Outcomes of one revert step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: Step,
    pub items: Vec<ItemReport>,
}

/// Outcomes of a whole revert run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertReport {
    pub mode: ApplyMode,
    pub steps: Vec<StepReport>,
}

impl RevertReport {
    fn new(mode: ApplyMode) -> Self {
        Self {
            mode,
            steps: Vec::new(),
        }
    }

    fn push(&mut self, step: Step, items: Vec<ItemReport>) {
        self.steps.push(StepReport { step, items });
    }

    /// Find report of a given step.
    pub fn step(&self, step: Step) -> Option<&StepReport> {
        self.steps.iter().find(|report| report.step == step)
    }

    /// Targets of a step whose outcome satisfies a predicate.
    pub fn targets(&self, step: Step, predicate: impl Fn(&Outcome) -> bool) -> Vec<&str> {
        self.step(step)
            .map(|report| {
                report
                    .items
                    .iter()
                    .filter(|item| predicate(&item.outcome))
                    .map(|item| item.target.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of items that were (or would be) changed.
    pub fn changes(&self) -> usize {
        self.items().filter(|item| item.outcome.is_change()).count()
    }

    /// Number of items that failed.
    pub fn failures(&self) -> usize {
        self.items().filter(|item| item.outcome.is_failed()).count()
    }

    fn items(&self) -> impl Iterator<Item = &ItemReport> {
        self.steps.iter().flat_map(|step| step.items.iter())
    }
}

impl Display for RevertReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self.mode {
            ApplyMode::DryRun => writeln!(fmt, "revert plan (dry-run):")?,
            ApplyMode::Live => writeln!(fmt, "revert summary:")?,
        }

        for (index, step) in self.steps.iter().enumerate() {
            writeln!(fmt, "  {}. {}", index + 1, step.step)?;
            if step.items.is_empty() {
                writeln!(fmt, "       nothing new")?;
            }
            for item in &step.items {
                writeln!(fmt, "       {}: {}", item.target, item.outcome)?;
            }
        }

        let verb = match self.mode {
            ApplyMode::DryRun => "planned",
            ApplyMode::Live => "applied",
        };
        writeln!(
            fmt,
            "{} change(s) {verb}, {} failure(s)",
            self.changes(),
            self.failures()
        )
    }
}

/// Outcome of a snapshot run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotReport {
    pub store_path: PathBuf,
    pub counts: Vec<(ResourceKind, usize)>,
    pub oauth_captured: bool,
}

impl Display for SnapshotReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "baseline saved to {}:", self.store_path.display())?;
        for (kind, count) in &self.counts {
            writeln!(fmt, "  {kind}: {count}")?;
        }
        if self.oauth_captured {
            writeln!(fmt, "  oauth: captured")
        } else {
            writeln!(fmt, "  oauth: none (placeholder recorded)")
        }
    }
}

/// Orchestration error types.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrateError {
    /// Cluster precondition failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Baseline cannot be loaded.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// State cannot be captured.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Snapshots cannot be compared.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Settings are unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Friendly result alias :3
pub type Result<T, E = OrchestrateError> = std::result::Result<T, E>;
