// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Point-in-time captures of cluster state.
//!
//! A __snapshot__ is the set of names of one tracked resource kind at the
//! moment it was captured. Snapshots taken during `ocrevert snapshot` become
//! the __baseline__ that later revert runs subtract from the current state of
//! the cluster to discover what is new.
//!
//! # Text Layout
//!
//! Snapshots are persisted as plain text with one name per line. Names are
//! always unique and sorted lexicographically, so the same cluster state
//! always produces byte-identical files. Parsing tolerates blank lines,
//! surrounding whitespace, and duplicates.
//!
//! The OAuth configuration is not a set, so it gets its own representation
//! in [`OAuthCapture`].

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Set-valued resource kinds tracked by ocrevert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// Cluster-scoped namespaces.
    Namespaces,

    /// Secrets of one configured namespace.
    Secrets,

    /// Templates of one configured namespace.
    Templates,
}

impl ResourceKind {
    /// All set-valued kinds in capture order.
    pub const ALL: [ResourceKind; 3] = [Self::Namespaces, Self::Secrets, Self::Templates];

    /// Resource type name understood by the cluster API.
    pub fn api_kind(&self) -> &'static str {
        match self {
            Self::Namespaces => "namespace",
            Self::Secrets => "secret",
            Self::Templates => "template",
        }
    }

    /// Name of snapshot file inside of baseline store.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Namespaces => "namespaces.txt",
            Self::Secrets => "secrets.txt",
            Self::Templates => "templates.txt",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Namespaces => fmt.write_str("namespaces"),
            Self::Secrets => fmt.write_str("secrets"),
            Self::Templates => fmt.write_str("templates"),
        }
    }
}

/// Names of one resource kind captured at a point in time.
///
/// # Invariant
///
/// - No duplicate names.
/// - Names iterate in lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    kind: ResourceKind,
    names: BTreeSet<String>,
}

impl Snapshot {
    /// Construct new snapshot from listing of names.
    pub fn new(kind: ResourceKind, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            kind,
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Construct empty snapshot.
    pub fn empty(kind: ResourceKind) -> Self {
        Self {
            kind,
            names: BTreeSet::new(),
        }
    }

    /// Parse snapshot from its line-oriented text form.
    pub fn parse(kind: ResourceKind, content: impl AsRef<str>) -> Self {
        let names = content
            .as_ref()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect::<BTreeSet<_>>();

        Self { kind, names }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.names.contains(name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Display for Snapshot {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for name in &self.names {
            writeln!(fmt, "{name}")?;
        }

        Ok(())
    }
}

/// Names present now that were absent at baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    kind: ResourceKind,
    names: BTreeSet<String>,
}

impl Diff {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    pub fn into_names(self) -> BTreeSet<String> {
        self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Compute what is new since baseline.
///
/// Pure set subtraction, `current - baseline`. Names that vanished since the
/// baseline are not reported; ocrevert never recreates deleted resources.
///
/// # Errors
///
/// - Return [`SnapshotError::KindMismatch`] if both snapshots do not track
///   the same resource kind.
pub fn diff(baseline: &Snapshot, current: &Snapshot) -> Result<Diff> {
    if baseline.kind != current.kind {
        return Err(SnapshotError::KindMismatch {
            baseline: baseline.kind,
            current: current.kind,
        });
    }

    let names = current
        .names
        .difference(&baseline.names)
        .cloned()
        .collect::<BTreeSet<_>>();

    Ok(Diff {
        kind: current.kind,
        names,
    })
}

/// Marker persisted in place of OAuth configuration that did not exist.
pub const OAUTH_PLACEHOLDER: &str = "NO_OAUTH_OBJECT";

/// Captured OAuth cluster configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthCapture {
    /// Verbatim serialized object.
    Object(String),

    /// Nothing existed at capture time.
    Placeholder,
}

impl OAuthCapture {
    /// Parse from persisted form.
    ///
    /// Anything other than the placeholder marker is treated as a captured
    /// object and kept verbatim.
    pub fn parse(content: impl Into<String>) -> Self {
        let content = content.into();
        if content.trim().is_empty() || content.trim() == OAUTH_PLACEHOLDER {
            return Self::Placeholder;
        }

        Self::Object(content)
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }
}

impl Display for OAuthCapture {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Object(content) => fmt.write_str(content),
            Self::Placeholder => writeln!(fmt, "{OAUTH_PLACEHOLDER}"),
        }
    }
}

/// Snapshot error types.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Snapshots of different resource kinds cannot be compared.
    #[error("cannot diff {current} snapshot against {baseline} baseline")]
    KindMismatch {
        baseline: ResourceKind,
        current: ResourceKind,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SnapshotError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn snapshot_parse_sorts_and_dedups() {
        let result = Snapshot::parse(
            ResourceKind::Namespaces,
            indoc! {"
                ns-b
                default

                ns-a
                  ns-b
            "},
        );
        let expect = Snapshot::new(ResourceKind::Namespaces, ["default", "ns-a", "ns-b"]);
        assert_eq!(result, expect);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn snapshot_display_is_sorted_lines() {
        let result = Snapshot::new(ResourceKind::Secrets, ["zeta", "alpha", "mid", "alpha"]).to_string();
        let expect = indoc! {"
            alpha
            mid
            zeta
        "};
        assert_eq!(result, expect);

        let result = Snapshot::empty(ResourceKind::Secrets).to_string();
        assert_eq!(result, "");
    }

    #[test]
    fn diff_returns_only_new_names() -> anyhow::Result<()> {
        let baseline = Snapshot::new(ResourceKind::Namespaces, ["ns-a", "ns-b"]);
        let current = Snapshot::new(ResourceKind::Namespaces, ["ns-a", "ns-b", "ns-c"]);
        let result = diff(&baseline, &current)?;
        assert_eq!(result.names(), &BTreeSet::from(["ns-c".to_string()]));
        for name in result.names() {
            assert!(!baseline.contains(name));
        }

        Ok(())
    }

    #[test]
    fn diff_ignores_removed_names() -> anyhow::Result<()> {
        let baseline = Snapshot::new(ResourceKind::Templates, ["a", "b", "c"]);
        let current = Snapshot::new(ResourceKind::Templates, ["b", "d"]);
        let result = diff(&baseline, &current)?;
        assert_eq!(result.names(), &BTreeSet::from(["d".to_string()]));

        Ok(())
    }

    #[test]
    fn diff_against_self_is_empty() -> anyhow::Result<()> {
        let snapshot = Snapshot::new(ResourceKind::Secrets, ["builder", "deployer", "htpass"]);
        assert!(diff(&snapshot, &snapshot)?.is_empty());

        Ok(())
    }

    #[test]
    fn diff_handles_empty_inputs() -> anyhow::Result<()> {
        let empty = Snapshot::empty(ResourceKind::Namespaces);
        let current = Snapshot::new(ResourceKind::Namespaces, ["ns-b", "ns-a"]);

        assert!(diff(&empty, &empty)?.is_empty());
        assert!(diff(&current, &empty)?.is_empty());

        let result = diff(&empty, &current)?
            .into_names()
            .into_iter()
            .collect::<Vec<_>>();
        assert_eq!(result, vec!["ns-a".to_string(), "ns-b".to_string()]);

        Ok(())
    }

    #[test]
    fn diff_rejects_kind_mismatch() {
        let baseline = Snapshot::empty(ResourceKind::Secrets);
        let current = Snapshot::empty(ResourceKind::Templates);
        let result = diff(&baseline, &current);
        assert!(matches!(
            result,
            Err(SnapshotError::KindMismatch {
                baseline: ResourceKind::Secrets,
                current: ResourceKind::Templates,
            })
        ));
    }

    #[test]
    fn oauth_capture_detects_placeholder() {
        assert_eq!(OAuthCapture::parse("NO_OAUTH_OBJECT\n"), OAuthCapture::Placeholder);
        assert_eq!(OAuthCapture::parse(""), OAuthCapture::Placeholder);
        assert_eq!(OAuthCapture::Placeholder.to_string(), "NO_OAUTH_OBJECT\n");

        let object = r#"{"kind":"OAuth","metadata":{"name":"cluster"}}"#;
        assert_eq!(
            OAuthCapture::parse(object),
            OAuthCapture::Object(object.to_string())
        );
    }
}
