// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{oauth, orchestrator, FakeCluster, OAUTH_KIND};

use ocrevert::{
    capture::StateCapture,
    cluster::ClusterError,
    config::Settings,
    orchestrate::OrchestrateError,
    snapshot::{OAuthCapture, ResourceKind, Snapshot, OAUTH_PLACEHOLDER},
};

use indoc::indoc;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use serde_json::Value;
use std::fs::read_to_string;

#[sealed_test]
fn snapshot_writes_every_baseline_file() -> anyhow::Result<()> {
    let orchestrator = orchestrator(FakeCluster::standard());
    let report = orchestrator.snapshot()?;

    assert_eq!(
        report.counts,
        vec![
            (ResourceKind::Namespaces, 3),
            (ResourceKind::Secrets, 2),
            (ResourceKind::Templates, 1),
        ]
    );
    assert!(report.oauth_captured);

    let expect = indoc! {"
        default
        ns1
        openshift-etcd
    "};
    assert_eq!(read_to_string("baseline/namespaces.txt")?, expect);

    let expect = indoc! {"
        etcd-client
        pull-secret
    "};
    assert_eq!(read_to_string("baseline/secrets.txt")?, expect);
    assert_eq!(read_to_string("baseline/templates.txt")?, "httpd-example\n");

    let stored: Value = serde_json::from_str(&read_to_string("baseline/oauth.json")?)?;
    assert_eq!(stored, oauth(&["htpasswd"]));

    Ok(())
}

#[sealed_test]
fn snapshot_records_placeholder_without_oauth() -> anyhow::Result<()> {
    let cluster = FakeCluster::standard();
    cluster.remove_object(OAUTH_KIND, "cluster");
    let orchestrator = orchestrator(cluster);
    let report = orchestrator.snapshot()?;

    assert!(!report.oauth_captured);
    assert_eq!(read_to_string("baseline/oauth.json")?.trim(), OAUTH_PLACEHOLDER);
    assert_eq!(orchestrator.store().load_oauth()?, OAuthCapture::Placeholder);

    Ok(())
}

#[sealed_test]
fn snapshot_scopes_secrets_to_tracked_namespace() -> anyhow::Result<()> {
    let cluster = FakeCluster::standard();
    cluster.add_names("secret", Some("ns1"), ["app-token"]);
    let orchestrator = orchestrator(cluster);
    orchestrator.snapshot()?;

    let expect = Snapshot::new(ResourceKind::Secrets, ["etcd-client", "pull-secret"]);
    assert_eq!(orchestrator.store().load(ResourceKind::Secrets)?, expect);

    Ok(())
}

#[sealed_test]
fn snapshot_overwrites_previous_baseline() -> anyhow::Result<()> {
    let orchestrator = orchestrator(FakeCluster::standard());
    orchestrator.snapshot()?;

    orchestrator.cluster().add_names("namespace", None, ["ns2"]);
    orchestrator.snapshot()?;

    let expect = Snapshot::new(ResourceKind::Namespaces, ["default", "ns1", "ns2", "openshift-etcd"]);
    assert_eq!(orchestrator.store().load(ResourceKind::Namespaces)?, expect);

    Ok(())
}

#[sealed_test]
fn snapshot_with_empty_collections() -> anyhow::Result<()> {
    let orchestrator = orchestrator(FakeCluster::new());
    orchestrator.snapshot()?;

    for kind in ResourceKind::ALL {
        assert!(orchestrator.store().load(kind)?.is_empty());
    }

    Ok(())
}

#[sealed_test]
fn failed_listing_keeps_previous_baseline() -> anyhow::Result<()> {
    let orchestrator = orchestrator(FakeCluster::standard());
    orchestrator.snapshot()?;
    let files = ["namespaces.txt", "oauth.json", "secrets.txt", "templates.txt"];
    let before = files
        .iter()
        .map(|file| read_to_string(format!("baseline/{file}")))
        .collect::<Result<Vec<_>, _>>()?;

    let cluster = orchestrator.cluster();
    cluster.add_names("namespace", None, ["ns-new"]);
    cluster.add_names("secret", Some("openshift-config"), ["htpass-secret"]);
    cluster.set_object(OAUTH_KIND, "cluster", oauth(&["github"]));
    cluster.fail_listing_of("template");
    let result = orchestrator.snapshot();
    assert!(matches!(result, Err(OrchestrateError::Capture(_))));

    let after = files
        .iter()
        .map(|file| read_to_string(format!("baseline/{file}")))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(after, before);

    Ok(())
}

#[sealed_test]
fn failed_first_snapshot_writes_nothing() {
    let cluster = FakeCluster::standard();
    cluster.fail_listing_of("template");
    let orchestrator = orchestrator(cluster);

    let result = orchestrator.snapshot();
    assert!(matches!(result, Err(OrchestrateError::Capture(_))));
    assert!(!std::path::Path::new("baseline").exists());
}

#[sealed_test]
fn capture_replaces_single_kind() -> anyhow::Result<()> {
    let orchestrator = orchestrator(FakeCluster::standard());
    orchestrator.snapshot()?;

    let cluster = orchestrator.cluster();
    cluster.add_names("template", Some("openshift"), ["custom"]);
    cluster.add_names("namespace", None, ["ns2"]);
    let settings = Settings::default();
    let capture = StateCapture::new(cluster, &settings);
    let result = capture.capture(ResourceKind::Templates, orchestrator.store())?;

    let expect = Snapshot::new(ResourceKind::Templates, ["custom", "httpd-example"]);
    assert_eq!(result, expect);
    assert_eq!(orchestrator.store().load(ResourceKind::Templates)?, expect);
    assert!(!orchestrator.store().load(ResourceKind::Namespaces)?.contains("ns2"));

    let captured = capture.capture_oauth(orchestrator.store())?;
    assert_eq!(orchestrator.store().load_oauth()?, captured);

    Ok(())
}

#[sealed_test]
fn snapshot_without_session_writes_nothing() {
    let cluster = FakeCluster::standard();
    cluster.log_out();
    let orchestrator = orchestrator(cluster);

    let result = orchestrator.snapshot();
    assert!(matches!(
        result,
        Err(OrchestrateError::Cluster(ClusterError::NotAuthenticated { .. }))
    ));
    assert!(!std::path::Path::new("baseline").exists());
}
