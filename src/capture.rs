// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! State capture.
//!
//! Read tracked resource collections from the cluster and turn them into
//! [`Snapshot`]s. Observing only reads; capturing also persists the result
//! into the baseline store, replacing whatever was there before.

use crate::{
    cluster::{ClusterApi, ClusterError, OAUTH_CONFIG},
    config::Settings,
    snapshot::{OAuthCapture, ResourceKind, Snapshot},
    store::{BaselineStore, StoreError},
};

use tracing::{info, instrument, warn};

/// Reader of current cluster state.
#[derive(Debug)]
pub struct StateCapture<'c, C>
where
    C: ClusterApi,
{
    cluster: &'c C,
    settings: &'c Settings,
}

impl<'c, C> StateCapture<'c, C>
where
    C: ClusterApi,
{
    /// Construct new state capture.
    pub fn new(cluster: &'c C, settings: &'c Settings) -> Self {
        Self { cluster, settings }
    }

    /// Read current names of a resource kind without persisting them.
    ///
    /// # Errors
    ///
    /// - Return [`CaptureError::Cluster`] if listing fails.
    #[instrument(skip(self), level = "debug")]
    pub fn observe(&self, kind: ResourceKind) -> Result<Snapshot> {
        let names = self
            .cluster
            .list_names(kind.api_kind(), self.settings.scope(kind))?;

        Ok(Snapshot::new(kind, names))
    }

    /// Read current names of a resource kind and persist them as baseline.
    ///
    /// # Errors
    ///
    /// - Return [`CaptureError::Cluster`] if listing fails.
    /// - Return [`CaptureError::Store`] if the snapshot cannot be persisted.
    pub fn capture(&self, kind: ResourceKind, store: &BaselineStore) -> Result<Snapshot> {
        let snapshot = self.observe(kind)?;
        self.persist(&snapshot, store)?;

        Ok(snapshot)
    }

    /// Persist previously observed snapshot as baseline.
    ///
    /// # Errors
    ///
    /// - Return [`CaptureError::Store`] if the snapshot cannot be persisted.
    pub fn persist(&self, snapshot: &Snapshot, store: &BaselineStore) -> Result<()> {
        let kind = snapshot.kind();
        let path = store.save(snapshot)?;
        match self.settings.scope(kind) {
            Some(namespace) => info!(
                "captured {} {kind} of {namespace} into {}",
                snapshot.len(),
                path.display()
            ),
            None => info!("captured {} {kind} into {}", snapshot.len(), path.display()),
        }

        Ok(())
    }

    /// Read current OAuth configuration without persisting it.
    ///
    /// # Errors
    ///
    /// - Return [`CaptureError::Cluster`] if fetching fails.
    #[instrument(skip(self), level = "debug")]
    pub fn observe_oauth(&self) -> Result<OAuthCapture> {
        Ok(match self.cluster.get_object(&OAUTH_CONFIG)? {
            Some(content) => OAuthCapture::Object(content),
            None => OAuthCapture::Placeholder,
        })
    }

    /// Read current OAuth configuration and persist it as baseline.
    ///
    /// # Errors
    ///
    /// - Return [`CaptureError::Cluster`] if fetching fails.
    /// - Return [`CaptureError::Store`] if the capture cannot be persisted.
    pub fn capture_oauth(&self, store: &BaselineStore) -> Result<OAuthCapture> {
        let capture = self.observe_oauth()?;
        self.persist_oauth(&capture, store)?;

        Ok(capture)
    }

    /// Persist previously observed OAuth configuration as baseline.
    ///
    /// # Errors
    ///
    /// - Return [`CaptureError::Store`] if the capture cannot be persisted.
    pub fn persist_oauth(&self, capture: &OAuthCapture, store: &BaselineStore) -> Result<()> {
        let path = store.save_oauth(capture)?;
        if capture.is_placeholder() {
            warn!("no {OAUTH_CONFIG} exists, recorded placeholder in {}", path.display());
        } else {
            info!("captured {OAUTH_CONFIG} into {}", path.display());
        }

        Ok(())
    }
}

/// State capture error types.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Cluster cannot be read.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Baseline cannot be written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Friendly result alias :3
pub type Result<T, E = CaptureError> = std::result::Result<T, E>;
