// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Baseline store management.
//!
//! Ocrevert keeps the baseline captured by `ocrevert snapshot` in one place
//! called the __baseline store__. The store is a plain directory holding one
//! file per tracked resource kind. Each new snapshot overwrites the previous
//! baseline in full; nothing is ever merged.
//!
//! # Baseline Store Layout
//!
//! The default location is `$XDG_DATA_HOME/ocrevert/baseline`.
//!
//! - `namespaces.txt`: sorted namespace names, one per line.
//! - `oauth.json`: verbatim OAuth cluster configuration, or the
//!   `NO_OAUTH_OBJECT` marker if none existed.
//! - `secrets.txt`: sorted secret names of the tracked namespace.
//! - `templates.txt`: sorted template names of the tracked namespace.
//!
//! Files are written to a temporary sibling first, then renamed into place.
//! Thus, an interrupted snapshot never leaves behind a truncated baseline
//! file.

use crate::snapshot::{OAuthCapture, ResourceKind, Snapshot};

use std::{
    fs::{read_to_string, rename, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Name of OAuth snapshot file inside of baseline store.
pub const OAUTH_FILE: &str = "oauth.json";

/// On-disk baseline snapshots.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    store_path: PathBuf,
}

impl BaselineStore {
    /// Open baseline store at target path.
    ///
    /// Does not touch the file system. The directory is only created once a
    /// snapshot is written into it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: path.into(),
        }
    }

    /// Path to baseline store directory.
    pub fn path(&self) -> &Path {
        self.store_path.as_path()
    }

    /// Persist snapshot of a set-valued resource kind.
    ///
    /// Overwrites any previous snapshot of the same kind.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::CreateStore`] if store directory cannot be
    ///   created.
    /// - Return [`StoreError::WriteBaseline`] if snapshot file cannot be
    ///   written.
    pub fn save(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        self.write_file(snapshot.kind().file_name(), snapshot.to_string())
    }

    /// Load snapshot of a set-valued resource kind.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::MissingBaseline`] if no snapshot of the kind
    ///   was ever saved.
    /// - Return [`StoreError::ReadBaseline`] if snapshot file cannot be read.
    pub fn load(&self, kind: ResourceKind) -> Result<Snapshot> {
        let content = self.read_file(kind.file_name())?;
        Ok(Snapshot::parse(kind, content))
    }

    /// Persist OAuth configuration capture.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::CreateStore`] if store directory cannot be
    ///   created.
    /// - Return [`StoreError::WriteBaseline`] if snapshot file cannot be
    ///   written.
    pub fn save_oauth(&self, capture: &OAuthCapture) -> Result<PathBuf> {
        self.write_file(OAUTH_FILE, capture.to_string())
    }

    /// Load OAuth configuration capture.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::MissingBaseline`] if OAuth configuration was
    ///   never captured.
    /// - Return [`StoreError::ReadBaseline`] if snapshot file cannot be read.
    pub fn load_oauth(&self) -> Result<OAuthCapture> {
        Ok(OAuthCapture::parse(self.read_file(OAUTH_FILE)?))
    }

    #[instrument(skip(self, content), level = "debug")]
    fn write_file(&self, name: &str, content: String) -> Result<PathBuf> {
        mkdirp::mkdirp(&self.store_path).map_err(|err| StoreError::CreateStore {
            source: err,
            store_path: self.store_path.clone(),
        })?;

        // INVARIANT: Replace baseline file atomically.
        let path = self.store_path.join(name);
        let staging = self.store_path.join(format!(".{name}.tmp"));
        write(&staging, content.as_bytes())
            .and_then(|_| rename(&staging, &path))
            .map_err(|err| StoreError::WriteBaseline {
                source: err,
                path: path.clone(),
            })?;
        debug!("wrote {}", path.display());

        Ok(path)
    }

    fn read_file(&self, name: &str) -> Result<String> {
        let path = self.store_path.join(name);
        read_to_string(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => StoreError::MissingBaseline { path: path.clone() },
            _ => StoreError::ReadBaseline {
                source: err,
                path: path.clone(),
            },
        })
    }
}

/// Baseline store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Baseline store directory cannot be created.
    #[error("failed to create baseline store at {:?}", store_path.display())]
    CreateStore {
        #[source]
        source: std::io::Error,
        store_path: PathBuf,
    },

    /// Baseline file does not exist, i.e., no snapshot was taken.
    #[error("missing baseline file {:?}, run `ocrevert snapshot` first", path.display())]
    MissingBaseline { path: PathBuf },

    /// Baseline file cannot be read from.
    #[error("failed to read baseline file {:?}", path.display())]
    ReadBaseline {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Baseline file cannot be written to.
    #[error("failed to write baseline file {:?}", path.display())]
    WriteBaseline {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
