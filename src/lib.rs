// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Snapshot and revert OpenShift cluster state.
//!
//! Ocrevert records a __baseline__ of selected cluster state, i.e., namespace
//! names, the OAuth configuration, and the secrets and templates of one
//! namespace each. Later, it reverts the cluster toward that baseline by
//! removing what was created since, restoring OAuth configuration,
//! re-establishing self-service project creation, and resetting project
//! request defaults.
//!
//! # See Also
//!
//! 1. [`orchestrate`] for the order of operations.
//! 2. [`cluster`] for how the cluster is accessed.

pub mod capture;
pub mod cluster;
pub mod config;
pub mod orchestrate;
pub mod path;
pub mod policy;
pub mod remediate;
pub mod snapshot;
pub mod store;
