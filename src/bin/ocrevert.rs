// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use ocrevert::{
    cluster::oc::OcCli,
    config::Settings,
    orchestrate::Orchestrator,
    path::{default_baseline_dir, default_config_file},
    remediate::ApplyMode,
    store::BaselineStore,
};

use anyhow::{Context, Result};
use clap::{error::ErrorKind, Args, Parser, Subcommand};
use std::{fs::read_to_string, path::{Path, PathBuf}, process::exit};
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  ocrevert [options] snapshot\n  ocrevert [options] revert [--dry-run]",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let settings = load_settings(&self.global)?;
        debug!("effective settings:\n{settings}");

        let baseline_dir = match &settings.baseline_dir {
            Some(path) => path.clone(),
            None => default_baseline_dir()?,
        };
        let cluster = OcCli::new(settings.oc.clone(), settings.kubeconfig.clone());
        let orchestrator = Orchestrator::new(cluster, BaselineStore::open(baseline_dir), settings);

        match self.command {
            Command::Snapshot => run_snapshot(&orchestrator),
            Command::Revert(opts) => run_revert(&orchestrator, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Capture current cluster state as the baseline.
    #[command(override_usage = "ocrevert [options] snapshot")]
    Snapshot,

    /// Revert cluster state toward the baseline.
    #[command(override_usage = "ocrevert [options] revert [--dry-run]")]
    Revert(RevertOptions),
}

#[derive(Args, Clone, Debug)]
struct GlobalOptions {
    /// Path to kubeconfig handed to every oc call.
    #[arg(long, global = true, value_name = "path")]
    pub kubeconfig: Option<PathBuf>,

    /// Path to settings file.
    #[arg(long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Directory holding baseline snapshot files.
    #[arg(long, global = true, value_name = "path")]
    pub baseline_dir: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RevertOptions {
    /// Report planned actions without changing the cluster.
    #[arg(long)]
    pub dry_run: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    // INVARIANT: Usage errors exit with 1, not clap's default of 2.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            exit(code);
        }
    };

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn load_settings(opts: &GlobalOptions) -> Result<Settings> {
    let mut settings = match &opts.config {
        Some(path) => read_settings(path)?,
        None => {
            let path = default_config_file()?;
            if path.exists() {
                read_settings(&path)?
            } else {
                Settings::default()
            }
        }
    };

    settings.override_paths(opts.kubeconfig.as_deref(), opts.baseline_dir.as_deref())?;

    Ok(settings)
}

fn read_settings(path: &Path) -> Result<Settings> {
    read_to_string(path)
        .with_context(|| format!("failed to read settings file {:?}", path.display()))?
        .parse::<Settings>()
        .with_context(|| format!("invalid settings file {:?}", path.display()))
}

fn run_snapshot(orchestrator: &Orchestrator<OcCli>) -> Result<()> {
    let report = orchestrator.snapshot()?;
    print!("{report}");

    Ok(())
}

fn run_revert(orchestrator: &Orchestrator<OcCli>, opts: RevertOptions) -> Result<()> {
    let mode = if opts.dry_run {
        ApplyMode::DryRun
    } else {
        ApplyMode::Live
    };
    let report = orchestrator.revert(mode)?;
    print!("{report}");

    Ok(())
}
