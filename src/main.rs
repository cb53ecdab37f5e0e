use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::time::MissedTickBehavior;

use dipa_auto::branch::Branch;
use dipa_auto::checker::{BranchChecker, CheckerSettings};
use dipa_auto::config::DipaConfig;
use dipa_auto::dispatch::GitHubNotifier;
use dipa_auto::listing::HttpListingSource;
use dipa_auto::logging;
use dipa_auto::storage::FileStore;

#[derive(Parser)]
#[command(name = "dipa-auto", version, about = "Dispatch GitHub workflows when new IPAs appear")]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Check all branches now and then on every refresh interval (default)
    Run,
    /// Run a single check pass and exit
    Check {
        /// Only check this branch
        #[arg(long)]
        branch: Option<Branch>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init()?;

    let config = DipaConfig::load(cli.config.as_deref())?;
    let checker = build_checker(&config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(checker, config.refresh_interval()).await,
        Command::Check { branch } => check_once(&checker, branch).await,
    }
}

fn build_checker(config: &DipaConfig) -> Result<BranchChecker> {
    let timeout = config.request_timeout();
    let source = HttpListingSource::new(&config.ipa_base_url, timeout)
        .context("Failed to build listing client")?;
    let notifier = GitHubNotifier::new(&config.github_api_url, timeout)
        .context("Failed to build GitHub client")?;
    let store = FileStore::new(&config.state_path);

    let settings = CheckerSettings {
        ipa_base_url: config.ipa_base_url.clone(),
        targets: config.targets.clone(),
        branch_delay: config.branch_delay(),
    };

    BranchChecker::new(Arc::new(source), Arc::new(notifier), Arc::new(store), settings)
        .with_context(|| format!("Failed to initialize state file {:?}", config.state_path))
}

async fn run(checker: BranchChecker, refresh: Duration) -> Result<()> {
    tracing::info!(
        "Starting dipa-auto, checking every {}s for {} target(s)",
        refresh.as_secs(),
        checker.targets().len()
    );

    // First tick fires immediately, giving the initial check
    let mut interval = tokio::time::interval(refresh);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    checker.check_all().await;
                }
                _ = sigint.recv() => {
                    tracing::warn!("SIGINT received");
                    break;
                }
                _ = sigterm.recv() => {
                    tracing::warn!("SIGTERM received");
                    break;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    checker.check_all().await;
                }
                _ = &mut ctrl_c => {
                    tracing::warn!("Ctrl+C received");
                    break;
                }
            }
        }
    }

    tracing::info!("dipa-auto stopped");
    Ok(())
}

async fn check_once(checker: &BranchChecker, branch: Option<Branch>) -> Result<()> {
    let results = match branch {
        Some(branch) => vec![(branch, checker.check_branch(branch).await)],
        None => checker.check_all().await,
    };

    let failed: Vec<String> = results
        .iter()
        .filter_map(|(branch, result)| result.as_ref().err().map(|e| format!("{}: {}", branch, e)))
        .collect();

    if !failed.is_empty() {
        anyhow::bail!("check failed for {}", failed.join("; "));
    }
    Ok(())
}
