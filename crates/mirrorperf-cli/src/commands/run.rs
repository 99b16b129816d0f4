use anyhow::{Context, Result};
use colored::Colorize;
use mirrorperf_config::HarnessConfig;
use mirrorperf_monitor::format_bytes_human;
use mirrorperf_runner::report::{
    render_clean_vs_cached, render_iteration, render_version_comparison,
};
use mirrorperf_runner::{LiveStatus, OcMirrorExecutor, Orchestrator, RunEvent, RunOutcome, RunState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::Exit;

const LIVE_STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// Anchor the workspace and build the executor running from it.
pub fn prepare(config: HarnessConfig) -> Result<(HarnessConfig, OcMirrorExecutor)> {
    let config = config
        .with_absolute_workspace()
        .context("Failed to resolve workspace root")?;
    let executor =
        OcMirrorExecutor::new(&config.mirror_binary).with_working_dir(config.layout().root());
    Ok((config, executor))
}

/// Execute the run command
pub async fn execute(config: HarnessConfig) -> Result<Exit> {
    let (config, executor) = prepare(config)?;
    let mut orchestrator = Orchestrator::new(config.clone(), Arc::new(executor));
    let events = orchestrator.subscribe();

    println!("{} {}", "Starting:".cyan().bold(), config);
    let printer = tokio::spawn(print_events(events));
    let ticker = spawn_live_status(orchestrator.live_status());

    let outcome = orchestrator.run().await;
    ticker.abort();
    let completed = orchestrator.completed_results().len();
    drop(orchestrator);
    if let Err(err) = printer.await {
        debug!(error = %err, "event printer stopped early");
    }

    match outcome {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(Exit::Success)
        }
        Err(err) => {
            if let Some(output) = err.output() {
                for line in output.logs.iter().rev().take(10).rev() {
                    eprintln!("  {}", line.dimmed());
                }
            }
            eprintln!(
                "{} {} iteration(s) completed before the failure; nothing was saved",
                "Aborted:".red().bold(),
                completed
            );
            Err(err).context("Performance run failed")
        }
    }
}

async fn print_events(mut events: mpsc::UnboundedReceiver<RunEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            RunEvent::State(RunState::RunningIteration { version, iteration }) => {
                println!(
                    "\n{} {} iteration {}",
                    "▶".cyan(),
                    version.to_string().bold(),
                    iteration
                );
            }
            RunEvent::State(RunState::CleaningWorkspace { next }) => {
                println!("{} Cleaning workspace for {}", "•".yellow(), next);
            }
            RunEvent::State(RunState::Failed) => error!("run failed"),
            RunEvent::State(state) => debug!(%state, "run state"),
            RunEvent::IterationCompleted(result) => {
                println!("{}", result.summary.green());
                println!("{}", render_iteration(&result));
            }
        }
    }
}

fn spawn_live_status(live: LiveStatus) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIVE_STATUS_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Some(registry) = live.current().await {
                println!("  {} {}", "registry".dimmed(), registry.summary().dimmed());
            } else if let Some(progress) = live.latest_progress() {
                println!(
                    "  {} {} at {:.2} MB/s, {} files",
                    "download".dimmed(),
                    format_bytes_human(progress.total_bytes),
                    progress.current_rate_mbs,
                    progress.file_count
                );
            }
        }
    })
}

fn print_outcome(outcome: &RunOutcome) {
    for comparison in &outcome.clean_vs_cached {
        println!("\n{}", render_clean_vs_cached(comparison));
    }
    if let Some(comparison) = &outcome.version_comparison {
        println!("\n{}", render_version_comparison(comparison));
    }
    println!(
        "\n{} {} result(s) saved to {}",
        "Success:".green().bold(),
        outcome.results.len(),
        outcome.results_path.display()
    );
}
