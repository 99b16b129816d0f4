use anyhow::{Context, Result};
use mirrorperf_monitor::analyze_output;
use mirrorperf_runner::report::render_output_metrics;
use std::path::PathBuf;

use super::Exit;

/// Execute the analyze command
pub async fn execute(dir: PathBuf, json: bool) -> Result<Exit> {
    let target = dir.clone();
    let metrics = tokio::task::spawn_blocking(move || analyze_output(&target))
        .await?
        .with_context(|| format!("Failed to analyze {}", dir.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        println!("{}", render_output_metrics(&metrics));
    }
    Ok(Exit::Success)
}
