use anyhow::{Context, Result};
use colored::Colorize;
use mirrorperf_monitor::compare_outputs;
use mirrorperf_runner::report::render_output_comparison;
use std::path::PathBuf;

use super::Exit;

/// Execute the compare command
///
/// Exits with [`Exit::Mismatch`] when the two trees differ.
pub async fn execute(first: PathBuf, second: PathBuf) -> Result<Exit> {
    let comparison = compare_outputs(&first, &second).await.with_context(|| {
        format!(
            "Failed to compare {} with {}",
            first.display(),
            second.display()
        )
    })?;

    println!("{}", render_output_comparison(&comparison));
    if comparison.matches {
        println!("{}", "Outputs are identical".green().bold());
        Ok(Exit::Success)
    } else {
        println!("{}", "Outputs differ".red().bold());
        Ok(Exit::Mismatch)
    }
}
