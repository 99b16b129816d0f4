//! Table rendering for iteration results and comparisons.
//!
//! Everything returns a `String`; printing is the caller's business.

use crate::compare::{CleanVsCached, Direction, MetricComparison, VersionComparison};
use crate::result::TestResult;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use mirrorperf_monitor::{format_bytes_human, format_duration, OutputComparison, OutputMetrics};

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(
        header
            .iter()
            .map(|h| Cell::new(h).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );
    table
}

fn improvement_cell(metric: &MetricComparison) -> Cell {
    match (metric.direction, metric.improvement_percent) {
        (Direction::Neutral, _) | (_, None) => Cell::new("-"),
        (_, Some(p)) if p > 0.0 => Cell::new(format!("{:+.2}%", p)).fg(Color::Green),
        (_, Some(p)) if p < 0.0 => Cell::new(format!("{:+.2}%", p)).fg(Color::Red),
        (_, Some(p)) => Cell::new(format!("{:.2}%", p)),
    }
}

fn comparison_rows(table: &mut Table, metrics: &[&MetricComparison]) {
    for metric in metrics {
        table.add_row(vec![
            Cell::new(&metric.metric),
            Cell::new(format!("{:.2}", metric.baseline)),
            Cell::new(format!("{:.2}", metric.candidate)),
            improvement_cell(metric),
        ]);
    }
}

/// Summary table of one iteration.
pub fn render_iteration(result: &TestResult) -> String {
    let title = format!("{} ({}, {})", result.iteration, result.run_label(), result.version);
    let mut t = table(&["Iteration", title.as_str()]);
    let rows: Vec<(&str, String)> = vec![
        ("Download time", format_duration(result.download_phase.wall_time)),
        ("Upload time", format_duration(result.upload_phase.wall_time)),
        ("Total time", format_duration(result.total_time())),
        ("Bytes uploaded", format_bytes_human(result.upload_phase.bytes_uploaded)),
        ("Download cache hits", result.download_phase.cache_hits.to_string()),
        ("Upload cache hits", result.upload_phase.cache_hits.to_string()),
        (
            "Average bandwidth",
            format!("{:.2} Mbps", result.network_metrics.average_bandwidth_mbps),
        ),
        (
            "Peak bandwidth",
            format!("{:.2} Mbps", result.network_metrics.peak_bandwidth_mbps),
        ),
        ("Performance score", format!("{:.1}", result.performance_score())),
    ];
    for (name, value) in rows {
        t.add_row(vec![name.to_string(), value]);
    }
    if let Some(resource) = &result.download_phase.resource {
        t.add_row(vec!["Download resources".to_string(), resource.summary()]);
    }
    if let Some(registry) = &result.upload_phase.registry {
        t.add_row(vec!["Registry".to_string(), registry.summary()]);
    }
    if let Some(output) = &result.output_metrics {
        t.add_row(vec!["Output".to_string(), output.summary()]);
    }
    if let Some(describe) = &result.describe_metrics {
        t.add_row(vec![
            "Content (describe)".to_string(),
            format!(
                "{} images | {} layers | {} manifests",
                describe.total_images, describe.total_layers, describe.total_manifests
            ),
        ]);
    }
    t.to_string()
}

/// Clean vs cached table for one version group.
pub fn render_clean_vs_cached(comparison: &CleanVsCached) -> String {
    let title = format!("Clean vs cached ({})", comparison.version);
    let cached = format!("Cached (avg of {})", comparison.cached_runs);
    let mut t = table(&[title.as_str(), "Clean", cached.as_str(), "Improvement"]);
    comparison_rows(&mut t, &comparison.metrics());
    t.to_string()
}

/// Version comparison table, followed by content and caching findings.
pub fn render_version_comparison(comparison: &VersionComparison) -> String {
    let improvement = format!("{} improvement", comparison.candidate_version);
    let mut t = table(&[
        "Clean run",
        comparison.baseline_version.as_str(),
        comparison.candidate_version.as_str(),
        improvement.as_str(),
    ]);
    let metrics: Vec<&MetricComparison> = comparison.metrics.iter().collect();
    comparison_rows(&mut t, &metrics);

    let mut out = t.to_string();
    if let Some(content) = &comparison.content {
        out.push('\n');
        out.push_str(&render_output_comparison(content));
    }
    if let Some(caching) = &comparison.caching_effectiveness {
        let fmt = |p: Option<f64>| p.map_or("-".to_string(), |p| format!("{:.2}%", p));
        out.push_str(&format!(
            "\nCaching effectiveness: {} {} | {} {} | delta {}",
            comparison.baseline_version,
            fmt(caching.baseline_improvement_percent),
            comparison.candidate_version,
            fmt(caching.candidate_improvement_percent),
            caching.delta_points.map_or("-".to_string(), |d| format!("{:+.2} pts", d)),
        ));
    }
    out
}

/// Content equality verdict with the differing paths.
pub fn render_output_comparison(comparison: &OutputComparison) -> String {
    let verdict = if comparison.matches {
        Cell::new("MATCH").fg(Color::Green)
    } else {
        Cell::new("MISMATCH").fg(Color::Red)
    };
    let mut t = table(&["Content check", ""]);
    t.add_row(vec![Cell::new("Verdict"), verdict]);
    t.add_row(vec!["Fingerprints equal".to_string(), comparison.hash_match.to_string()]);
    t.add_row(vec!["Size difference".to_string(), format!("{} bytes", comparison.size_difference)]);
    t.add_row(vec!["File count difference".to_string(), comparison.file_count_diff.to_string()]);
    for (label, paths) in [
        ("Missing in first", &comparison.missing_in_first),
        ("Missing in second", &comparison.missing_in_second),
        ("Different content", &comparison.different_content),
    ] {
        if !paths.is_empty() {
            t.add_row(vec![format!("{} ({})", label, paths.len()), paths.join("\n")]);
        }
    }
    t.to_string()
}

/// Directory analysis table.
pub fn render_output_metrics(metrics: &OutputMetrics) -> String {
    let directory = metrics.directory.display().to_string();
    let mut t = table(&["Directory", directory.as_str()]);
    t.add_row(vec!["Total size".to_string(), format_bytes_human(metrics.total_size)]);
    t.add_row(vec!["Files".to_string(), metrics.total_files.to_string()]);
    t.add_row(vec!["Directories".to_string(), metrics.total_dirs.to_string()]);
    t.add_row(vec![
        "Average file size".to_string(),
        format_bytes_human(metrics.average_file_size()),
    ]);
    t.add_row(vec!["Layers".to_string(), metrics.layer_count.to_string()]);
    t.add_row(vec!["Manifests".to_string(), metrics.manifest_count.to_string()]);
    t.add_row(vec!["Signatures".to_string(), metrics.signature_count.to_string()]);
    t.add_row(vec!["Fingerprint".to_string(), metrics.directory_hash.clone()]);
    for entry in &metrics.largest_files {
        t.add_row(vec![entry.path.clone(), format_bytes_human(entry.size)]);
    }
    t.to_string()
}
