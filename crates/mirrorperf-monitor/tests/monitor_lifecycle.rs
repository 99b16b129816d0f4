//! Lifecycle behaviour of the concrete monitors against a real filesystem.

use mirrorperf_monitor::prelude::*;
use mirrorperf_monitor::{compare_outputs, DownloadProgress};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const POLL: Duration = Duration::from_millis(20);
const GRACE: Duration = Duration::from_millis(30);

fn fill(dir: &Path, name: &str, bytes: usize) {
    fs::write(dir.join(name), vec![7u8; bytes]).unwrap();
}

#[tokio::test]
async fn download_counts_only_new_bytes() {
    let dir = TempDir::new().unwrap();
    fill(dir.path(), "existing.bin", 10_000);

    let monitor = DownloadMonitor::for_dir(dir.path())
        .with_poll_interval(POLL)
        .with_stop_grace(GRACE);
    monitor.start().unwrap();
    let mut progress = monitor.take_progress().expect("progress receiver");

    tokio::time::sleep(Duration::from_millis(40)).await;
    fill(dir.path(), "new-1.bin", 3_000);
    tokio::time::sleep(Duration::from_millis(60)).await;
    fill(dir.path(), "new-2.bin", 2_000);
    tokio::time::sleep(Duration::from_millis(60)).await;

    let metrics = monitor.stop().await;
    assert_eq!(metrics.total_bytes_downloaded, 5_000);
    assert_eq!(metrics.total_files, 3);
    assert!(metrics.peak_speed_mbs > 0.0);
    assert!(metrics.end_time >= metrics.start_time);

    let mut events: Vec<DownloadProgress> = Vec::new();
    while let Some(event) = progress.recv().await {
        events.push(event);
    }
    assert!(!events.is_empty());
    assert_eq!(events.last().map(|e| e.total_bytes), Some(5_000));
}

#[tokio::test]
async fn download_total_clamps_when_directory_shrinks() {
    let dir = TempDir::new().unwrap();
    fill(dir.path(), "a.bin", 8_000);
    fill(dir.path(), "b.bin", 8_000);

    let monitor = DownloadMonitor::for_dir(dir.path())
        .with_poll_interval(POLL)
        .with_stop_grace(GRACE);
    monitor.start().unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    fs::remove_file(dir.path().join("a.bin")).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let metrics = monitor.stop().await;
    assert_eq!(metrics.total_bytes_downloaded, 0);
    assert!(metrics.samples.iter().any(|s| s.bytes_delta < 0));
    assert!(metrics.min_speed_mbs >= 0.0);
}

#[tokio::test]
async fn download_stopped_before_first_tick_falls_back_to_final_size() {
    let dir = TempDir::new().unwrap();
    let monitor = DownloadMonitor::for_dir(dir.path())
        .with_poll_interval(Duration::from_secs(10))
        .with_stop_grace(Duration::from_millis(10));
    monitor.start().unwrap();
    fill(dir.path(), "late.bin", 1024 * 1024);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let metrics = monitor.stop().await;
    assert!(metrics.samples.is_empty());
    assert_eq!(metrics.total_bytes_downloaded, 1024 * 1024);
    assert!(metrics.average_speed_mbs.is_finite());
    assert!(metrics.average_speed_mbs > 0.0);
}

#[tokio::test]
async fn stop_is_idempotent_across_monitor_kinds() {
    let dir = TempDir::new().unwrap();
    let disk = DiskWriteMonitor::for_dir(dir.path())
        .with_poll_interval(POLL)
        .with_stop_grace(GRACE);
    disk.start().unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let first = disk.stop().await;
    let second = disk.stop().await;
    assert_eq!(first, second);
    assert!(!disk.is_monitoring());
    assert!(disk.duration() >= Duration::from_millis(60));
}

#[tokio::test]
async fn resource_monitor_retargets_mid_session() {
    let monitor = ResourceMonitor::current_process()
        .with_poll_interval(POLL)
        .with_stop_grace(GRACE);
    monitor.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let child = std::process::Command::new("sleep").arg("1").spawn();
    let Ok(mut child) = child else {
        monitor.stop().await;
        return;
    };
    monitor.set_target_pid(child.id());
    tokio::time::sleep(Duration::from_millis(80)).await;
    let metrics = monitor.stop().await;
    let _ = child.kill();
    let _ = child.wait();

    assert!(metrics.samples.iter().any(|s| s.pid == child.id()));
    assert!(metrics.samples.iter().any(|s| s.pid == std::process::id()));
}

#[tokio::test]
async fn one_differing_file_is_reported() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    for root in [a.path(), b.path()] {
        fs::create_dir_all(root.join("blobs/sha256")).unwrap();
        fill(&root.join("blobs/sha256"), "l1", 64);
        fill(root, "index.json", 2);
    }
    fs::write(b.path().join("blobs/sha256/l1"), vec![8u8; 64]).unwrap();

    let cmp = compare_outputs(a.path(), b.path()).await.unwrap();
    assert!(!cmp.matches);
    assert!(!cmp.hash_match);
    assert_eq!(cmp.different_content, vec!["blobs/sha256/l1".to_string()]);
    assert!(cmp.missing_in_first.is_empty());
    assert!(cmp.missing_in_second.is_empty());
    assert_eq!(cmp.size_difference, 0);
}
