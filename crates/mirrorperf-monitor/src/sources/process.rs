//! Process accounting from `/proc/<pid>`.

use std::fs;

/// Point-in-time accounting for one process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    /// utime + stime, in clock ticks
    pub cpu_ticks: u64,
    /// Resident set size in bytes
    pub rss_bytes: u64,
    /// Virtual memory size in bytes
    pub vms_bytes: u64,
    /// OS thread count
    pub threads: u64,
}

/// Read CPU, memory and thread accounting for `pid`.
///
/// `None` when the process is gone or `/proc` is unavailable.
pub fn read_process_stats(pid: u32) -> Option<ProcessStats> {
    let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    let cpu_ticks = parse_cpu_ticks(&stat)?;
    let status = fs::read_to_string(format!("/proc/{}/status", pid)).unwrap_or_default();
    let (rss_bytes, vms_bytes, threads) = parse_status(&status);
    Some(ProcessStats {
        cpu_ticks,
        rss_bytes,
        vms_bytes,
        threads,
    })
}

/// utime + stime from a `/proc/<pid>/stat` line.
///
/// The command name may contain spaces, so fields are counted from the
/// closing parenthesis.
pub fn parse_cpu_ticks(stat: &str) -> Option<u64> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // fields[0] is state (field 3); utime and stime are fields 14 and 15
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

/// (VmRSS, VmSize, Threads) from `/proc/<pid>/status`, sizes in bytes.
pub fn parse_status(status: &str) -> (u64, u64, u64) {
    let mut rss = 0;
    let mut vms = 0;
    let mut threads = 0;
    for line in status.lines() {
        if let Some(value) = line.strip_prefix("VmRSS:") {
            rss = parse_kb(value);
        } else if let Some(value) = line.strip_prefix("VmSize:") {
            vms = parse_kb(value);
        } else if let Some(value) = line.strip_prefix("Threads:") {
            threads = value.trim().parse().unwrap_or(0);
        }
    }
    (rss, vms, threads)
}

fn parse_kb(value: &str) -> u64 {
    value
        .split_whitespace()
        .next()
        .and_then(|kb| kb.parse::<u64>().ok())
        .unwrap_or(0)
        * 1024
}

/// Total physical memory in bytes, 0 if unknown.
pub fn total_memory_bytes() -> u64 {
    fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|meminfo| {
            meminfo
                .lines()
                .find_map(|line| line.strip_prefix("MemTotal:").map(parse_kb))
        })
        .unwrap_or(0)
}

/// Clock ticks per second used by `/proc/<pid>/stat`.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn clock_ticks_per_second() -> u64 {
    // SAFETY: sysconf has no preconditions and only reads system configuration.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as u64
    } else {
        100
    }
}

/// Clock ticks per second used by `/proc/<pid>/stat`.
#[cfg(not(unix))]
pub fn clock_ticks_per_second() -> u64 {
    100
}

/// Logical CPU count, at least 1.
pub fn cpu_count() -> usize {
    num_cpus::get().max(1)
}
