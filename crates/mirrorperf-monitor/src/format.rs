//! Human-readable formatting and serde helpers shared by metric types.

use std::time::Duration;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Bytes per MiB, the unit of every `*_mbs` rate.
pub const MIB: f64 = 1024.0 * 1024.0;

/// Format a byte count with a 1024 base, e.g. `1.50 GB`.
pub fn format_bytes_human(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// Format a duration as `ms`, `s`, `m s` or `h m` depending on magnitude.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else if secs < 60 {
        format!("{:.2}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Rate in MiB/s for `bytes` over `elapsed`, zero for an empty window.
pub fn rate_mbs(bytes: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes / secs / MIB
    } else {
        0.0
    }
}

/// Serialize a [`Duration`] as floating-point seconds.
///
/// Use with `#[serde(with = "mirrorperf_monitor::format::duration_secs")]`.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Write seconds as `f64`.
    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(d.as_secs_f64())
    }

    /// Read seconds from `f64`; negative or non-finite values become zero.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        })
    }
}
