//! Interface byte counters and default-interface detection.

use super::{command_stdout, first_success, Strategy};
use std::fs;

/// Interface used when detection finds nothing.
pub const FALLBACK_INTERFACE: &str = "eth0";

/// Interfaces probed, in order, by the `ip link` strategy.
const COMMON_INTERFACES: &[&str] = &["eth0", "ens33", "enp0s3", "wlan0"];

/// Cumulative receive/transmit counters for one interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    /// Bytes received since boot
    pub rx_bytes: u64,
    /// Bytes transmitted since boot
    pub tx_bytes: u64,
}

const COUNTER_STRATEGIES: [Strategy<str, InterfaceCounters>; 2] = [
    Strategy {
        name: "sysfs",
        read: read_sysfs_counters,
    },
    Strategy {
        name: "proc-net-dev",
        read: read_proc_net_dev,
    },
];

const INTERFACE_STRATEGIES: [Strategy<(), String>; 3] = [
    Strategy {
        name: "ip-route",
        read: detect_from_ip_route,
    },
    Strategy {
        name: "ip-link",
        read: detect_from_ip_link,
    },
    Strategy {
        name: "proc-net-route",
        read: detect_from_proc_route,
    },
];

/// Read counters for `interface`, zero when no source is readable.
pub fn read_counters(interface: &str) -> InterfaceCounters {
    first_success(interface, &COUNTER_STRATEGIES).unwrap_or_default()
}

/// Name of the interface carrying the default route.
pub fn default_interface() -> String {
    first_success(&(), &INTERFACE_STRATEGIES).unwrap_or_else(|| FALLBACK_INTERFACE.to_string())
}

fn read_sysfs_counters(interface: &str) -> Option<InterfaceCounters> {
    let read = |name: &str| -> Option<u64> {
        fs::read_to_string(format!("/sys/class/net/{}/statistics/{}", interface, name))
            .ok()?
            .trim()
            .parse()
            .ok()
    };
    Some(InterfaceCounters {
        rx_bytes: read("rx_bytes")?,
        tx_bytes: read("tx_bytes")?,
    })
}

fn read_proc_net_dev(interface: &str) -> Option<InterfaceCounters> {
    parse_proc_net_dev(&fs::read_to_string("/proc/net/dev").ok()?, interface)
}

/// Find `interface` in `/proc/net/dev` content.
pub fn parse_proc_net_dev(content: &str, interface: &str) -> Option<InterfaceCounters> {
    content.lines().skip(2).find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != interface {
            return None;
        }
        let parts: Vec<&str> = rest.split_whitespace().collect();
        Some(InterfaceCounters {
            rx_bytes: parts.first()?.parse().ok()?,
            tx_bytes: parts.get(8)?.parse().ok()?,
        })
    })
}

fn detect_from_ip_route(_: &()) -> Option<String> {
    parse_ip_route(&command_stdout("ip", &["route", "show", "default"])?)
}

/// Interface name following `dev` in `ip route show default` output.
pub fn parse_ip_route(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        tokens.find(|t| *t == "dev")?;
        tokens.next().map(str::to_string)
    })
}

fn detect_from_ip_link(_: &()) -> Option<String> {
    parse_ip_link(&command_stdout("ip", &["link", "show"])?)
}

/// First well-known interface reported as UP by `ip link show`.
pub fn parse_ip_link(output: &str) -> Option<String> {
    COMMON_INTERFACES
        .iter()
        .find(|iface| {
            let needle = format!(": {}:", iface);
            output
                .lines()
                .any(|line| line.contains(&needle) && line.contains("state UP"))
        })
        .map(|iface| iface.to_string())
}

fn detect_from_proc_route(_: &()) -> Option<String> {
    parse_proc_route(&fs::read_to_string("/proc/net/route").ok()?)
}

/// Interface of the first route entry in `/proc/net/route`.
pub fn parse_proc_route(content: &str) -> Option<String> {
    content
        .lines()
        .nth(1)?
        .split_whitespace()
        .next()
        .map(str::to_string)
}
