//! Established TCP connection counting.

use super::{command_stdout, first_success, Strategy};

const STRATEGIES: [Strategy<str, String>; 2] = [
    Strategy {
        name: "ss",
        read: read_ss,
    },
    Strategy {
        name: "netstat",
        read: read_netstat,
    },
];

fn read_ss(_: &str) -> Option<String> {
    command_stdout("ss", &["-tn", "state", "established"])
}

fn read_netstat(_: &str) -> Option<String> {
    command_stdout("netstat", &["-tn"])
}

/// Number of established TCP connections involving `host:port`.
///
/// Zero when neither `ss` nor `netstat` is available.
pub fn count_established(host: &str, port: u16) -> u32 {
    let endpoint = format!("{}:{}", host, port);
    first_success(endpoint.as_str(), &STRATEGIES)
        .map(|output| count_matching_lines(&output, &endpoint))
        .unwrap_or(0)
}

/// Lines of socket-table output that mention `endpoint`.
pub fn count_matching_lines(output: &str, endpoint: &str) -> u32 {
    output.lines().filter(|line| line.contains(endpoint)).count() as u32
}
