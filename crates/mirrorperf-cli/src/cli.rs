use clap::{Args, Parser, Subcommand, ValueEnum};
use mirrorperf_config::HarnessConfig;
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages (default)
    Info,
    /// Debug messages
    Debug,
    /// Trace-level messages (most verbose)
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Parser)]
#[command(name = "mirrorperf")]
#[command(about = "mirrorperf - measure oc-mirror runs: clean vs cached, v1 vs v2")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level (off, error, warn, info, debug, trace)
    #[arg(short = 'l', long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (defaults to ~/.config/mirrorperf/config.toml)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Level for the `mirrorperf` crates when `RUST_LOG` is unset.
    pub fn level_filter(&self) -> LevelFilter {
        match (self.log_level, self.verbose) {
            (Some(level), _) => level.into(),
            (None, true) => LevelFilter::DEBUG,
            (None, false) => LevelFilter::INFO,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the mirror tool repeatedly and record every iteration
    Run(RunArgs),

    /// Analyze a mirror output directory
    Analyze {
        /// Directory to analyze
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Print the metrics as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Check whether two mirror output directories hold the same content
    Compare {
        /// First directory
        #[arg(value_name = "DIR1")]
        first: PathBuf,

        /// Second directory
        #[arg(value_name = "DIR2")]
        second: PathBuf,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Overrides applied on top of the config file for `run`.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Target registry, e.g. registry.lab:5000
    #[arg(short = 'r', long)]
    pub registry: Option<String>,

    /// Iterations per version group
    #[arg(short = 'i', long)]
    pub iterations: Option<u32>,

    /// Run v1 and then v2 and compare them
    #[arg(long)]
    pub compare_versions: bool,

    /// Skip TLS verification when pushing to the registry
    #[arg(long)]
    pub skip_tls: bool,

    /// Directory holding every mirror, cache, config and result file
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// oc-mirror binary to execute
    #[arg(long, value_name = "PATH")]
    pub mirror_binary: Option<String>,
}

impl RunArgs {
    /// Apply the flags that were given to `config`.
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(registry) = &self.registry {
            config.registry_url = registry.clone();
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if self.compare_versions {
            config.compare_versions = true;
        }
        if self.skip_tls {
            config.skip_tls = true;
        }
        if let Some(workspace) = &self.workspace {
            config.workspace_root = workspace.clone();
        }
        if let Some(binary) = &self.mirror_binary {
            config.mirror_binary = binary.clone();
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a config file with default values
    Init {
        /// Path for the config file (defaults to ~/.config/mirrorperf/config.toml)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,

        /// Overwrite existing config file
        #[arg(short = 'F', long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Output format (toml, json)
        #[arg(short = 'f', long, default_value = "toml")]
        format: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_override_file_values() {
        let cli = Cli::try_parse_from([
            "mirrorperf",
            "run",
            "-r",
            "registry.lab:5000",
            "-i",
            "4",
            "--compare-versions",
            "--workspace",
            "/srv/perf",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };

        let mut config = HarnessConfig {
            registry_url: "old:5000".into(),
            mirror_binary: "/opt/oc-mirror".into(),
            ..HarnessConfig::default()
        };
        args.apply(&mut config);

        assert_eq!(config.registry_url, "registry.lab:5000");
        assert_eq!(config.iterations, 4);
        assert!(config.compare_versions);
        assert!(!config.skip_tls);
        assert_eq!(config.workspace_root, PathBuf::from("/srv/perf"));
        assert_eq!(config.mirror_binary, "/opt/oc-mirror");
    }

    #[test]
    fn verbose_means_debug_unless_level_given() {
        let cli = Cli::try_parse_from(["mirrorperf", "-v", "analyze", "out"]).unwrap();
        assert_eq!(cli.level_filter(), LevelFilter::DEBUG);

        let cli = Cli::try_parse_from(["mirrorperf", "-v", "-l", "warn", "analyze", "out"]).unwrap();
        assert_eq!(cli.level_filter(), LevelFilter::WARN);

        let cli = Cli::try_parse_from(["mirrorperf", "analyze", "out"]).unwrap();
        assert_eq!(cli.level_filter(), LevelFilter::INFO);
    }

    #[test]
    fn compare_needs_two_directories() {
        assert!(Cli::try_parse_from(["mirrorperf", "compare", "a"]).is_err());
        assert!(Cli::try_parse_from(["mirrorperf", "compare", "a", "b"]).is_ok());
    }
}
