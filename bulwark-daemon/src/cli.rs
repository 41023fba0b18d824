//! CLI argument definitions for bulwark-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Bulwark log-processing daemon.
///
/// Loads the staged parser nodes, replays raw log lines through the
/// pipeline, and prints every fully processed event as a JSON line.
#[derive(Parser, Debug)]
#[command(name = "bulwark-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to bulwark.toml configuration file.
    #[arg(short, long, default_value = "/etc/bulwark/bulwark.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Read log lines from this file instead of stdin.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Enable the stage dump and write it to this path on exit.
    #[arg(long)]
    pub dump: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_system_config() {
        let cli = DaemonCli::try_parse_from(["bulwark-daemon"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/bulwark/bulwark.toml"));
        assert!(cli.input.is_none());
        assert!(!cli.validate);
    }

    #[test]
    fn dump_and_input_overrides() {
        let cli = DaemonCli::try_parse_from([
            "bulwark-daemon",
            "-c",
            "./bulwark.toml",
            "--input",
            "auth.log",
            "--dump",
            "/tmp/dump.json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.input, Some(PathBuf::from("auth.log")));
        assert_eq!(cli.dump.as_deref(), Some("/tmp/dump.json"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
