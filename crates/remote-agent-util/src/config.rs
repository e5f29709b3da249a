//! Configuration loading: command line > environment > TOML file > default.
//!
//! Reimplements the layering `maelstrom-util`'s `ConfigBag` provides, but
//! directly against a flat `clap::Parser` struct instead of the teacher's
//! per-subsystem `ConfigBag`/`#[derive(Config)]` machinery (out of scope
//! for this crate; see `DESIGN.md`).

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::{
    env,
    ffi::OsString,
    fs,
    net::SocketAddr,
    path::PathBuf,
    str::FromStr,
};

const ENV_PREFIX: &str = "REMOTE_AGENT_";

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// An `EnvFilter` directive equivalent to this level.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level `{other}`")),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "remote-agent", about = "SimpleRemote device-under-test remote agent")]
struct Cli {
    /// Address:port to bind the JSON-RPC listener to. Port 0 asks the OS
    /// to assign one, which is then advertised over UDP discovery.
    #[arg(long)]
    bind_addr: Option<SocketAddr>,

    /// Minimum log level to emit.
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,

    /// Timeout, in milliseconds, for control-plane connects/reads/writes
    /// (callback and progress connections).
    #[arg(long)]
    network_timeout_ms: Option<u64>,

    /// Timeout, in milliseconds, for a Transfer Listener waiting for its
    /// one peer to connect.
    #[arg(long)]
    transfer_accept_timeout_ms: Option<u64>,

    /// Whether to run the UDP broadcast discovery responder.
    #[arg(long)]
    discovery_enabled: Option<bool>,

    /// Directory the plugin registry resolves shared-library handles
    /// against.
    #[arg(long)]
    plugin_dir: Option<PathBuf>,

    /// Path to an optional TOML config file, lowest-priority source.
    #[arg(long, default_value = "remote-agent.toml")]
    config_file: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
struct FileConfig {
    bind_addr: Option<SocketAddr>,
    log_level: Option<LogLevel>,
    network_timeout_ms: Option<u64>,
    transfer_accept_timeout_ms: Option<u64>,
    discovery_enabled: Option<bool>,
    plugin_dir: Option<PathBuf>,
}

/// Resolved configuration, after command line, environment, and file
/// sources have been layered together.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub log_level: LogLevel,
    pub network_timeout_ms: u64,
    pub transfer_accept_timeout_ms: u64,
    pub discovery_enabled: bool,
    pub plugin_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0:0".parse().unwrap(),
            log_level: LogLevel::default(),
            network_timeout_ms: 5_000,
            transfer_accept_timeout_ms: 10_000,
            discovery_enabled: true,
            plugin_dir: None,
        }
    }
}

fn env_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .and_then(|v| T::from_str(&v).ok())
}

impl Config {
    /// Load configuration from the real process environment and
    /// `std::env::args_os()`.
    pub fn load() -> Result<Self> {
        Self::load_from(env::args_os())
    }

    /// Load configuration from an explicit argument iterator, for tests.
    pub fn load_from<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).context("error parsing command-line arguments")?;
        let file = Self::read_file(&cli.config_file)?;
        let default = Config::default();

        Ok(Config {
            bind_addr: cli
                .bind_addr
                .or_else(|| env_var("BIND_ADDR"))
                .or(file.bind_addr)
                .unwrap_or(default.bind_addr),
            log_level: cli
                .log_level
                .or_else(|| env_var("LOG_LEVEL"))
                .or(file.log_level)
                .unwrap_or(default.log_level),
            network_timeout_ms: cli
                .network_timeout_ms
                .or_else(|| env_var("NETWORK_TIMEOUT_MS"))
                .or(file.network_timeout_ms)
                .unwrap_or(default.network_timeout_ms),
            transfer_accept_timeout_ms: cli
                .transfer_accept_timeout_ms
                .or_else(|| env_var("TRANSFER_ACCEPT_TIMEOUT_MS"))
                .or(file.transfer_accept_timeout_ms)
                .unwrap_or(default.transfer_accept_timeout_ms),
            discovery_enabled: cli
                .discovery_enabled
                .or_else(|| env_var("DISCOVERY_ENABLED"))
                .or(file.discovery_enabled)
                .unwrap_or(default.discovery_enabled),
            plugin_dir: cli.plugin_dir.or(file.plugin_dir),
        })
    }

    fn read_file(path: &PathBuf) -> Result<FileConfig> {
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("error parsing config file `{}`", path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(err) => Err(err).with_context(|| format!("error reading config file `{}`", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_set() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("missing.toml");
        let config = Config::load_from([
            "remote-agent",
            "--config-file",
            config_file.to_str().unwrap(),
        ])
        .unwrap();
        assert_eq!(config.network_timeout_ms, 5_000);
        assert_eq!(config.transfer_accept_timeout_ms, 10_000);
        assert!(config.discovery_enabled);
    }

    #[test]
    fn cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("remote-agent.toml");
        fs::write(&config_file, "network_timeout_ms = 1234\n").unwrap();
        let config = Config::load_from([
            "remote-agent",
            "--config-file",
            config_file.to_str().unwrap(),
            "--network-timeout-ms",
            "9999",
        ])
        .unwrap();
        assert_eq!(config.network_timeout_ms, 9999);
    }

    #[test]
    fn file_fills_gaps_left_by_cli() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("remote-agent.toml");
        fs::write(&config_file, "transfer_accept_timeout_ms = 42\n").unwrap();
        let config = Config::load_from([
            "remote-agent",
            "--config-file",
            config_file.to_str().unwrap(),
        ])
        .unwrap();
        assert_eq!(config.transfer_accept_timeout_ms, 42);
    }
}
