use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::admin::{self, Mutation, Target};
use crate::blacklist::Capacity;
use crate::counters::{CounterMode, DEFAULT_COUNTER_MODE};
use crate::error::AdminError;
use crate::pipeline::UnknownProtocolPolicy;

/// Engine configuration, loadable from CLI or YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// API server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of classification workers (one counter shard each).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Frames buffered per worker before sources see backpressure.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Counter bank layout.
    #[serde(default = "default_counter_mode")]
    pub counter_mode: CounterMode,

    /// Verdict for frames whose L3/L4 protocol is not inspected.
    #[serde(default)]
    pub unknown_protocol: UnknownProtocolPolicy,

    /// SQLite database path for counter history.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Seconds between counter snapshots. 0 = disabled.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_seconds: u64,

    /// Snapshot retention in seconds (None = keep forever).
    #[serde(default)]
    pub data_retention_seconds: Option<u64>,

    /// Quiet mode (suppress non-error logs).
    #[serde(default)]
    pub quiet: bool,

    /// List of CIDRs allowed to access the API (empty = allow all).
    #[serde(default)]
    pub allowed_ips: Vec<String>,

    /// Blacklist table limits.
    #[serde(default)]
    pub capacity: Capacity,
}

fn default_port() -> u16 {
    3000
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_queue_depth() -> usize {
    10000
}

fn default_counter_mode() -> CounterMode {
    DEFAULT_COUNTER_MODE
}

fn default_db_path() -> String {
    "xdpfw.db".to_string()
}

fn default_snapshot_interval() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            workers: default_workers(),
            queue_depth: default_queue_depth(),
            counter_mode: default_counter_mode(),
            unknown_protocol: UnknownProtocolPolicy::default(),
            db_path: default_db_path(),
            snapshot_interval_seconds: default_snapshot_interval(),
            data_retention_seconds: None,
            quiet: false,
            allowed_ips: Vec::new(),
            capacity: Capacity::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Merge CLI args into config (CLI takes precedence).
    pub fn merge_cli(&mut self, cli: &CliArgs) {
        if cli.port != 3000 {
            self.port = cli.port;
        }
        if let Some(workers) = cli.workers {
            self.workers = workers;
        }
        if let Some(depth) = cli.queue_depth {
            self.queue_depth = depth;
        }
        if let Some(mode) = cli.counter_mode {
            self.counter_mode = mode;
        }
        if let Some(policy) = cli.unknown_protocol {
            self.unknown_protocol = policy;
        }
        if cli.db_path != "xdpfw.db" {
            self.db_path = cli.db_path.clone();
        }
        if let Some(interval) = cli.snapshot_interval {
            self.snapshot_interval_seconds = interval;
        }
        if cli.quiet {
            self.quiet = true;
        }
        if cli.data_retention.is_some() {
            self.data_retention_seconds = cli.data_retention;
        }
        if !cli.allowed_ips.is_empty() {
            self.allowed_ips = cli.allowed_ips.clone();
        }
    }
}

use clap::Parser;

/// xdpfw: packet classification firewall engine
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// Port to serve the API on.
    #[arg(short, long, default_value_t = 3000)]
    pub port: u16,

    /// Path to YAML config file.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Number of classification workers.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Per-worker queue depth.
    #[arg(long)]
    pub queue_depth: Option<usize>,

    /// Counter bank layout.
    #[arg(long, value_enum)]
    pub counter_mode: Option<CounterMode>,

    /// Verdict for traffic that is not IPv4/IPv6 or not TCP/UDP.
    #[arg(long, value_enum)]
    pub unknown_protocol: Option<UnknownProtocolPolicy>,

    /// SQLite database path.
    #[arg(long, default_value = "xdpfw.db")]
    pub db_path: String,

    /// Seconds between counter snapshots (0 = disabled).
    #[arg(long)]
    pub snapshot_interval: Option<u64>,

    /// Data retention in seconds (delete snapshots older than this).
    #[arg(long)]
    pub data_retention: Option<u64>,

    /// Quiet mode (suppress non-error logs).
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// IP CIDRs allowed to access the API (e.g., 10.0.0.0/8). Repeat for multiple.
    #[arg(long)]
    pub allowed_ips: Vec<String>,

    /// Blacklist a source MAC address (e.g., 00:11:22:33:44:55). Repeat for multiple.
    #[arg(short = 'm', long)]
    pub block_mac: Vec<String>,

    /// Blacklist a source IPv4 prefix (e.g., 10.0.0.0/8).
    #[arg(short = '4', long)]
    pub block_v4: Vec<String>,

    /// Blacklist a source IPv6 prefix (e.g., 2001:db8::/32).
    #[arg(short = '6', long)]
    pub block_v6: Vec<String>,

    /// Blacklist a port as <src|dst>/<tcp|udp>/<port> (e.g., dst/udp/53).
    #[arg(short = 't', long)]
    pub block_port: Vec<String>,
}

impl CliArgs {
    /// Blacklist entries requested on the command line, in flag order per table.
    pub fn seed_mutations(&self) -> Result<Vec<Mutation>, AdminError> {
        let mut seeds = Vec::new();
        for mac in &self.block_mac {
            seeds.push(Mutation::insert(Target::Mac(admin::parse_mac(mac)?)));
        }
        for prefix in &self.block_v4 {
            seeds.push(Mutation::insert(admin::parse_v4_prefix(prefix)?));
        }
        for prefix in &self.block_v6 {
            seeds.push(Mutation::insert(admin::parse_v6_prefix(prefix)?));
        }
        for rule in &self.block_port {
            seeds.push(Mutation::insert(admin::parse_port_rule(rule)?));
        }
        Ok(seeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_defaults() {
        let config = Config::from_yaml("port: 8080\ncounter_mode: atomic\n").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.counter_mode, CounterMode::Atomic);
        assert_eq!(config.unknown_protocol, UnknownProtocolPolicy::Pass);
        assert_eq!(config.queue_depth, 10000);
        assert_eq!(config.capacity, Capacity::default());
    }

    #[test]
    fn test_yaml_capacity_and_policy() {
        let config = Config::from_yaml(
            "unknown_protocol: drop\ncapacity:\n  mac: 16\n  ports: 100\n",
        )
        .unwrap();
        assert_eq!(config.unknown_protocol, UnknownProtocolPolicy::Drop);
        assert_eq!(config.capacity.mac, 16);
        assert_eq!(config.capacity.ports, 100);
        assert_eq!(config.capacity.v4, Capacity::default().v4);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config = Config::from_yaml("port: 8080\nworkers: 2\n").unwrap();
        let cli = CliArgs::parse_from([
            "xdpfw",
            "--workers",
            "6",
            "--counter-mode",
            "atomic",
            "--unknown-protocol",
            "drop",
            "-q",
        ]);
        config.merge_cli(&cli);
        assert_eq!(config.port, 8080);
        assert_eq!(config.workers, 6);
        assert_eq!(config.counter_mode, CounterMode::Atomic);
        assert_eq!(config.unknown_protocol, UnknownProtocolPolicy::Drop);
        assert!(config.quiet);
    }

    #[test]
    fn test_seed_mutations() {
        let cli = CliArgs::parse_from([
            "xdpfw",
            "-m",
            "02:00:00:00:00:01",
            "-4",
            "10.0.0.0/8",
            "--block-port",
            "dst/udp/53",
        ]);
        let seeds = cli.seed_mutations().unwrap();
        assert_eq!(seeds.len(), 3);
        assert!(matches!(seeds[1].target, Target::V4 { prefix_len: 8, .. }));

        let cli = CliArgs::parse_from(["xdpfw", "--block-v6", "not-an-address"]);
        assert!(matches!(cli.seed_mutations(), Err(AdminError::InvalidPrefix(_))));
    }
}
