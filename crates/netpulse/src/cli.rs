//! Clap derive structures for the `netpulse` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// netpulse -- device liveness and service discovery
#[derive(Debug, Parser)]
#[command(
    name = "netpulse",
    version,
    about = "Watch device liveness and discover network services",
    long_about = "Probe hosts with layered reachability checks, sweep the local /24\n\
        for an RTSP camera, and stream status changes as JSON lines.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'C', env = "NETPULSE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format (overrides `defaults.output`)
    #[arg(long, short = 'o', env = "NETPULSE_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output (overrides `defaults.color`)
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check whether hosts are reachable right now
    #[command(alias = "p")]
    Probe(ProbeArgs),

    /// Sweep a subnet for the RTSP device
    #[command(alias = "scan")]
    Discover(DiscoverArgs),

    /// Monitor targets and print every status push as a JSON line
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Probe ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Addresses to probe
    #[arg(required = true, value_name = "ADDR")]
    pub addresses: Vec<IpAddr>,

    /// Use the short recovery-check budget
    #[arg(long)]
    pub fast: bool,

    /// Skip the echo request, go straight to TCP
    #[arg(long)]
    pub no_icmp: bool,

    /// TCP fallback ports (overrides `probe.fallback_ports`)
    #[arg(long = "port", short = 'P', value_name = "PORT", value_delimiter = ',')]
    pub ports: Vec<u16>,
}

// ── Discover ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Subnet to sweep: 192.168.1, 192.168.1. or 192.168.1.0/24
    #[arg(long, short = 's')]
    pub subnet: Option<String>,

    /// Service port (overrides `scan.port`)
    #[arg(long, short = 'P')]
    pub port: Option<u16>,

    /// Concurrent connection attempts (overrides `scan.workers`)
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Addresses to watch
    #[arg(value_name = "ADDR")]
    pub addresses: Vec<IpAddr>,

    /// Also receive every status event plus the combined system status
    #[arg(long, short = 'a')]
    pub all: bool,

    /// Host shown in the combined system status (implies --all)
    #[arg(long, value_name = "ADDR")]
    pub pin: Option<IpAddr>,

    /// Known camera address; skips discovery (overrides `camera.address`)
    #[arg(long, value_name = "ADDR")]
    pub camera: Option<IpAddr>,

    /// Disable the periodic camera discovery
    #[arg(long)]
    pub no_discovery: bool,

    /// Stop after this long (e.g. 30s, 5m); default runs until Ctrl-C
    #[arg(long = "for", value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Show the effective configuration (file + environment)
    Show,

    /// Write a config file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(long, short = 'f')]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
