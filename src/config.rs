use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Command-line surface. Settings that can also come from the config file
/// are Option-typed so that only flags actually passed take part in the
/// final merge; a bare invocation leaves TOML and env values alone.
#[derive(Parser, Debug)]
#[command(name = "stagelink-server", version, about = "StageLink presentation relay server")]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "STAGELINK_PORT")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long, env = "STAGELINK_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./stagelink.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "STAGELINK_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,
}

/// Merged runtime settings.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    pub generate_config: bool,

    /// Relay tuning (loaded from [relay] section in TOML)
    #[serde(default)]
    pub relay: Option<RelayConfig>,
}

/// Tuning for the relay core: liveness sweep and pending-delivery retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Interval in seconds between liveness sweep runs (default: 30)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Connections silent for longer than this are evicted (default: 60)
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,

    /// Mailboxes with no enqueue for longer than this are reclaimed (default: 300)
    #[serde(default = "default_mailbox_stale")]
    pub mailbox_stale_secs: u64,

    /// Pending-delivery retention: "unbounded" or "ring"
    #[serde(default = "default_mailbox_policy")]
    pub mailbox_policy: String,

    /// Ring capacity per mailbox when mailbox_policy = "ring" (default: 64)
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            mailbox_stale_secs: 300,
            mailbox_policy: "unbounded".to_string(),
            mailbox_capacity: 64,
        }
    }
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_heartbeat_timeout() -> u64 {
    60
}

fn default_mailbox_stale() -> u64 {
    300
}

fn default_mailbox_policy() -> String {
    "unbounded".to_string()
}

fn default_mailbox_capacity() -> usize {
    64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5050,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            generate_config: false,
            relay: Some(RelayConfig::default()),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (STAGELINK_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> Result<Self, figment::Error> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("STAGELINK_"));

        if let Some(port) = cli.port {
            figment = figment.merge(Serialized::default("port", port));
        }
        if let Some(bind_address) = cli.bind_address {
            figment = figment.merge(Serialized::default("bind_address", bind_address));
        }
        if cli.json_logs {
            figment = figment.merge(Serialized::default("json_logs", true));
        }
        if cli.generate_config {
            figment = figment.merge(Serialized::default("generate_config", true));
        }

        figment.extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# StageLink Presentation Relay Server Configuration
# Place this file at ./stagelink.toml or specify with --config <path>
# All settings can be overridden via environment variables (STAGELINK_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 5050)
# port = 5050

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# ---- Relay Core ----
# [relay]

# Interval in seconds between liveness sweep runs (default: 30)
# sweep_interval_secs = 30

# Connections with no heartbeat for this many seconds are force-closed
# and removed (default: 60)
# heartbeat_timeout_secs = 60

# Pending-delivery mailboxes with no new entries for this many seconds
# are reclaimed without delivery (default: 300)
# mailbox_stale_secs = 300

# Retention policy for updates queued while a display is unreachable:
# "unbounded" keeps every intermediate update (default);
# "ring" keeps only the last mailbox_capacity updates.
# mailbox_policy = "unbounded"

# Ring capacity per mailbox when mailbox_policy = "ring" (default: 64)
# mailbox_capacity = 64
"#
    .to_string()
}
