//! Configuration parameters for the gaswatch dashboard
use clap::{Parser, ValueEnum};
use eyre::{Result, bail};
use std::{path::PathBuf, time::Duration};
use url::Url;

/// How often the UI loop wakes up to drain fetch results, draw and read input
pub const UI_TICK: Duration = Duration::from_millis(100);

pub const DEFAULT_REFRESH_MS: u64 = 2_000;
pub const MIN_REFRESH_MS: u64 = 250;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

// ========================= SAMPLING CONFIG =========================
/// Transaction windows the sampling strategy may request
pub const TX_WINDOWS: [usize; 4] = [5, 10, 25, 50];
pub const DEFAULT_TX_WINDOW: usize = 25;

// ========================= CHART CONFIG =========================
/// Points kept by the chart series before the oldest are dropped
pub const CHART_HISTORY: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    Development,
    Production,
}

impl RunMode {
    /// Filter directive used when RUST_LOG is not set.
    pub fn default_directive(&self) -> &'static str {
        match self {
            RunMode::Development => "info,gaswatch=debug",
            RunMode::Production => "warn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Strategy {
    /// Ask the node for its own gas estimate
    Direct,
    /// Aggregate gas unit prices over the most recent transactions
    Transactions,
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct estimate",
            Strategy::Transactions => "recent transactions",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Strategy::Direct => Strategy::Transactions,
            Strategy::Transactions => Strategy::Direct,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "gaswatch", version, about = "Live gas price dashboard for a node REST API")]
pub struct Config {
    /// Base URL of the node REST API, e.g. https://fullnode.mainnet.aptoslabs.com/v1
    #[arg(long, env = "GAS_RPC_URL")]
    pub rpc_url: Url,

    /// `development` turns on debug diagnostics in the log file
    #[arg(long, env = "RUN_MODE", value_enum, default_value_t = RunMode::Production)]
    pub mode: RunMode,

    #[arg(long, env = "GAS_STRATEGY", value_enum, default_value_t = Strategy::Direct)]
    pub strategy: Strategy,

    /// Number of recent transactions sampled by the `transactions` strategy
    #[arg(long, env = "GAS_TX_WINDOW", default_value_t = DEFAULT_TX_WINDOW, value_parser = parse_window)]
    pub window: usize,

    #[arg(
        long = "interval-ms",
        env = "GAS_REFRESH_MS",
        default_value_t = DEFAULT_REFRESH_MS,
        value_parser = clap::value_parser!(u64).range(MIN_REFRESH_MS..)
    )]
    pub interval_ms: u64,

    #[arg(long, env = "GAS_HTTP_TIMEOUT_SECS", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Diagnostics go to a file because the terminal belongs to the dashboard
    #[arg(long, env = "GAS_LOG_FILE", default_value = "gaswatch.log")]
    pub log_file: PathBuf,
}

impl Config {
    /// Reads `.env` (if any), then CLI arguments with environment fallbacks.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if !matches!(self.rpc_url.scheme(), "http" | "https") {
            bail!("GAS_RPC_URL must be an HTTP(S) URL, got {}", self.rpc_url);
        }
        if self.timeout_secs == 0 {
            bail!("GAS_HTTP_TIMEOUT_SECS must be at least 1");
        }
        Ok(())
    }
}

fn parse_window(raw: &str) -> std::result::Result<usize, String> {
    let window: usize = raw
        .trim()
        .parse()
        .map_err(|_| format!("`{raw}` is not a number"))?;
    if TX_WINDOWS.contains(&window) {
        Ok(window)
    } else {
        Err(format!("window must be one of {TX_WINDOWS:?}"))
    }
}
