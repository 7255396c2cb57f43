use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub system: SystemConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub paper_trading: PaperTradingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    pub dry_run: bool,
    pub database_path: String,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_csv_log_path")]
    pub csv_log_path: String,
    #[serde(default = "default_forecast_ttl")]
    pub forecast_cache_ttl_secs: u64,
}

/// Every strategy knob the scan pass recognizes, with documented
/// defaults. Immutable once loaded; no dynamic option bags.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Minimum |edge| to signal. Default 0.10.
    #[serde(default = "default_min_edge")]
    pub min_edge: f64,
    /// Kelly multiplier (0.25 = quarter-Kelly).
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: f64,
    /// Per-position cap as a fraction of the bankroll ceiling. Default 5%.
    #[serde(default = "default_position_cap_pct")]
    pub position_cap_pct: f64,
    /// Bankroll ceiling in dollars; gains above it are not reinvested.
    #[serde(default = "default_max_bankroll")]
    pub max_bankroll: f64,
    /// Daily loss halt as a fraction of the starting bankroll. Default 5%.
    #[serde(default = "default_daily_loss_limit_pct")]
    pub daily_loss_limit_pct: f64,
    /// Manual global override: blocks scanning and execution.
    #[serde(default)]
    pub kill_switch: bool,
    /// Minimum traded volume to consider a market.
    #[serde(default)]
    pub min_volume: f64,
    /// Maximum |1 - (yes + no)| tolerated. Default 0.05.
    #[serde(default = "default_max_spread")]
    pub max_spread: f64,
    /// Skip markets resolving further out than this. Default 7 days.
    #[serde(default = "default_max_horizon")]
    pub max_forecast_horizon_days: i64,
    /// Reject forecasts older than this outright. Default 12 hours.
    #[serde(default = "default_max_forecast_age")]
    pub max_forecast_age_hours: f64,
    /// Most buckets to trade per multi-outcome event. Default 2.
    #[serde(default = "default_max_buckets")]
    pub max_buckets_per_event: usize,
    /// Whether the extreme-value rule overlay runs after the primary pass.
    #[serde(default = "default_true")]
    pub enable_extreme_value_rules: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_edge: default_min_edge(),
            kelly_fraction: default_kelly_fraction(),
            position_cap_pct: default_position_cap_pct(),
            max_bankroll: default_max_bankroll(),
            daily_loss_limit_pct: default_daily_loss_limit_pct(),
            kill_switch: false,
            min_volume: 0.0,
            max_spread: default_max_spread(),
            max_forecast_horizon_days: default_max_horizon(),
            max_forecast_age_hours: default_max_forecast_age(),
            max_buckets_per_event: default_max_buckets(),
            enable_extreme_value_rules: true,
        }
    }
}

impl StrategyConfig {
    /// Validate all trading parameters are within safe ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_bankroll <= 0.0 {
            bail!("max_bankroll must be > 0");
        }
        if !(self.kelly_fraction > 0.0 && self.kelly_fraction <= 1.0) {
            bail!("kelly_fraction must be in (0, 1]");
        }
        if !(self.position_cap_pct > 0.0 && self.position_cap_pct <= 0.2) {
            bail!("position_cap_pct must be in (0, 0.2]");
        }
        if !(self.min_edge > 0.0 && self.min_edge <= 0.5) {
            bail!("min_edge must be in (0, 0.5]");
        }
        if !(self.daily_loss_limit_pct > 0.0 && self.daily_loss_limit_pct <= 1.0) {
            bail!("daily_loss_limit_pct must be in (0, 1]");
        }
        if self.max_forecast_age_hours <= 0.0 {
            bail!("max_forecast_age_hours must be > 0");
        }
        if self.max_buckets_per_event == 0 {
            bail!("max_buckets_per_event must be >= 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperTradingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_fill_rate")]
    pub fill_rate: f64,
    #[serde(default = "default_slippage")]
    pub slippage_pct: f64,
    #[serde(default = "default_balance")]
    pub initial_balance_usd: f64,
}

impl Default for PaperTradingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fill_rate: default_fill_rate(),
            slippage_pct: default_slippage(),
            initial_balance_usd: default_balance(),
        }
    }
}

fn default_scan_interval() -> u64 {
    900
}
fn default_csv_log_path() -> String {
    "trades.csv".to_string()
}
fn default_forecast_ttl() -> u64 {
    1800
}
fn default_min_edge() -> f64 {
    0.10
}
fn default_kelly_fraction() -> f64 {
    0.25
}
fn default_position_cap_pct() -> f64 {
    0.05
}
fn default_max_bankroll() -> f64 {
    500.0
}
fn default_daily_loss_limit_pct() -> f64 {
    0.05
}
fn default_max_spread() -> f64 {
    0.05
}
fn default_max_horizon() -> i64 {
    7
}
fn default_max_forecast_age() -> f64 {
    12.0
}
fn default_max_buckets() -> usize {
    2
}
fn default_true() -> bool {
    true
}
fn default_fill_rate() -> f64 {
    0.70
}
fn default_slippage() -> f64 {
    0.005
}
fn default_balance() -> f64 {
    500.0
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.strategy.validate()?;
        Ok(config)
    }
}

/// Secrets and endpoints from the environment (.env supported).
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub polymarket_gamma_url: String,
    pub noaa_base_url: String,
    pub noaa_user_agent: String,
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            polymarket_gamma_url: std::env::var("POLYMARKET_GAMMA_URL")
                .unwrap_or_else(|_| "https://gamma-api.polymarket.com".to_string()),
            noaa_base_url: std::env::var("NOAA_BASE_URL")
                .unwrap_or_else(|_| "https://api.weather.gov".to_string()),
            noaa_user_agent: std::env::var("NOAA_USER_AGENT")
                .unwrap_or_else(|_| "weathervane/0.1.0 (weather-simulation)".to_string()),
        })
    }
}
