//! Configuration types for confluence

use crate::signal::{
    FilterConfig, NewsCalendar, ProviderWeights, RegimeThresholds, ScheduledEvent, Thresholds,
};
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Root configuration structure. Every section has defaults, so an empty
/// file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub regime: RegimeThresholds,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub position: PositionConfig,
    #[serde(default)]
    pub circuit: CircuitConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Configuration errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Buy threshold must sit above sell threshold, both inside [0, 1]
    #[error("Invalid thresholds: buy {buy}, sell {sell}")]
    InvalidThresholds { buy: Decimal, sell: Decimal },
    /// Negative weight or zero total
    #[error("Invalid provider weights: {0}")]
    InvalidWeights(String),
    /// A fraction outside its allowed range
    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: Decimal,
        min: Decimal,
        max: Decimal,
    },
    /// A count or interval that must be non-zero
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    /// Nothing to trade
    #[error("No symbols configured")]
    NoSymbols,
}

/// Decision engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Composite score at or above which a long is considered
    #[serde(default = "default_buy_threshold")]
    pub buy_threshold: Decimal,

    /// Composite score at or below which a short is considered
    #[serde(default = "default_sell_threshold")]
    pub sell_threshold: Decimal,

    /// Providers that must agree on the direction
    #[serde(default = "default_min_agreeing")]
    pub min_agreeing: usize,

    /// Static per-provider weights
    #[serde(default)]
    pub weights: ProviderWeights,
}

fn default_buy_threshold() -> Decimal {
    dec!(0.60)
}
fn default_sell_threshold() -> Decimal {
    dec!(0.40)
}
fn default_min_agreeing() -> usize {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buy_threshold: default_buy_threshold(),
            sell_threshold: default_sell_threshold(),
            min_agreeing: default_min_agreeing(),
            weights: ProviderWeights::default(),
        }
    }
}

impl EngineConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            buy: self.buy_threshold,
            sell: self.sell_threshold,
            min_agreeing: self.min_agreeing,
        }
    }
}

/// Scheduled-event blackout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    /// Minutes before a high-impact event to stop trading
    #[serde(default = "default_blackout_mins")]
    pub blackout_before_mins: i64,

    /// Minutes after a high-impact event to stay out
    #[serde(default = "default_blackout_mins")]
    pub blackout_after_mins: i64,

    /// Known events
    #[serde(default)]
    pub events: Vec<ScheduledEvent>,
}

fn default_blackout_mins() -> i64 {
    30
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            blackout_before_mins: 30,
            blackout_after_mins: 30,
            events: vec![],
        }
    }
}

impl NewsConfig {
    pub fn calendar(&self) -> NewsCalendar {
        NewsCalendar::new(
            self.events.clone(),
            Duration::minutes(self.blackout_before_mins),
            Duration::minutes(self.blackout_after_mins),
        )
    }
}

/// Risk management configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Starting capital
    pub initial_capital: Decimal,
    /// Capital fraction committed per position
    pub max_position_pct: Decimal,
    /// Minimum stop distance as a fraction of entry
    pub min_stop_pct: Decimal,
    /// Stop distance in ATRs
    pub atr_stop_multiplier: Decimal,
    /// Target reward per unit of risk
    pub min_reward_risk: Decimal,
    /// Target distance floor as a fraction of entry
    pub min_target_pct: Decimal,
    /// Target distance cap as a fraction of entry
    pub max_target_pct: Decimal,
    /// Halt once the day's loss reaches this fraction of capital
    pub max_daily_loss_pct: Decimal,
    /// Halt once drawdown from peak reaches this fraction
    pub max_drawdown_pct: Decimal,
    pub max_concurrent_positions: usize,
    /// Losing streak after which size is reduced
    pub consecutive_loss_threshold: u32,
    /// Multiplier applied to size during a losing streak
    pub loss_reduce_factor: Decimal,
    pub taker_fee: Decimal,
    pub maker_fee: Decimal,
    /// Per-leg slippage estimate
    pub slippage: Decimal,
    /// Replace fixed-fractional sizing with Kelly once enough trades exist
    pub kelly_enabled: bool,
    /// Fraction of full Kelly to use (0.5 = half Kelly)
    pub kelly_fraction: Decimal,
    /// Kelly sizing cap as a fraction of capital
    pub kelly_max_pct: Decimal,
    /// Closed trades needed before Kelly applies
    pub kelly_min_trades: usize,
    pub correlation_enabled: bool,
    /// Reject a candidate correlated above this with any open position
    pub max_correlation: Decimal,
    /// Minimum overlapping returns for a correlation to count
    pub correlation_min_samples: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            initial_capital: dec!(1000),
            max_position_pct: dec!(0.05), // 5%
            min_stop_pct: dec!(0.012), // 1.2%
            atr_stop_multiplier: dec!(1.5), // 1.5 ATR
            min_reward_risk: dec!(3),
            min_target_pct: dec!(0.04), // 4%
            max_target_pct: dec!(0.08), // 8%
            max_daily_loss_pct: dec!(0.03),
            max_drawdown_pct: dec!(0.15),
            max_concurrent_positions: 5,
            consecutive_loss_threshold: 3,
            loss_reduce_factor: dec!(0.5),
            taker_fee: dec!(0.001), // 0.1%
            maker_fee: dec!(0.001),
            slippage: dec!(0.0005), // 0.05%
            kelly_enabled: true,
            kelly_fraction: dec!(0.5),
            kelly_max_pct: dec!(0.10),
            kelly_min_trades: 20,
            correlation_enabled: true,
            max_correlation: dec!(0.75),
            correlation_min_samples: 10,
        }
    }
}

/// Position lifecycle configuration
/// Hard ceiling on additions to one position
pub const MAX_SCALE_INS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    /// Trailing distance from the best price, as a fraction
    pub trailing_stop_pct: Decimal,
    pub partial_tp_enabled: bool,
    /// Fraction of quantity closed at the partial target
    pub partial_tp_ratio: Decimal,
    /// Partial target distance in multiples of initial risk
    pub partial_tp_multiplier: Decimal,
    /// Move the stop to entry after the partial fill
    pub breakeven_after_partial: bool,
    pub pyramiding_enabled: bool,
    /// At most [`MAX_SCALE_INS`]
    pub max_scale_ins: u32,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            trailing_stop_pct: dec!(0.02),
            partial_tp_enabled: true,
            partial_tp_ratio: dec!(0.5),
            partial_tp_multiplier: dec!(1.5),
            breakeven_after_partial: true,
            pyramiding_enabled: false,
            max_scale_ins: 3,
        }
    }
}

/// One rung of the consecutive-loss ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossStep {
    /// Consecutive losses that trigger this rung
    pub losses: u32,
    /// Halt length in minutes
    pub cooldown_mins: i64,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Escalating halts for losing streaks
    pub loss_ladder: Vec<LossStep>,
    /// Realized loss over the last hour that trips the breaker, as a fraction
    pub hourly_loss_limit: Decimal,
    pub hourly_cooldown_mins: i64,
    /// Realized loss over the last 24 hours that trips the breaker
    pub daily_loss_limit: Decimal,
    pub daily_cooldown_mins: i64,
    /// Benchmark change at or below which all trading halts (negative)
    pub market_dump_pct: Decimal,
    pub market_dump_cooldown_mins: i64,
    /// Widest spread accepted before opening, as a fraction
    pub max_spread_pct: Decimal,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            loss_ladder: vec![
                LossStep {
                    losses: 3,
                    cooldown_mins: 60,
                },
                LossStep {
                    losses: 5,
                    cooldown_mins: 240,
                },
                LossStep {
                    losses: 7,
                    cooldown_mins: 1440,
                },
            ],
            hourly_loss_limit: dec!(0.03),
            hourly_cooldown_mins: 60,
            daily_loss_limit: dec!(0.06),
            daily_cooldown_mins: 1440,
            market_dump_pct: dec!(-0.05),
            market_dump_cooldown_mins: 120,
            max_spread_pct: dec!(0.001),
        }
    }
}

/// Runtime loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Symbols scanned every cycle
    pub symbols: Vec<String>,
    /// Market-wide reference asset
    pub benchmark_symbol: String,
    /// Timeframe fed to providers
    pub primary_timeframe: String,
    /// Timeframe for the trend filter and correlation
    pub trend_timeframe: String,
    pub candle_limit: usize,
    /// Decline to evaluate with fewer primary candles
    pub min_candles: usize,
    /// Decline to act on candles or tickers older than this
    pub max_data_age_secs: u64,
    pub atr_period: usize,
    /// Trend-timeframe candles used for correlation
    pub correlation_lookback: usize,
    pub scan_interval_secs: u64,
    pub monitor_interval_secs: u64,
    pub report_interval_secs: u64,
    /// Hard limit on draining open positions at shutdown
    pub shutdown_timeout_secs: u64,
    /// Reject short decisions
    pub spot_only: bool,
    /// Verify price before opening
    pub verify_prices: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "XRPUSDT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            benchmark_symbol: "BTCUSDT".to_string(),
            primary_timeframe: "15m".to_string(),
            trend_timeframe: "1h".to_string(),
            candle_limit: 200,
            min_candles: 60,
            max_data_age_secs: 1800,
            atr_period: 14,
            correlation_lookback: 24,
            scan_interval_secs: 10,
            monitor_interval_secs: 2,
            report_interval_secs: 900,
            shutdown_timeout_secs: 60,
            spot_only: false,
            verify_prices: true,
        }
    }
}

/// Trade journal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub enabled: bool,
    pub output_dir: PathBuf,
    /// New file every this many seconds
    pub rotation_interval_secs: u64,
    /// Records buffered before a flush
    pub buffer_size: usize,
    /// Maximum time between flushes
    pub flush_interval_secs: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: PathBuf::from("./journal"),
            rotation_interval_secs: 3600,
            buffer_size: 100,
            flush_interval_secs: 60,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Emit JSON log lines
    pub json_logs: bool,
    /// Serve Prometheus metrics on this port
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_port: None,
        }
    }
}

fn check_fraction(
    field: &'static str,
    value: Decimal,
    min: Decimal,
    max: Decimal,
) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run safely with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = Decimal::ZERO;
        let one = Decimal::ONE;

        let e = &self.engine;
        if e.buy_threshold <= e.sell_threshold
            || e.buy_threshold > one
            || e.sell_threshold < zero
        {
            return Err(ConfigError::InvalidThresholds {
                buy: e.buy_threshold,
                sell: e.sell_threshold,
            });
        }
        if e.min_agreeing == 0 {
            return Err(ConfigError::Zero("engine.min_agreeing"));
        }
        if let Some(id) = crate::signal::ProviderId::ALL
            .iter()
            .find(|id| e.weights.get(**id) < zero)
        {
            return Err(ConfigError::InvalidWeights(format!("{} is negative", id)));
        }
        if e.weights.total().is_zero() {
            return Err(ConfigError::InvalidWeights("all weights are zero".to_string()));
        }

        let r = &self.risk;
        if r.initial_capital <= zero {
            return Err(ConfigError::Zero("risk.initial_capital"));
        }
        check_fraction("risk.max_position_pct", r.max_position_pct, zero, one)?;
        check_fraction("risk.min_stop_pct", r.min_stop_pct, zero, one)?;
        check_fraction("risk.max_daily_loss_pct", r.max_daily_loss_pct, zero, one)?;
        check_fraction("risk.max_drawdown_pct", r.max_drawdown_pct, zero, one)?;
        check_fraction("risk.loss_reduce_factor", r.loss_reduce_factor, zero, one)?;
        check_fraction("risk.kelly_fraction", r.kelly_fraction, zero, one)?;
        check_fraction("risk.kelly_max_pct", r.kelly_max_pct, zero, one)?;
        check_fraction("risk.max_correlation", r.max_correlation, zero, one)?;
        check_fraction("risk.max_target_pct", r.max_target_pct, r.min_target_pct, one)?;
        if r.max_concurrent_positions == 0 {
            return Err(ConfigError::Zero("risk.max_concurrent_positions"));
        }

        let p = &self.position;
        check_fraction("position.trailing_stop_pct", p.trailing_stop_pct, zero, one)?;
        check_fraction("position.partial_tp_ratio", p.partial_tp_ratio, zero, one)?;
        check_fraction(
            "position.max_scale_ins",
            Decimal::from(p.max_scale_ins),
            zero,
            Decimal::from(MAX_SCALE_INS),
        )?;

        let c = &self.circuit;
        if c.loss_ladder.iter().any(|step| step.losses == 0) {
            return Err(ConfigError::Zero("circuit.loss_ladder.losses"));
        }
        check_fraction("circuit.market_dump_pct", c.market_dump_pct, -one, zero)?;

        let rt = &self.runtime;
        if rt.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        if rt.max_data_age_secs == 0 {
            return Err(ConfigError::Zero("runtime.max_data_age_secs"));
        }
        if rt.scan_interval_secs == 0 {
            return Err(ConfigError::Zero("runtime.scan_interval_secs"));
        }
        if rt.monitor_interval_secs == 0 {
            return Err(ConfigError::Zero("runtime.monitor_interval_secs"));
        }
        if rt.report_interval_secs == 0 {
            return Err(ConfigError::Zero("runtime.report_interval_secs"));
        }

        Ok(())
    }
}
