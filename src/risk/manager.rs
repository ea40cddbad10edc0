//! Risk manager: the single owner of capital and trade statistics

use super::correlation::{self, CorrelationCheck};
use super::kelly::{KellyCalculator, TradeSample};
use super::limits::{CapitalLedger, RiskLimits};
use super::sizing::{quantity_for, FixedFractionalSizer, PositionSizer, StreakReduction};
use super::types::{RiskError, RiskStats, TradeRecord};
use crate::circuit::CircuitBreaker;
use crate::config::RiskConfig;
use crate::signal::Direction;
use crate::telemetry::{self, GaugeMetric};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

struct RiskState {
    ledger: CapitalLedger,
    /// Set by a halting limit breach, cleared only by `resume`
    halted: Option<String>,
    consecutive_losses: u32,
    open: HashMap<Uuid, TradeRecord>,
    history: Vec<TradeRecord>,
    wins: usize,
    losses: usize,
    win_pct_sum: Decimal,
    loss_pct_sum: Decimal,
}

impl RiskState {
    fn sample(&self) -> TradeSample {
        let avg = |sum: Decimal, n: usize| {
            if n == 0 {
                Decimal::ZERO
            } else {
                sum / Decimal::from(n as u64)
            }
        };
        TradeSample {
            wins: self.wins,
            losses: self.losses,
            avg_win_pct: avg(self.win_pct_sum, self.wins),
            avg_loss_pct: avg(self.loss_pct_sum, self.losses),
        }
    }
}

/// Sizes positions, computes protective levels and enforces
/// capital-preservation limits.
pub struct RiskManager {
    config: RiskConfig,
    limits: RiskLimits,
    fixed: FixedFractionalSizer,
    kelly: Option<KellyCalculator>,
    reduction: StreakReduction,
    circuit: Arc<CircuitBreaker>,
    state: Mutex<RiskState>,
}

impl RiskManager {
    pub fn new(config: RiskConfig, circuit: Arc<CircuitBreaker>) -> Self {
        Self::starting_at(config, circuit, Utc::now())
    }

    /// Create with the daily counters anchored at `now`
    pub fn starting_at(config: RiskConfig, circuit: Arc<CircuitBreaker>, now: DateTime<Utc>) -> Self {
        let limits = RiskLimits {
            max_daily_loss_pct: config.max_daily_loss_pct,
            max_drawdown_pct: config.max_drawdown_pct,
            max_concurrent_positions: config.max_concurrent_positions,
        };
        let kelly = config.kelly_enabled.then(|| {
            KellyCalculator::new(
                config.kelly_fraction,
                config.kelly_max_pct,
                config.kelly_min_trades,
            )
        });
        let state = RiskState {
            ledger: CapitalLedger::new(config.initial_capital, now),
            halted: None,
            consecutive_losses: 0,
            open: HashMap::new(),
            history: Vec::new(),
            wins: 0,
            losses: 0,
            win_pct_sum: Decimal::ZERO,
            loss_pct_sum: Decimal::ZERO,
        };

        Self {
            fixed: FixedFractionalSizer::new(config.max_position_pct),
            reduction: StreakReduction {
                threshold: config.consecutive_loss_threshold,
                factor: config.loss_reduce_factor,
            },
            limits,
            kelly,
            circuit,
            config,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RiskState> {
        self.state.lock().expect("risk state lock poisoned")
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn circuit(&self) -> &Arc<CircuitBreaker> {
        &self.circuit
    }

    /// May a new position be opened?
    pub fn can_trade(&self) -> Result<(), RiskError> {
        self.can_trade_at(Utc::now())
    }

    pub fn can_trade_at(&self, now: DateTime<Utc>) -> Result<(), RiskError> {
        self.circuit
            .check_at(now)
            .map_err(|halt| RiskError::CircuitOpen(halt.to_string()))?;

        let mut state = self.lock();
        state.ledger.roll_day(now);

        if let Some(reason) = &state.halted {
            return Err(RiskError::TradingHalted(reason.clone()));
        }

        if let Err(breach) = self.limits.check_halting(&state.ledger) {
            tracing::warn!(reason = %breach, "Risk limit breached, halting trading");
            state.halted = Some(breach.to_string());
            return Err(breach);
        }

        self.limits.check_capacity(state.open.len())
    }

    /// Quantity for a new position. Zero means "do not open".
    pub fn size_position(&self, entry_price: Decimal, stop_loss: Decimal) -> Decimal {
        let state = self.lock();
        let sample = state.sample();

        let (pct, mode) = match self.kelly.as_ref().and_then(|k| {
            k.capital_pct(&sample).map(|pct| (pct, k.mode_name()))
        }) {
            Some(sized) => sized,
            None => (
                self.fixed.capital_pct(&sample).unwrap_or(Decimal::ZERO),
                self.fixed.mode_name(),
            ),
        };
        let pct = self.reduction.apply(pct, state.consecutive_losses);
        let quantity = quantity_for(state.ledger.capital, pct, entry_price, stop_loss);

        tracing::debug!(
            mode,
            pct = %pct,
            capital = %state.ledger.capital,
            consecutive_losses = state.consecutive_losses,
            quantity = %quantity,
            "Sized position"
        );

        quantity
    }

    /// Stop price `max(atr·multiplier, entry·min_stop_pct)` away from entry
    pub fn compute_stop_loss(&self, entry: Decimal, atr: Decimal, direction: Direction) -> Decimal {
        let distance = (atr * self.config.atr_stop_multiplier)
            .max(entry * self.config.min_stop_pct);
        entry - distance * direction.sign()
    }

    /// Target price at `risk·min_reward_risk`, clamped to the configured
    /// distance band
    pub fn compute_take_profit(
        &self,
        entry: Decimal,
        stop_loss: Decimal,
        direction: Direction,
    ) -> Decimal {
        let risk = (entry - stop_loss).abs();
        let reward = (risk * self.config.min_reward_risk)
            .max(entry * self.config.min_target_pct)
            .min(entry * self.config.max_target_pct);
        entry + reward * direction.sign()
    }

    /// Return correlation of a candidate against the open symbols
    pub fn check_correlation(
        &self,
        candidate: &str,
        open_symbols: &[String],
        histories: &HashMap<String, Vec<Decimal>>,
    ) -> CorrelationCheck {
        if !self.config.correlation_enabled {
            return CorrelationCheck::allow_all();
        }
        let ceiling = self.config.max_correlation.to_f64().unwrap_or(1.0);
        let check = correlation::check_correlation(
            candidate,
            open_symbols,
            histories,
            ceiling,
            self.config.correlation_min_samples,
        );
        if !check.allowed {
            tracing::info!(
                symbol = candidate,
                against = ?check.against,
                correlation = check.max_correlation,
                "Correlation too high"
            );
        }
        check
    }

    /// Per-leg cost rate: taker fee plus slippage
    pub fn fee_rate(&self) -> Decimal {
        self.config.taker_fee + self.config.slippage
    }

    /// Cost of one leg
    pub fn fee(&self, quantity: Decimal, price: Decimal) -> Decimal {
        quantity * price * self.fee_rate()
    }

    /// Track a newly opened position's record
    pub fn register_open(&self, record: TradeRecord) {
        let mut state = self.lock();
        state.open.insert(record.id, record);
        telemetry::set_gauge(GaugeMetric::OpenPositions, state.open.len() as f64);
    }

    /// Book a closed (or partially closed) trade. The only place capital
    /// changes.
    pub fn record_trade(&self, record: TradeRecord) {
        let closed_at = record.closed_at.unwrap_or_else(Utc::now);
        let outcome = {
            let mut state = self.lock();
            state.ledger.apply(record.net_pnl, record.fees, closed_at);

            let outcome = if record.is_partial {
                None
            } else {
                state.open.remove(&record.id);
                if record.is_win() {
                    state.consecutive_losses = 0;
                    state.wins += 1;
                    state.win_pct_sum += record.pnl_pct;
                } else {
                    state.consecutive_losses += 1;
                    state.losses += 1;
                    state.loss_pct_sum += record.pnl_pct.abs();
                }
                Some(record.pnl_pct)
            };

            tracing::info!(
                symbol = %record.symbol,
                net_pnl = %record.net_pnl,
                pnl_pct = %record.pnl_pct,
                partial = record.is_partial,
                capital = %state.ledger.capital,
                consecutive_losses = state.consecutive_losses,
                "Trade recorded"
            );

            Self::publish(&state);
            state.history.push(record);
            outcome
        };

        if let Some(pnl_pct) = outcome {
            self.circuit.record_outcome_at(pnl_pct, closed_at);
        }
    }

    fn publish(state: &RiskState) {
        let ledger = &state.ledger;
        let f = |d: Decimal| d.to_f64().unwrap_or_default();
        telemetry::set_gauge(GaugeMetric::Equity, f(ledger.capital));
        telemetry::set_gauge(GaugeMetric::RealizedPnl, f(ledger.total_pnl));
        telemetry::set_gauge(GaugeMetric::DailyPnl, f(ledger.daily_pnl));
        telemetry::set_gauge(GaugeMetric::DrawdownPct, f(ledger.drawdown()));
        telemetry::set_gauge(GaugeMetric::OpenPositions, state.open.len() as f64);
        telemetry::set_gauge(
            GaugeMetric::ConsecutiveLosses,
            state.consecutive_losses as f64,
        );
    }

    /// Clear the halted flag after a limit breach
    pub fn resume(&self) {
        let mut state = self.lock();
        if let Some(reason) = state.halted.take() {
            tracing::info!(previous = %reason, "Risk halt cleared");
        }
    }

    pub fn is_halted(&self) -> bool {
        self.lock().halted.is_some()
    }

    pub fn capital(&self) -> Decimal {
        self.lock().ledger.capital
    }

    pub fn open_count(&self) -> usize {
        self.lock().open.len()
    }

    /// Closed trades in booking order, partial fills included
    pub fn history(&self) -> Vec<TradeRecord> {
        self.lock().history.clone()
    }

    pub fn trade_sample(&self) -> TradeSample {
        self.lock().sample()
    }

    pub fn stats(&self) -> RiskStats {
        let state = self.lock();
        let sample = state.sample();
        let ledger = &state.ledger;

        RiskStats {
            initial_capital: ledger.initial,
            capital: ledger.capital,
            peak_capital: ledger.peak,
            roi: ledger.roi(),
            total_pnl: ledger.total_pnl,
            daily_pnl: ledger.daily_pnl,
            total_fees: ledger.total_fees,
            total_trades: sample.total(),
            wins: sample.wins,
            losses: sample.losses,
            win_rate: sample.win_rate(),
            avg_win_pct: sample.avg_win_pct,
            avg_loss_pct: sample.avg_loss_pct,
            drawdown: ledger.drawdown(),
            consecutive_losses: state.consecutive_losses,
            open_trades: state.open.len(),
            halted: state.halted.is_some(),
        }
    }
}
