//! Circuit breaker implementation

use super::types::{CircuitHalt, CircuitState, CircuitStatus, TripReason};
use crate::config::{CircuitConfig, LossStep};
use crate::telemetry::{self, CounterMetric};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

struct Inner {
    state: CircuitState,
    /// (time, loss fraction) for losing outcomes in the last 24 hours
    losses: VecDeque<(DateTime<Utc>, Decimal)>,
}

/// Circuit breaker that halts trading after adverse outcomes or conditions.
///
/// `CLOSED ⇄ OPEN` with a cooldown, plus three orthogonal halt flags that
/// block trading regardless of the automatic state.
pub struct CircuitBreaker {
    config: CircuitConfig,
    /// Ladder sorted by descending loss count
    ladder: Vec<LossStep>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitConfig) -> Self {
        let mut ladder = config.loss_ladder.clone();
        ladder.sort_by(|a, b| b.losses.cmp(&a.losses));
        Self {
            config,
            ladder,
            inner: Mutex::new(Inner {
                state: CircuitState::default(),
                losses: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("circuit breaker lock poisoned")
    }

    /// Can new decisions be acted on?
    pub fn check(&self) -> Result<(), CircuitHalt> {
        self.check_at(Utc::now())
    }

    pub fn check_at(&self, now: DateTime<Utc>) -> Result<(), CircuitHalt> {
        let mut inner = self.lock();
        Self::evaluate(&mut inner.state, now)
    }

    fn evaluate(state: &mut CircuitState, now: DateTime<Utc>) -> Result<(), CircuitHalt> {
        if state.manual_halt {
            return Err(CircuitHalt::Manual);
        }
        if let Some(event) = &state.news_halt {
            return Err(CircuitHalt::News(event.clone()));
        }
        if let Some(reason) = &state.volatility_halt {
            return Err(CircuitHalt::Volatility(reason.clone()));
        }
        if state.open {
            let remaining = state.remaining(now);
            if remaining > Duration::zero() {
                return Err(CircuitHalt::Tripped {
                    reason: state
                        .trigger_reason
                        .clone()
                        .expect("open circuit without a trigger reason"),
                    remaining_mins: (remaining.num_seconds() + 59) / 60,
                });
            }
            Self::close(state, "cooldown elapsed");
        }
        Ok(())
    }

    /// Record a closed trade's pnl fraction
    pub fn record_outcome(&self, pnl_pct: Decimal) {
        self.record_outcome_at(pnl_pct, Utc::now())
    }

    pub fn record_outcome_at(&self, pnl_pct: Decimal, now: DateTime<Utc>) {
        let mut inner = self.lock();

        if pnl_pct < Decimal::ZERO {
            inner.state.consecutive_losses += 1;
            inner.losses.push_back((now, pnl_pct.abs()));
        } else {
            inner.state.consecutive_losses = 0;
        }
        Self::prune(&mut inner.losses, now);

        let streak = inner.state.consecutive_losses;
        if let Some(step) = self.ladder.iter().find(|s| streak >= s.losses) {
            Self::trip(
                &mut inner.state,
                TripReason::ConsecutiveLosses { count: streak },
                Duration::minutes(step.cooldown_mins),
                now,
            );
            return;
        }

        let (hourly, daily) = Self::window_sums(&inner.losses, now);
        if hourly > self.config.hourly_loss_limit {
            Self::trip(
                &mut inner.state,
                TripReason::HourlyLoss { loss: hourly },
                Duration::minutes(self.config.hourly_cooldown_mins),
                now,
            );
            return;
        }
        if daily > self.config.daily_loss_limit {
            Self::trip(
                &mut inner.state,
                TripReason::DailyLoss { loss: daily },
                Duration::minutes(self.config.daily_cooldown_mins),
                now,
            );
        }
    }

    /// Trip on a benchmark drop at or beyond the dump threshold. Returns true
    /// if the drop qualified.
    pub fn check_market_wide_dump(&self, benchmark_change_pct: Decimal) -> bool {
        self.check_market_wide_dump_at(benchmark_change_pct, Utc::now())
    }

    pub fn check_market_wide_dump_at(&self, benchmark_change_pct: Decimal, now: DateTime<Utc>) -> bool {
        if benchmark_change_pct > self.config.market_dump_pct {
            return false;
        }
        let mut inner = self.lock();
        tracing::warn!(change = %benchmark_change_pct, "Market-wide dump detected");
        Self::trip(
            &mut inner.state,
            TripReason::MarketDump {
                change: benchmark_change_pct,
            },
            Duration::minutes(self.config.market_dump_cooldown_mins),
            now,
        );
        true
    }

    /// Per-symbol spread sanity. Does not trip.
    pub fn check_spread(&self, symbol: &str, spread_pct: Decimal) -> bool {
        if spread_pct > self.config.max_spread_pct {
            tracing::warn!(
                symbol,
                spread = %spread_pct,
                max = %self.config.max_spread_pct,
                "Abnormal spread"
            );
            return false;
        }
        true
    }

    pub fn set_news_halt(&self, active: bool, event: &str) {
        let mut inner = self.lock();
        let was_active = inner.state.news_halt.is_some();
        inner.state.news_halt = active.then(|| event.to_string());
        if active && !was_active {
            tracing::info!(event, "News halt active");
        } else if !active && was_active {
            tracing::info!("News halt lifted");
        }
    }

    pub fn set_volatility_halt(&self, active: bool, reason: &str) {
        let mut inner = self.lock();
        inner.state.volatility_halt = active.then(|| reason.to_string());
        if active {
            tracing::warn!(reason, "Volatility halt");
        }
    }

    /// Operator halt, independent of automatic state
    pub fn manual_stop(&self, reason: &str) {
        let mut inner = self.lock();
        inner.state.manual_halt = true;
        tracing::warn!(reason, "Manual halt");
    }

    /// Operator resume. Also clears the losing streak and any automatic trip.
    pub fn manual_resume(&self) {
        let mut inner = self.lock();
        inner.state.manual_halt = false;
        inner.state.consecutive_losses = 0;
        Self::close(&mut inner.state, "manual resume");
        tracing::info!("Trading resumed manually");
    }

    /// Copy of the raw state
    pub fn state(&self) -> CircuitState {
        self.lock().state.clone()
    }

    pub fn status(&self) -> CircuitStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> CircuitStatus {
        let mut inner = self.lock();
        let verdict = Self::evaluate(&mut inner.state, now);
        Self::prune(&mut inner.losses, now);
        let (hourly, daily) = Self::window_sums(&inner.losses, now);
        let state = &inner.state;

        CircuitStatus {
            can_trade: verdict.is_ok(),
            reason: verdict.err().map(|e| e.to_string()),
            open: state.open,
            trigger_reason: state.trigger_reason.clone(),
            triggered_at: state.triggered_at,
            cooldown_mins: state.cooldown.map(|c| c.num_minutes()),
            remaining_mins: state.remaining(now).num_minutes(),
            consecutive_losses: state.consecutive_losses,
            manual_halt: state.manual_halt,
            news_halt: state.news_halt.is_some(),
            volatility_halt: state.volatility_halt.is_some(),
            total_trips: state.total_trips,
            hourly_loss: hourly,
            daily_loss: daily,
        }
    }

    /// Open the circuit. A no-op while already open: the first trigger owns
    /// the episode and its cooldown.
    fn trip(state: &mut CircuitState, reason: TripReason, cooldown: Duration, now: DateTime<Utc>) {
        if state.open {
            return;
        }
        tracing::error!(
            reason = %reason,
            cooldown_mins = cooldown.num_minutes(),
            "Circuit breaker tripped"
        );
        telemetry::increment_counter(CounterMetric::CircuitTrips);
        state.open = true;
        state.trigger_reason = Some(reason);
        state.triggered_at = Some(now);
        state.cooldown = Some(cooldown);
        state.total_trips += 1;
    }

    fn close(state: &mut CircuitState, why: &str) {
        if !state.open {
            return;
        }
        state.open = false;
        state.trigger_reason = None;
        state.triggered_at = None;
        state.cooldown = None;
        tracing::info!(why, "Circuit breaker closed");
    }

    fn prune(losses: &mut VecDeque<(DateTime<Utc>, Decimal)>, now: DateTime<Utc>) {
        let horizon = now - Duration::hours(24);
        while losses.front().is_some_and(|(at, _)| *at <= horizon) {
            losses.pop_front();
        }
    }

    fn window_sums(losses: &VecDeque<(DateTime<Utc>, Decimal)>, now: DateTime<Utc>) -> (Decimal, Decimal) {
        let hour_ago = now - Duration::hours(1);
        losses.iter().fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(hourly, daily), (at, loss)| {
                let hourly = if *at > hour_ago { hourly + loss } else { hourly };
                (hourly, daily + loss)
            },
        )
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitConfig::default())
    }
}
