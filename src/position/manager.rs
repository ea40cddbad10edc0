//! Position lifecycle: open, trail, partial take-profit, exit

use super::types::{ExitResult, Position, PositionError, TickOutcome};
use crate::config::{PositionConfig, MAX_SCALE_INS};
use crate::risk::{ExitReason, RiskManager, TradeRecord};
use crate::signal::Direction;
use crate::telemetry::{self, CounterMetric};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Owns every open position. All mutation happens under one lock so a
/// symbol's open, advance and exit steps are totally ordered.
pub struct PositionManager {
    config: PositionConfig,
    risk: Arc<RiskManager>,
    positions: Mutex<HashMap<String, Position>>,
}

impl PositionManager {
    pub fn new(mut config: PositionConfig, risk: Arc<RiskManager>) -> Self {
        config.max_scale_ins = config.max_scale_ins.min(MAX_SCALE_INS);
        Self {
            config,
            risk,
            positions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Position>> {
        self.positions.lock().expect("position map lock poisoned")
    }

    pub fn config(&self) -> &PositionConfig {
        &self.config
    }

    /// Open a position sized and protected by the risk manager
    pub fn open(
        &self,
        symbol: &str,
        direction: Direction,
        entry_price: Decimal,
        atr: Decimal,
    ) -> Result<Position, PositionError> {
        self.open_at(symbol, direction, entry_price, atr, Utc::now())
    }

    pub fn open_at(
        &self,
        symbol: &str,
        direction: Direction,
        entry_price: Decimal,
        atr: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Position, PositionError> {
        if entry_price <= Decimal::ZERO {
            return Err(PositionError::InvalidPrice {
                symbol: symbol.to_string(),
                price: entry_price,
            });
        }

        let mut positions = self.lock();

        if let Err(e) = self.risk.can_trade_at(now) {
            tracing::warn!(symbol, reason = %e, "Trade rejected");
            return Err(e.into());
        }
        if positions.contains_key(symbol) {
            tracing::warn!(symbol, "Position already open");
            return Err(PositionError::AlreadyOpen(symbol.to_string()));
        }

        let stop_loss = self.risk.compute_stop_loss(entry_price, atr, direction);
        let take_profit = self
            .risk
            .compute_take_profit(entry_price, stop_loss, direction);
        let quantity = self.risk.size_position(entry_price, stop_loss);

        if quantity <= Decimal::ZERO {
            tracing::warn!(symbol, "Sizing yielded zero quantity");
            return Err(PositionError::ZeroQuantity(symbol.to_string()));
        }

        let position = Position {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            direction,
            entry_price,
            quantity,
            initial_quantity: quantity,
            stop_loss,
            take_profit,
            trailing_stop: stop_loss,
            best_price: entry_price,
            initial_risk: (entry_price - stop_loss).abs(),
            partial_taken: false,
            scale_in_count: 0,
            opened_at: now,
        };

        self.risk.register_open(TradeRecord::open(
            position.id,
            symbol,
            direction,
            entry_price,
            quantity,
            now,
        ));
        positions.insert(symbol.to_string(), position.clone());
        telemetry::increment_counter(CounterMetric::PositionsOpened);

        tracing::info!(
            symbol,
            direction = %direction,
            entry = %entry_price,
            quantity = %quantity,
            stop_loss = %stop_loss,
            take_profit = %take_profit,
            "Position opened"
        );

        Ok(position)
    }

    /// Trail the stop and take the partial profit if due. Returns the
    /// partial fill when one happened.
    pub fn advance(&self, symbol: &str, price: Decimal) -> Option<TradeRecord> {
        self.advance_at(symbol, price, Utc::now())
    }

    pub fn advance_at(&self, symbol: &str, price: Decimal, now: DateTime<Utc>) -> Option<TradeRecord> {
        let mut positions = self.lock();
        let position = positions.get_mut(symbol)?;
        self.advance_position(position, price, now)
    }

    /// Close the position if a stop or the target is hit
    pub fn check_exit(&self, symbol: &str, price: Decimal) -> Option<ExitResult> {
        self.check_exit_at(symbol, price, Utc::now())
    }

    pub fn check_exit_at(&self, symbol: &str, price: Decimal, now: DateTime<Utc>) -> Option<ExitResult> {
        let mut positions = self.lock();
        let reason = exit_reason(positions.get(symbol)?, price)?;
        self.close_locked(&mut positions, symbol, price, reason, now)
    }

    /// One monitoring step: advance, then exit detection, under one lock.
    /// `None` when no position is open for the symbol.
    pub fn tick(&self, symbol: &str, price: Decimal) -> Option<TickOutcome> {
        self.tick_at(symbol, price, Utc::now())
    }

    pub fn tick_at(&self, symbol: &str, price: Decimal, now: DateTime<Utc>) -> Option<TickOutcome> {
        let mut positions = self.lock();
        let position = positions.get_mut(symbol)?;

        let partial = self.advance_position(position, price, now);
        let exit = match exit_reason(position, price) {
            Some(reason) => self.close_locked(&mut positions, symbol, price, reason, now),
            None => None,
        };

        Some(TickOutcome { partial, exit })
    }

    /// Operator or shutdown close at the given price
    pub fn close(&self, symbol: &str, price: Decimal, reason: ExitReason) -> Result<ExitResult, PositionError> {
        self.close_at(symbol, price, reason, Utc::now())
    }

    pub fn close_at(
        &self,
        symbol: &str,
        price: Decimal,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<ExitResult, PositionError> {
        let mut positions = self.lock();
        self.close_locked(&mut positions, symbol, price, reason, now)
            .ok_or_else(|| PositionError::NotFound(symbol.to_string()))
    }

    /// Add to a winning position. The entry becomes the volume-weighted
    /// average.
    pub fn scale_in(&self, symbol: &str, price: Decimal, add_quantity: Decimal) -> Result<Position, PositionError> {
        self.scale_in_at(symbol, price, add_quantity, Utc::now())
    }

    pub fn scale_in_at(
        &self,
        symbol: &str,
        price: Decimal,
        add_quantity: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Position, PositionError> {
        let refuse = |reason: &str| PositionError::ScaleInRefused {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        };

        if !self.config.pyramiding_enabled {
            return Err(refuse("pyramiding disabled"));
        }
        if price <= Decimal::ZERO || add_quantity <= Decimal::ZERO {
            return Err(refuse("non-positive price or quantity"));
        }
        if let Err(halt) = self.risk.circuit().check_at(now) {
            return Err(refuse(&halt.to_string()));
        }
        if self.risk.is_halted() {
            return Err(refuse("trading halted"));
        }

        let mut positions = self.lock();
        let position = positions
            .get_mut(symbol)
            .ok_or_else(|| PositionError::NotFound(symbol.to_string()))?;

        if position.favorable_move(price) <= Decimal::ZERO {
            return Err(refuse("position not in profit"));
        }
        if position.scale_in_count >= self.config.max_scale_ins {
            return Err(refuse("scale-in limit reached"));
        }

        let total = position.quantity + add_quantity;
        position.entry_price =
            (position.entry_price * position.quantity + price * add_quantity) / total;
        position.quantity = total;
        position.initial_quantity += add_quantity;
        position.scale_in_count += 1;

        self.risk.register_open(TradeRecord::open(
            position.id,
            symbol,
            position.direction,
            position.entry_price,
            position.quantity,
            position.opened_at,
        ));

        tracing::info!(
            symbol,
            added = %add_quantity,
            price = %price,
            entry = %position.entry_price,
            scale_ins = position.scale_in_count,
            "Scaled into position"
        );

        Ok(position.clone())
    }

    pub fn get(&self, symbol: &str) -> Option<Position> {
        self.lock().get(symbol).cloned()
    }

    /// Copies of every open position
    pub fn snapshot(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.lock().values().cloned().collect();
        positions.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        positions
    }

    pub fn open_symbols(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn advance_position(
        &self,
        position: &mut Position,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Option<TradeRecord> {
        let trail = self.config.trailing_stop_pct;
        match position.direction {
            Direction::Long => {
                position.best_price = position.best_price.max(price);
                let candidate = position.best_price * (Decimal::ONE - trail);
                position.trailing_stop = position.trailing_stop.max(candidate);
            }
            Direction::Short => {
                position.best_price = position.best_price.min(price);
                let candidate = position.best_price * (Decimal::ONE + trail);
                position.trailing_stop = position.trailing_stop.min(candidate);
            }
        }

        if !self.config.partial_tp_enabled || position.partial_taken {
            return None;
        }
        let trigger = position.initial_risk * self.config.partial_tp_multiplier;
        if position.initial_risk <= Decimal::ZERO || position.favorable_move(price) < trigger {
            return None;
        }

        // One-shot, even if the split turns out degenerate
        position.partial_taken = true;
        let close_quantity = position.quantity * self.config.partial_tp_ratio;
        if close_quantity <= Decimal::ZERO || close_quantity >= position.quantity {
            return None;
        }

        let record = TradeRecord::closed(
            position.id,
            position.symbol.clone(),
            position.direction,
            position.entry_price,
            price,
            close_quantity,
            self.risk.fee_rate(),
            ExitReason::PartialTakeProfit,
            position.opened_at,
            now,
        );
        position.quantity -= close_quantity;

        if self.config.breakeven_after_partial {
            position.stop_loss = match position.direction {
                Direction::Long => position.stop_loss.max(position.entry_price),
                Direction::Short => position.stop_loss.min(position.entry_price),
            };
        }

        tracing::info!(
            symbol = %position.symbol,
            price = %price,
            closed = %close_quantity,
            remaining = %position.quantity,
            stop_loss = %position.stop_loss,
            "Partial take-profit"
        );

        self.risk.record_trade(record.clone());
        Some(record)
    }

    fn close_locked(
        &self,
        positions: &mut HashMap<String, Position>,
        symbol: &str,
        price: Decimal,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Option<ExitResult> {
        let position = positions.remove(symbol)?;

        let record = TradeRecord::closed(
            position.id,
            symbol,
            position.direction,
            position.entry_price,
            price,
            position.quantity,
            self.risk.fee_rate(),
            reason,
            position.opened_at,
            now,
        );
        self.risk.record_trade(record.clone());
        telemetry::increment_counter(CounterMetric::TradesClosed);

        tracing::info!(
            symbol,
            reason = %reason,
            exit = %price,
            net_pnl = %record.net_pnl,
            pnl_pct = %record.pnl_pct,
            fees = %record.fees,
            "Position closed"
        );

        Some(ExitResult { position, record })
    }
}

/// Exit trigger for a price, if any. Stops are checked before the target.
fn exit_reason(position: &Position, price: Decimal) -> Option<ExitReason> {
    let stop = position.effective_stop();
    let (stopped, target_hit) = match position.direction {
        Direction::Long => (price <= stop, price >= position.take_profit),
        Direction::Short => (price >= stop, price <= position.take_profit),
    };

    if stopped {
        let reason = if position.trailing_is_tighter() {
            ExitReason::TrailingStop
        } else if position.partial_taken && position.stop_loss == position.entry_price {
            ExitReason::BreakevenStop
        } else {
            ExitReason::StopLoss
        };
        return Some(reason);
    }
    target_hit.then_some(ExitReason::TakeProfit)
}
