//! Levels command implementation

use crate::circuit::CircuitBreaker;
use crate::config::Config;
use crate::risk::RiskManager;
use crate::signal::Direction;
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct LevelsArgs {
    /// Entry price
    #[arg(long)]
    pub entry: Decimal,

    /// Average true range at entry
    #[arg(long, default_value = "0")]
    pub atr: Decimal,

    /// Compute levels for a short
    #[arg(long)]
    pub short: bool,

    /// Capital to size against (defaults to risk.initial_capital)
    #[arg(long)]
    pub capital: Option<Decimal>,

    /// Output format: json or table
    #[arg(long, default_value = "table")]
    pub format: String,
}

/// Protective levels and size for one hypothetical entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Levels {
    pub direction: Direction,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub quantity: Decimal,
    pub notional: Decimal,
    /// Loss at the stop, before fees
    pub risk_amount: Decimal,
    pub reward_risk: Decimal,
    /// Entry plus exit fees at the entry price
    pub round_trip_fees: Decimal,
}

impl Levels {
    pub fn compute(risk: &RiskManager, entry: Decimal, atr: Decimal, direction: Direction) -> Self {
        let stop_loss = risk.compute_stop_loss(entry, atr, direction);
        let take_profit = risk.compute_take_profit(entry, stop_loss, direction);
        let quantity = risk.size_position(entry, stop_loss);
        let stop_distance = (entry - stop_loss).abs();
        let reward_risk = if stop_distance.is_zero() {
            Decimal::ZERO
        } else {
            ((take_profit - entry).abs() / stop_distance).round_dp(2)
        };

        Self {
            direction,
            entry,
            stop_loss,
            take_profit,
            quantity,
            notional: quantity * entry,
            risk_amount: quantity * stop_distance,
            reward_risk,
            round_trip_fees: risk.fee(quantity, entry) * Decimal::TWO,
        }
    }
}

impl LevelsArgs {
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        if self.entry <= Decimal::ZERO {
            anyhow::bail!("entry price must be positive, got {}", self.entry);
        }

        let mut risk_config = config.risk.clone();
        if let Some(capital) = self.capital {
            risk_config.initial_capital = capital;
        }
        let circuit = Arc::new(CircuitBreaker::new(config.circuit.clone()));
        let risk = RiskManager::new(risk_config, circuit);

        let direction = if self.short {
            Direction::Short
        } else {
            Direction::Long
        };
        let levels = Levels::compute(&risk, self.entry, self.atr, direction);

        match self.format.as_str() {
            "json" => println!("{}", serde_json::to_string_pretty(&levels)?),
            _ => {
                println!("Levels for {} entry at {}", levels.direction, levels.entry);
                println!("  Stop loss:    {}", levels.stop_loss);
                println!("  Take profit:  {}", levels.take_profit);
                println!("  Reward/risk:  {}", levels.reward_risk);
                println!("  Quantity:     {}", levels.quantity.round_dp(8));
                println!("  Notional:     {}", levels.notional.round_dp(2));
                println!("  Risk amount:  {}", levels.risk_amount.round_dp(2));
                println!("  Fees (r/t):   {}", levels.round_trip_fees.round_dp(4));
            }
        }
        Ok(())
    }
}
