//! Concrete end-to-end scenarios across the risk services

use crate::common::{create_test_services, market_hours};
use chrono::Duration;
use confluence::circuit::{CircuitBreaker, CircuitHalt, TripReason};
use confluence::config::{CircuitConfig, PositionConfig, RiskConfig};
use confluence::risk::{ExitReason, RiskError, TradeRecord};
use confluence::signal::{
    fuse, Direction, Opinion, ProviderId, ProviderWeights, Stance, Thresholds,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use uuid::Uuid;

#[test]
fn test_sizing_and_levels_for_a_fresh_account() {
    let (_, risk, positions) = create_test_services(RiskConfig::default(), PositionConfig::default());

    let stop = risk.compute_stop_loss(dec!(100), dec!(0), Direction::Long);
    assert_eq!(stop, dec!(98.8));
    assert_eq!(risk.size_position(dec!(100), stop), dec!(0.5));
    // 1.2 * 3 = 3.6 is below the 4% floor
    assert_eq!(
        risk.compute_take_profit(dec!(100), stop, Direction::Long),
        dec!(104)
    );

    let position = positions
        .open_at("BTCUSDT", Direction::Long, dec!(100), dec!(0), market_hours())
        .unwrap();
    assert_eq!(position.quantity, dec!(0.5));
    assert_eq!(position.stop_loss, dec!(98.8));
    assert_eq!(position.take_profit, dec!(104));
    assert_eq!(position.trailing_stop, position.stop_loss);
}

#[test]
fn test_two_agreeing_providers_outvote_the_heaviest() {
    let mut weights = ProviderWeights::uniform(dec!(0));
    weights.set(ProviderId::Rsi, dec!(0.25));
    weights.set(ProviderId::Macd, dec!(0.25));
    weights.set(ProviderId::OrderBlock, dec!(0.50));

    // Sub-scores 0.9, 0.9 and 0.3
    let opinions = vec![
        Opinion::new(ProviderId::Rsi, "ETHUSDT", Stance::Long, dec!(0.8), dec!(3000), "oversold"),
        Opinion::new(ProviderId::Macd, "ETHUSDT", Stance::Long, dec!(0.8), dec!(3000), "cross up"),
        Opinion::new(ProviderId::OrderBlock, "ETHUSDT", Stance::Short, dec!(0.4), dec!(3000), "supply"),
    ];
    let thresholds = Thresholds {
        buy: dec!(0.60),
        sell: dec!(0.40),
        min_agreeing: 2,
    };

    let fusion = fuse(&opinions, &weights, &thresholds);
    assert_eq!(fusion.score, dec!(0.25) * dec!(0.9) + dec!(0.25) * dec!(0.9) + dec!(0.5) * dec!(0.3));
    assert_eq!(fusion.stance, Stance::Long);
    assert_eq!(fusion.long_votes, 2);
    assert_eq!(fusion.short_votes, 1);
}

#[test]
fn test_losing_streak_trips_circuit_once() {
    let circuit = CircuitBreaker::new(CircuitConfig::default());
    let t0 = market_hours();

    for i in 0..3 {
        circuit.record_outcome_at(dec!(-0.005), t0 + Duration::minutes(i * 5));
    }
    let tripped = circuit.state();
    assert!(tripped.open);
    assert_eq!(tripped.cooldown, Some(Duration::hours(1)));
    assert_eq!(tripped.triggered_at, Some(t0 + Duration::minutes(10)));
    assert_eq!(
        tripped.trigger_reason,
        Some(TripReason::ConsecutiveLosses { count: 3 })
    );

    circuit.record_outcome_at(dec!(-0.005), t0 + Duration::minutes(20));
    let after = circuit.state();
    assert_eq!(after.triggered_at, tripped.triggered_at);
    assert_eq!(after.cooldown, tripped.cooldown);
    assert_eq!(after.consecutive_losses, 4);

    assert!(matches!(
        circuit.check_at(t0 + Duration::minutes(30)),
        Err(CircuitHalt::Tripped { .. })
    ));
    assert!(circuit.check_at(t0 + Duration::minutes(71)).is_ok());
}

#[test]
fn test_correlated_candidate_rejected() {
    let (_, risk, _) = create_test_services(RiskConfig::default(), PositionConfig::default());

    // Candidate moves with a small idiosyncratic wobble on top of the leader
    let base: Vec<i64> = vec![3, -2, 4, -1, 2, -3, 5, -2, 1, 3, -4, 2, 1, -1, 3];
    let wobble: Vec<i64> = vec![1, 0, -1, 0, 1, 1, -1, 0, 0, 1, -1, 0, 1, 0, -1];
    let path = |moves: &[i64]| {
        let mut price = dec!(100);
        let mut out = vec![price];
        for m in moves {
            price += Decimal::from(*m);
            out.push(price);
        }
        out
    };
    let candidate: Vec<i64> = base.iter().zip(&wobble).map(|(b, w)| b + w).collect();

    let histories = HashMap::from([
        ("SOLUSDT".to_string(), path(&candidate)),
        ("BTCUSDT".to_string(), path(&base)),
        ("ETHUSDT".to_string(), path(&base)),
    ]);
    let open = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];

    let check = risk.check_correlation("SOLUSDT", &open, &histories);
    assert!(check.max_correlation > 0.75);
    assert!(!check.allowed);
    assert!(matches!(
        check.rejection(),
        Some(RiskError::CorrelationTooHigh { .. })
    ));
}

#[test]
fn test_full_lifecycle_partial_breakeven_trailing() {
    let (_, risk, positions) = create_test_services(RiskConfig::default(), PositionConfig::default());
    let t0 = market_hours();
    positions
        .open_at("BTCUSDT", Direction::Long, dec!(100), dec!(0), t0)
        .unwrap();

    // Initial risk 1.2, partial trigger at 1.8
    let outcome = positions
        .tick_at("BTCUSDT", dec!(102), t0 + Duration::minutes(10))
        .unwrap();
    let partial = outcome.partial.unwrap();
    assert!(outcome.exit.is_none());
    assert_eq!(partial.exit_reason, Some(ExitReason::PartialTakeProfit));
    assert_eq!(partial.quantity, dec!(0.25));

    let position = positions.get("BTCUSDT").unwrap();
    assert_eq!(position.quantity, dec!(0.25));
    assert_eq!(position.stop_loss, dec!(100));
    assert_eq!(position.trailing_stop, dec!(102) * dec!(0.98));

    // Trail up, then give it back through the trailing stop
    positions.tick_at("BTCUSDT", dec!(103.5), t0 + Duration::minutes(20));
    let exit = positions
        .tick_at("BTCUSDT", dec!(101), t0 + Duration::minutes(30))
        .unwrap()
        .exit
        .unwrap();
    assert_eq!(exit.reason(), ExitReason::TrailingStop);
    assert!(positions.is_empty());

    let stats = risk.stats();
    assert_eq!(stats.total_trades, 1);
    assert_eq!(stats.wins, 1);
    assert_eq!(stats.open_trades, 0);
    assert!(stats.capital > dec!(1000));
}

#[test]
fn test_losses_feed_circuit_through_risk() {
    let (circuit, risk, positions) = create_test_services(
        RiskConfig {
            max_daily_loss_pct: dec!(0.5),
            ..RiskConfig::default()
        },
        PositionConfig::default(),
    );
    let t0 = market_hours();

    for (i, symbol) in ["BTCUSDT", "ETHUSDT", "SOLUSDT"].iter().enumerate() {
        let at = t0 + Duration::minutes(i as i64);
        positions
            .open_at(symbol, Direction::Long, dec!(100), dec!(0), at)
            .unwrap();
        positions
            .close_at(symbol, dec!(99.5), ExitReason::Manual, at)
            .unwrap();
    }

    assert!(circuit.state().open);
    assert_eq!(risk.stats().consecutive_losses, 3);
    let err = positions
        .open_at("XRPUSDT", Direction::Long, dec!(1), dec!(0), t0 + Duration::minutes(5))
        .unwrap_err();
    assert!(err.to_string().to_lowercase().contains("circuit"));
}

#[test]
fn test_open_record_then_full_close_updates_capital() {
    let (_, risk, _) = create_test_services(RiskConfig::default(), PositionConfig::default());
    let id = Uuid::new_v4();
    let t0 = market_hours();

    risk.register_open(TradeRecord::open(id, "BTCUSDT", Direction::Short, dec!(100), dec!(1), t0));
    assert_eq!(risk.open_count(), 1);

    risk.record_trade(TradeRecord::closed(
        id,
        "BTCUSDT",
        Direction::Short,
        dec!(100),
        dec!(95),
        dec!(1),
        risk.fee_rate(),
        ExitReason::TakeProfit,
        t0,
        t0 + Duration::hours(1),
    ));
    assert_eq!(risk.open_count(), 0);
    assert!(risk.capital() > dec!(1000));
    assert!(risk.capital() < dec!(1005));
}
