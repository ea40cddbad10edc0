//! Property tests for fusion, filters, position levels, sizing and the breaker

use crate::common::{create_test_services, market_hours};
use chrono::Duration;
use confluence::circuit::CircuitBreaker;
use confluence::config::{CircuitConfig, PositionConfig, RiskConfig};
use confluence::risk::{quantity_for, ExitReason, KellyCalculator, RiskManager, TradeRecord};
use confluence::signal::{
    composite_score, fuse, Direction, FilterChain, FilterConfig, FilterContext, Opinion,
    PriorDecision, ProviderId, ProviderWeights, Regime, Session, Stance, Thresholds, Trend,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

fn stance_strategy() -> impl Strategy<Value = Stance> {
    prop_oneof![Just(Stance::Long), Just(Stance::Short), Just(Stance::Flat)]
}

/// Basis points in [0, 10000] as a fraction
fn fraction_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000).prop_map(|bps| Decimal::new(bps, 4))
}

fn opinions_strategy() -> impl Strategy<Value = Vec<Opinion>> {
    prop::collection::vec(
        (0usize..ProviderId::ALL.len(), stance_strategy(), fraction_strategy()),
        0..12,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .map(|(i, stance, strength)| {
                Opinion::new(ProviderId::ALL[i], "BTCUSDT", stance, strength, dec!(100), "prop")
            })
            .collect()
    })
}

fn weights_strategy() -> impl Strategy<Value = ProviderWeights> {
    prop::collection::vec(fraction_strategy(), ProviderId::ALL.len()).prop_map(|values| {
        let mut weights = ProviderWeights::uniform(dec!(0));
        for (id, weight) in ProviderId::ALL.into_iter().zip(values) {
            weights.set(id, weight);
        }
        weights
    })
}

fn thresholds_strategy() -> impl Strategy<Value = Thresholds> {
    (5_001i64..=10_000, 0i64..=4_999, 1usize..5).prop_map(|(buy, sell, min_agreeing)| Thresholds {
        buy: Decimal::new(buy, 4),
        sell: Decimal::new(sell, 4),
        min_agreeing,
    })
}

fn context_strategy() -> impl Strategy<Value = FilterContext> {
    let regime = prop_oneof![
        Just(Regime::VolatileTrend),
        Just(Regime::Trending),
        Just(Regime::Volatile),
        Just(Regime::Quiet),
        Just(Regime::Ranging),
        Just(Regime::Transition),
    ];
    let trend = prop::option::of(prop_oneof![
        Just(Trend::Bullish),
        Just(Trend::Bearish),
        Just(Trend::Neutral),
    ]);
    (0u32..24, regime, trend, any::<bool>()).prop_map(|(hour, regime, trend, news)| {
        let mut ctx = FilterContext::new(market_hours())
            .with_session(Session::at_hour(hour))
            .with_regime(regime);
        ctx.trend = trend;
        if news {
            ctx = ctx.with_news("FOMC");
        }
        ctx
    })
}

fn prior_strategy() -> impl Strategy<Value = Option<PriorDecision>> {
    prop::option::of(
        (
            prop_oneof![Just(Direction::Long), Just(Direction::Short)],
            fraction_strategy(),
            0i64..120,
        )
            .prop_map(|(direction, score, mins_ago)| PriorDecision {
                direction,
                score,
                at: market_hours() - Duration::minutes(mins_ago),
            }),
    )
}

proptest! {
    #[test]
    fn prop_composite_score_bounded(opinions in opinions_strategy(), weights in weights_strategy()) {
        let score = composite_score(&opinions, &weights);
        prop_assert!(score >= Decimal::ZERO);
        prop_assert!(score <= Decimal::ONE);
    }

    #[test]
    fn prop_direction_iff_threshold_and_agreement(
        opinions in opinions_strategy(),
        weights in weights_strategy(),
        thresholds in thresholds_strategy(),
    ) {
        let fusion = fuse(&opinions, &weights, &thresholds);
        let long_ok = fusion.score >= thresholds.buy && fusion.long_votes >= thresholds.min_agreeing;
        let short_ok = fusion.score <= thresholds.sell && fusion.short_votes >= thresholds.min_agreeing;

        prop_assert_eq!(fusion.stance == Stance::Long, long_ok);
        prop_assert_eq!(fusion.stance == Stance::Short, short_ok);
    }

    #[test]
    fn prop_filters_only_demote(
        candidate in stance_strategy(),
        score in fraction_strategy(),
        ctx in context_strategy(),
        prior in prior_strategy(),
        trend_enabled in any::<bool>(),
        dedup_enabled in any::<bool>(),
    ) {
        let chain = FilterChain::new(FilterConfig {
            trend_enabled,
            dedup_enabled,
            ..FilterConfig::default()
        });
        let (stance, outcomes) = chain.apply(candidate, score, &ctx, prior.as_ref());

        prop_assert!(stance == candidate || stance == Stance::Flat);
        prop_assert_eq!(outcomes.len(), 5);
        if candidate == Stance::Flat {
            prop_assert_eq!(stance, Stance::Flat);
        }
    }

    #[test]
    fn prop_long_trailing_stop_never_loosens(steps in prop::collection::vec(0i64..300, 1..40)) {
        let (_, _, positions) = create_test_services(RiskConfig::default(), PositionConfig::default());
        let t0 = market_hours();
        positions.open_at("BTCUSDT", Direction::Long, dec!(100), dec!(0), t0).unwrap();

        let mut price = dec!(100);
        let mut previous = positions.get("BTCUSDT").unwrap().trailing_stop;
        for (i, step) in steps.into_iter().enumerate() {
            price += Decimal::new(step, 2);
            positions.advance_at("BTCUSDT", price, t0 + Duration::minutes(i as i64));
            let current = positions.get("BTCUSDT").unwrap().trailing_stop;
            prop_assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn prop_partial_take_profit_fires_once(prices in prop::collection::vec(10_200i64..11_000, 1..20)) {
        let (_, _, positions) = create_test_services(RiskConfig::default(), PositionConfig::default());
        let t0 = market_hours();
        positions.open_at("BTCUSDT", Direction::Long, dec!(100), dec!(0), t0).unwrap();

        // 102 clears the 1.5R trigger on a 1.2 stop distance
        let first = positions.advance_at("BTCUSDT", dec!(102), t0);
        prop_assert!(first.is_some());
        let quantity = positions.get("BTCUSDT").unwrap().quantity;

        for (i, cents) in prices.into_iter().enumerate() {
            let again = positions.advance_at(
                "BTCUSDT",
                Decimal::new(cents, 2),
                t0 + Duration::minutes(i as i64 + 1),
            );
            prop_assert!(again.is_none());
            let position = positions.get("BTCUSDT").unwrap();
            prop_assert_eq!(position.quantity, quantity);
            prop_assert!(position.partial_taken);
        }
    }

    #[test]
    fn prop_kelly_sizing_never_negative(outcomes in prop::collection::vec(-500i64..500, 0..40)) {
        let circuit = Arc::new(CircuitBreaker::new(CircuitConfig {
            loss_ladder: vec![],
            hourly_loss_limit: dec!(1),
            daily_loss_limit: dec!(1),
            ..CircuitConfig::default()
        }));
        let config = RiskConfig {
            kelly_min_trades: 5,
            ..RiskConfig::default()
        };
        let risk = RiskManager::starting_at(config, circuit, market_hours());

        for (i, bps) in outcomes.iter().enumerate() {
            let at = market_hours() + Duration::minutes(i as i64);
            let exit = dec!(100) + Decimal::new(*bps, 2);
            risk.record_trade(TradeRecord::closed(
                Uuid::new_v4(),
                "BTCUSDT",
                Direction::Long,
                dec!(100),
                exit,
                dec!(1),
                dec!(0),
                ExitReason::Manual,
                at,
                at,
            ));
        }

        let quantity = risk.size_position(dec!(100), dec!(98.8));
        prop_assert!(quantity >= Decimal::ZERO);

        let sample = risk.trade_sample();
        let kelly = KellyCalculator::new(dec!(0.5), dec!(0.10), 5);
        if let Some(pct) = kelly.position_pct(&sample) {
            prop_assert!(pct >= Decimal::ZERO);
            if kelly.raw_fraction(&sample).is_some_and(|f| f <= Decimal::ZERO) {
                prop_assert_eq!(quantity, Decimal::ZERO);
            }
        }
    }

    #[test]
    fn prop_quantity_never_negative(
        capital in -1_000i64..100_000,
        pct in -100i64..100,
        entry in -100i64..100_000,
        stop in 0i64..100_000,
    ) {
        let quantity = quantity_for(
            Decimal::from(capital),
            Decimal::new(pct, 2),
            Decimal::new(entry, 2),
            Decimal::new(stop, 2),
        );
        prop_assert!(quantity >= Decimal::ZERO);
    }

    #[test]
    fn prop_open_circuit_window_is_fixed(
        losses in prop::collection::vec((1i64..1_000, 0i64..55), 1..10),
    ) {
        let circuit = CircuitBreaker::new(CircuitConfig::default());
        let t0 = market_hours();
        for i in 0..3 {
            circuit.record_outcome_at(dec!(-0.001), t0 + Duration::minutes(i));
        }
        let tripped = circuit.state();
        prop_assert!(tripped.open);

        for (bps, mins) in losses {
            circuit.record_outcome_at(Decimal::new(-bps, 4), t0 + Duration::minutes(3 + mins));
            let state = circuit.state();
            prop_assert_eq!(state.triggered_at, tripped.triggered_at);
            prop_assert_eq!(state.cooldown, tripped.cooldown);
            prop_assert_eq!(&state.trigger_reason, &tripped.trigger_reason);
        }
    }
}
