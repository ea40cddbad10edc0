//! Runtime tests against an in-memory market

use crate::common::{agreeing_providers, create_test_config, market_hours, MockMarket};
use chrono::{Duration, Utc};
use confluence::circuit::TripReason;
use confluence::journal::{AuditSink, JournalReader, JournalSummary, ParquetJournal};
use confluence::risk::ExitReason;
use confluence::runtime::{ScanOutcome, TradingEngine};
use confluence::signal::Stance;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio_test::assert_ok;

fn create_test_market() -> Arc<MockMarket> {
    Arc::new(MockMarket::new(&[
        ("BTCUSDT", dec!(100)),
        ("ETHUSDT", dec!(50)),
    ]))
}

#[tokio::test]
async fn test_trade_lifecycle_is_journaled() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&["BTCUSDT"]);
    config.journal.enabled = true;
    config.journal.output_dir = dir.path().to_path_buf();

    let market = create_test_market();
    let journal = Arc::new(ParquetJournal::new(config.journal.clone()));
    let engine = TradingEngine::new(&config, agreeing_providers(Stance::Long), market.clone())
        .with_sink(journal.clone());

    let t0 = market_hours();
    let outcomes = engine.scan_once_at(t0).await;
    assert!(matches!(outcomes[0].1, ScanOutcome::Opened(_)));

    market.set_price("BTCUSDT", dec!(106));
    let report = engine.monitor_once_at(t0 + Duration::minutes(5)).await;
    assert_eq!(report.partials.len(), 1);
    assert!(report.exits.is_empty());

    market.set_price("BTCUSDT", dec!(103));
    let report = engine.monitor_once_at(t0 + Duration::minutes(10)).await;
    assert_eq!(report.exits.len(), 1);
    assert_eq!(report.exits[0].reason(), ExitReason::TrailingStop);

    journal.flush().await.unwrap();

    let records = JournalReader::read_dir(dir.path()).unwrap();
    assert_eq!(records.len(), 3);
    let summary = JournalSummary::from_records(&records);
    assert_eq!(summary.trades, 1);
    assert_eq!(summary.partial_fills, 1);
    assert_eq!(summary.wins, 1);
    assert!(summary.net_pnl > dec!(0));
    assert_eq!(summary.by_exit_reason["trailing_stop"], 1);

    let stats = journal.stats().await;
    assert_eq!(stats.decisions_written, 1);
    assert_eq!(stats.write_errors, 0);
}

#[tokio::test]
async fn test_correlated_second_symbol_rejected() {
    let config = create_test_config(&["BTCUSDT", "ETHUSDT"]);
    let engine = TradingEngine::new(&config, agreeing_providers(Stance::Long), create_test_market());

    let outcomes = engine.scan_once_at(market_hours()).await;
    assert!(matches!(outcomes[0].1, ScanOutcome::Opened(_)));
    let ScanOutcome::Rejected { reason } = &outcomes[1].1 else {
        panic!("expected rejection, got {:?}", outcomes[1].1);
    };
    assert!(reason.starts_with("Correlation with BTCUSDT"));
    assert_eq!(engine.positions().len(), 1);
}

#[tokio::test]
async fn test_uncorrelated_mode_opens_both() {
    let mut config = create_test_config(&["BTCUSDT", "ETHUSDT"]);
    config.risk.correlation_enabled = false;
    let engine = TradingEngine::new(&config, agreeing_providers(Stance::Long), create_test_market());

    let outcomes = engine.scan_once_at(market_hours()).await;
    assert!(outcomes
        .iter()
        .all(|(_, outcome)| matches!(outcome, ScanOutcome::Opened(_))));
    assert_eq!(engine.risk().open_count(), 2);
}

#[tokio::test]
async fn test_market_dump_halts_entries() {
    let market = create_test_market();
    market.set_change_24h(dec!(-0.08));
    let config = create_test_config(&["BTCUSDT"]);
    let engine = TradingEngine::new(&config, agreeing_providers(Stance::Long), market.clone());

    assert!(engine.scan_once_at(market_hours()).await.is_empty());
    let status = engine.circuit().status_at(market_hours());
    assert!(!status.can_trade);
    assert_eq!(
        status.trigger_reason,
        Some(TripReason::MarketDump {
            change: dec!(-0.08)
        })
    );

    // Recovery of the benchmark does not reopen the breaker early
    market.set_change_24h(dec!(0.01));
    let later = market_hours() + Duration::minutes(30);
    assert!(engine.scan_once_at(later).await.is_empty());

    let after_cooldown = market_hours() + Duration::minutes(121);
    market.set_as_of(after_cooldown);
    let outcomes = engine.scan_once_at(after_cooldown).await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0].1, ScanOutcome::Opened(_)));
}

#[tokio::test]
async fn test_month_old_market_data_not_traded() {
    let config = create_test_config(&["BTCUSDT"]);
    let market = create_test_market();
    let engine = TradingEngine::new(&config, agreeing_providers(Stance::Long), market.clone());

    let month_later = market_hours() + Duration::days(30);
    let outcomes = engine.scan_once_at(month_later).await;
    assert_eq!(
        outcomes[0].1,
        ScanOutcome::StaleData {
            as_of: market_hours() - Duration::minutes(15)
        }
    );
    assert!(engine.positions().is_empty());

    // Fresh data at the same clock trades normally
    market.set_as_of(month_later);
    let outcomes = engine.scan_once_at(month_later).await;
    assert!(matches!(outcomes[0].1, ScanOutcome::Opened(_)));
}

#[tokio::test]
async fn test_shutdown_stops_scan_before_any_decision() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&["BTCUSDT", "ETHUSDT"]);
    config.journal.enabled = true;
    config.journal.output_dir = dir.path().to_path_buf();

    let journal = Arc::new(ParquetJournal::new(config.journal.clone()));
    let engine = TradingEngine::new(&config, agreeing_providers(Stance::Long), create_test_market())
        .with_sink(journal.clone());
    engine.stop_entries();

    assert!(engine.scan_once_at(market_hours()).await.is_empty());
    assert_ok!(journal.flush().await);
    assert_eq!(journal.stats().await.decisions_written, 0);
}

#[tokio::test]
async fn test_shutdown_drains_until_flat() {
    let mut config = create_test_config(&["BTCUSDT"]);
    config.runtime.monitor_interval_secs = 1;
    config.runtime.shutdown_timeout_secs = 30;
    let market = create_test_market();
    let engine = Arc::new(TradingEngine::new(
        &config,
        agreeing_providers(Stance::Long),
        market.clone(),
    ));
    engine.scan_once_at(market_hours()).await;
    assert_eq!(engine.positions().len(), 1);
    market.set_as_of(Utc::now());

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(engine.clone().run(rx));
    tx.send(true).unwrap();
    market.set_price("BTCUSDT", dec!(80));

    let result = tokio::time::timeout(std::time::Duration::from_secs(10), handle)
        .await
        .expect("drain did not finish")
        .unwrap();
    assert_ok!(result);
    assert!(engine.positions().is_empty());
    assert_eq!(engine.risk().stats().losses, 1);
    assert!(!engine.is_accepting_entries());
}

#[tokio::test]
async fn test_shutdown_gives_up_after_timeout() {
    let mut config = create_test_config(&["BTCUSDT"]);
    config.runtime.monitor_interval_secs = 1;
    config.runtime.shutdown_timeout_secs = 1;
    let market = create_test_market();
    let engine = Arc::new(TradingEngine::new(
        &config,
        agreeing_providers(Stance::Long),
        market.clone(),
    ));
    engine.scan_once_at(market_hours()).await;
    market.set_as_of(Utc::now());

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(engine.clone().run(rx));
    tx.send(true).unwrap();

    let result = tokio::time::timeout(std::time::Duration::from_secs(10), handle)
        .await
        .expect("drain timeout not honored")
        .unwrap();
    assert_ok!(result);
    assert_eq!(engine.positions().len(), 1);
}
