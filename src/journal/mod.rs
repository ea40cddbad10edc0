//! Audit journal module
//!
//! Append-only sinks for decisions and trade records. Sink failures are
//! logged by the caller and never touch trading state.

mod parquet;
mod recorder;

pub use parquet::{decision_schema, trade_schema, JournalReader, JournalWriter};
pub use recorder::{JournalStats, ParquetJournal};

use crate::risk::TradeRecord;
use crate::signal::Decision;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Append-only write target for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_decision(&self, decision: &Decision) -> anyhow::Result<()>;

    async fn record_trade(&self, trade: &TradeRecord) -> anyhow::Result<()>;

    /// Make everything recorded so far durable
    async fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Sink that writes structured log lines
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

#[async_trait]
impl AuditSink for TracingSink {
    async fn record_decision(&self, decision: &Decision) -> anyhow::Result<()> {
        tracing::info!(
            target: "audit",
            id = %decision.id,
            symbol = %decision.symbol,
            stance = %decision.stance,
            candidate = %decision.candidate,
            score = %decision.score,
            long_votes = decision.long_votes,
            short_votes = decision.short_votes,
            veto = decision.veto_reason(),
            "decision"
        );
        Ok(())
    }

    async fn record_trade(&self, trade: &TradeRecord) -> anyhow::Result<()> {
        let record = serde_json::to_string(trade)?;
        tracing::info!(target: "audit", %record, "trade");
        Ok(())
    }
}

/// Per-symbol totals in a journal summary
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SymbolSummary {
    pub trades: usize,
    pub wins: usize,
    pub net_pnl: Decimal,
}

/// Aggregate view of a set of closed trade records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JournalSummary {
    /// Full closes
    pub trades: usize,
    /// Partial take-profit fills
    pub partial_fills: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: Decimal,
    /// Net P&L including partial fills
    pub net_pnl: Decimal,
    pub fees: Decimal,
    pub by_symbol: BTreeMap<String, SymbolSummary>,
    pub by_exit_reason: BTreeMap<String, usize>,
}

impl JournalSummary {
    pub fn from_records(records: &[TradeRecord]) -> Self {
        let mut summary = JournalSummary::default();

        for record in records.iter().filter(|r| r.exit_price.is_some()) {
            summary.net_pnl += record.net_pnl;
            summary.fees += record.fees;
            let symbol = summary.by_symbol.entry(record.symbol.clone()).or_default();
            symbol.net_pnl += record.net_pnl;

            if record.is_partial {
                summary.partial_fills += 1;
                continue;
            }

            summary.trades += 1;
            symbol.trades += 1;
            if record.is_win() {
                summary.wins += 1;
                symbol.wins += 1;
            } else {
                summary.losses += 1;
            }
            if let Some(reason) = record.exit_reason {
                *summary.by_exit_reason.entry(reason.to_string()).or_default() += 1;
            }
        }

        if summary.trades > 0 {
            summary.win_rate =
                Decimal::from(summary.wins as u64) / Decimal::from(summary.trades as u64);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::ExitReason;
    use crate::signal::Direction;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn create_test_record(symbol: &str, exit: Decimal, reason: ExitReason) -> TradeRecord {
        let now = Utc::now();
        TradeRecord::closed(
            Uuid::new_v4(),
            symbol,
            Direction::Long,
            dec!(100),
            exit,
            dec!(1),
            dec!(0),
            reason,
            now,
            now,
        )
    }

    #[test]
    fn test_summary() {
        let records = vec![
            create_test_record("BTCUSDT", dec!(102), ExitReason::PartialTakeProfit),
            create_test_record("BTCUSDT", dec!(100.5), ExitReason::TrailingStop),
            create_test_record("ETHUSDT", dec!(98), ExitReason::StopLoss),
            TradeRecord::open(Uuid::new_v4(), "SOLUSDT", Direction::Long, dec!(10), dec!(1), Utc::now()),
        ];

        let summary = JournalSummary::from_records(&records);
        assert_eq!(summary.trades, 2);
        assert_eq!(summary.partial_fills, 1);
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.losses, 1);
        assert_eq!(summary.win_rate, dec!(0.5));
        assert_eq!(summary.net_pnl, dec!(0.5));
        assert_eq!(summary.by_symbol["BTCUSDT"].net_pnl, dec!(2.5));
        assert_eq!(summary.by_symbol["BTCUSDT"].trades, 1);
        assert_eq!(summary.by_exit_reason["stop_loss"], 1);
        assert!(!summary.by_symbol.contains_key("SOLUSDT"));
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        let sink = TracingSink;
        let record = create_test_record("BTCUSDT", dec!(101), ExitReason::TakeProfit);
        assert!(sink.record_trade(&record).await.is_ok());
        assert!(sink.flush().await.is_ok());
    }
}
