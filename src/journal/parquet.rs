//! Parquet trade journal files with rotation
//!
//! One trades file and one decisions file per rotation period. Each append
//! rewrites the period's file in full so it is always readable.

use crate::risk::{ExitReason, TradeRecord, TradeStatus};
use crate::signal::{Decision, Direction};
use arrow::array::{
    Array, ArrayRef, BooleanArray, StringArray, TimestampMicrosecondArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Duration, Utc};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

fn utc_timestamp(name: &str, nullable: bool) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        nullable,
    )
}

/// Trade record schema. Decimals are stored as strings to keep precision.
pub fn trade_schema() -> Schema {
    Schema::new(vec![
        utc_timestamp("opened_at", false),
        utc_timestamp("closed_at", true),
        Field::new("id", DataType::Utf8, false),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("direction", DataType::Utf8, false),
        Field::new("status", DataType::Utf8, false),
        Field::new("entry_price", DataType::Utf8, false),
        Field::new("exit_price", DataType::Utf8, true),
        Field::new("quantity", DataType::Utf8, false),
        Field::new("gross_pnl", DataType::Utf8, false),
        Field::new("fees", DataType::Utf8, false),
        Field::new("net_pnl", DataType::Utf8, false),
        Field::new("pnl_pct", DataType::Utf8, false),
        Field::new("exit_reason", DataType::Utf8, true),
        Field::new("is_partial", DataType::Boolean, false),
    ])
}

/// Decision schema
pub fn decision_schema() -> Schema {
    Schema::new(vec![
        utc_timestamp("created_at", false),
        Field::new("id", DataType::Utf8, false),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("stance", DataType::Utf8, false),
        Field::new("candidate", DataType::Utf8, false),
        Field::new("score", DataType::Utf8, false),
        Field::new("long_votes", DataType::UInt32, false),
        Field::new("short_votes", DataType::UInt32, false),
        Field::new("veto_reason", DataType::Utf8, true),
    ])
}

fn string_column<I, S>(values: I) -> ArrayRef
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let values: Vec<String> = values.into_iter().map(|v| v.as_ref().to_string()).collect();
    Arc::new(StringArray::from(
        values.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
    ))
}

fn optional_string_column(values: Vec<Option<String>>) -> ArrayRef {
    Arc::new(StringArray::from(values))
}

fn timestamp_column(values: Vec<Option<i64>>) -> ArrayRef {
    Arc::new(TimestampMicrosecondArray::from(values).with_timezone("UTC"))
}

/// Where an append landed
#[derive(Debug, Clone, PartialEq)]
pub struct Appended {
    pub path: PathBuf,
    /// The append started this file
    pub new_file: bool,
}

/// Journal file writer with time-based rotation
pub struct JournalWriter {
    output_dir: PathBuf,
    rotation_interval: Duration,
    current_file_start: Option<DateTime<Utc>>,
    /// Records already in the current period's files
    period_trades: Vec<TradeRecord>,
    period_decisions: Vec<Decision>,
}

impl JournalWriter {
    pub fn new(output_dir: PathBuf, rotation_interval_secs: u64) -> Self {
        Self {
            output_dir,
            rotation_interval: Duration::seconds(rotation_interval_secs.max(1) as i64),
            current_file_start: None,
            period_trades: Vec::new(),
            period_decisions: Vec::new(),
        }
    }

    /// Ensure output directory exists
    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// Check if rotation is needed based on current time
    pub fn needs_rotation(&self, now: DateTime<Utc>) -> bool {
        match self.current_file_start {
            None => true,
            Some(start) => now - start >= self.rotation_interval,
        }
    }

    /// Start a new rotation period at `timestamp`
    pub fn mark_rotation(&mut self, timestamp: DateTime<Utc>) {
        if let Some(previous) = self.current_file_start {
            tracing::info!(
                from = %previous,
                to = %timestamp,
                trades = self.period_trades.len(),
                decisions = self.period_decisions.len(),
                "Rotating journal files"
            );
        }
        self.current_file_start = Some(timestamp);
        self.period_trades.clear();
        self.period_decisions.clear();
    }

    /// Start of the period `now` falls in, rotating first when it is due
    fn period_start(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.current_file_start {
            Some(start) if !self.needs_rotation(now) => start,
            _ => {
                self.mark_rotation(now);
                now
            }
        }
    }

    /// Add trades to the current period's file. On failure the file keeps
    /// its previous contents and the batch is not retained.
    pub fn append_trades(
        &mut self,
        trades: &[TradeRecord],
        now: DateTime<Utc>,
    ) -> anyhow::Result<Appended> {
        let start = self.period_start(now);
        let path = self.file_path("trades", start);
        let new_file = self.period_trades.is_empty();

        let mut all = self.period_trades.clone();
        all.extend_from_slice(trades);
        self.write_trades(&path, &all)?;
        self.period_trades = all;
        Ok(Appended { path, new_file })
    }

    /// Add decisions to the current period's file
    pub fn append_decisions(
        &mut self,
        decisions: &[Decision],
        now: DateTime<Utc>,
    ) -> anyhow::Result<Appended> {
        let start = self.period_start(now);
        let path = self.file_path("decisions", start);
        let new_file = self.period_decisions.is_empty();

        let mut all = self.period_decisions.clone();
        all.extend_from_slice(decisions);
        self.write_decisions(&path, &all)?;
        self.period_decisions = all;
        Ok(Appended { path, new_file })
    }

    /// File path for a prefix and flush time
    pub fn file_path(&self, prefix: &str, timestamp: DateTime<Utc>) -> PathBuf {
        let filename = format!(
            "{}_{}.parquet",
            prefix,
            timestamp.format("%Y%m%d_%H%M%S%.6f")
        );
        self.output_dir.join(filename)
    }

    /// Write to a sibling temp file, then rename over `path`
    fn write_batch(&self, path: &Path, schema: Arc<Schema>, columns: Vec<ArrayRef>) -> anyhow::Result<()> {
        self.ensure_dir()?;

        let tmp = path.with_extension("parquet.tmp");
        let file = File::create(&tmp)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

        let batch = RecordBatch::try_new(schema, columns)?;
        writer.write(&batch)?;
        writer.close()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Write trade records to a Parquet file
    pub fn write_trades(&self, path: &Path, trades: &[TradeRecord]) -> anyhow::Result<()> {
        if trades.is_empty() {
            return Ok(());
        }

        let columns: Vec<ArrayRef> = vec![
            timestamp_column(
                trades
                    .iter()
                    .map(|t| Some(t.opened_at.timestamp_micros()))
                    .collect(),
            ),
            timestamp_column(
                trades
                    .iter()
                    .map(|t| t.closed_at.map(|c| c.timestamp_micros()))
                    .collect(),
            ),
            string_column(trades.iter().map(|t| t.id.to_string())),
            string_column(trades.iter().map(|t| t.symbol.as_str())),
            string_column(trades.iter().map(|t| t.direction.to_string())),
            string_column(trades.iter().map(|t| status_name(t.status))),
            string_column(trades.iter().map(|t| t.entry_price.to_string())),
            optional_string_column(
                trades
                    .iter()
                    .map(|t| t.exit_price.map(|p| p.to_string()))
                    .collect(),
            ),
            string_column(trades.iter().map(|t| t.quantity.to_string())),
            string_column(trades.iter().map(|t| t.gross_pnl.to_string())),
            string_column(trades.iter().map(|t| t.fees.to_string())),
            string_column(trades.iter().map(|t| t.net_pnl.to_string())),
            string_column(trades.iter().map(|t| t.pnl_pct.to_string())),
            optional_string_column(
                trades
                    .iter()
                    .map(|t| t.exit_reason.map(|r| r.to_string()))
                    .collect(),
            ),
            Arc::new(BooleanArray::from(
                trades.iter().map(|t| t.is_partial).collect::<Vec<_>>(),
            )),
        ];

        self.write_batch(path, Arc::new(trade_schema()), columns)?;
        tracing::debug!(path = ?path, count = trades.len(), "Wrote trades to Parquet");
        Ok(())
    }

    /// Write decisions to a Parquet file
    pub fn write_decisions(&self, path: &Path, decisions: &[Decision]) -> anyhow::Result<()> {
        if decisions.is_empty() {
            return Ok(());
        }

        let columns: Vec<ArrayRef> = vec![
            timestamp_column(
                decisions
                    .iter()
                    .map(|d| Some(d.created_at.timestamp_micros()))
                    .collect(),
            ),
            string_column(decisions.iter().map(|d| d.id.to_string())),
            string_column(decisions.iter().map(|d| d.symbol.as_str())),
            string_column(decisions.iter().map(|d| d.stance.to_string())),
            string_column(decisions.iter().map(|d| d.candidate.to_string())),
            string_column(decisions.iter().map(|d| d.score.to_string())),
            Arc::new(UInt32Array::from(
                decisions
                    .iter()
                    .map(|d| d.long_votes as u32)
                    .collect::<Vec<_>>(),
            )),
            Arc::new(UInt32Array::from(
                decisions
                    .iter()
                    .map(|d| d.short_votes as u32)
                    .collect::<Vec<_>>(),
            )),
            optional_string_column(
                decisions
                    .iter()
                    .map(|d| d.veto_reason().map(str::to_string))
                    .collect(),
            ),
        ];

        self.write_batch(path, Arc::new(decision_schema()), columns)?;
        tracing::debug!(path = ?path, count = decisions.len(), "Wrote decisions to Parquet");
        Ok(())
    }
}

fn status_name(status: TradeStatus) -> &'static str {
    match status {
        TradeStatus::Open => "open",
        TradeStatus::Closed => "closed",
    }
}

fn parse_status(value: &str) -> anyhow::Result<TradeStatus> {
    match value {
        "open" => Ok(TradeStatus::Open),
        "closed" => Ok(TradeStatus::Closed),
        other => Err(anyhow::anyhow!("Unknown trade status: {}", other)),
    }
}

fn parse_direction(value: &str) -> anyhow::Result<Direction> {
    match value {
        "long" => Ok(Direction::Long),
        "short" => Ok(Direction::Short),
        other => Err(anyhow::anyhow!("Unknown direction: {}", other)),
    }
}

fn parse_exit_reason(value: &str) -> anyhow::Result<ExitReason> {
    let reason = match value {
        "stop_loss" => ExitReason::StopLoss,
        "trailing_stop" => ExitReason::TrailingStop,
        "breakeven_stop" => ExitReason::BreakevenStop,
        "take_profit" => ExitReason::TakeProfit,
        "partial_take_profit" => ExitReason::PartialTakeProfit,
        "manual" => ExitReason::Manual,
        other => return Err(anyhow::anyhow!("Unknown exit reason: {}", other)),
    };
    Ok(reason)
}

/// Reader for trade journal files
pub struct JournalReader {
    path: PathBuf,
}

impl JournalReader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Trade files in a journal directory, oldest first
    pub fn trade_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("trades_") && n.ends_with(".parquet"))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Every trade in a journal directory
    pub fn read_dir(dir: &Path) -> anyhow::Result<Vec<TradeRecord>> {
        let mut trades = Vec::new();
        for path in Self::trade_files(dir)? {
            trades.extend(JournalReader::new(path).read_trades()?);
        }
        Ok(trades)
    }

    /// Read trade records from the file
    pub fn read_trades(&self) -> anyhow::Result<Vec<TradeRecord>> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let file = File::open(&self.path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut trades = Vec::new();

        for batch_result in reader {
            let batch = batch_result?;

            let timestamps = |i: usize, name: &str| {
                batch
                    .column(i)
                    .as_any()
                    .downcast_ref::<TimestampMicrosecondArray>()
                    .ok_or_else(|| anyhow::anyhow!("Invalid {} column", name))
            };
            let strings = |i: usize, name: &str| {
                batch
                    .column(i)
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(|| anyhow::anyhow!("Invalid {} column", name))
            };

            let opened_at = timestamps(0, "opened_at")?;
            let closed_at = timestamps(1, "closed_at")?;
            let ids = strings(2, "id")?;
            let symbols = strings(3, "symbol")?;
            let directions = strings(4, "direction")?;
            let statuses = strings(5, "status")?;
            let entries = strings(6, "entry_price")?;
            let exits = strings(7, "exit_price")?;
            let quantities = strings(8, "quantity")?;
            let gross = strings(9, "gross_pnl")?;
            let fees = strings(10, "fees")?;
            let net = strings(11, "net_pnl")?;
            let pnl_pct = strings(12, "pnl_pct")?;
            let reasons = strings(13, "exit_reason")?;
            let partials = batch
                .column(14)
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| anyhow::anyhow!("Invalid is_partial column"))?;

            for i in 0..batch.num_rows() {
                let timestamp = |micros: i64| {
                    DateTime::from_timestamp_micros(micros)
                        .ok_or_else(|| anyhow::anyhow!("Invalid timestamp"))
                };

                trades.push(TradeRecord {
                    id: Uuid::parse_str(ids.value(i))?,
                    symbol: symbols.value(i).to_string(),
                    direction: parse_direction(directions.value(i))?,
                    entry_price: Decimal::from_str(entries.value(i))?,
                    exit_price: if exits.is_null(i) {
                        None
                    } else {
                        Some(Decimal::from_str(exits.value(i))?)
                    },
                    quantity: Decimal::from_str(quantities.value(i))?,
                    gross_pnl: Decimal::from_str(gross.value(i))?,
                    fees: Decimal::from_str(fees.value(i))?,
                    net_pnl: Decimal::from_str(net.value(i))?,
                    pnl_pct: Decimal::from_str(pnl_pct.value(i))?,
                    exit_reason: if reasons.is_null(i) {
                        None
                    } else {
                        Some(parse_exit_reason(reasons.value(i))?)
                    },
                    status: parse_status(statuses.value(i))?,
                    is_partial: partials.value(i),
                    opened_at: timestamp(opened_at.value(i))?,
                    closed_at: if closed_at.is_null(i) {
                        None
                    } else {
                        Some(timestamp(closed_at.value(i))?)
                    },
                });
            }
        }

        Ok(trades)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}
