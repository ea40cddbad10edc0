//! Buffered Parquet journal

use super::parquet::JournalWriter;
use super::AuditSink;
use crate::config::JournalConfig;
use crate::risk::TradeRecord;
use crate::signal::Decision;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

enum JournalCommand {
    Trade(TradeRecord),
    Decision(Decision),
    Flush(oneshot::Sender<()>),
}

/// Journal statistics
#[derive(Debug, Default, Clone)]
pub struct JournalStats {
    pub trades_received: u64,
    pub trades_written: u64,
    pub decisions_received: u64,
    pub decisions_written: u64,
    pub files_written: u64,
    pub write_errors: u64,
    pub last_flush: Option<chrono::DateTime<Utc>>,
}

/// Append-only audit journal. Records are buffered by a background task and
/// written to rotated Parquet files.
pub struct ParquetJournal {
    config: JournalConfig,
    tx: mpsc::Sender<JournalCommand>,
    stats: Arc<RwLock<JournalStats>>,
}

struct Buffers {
    trades: Vec<TradeRecord>,
    decisions: Vec<Decision>,
}

impl Buffers {
    fn len(&self) -> usize {
        self.trades.len() + self.decisions.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ParquetJournal {
    /// Create the journal and spawn its writer task
    pub fn new(config: JournalConfig) -> Self {
        let (tx, rx) = mpsc::channel(10_000);
        let stats = Arc::new(RwLock::new(JournalStats::default()));

        let writer = JournalWriter::new(config.output_dir.clone(), config.rotation_interval_secs);
        let task_stats = stats.clone();
        let task_config = config.clone();
        tokio::spawn(async move {
            Self::run_writer(rx, writer, task_config, task_stats).await;
        });

        Self { config, tx, stats }
    }

    /// Run the writer task
    async fn run_writer(
        mut rx: mpsc::Receiver<JournalCommand>,
        mut writer: JournalWriter,
        config: JournalConfig,
        stats: Arc<RwLock<JournalStats>>,
    ) {
        let mut buffers = Buffers {
            trades: Vec::with_capacity(config.buffer_size),
            decisions: Vec::with_capacity(config.buffer_size),
        };
        let mut last_flush = Utc::now();
        let flush_interval = Duration::seconds(config.flush_interval_secs as i64);

        loop {
            let timeout = tokio::time::Duration::from_secs(config.flush_interval_secs.max(1));

            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Some(JournalCommand::Trade(trade)) => {
                            stats.write().await.trades_received += 1;
                            buffers.trades.push(trade);
                        }
                        Some(JournalCommand::Decision(decision)) => {
                            stats.write().await.decisions_received += 1;
                            buffers.decisions.push(decision);
                        }
                        Some(JournalCommand::Flush(ack)) => {
                            Self::write_buffers(&mut buffers, &mut writer, &stats).await;
                            last_flush = Utc::now();
                            let _ = ack.send(());
                        }
                        None => {
                            Self::write_buffers(&mut buffers, &mut writer, &stats).await;
                            tracing::info!("Journal writer shutting down");
                            break;
                        }
                    }

                    if buffers.len() >= config.buffer_size {
                        Self::write_buffers(&mut buffers, &mut writer, &stats).await;
                        last_flush = Utc::now();
                    }
                }

                _ = tokio::time::sleep(timeout) => {
                    let now = Utc::now();
                    if now - last_flush >= flush_interval && !buffers.is_empty() {
                        Self::write_buffers(&mut buffers, &mut writer, &stats).await;
                        last_flush = now;
                    }
                }
            }
        }
    }

    /// Flush both buffers to disk. Failed batches are dropped and counted.
    async fn write_buffers(
        buffers: &mut Buffers,
        writer: &mut JournalWriter,
        stats: &Arc<RwLock<JournalStats>>,
    ) {
        if buffers.is_empty() {
            return;
        }

        let now = Utc::now();

        if !buffers.trades.is_empty() {
            let count = buffers.trades.len() as u64;
            match writer.append_trades(&buffers.trades, now) {
                Ok(appended) => {
                    let mut s = stats.write().await;
                    s.trades_written += count;
                    s.files_written += u64::from(appended.new_file);
                    s.last_flush = Some(now);
                    tracing::debug!(count, path = ?appended.path, "Flushed trades");
                }
                Err(e) => {
                    stats.write().await.write_errors += 1;
                    tracing::error!(error = %e, "Failed to write trades");
                }
            }
            buffers.trades.clear();
        }

        if !buffers.decisions.is_empty() {
            let count = buffers.decisions.len() as u64;
            match writer.append_decisions(&buffers.decisions, now) {
                Ok(appended) => {
                    let mut s = stats.write().await;
                    s.decisions_written += count;
                    s.files_written += u64::from(appended.new_file);
                    s.last_flush = Some(now);
                    tracing::debug!(count, path = ?appended.path, "Flushed decisions");
                }
                Err(e) => {
                    stats.write().await.write_errors += 1;
                    tracing::error!(error = %e, "Failed to write decisions");
                }
            }
            buffers.decisions.clear();
        }
    }

    async fn send(&self, command: JournalCommand) -> anyhow::Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|e| anyhow::anyhow!("Journal writer stopped: {}", e))
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.config.output_dir
    }

    /// Get current statistics
    pub async fn stats(&self) -> JournalStats {
        self.stats.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for ParquetJournal {
    async fn record_decision(&self, decision: &Decision) -> anyhow::Result<()> {
        self.send(JournalCommand::Decision(decision.clone())).await
    }

    async fn record_trade(&self, trade: &TradeRecord) -> anyhow::Result<()> {
        self.send(JournalCommand::Trade(trade.clone())).await
    }

    async fn flush(&self) -> anyhow::Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(JournalCommand::Flush(ack_tx)).await?;
        ack_rx
            .await
            .map_err(|e| anyhow::anyhow!("Journal flush not acknowledged: {}", e))
    }
}
