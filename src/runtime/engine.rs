//! Trading engine: scan, monitor and report loops over shared services

use crate::circuit::{CircuitBreaker, CircuitStatus};
use crate::config::{Config, JournalConfig, RuntimeConfig};
use crate::feed::{Candle, MarketDataSource, PriceVerifier};
use crate::journal::{AuditSink, ParquetJournal, TracingSink};
use crate::position::{ExitResult, Position, PositionManager};
use crate::risk::{RiskManager, RiskStats, TradeRecord};
use crate::signal::indicators::atr;
use crate::signal::{
    collect_opinions, DecisionEngine, Direction, FilterChain, FilterContext, NewsCalendar,
    RegimeThresholds, SignalProvider,
};
use crate::telemetry::{self, CounterMetric, LatencyMetric};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// What happened to one symbol in one scan
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// Position already open for the symbol
    Skipped,
    /// Too few candles to evaluate
    InsufficientData { have: usize },
    /// Newest market data is older than the configured limit
    StaleData { as_of: DateTime<Utc> },
    /// Fusion produced no direction
    Flat { score: Decimal },
    /// A filter demoted the decision
    Vetoed { reason: String },
    /// An actionable decision that was not acted on
    Rejected { reason: String },
    Opened(Position),
}

/// Result of one monitoring pass
#[derive(Debug, Clone, Default)]
pub struct MonitorReport {
    /// Open positions checked this pass
    pub checked: usize,
    /// Symbols whose price could not be read
    pub failed: Vec<String>,
    pub partials: Vec<TradeRecord>,
    pub exits: Vec<ExitResult>,
}

/// Periodic status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct EngineReport {
    pub stats: RiskStats,
    pub circuit: CircuitStatus,
    pub positions: Vec<Position>,
}

/// Wires providers, market data and the risk services into the three
/// long-lived loops.
pub struct TradingEngine {
    config: RuntimeConfig,
    regime: RegimeThresholds,
    providers: Vec<Box<dyn SignalProvider>>,
    source: Arc<dyn MarketDataSource>,
    verifier: Option<Arc<dyn PriceVerifier>>,
    sink: Arc<dyn AuditSink>,
    calendar: NewsCalendar,
    decisions: DecisionEngine,
    circuit: Arc<CircuitBreaker>,
    risk: Arc<RiskManager>,
    positions: Arc<PositionManager>,
    /// Cleared once shutdown is signalled
    accepting_entries: AtomicBool,
}

impl TradingEngine {
    /// Build every service from configuration
    pub fn new(
        config: &Config,
        providers: Vec<Box<dyn SignalProvider>>,
        source: Arc<dyn MarketDataSource>,
    ) -> Self {
        let circuit = Arc::new(CircuitBreaker::new(config.circuit.clone()));
        let risk = Arc::new(RiskManager::new(config.risk.clone(), circuit.clone()));
        let positions = Arc::new(PositionManager::new(config.position.clone(), risk.clone()));
        let decisions = DecisionEngine::new(
            config.engine.weights.clone(),
            config.engine.thresholds(),
            FilterChain::new(config.filters.clone()),
        );

        Self {
            config: config.runtime.clone(),
            regime: config.regime.clone(),
            providers,
            source,
            verifier: None,
            sink: Arc::new(TracingSink),
            calendar: config.news.calendar(),
            decisions,
            circuit,
            risk,
            positions,
            accepting_entries: AtomicBool::new(true),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn PriceVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Record to a Parquet journal when it is enabled. Needs a tokio runtime.
    pub fn with_journal(self, config: &JournalConfig) -> Self {
        if !config.enabled {
            return self;
        }
        tracing::info!(dir = %config.output_dir.display(), "Trade journal enabled");
        self.with_sink(Arc::new(ParquetJournal::new(config.clone())))
    }

    pub fn circuit(&self) -> &Arc<CircuitBreaker> {
        &self.circuit
    }

    pub fn risk(&self) -> &Arc<RiskManager> {
        &self.risk
    }

    pub fn positions(&self) -> &Arc<PositionManager> {
        &self.positions
    }

    /// Refuse new positions from now on
    pub fn stop_entries(&self) {
        if self.accepting_entries.swap(false, Ordering::SeqCst) {
            tracing::info!("No new positions will be opened");
        }
    }

    pub fn is_accepting_entries(&self) -> bool {
        self.accepting_entries.load(Ordering::SeqCst)
    }

    /// True when data stamped `as_of` is too old to act on at `now`
    fn is_stale(&self, as_of: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let max_age = chrono::Duration::seconds(self.config.max_data_age_secs as i64);
        now - as_of > max_age
    }

    /// One pass over every configured symbol
    pub async fn scan_once(&self) -> Vec<(String, ScanOutcome)> {
        self.scan_once_at(Utc::now()).await
    }

    pub async fn scan_once_at(&self, now: DateTime<Utc>) -> Vec<(String, ScanOutcome)> {
        let started = Instant::now();

        match self.source.ticker(&self.config.benchmark_symbol).await {
            Ok(ticker) if self.is_stale(ticker.timestamp, now) => {
                tracing::warn!(
                    symbol = %self.config.benchmark_symbol,
                    as_of = %ticker.timestamp,
                    "Benchmark ticker stale, skipping market-wide check"
                );
            }
            Ok(ticker) => {
                self.circuit
                    .check_market_wide_dump_at(ticker.change_24h, now);
            }
            Err(e) => {
                tracing::warn!(
                    symbol = %self.config.benchmark_symbol,
                    error = %e,
                    "Benchmark ticker unavailable"
                );
            }
        }

        if let Err(reason) = self.risk.can_trade_at(now) {
            tracing::info!(reason = %reason, "Trading blocked, skipping scan");
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(self.config.symbols.len());
        for symbol in &self.config.symbols {
            if !self.is_accepting_entries() {
                tracing::info!("Shutting down, scan stopped");
                break;
            }
            let outcome = if self.positions.get(symbol).is_some() {
                ScanOutcome::Skipped
            } else {
                match self.scan_symbol(symbol, now).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::warn!(symbol = %symbol, error = %e, "Scan failed");
                        ScanOutcome::Rejected {
                            reason: e.to_string(),
                        }
                    }
                }
            };
            outcomes.push((symbol.clone(), outcome));
        }

        telemetry::record_latency(LatencyMetric::ScanCycle, started.elapsed());
        outcomes
    }

    async fn scan_symbol(&self, symbol: &str, now: DateTime<Utc>) -> anyhow::Result<ScanOutcome> {
        let candles = self
            .source
            .candles(symbol, &self.config.primary_timeframe, self.config.candle_limit)
            .await?;
        if candles.len() < self.config.min_candles {
            return Ok(ScanOutcome::InsufficientData {
                have: candles.len(),
            });
        }
        if let Some(last) = candles.last().filter(|c| self.is_stale(c.open_time, now)) {
            tracing::warn!(symbol, as_of = %last.open_time, "Candles stale, declining to evaluate");
            return Ok(ScanOutcome::StaleData {
                as_of: last.open_time,
            });
        }

        let trend_candles = self
            .source
            .candles(symbol, &self.config.trend_timeframe, self.config.candle_limit)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(symbol, error = %e, "Trend candles unavailable");
                Vec::new()
            });

        let evaluation_started = Instant::now();
        let ctx = FilterContext::from_market(now, &candles, &trend_candles, &self.calendar, &self.regime);
        let opinions = collect_opinions(&self.providers, &candles, symbol);
        let decision = self.decisions.evaluate(symbol, opinions, &ctx);
        telemetry::record_latency(LatencyMetric::Evaluation, evaluation_started.elapsed());

        if let Err(e) = self.sink.record_decision(&decision).await {
            telemetry::increment_counter(CounterMetric::SinkErrors);
            tracing::warn!(symbol, error = %e, "Failed to record decision");
        }

        let Some(direction) = decision.stance.direction() else {
            return Ok(match decision.veto_reason() {
                Some(reason) => ScanOutcome::Vetoed {
                    reason: reason.to_string(),
                },
                None => ScanOutcome::Flat {
                    score: decision.score,
                },
            });
        };

        if self.config.spot_only && direction == Direction::Short {
            return Ok(rejected(symbol, "short decisions disabled in spot-only mode"));
        }

        let ticker = self.source.ticker(symbol).await?;
        if self.is_stale(ticker.timestamp, now) {
            tracing::warn!(symbol, as_of = %ticker.timestamp, "Ticker stale, declining to open");
            return Ok(ScanOutcome::StaleData {
                as_of: ticker.timestamp,
            });
        }
        if let Some(spread) = ticker.spread_pct() {
            if !self.circuit.check_spread(symbol, spread) {
                return Ok(rejected(symbol, format!("spread {} too wide", spread)));
            }
        }

        let open_symbols = self.positions.open_symbols();
        if !open_symbols.is_empty() {
            let histories = self
                .price_histories(symbol, &trend_candles, &open_symbols)
                .await;
            let check = self
                .risk
                .check_correlation(symbol, &open_symbols, &histories);
            if let Some(rejection) = check.rejection() {
                return Ok(rejected(symbol, rejection.to_string()));
            }
        }

        let mut entry = ticker.last;
        if let Some(verifier) = self.verifier.as_ref().filter(|_| self.config.verify_prices) {
            match verifier.verify(symbol, entry).await {
                Ok(check) if check.verified => entry = check.verified_price,
                Ok(check) => {
                    return Ok(rejected(
                        symbol,
                        format!("price unverified, deviation {}", check.deviation_pct),
                    ));
                }
                Err(e) => {
                    return Ok(rejected(symbol, format!("price verification failed: {}", e)));
                }
            }
        }
        if entry <= Decimal::ZERO {
            return Ok(rejected(symbol, "no usable entry price"));
        }

        if !self.is_accepting_entries() {
            return Ok(rejected(symbol, "shutting down"));
        }

        let atr = atr(&candles, self.config.atr_period).unwrap_or(Decimal::ZERO);
        match self.positions.open_at(symbol, direction, entry, atr, now) {
            Ok(position) => {
                let record = TradeRecord::open(
                    position.id,
                    symbol,
                    direction,
                    position.entry_price,
                    position.quantity,
                    position.opened_at,
                );
                self.audit_trade(&record).await;
                Ok(ScanOutcome::Opened(position))
            }
            Err(e) => Ok(rejected(symbol, e.to_string())),
        }
    }

    /// Trend-timeframe closes for the candidate and every open symbol
    async fn price_histories(
        &self,
        candidate: &str,
        candidate_candles: &[Candle],
        open_symbols: &[String],
    ) -> HashMap<String, Vec<Decimal>> {
        let lookback = self.config.correlation_lookback + 1;
        let closes = |candles: &[Candle]| -> Vec<Decimal> {
            let start = candles.len().saturating_sub(lookback);
            candles[start..].iter().map(|c| c.close).collect()
        };

        let fetches = open_symbols.iter().map(|symbol| async move {
            let result = self
                .source
                .candles(symbol, &self.config.trend_timeframe, lookback)
                .await;
            (symbol.clone(), result)
        });

        let mut histories = HashMap::new();
        histories.insert(candidate.to_string(), closes(candidate_candles));
        for (symbol, result) in join_all(fetches).await {
            match result {
                Ok(candles) => {
                    histories.insert(symbol, closes(&candles));
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "History unavailable for correlation");
                }
            }
        }
        histories
    }

    /// One pass over every open position
    pub async fn monitor_once(&self) -> MonitorReport {
        self.monitor_once_at(Utc::now()).await
    }

    pub async fn monitor_once_at(&self, now: DateTime<Utc>) -> MonitorReport {
        let started = Instant::now();
        let symbols = self.positions.open_symbols();
        let tickers = join_all(symbols.iter().map(|s| self.source.ticker(s))).await;

        let mut report = MonitorReport {
            checked: symbols.len(),
            ..MonitorReport::default()
        };

        for (symbol, result) in symbols.into_iter().zip(tickers) {
            let price = match result {
                Ok(ticker) if self.is_stale(ticker.timestamp, now) => {
                    tracing::warn!(symbol = %symbol, as_of = %ticker.timestamp, "Stale price");
                    report.failed.push(symbol);
                    continue;
                }
                Ok(ticker) if ticker.last > Decimal::ZERO => ticker.last,
                Ok(ticker) => {
                    tracing::warn!(symbol = %symbol, last = %ticker.last, "Unusable price");
                    report.failed.push(symbol);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "Price fetch failed");
                    report.failed.push(symbol);
                    continue;
                }
            };

            let Some(outcome) = self.positions.tick_at(&symbol, price, now) else {
                continue;
            };
            if let Some(partial) = outcome.partial {
                self.audit_trade(&partial).await;
                report.partials.push(partial);
            }
            if let Some(exit) = outcome.exit {
                self.audit_trade(&exit.record).await;
                report.exits.push(exit);
            }
        }

        telemetry::record_latency(LatencyMetric::MonitorCycle, started.elapsed());
        report
    }

    /// Snapshot and log current performance
    pub fn report_once(&self) -> EngineReport {
        let report = EngineReport {
            stats: self.risk.stats(),
            circuit: self.circuit.status(),
            positions: self.positions.snapshot(),
        };

        tracing::info!(
            capital = %report.stats.capital,
            roi = %report.stats.roi,
            daily_pnl = %report.stats.daily_pnl,
            trades = report.stats.total_trades,
            win_rate = %report.stats.win_rate,
            drawdown = %report.stats.drawdown,
            open = report.positions.len(),
            can_trade = report.circuit.can_trade,
            halted = report.stats.halted,
            "Periodic report"
        );

        report
    }

    async fn audit_trade(&self, record: &TradeRecord) {
        if let Err(e) = self.sink.record_trade(record).await {
            telemetry::increment_counter(CounterMetric::SinkErrors);
            tracing::warn!(symbol = %record.symbol, error = %e, "Failed to record trade");
        }
    }

    /// Run all loops until `shutdown` turns true (or its sender drops), then
    /// drain open positions.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        tracing::info!(
            symbols = ?self.config.symbols,
            scan_secs = self.config.scan_interval_secs,
            monitor_secs = self.config.monitor_interval_secs,
            "Trading engine starting"
        );

        let scan = tokio::spawn(Self::scan_loop(self.clone(), shutdown.clone()));
        let monitor = tokio::spawn(Self::monitor_loop(self.clone(), shutdown.clone()));
        let report = tokio::spawn(Self::report_loop(self.clone(), shutdown));

        let (scan, monitor, report) = tokio::join!(scan, monitor, report);
        scan?;
        monitor?;
        report?;

        if let Err(e) = self.sink.flush().await {
            tracing::warn!(error = %e, "Failed to flush audit sink");
        }
        self.report_once();
        tracing::info!("Trading engine stopped");
        Ok(())
    }

    async fn scan_loop(engine: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = every(engine.config.scan_interval_secs);
        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    engine.stop_entries();
                    break;
                }
                _ = interval.tick() => {
                    engine.scan_once().await;
                }
            }
        }
        tracing::info!("Scan loop stopped");
    }

    async fn monitor_loop(engine: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = every(engine.config.monitor_interval_secs);
        let drain_timeout = Duration::from_secs(engine.config.shutdown_timeout_secs);
        let mut draining_since: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown), if draining_since.is_none() => {
                    engine.stop_entries();
                    draining_since = Some(Instant::now());
                    tracing::info!(open = engine.positions.len(), "Draining open positions");
                }
                _ = interval.tick() => {
                    engine.monitor_once().await;
                }
            }

            if let Some(since) = draining_since {
                if engine.positions.is_empty() {
                    break;
                }
                if since.elapsed() >= drain_timeout {
                    tracing::warn!(
                        open = engine.positions.len(),
                        "Drain timeout elapsed with positions still open"
                    );
                    break;
                }
            }
        }
        tracing::info!("Monitor loop stopped");
    }

    async fn report_loop(engine: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = every(engine.config.report_interval_secs);
        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    engine.stop_entries();
                    break;
                }
                _ = interval.tick() => {
                    engine.report_once();
                }
            }
        }
    }
}

fn rejected(symbol: &str, reason: impl Into<String>) -> ScanOutcome {
    let reason = reason.into();
    tracing::info!(symbol, reason = %reason, "Decision not acted on");
    ScanOutcome::Rejected { reason }
}

fn every(secs: u64) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval
}

/// Resolves once the flag is true or the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
