//! Prometheus metrics

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One full scan cycle across all symbols
    ScanCycle,
    /// One monitoring pass over open positions
    MonitorCycle,
    /// Decision engine evaluation for one symbol
    Evaluation,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current capital
    Equity,
    /// Realized P&L since start
    RealizedPnl,
    /// Realized P&L today
    DailyPnl,
    /// Current drawdown from peak, as a fraction
    DrawdownPct,
    /// Open position count
    OpenPositions,
    /// Current losing streak
    ConsecutiveLosses,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Decisions produced, flat included
    Decisions,
    /// Decisions demoted to flat by a filter
    Vetoes,
    /// Provider evaluations that failed
    ProviderErrors,
    /// Positions opened
    PositionsOpened,
    /// Full position closes
    TradesClosed,
    /// Circuit breaker trips
    CircuitTrips,
    /// Audit sink writes that failed
    SinkErrors,
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::ScanCycle => "confluence_scan_cycle_latency_ms",
        LatencyMetric::MonitorCycle => "confluence_monitor_cycle_latency_ms",
        LatencyMetric::Evaluation => "confluence_evaluation_latency_ms",
    };

    ::metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::Equity => "confluence_equity",
        GaugeMetric::RealizedPnl => "confluence_realized_pnl",
        GaugeMetric::DailyPnl => "confluence_daily_pnl",
        GaugeMetric::DrawdownPct => "confluence_drawdown_pct",
        GaugeMetric::OpenPositions => "confluence_open_positions",
        GaugeMetric::ConsecutiveLosses => "confluence_consecutive_losses",
    };

    ::metrics::gauge!(metric_name).set(value);
}

/// Increment a counter by one
pub fn increment_counter(metric: CounterMetric) {
    let metric_name = match metric {
        CounterMetric::Decisions => "confluence_decisions_total",
        CounterMetric::Vetoes => "confluence_filter_vetoes_total",
        CounterMetric::ProviderErrors => "confluence_provider_errors_total",
        CounterMetric::PositionsOpened => "confluence_positions_opened_total",
        CounterMetric::TradesClosed => "confluence_trades_closed_total",
        CounterMetric::CircuitTrips => "confluence_circuit_trips_total",
        CounterMetric::SinkErrors => "confluence_sink_errors_total",
    };

    ::metrics::counter!(metric_name).increment(1);
}
