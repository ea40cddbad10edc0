//! Market context consumed by the filter chain
//!
//! Everything here is computed before fusion and handed to the filters by
//! value, so the filters themselves stay pure predicates.

use super::calendar::NewsCalendar;
use super::indicators::{adx, atr, ema};
use crate::feed::Candle;
use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Liquidity window of the trading day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Session {
    pub name: &'static str,
    /// 1 (thin) to 6 (deepest)
    pub quality: u8,
}

impl Session {
    /// Classify a UTC hour
    pub fn at_hour(hour: u32) -> Self {
        match hour {
            13..=15 => Session {
                name: "london_ny_overlap",
                quality: 6,
            },
            2..=4 => Session {
                name: "london_killzone",
                quality: 5,
            },
            0..=1 => Session {
                name: "asia_killzone",
                quality: 3,
            },
            _ => Session {
                name: "off_hours",
                quality: 1,
            },
        }
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self::at_hour(now.hour())
    }
}

/// Market regime derived from ADX and ATR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    VolatileTrend,
    Trending,
    Volatile,
    Quiet,
    Ranging,
    /// Between regimes, or not enough data
    Transition,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Regime::VolatileTrend => "volatile_trend",
            Regime::Trending => "trending",
            Regime::Volatile => "volatile",
            Regime::Quiet => "quiet",
            Regime::Ranging => "ranging",
            Regime::Transition => "transition",
        };
        f.write_str(name)
    }
}

/// Thresholds for regime classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeThresholds {
    /// ADX above this is trending
    pub trending_adx: Decimal,
    /// ADX below this is ranging
    pub ranging_adx: Decimal,
    /// ATR / close above this is volatile
    pub volatile_atr_pct: Decimal,
    /// ATR / close below this is quiet
    pub quiet_atr_pct: Decimal,
    /// Fewer candles than this yields `Transition`
    pub min_candles: usize,
    pub period: usize,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            trending_adx: dec!(25),
            ranging_adx: dec!(20),
            volatile_atr_pct: dec!(0.025),
            quiet_atr_pct: dec!(0.0012),
            min_candles: 30,
            period: 14,
        }
    }
}

impl Regime {
    pub fn classify(candles: &[Candle], thresholds: &RegimeThresholds) -> Self {
        if candles.len() < thresholds.min_candles {
            return Regime::Transition;
        }
        let close = match candles.last() {
            Some(c) if c.close > Decimal::ZERO => c.close,
            _ => return Regime::Transition,
        };
        let (Some(adx), Some(atr)) = (
            adx(candles, thresholds.period),
            atr(candles, thresholds.period),
        ) else {
            return Regime::Transition;
        };
        let atr_pct = atr / close;

        let trending = adx > thresholds.trending_adx;
        let volatile = atr_pct > thresholds.volatile_atr_pct;
        match (trending, volatile) {
            (true, true) => Regime::VolatileTrend,
            (true, false) => Regime::Trending,
            (false, true) => Regime::Volatile,
            _ if atr_pct < thresholds.quiet_atr_pct => Regime::Quiet,
            _ if adx < thresholds.ranging_adx => Regime::Ranging,
            _ => Regime::Transition,
        }
    }
}

/// Higher-timeframe trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl Trend {
    /// Minimum candles for the EMA 9/21/55 stack
    pub const MIN_CANDLES: usize = 60;

    /// Read the trend from an EMA 9/21/55 stack. `None` without enough data.
    pub fn from_candles(candles: &[Candle]) -> Option<Self> {
        if candles.len() < Self::MIN_CANDLES {
            return None;
        }
        let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
        let price = *closes.last()?;
        let e9 = ema(&closes, 9)?;
        let e21 = ema(&closes, 21)?;
        let e55 = ema(&closes, 55)?;

        let bullish = (price > e9 && e9 > e21 && e21 > e55) || (price > e21 && e9 > e55);
        let bearish = (price < e9 && e9 < e21 && e21 < e55) || (price < e21 && e9 < e55);
        Some(match (bullish, bearish) {
            (true, false) => Trend::Bullish,
            (false, true) => Trend::Bearish,
            _ => Trend::Neutral,
        })
    }
}

/// Snapshot of everything the filter chain looks at
#[derive(Debug, Clone)]
pub struct FilterContext {
    pub now: DateTime<Utc>,
    pub session: Session,
    pub regime: Regime,
    /// `None` when the trend timeframe could not be read
    pub trend: Option<Trend>,
    /// Name of the high-impact event currently in blackout
    pub news_event: Option<String>,
}

impl FilterContext {
    /// Context with no market information beyond the clock
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            session: Session::at(now),
            regime: Regime::Transition,
            trend: None,
            news_event: None,
        }
    }

    /// Build from primary candles, trend-timeframe candles and the calendar
    pub fn from_market(
        now: DateTime<Utc>,
        primary: &[Candle],
        trend_candles: &[Candle],
        calendar: &NewsCalendar,
        thresholds: &RegimeThresholds,
    ) -> Self {
        Self {
            now,
            session: Session::at(now),
            regime: Regime::classify(primary, thresholds),
            trend: Trend::from_candles(trend_candles),
            news_event: calendar.blackout_at(now).map(|e| e.name.clone()),
        }
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn with_regime(mut self, regime: Regime) -> Self {
        self.regime = regime;
        self
    }

    pub fn with_trend(mut self, trend: Trend) -> Self {
        self.trend = Some(trend);
        self
    }

    pub fn with_news(mut self, event: impl Into<String>) -> Self {
        self.news_event = Some(event.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::indicators::tests::candles_from_closes;
    use chrono::TimeZone;

    #[test]
    fn test_session_quality_by_hour() {
        assert_eq!(Session::at_hour(14).quality, 6);
        assert_eq!(Session::at_hour(3).quality, 5);
        assert_eq!(Session::at_hour(1).quality, 3);
        assert_eq!(Session::at_hour(20).quality, 1);
        assert_eq!(Session::at_hour(16).quality, 1);
    }

    #[test]
    fn test_regime_insufficient_data() {
        let candles = candles_from_closes(&[dec!(100); 10], dec!(1));
        assert_eq!(
            Regime::classify(&candles, &RegimeThresholds::default()),
            Regime::Transition
        );
    }

    #[test]
    fn test_regime_quiet() {
        // Range of 0.1 on a 1000 price: ATR% = 0.0002
        let candles = candles_from_closes(&[dec!(1000); 40], dec!(0.05));
        assert_eq!(
            Regime::classify(&candles, &RegimeThresholds::default()),
            Regime::Quiet
        );
    }

    #[test]
    fn test_regime_trending() {
        let closes: Vec<Decimal> = (0..40).map(|i| dec!(1000) + Decimal::from(i * 3)).collect();
        let candles = candles_from_closes(&closes, dec!(1));
        assert_eq!(
            Regime::classify(&candles, &RegimeThresholds::default()),
            Regime::Trending
        );
    }

    #[test]
    fn test_regime_ranging() {
        // Flat closes with a 1% band: ADX 0, ATR% 0.02
        let candles = candles_from_closes(&[dec!(100); 40], dec!(1));
        assert_eq!(
            Regime::classify(&candles, &RegimeThresholds::default()),
            Regime::Ranging
        );
    }

    #[test]
    fn test_trend_bullish_and_bearish() {
        let rising: Vec<Decimal> = (0..80).map(|i| dec!(100) + Decimal::from(i)).collect();
        let falling: Vec<Decimal> = (0..80).map(|i| dec!(200) - Decimal::from(i)).collect();

        assert_eq!(
            Trend::from_candles(&candles_from_closes(&rising, dec!(0.5))),
            Some(Trend::Bullish)
        );
        assert_eq!(
            Trend::from_candles(&candles_from_closes(&falling, dec!(0.5))),
            Some(Trend::Bearish)
        );
    }

    #[test]
    fn test_trend_requires_history() {
        let closes = vec![dec!(100); 59];
        assert_eq!(Trend::from_candles(&candles_from_closes(&closes, dec!(1))), None);
        let flat = vec![dec!(100); 60];
        assert_eq!(
            Trend::from_candles(&candles_from_closes(&flat, dec!(1))),
            Some(Trend::Neutral)
        );
    }

    #[test]
    fn test_context_from_market() {
        let now = Utc.with_ymd_and_hms(2025, 3, 19, 14, 0, 0).unwrap();
        let candles = candles_from_closes(&[dec!(1000); 40], dec!(0.05));
        let ctx = FilterContext::from_market(
            now,
            &candles,
            &[],
            &NewsCalendar::empty(),
            &RegimeThresholds::default(),
        );

        assert_eq!(ctx.session.quality, 6);
        assert_eq!(ctx.regime, Regime::Quiet);
        assert_eq!(ctx.trend, None);
        assert!(ctx.news_event.is_none());
    }
}
