//! Indicator primitives used to build filter context

use crate::feed::Candle;
use rust_decimal::Decimal;

/// Exponential moving average of the whole series, seeded with an SMA
pub fn ema(values: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || values.len() < period {
        return None;
    }
    let p = Decimal::from(period as u64);
    let k = Decimal::TWO / (p + Decimal::ONE);

    let seed: Decimal = values[..period].iter().sum::<Decimal>() / p;
    let value = values[period..]
        .iter()
        .fold(seed, |prev, v| (*v - prev) * k + prev);
    Some(value)
}

/// Wilder-smoothed average true range
pub fn atr(candles: &[Candle], period: usize) -> Option<Decimal> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let p = Decimal::from(period as u64);
    let ranges: Vec<Decimal> = candles
        .windows(2)
        .map(|w| w[1].true_range(w[0].close))
        .collect();

    let seed: Decimal = ranges[..period].iter().sum::<Decimal>() / p;
    let value = ranges[period..]
        .iter()
        .fold(seed, |prev, tr| (prev * (p - Decimal::ONE) + *tr) / p);
    Some(value)
}

/// Average directional index (Wilder), 0-100
pub fn adx(candles: &[Candle], period: usize) -> Option<Decimal> {
    if period == 0 || candles.len() < 2 * period + 1 {
        return None;
    }
    let p = Decimal::from(period as u64);
    let hundred = Decimal::ONE_HUNDRED;

    let mut plus_dm = Vec::with_capacity(candles.len() - 1);
    let mut minus_dm = Vec::with_capacity(candles.len() - 1);
    let mut ranges = Vec::with_capacity(candles.len() - 1);
    for w in candles.windows(2) {
        let up = w[1].high - w[0].high;
        let down = w[0].low - w[1].low;
        plus_dm.push(if up > down && up > Decimal::ZERO { up } else { Decimal::ZERO });
        minus_dm.push(if down > up && down > Decimal::ZERO { down } else { Decimal::ZERO });
        ranges.push(w[1].true_range(w[0].close));
    }

    let mut s_tr: Decimal = ranges[..period].iter().sum();
    let mut s_plus: Decimal = plus_dm[..period].iter().sum();
    let mut s_minus: Decimal = minus_dm[..period].iter().sum();

    let dx = |s_tr: Decimal, s_plus: Decimal, s_minus: Decimal| -> Decimal {
        if s_tr.is_zero() {
            return Decimal::ZERO;
        }
        let di_plus = hundred * s_plus / s_tr;
        let di_minus = hundred * s_minus / s_tr;
        let sum = di_plus + di_minus;
        if sum.is_zero() {
            Decimal::ZERO
        } else {
            hundred * (di_plus - di_minus).abs() / sum
        }
    };

    let mut dxs = vec![dx(s_tr, s_plus, s_minus)];
    for i in period..ranges.len() {
        s_tr = s_tr - s_tr / p + ranges[i];
        s_plus = s_plus - s_plus / p + plus_dm[i];
        s_minus = s_minus - s_minus / p + minus_dm[i];
        dxs.push(dx(s_tr, s_plus, s_minus));
    }

    if dxs.len() < period {
        return None;
    }
    let seed: Decimal = dxs[..period].iter().sum::<Decimal>() / p;
    let value = dxs[period..]
        .iter()
        .fold(seed, |prev, v| (prev * (p - Decimal::ONE) + *v) / p);
    Some(value)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    /// Candles with the given closes and a fixed high/low band around each
    pub(crate) fn candles_from_closes(closes: &[Decimal], band: Decimal) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| Candle {
                open_time: start + Duration::minutes(15 * i as i64),
                open: *close,
                high: *close + band,
                low: *close - band,
                close: *close,
                volume: dec!(1000),
            })
            .collect()
    }

    #[test]
    fn test_ema_constant_series() {
        let values = vec![dec!(10); 30];
        assert_eq!(ema(&values, 9), Some(dec!(10)));
    }

    #[test]
    fn test_ema_insufficient() {
        assert_eq!(ema(&[dec!(1), dec!(2)], 3), None);
    }

    #[test]
    fn test_ema_tracks_rising_series() {
        let values: Vec<Decimal> = (1..=40).map(Decimal::from).collect();
        let fast = ema(&values, 9).unwrap();
        let slow = ema(&values, 21).unwrap();
        assert!(fast > slow);
        assert!(fast < dec!(40));
    }

    #[test]
    fn test_atr_constant_band() {
        let closes = vec![dec!(100); 20];
        let candles = candles_from_closes(&closes, dec!(1));
        assert_eq!(atr(&candles, 14), Some(dec!(2)));
    }

    #[test]
    fn test_adx_strong_trend_is_high() {
        let closes: Vec<Decimal> = (0..40).map(|i| dec!(100) + Decimal::from(i * 2)).collect();
        let candles = candles_from_closes(&closes, dec!(0.5));
        let value = adx(&candles, 14).unwrap();
        assert!(value > dec!(25), "adx was {}", value);
    }

    #[test]
    fn test_adx_flat_market_is_zero() {
        let closes = vec![dec!(100); 40];
        let candles = candles_from_closes(&closes, dec!(0.5));
        assert_eq!(adx(&candles, 14), Some(dec!(0)));
    }

    #[test]
    fn test_adx_insufficient() {
        let candles = candles_from_closes(&[dec!(1); 10], dec!(0.1));
        assert_eq!(adx(&candles, 14), None);
    }
}
