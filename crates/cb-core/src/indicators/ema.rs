//! Exponential moving average.

use crate::candle::Candle;

/// Write EMA onto every candle. Seeded with the first close, then
/// `ema = close * k + prev_ema * (1 - k)` with `k = 2 / (period + 1)`.
pub fn compute(candles: &mut [Candle], period: usize) {
    if candles.is_empty() || period == 0 {
        return;
    }
    let k = 2.0 / (period as f64 + 1.0);

    let mut ema = candles[0].close;
    candles[0].ema = Some(ema);
    for candle in &mut candles[1..] {
        ema = candle.close * k + ema * (1.0 - k);
        candle.ema = Some(ema);
    }
}

// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn series(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(i as i64 * 60_000, format!("bar-{i}"), c, c, c, c, 1.0))
            .collect()
    }

    #[test]
    fn seeds_with_first_close() {
        let mut candles = series(&[42.0, 43.0]);
        compute(&mut candles, 10);
        assert_eq!(candles[0].ema, Some(42.0));
    }

    #[test]
    fn period_3_hand_values() {
        // k = 0.5: 10, 10.5, 11.25, 12.125
        let mut candles = series(&[10.0, 11.0, 12.0, 13.0]);
        compute(&mut candles, 3);
        let got: Vec<f64> = candles.iter().map(|c| c.ema.unwrap()).collect();
        let want = [10.0, 10.5, 11.25, 12.125];
        for (g, w) in got.iter().zip(want.iter()) {
            assert!((g - w).abs() < 1e-12, "got {g}, want {w}");
        }
    }

    #[test]
    fn constant_series_stays_constant() {
        let mut candles = series(&[5.0; 50]);
        compute(&mut candles, 14);
        for c in &candles {
            assert!((c.ema.unwrap() - 5.0).abs() < 1e-12);
        }
    }

    #[test]
    fn ema_stays_within_series_range() {
        let closes: Vec<f64> = (0..100).map(|i| 50.0 + (i % 7) as f64).collect();
        let mut candles = series(&closes);
        compute(&mut candles, 20);
        for c in &candles {
            let ema = c.ema.unwrap();
            assert!((50.0..=56.0).contains(&ema));
        }
    }
}
