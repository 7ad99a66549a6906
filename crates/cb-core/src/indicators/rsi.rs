//! Relative Strength Index with Wilder smoothing.

use crate::candle::Candle;

/// Write RSI onto `candles[period..]`; the first `period` bars stay `None`.
///
/// Seed averages are the simple mean of the first `period` close deltas,
/// after which gains and losses follow Wilder's recursive smoothing:
/// `avg = (avg * (period - 1) + delta) / period`. When the average loss is
/// zero the RSI is pinned at 100.
///
/// No-op when `period` is zero or the series is shorter than `period + 1`.
pub fn compute(candles: &mut [Candle], period: usize) {
    if period == 0 || candles.len() < period + 1 {
        return;
    }

    let deltas: Vec<f64> = candles.windows(2).map(|w| w[1].close - w[0].close).collect();
    let p = period as f64;

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for d in &deltas[..period] {
        if *d > 0.0 {
            avg_gain += d;
        } else {
            avg_loss += -d;
        }
    }
    avg_gain /= p;
    avg_loss /= p;
    candles[period].rsi = Some(rsi_from_averages(avg_gain, avg_loss));

    for i in period + 1..candles.len() {
        let d = deltas[i - 1];
        let gain = if d > 0.0 { d } else { 0.0 };
        let loss = if d < 0.0 { -d } else { 0.0 };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        candles[i].rsi = Some(rsi_from_averages(avg_gain, avg_loss));
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

// ---------------------------------------------------------------------------
