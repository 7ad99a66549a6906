//! Candle representation shared across the simulator.

use serde::{Deserialize, Serialize};

/// One OHLCV bar. `rsi` and `ema` start as `None` and are filled in place by
/// the indicator pass; the engine never mutates a candle afterwards.
///
/// `display_time` is a collaborator-supplied human-readable timestamp. The
/// core treats it as an opaque label; all ordering runs on `timestamp_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp_ms: i64,
    pub display_time: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub rsi: Option<f64>,
    #[serde(default)]
    pub ema: Option<f64>,
}

impl Candle {
    pub fn new(
        timestamp_ms: i64,
        display_time: impl Into<String>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp_ms,
            display_time: display_time.into(),
            open,
            high,
            low,
            close,
            volume,
            rsi: None,
            ema: None,
        }
    }
}
