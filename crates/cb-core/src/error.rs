//! Error taxonomy for the simulator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// Strategy or time-shift parameters fail validation.
    #[error("config error: {0}")]
    Config(String),

    /// Input candle series is unusable (empty, unsorted, malformed).
    #[error("data error: {0}")]
    Data(String),

    /// Internal bookkeeping disagrees with itself. Engine state is suspect.
    #[error("internal inconsistency: {0}")]
    Inconsistency(String),

    /// Every staggered tranche fell inside the trailing-candle floor.
    #[error("no active deposit parts: all {requested} tranches skipped over {candles} candles")]
    NoActiveParts { requested: usize, candles: usize },
}

pub type SimResult<T> = Result<T, SimError>;
