//! Deterministic bar-by-bar simulator for a dual-direction (long + short)
//! RSI/EMA cycle strategy. Candles enter enriched with indicators, the engine
//! replays them once, and every PnL figure is reproducible bit for bit.

pub mod candle;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod position;
pub mod report;
pub mod signals;
pub mod timeshift;

pub use candle::Candle;
pub use config::{RsiReversalMode, StrategyParams, TimeShiftParams};
pub use cycle::{Cycle, CycleAction, CycleManager};
pub use engine::{run_combined, CombinedRun};
pub use error::{SimError, SimResult};
pub use position::{Direction, Position};
pub use report::SessionReport;
pub use timeshift::{run_time_shifted, DepositPart, TimeShiftRun};
