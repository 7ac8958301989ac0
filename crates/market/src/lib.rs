//! K 线聚合：每个 (symbol, timeframe) 一个有界窗口，收盘 K 线进入窗口后交给下游评估。

pub mod aggregator;
pub mod window;

pub use aggregator::CandleAggregator;
pub use window::{CandleWindow, DEFAULT_WINDOW_CAPACITY, WindowError};
