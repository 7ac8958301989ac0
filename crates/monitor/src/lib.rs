//! 信号监控：维护按 symbol 索引的活跃信号，并在实时价格触及离场价位时关闭信号。

pub mod monitor;
pub mod trigger;

pub use monitor::SignalMonitor;
pub use trigger::exit_hit;
