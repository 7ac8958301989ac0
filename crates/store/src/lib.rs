//! 信号存储适配器：`SignalStore` 端口的 SQLite 实现。

pub mod config;
pub mod signal;

pub use signal::SqliteSignalStore;
