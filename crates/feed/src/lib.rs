//! 行情接入：多路复用 K 线 WebSocket 流。

pub mod codec;
pub mod reconnect;
pub mod ws;

pub use reconnect::{Watchdog, backoff_delay};
pub use ws::{FeedSettings, WsFeed};
