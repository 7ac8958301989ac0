use crate::common::TimeFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// # Summary
/// 配置错误，仅在启动阶段出现并导致进程退出。
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub engine: EngineConfig,
    pub kuri: KuriConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub strategies: StrategiesConfig,
}

/// 行情接入配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    // 组合流基础地址，例如 wss://stream.binance.com:9443/stream?streams=
    pub url: String,
    pub symbols: Vec<String>,
    pub timeframes: Vec<TimeFrame>,
    // 单条连接允许的 symbol × timeframe 扇出上限
    pub max_streams_per_connection: usize,
    // 静默超过该秒数即强制断开重连
    pub watchdog_secs: u64,
    // 线性退避基数
    pub reconnect_base_secs: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            symbols: Vec::new(),
            timeframes: vec![TimeFrame::Hour1, TimeFrame::Hour4],
            max_streams_per_connection: 200,
            watchdog_secs: 120,
            reconnect_base_secs: 5,
            max_reconnect_attempts: 10,
        }
    }
}

/// 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // 每个 (symbol, timeframe) 保留的 K 线数量
    pub window_capacity: usize,
    // 开始评估所需的最少 K 线数量
    pub min_candles: usize,
    // 评估 worker 数量，按 symbol 哈希分区
    pub workers: usize,
    // 重复信号回溯窗口 (分钟)
    pub duplicate_lookback_minutes: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_capacity: 200,
            min_candles: 50,
            workers: 4,
            duplicate_lookback_minutes: 60,
        }
    }
}

/// Kuri 脚本运行时安全限制
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KuriConfig {
    pub max_series_len: usize,
    pub max_ops_per_bar: u64,
    pub max_total_millis: u64,
}

impl Default for KuriConfig {
    fn default() -> Self {
        Self {
            max_series_len: 10_000,
            max_ops_per_bar: 10_000,
            max_total_millis: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    // 额外策略文件目录 (*.json / *.kuri)
    pub dir: Option<String>,
}

impl AppConfig {
    /// # Summary
    /// 校验启动必需的配置项。
    ///
    /// # Logic
    /// 1. 行情地址与订阅列表不可为空。
    /// 2. 窗口容量必须能容纳最少评估数量。
    /// 3. worker 数量至少为 1。
    ///
    /// # Returns
    /// 校验失败返回 `ConfigError`。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.url.trim().is_empty() {
            return Err(ConfigError::Missing("feed.url"));
        }
        if self.feed.symbols.is_empty() {
            return Err(ConfigError::Missing("feed.symbols"));
        }
        if self.feed.timeframes.is_empty() {
            return Err(ConfigError::Missing("feed.timeframes"));
        }
        if self.feed.max_streams_per_connection == 0 {
            return Err(ConfigError::Invalid {
                key: "feed.max_streams_per_connection",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.engine.window_capacity < self.engine.min_candles {
            return Err(ConfigError::Invalid {
                key: "engine.window_capacity",
                reason: format!(
                    "{} is smaller than engine.min_candles ({})",
                    self.engine.window_capacity, self.engine.min_candles
                ),
            });
        }
        if self.engine.workers == 0 {
            return Err(ConfigError::Invalid {
                key: "engine.workers",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.store.data_dir, "data");
        assert_eq!(config.engine.window_capacity, 200);
        assert_eq!(config.engine.min_candles, 50);
        assert_eq!(config.feed.watchdog_secs, 120);
        assert_eq!(config.feed.timeframes, vec![TimeFrame::Hour1, TimeFrame::Hour4]);
    }

    #[test]
    fn test_validate_requires_feed() {
        let mut config = AppConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("feed.url"))));

        config.feed.url = "wss://stream.example.com/stream?streams=".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("feed.symbols"))));

        config.feed.symbols = vec!["BTCUSDT".to_string()];
        assert!(config.validate().is_ok());

        config.engine.window_capacity = 10;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }
}
