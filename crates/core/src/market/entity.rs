use crate::common::TimeFrame;
use serde::{Deserialize, Serialize};

/// # Summary
/// 单根 K 线数据实体，记录特定时段内的行情波动。
///
/// # Invariants
/// - `time` 为该周期的开始时间 (Unix 秒)。
/// - 已收盘 (`is_final`) 的 K 线不可变，只有尚未收盘的最新一根允许被原地替换。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    // K 线开始时间 (Unix 秒)
    pub time: i64,
    // 开盘价
    pub open: f64,
    // 最高价
    pub high: f64,
    // 最低价
    pub low: f64,
    // 收盘价
    pub close: f64,
    // 成交量
    pub volume: f64,
    // 是否为最终数据 (即该周期已收盘)
    pub is_final: bool,
}

/// # Summary
/// 行情流推送的单条 K 线消息。
///
/// # Invariants
/// - `is_closed` 由交易所标记，只有为 true 时才会进入 K 线窗口。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KlineMessage {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    // K 线开始时间 (Unix 秒)
    pub open_time: i64,
    pub is_closed: bool,
}

impl KlineMessage {
    /// # Summary
    /// 转换为 K 线实体。
    pub fn to_candle(&self) -> Candle {
        Candle {
            time: self.open_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            is_final: self.is_closed,
        }
    }
}

/// # Summary
/// 最新成交价快照。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: String,
    pub price: f64,
}
