use crate::common::TimeFrame;
use crate::market::entity::Candle;
use crate::signal::entity::{Signal, SignalStatus};
use serde::{Deserialize, Serialize};

/// # Summary
/// 某个 (symbol, timeframe) 的一根 K 线已收盘并进入窗口。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleClosed {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub candle: Candle,
}

/// # Summary
/// 新信号已写入存储。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalCreated {
    pub id: String,
    pub signal: Signal,
}

/// # Summary
/// 信号状态已变更 (平仓或人工操作)。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStatusChanged {
    pub id: String,
    pub status: SignalStatus,
}

/// # Summary
/// 信号引擎运行状态，供健康检查接口使用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub running: bool,
    pub buffered_symbol_timeframe_pairs: usize,
    pub subscription_count: usize,
}
