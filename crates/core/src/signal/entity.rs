use crate::common::{Direction, TimeFrame};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 信号生命周期状态。
///
/// # Invariants
/// - 只允许 Pending → Active → Closed 单向迁移，信号从不删除。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalStatus {
    Pending,
    Active,
    Closed,
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalStatus::Pending => write!(f, "Pending"),
            SignalStatus::Active => write!(f, "Active"),
            SignalStatus::Closed => write!(f, "Closed"),
        }
    }
}

impl FromStr for SignalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(SignalStatus::Pending),
            "Active" => Ok(SignalStatus::Active),
            "Closed" => Ok(SignalStatus::Closed),
            _ => Err(format!("Unknown SignalStatus: {}", s)),
        }
    }
}

/// # Summary
/// 平仓原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloseReason {
    // 触及止盈
    Tp,
    // 触及止损
    Sl,
    // 人工关闭
    Manual,
    // 超时
    Timeout,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Tp => write!(f, "TP"),
            CloseReason::Sl => write!(f, "SL"),
            CloseReason::Manual => write!(f, "MANUAL"),
            CloseReason::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

impl FromStr for CloseReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TP" => Ok(CloseReason::Tp),
            "SL" => Ok(CloseReason::Sl),
            "MANUAL" => Ok(CloseReason::Manual),
            "TIMEOUT" => Ok(CloseReason::Timeout),
            _ => Err(format!("Unknown CloseReason: {}", s)),
        }
    }
}

/// # Summary
/// 持久化的交易信号聚合根。
///
/// # Invariants
/// - 由策略评估器以 Active 状态创建 (市价信号即时激活)。
/// - 只有信号监控器 (或外部人工操作) 可以把状态改为 Closed。
/// - `stop_loss` / `take_profit` 同时为空表示该信号没有托管离场。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub symbol: String,
    pub strategy_id: String,
    pub strategy_name: String,
    // 策略分类 (trend / mean-reversion / breakout / kuri)
    #[serde(default)]
    pub strategy_category: Option<String>,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub timeframe: TimeFrame,
    pub status: SignalStatus,
    // 触发原因描述
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
    pub pnl_percent: Option<f64>,
}

impl Signal {
    /// # Summary
    /// 按方向计算以 `price` 平仓时的收益率 (百分比)。
    ///
    /// # Logic
    /// BUY: `(price - entry) / entry × 100`；SELL 取相反数。
    pub fn pnl_at(&self, price: f64) -> f64 {
        let raw = (price - self.entry_price) / self.entry_price * 100.0;
        match self.direction {
            Direction::Buy => raw,
            Direction::Sell => -raw,
        }
    }
}
