use crate::common::Direction;
use serde::{Deserialize, Serialize};

/// # Summary
/// 规则策略可声明的指标种类。
///
/// # Invariants
/// - 文本编码 (`code`) 参与指标查找键的拼接，必须保持稳定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndicatorType {
    Sma,
    Ema,
    Rsi,
    BollingerBands,
}

impl IndicatorType {
    pub fn code(&self) -> &'static str {
        match self {
            IndicatorType::Sma => "SMA",
            IndicatorType::Ema => "EMA",
            IndicatorType::Rsi => "RSI",
            IndicatorType::BollingerBands => "BOLLINGER_BANDS",
        }
    }
}

/// # Summary
/// 指标的输入价格字段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Open,
    High,
    Low,
    #[default]
    Close,
    Volume,
}

/// # Summary
/// 策略中声明的单个指标及其参数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    #[serde(rename = "type")]
    pub kind: IndicatorType,
    // 周期，缺省时使用指标自身的默认值
    #[serde(default)]
    pub period: Option<usize>,
    // 布林带宽度倍数
    #[serde(default)]
    pub std_dev: Option<f64>,
    #[serde(default)]
    pub source: PriceSource,
}

impl IndicatorSpec {
    /// # Summary
    /// 指标在查找表中的键：`{type}_{period-or-default}`。
    ///
    /// # Returns
    /// 例如 `EMA_9`、`BOLLINGER_BANDS_20`、`RSI_default`。
    pub fn key(&self) -> String {
        match self.period {
            Some(p) => format!("{}_{}", self.kind.code(), p),
            None => format!("{}_default", self.kind.code()),
        }
    }
}

/// # Summary
/// 比较类规则的右操作数：另一条序列或一个字面阈值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    Series(String),
    Value(f64),
}

/// # Summary
/// 进场条件，封闭的条件集合。
///
/// # Invariants
/// - 操作数为指标键、子输出键 (`BOLLINGER_BANDS_20_upper`) 或行情别名 (`CLOSE`)。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryCondition {
    Crossover { left: String, right: String },
    Crossunder { left: String, right: String },
    GreaterThan { left: String, right: Threshold },
    LessThan { left: String, right: Threshold },
}

/// # Summary
/// 单条进场规则。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRule {
    pub condition: EntryCondition,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitKind {
    StopLoss,
    TakeProfit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitUnit {
    // value 为百分数，2.0 表示 2%
    Percentage,
    // value 为相对入场价的绝对价差
    Fixed,
}

/// # Summary
/// 离场规则 (止损 / 止盈)。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitRule {
    pub kind: ExitKind,
    pub value: f64,
    pub unit: ExitUnit,
}

impl ExitRule {
    pub fn stop_loss_pct(value: f64) -> Self {
        Self {
            kind: ExitKind::StopLoss,
            value,
            unit: ExitUnit::Percentage,
        }
    }

    pub fn take_profit_pct(value: f64) -> Self {
        Self {
            kind: ExitKind::TakeProfit,
            value,
            unit: ExitUnit::Percentage,
        }
    }
}

/// # Summary
/// 声明式规则集。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub indicators: Vec<IndicatorSpec>,
    #[serde(default)]
    pub entry_rules: Vec<EntryRule>,
}

/// # Summary
/// 策略主体：规则集或 Kuri 源码。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyBody {
    Rules(RuleSet),
    Kuri { source: String },
}

/// # Summary
/// 策略定义，不可变配置。
///
/// # Invariants
/// - `id` 稳定且与存储后端无关 (内置策略使用固定 UUID)。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub body: StrategyBody,
    // 附加到该策略所有信号上的离场规则
    #[serde(default)]
    pub exit_rules: Vec<ExitRule>,
}

/// # Summary
/// 策略评估器输出的信号提案，尚未持久化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalProposal {
    pub strategy_id: String,
    pub strategy_name: String,
    pub strategy_category: Option<String>,
    pub direction: Direction,
    // 人类可读的触发原因
    pub reason: String,
    pub exit_rules: Vec<ExitRule>,
}
