use pulse_core::common::Direction;
use pulse_core::strategy::entity::{ExitKind, ExitRule, ExitUnit};

/// # Summary
/// 计算得到的绝对离场价位。两者都为空表示信号没有托管离场。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExitLevels {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

/// # Summary
/// 把离场规则换算为绝对价位。
///
/// # Logic
/// 1. `Percentage` 的偏移为 `entry × value / 100`，`Fixed` 的偏移为 `value` 本身。
/// 2. BUY：止损 = 入场价 - 偏移，止盈 = 入场价 + 偏移；SELL 方向相反。
/// 3. 同类规则出现多次时以最后一条为准。
///
/// # Arguments
/// * `entry` - 入场价。
/// * `direction` - 信号方向。
/// * `rules` - 离场规则列表。
///
/// # Returns
/// * `ExitLevels` - 止损与止盈价位。
pub fn exit_levels(entry: f64, direction: Direction, rules: &[ExitRule]) -> ExitLevels {
    let mut levels = ExitLevels::default();
    for rule in rules {
        let offset = match rule.unit {
            ExitUnit::Percentage => entry * rule.value / 100.0,
            ExitUnit::Fixed => rule.value,
        };
        // 止损在不利一侧，止盈在有利一侧
        let favorable = match direction {
            Direction::Buy => entry + offset,
            Direction::Sell => entry - offset,
        };
        let adverse = match direction {
            Direction::Buy => entry - offset,
            Direction::Sell => entry + offset,
        };
        match rule.kind {
            ExitKind::StopLoss => levels.stop_loss = Some(adverse),
            ExitKind::TakeProfit => levels.take_profit = Some(favorable),
        }
    }
    levels
}
