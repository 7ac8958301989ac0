use pulse_core::common::Direction;
use pulse_core::signal::entity::{CloseReason, Signal};

/// # Summary
/// 判断价格是否触及信号的离场价位。
///
/// # Logic
/// 1. BUY：价格 ≥ 止盈为 TP，否则价格 ≤ 止损为 SL。
/// 2. SELL：价格 ≤ 止盈为 TP，否则价格 ≥ 止损为 SL。
/// 3. 先检查止盈，两者同时满足时以 TP 为准；价位为空的一侧永不触发。
///
/// # Returns
/// * `Option<CloseReason>` - 未触及时为 `None`。
pub fn exit_hit(signal: &Signal, price: f64) -> Option<CloseReason> {
    let (tp_hit, sl_hit) = match signal.direction {
        Direction::Buy => (
            signal.take_profit.is_some_and(|tp| price >= tp),
            signal.stop_loss.is_some_and(|sl| price <= sl),
        ),
        Direction::Sell => (
            signal.take_profit.is_some_and(|tp| price <= tp),
            signal.stop_loss.is_some_and(|sl| price >= sl),
        ),
    };
    if tp_hit {
        Some(CloseReason::Tp)
    } else if sl_hit {
        Some(CloseReason::Sl)
    } else {
        None
    }
}
