use crate::{Series, as_f64};

pub const DEFAULT_RSI_PERIOD: usize = 14;

// 涨跌皆为 0 时的中性值
const NEUTRAL_RSI: f64 = 50.0;

/// # Summary
/// 相对强弱指数 (Wilder 平滑)。
///
/// # Logic
/// 1. `period` 为 0 或不小于数据长度时整条序列为 `None`。
/// 2. 前 `period` 个涨跌幅求平均得到初始 avgGain / avgLoss，首个 RSI 位于 `i = period`。
/// 3. 之后 `avg = (avg * (period - 1) + current) / period`。
/// 4. avgLoss = 0 时：avgGain > 0 记 100，两者皆 0 记 50。
pub fn rsi(closes: &[f64], period: usize) -> Series {
    if period == 0 || period >= closes.len() {
        return vec![None; closes.len()];
    }

    let p = as_f64(period);
    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }
    let mut avg_gain = gains / p;
    let mut avg_loss = losses / p;

    let mut out = vec![None; period];
    out.reserve(closes.len() - period);
    out.push(Some(rsi_value(avg_gain, avg_loss)));

    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        avg_gain = (avg_gain * (p - 1.0) + change.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-change).max(0.0)) / p;
        out.push(Some(rsi_value(avg_gain, avg_loss)));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain > 0.0 { 100.0 } else { NEUTRAL_RSI }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}
