use crate::{Series, as_f64};

/// # Summary
/// 简单移动平均。
///
/// # Logic
/// 1. 周期非法 (0 或大于数据长度) 时整条序列为 `None`。
/// 2. `i < period - 1` 处于预热期，返回 `None`。
/// 3. 其余位置为 `data[i-period+1..=i]` 的算术平均，使用滑动和累加。
pub fn sma(data: &[f64], period: usize) -> Series {
    if period == 0 || period > data.len() {
        return vec![None; data.len()];
    }

    let divisor = as_f64(period);
    let mut out = Vec::with_capacity(data.len());
    let mut window_sum = 0.0;
    for (i, value) in data.iter().enumerate() {
        window_sum += value;
        if i >= period {
            window_sum -= data[i - period];
        }
        if i + 1 >= period {
            out.push(Some(window_sum / divisor));
        } else {
            out.push(None);
        }
    }
    out
}

/// # Summary
/// 指数移动平均。
///
/// # Logic
/// 1. 在 `i = period - 1` 处以前 `period` 个值的 SMA 作为种子。
/// 2. 之后按 `ema[i] = price[i] * k + ema[i-1] * (1 - k)` 递推，`k = 2 / (period + 1)`。
pub fn ema(data: &[f64], period: usize) -> Series {
    if period == 0 || period > data.len() {
        return vec![None; data.len()];
    }

    let k = 2.0 / (as_f64(period) + 1.0);
    let seed = data[..period].iter().sum::<f64>() / as_f64(period);

    let mut out = vec![None; period - 1];
    out.reserve(data.len() + 1 - period);
    out.push(Some(seed));

    let mut prev = seed;
    for price in &data[period..] {
        prev = price * k + prev * (1.0 - k);
        out.push(Some(prev));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_warmup_and_mean() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(out, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn test_sma_invalid_period() {
        assert_eq!(sma(&[1.0, 2.0], 3), vec![None, None]);
        assert_eq!(sma(&[1.0, 2.0], 0), vec![None, None]);
        assert!(sma(&[], 3).is_empty());
    }

    #[test]
    fn test_ema_seed_equals_sma() {
        let data = [2.0, 4.0, 6.0, 8.0, 10.0, 12.0];
        let e = ema(&data, 3);
        let s = sma(&data, 3);
        assert_eq!(e[..2], [None, None]);
        assert_eq!(e[2], s[2]);

        // k = 0.5: 4*0.5 + 8*0.5 = 6
        let next = e[3].unwrap();
        assert!((next - 6.0).abs() < 1e-12);
    }
}
