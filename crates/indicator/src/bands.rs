use crate::ma::sma;
use crate::{Series, as_f64};

/// # Summary
/// 布林带三条轨道。
#[derive(Debug, Clone, PartialEq)]
pub struct Bands {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
}

/// # Summary
/// 布林带：SMA 中轨 ± `std_dev` 倍样本标准差。
///
/// # Logic
/// 1. 中轨为 `sma(data, period)`。
/// 2. 标准差统一使用样本标准差 (除以 `period - 1`)，因此 `period < 2` 时上下轨全部为 `None`。
pub fn bollinger_bands(data: &[f64], period: usize, std_dev: f64) -> Bands {
    let middle = sma(data, period);
    let mut upper = vec![None; data.len()];
    let mut lower = vec![None; data.len()];

    if period < 2 {
        return Bands {
            upper,
            middle,
            lower,
        };
    }

    for (i, mean) in middle.iter().enumerate() {
        let Some(mean) = *mean else { continue };
        let window = &data[i + 1 - period..=i];
        let variance =
            window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / as_f64(period - 1);
        let sd = variance.sqrt();
        upper[i] = Some(mean + sd * std_dev);
        lower[i] = Some(mean - sd * std_dev);
    }

    Bands {
        upper,
        middle,
        lower,
    }
}
