use crate::value::{Scalar, Series};
use pulse_core::market::entity::Candle;
use std::sync::Arc;

/// # Summary
/// 脚本可见的行情序列 (`open`/`high`/`low`/`close`/`volume`)。
///
/// # Invariants
/// - 各列长度相同，按时间升序排列。
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    open: Arc<Vec<Scalar>>,
    high: Arc<Vec<Scalar>>,
    low: Arc<Vec<Scalar>>,
    close: Arc<Vec<Scalar>>,
    volume: Arc<Vec<Scalar>>,
    len: usize,
}

impl MarketData {
    pub fn from_candles(candles: &[Candle]) -> Self {
        let column = |f: fn(&Candle) -> f64| -> Arc<Vec<Scalar>> {
            Arc::new(candles.iter().map(|c| Scalar::Num(f(c))).collect())
        };
        Self {
            open: column(|c| c.open),
            high: column(|c| c.high),
            low: column(|c| c.low),
            close: column(|c| c.close),
            volume: column(|c| c.volume),
            len: candles.len(),
        }
    }

    /// 只有收盘价的行情，其余价格列与收盘价相同，成交量为 0
    pub fn from_closes(closes: &[f64]) -> Self {
        let prices: Arc<Vec<Scalar>> = Arc::new(closes.iter().copied().map(Scalar::Num).collect());
        Self {
            open: Arc::clone(&prices),
            high: Arc::clone(&prices),
            low: Arc::clone(&prices),
            close: prices,
            volume: Arc::new(vec![Scalar::Num(0.0); closes.len()]),
            len: closes.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 指定列的前 `len` 个元素
    pub(crate) fn series(&self, name: &str, len: usize) -> Option<Series> {
        let column = match name {
            "open" => &self.open,
            "high" => &self.high,
            "low" => &self.low,
            "close" => &self.close,
            "volume" => &self.volume,
            _ => return None,
        };
        Some(Series::prefix(column, len))
    }

    /// 第 `index` 根的收盘价
    pub(crate) fn close_at(&self, index: usize) -> Option<f64> {
        self.close.get(index).and_then(Scalar::num)
    }
}
