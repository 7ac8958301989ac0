//! 技术指标库。
//!
//! 所有函数均为无状态纯函数，输出与输入序列逐一对齐。预热期内的位置返回 `None`
//! (而非 0)，调用方必须把 `None` 视为“无值”并让它在比较中传播：与 `None` 的比较永不成立。

mod bands;
mod cross;
mod ma;
mod rsi;

pub use bands::{Bands, bollinger_bands};
pub use cross::{Cross, detect_crossover};
pub use ma::{ema, sma};
pub use rsi::{DEFAULT_RSI_PERIOD, rsi};

/// 对齐后的指标输出序列。
pub type Series = Vec<Option<f64>>;

#[allow(clippy::cast_precision_loss)]
pub(crate) fn as_f64(n: usize) -> f64 {
    n as f64
}
