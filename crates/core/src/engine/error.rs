use crate::market::error::MarketError;
use crate::store::error::StoreError;
use thiserror::Error;

/// # Summary
/// 引擎域错误枚举。
///
/// # Invariants
/// - 涵盖策略脚本、行情接入及底层存储访问的失败场景。
#[derive(Error, Debug)]
pub enum EngineError {
    // 策略脚本编译或执行失败
    #[error("Script error in strategy {strategy_id}: {message}")]
    Script {
        strategy_id: String,
        message: String,
    },
    // 行情数据获取错误
    #[error("Market error: {0}")]
    Market(#[from] MarketError),
    // 存储访问错误
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    // 引擎已在运行
    #[error("Engine already running")]
    AlreadyRunning,
}
