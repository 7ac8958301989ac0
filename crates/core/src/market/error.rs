use thiserror::Error;

/// # Summary
/// 市场数据域错误枚举，处理网络、解析及订阅限制等问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug)]
pub enum MarketError {
    // 网络层错误，包含底层 WebSocket 客户端错误信息
    #[error("Network error: {0}")]
    Network(String),
    // 数据解析错误，如 JSON 格式不匹配
    #[error("Parse error: {0}")]
    Parse(String),
    // 订阅参数非法 (空列表、未知周期等)
    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),
    // 未知或未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}
