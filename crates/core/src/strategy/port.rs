use crate::store::error::StoreError;
use crate::strategy::entity::StrategyDefinition;
use async_trait::async_trait;

/// # Summary
/// 只读策略目录接口。
///
/// # Invariants
/// - 返回的定义在一次评估周期内视为不可变。
#[async_trait]
pub trait StrategyCatalog: Send + Sync {
    /// # Summary
    /// 列出所有可用策略。
    async fn list(&self) -> Result<Vec<StrategyDefinition>, StoreError>;
}
