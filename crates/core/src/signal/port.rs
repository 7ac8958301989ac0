use crate::common::Direction;
use crate::signal::entity::{CloseReason, Signal, SignalStatus};
use crate::store::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// # Summary
/// 信号持久化接口。
///
/// # Invariants
/// - `update_status` 必须幂等：对已 Closed 的信号再次关闭返回 `Ok(false)`，
///   不得重复写入收益。
/// - 实现类必须保证线程安全 (`Send` + `Sync`)。
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// # Summary
    /// 写入新信号。
    ///
    /// # Returns
    /// * `Result<String, StoreError>` - 成功返回信号 ID。
    async fn insert(&self, signal: &Signal) -> Result<String, StoreError>;

    /// # Summary
    /// 更新信号状态。
    ///
    /// # Logic
    /// 1. 仅当记录存在且尚未 Closed 时执行更新。
    /// 2. 迁移到 Closed 时一并写入平仓原因、收益与平仓时间。
    ///
    /// # Arguments
    /// * `id` - 信号 ID。
    /// * `status` - 目标状态。
    /// * `close_reason` - 平仓原因。
    /// * `pnl_percent` - 收益率。
    ///
    /// # Returns
    /// * `Result<bool, StoreError>` - 是否真正发生了更新。
    async fn update_status(
        &self,
        id: &str,
        status: SignalStatus,
        close_reason: Option<CloseReason>,
        pnl_percent: Option<f64>,
    ) -> Result<bool, StoreError>;

    /// # Summary
    /// 按状态查询信号。
    async fn find_by_status(&self, status: SignalStatus) -> Result<Vec<Signal>, StoreError>;

    /// # Summary
    /// 查询回溯窗口内是否已存在同策略、同标的、同方向的信号，用于去重。
    async fn exists_recent(
        &self,
        strategy_id: &str,
        symbol: &str,
        direction: Direction,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
