//! 测试替身：基于内存的端口实现，供各 crate 的集成测试使用。

use crate::common::Direction;
use crate::signal::entity::{CloseReason, Signal, SignalStatus};
use crate::signal::port::SignalStore;
use crate::store::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// # Summary
/// 基于 DashMap 的内存信号存储。
///
/// # Invariants
/// - 关闭已 Closed 的信号返回 `Ok(false)`，不改写收益。
/// - `fail_updates` 打开时 `update_status` 一律返回数据库错误，用于模拟写入失败。
/// - `fail_lookups` 打开时 `exists_recent` 返回数据库错误。
#[derive(Default)]
pub struct MemSignalStore {
    signals: DashMap<String, Signal>,
    fail_updates: AtomicBool,
    fail_lookups: AtomicBool,
    applied_updates: AtomicUsize,
}

impl MemSignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 打开或关闭写入失败注入
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// 打开或关闭查重失败注入
    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// 真正生效的状态更新次数
    pub fn applied_updates(&self) -> usize {
        self.applied_updates.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: &str) -> Option<Signal> {
        self.signals.get(id).map(|s| s.value().clone())
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

#[async_trait]
impl SignalStore for MemSignalStore {
    async fn insert(&self, signal: &Signal) -> Result<String, StoreError> {
        self.signals.insert(signal.id.clone(), signal.clone());
        Ok(signal.id.clone())
    }

    async fn update_status(
        &self,
        id: &str,
        status: SignalStatus,
        close_reason: Option<CloseReason>,
        pnl_percent: Option<f64>,
    ) -> Result<bool, StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected failure".to_string()));
        }
        let Some(mut entry) = self.signals.get_mut(id) else {
            return Ok(false);
        };
        if entry.status == SignalStatus::Closed {
            return Ok(false);
        }
        entry.status = status;
        if status == SignalStatus::Closed {
            entry.closed_at = Some(Utc::now());
            entry.close_reason = close_reason;
            entry.pnl_percent = pnl_percent;
        }
        self.applied_updates.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn find_by_status(&self, status: SignalStatus) -> Result<Vec<Signal>, StoreError> {
        let mut found: Vec<Signal> = self
            .signals
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.value().clone())
            .collect();
        found.sort_by_key(|s| s.created_at);
        Ok(found)
    }

    async fn exists_recent(
        &self,
        strategy_id: &str,
        symbol: &str,
        direction: Direction,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected lookup failure".to_string()));
        }
        Ok(self.signals.iter().any(|s| {
            s.strategy_id == strategy_id
                && s.symbol == symbol
                && s.direction == direction
                && s.created_at >= since
        }))
    }
}
