use crate::trigger::exit_hit;
use dashmap::DashMap;
use futures::StreamExt;
use pulse_bus::EventBus;
use pulse_core::engine::entity::{SignalCreated, SignalStatusChanged};
use pulse_core::market::entity::PriceTick;
use pulse_core::signal::entity::{CloseReason, Signal, SignalStatus};
use pulse_core::signal::port::SignalStore;
use pulse_core::store::error::StoreError;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 索引内信号的阶段。Closed 的信号直接移出索引。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    // 已发起关闭，等待存储确认
    Closing,
}

#[derive(Debug, Clone)]
struct Tracked {
    signal: Signal,
    phase: Phase,
}

/// # Summary
/// 信号监控器。
///
/// # Invariants
/// - 每个 Active 信号在索引中恰好有一条记录，Closed 信号没有记录。
/// - 关闭前先把信号置为 Closing，并发到达的价格看到 Closing 后不会再次发起关闭。
/// - 只有存储确认后才从索引移除；存储失败时信号回到 Active，等待下一次价格。
/// - 对已关闭的信号重复关闭不会重复写入收益，也不会重复发布状态变更事件。
pub struct SignalMonitor {
    store: Arc<dyn SignalStore>,
    bus: Arc<EventBus>,
    index: DashMap<String, Vec<Tracked>>,
}

impl SignalMonitor {
    pub fn new(store: Arc<dyn SignalStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            index: DashMap::new(),
        }
    }

    /// 索引中的信号数量 (含 Closing)
    pub fn tracked_count(&self) -> usize {
        self.index.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_tracked(&self, id: &str) -> bool {
        self.index
            .iter()
            .any(|e| e.value().iter().any(|t| t.signal.id == id))
    }

    /// # Summary
    /// 从存储重建索引。
    ///
    /// # Logic
    /// 1. 读取全部 Active 信号并按 symbol 分组。
    /// 2. 正在关闭中的信号保留 Closing 阶段，避免重建后被再次关闭。
    ///
    /// # Returns
    /// * `Result<usize, StoreError>` - 重建后的信号数量。
    pub async fn reload(&self) -> Result<usize, StoreError> {
        let active = self.store.find_by_status(SignalStatus::Active).await?;
        let closing: HashSet<String> = self
            .index
            .iter()
            .flat_map(|e| {
                e.value()
                    .iter()
                    .filter(|t| t.phase == Phase::Closing)
                    .map(|t| t.signal.id.clone())
                    .collect::<Vec<_>>()
            })
            .collect();

        self.index.clear();
        let count = active.len();
        for signal in active {
            let phase = if closing.contains(&signal.id) {
                Phase::Closing
            } else {
                Phase::Active
            };
            self.index
                .entry(signal.symbol.clone())
                .or_default()
                .push(Tracked { signal, phase });
        }
        info!("Monitor: tracking {} active signals", count);
        Ok(count)
    }

    /// # Summary
    /// 新信号加入索引，重复的 ID 被忽略。
    pub fn on_signal_created(&self, event: &SignalCreated) {
        if event.signal.status != SignalStatus::Active {
            return;
        }
        let mut entry = self.index.entry(event.signal.symbol.clone()).or_default();
        if entry.iter().any(|t| t.signal.id == event.id) {
            return;
        }
        debug!("Monitor: tracking {} on {}", event.id, event.signal.symbol);
        entry.push(Tracked {
            signal: event.signal.clone(),
            phase: Phase::Active,
        });
    }

    /// # Summary
    /// 处理外部状态变更。
    ///
    /// # Logic
    /// 1. 已不在索引中的 Closed 信号是本监控器自己关闭的结果，忽略。
    /// 2. 其余变更 (例如人工关闭) 一律整体重建索引。
    pub async fn on_status_changed(&self, event: &SignalStatusChanged) -> Result<(), StoreError> {
        if event.status == SignalStatus::Closed && !self.is_tracked(&event.id) {
            return Ok(());
        }
        info!(
            "Monitor: external status change {} -> {}, reloading",
            event.id, event.status
        );
        self.reload().await.map(|_| ())
    }

    /// # Summary
    /// 用最新价格检查该 symbol 的所有活跃信号。
    ///
    /// # Logic
    /// 1. 在索引锁内挑出触及价位的 Active 信号并置为 Closing。
    /// 2. 释放锁后逐个关闭。
    ///
    /// # Returns
    /// * `usize` - 本次真正关闭的信号数量。
    pub async fn on_tick(&self, tick: &PriceTick) -> usize {
        let hits: Vec<(Signal, CloseReason)> = {
            let Some(mut entry) = self.index.get_mut(&tick.symbol) else {
                return 0;
            };
            entry
                .iter_mut()
                .filter(|t| t.phase == Phase::Active)
                .filter_map(|t| {
                    let reason = exit_hit(&t.signal, tick.price)?;
                    t.phase = Phase::Closing;
                    Some((t.signal.clone(), reason))
                })
                .collect()
        };

        let mut closed = 0;
        for (signal, reason) in hits {
            if let Ok(true) = self.finish_close(&signal, reason, tick.price).await {
                closed += 1;
            }
        }
        closed
    }

    /// # Summary
    /// 以指定原因与价格关闭信号 (供人工或超时关闭使用)。
    ///
    /// # Logic
    /// 1. 信号在索引中且处于 Closing 时说明已有关闭在进行，直接返回 `Ok(false)`。
    /// 2. 否则置为 Closing 并执行关闭；不在索引中的信号仍交给存储判定。
    ///
    /// # Returns
    /// * `Result<bool, StoreError>` - 是否真正发生了关闭。
    pub async fn close_signal(
        &self,
        signal: &Signal,
        reason: CloseReason,
        price: f64,
    ) -> Result<bool, StoreError> {
        if let Some(mut entry) = self.index.get_mut(&signal.symbol)
            && let Some(tracked) = entry.iter_mut().find(|t| t.signal.id == signal.id)
        {
            if tracked.phase == Phase::Closing {
                return Ok(false);
            }
            tracked.phase = Phase::Closing;
        }
        self.finish_close(signal, reason, price).await
    }

    async fn finish_close(
        &self,
        signal: &Signal,
        reason: CloseReason,
        price: f64,
    ) -> Result<bool, StoreError> {
        let pnl = signal.pnl_at(price);
        match self
            .store
            .update_status(&signal.id, SignalStatus::Closed, Some(reason), Some(pnl))
            .await
        {
            Ok(applied) => {
                self.remove(&signal.symbol, &signal.id);
                if applied {
                    info!(
                        "Monitor: closed {} {} {} at {} ({}, pnl {:.2}%)",
                        signal.id, signal.direction, signal.symbol, price, reason, pnl
                    );
                    self.bus.publish_signal_status_changed(SignalStatusChanged {
                        id: signal.id.clone(),
                        status: SignalStatus::Closed,
                    });
                } else {
                    debug!("Monitor: {} was already closed", signal.id);
                }
                Ok(applied)
            }
            Err(e) => {
                warn!("Monitor: failed to close {}: {}", signal.id, e);
                self.set_phase(&signal.symbol, &signal.id, Phase::Active);
                Err(e)
            }
        }
    }

    fn remove(&self, symbol: &str, id: &str) {
        let now_empty = match self.index.get_mut(symbol) {
            Some(mut entry) => {
                entry.retain(|t| t.signal.id != id);
                entry.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.index.remove_if(symbol, |_, v| v.is_empty());
        }
    }

    fn set_phase(&self, symbol: &str, id: &str, phase: Phase) {
        if let Some(mut entry) = self.index.get_mut(symbol)
            && let Some(tracked) = entry.iter_mut().find(|t| t.signal.id == id)
        {
            tracked.phase = phase;
        }
    }

    /// # Summary
    /// 启动监控循环。
    ///
    /// # Logic
    /// 1. 先订阅三个主题，再从存储加载活跃信号，保证加载期间的新信号不会丢失。
    /// 2. 顺序处理价格、新信号与状态变更事件。
    pub async fn run(self: Arc<Self>) -> Result<JoinHandle<()>, StoreError> {
        let mut ticks = self.bus.subscribe_price_tick();
        let mut created = self.bus.subscribe_signal_created();
        let mut changed = self.bus.subscribe_signal_status_changed();
        self.reload().await?;

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(tick) = ticks.next() => {
                        self.on_tick(&tick).await;
                    }
                    Some(event) = created.next() => {
                        self.on_signal_created(&event);
                    }
                    Some(event) = changed.next() => {
                        if let Err(e) = self.on_status_changed(&event).await {
                            warn!("Monitor: reload failed: {}", e);
                        }
                    }
                    else => break,
                }
            }
            info!("Monitor: event streams closed");
        }))
    }
}
