use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use pulse_bus::EventBus;
use pulse_core::common::{Direction, TimeFrame};
use pulse_core::engine::entity::{SignalCreated, SignalStatusChanged};
use pulse_core::market::entity::PriceTick;
use pulse_core::signal::entity::{CloseReason, Signal, SignalStatus};
use pulse_core::signal::port::SignalStore;
use pulse_core::store::error::StoreError;
use pulse_core::test_utils::MemSignalStore;
use pulse_monitor::SignalMonitor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

fn signal(id: &str, direction: Direction, stop_loss: f64, take_profit: f64) -> Signal {
    Signal {
        id: id.to_string(),
        symbol: "BTCUSDT".to_string(),
        strategy_id: "builtin".to_string(),
        strategy_name: "MA Crossover".to_string(),
        strategy_category: Some("trend".to_string()),
        direction,
        entry_price: 100.0,
        stop_loss: Some(stop_loss),
        take_profit: Some(take_profit),
        timeframe: TimeFrame::Hour1,
        status: SignalStatus::Active,
        reason: "test".to_string(),
        created_at: Utc::now(),
        activated_at: Some(Utc::now()),
        closed_at: None,
        close_reason: None,
        pnl_percent: None,
    }
}

fn tick(price: f64) -> PriceTick {
    PriceTick {
        symbol: "BTCUSDT".to_string(),
        price,
    }
}

async fn setup(signals: &[Signal]) -> anyhow::Result<(Arc<MemSignalStore>, Arc<EventBus>, SignalMonitor)> {
    let store = Arc::new(MemSignalStore::new());
    for s in signals {
        store.insert(s).await?;
    }
    let bus = Arc::new(EventBus::new(64));
    let monitor = SignalMonitor::new(store.clone(), bus.clone());
    monitor.reload().await?;
    Ok((store, bus, monitor))
}

/// # Summary
/// BUY 信号触及止盈与止损。
///
/// # Logic
/// 1. 价格 105 关闭第一个信号：TP，收益 +5%。
/// 2. 价格 97 关闭第二个信号：SL，收益 -3%。
#[tokio::test]
async fn test_buy_take_profit_and_stop_loss() -> anyhow::Result<()> {
    let (store, _bus, monitor) = setup(&[signal("tp", Direction::Buy, 98.0, 104.0)]).await?;
    assert_eq!(monitor.on_tick(&tick(101.0)).await, 0);
    assert_eq!(monitor.on_tick(&tick(105.0)).await, 1);

    let closed = store.get("tp").unwrap();
    assert_eq!(closed.status, SignalStatus::Closed);
    assert_eq!(closed.close_reason, Some(CloseReason::Tp));
    assert!((closed.pnl_percent.unwrap() - 5.0).abs() < 1e-9);
    assert!(!monitor.is_tracked("tp"));

    let (store, _bus, monitor) = setup(&[signal("sl", Direction::Buy, 98.0, 104.0)]).await?;
    assert_eq!(monitor.on_tick(&tick(97.0)).await, 1);
    let closed = store.get("sl").unwrap();
    assert_eq!(closed.close_reason, Some(CloseReason::Sl));
    assert!((closed.pnl_percent.unwrap() + 3.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_sell_signal_pnl_is_mirrored() -> anyhow::Result<()> {
    let (store, _bus, monitor) = setup(&[signal("s", Direction::Sell, 102.0, 96.0)]).await?;
    assert_eq!(monitor.on_tick(&tick(95.0)).await, 1);
    let closed = store.get("s").unwrap();
    assert_eq!(closed.close_reason, Some(CloseReason::Tp));
    assert!((closed.pnl_percent.unwrap() - 5.0).abs() < 1e-9);
    Ok(())
}

/// # Summary
/// 同一价格同时越过两侧价位时以止盈为准。
#[tokio::test]
async fn test_take_profit_wins_when_both_crossed() -> anyhow::Result<()> {
    let (store, _bus, monitor) = setup(&[signal("both", Direction::Buy, 110.0, 104.0)]).await?;
    monitor.on_tick(&tick(105.0)).await;
    assert_eq!(store.get("both").unwrap().close_reason, Some(CloseReason::Tp));
    Ok(())
}

/// # Summary
/// 存储写入失败时信号保留在索引中，下一次价格可以再次关闭。
#[tokio::test]
async fn test_store_failure_keeps_signal_indexed() -> anyhow::Result<()> {
    let (store, _bus, monitor) = setup(&[signal("f", Direction::Buy, 98.0, 104.0)]).await?;
    store.set_fail_updates(true);
    assert_eq!(monitor.on_tick(&tick(105.0)).await, 0);
    assert!(monitor.is_tracked("f"));
    assert_eq!(store.get("f").unwrap().status, SignalStatus::Active);

    store.set_fail_updates(false);
    assert_eq!(monitor.on_tick(&tick(105.0)).await, 1);
    assert!(!monitor.is_tracked("f"));
    Ok(())
}

/// # Summary
/// 重复关闭不重复写入收益，也不重复发布事件。
#[tokio::test]
async fn test_close_is_idempotent() -> anyhow::Result<()> {
    let s = signal("dup", Direction::Buy, 98.0, 104.0);
    let (store, bus, monitor) = setup(std::slice::from_ref(&s)).await?;
    let mut changed = bus.subscribe_signal_status_changed();

    assert!(monitor.close_signal(&s, CloseReason::Manual, 101.0).await?);
    assert!(!monitor.close_signal(&s, CloseReason::Tp, 110.0).await?);

    assert_eq!(store.applied_updates(), 1);
    let stored = store.get("dup").unwrap();
    assert_eq!(stored.close_reason, Some(CloseReason::Manual));
    assert!((stored.pnl_percent.unwrap() - 1.0).abs() < 1e-9);

    let first = timeout(Duration::from_secs(1), changed.next()).await?.unwrap();
    assert_eq!(first.id, "dup");
    assert!(
        timeout(Duration::from_millis(100), changed.next())
            .await
            .is_err()
    );
    Ok(())
}

/// # Summary
/// 写入阻塞的存储，用于观察关闭进行中的状态。
struct GatedStore {
    inner: MemSignalStore,
    gate: Semaphore,
    update_calls: AtomicUsize,
}

#[async_trait]
impl SignalStore for GatedStore {
    async fn insert(&self, signal: &Signal) -> Result<String, StoreError> {
        self.inner.insert(signal).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: SignalStatus,
        close_reason: Option<CloseReason>,
        pnl_percent: Option<f64>,
    ) -> Result<bool, StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        self.inner
            .update_status(id, status, close_reason, pnl_percent)
            .await
    }

    async fn find_by_status(&self, status: SignalStatus) -> Result<Vec<Signal>, StoreError> {
        self.inner.find_by_status(status).await
    }

    async fn exists_recent(
        &self,
        strategy_id: &str,
        symbol: &str,
        direction: Direction,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner
            .exists_recent(strategy_id, symbol, direction, since)
            .await
    }
}

/// # Summary
/// 关闭写入未确认期间到达的价格不会再次发起关闭。
///
/// # Logic
/// 1. 存储写入被闸门挡住，第一笔价格触发的关闭挂起。
/// 2. 第二笔价格看到 Closing 阶段，立即返回，不调用存储。
/// 3. 打开闸门后第一笔关闭完成，总共只写入一次。
#[tokio::test]
async fn test_in_flight_close_blocks_second_tick() -> anyhow::Result<()> {
    let store = Arc::new(GatedStore {
        inner: MemSignalStore::new(),
        gate: Semaphore::new(0),
        update_calls: AtomicUsize::new(0),
    });
    store.insert(&signal("g", Direction::Buy, 98.0, 104.0)).await?;
    let monitor = Arc::new(SignalMonitor::new(
        store.clone(),
        Arc::new(EventBus::new(64)),
    ));
    monitor.reload().await?;

    let first = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.on_tick(&tick(105.0)).await })
    };
    timeout(Duration::from_secs(1), async {
        while store.update_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await?;

    assert_eq!(monitor.on_tick(&tick(106.0)).await, 0);
    assert_eq!(store.update_calls.load(Ordering::SeqCst), 1);
    assert!(monitor.is_tracked("g"));

    store.gate.add_permits(1);
    assert_eq!(first.await?, 1);
    assert_eq!(store.inner.applied_updates(), 1);
    assert!(!monitor.is_tracked("g"));
    Ok(())
}

/// # Summary
/// 监控循环：新信号入索引、价格触发关闭、外部关闭触发重建。
#[tokio::test]
async fn test_run_loop_follows_bus_events() -> anyhow::Result<()> {
    let store = Arc::new(MemSignalStore::new());
    let bus = Arc::new(EventBus::new(64));
    let monitor = Arc::new(SignalMonitor::new(store.clone(), bus.clone()));
    let handle = monitor.clone().run().await?;
    let mut changed = bus.subscribe_signal_status_changed();

    // 新信号经总线进入索引
    let a = signal("a", Direction::Buy, 98.0, 104.0);
    store.insert(&a).await?;
    bus.publish_signal_created(SignalCreated {
        id: a.id.clone(),
        signal: a.clone(),
    });
    let b = signal("b", Direction::Buy, 90.0, 120.0);
    store.insert(&b).await?;
    bus.publish_signal_created(SignalCreated {
        id: b.id.clone(),
        signal: b.clone(),
    });

    timeout(Duration::from_secs(1), async {
        while monitor.tracked_count() < 2 {
            tokio::task::yield_now().await;
        }
    })
    .await?;

    // 价格关闭 a
    bus.publish_price_tick(tick(105.0));
    let event = timeout(Duration::from_secs(1), changed.next()).await?.unwrap();
    assert_eq!(event.id, "a");

    // b 被人工关闭，外部事件触发重建后不再跟踪
    store
        .update_status("b", SignalStatus::Closed, Some(CloseReason::Manual), Some(0.0))
        .await?;
    bus.publish_signal_status_changed(SignalStatusChanged {
        id: "b".into(),
        status: SignalStatus::Closed,
    });
    timeout(Duration::from_secs(1), async {
        while monitor.is_tracked("b") {
            tokio::task::yield_now().await;
        }
    })
    .await?;
    assert_eq!(monitor.tracked_count(), 0);

    handle.abort();
    Ok(())
}
