use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use pulse_bus::EventBus;
use pulse_core::common::time::FakeClockProvider;
use pulse_core::common::{Direction, TimeFrame};
use pulse_core::engine::error::EngineError;
use pulse_core::market::entity::KlineMessage;
use pulse_core::market::error::MarketError;
use pulse_core::market::port::{FeedStatus, KlineStream, MarketDataProvider};
use pulse_core::signal::entity::SignalStatus;
use pulse_core::signal::port::SignalStore;
use pulse_core::strategy::entity::{ExitRule, StrategyBody, StrategyDefinition};
use pulse_core::test_utils::MemSignalStore;
use pulse_engine::{EngineSettings, SignalEngine, StaticCatalog, builtin_strategies};
use pulse_kuri::Limits;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;

/// # Summary
/// 模拟行情源，消息由测试通过通道推送。
struct MockFeed {
    rx: Mutex<Option<mpsc::UnboundedReceiver<KlineMessage>>>,
}

#[async_trait]
impl MarketDataProvider for MockFeed {
    async fn subscribe(&self, _: &[String], _: &[TimeFrame]) -> Result<KlineStream, MarketError> {
        let mut rx = self
            .rx
            .lock()
            .await
            .take()
            .ok_or_else(|| MarketError::InvalidSubscription("already subscribed".into()))?;
        let s = async_stream::stream! {
            while let Some(msg) = rx.recv().await {
                yield msg;
            }
        };
        Ok(Box::pin(s))
    }

    fn status(&self) -> FeedStatus {
        FeedStatus {
            connected: true,
            subscription_count: 1,
        }
    }
}

fn kline(i: u32, close: f64, closed: bool) -> KlineMessage {
    KlineMessage {
        symbol: "BTCUSDT".to_string(),
        timeframe: TimeFrame::Hour1,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1.0,
        open_time: i64::from(i) * 3_600,
        is_closed: closed,
    }
}

fn settings() -> EngineSettings {
    EngineSettings {
        symbols: vec!["BTCUSDT".to_string()],
        timeframes: vec![TimeFrame::Hour1],
        window_capacity: 200,
        min_candles: 50,
        workers: 2,
        duplicate_lookback: chrono::TimeDelta::minutes(60),
        limits: Limits::default(),
    }
}

struct Harness {
    engine: SignalEngine,
    store: Arc<MemSignalStore>,
    bus: Arc<EventBus>,
    tx: mpsc::UnboundedSender<KlineMessage>,
}

fn harness() -> Harness {
    let rsi = builtin_strategies()
        .into_iter()
        .filter(|s| s.name == "RSI Divergence")
        .collect();
    harness_with(rsi, settings())
}

fn harness_with(strategies: Vec<StrategyDefinition>, settings: EngineSettings) -> Harness {
    let (tx, rx) = mpsc::unbounded_channel();
    let store = Arc::new(MemSignalStore::new());
    let bus = Arc::new(EventBus::new(1024));
    let engine = SignalEngine::new(
        Arc::new(MockFeed {
            rx: Mutex::new(Some(rx)),
        }),
        Arc::new(StaticCatalog::new(strategies)),
        store.clone(),
        bus.clone(),
        Arc::new(FakeClockProvider::new(Utc::now())),
        settings,
    );
    Harness {
        engine,
        store,
        bus,
        tx,
    }
}

/// # Summary
/// 收盘 K 线驱动策略产生信号，回溯窗口内的重复信号被抑制。
///
/// # Logic
/// 1. 推送 60 根持续下跌的收盘 K 线，RSI 一直低于 30。
/// 2. 第 50 根时窗口满足最少根数，产生一个 BUY 信号并发布 SignalCreated。
/// 3. 之后每根都会再次命中，但同策略同方向的信号已存在，全部被抑制。
#[tokio::test]
async fn test_closed_candles_produce_one_signal() -> anyhow::Result<()> {
    let h = harness();
    let mut created = h.bus.subscribe_signal_created();
    h.engine.start().await?;

    for i in 0..60 {
        h.tx.send(kline(i, 200.0 - f64::from(i), true))?;
    }

    let event = timeout(Duration::from_secs(5), created.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("bus closed"))?;
    let signal = event.signal;
    assert_eq!(signal.direction, Direction::Buy);
    assert_eq!(signal.status, SignalStatus::Active);
    assert_eq!(signal.entry_price, 151.0);
    assert_eq!(signal.strategy_category.as_deref(), Some("mean-reversion"));
    assert!((signal.stop_loss.unwrap() - 151.0 * 0.98).abs() < 1e-9);
    assert!((signal.take_profit.unwrap() - 151.0 * 1.04).abs() < 1e-9);

    // 等待剩余 K 线处理完
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.store.find_by_status(SignalStatus::Active).await?.len(), 1);

    let status = h.engine.status();
    assert!(status.running);
    assert_eq!(status.buffered_symbol_timeframe_pairs, 1);
    assert_eq!(status.subscription_count, 1);

    h.engine.stop().await;
    assert!(!h.engine.status().running);
    Ok(())
}

/// # Summary
/// 每条消息都发布价格，未收盘消息不会触发收盘事件。
#[tokio::test]
async fn test_every_message_publishes_a_tick() -> anyhow::Result<()> {
    let h = harness();
    let mut ticks = h.bus.subscribe_price_tick();
    let mut closed = h.bus.subscribe_candle_closed();
    h.engine.start().await?;

    h.tx.send(kline(0, 10.0, false))?;
    h.tx.send(kline(0, 11.0, true))?;

    let first = timeout(Duration::from_secs(5), ticks.next()).await?.unwrap();
    let second = timeout(Duration::from_secs(5), ticks.next()).await?.unwrap();
    assert_eq!((first.price, second.price), (10.0, 11.0));

    let candle = timeout(Duration::from_secs(5), closed.next()).await?.unwrap();
    assert_eq!(candle.candle.close, 11.0);
    assert_eq!(h.engine.aggregator().len("BTCUSDT", TimeFrame::Hour1), 1);
    Ok(())
}

#[tokio::test]
async fn test_start_twice_is_rejected() -> anyhow::Result<()> {
    let h = harness();
    h.engine.start().await?;
    assert!(matches!(
        h.engine.start().await,
        Err(EngineError::AlreadyRunning)
    ));
    Ok(())
}

/// # Summary
/// 行情流结束后引擎标记为停止。
#[tokio::test]
async fn test_stream_end_stops_engine() -> anyhow::Result<()> {
    let h = harness();
    h.engine.start().await?;
    assert!(h.engine.status().running);

    drop(h.tx);
    timeout(Duration::from_secs(5), async {
        while h.engine.status().running {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

/// # Summary
/// 接入任务远远领先于 worker 时，每根收盘 K 线仍按它自己的窗口评估。
///
/// # Logic
/// 1. 启动前就把 60 根收盘 K 线全部排进行情流，单 worker 处理。
/// 2. 脚本只在收盘价等于 151 (第 50 根) 时为真。
/// 3. 该 K 线的事件必须看到以它结尾的窗口，且入场价取自它。
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queued_candles_are_evaluated_on_their_own_window() -> anyhow::Result<()> {
    let exact = StrategyDefinition {
        id: "k-exact".to_string(),
        name: "Exact Close".to_string(),
        category: None,
        body: StrategyBody::Kuri {
            source: "buy_signal = close == 151".to_string(),
        },
        exit_rules: vec![ExitRule::stop_loss_pct(2.0), ExitRule::take_profit_pct(4.0)],
    };
    let mut settings = settings();
    settings.workers = 1;
    let h = harness_with(vec![exact], settings);

    for i in 0..60 {
        h.tx.send(kline(i, 200.0 - f64::from(i), true))?;
    }
    h.engine.start().await?;

    timeout(Duration::from_secs(5), async {
        while h.engine.aggregator().len("BTCUSDT", TimeFrame::Hour1) < 60 || h.store.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let stored = h.store.find_by_status(SignalStatus::Active).await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].entry_price, 151.0);
    assert_eq!(stored[0].direction, Direction::Buy);
    h.engine.stop().await;
    Ok(())
}

/// # Summary
/// 查重失败不阻止信号写入。
#[tokio::test]
async fn test_failed_duplicate_check_still_inserts() -> anyhow::Result<()> {
    let h = harness();
    h.store.set_fail_lookups(true);
    let mut created = h.bus.subscribe_signal_created();
    h.engine.start().await?;

    // 恰好 50 根，只在最后一根评估一次
    for i in 0..50 {
        h.tx.send(kline(i, 200.0 - f64::from(i), true))?;
    }

    let event = timeout(Duration::from_secs(5), created.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("bus closed"))?;
    assert_eq!(event.signal.entry_price, 151.0);
    assert_eq!(h.store.len(), 1);
    Ok(())
}
