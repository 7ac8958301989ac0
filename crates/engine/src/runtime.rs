use crate::evaluator::StrategyEvaluator;
use crate::exit::exit_levels;
use chrono::TimeDelta;
use futures::StreamExt;
use pulse_bus::EventBus;
use pulse_core::common::TimeFrame;
use pulse_core::common::time::TimeProvider;
use pulse_core::config::AppConfig;
use pulse_core::engine::entity::{CandleClosed, EngineStatus, SignalCreated};
use pulse_core::engine::error::EngineError;
use pulse_core::market::entity::PriceTick;
use pulse_core::market::port::MarketDataProvider;
use pulse_core::signal::entity::{Signal, SignalStatus};
use pulse_core::signal::port::SignalStore;
use pulse_core::strategy::entity::{SignalProposal, StrategyDefinition};
use pulse_core::strategy::port::StrategyCatalog;
use pulse_kuri::Limits;
use pulse_market::CandleAggregator;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 每个评估 worker 的待处理队列深度
const WORKER_QUEUE: usize = 256;

/// # Summary
/// 信号引擎运行参数。
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub symbols: Vec<String>,
    pub timeframes: Vec<TimeFrame>,
    pub window_capacity: usize,
    pub min_candles: usize,
    pub workers: usize,
    pub duplicate_lookback: TimeDelta,
    pub limits: Limits,
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            symbols: config.feed.symbols.clone(),
            timeframes: config.feed.timeframes.clone(),
            window_capacity: config.engine.window_capacity,
            min_candles: config.engine.min_candles,
            workers: config.engine.workers,
            duplicate_lookback: TimeDelta::try_minutes(config.engine.duplicate_lookback_minutes)
                .unwrap_or_else(TimeDelta::zero),
            limits: Limits::from(&config.kuri),
        }
    }
}

/// 按 symbol 哈希选择 worker，同一 symbol 始终落在同一个 worker 上
fn worker_index(symbol: &str, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    symbol.hash(&mut hasher);
    let buckets = u64::try_from(workers.max(1)).unwrap_or(1);
    usize::try_from(hasher.finish() % buckets).unwrap_or(0)
}

/// # Summary
/// 收盘事件到信号的处理流水线，由所有 worker 共享。
struct Pipeline {
    aggregator: Arc<CandleAggregator>,
    evaluator: StrategyEvaluator,
    store: Arc<dyn SignalStore>,
    bus: Arc<EventBus>,
    clock: Arc<dyn TimeProvider>,
    strategies: Vec<StrategyDefinition>,
    duplicate_lookback: TimeDelta,
}

impl Pipeline {
    /// # Summary
    /// 处理一根收盘 K 线。
    ///
    /// # Logic
    /// 1. 读取该分区截止到事件 K 线的快照，worker 落后于接入任务时也不会看到之后的 K 线。
    /// 2. 不足最少根数时处于缓冲阶段，直接返回。
    /// 3. 对全部策略求值，单个策略失败只记录日志。
    /// 4. 每个提案以事件 K 线的收盘价作为入场价创建信号。
    async fn on_candle_closed(&self, event: CandleClosed) {
        let candles =
            self.aggregator
                .snapshot_until(&event.symbol, event.timeframe, event.candle.time);
        if candles.len() < self.evaluator.min_candles() {
            debug!(
                "Engine: buffering {} {} ({}/{})",
                event.symbol,
                event.timeframe,
                candles.len(),
                self.evaluator.min_candles()
            );
            return;
        }
        let entry_price = event.candle.close;

        let proposals =
            self.evaluator
                .evaluate_all(&self.strategies, &event.symbol, event.timeframe, &candles);
        for proposal in proposals {
            self.create_signal(&event, entry_price, proposal).await;
        }
    }

    /// # Summary
    /// 把提案落地为 Active 信号。
    ///
    /// # Logic
    /// 1. 回溯窗口内已有同策略、同标的、同方向的信号时丢弃提案；查重本身失败时照常写入。
    /// 2. 计算离场价位，写入存储。
    /// 3. 写入成功后发布 `SignalCreated`；存储失败只记录日志。
    async fn create_signal(&self, event: &CandleClosed, entry_price: f64, proposal: SignalProposal) {
        let now = self.clock.now();
        match self
            .store
            .exists_recent(
                &proposal.strategy_id,
                &event.symbol,
                proposal.direction,
                now - self.duplicate_lookback,
            )
            .await
        {
            Ok(true) => {
                info!(
                    "Engine: duplicate {} signal from {} on {} suppressed",
                    proposal.direction, proposal.strategy_name, event.symbol
                );
                return;
            }
            Ok(false) => {}
            // 查重失败按非重复处理
            Err(e) => warn!(
                "Engine: duplicate check failed for {}, inserting anyway: {}",
                event.symbol, e
            ),
        }

        let levels = exit_levels(entry_price, proposal.direction, &proposal.exit_rules);
        let signal = Signal {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: event.symbol.clone(),
            strategy_id: proposal.strategy_id,
            strategy_name: proposal.strategy_name,
            strategy_category: proposal.strategy_category,
            direction: proposal.direction,
            entry_price,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
            timeframe: event.timeframe,
            status: SignalStatus::Active,
            reason: proposal.reason,
            created_at: now,
            activated_at: Some(now),
            closed_at: None,
            close_reason: None,
            pnl_percent: None,
        };

        match self.store.insert(&signal).await {
            Ok(id) => {
                info!(
                    "Engine: {} {} {} @ {} by {} ({})",
                    signal.direction,
                    signal.symbol,
                    signal.timeframe,
                    signal.entry_price,
                    signal.strategy_name,
                    signal.reason
                );
                self.bus.publish_signal_created(SignalCreated { id, signal });
            }
            Err(e) => error!("Engine: failed to store signal for {}: {}", signal.symbol, e),
        }
    }
}

/// # Summary
/// 信号引擎：行情接入 → K 线聚合 → 事件总线 → 策略评估 → 信号存储。
///
/// # Invariants
/// - 同一 symbol 的收盘事件总由同一个 worker 顺序处理。
/// - 每条行情消息都发布 `PriceTick`，只有收盘消息进入窗口并发布 `CandleClosed`。
/// - 引擎只能启动一次，重复启动返回 `AlreadyRunning`。
pub struct SignalEngine {
    feed: Arc<dyn MarketDataProvider>,
    catalog: Arc<dyn StrategyCatalog>,
    store: Arc<dyn SignalStore>,
    bus: Arc<EventBus>,
    clock: Arc<dyn TimeProvider>,
    aggregator: Arc<CandleAggregator>,
    settings: EngineSettings,
    running: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SignalEngine {
    pub fn new(
        feed: Arc<dyn MarketDataProvider>,
        catalog: Arc<dyn StrategyCatalog>,
        store: Arc<dyn SignalStore>,
        bus: Arc<EventBus>,
        clock: Arc<dyn TimeProvider>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            feed,
            catalog,
            store,
            bus,
            clock,
            aggregator: Arc::new(CandleAggregator::new(settings.window_capacity)),
            settings,
            running: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn aggregator(&self) -> &Arc<CandleAggregator> {
        &self.aggregator
    }

    /// # Summary
    /// 启动引擎。
    ///
    /// # Logic
    /// 1. 加载策略目录。
    /// 2. 先订阅总线上的收盘事件，再启动 worker 与分发任务。
    /// 3. 订阅行情并启动接入任务：每条消息发布 `PriceTick`，收盘 K 线进入聚合器后发布 `CandleClosed`。
    /// 4. 行情流结束时引擎标记为停止。
    ///
    /// # Returns
    /// * `Result<(), EngineError>` - 重复启动、目录加载失败或订阅失败时返回错误。
    pub async fn start(&self) -> Result<(), EngineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        match self.spawn_pipeline().await {
            Ok(handles) => {
                self.tasks.lock().await.extend(handles);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn spawn_pipeline(&self) -> Result<Vec<JoinHandle<()>>, EngineError> {
        let strategies = self.catalog.list().await?;
        info!("Engine: {} strategies loaded", strategies.len());

        let pipeline = Arc::new(Pipeline {
            aggregator: Arc::clone(&self.aggregator),
            evaluator: StrategyEvaluator::new(self.settings.limits, self.settings.min_candles),
            store: Arc::clone(&self.store),
            bus: Arc::clone(&self.bus),
            clock: Arc::clone(&self.clock),
            strategies,
            duplicate_lookback: self.settings.duplicate_lookback,
        });

        let mut closed = self.bus.subscribe_candle_closed();
        let mut stream = self
            .feed
            .subscribe(&self.settings.symbols, &self.settings.timeframes)
            .await?;

        let mut handles = Vec::new();
        let mut queues = Vec::new();
        for worker in 0..self.settings.workers.max(1) {
            let (tx, mut rx) = mpsc::channel::<CandleClosed>(WORKER_QUEUE);
            queues.push(tx);
            let pipeline = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    pipeline.on_candle_closed(event).await;
                }
                debug!("Engine: worker {} stopped", worker);
            }));
        }

        handles.push(tokio::spawn(async move {
            while let Some(event) = closed.next().await {
                let index = worker_index(&event.symbol, queues.len());
                let Some(queue) = queues.get(index) else {
                    continue;
                };
                if queue.send(event).await.is_err() {
                    warn!("Engine: worker {} is gone, dropping candle", index);
                }
            }
        }));

        let aggregator = Arc::clone(&self.aggregator);
        let bus = Arc::clone(&self.bus);
        let running = Arc::clone(&self.running);
        handles.push(tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                bus.publish_price_tick(PriceTick {
                    symbol: msg.symbol.clone(),
                    price: msg.close,
                });
                if let Some(event) = aggregator.ingest(&msg) {
                    bus.publish_candle_closed(event);
                }
            }
            running.store(false, Ordering::SeqCst);
            warn!("Engine: market data stream ended");
        }));

        info!(
            "Engine: started for {} symbols x {} timeframes with {} workers",
            self.settings.symbols.len(),
            self.settings.timeframes.len(),
            self.settings.workers.max(1)
        );
        Ok(handles)
    }

    /// # Summary
    /// 停止所有后台任务。
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        for handle in tasks.drain(..) {
            handle.abort();
        }
        self.running.store(false, Ordering::SeqCst);
        info!("Engine: stopped");
    }

    /// # Summary
    /// 引擎状态快照，供健康检查使用。
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.running.load(Ordering::SeqCst),
            buffered_symbol_timeframe_pairs: self.aggregator.pair_count(),
            subscription_count: self.feed.status().subscription_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_index_is_stable_and_in_range() {
        for symbol in ["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT"] {
            let first = worker_index(symbol, 4);
            assert!(first < 4);
            assert_eq!(first, worker_index(symbol, 4));
        }
        assert_eq!(worker_index("BTCUSDT", 0), 0);
    }
}
