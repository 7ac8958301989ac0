use crate::window::CandleWindow;
use dashmap::DashMap;
use pulse_core::common::TimeFrame;
use pulse_core::engine::entity::CandleClosed;
use pulse_core::market::entity::{Candle, KlineMessage};
use tracing::debug;

/// # Summary
/// 按 (symbol, timeframe) 分区维护 K 线窗口的聚合器。
///
/// # Invariants
/// - 窗口只由聚合器修改，外部只能拿到快照副本。
/// - 同一分区的写入在 DashMap 分片锁内完成，不同分区互不阻塞。
pub struct CandleAggregator {
    windows: DashMap<(String, TimeFrame), CandleWindow>,
    capacity: usize,
}

impl CandleAggregator {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: DashMap::new(),
            capacity,
        }
    }

    /// # Summary
    /// 处理一条行情消息。
    ///
    /// # Logic
    /// 1. 未收盘消息只更新该分区的未收盘 K 线。
    /// 2. 收盘消息追加进窗口，满后淘汰最旧一根。
    /// 3. 乱序或重复的消息被丢弃并记录 debug 日志。
    ///
    /// # Arguments
    /// * `msg` - 行情消息。
    ///
    /// # Returns
    /// * `Option<CandleClosed>` - 收盘 K 线成功进入窗口时返回待下游发布的事件。
    pub fn ingest(&self, msg: &KlineMessage) -> Option<CandleClosed> {
        let candle = msg.to_candle();
        let key = (msg.symbol.clone(), msg.timeframe);
        let mut window = self
            .windows
            .entry(key)
            .or_insert_with(|| CandleWindow::new(self.capacity));

        let result = if msg.is_closed {
            window.push_closed(candle)
        } else {
            window.update_forming(candle)
        };

        match result {
            Ok(()) if msg.is_closed => Some(CandleClosed {
                symbol: msg.symbol.clone(),
                timeframe: msg.timeframe,
                candle,
            }),
            Ok(()) => None,
            Err(e) => {
                debug!(
                    "Aggregator: dropped kline for {} {}: {}",
                    msg.symbol, msg.timeframe, e
                );
                None
            }
        }
    }

    /// 指定分区已收盘 K 线的有序快照
    pub fn snapshot(&self, symbol: &str, timeframe: TimeFrame) -> Vec<Candle> {
        self.windows
            .get(&(symbol.to_string(), timeframe))
            .map(|w| w.to_vec())
            .unwrap_or_default()
    }

    /// # Summary
    /// 截止到指定收盘 K 线 (含) 的有序快照。
    ///
    /// # Logic
    /// 事件排队期间窗口可能已经追加了更新的 K 线，评估必须只看到事件对应的那一根为止。
    /// 该 K 线已被淘汰出窗口时返回空。
    pub fn snapshot_until(&self, symbol: &str, timeframe: TimeFrame, time: i64) -> Vec<Candle> {
        let mut candles = self.snapshot(symbol, timeframe);
        let end = candles.partition_point(|c| c.time <= time);
        candles.truncate(end);
        if candles.last().is_some_and(|c| c.time == time) {
            candles
        } else {
            Vec::new()
        }
    }

    /// 指定分区已收盘 K 线数量
    pub fn len(&self, symbol: &str, timeframe: TimeFrame) -> usize {
        self.windows
            .get(&(symbol.to_string(), timeframe))
            .map_or(0, |w| w.len())
    }

    /// 已建立窗口的分区数量
    pub fn pair_count(&self) -> usize {
        self.windows.len()
    }
}
