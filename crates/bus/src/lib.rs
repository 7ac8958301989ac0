//! 类型化事件总线。
//!
//! 每个主题对应一条 `tokio::sync::broadcast` 通道，由引擎实例在启动时创建并以引用传递给各组件，
//! 不存在进程级全局发射器。事件不落盘，没有订阅者时发布的事件直接丢弃。

use futures::Stream;
use pulse_core::engine::entity::{CandleClosed, SignalCreated, SignalStatusChanged};
use pulse_core::market::entity::PriceTick;
use std::pin::Pin;
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// 默认每个主题的缓冲深度
pub const DEFAULT_CAPACITY: usize = 1024;

/// 订阅得到的事件流
pub type EventStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// # Summary
/// 单个事件主题。
///
/// # Invariants
/// - 同一发布者发布的事件按发布顺序到达每个订阅者。
/// - 慢订阅者落后超过缓冲深度时丢弃最旧事件并记录告警，不阻塞发布者。
pub struct Topic<T> {
    name: &'static str,
    tx: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> Topic<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { name, tx }
    }

    /// # Summary
    /// 发布事件。
    ///
    /// # Returns
    /// 收到该事件的订阅者数量，没有订阅者时为 0。
    pub fn publish(&self, event: T) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("Bus: no subscribers on topic {}", self.name);
                0
            }
        }
    }

    /// # Summary
    /// 订阅主题，只能收到订阅之后发布的事件。
    ///
    /// # Logic
    /// 1. 从广播通道创建新的接收端。
    /// 2. 落后 (`Lagged`) 时记录丢失数量后继续接收。
    /// 3. 所有发送端关闭后流结束。
    pub fn subscribe(&self) -> EventStream<T> {
        let mut rx = self.tx.subscribe();
        let name = self.name;
        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Bus: subscriber on topic {} lagged, {} events dropped", name, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Box::pin(stream)
    }
}

/// # Summary
/// 信号引擎的四个事件主题。
pub struct EventBus {
    candle_closed: Topic<CandleClosed>,
    price_tick: Topic<PriceTick>,
    signal_created: Topic<SignalCreated>,
    signal_status_changed: Topic<SignalStatusChanged>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            candle_closed: Topic::new("CandleClosed", capacity),
            price_tick: Topic::new("PriceTick", capacity),
            signal_created: Topic::new("SignalCreated", capacity),
            signal_status_changed: Topic::new("SignalStatusChanged", capacity),
        }
    }

    pub fn publish_candle_closed(&self, event: CandleClosed) -> usize {
        self.candle_closed.publish(event)
    }

    pub fn subscribe_candle_closed(&self) -> EventStream<CandleClosed> {
        self.candle_closed.subscribe()
    }

    pub fn publish_price_tick(&self, event: PriceTick) -> usize {
        self.price_tick.publish(event)
    }

    pub fn subscribe_price_tick(&self) -> EventStream<PriceTick> {
        self.price_tick.subscribe()
    }

    pub fn publish_signal_created(&self, event: SignalCreated) -> usize {
        self.signal_created.publish(event)
    }

    pub fn subscribe_signal_created(&self) -> EventStream<SignalCreated> {
        self.signal_created.subscribe()
    }

    pub fn publish_signal_status_changed(&self, event: SignalStatusChanged) -> usize {
        self.signal_status_changed.publish(event)
    }

    pub fn subscribe_signal_status_changed(&self) -> EventStream<SignalStatusChanged> {
        self.signal_status_changed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pulse_core::signal::entity::SignalStatus;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::default();
        let delivered = bus.publish_price_tick(PriceTick {
            symbol: "BTCUSDT".into(),
            price: 1.0,
        });
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let bus = EventBus::default();
        let mut first = bus.subscribe_price_tick();
        let mut second = bus.subscribe_price_tick();

        for i in 0..3 {
            let delivered = bus.publish_price_tick(PriceTick {
                symbol: "ETHUSDT".into(),
                price: f64::from(i),
            });
            assert_eq!(delivered, 2);
        }

        for stream in [&mut first, &mut second] {
            for i in 0..3 {
                let tick = stream.next().await.unwrap();
                assert_eq!(tick.price, f64::from(i));
            }
        }
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_oldest() {
        let topic: Topic<SignalStatusChanged> = Topic::new("test", 2);
        let mut stream = topic.subscribe();
        for i in 0..5 {
            topic.publish(SignalStatusChanged {
                id: format!("s{}", i),
                status: SignalStatus::Closed,
            });
        }
        let next = stream.next().await.unwrap();
        assert_eq!(next.id, "s3");
        assert_eq!(stream.next().await.unwrap().id, "s4");
    }

    #[tokio::test]
    async fn test_stream_ends_when_topic_dropped() {
        let topic: Topic<PriceTick> = Topic::new("test", 4);
        let mut stream = topic.subscribe();
        drop(topic);
        assert!(stream.next().await.is_none());
    }
}
