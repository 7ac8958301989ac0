use crate::codec::{combined_url, decode, stream_name};
use crate::reconnect::{Watchdog, backoff_delay};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use pulse_core::common::TimeFrame;
use pulse_core::config::FeedConfig;
use pulse_core::market::entity::KlineMessage;
use pulse_core::market::error::MarketError;
use pulse_core::market::port::{FeedStatus, KlineStream, MarketDataProvider};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// 连接任务向订阅流转发消息的通道深度
const CHANNEL_CAPACITY: usize = 1024;

/// # Summary
/// WebSocket 行情接入参数。
#[derive(Debug, Clone)]
pub struct FeedSettings {
    // 组合流基础地址，流名直接拼接在其后
    pub url: String,
    pub max_streams_per_connection: usize,
    pub watchdog_timeout: Duration,
    pub reconnect_base: Duration,
    pub max_reconnect_attempts: u32,
}

impl From<&FeedConfig> for FeedSettings {
    fn from(config: &FeedConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_streams_per_connection: config.max_streams_per_connection,
            watchdog_timeout: Duration::from_secs(config.watchdog_secs),
            reconnect_base: Duration::from_secs(config.reconnect_base_secs),
            max_reconnect_attempts: config.max_reconnect_attempts,
        }
    }
}

/// 单次连接结束的原因
enum SessionEnd {
    // 订阅方已经丢弃了流，连接任务应当退出
    ReceiverDropped,
    // 断线、关闭帧或看门狗超时，需要重连
    Disconnected(String),
}

/// # Summary
/// 基于组合 K 线流的 WebSocket 行情驱动。
///
/// # Invariants
/// - 每条连接承载的 symbol × timeframe 数量不超过 `max_streams_per_connection`。
/// - 每条连接独立重连：成功建连后失败计数清零，连续失败超过上限后该连接放弃。
/// - 格式错误的消息被跳过，不会终止流。
pub struct WsFeed {
    settings: FeedSettings,
    // 当前在线的连接数
    online: Arc<AtomicUsize>,
    subscriptions: Arc<AtomicUsize>,
}

impl WsFeed {
    pub fn new(settings: FeedSettings) -> Self {
        Self {
            settings,
            online: Arc::new(AtomicUsize::new(0)),
            subscriptions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// # Summary
    /// 单条连接的生命周期：建连、收消息、断线后线性退避重连。
    ///
    /// # Logic
    /// 1. 建连成功后失败计数清零，进入收消息循环。
    /// 2. 会话结束后若订阅方已丢弃流则退出，否则计数加一并按 `base × attempt` 等待。
    /// 3. 超过最大重试次数后放弃该连接。
    async fn run_connection(
        url: String,
        settings: FeedSettings,
        tx: mpsc::Sender<KlineMessage>,
        online: Arc<AtomicUsize>,
    ) {
        let mut attempt: u32 = 0;
        loop {
            match connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    attempt = 0;
                    online.fetch_add(1, Ordering::SeqCst);
                    info!("Feed: connected to {}", url);
                    let end = Self::session(ws, &tx, settings.watchdog_timeout).await;
                    online.fetch_sub(1, Ordering::SeqCst);
                    match end {
                        SessionEnd::ReceiverDropped => {
                            info!("Feed: subscriber dropped, closing connection to {}", url);
                            return;
                        }
                        SessionEnd::Disconnected(reason) => {
                            warn!("Feed: connection to {} lost: {}", url, reason);
                        }
                    }
                }
                Err(e) => warn!("Feed: connect to {} failed: {}", url, e),
            }

            if tx.is_closed() {
                return;
            }
            attempt = attempt.saturating_add(1);
            match backoff_delay(
                settings.reconnect_base,
                attempt,
                settings.max_reconnect_attempts,
            ) {
                Some(delay) => {
                    info!(
                        "Feed: reconnecting to {} in {:?} (attempt {}/{})",
                        url, delay, attempt, settings.max_reconnect_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!(
                        "Feed: giving up on {} after {} attempts",
                        url, settings.max_reconnect_attempts
                    );
                    return;
                }
            }
        }
    }

    async fn session<S>(
        ws: tokio_tungstenite::WebSocketStream<S>,
        tx: &mpsc::Sender<KlineMessage>,
        watchdog_timeout: Duration,
    ) -> SessionEnd
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut write, mut read) = ws.split();
        let mut watchdog = Watchdog::new(watchdog_timeout);
        let mut check = tokio::time::interval(watchdog.check_interval());
        check.tick().await;

        loop {
            tokio::select! {
                _ = check.tick() => {
                    if watchdog.expired() {
                        return SessionEnd::Disconnected(format!(
                            "no message for {:?}, watchdog fired",
                            watchdog_timeout
                        ));
                    }
                }
                frame = read.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => return SessionEnd::Disconnected(e.to_string()),
                        None => return SessionEnd::Disconnected("stream ended".to_string()),
                    };
                    watchdog.touch();
                    match frame {
                        Message::Text(text) => match decode(text.as_str()) {
                            Ok(msg) => {
                                if tx.send(msg).await.is_err() {
                                    return SessionEnd::ReceiverDropped;
                                }
                            }
                            Err(e) => debug!("Feed: skipped malformed message: {}", e),
                        },
                        Message::Ping(payload) => {
                            if let Err(e) = write.send(Message::Pong(payload)).await {
                                return SessionEnd::Disconnected(e.to_string());
                            }
                        }
                        Message::Close(frame) => {
                            let detail = frame.map_or_else(
                                || "close frame".to_string(),
                                |f| format!("close frame code={} reason={}", f.code, f.reason),
                            );
                            return SessionEnd::Disconnected(detail);
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

#[async_trait]
impl MarketDataProvider for WsFeed {
    /// # Summary
    /// 订阅全部 symbol × timeframe 组合。
    ///
    /// # Logic
    /// 1. 校验订阅列表非空。
    /// 2. 生成流名并按单连接上限切分，每块启动一个连接任务。
    /// 3. 所有连接任务共用一个 mpsc 通道，接收端包装为异步流返回。
    ///
    /// # Arguments
    /// * `symbols` - 交易对列表。
    /// * `timeframes` - 周期列表。
    ///
    /// # Returns
    /// * `Result<KlineStream, MarketError>` - 订阅列表为空时返回 `InvalidSubscription`。
    async fn subscribe(
        &self,
        symbols: &[String],
        timeframes: &[TimeFrame],
    ) -> Result<KlineStream, MarketError> {
        if symbols.is_empty() || timeframes.is_empty() {
            return Err(MarketError::InvalidSubscription(
                "symbols and timeframes must not be empty".to_string(),
            ));
        }
        if self.settings.url.is_empty() {
            return Err(MarketError::InvalidSubscription(
                "feed url is empty".to_string(),
            ));
        }

        let streams: Vec<String> = symbols
            .iter()
            .flat_map(|s| timeframes.iter().map(move |tf| stream_name(s, *tf)))
            .collect();
        let chunk_size = self.settings.max_streams_per_connection.max(1);
        self.subscriptions
            .fetch_add(streams.len(), Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let chunks: Vec<&[String]> = streams.chunks(chunk_size).collect();
        info!(
            "Feed: subscribing {} streams over {} connections",
            streams.len(),
            chunks.len()
        );
        for chunk in chunks {
            let url = combined_url(&self.settings.url, chunk);
            tokio::spawn(Self::run_connection(
                url,
                self.settings.clone(),
                tx.clone(),
                Arc::clone(&self.online),
            ));
        }

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn status(&self) -> FeedStatus {
        FeedStatus {
            connected: self.online.load(Ordering::SeqCst) > 0,
            subscription_count: self.subscriptions.load(Ordering::SeqCst),
        }
    }
}
