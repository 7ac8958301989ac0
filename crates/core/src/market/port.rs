use crate::common::TimeFrame;
use crate::market::entity::KlineMessage;
use crate::market::error::MarketError;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// # Summary
/// 行情消息流别名，使用动态分发的异步流。
pub type KlineStream = Pin<Box<dyn Stream<Item = KlineMessage> + Send>>;

/// # Summary
/// 行情连接状态快照。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    // 是否至少有一条连接处于在线状态
    pub connected: bool,
    // 当前订阅的 symbol × timeframe 组合数量
    pub subscription_count: usize,
}

/// # Summary
/// 市场行情数据提供者接口（原始数据源）。
///
/// # Invariants
/// - 实现者必须保证长连接中断后具备自愈能力 (重连)，流本身不因单次断线而结束。
/// - 单条格式错误的消息必须被跳过，不能终止流。
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// # Summary
    /// 订阅多个证券、多个周期的实时 K 线流。
    ///
    /// # Logic
    /// 1. 校验订阅列表。
    /// 2. 按单连接扇出上限切分，建立多条长连接。
    /// 3. 把所有连接的消息汇入同一个异步流。
    ///
    /// # Arguments
    /// * `symbols`: 证券代码列表。
    /// * `timeframes`: K 线周期列表。
    ///
    /// # Returns
    /// 成功返回异步流。
    async fn subscribe(
        &self,
        symbols: &[String],
        timeframes: &[TimeFrame],
    ) -> Result<KlineStream, MarketError>;

    /// # Summary
    /// 查询连接状态。
    fn status(&self) -> FeedStatus;
}
