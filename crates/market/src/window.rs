use pulse_core::market::entity::Candle;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 默认窗口容量
pub const DEFAULT_WINDOW_CAPACITY: usize = 200;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WindowError {
    #[error("candle at {got} is not after the last closed candle at {last}")]
    OutOfOrder { last: i64, got: i64 },
    #[error("forming candle at {got} is older than the current forming candle at {current}")]
    StaleForming { current: i64, got: i64 },
}

/// # Summary
/// 固定容量的 K 线滚动窗口。
///
/// # Invariants
/// - 内存空间在初始化时一次性分配，后续不再扩容。
/// - 已收盘的 K 线按时间严格递增，长度永不超过容量，满后淘汰最旧一根 (FIFO)。
/// - 未收盘的 K 线单独保存，只能被原地替换，收盘后才进入环形区。
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CandleWindow {
    // 已收盘 K 线的环形存储
    data: Vec<Candle>,
    capacity: usize,
    // 满载后下一个被覆盖的位置，同时也是最旧一根的位置
    cursor: usize,
    // 当前尚未收盘的 K 线
    forming: Option<Candle>,
}

impl CandleWindow {
    /// # Summary
    /// 创建窗口，容量至少为 1。
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
            forming: None,
        }
    }

    /// # Summary
    /// 追加一根已收盘 K 线。
    ///
    /// # Logic
    /// 1. 时间不晚于最后一根已收盘 K 线时拒绝 (乱序或重复)。
    /// 2. 未满直接 push；已满则覆盖 cursor 处最旧的一根并前移 cursor。
    /// 3. 同一时间的未收盘 K 线随之清除。
    ///
    /// # Arguments
    /// * `candle` - 已收盘 K 线。
    ///
    /// # Returns
    /// * `Result<(), WindowError>` - 乱序时窗口保持不变。
    pub fn push_closed(&mut self, candle: Candle) -> Result<(), WindowError> {
        if let Some(last) = self.last()
            && candle.time <= last.time
        {
            return Err(WindowError::OutOfOrder {
                last: last.time,
                got: candle.time,
            });
        }

        if self
            .forming
            .as_ref()
            .is_some_and(|f| f.time <= candle.time)
        {
            self.forming = None;
        }

        if self.data.len() < self.capacity {
            self.data.push(candle);
        } else if let Some(slot) = self.data.get_mut(self.cursor) {
            *slot = candle;
            self.cursor = (self.cursor + 1) % self.capacity;
        }
        Ok(())
    }

    /// # Summary
    /// 更新尚未收盘的最新 K 线。
    ///
    /// # Logic
    /// 1. 时间不晚于最后一根已收盘 K 线时拒绝。
    /// 2. 比当前未收盘 K 线更旧时拒绝，同一时间原地替换，更新时间则开启新的一根。
    pub fn update_forming(&mut self, candle: Candle) -> Result<(), WindowError> {
        if let Some(last) = self.last()
            && candle.time <= last.time
        {
            return Err(WindowError::OutOfOrder {
                last: last.time,
                got: candle.time,
            });
        }
        if let Some(current) = &self.forming
            && candle.time < current.time
        {
            return Err(WindowError::StaleForming {
                current: current.time,
                got: candle.time,
            });
        }
        self.forming = Some(candle);
        Ok(())
    }

    /// 最近一根已收盘 K 线
    pub fn last(&self) -> Option<Candle> {
        if self.data.len() < self.capacity {
            self.data.last().copied()
        } else {
            let last_idx = if self.cursor == 0 {
                self.capacity - 1
            } else {
                self.cursor - 1
            };
            self.data.get(last_idx).copied()
        }
    }

    /// 当前未收盘 K 线
    pub fn forming(&self) -> Option<Candle> {
        self.forming
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// # Summary
    /// 按时间升序返回全部已收盘 K 线的副本。
    ///
    /// # Logic
    /// 未满时直接复制；已满时从 cursor 处切开并重组两段。
    pub fn to_vec(&self) -> Vec<Candle> {
        if self.data.len() < self.capacity {
            self.data.clone()
        } else {
            let (newer, older) = self.data.split_at(self.cursor.min(self.data.len()));
            let mut result = Vec::with_capacity(self.capacity);
            result.extend_from_slice(older);
            result.extend_from_slice(newer);
            result
        }
    }
}

impl Default for CandleWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}
