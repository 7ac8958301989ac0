use crate::error::{KuriError, LimitKind};
use pulse_core::config::KuriConfig;
use std::time::{Duration, Instant};

/// # Summary
/// 脚本执行的安全限制。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    // 输入序列最大长度，超出时在执行前拒绝
    pub max_series_len: usize,
    // 单根 K 线内允许执行的指令数
    pub max_ops_per_bar: u64,
    // 单次执行的墙钟时间上限
    pub max_total_time: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&KuriConfig::default())
    }
}

impl From<&KuriConfig> for Limits {
    fn from(config: &KuriConfig) -> Self {
        Self {
            max_series_len: config.max_series_len,
            max_ops_per_bar: config.max_ops_per_bar,
            max_total_time: Duration::from_millis(config.max_total_millis),
        }
    }
}

impl Limits {
    pub(crate) fn check_series_len(&self, len: usize) -> Result<(), KuriError> {
        if len > self.max_series_len {
            return Err(KuriError::Limit(LimitKind::SeriesLength {
                len,
                max: self.max_series_len,
            }));
        }
        Ok(())
    }
}

/// # Summary
/// 执行预算计数器。
///
/// # Invariants
/// - 操作计数在每根 K 线开始时清零，墙钟时间从创建起累计。
pub(crate) struct Budget {
    limits: Limits,
    started: Instant,
    ops: u64,
}

impl Budget {
    pub(crate) fn new(limits: Limits) -> Self {
        Self {
            limits,
            started: Instant::now(),
            ops: 0,
        }
    }

    pub(crate) fn start_bar(&mut self) {
        self.ops = 0;
    }

    /// 记录一次操作并检查两项预算
    pub(crate) fn tick(&mut self) -> Result<(), KuriError> {
        self.ops += 1;
        if self.ops > self.limits.max_ops_per_bar {
            return Err(KuriError::Limit(LimitKind::OpsPerBar {
                max: self.limits.max_ops_per_bar,
            }));
        }
        let elapsed = self.started.elapsed();
        if elapsed >= self.limits.max_total_time {
            return Err(KuriError::Limit(LimitKind::ExecutionTime {
                elapsed,
                max: self.limits.max_total_time,
            }));
        }
        Ok(())
    }
}
