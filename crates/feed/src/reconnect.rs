use std::time::Duration;
use tokio::time::Instant;

/// # Summary
/// 线性退避：第 `attempt` 次重连前等待 `base × attempt`。
///
/// # Arguments
/// * `base` - 退避基数。
/// * `attempt` - 连续失败次数，从 1 开始。
/// * `max_attempts` - 最大重试次数。
///
/// # Returns
/// * `Option<Duration>` - 超过最大次数时返回 `None`，表示放弃。
pub fn backoff_delay(base: Duration, attempt: u32, max_attempts: u32) -> Option<Duration> {
    if attempt == 0 || attempt > max_attempts {
        return None;
    }
    base.checked_mul(attempt)
}

/// # Summary
/// 连接静默看门狗。
///
/// # Invariants
/// - 每收到一条消息调用 `touch` 刷新时间；静默超过 `timeout` 即视为连接失活。
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    last_seen: Instant,
    timeout: Duration,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_seen: Instant::now(),
            timeout,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn expired(&self) -> bool {
        self.last_seen.elapsed() > self.timeout
    }

    /// 检查间隔：超时的四分之一，至少 10 毫秒
    pub fn check_interval(&self) -> Duration {
        (self.timeout / 4).max(Duration::from_millis(10))
    }
}
