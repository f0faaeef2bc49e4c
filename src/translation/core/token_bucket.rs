//! 令牌桶限流器
//!
//! 令牌按时间惰性补充（每次获取时计算），不需要后台定时器。
//! 时钟使用 `tokio::time::Instant`，在暂停时间的测试中行为确定。

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{sleep, Instant};

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// 令牌桶
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// 创建一个装满令牌的桶
    pub fn new(capacity: f64, refill_per_second: f64) -> Self {
        let capacity = capacity.max(1.0);
        Self {
            capacity,
            refill_per_second: refill_per_second.max(f64::EPSILON),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_per_second(&self) -> f64 {
        self.refill_per_second
    }

    /// 获取一个令牌，不足时等待补充；永不失败
    pub async fn acquire(&self) {
        loop {
            let wait = match self.take_or_wait() {
                None => return,
                Some(wait) => wait,
            };
            tracing::trace!("令牌不足，等待 {:?}", wait);
            // 醒来后重新计算，等待期间可能有其他调用者取走了令牌
            sleep(wait).await;
        }
    }

    /// 不等待地尝试获取一个令牌
    pub fn try_acquire(&self) -> bool {
        self.take_or_wait().is_none()
    }

    /// 当前可用令牌数
    pub fn available(&self) -> f64 {
        let mut state = self.lock();
        self.refill(&mut state);
        state.tokens
    }

    /// 成功取走令牌返回 `None`，否则返回需要等待的时间
    fn take_or_wait(&self) -> Option<Duration> {
        let mut state = self.lock();
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            let seconds = (1.0 - state.tokens) / self.refill_per_second;
            Some(Duration::from_secs_f64(seconds).max(Duration::from_millis(1)))
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
        state.last_refill = now;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BucketState> {
        // 临界区内没有会 panic 的操作，中毒时直接沿用内部状态
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
