//! 调度器运行统计

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// 调度器统计信息
///
/// 所有计数器均为原子类型，可在调度循环和调用方之间共享读取。
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// 处理完的提交数
    pub submissions: AtomicUsize,
    pub units_submitted: AtomicUsize,
    pub units_translated: AtomicUsize,
    pub units_failed: AtomicUsize,
    /// 规划出的批次数
    pub batches_planned: AtomicUsize,
    pub batches_failed: AtomicUsize,
    /// 对翻译客户端的调用次数（含重试）
    pub attempts: AtomicUsize,
    pub retries: AtomicUsize,
    pub cache_hits: AtomicUsize,
    pub cache_misses: AtomicUsize,
    /// 发送的字符总数
    pub chars_sent: AtomicUsize,
    /// 总处理时间，以微秒为单位存储
    pub processing_time: AtomicU64,
}

impl SchedulerStats {
    pub fn inc_submissions(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_units_submitted(&self, count: usize) {
        self.units_submitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_units_translated(&self, count: usize) {
        self.units_translated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_units_failed(&self, count: usize) {
        self.units_failed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_batches_planned(&self, count: usize) {
        self.batches_planned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_batches_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_attempts(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_chars_sent(&self, count: usize) {
        self.chars_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_processing_time(&self, duration: Duration) {
        self.processing_time
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// 获取统计数据快照
    pub fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            submissions: self.submissions.load(Ordering::Relaxed),
            units_submitted: self.units_submitted.load(Ordering::Relaxed),
            units_translated: self.units_translated.load(Ordering::Relaxed),
            units_failed: self.units_failed.load(Ordering::Relaxed),
            batches_planned: self.batches_planned.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            chars_sent: self.chars_sent.load(Ordering::Relaxed),
            processing_time: Duration::from_micros(self.processing_time.load(Ordering::Relaxed)),
        }
    }
}

/// 统计数据的不可变快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStatsSnapshot {
    pub submissions: usize,
    pub units_submitted: usize,
    pub units_translated: usize,
    pub units_failed: usize,
    pub batches_planned: usize,
    pub batches_failed: usize,
    pub attempts: usize,
    pub retries: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub chars_sent: usize,
    pub processing_time: Duration,
}

impl SchedulerStatsSnapshot {
    /// 缓存命中率（百分比）
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            100.0 * self.cache_hits as f64 / total as f64
        }
    }
}
