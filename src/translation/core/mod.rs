//! 调度核心模块
//!
//! 本模块实现请求调度子系统：把调用方提交的翻译单元变成一串受限流、
//! 可重试、分批并发的远端调用，并把结果按原顺序交还给调用方。
//!
//! ## 模块依赖关系
//!
//! ```text
//! RequestScheduler (scheduler.rs)
//!     ├── plan_batches (pipeline/batch.rs)
//!     ├── TranslationCache (storage/cache.rs)
//!     └── BatchExecutor (engine.rs)
//!             ├── TokenBucket (token_bucket.rs)
//!             └── TranslationClient (client/mod.rs)
//! ```

pub mod engine;
pub mod scheduler;
pub mod stats;
pub mod token_bucket;

/// 单批次执行与协作式停止信号
pub use engine::{BatchExecutor, StopSignal};

/// 请求调度器 - 主要的对外接口
pub use scheduler::{Progress, RequestScheduler};

/// 调度器运行统计
pub use stats::{SchedulerStats, SchedulerStatsSnapshot};

pub use token_bucket::TokenBucket;
