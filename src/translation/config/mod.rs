//! 翻译配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{ConfigManager, SchedulerConfig, TranslationConfig, TranslationSettings};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 令牌桶
    pub const DEFAULT_BUCKET_CAPACITY: f64 = 5.0;
    pub const DEFAULT_REFILL_PER_SECOND: f64 = 0.5;

    // 重试与退避
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_BASE_BACKOFF_MS: u64 = 2000;
    pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
    pub const BACKOFF_MULTIPLIER: f64 = 1.5;

    // 并发与节流
    pub const DEFAULT_MAX_CONCURRENT: usize = 3;
    pub const DEFAULT_MIN_INTERVAL_MS: u64 = 500;
    pub const MIN_PACING: Duration = Duration::from_millis(500);

    // 分段与批次
    pub const DEFAULT_MAX_SEGMENT_LENGTH: usize = 1000;
    pub const DEFAULT_MIN_SEGMENT_LENGTH: usize = 50;
    pub const DEFAULT_MAX_BATCH_CHARS: usize = 4000;
    pub const JOIN_SEPARATOR: &str = "\n\n";

    // 默认API设置
    pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
    pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
    pub const DEFAULT_TARGET_LANGUAGE: &str = "zh-CN";

    // 缓存设置
    pub const DEFAULT_CACHE_SIZE: usize = 2000;
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600); // 1小时

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "page-translator.toml",
        ".page-translator.toml",
        "page-translator.json",
        "~/.config/page-translator/config.toml",
        "/etc/page-translator/config.toml",
    ];
}
