//! # Page Translator Library
//!
//! 为基于大模型的网页翻译提供客户端请求调度：限流、重试、分批并发，
//! 并保证每个提交的文本单元都能拿到译文或明确的失败原因。
//!
//! ## 模块组织
//!
//! - `translation` - 调度器、批次规划、翻译客户端、缓存与配置
//! - `env` - 类型安全的环境变量访问

pub mod env;
pub mod translation;

// Re-export commonly used items for convenience
pub use translation::{
    RequestContext, RequestScheduler, SchedulerConfig, SubmissionReport, TranslationClient,
    TranslationError, TranslationResult, TranslationUnit,
};
