//! 翻译模块
//!
//! 把网页上的大量文本节点变成受控的远端翻译调用，采用清晰的模块化架构：
//! - **core**: 请求调度器、批次执行、令牌桶限流
//! - **pipeline**: 翻译单元、长文本分段、批次规划
//! - **client**: 远端翻译接口及 Gemini 实现
//! - **storage**: 翻译结果缓存
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use page_translator::translation::{ConfigManager, GeminiClient, RequestScheduler, TranslationUnit};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::new()?.into_config();
//! let client = Arc::new(GeminiClient::new(&config.settings.endpoint));
//! let scheduler = RequestScheduler::from_config(&config, client)?;
//!
//! let report = scheduler
//!     .submit(vec![
//!         TranslationUnit::new("title", "Hello"),
//!         TranslationUnit::new("body", "How are you today?"),
//!     ])
//!     .await?;
//!
//! for (id, result) in report.results() {
//!     println!("{}: {:?}", id, result);
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 翻译客户端接口 - 与远端服务的唯一交互点
pub mod client;

/// 配置管理模块 - 调度参数、服务设置和缓存配置
pub mod config;

/// 调度核心模块 - 队列、限流、并发与重试
pub mod core;

/// 错误处理模块 - 统一的错误类型和分类
pub mod error;

/// 文本处理管道模块 - 单元、分段和批次规划
pub mod pipeline;

/// 存储管理模块 - 翻译结果缓存
pub mod storage;

// ============================================================================
// 核心API导出
// ============================================================================

/// 调度器及其运行状态
pub use self::core::{Progress, RequestScheduler, SchedulerStatsSnapshot, TokenBucket};

/// 远端翻译接口
pub use client::{RequestContext, TranslationClient};

#[cfg(feature = "http")]
pub use client::GeminiClient;

/// 配置管理相关组件
pub use config::{constants, ConfigManager, SchedulerConfig, TranslationConfig, TranslationSettings};

/// 错误处理相关类型
pub use error::{classify_failure, ErrorSeverity, TranslationError, TranslationResult};

/// 提交与结果
pub use pipeline::{SubmissionReport, TranslationUnit, UnitFailure};

/// 缓存组件
pub use storage::{CacheStats, TranslationCache};

// ============================================================================
// 便利函数
// ============================================================================

/// 把纯文本文档按空行切成翻译单元
///
/// 单元标识为段落序号（从 `p0` 开始），空段落被跳过。
///
/// # Examples
///
/// ```rust
/// use page_translator::translation::document_units;
///
/// let units = document_units("Title\n\nFirst paragraph\nstill first.\n\n\n");
/// assert_eq!(units.len(), 2);
/// assert_eq!(units[0].id, "p0");
/// assert_eq!(units[1].text, "First paragraph\nstill first.");
/// ```
pub fn document_units(document: &str) -> Vec<TranslationUnit> {
    let mut units = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    fn flush(current: &mut Vec<&str>, units: &mut Vec<TranslationUnit>) {
        if !current.is_empty() {
            let id = format!("p{}", units.len());
            units.push(TranslationUnit::new(id, current.join("\n")));
            current.clear();
        }
    }

    for line in document.lines() {
        if line.trim().is_empty() {
            flush(&mut current, &mut units);
        } else {
            current.push(line);
        }
    }
    flush(&mut current, &mut units);

    units
}

/// 把报告重新拼成文档：已翻译的单元使用译文，失败的单元保留原文
pub fn render_document(report: &SubmissionReport) -> String {
    report
        .units
        .iter()
        .map(|unit| unit.translation.as_deref().unwrap_or(&unit.text))
        .collect::<Vec<_>>()
        .join(constants::JOIN_SEPARATOR)
}
