//! 翻译客户端接口
//!
//! 调度器只通过 [`TranslationClient`] 与远端服务交互：一次调用翻译一段文本，
//! 成功返回译文，失败返回已分类的 [`TranslationError`]。

#[cfg(feature = "http")]
pub mod gemini;

use std::fmt;

use async_trait::async_trait;

use crate::translation::error::TranslationResult;

#[cfg(feature = "http")]
pub use gemini::GeminiClient;

/// 每次请求携带的上下文
#[derive(Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub api_key: String,
    pub target_language: String,
    pub model: String,
}

impl RequestContext {
    pub fn new(api_key: &str, target_language: &str, model: &str) -> Self {
        Self {
            api_key: api_key.trim().to_string(),
            target_language: target_language.trim().to_string(),
            model: model.trim().to_string(),
        }
    }

    pub fn has_credential(&self) -> bool {
        !self.api_key.is_empty()
    }
}

// 不在日志中输出密钥
impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("api_key", &if self.api_key.is_empty() { "<empty>" } else { "<redacted>" })
            .field("target_language", &self.target_language)
            .field("model", &self.model)
            .finish()
    }
}

/// 远端翻译操作
#[async_trait]
pub trait TranslationClient: Send + Sync {
    /// 翻译一段文本，文本中的索引标记需原样保留
    async fn translate(&self, context: &RequestContext, text: &str) -> TranslationResult<String>;
}
