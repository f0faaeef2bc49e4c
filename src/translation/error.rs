//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型、可重试判定以及远端失败的分类

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// 未配置API密钥
    #[error("缺少API密钥")]
    MissingCredential,

    /// 速率限制错误（429 或 provider 的 resource exhausted）
    #[error("请求速率过快，已达到限制: {0}")]
    RateLimited(String),

    /// 服务暂不可用（503）
    #[error("翻译服务暂不可用: {0}")]
    ServiceUnavailable(String),

    /// 网络/传输错误
    #[error("网络错误: {0}")]
    TransportError(String),

    /// 鉴权失败
    #[error("鉴权失败: {0}")]
    AuthenticationFailed(String),

    /// 请求格式错误（400）
    #[error("请求格式错误: {0}")]
    MalformedRequest(String),

    /// 响应中缺少译文字段
    #[error("响应格式错误: {0}")]
    MalformedResponse(String),

    /// 调用方请求停止
    #[error("翻译已取消")]
    Cancelled,

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 未知错误
    #[error("未知错误: {0}")]
    Unknown(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TranslationError::RateLimited(_)
                | TranslationError::ServiceUnavailable(_)
                | TranslationError::TransportError(_)
        )
    }

    /// 重试也无法成功的错误，整个提交可以据此快速失败
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TranslationError::MissingCredential
                | TranslationError::AuthenticationFailed(_)
                | TranslationError::MalformedRequest(_)
                | TranslationError::ConfigError(_)
        )
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::MissingCredential => ErrorSeverity::Critical,
            TranslationError::AuthenticationFailed(_) => ErrorSeverity::Critical,
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::RateLimited(_) => ErrorSeverity::Warning,
            TranslationError::ServiceUnavailable(_) => ErrorSeverity::Warning,
            TranslationError::TransportError(_) => ErrorSeverity::Warning,
            TranslationError::Cancelled => ErrorSeverity::Info,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::MalformedRequest(_) => ErrorSeverity::Error,
            TranslationError::MalformedResponse(_) => ErrorSeverity::Error,
            TranslationError::Unknown(_) => ErrorSeverity::Error,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 根据HTTP状态码和错误消息对远端失败进行分类
///
/// 状态码优先；没有状态码（连接失败等）时按消息特征判断。
/// 无法识别的失败归为 `Unknown`，不会被重试。
pub fn classify_failure(status: Option<u16>, message: &str) -> TranslationError {
    let msg = message.to_string();
    let lower = message.to_lowercase();

    if lower.contains("resource_exhausted") || lower.contains("resource exhausted") {
        return TranslationError::RateLimited(msg);
    }

    match status {
        Some(429) => TranslationError::RateLimited(msg),
        Some(503) => TranslationError::ServiceUnavailable(msg),
        Some(401) | Some(403) => TranslationError::AuthenticationFailed(msg),
        Some(400) if lower.contains("api key") || lower.contains("api_key") => {
            TranslationError::AuthenticationFailed(msg)
        }
        Some(400) => TranslationError::MalformedRequest(msg),
        Some(502) | Some(504) => TranslationError::TransportError(msg),
        Some(_) => TranslationError::Unknown(msg),
        None if is_transport_signature(&lower) => TranslationError::TransportError(msg),
        None => TranslationError::Unknown(msg),
    }
}

/// 常见的网络错误特征
fn is_transport_signature(lower: &str) -> bool {
    const SIGNATURES: &[&str] = &[
        "failed to fetch",
        "networkerror",
        "network error",
        "connection",
        "timed out",
        "timeout",
        "dns",
        "broken pipe",
    ];
    SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// 标准错误转换
impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::TransportError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::MalformedResponse(format!("JSON解析错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ConfigError(format!("TOML解析错误: {}", error))
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return TranslationError::MalformedResponse(format!("响应解码失败: {}", error));
        }
        let status = error.status().map(|s| s.as_u16());
        if status.is_none() && (error.is_connect() || error.is_timeout() || error.is_request()) {
            return TranslationError::TransportError(error.to_string());
        }
        classify_failure(status, &error.to_string())
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误
    pub fn log_error(error: &TranslationError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!("翻译错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误: {}", error),
        }
    }
}
