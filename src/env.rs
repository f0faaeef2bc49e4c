//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问，用于覆盖配置文件中的设置

use std::env;
use std::fmt;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => Err(EnvError {
                variable: Self::NAME.to_string(),
                message: "Environment variable not set".to_string(),
            }),
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "PAGE_TRANSLATOR_LOG_LEVEL";
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }
}

/// 翻译相关环境变量
pub mod translation {
    use super::*;

    /// API密钥
    pub struct ApiKey;
    impl EnvVar<String> for ApiKey {
        const NAME: &'static str = "PAGE_TRANSLATOR_API_KEY";
        const DESCRIPTION: &'static str = "API key passed to the translation provider";

        fn parse(value: &str) -> EnvResult<String> {
            parse_non_empty(value, Self::NAME)
        }
    }

    /// 目标语言
    pub struct TargetLanguage;
    impl EnvVar<String> for TargetLanguage {
        const NAME: &'static str = "PAGE_TRANSLATOR_TARGET_LANG";
        const DESCRIPTION: &'static str = "Target language, e.g. zh-CN, ja, en";

        fn parse(value: &str) -> EnvResult<String> {
            parse_non_empty(value, Self::NAME)
        }
    }

    /// 模型名称
    pub struct Model;
    impl EnvVar<String> for Model {
        const NAME: &'static str = "PAGE_TRANSLATOR_MODEL";
        const DESCRIPTION: &'static str = "Model used for translation";

        fn parse(value: &str) -> EnvResult<String> {
            parse_non_empty(value, Self::NAME)
        }
    }

    /// API 地址
    pub struct Endpoint;
    impl EnvVar<String> for Endpoint {
        const NAME: &'static str = "PAGE_TRANSLATOR_ENDPOINT";
        const DESCRIPTION: &'static str = "Base URL of the translation API";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.trim_end_matches('/').to_string())
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "URL must start with http:// or https://".to_string(),
                })
            }
        }
    }
}

/// 调度相关环境变量
pub mod scheduler {
    use super::*;

    pub struct MaxConcurrent;
    impl EnvVar<usize> for MaxConcurrent {
        const NAME: &'static str = "PAGE_TRANSLATOR_MAX_CONCURRENT";
        const DESCRIPTION: &'static str = "Maximum number of batches in flight";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME)
        }
    }

    pub struct MaxRetries;
    impl EnvVar<u32> for MaxRetries {
        const NAME: &'static str = "PAGE_TRANSLATOR_MAX_RETRIES";
        const DESCRIPTION: &'static str = "Retries for rate-limited or transient failures";

        fn parse(value: &str) -> EnvResult<u32> {
            value.trim().parse::<u32>().map_err(|_| EnvError {
                variable: Self::NAME.to_string(),
                message: format!("Invalid retry count '{}'", value),
            })
        }
    }

    pub struct RefillPerSecond;
    impl EnvVar<f64> for RefillPerSecond {
        const NAME: &'static str = "PAGE_TRANSLATOR_REFILL_PER_SECOND";
        const DESCRIPTION: &'static str = "Token bucket refill rate (requests per second)";

        fn parse(value: &str) -> EnvResult<f64> {
            match value.trim().parse::<f64>() {
                Ok(rate) if rate > 0.0 && rate.is_finite() => Ok(rate),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!("Invalid rate '{}', must be a positive number", value),
                }),
            }
        }
    }

    pub struct CacheEnabled;
    impl EnvVar<bool> for CacheEnabled {
        const NAME: &'static str = "PAGE_TRANSLATOR_CACHE_ENABLED";
        const DESCRIPTION: &'static str = "Enable the in-memory translation cache";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }
}

/// 所有受支持的环境变量及其说明
pub fn documented_variables() -> Vec<(&'static str, &'static str)> {
    vec![
        (core::LogLevel::NAME, core::LogLevel::DESCRIPTION),
        (translation::ApiKey::NAME, translation::ApiKey::DESCRIPTION),
        (translation::TargetLanguage::NAME, translation::TargetLanguage::DESCRIPTION),
        (translation::Model::NAME, translation::Model::DESCRIPTION),
        (translation::Endpoint::NAME, translation::Endpoint::DESCRIPTION),
        (scheduler::MaxConcurrent::NAME, scheduler::MaxConcurrent::DESCRIPTION),
        (scheduler::MaxRetries::NAME, scheduler::MaxRetries::DESCRIPTION),
        (scheduler::RefillPerSecond::NAME, scheduler::RefillPerSecond::DESCRIPTION),
        (scheduler::CacheEnabled::NAME, scheduler::CacheEnabled::DESCRIPTION),
    ]
}

fn parse_bool(value: &str, name: &str) -> EnvResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(EnvError {
            variable: name.to_string(),
            message: format!("Invalid boolean '{}'. Use: true/false, 1/0, yes/no, on/off", value),
        }),
    }
}

fn parse_positive_usize(value: &str, name: &str) -> EnvResult<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(EnvError {
            variable: name.to_string(),
            message: format!("Invalid value '{}', must be a positive integer", value),
        }),
    }
}

fn parse_non_empty(value: &str, name: &str) -> EnvResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(EnvError {
            variable: name.to_string(),
            message: "Value must not be empty".to_string(),
        })
    } else {
        Ok(trimmed.to_string())
    }
}
