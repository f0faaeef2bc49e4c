//! 配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值。
//! 配置文件是扁平的键值结构（camelCase），与扩展存储中的设置一一对应。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::client::RequestContext;
use crate::translation::error::{TranslationError, TranslationResult};

/// 调度器配置
///
/// 所有字段均可缺省，缺省时使用 [`constants`] 中的默认值。
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// 令牌桶容量
    pub capacity: f64,
    /// 每秒补充的令牌数
    pub refill_per_second: f64,
    /// 可重试错误的最大重试次数
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// 同时在途的最大批次数
    pub max_concurrent: usize,
    pub max_segment_length: usize,
    pub min_segment_length: usize,
    /// 单个批次编码后的最大字符数
    pub max_batch_chars: usize,
    /// 两波批次之间的最小间隔
    pub min_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity: constants::DEFAULT_BUCKET_CAPACITY,
            refill_per_second: constants::DEFAULT_REFILL_PER_SECOND,
            max_retries: constants::DEFAULT_MAX_RETRIES,
            base_backoff_ms: constants::DEFAULT_BASE_BACKOFF_MS,
            max_backoff_ms: constants::DEFAULT_MAX_BACKOFF_MS,
            max_concurrent: constants::DEFAULT_MAX_CONCURRENT,
            max_segment_length: constants::DEFAULT_MAX_SEGMENT_LENGTH,
            min_segment_length: constants::DEFAULT_MIN_SEGMENT_LENGTH,
            max_batch_chars: constants::DEFAULT_MAX_BATCH_CHARS,
            min_interval_ms: constants::DEFAULT_MIN_INTERVAL_MS,
        }
    }
}

impl SchedulerConfig {
    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        if !(self.capacity >= 1.0) {
            return Err(TranslationError::ConfigError("令牌桶容量不能小于1".to_string()));
        }

        if !(self.refill_per_second > 0.0) {
            return Err(TranslationError::ConfigError("令牌补充速率必须大于0".to_string()));
        }

        if self.max_concurrent == 0 {
            return Err(TranslationError::ConfigError("最大并发数不能为0".to_string()));
        }

        if self.max_segment_length == 0 || self.max_batch_chars == 0 {
            return Err(TranslationError::ConfigError("分段长度和批次大小不能为0".to_string()));
        }

        if self.min_segment_length > self.max_segment_length {
            return Err(TranslationError::ConfigError(format!(
                "最小分段长度 {} 大于最大分段长度 {}",
                self.min_segment_length, self.max_segment_length
            )));
        }

        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(TranslationError::ConfigError("基础退避时间不能大于最大退避时间".to_string()));
        }

        Ok(())
    }

    /// 第 `attempt` 次重试前的等待时间：min(base * 1.5^attempt, max)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let millis = self.base_backoff_ms as f64 * constants::BACKOFF_MULTIPLIER.powi(attempt as i32);
        let capped = millis.min(self.max_backoff_ms as f64);
        Duration::from_millis(capped.round() as u64)
    }

    /// 两波批次之间的节流间隔
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms).max(constants::MIN_PACING)
    }
}

/// 与翻译服务相关的设置（API密钥、目标语言、模型）
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TranslationSettings {
    pub api_key: String,
    pub target_language: String,
    pub model: String,
    pub endpoint: String,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            target_language: constants::DEFAULT_TARGET_LANGUAGE.to_string(),
            model: constants::DEFAULT_MODEL.to_string(),
            endpoint: constants::DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl TranslationSettings {
    /// 转换为每次请求携带的上下文
    pub fn request_context(&self) -> RequestContext {
        RequestContext::new(&self.api_key, &self.target_language, &self.model)
    }
}

/// 完整的翻译配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TranslationConfig {
    #[serde(flatten)]
    pub settings: TranslationSettings,

    #[serde(flatten)]
    pub scheduler: SchedulerConfig,

    // 缓存配置
    pub cache_enabled: bool,
    pub cache_size: usize,
    pub cache_ttl_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            settings: TranslationSettings::default(),
            scheduler: SchedulerConfig::default(),
            cache_enabled: true,
            cache_size: constants::DEFAULT_CACHE_SIZE,
            cache_ttl_secs: constants::DEFAULT_CACHE_TTL.as_secs(),
        }
    }
}

impl TranslationConfig {
    /// 验证配置
    ///
    /// 缺少API密钥不在此处报错，而是在提交时以 `MissingCredential` 拒绝。
    pub fn validate(&self) -> TranslationResult<()> {
        self.scheduler.validate()?;

        if self.settings.target_language.trim().is_empty() {
            return Err(TranslationError::ConfigError("目标语言不能为空".to_string()));
        }

        if self.settings.model.trim().is_empty() {
            return Err(TranslationError::ConfigError("模型名称不能为空".to_string()));
        }

        if self.cache_enabled && self.cache_size == 0 {
            return Err(TranslationError::ConfigError("启用缓存时缓存大小不能为0".to_string()));
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{scheduler, translation, EnvVar};

        if let Ok(api_key) = translation::ApiKey::get() {
            self.settings.api_key = api_key;
        }

        if let Ok(target_language) = translation::TargetLanguage::get() {
            self.settings.target_language = target_language;
        }

        if let Ok(model) = translation::Model::get() {
            self.settings.model = model;
        }

        if let Ok(endpoint) = translation::Endpoint::get() {
            tracing::info!("环境变量覆盖 API 地址: {}", endpoint);
            self.settings.endpoint = endpoint;
        }

        if let Ok(max_concurrent) = scheduler::MaxConcurrent::get() {
            self.scheduler.max_concurrent = max_concurrent;
        }

        if let Ok(max_retries) = scheduler::MaxRetries::get() {
            self.scheduler.max_retries = max_retries;
        }

        if let Ok(refill) = scheduler::RefillPerSecond::get() {
            self.scheduler.refill_per_second = refill;
        }

        if let Ok(cache_enabled) = scheduler::CacheEnabled::get() {
            self.cache_enabled = cache_enabled;
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: TranslationConfig,
}

impl ConfigManager {
    /// 按搜索路径加载配置，应用环境变量并验证
    pub fn new() -> TranslationResult<Self> {
        let mut config = Self::load_config()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 从指定文件加载配置
    pub fn from_path<P: AsRef<Path>>(path: P) -> TranslationResult<Self> {
        Self::load_dotenv();
        let mut config = Self::load_from_file(path.as_ref())?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &TranslationConfig {
        &self.config
    }

    pub fn into_config(self) -> TranslationConfig {
        self.config
    }

    fn load_config() -> TranslationResult<TranslationConfig> {
        // 首先尝试加载 .env 文件
        Self::load_dotenv();

        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            let candidate = Path::new(expanded_path.as_ref());
            if candidate.exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(candidate);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(TranslationConfig::default())
    }

    /// 解析配置文件，`.toml` 按TOML解析，其余按JSON解析
    pub fn load_from_file(path: &Path) -> TranslationResult<TranslationConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslationError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        Self::parse(&content, path.extension().and_then(|ext| ext.to_str()))
    }

    /// 按扩展名解析配置内容
    pub fn parse(content: &str, extension: Option<&str>) -> TranslationResult<TranslationConfig> {
        match extension {
            Some("toml") => toml::from_str(content)
                .map_err(|e| TranslationError::ConfigError(format!("解析TOML配置失败: {}", e))),
            _ => serde_json::from_str(content)
                .map_err(|e| TranslationError::ConfigError(format!("解析JSON配置失败: {}", e))),
        }
    }

    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config<P: AsRef<Path>>(path: P) -> TranslationResult<()> {
        let config = TranslationConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| TranslationError::ConfigError(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TranslationError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
