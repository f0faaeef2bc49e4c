//! 翻译缓存模块
//!
//! 容量有限的内存缓存：超出容量时淘汰最久未使用的条目，条目在 TTL 后过期。
//! 缓存键是 (模型, 目标语言, 原文) 的 blake3 摘要。

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use crate::translation::config::{constants, TranslationConfig};

type CacheKey = [u8; 32];

/// 缓存条目
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub translated_text: String,
    pub created_at: Instant,
    pub access_count: u64,
}

impl CacheEntry {
    fn new(translated_text: String) -> Self {
        Self {
            translated_text,
            created_at: Instant::now(),
            access_count: 0,
        }
    }

    /// 检查条目是否过期
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// 缓存统计信息
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_entries: usize,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    /// 命中率（百分比）
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            100.0 * self.cache_hits as f64 / self.total_requests as f64
        }
    }
}

struct CacheInner {
    entries: LruCache<CacheKey, CacheEntry>,
    stats: CacheStats,
}

/// 翻译缓存
pub struct TranslationCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
}

impl TranslationCache {
    /// 使用指定容量和过期时间创建缓存，容量为 0 时按 1 处理
    pub fn with_config(max_size: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
            ttl,
        }
    }

    /// 按配置创建缓存；未启用缓存时返回 `None`
    pub fn from_config(config: &TranslationConfig) -> Option<Self> {
        config
            .cache_enabled
            .then(|| Self::with_config(config.cache_size, config.cache_ttl()))
    }

    /// 生成缓存键
    pub fn cache_key(model: &str, target_language: &str, text: &str) -> CacheKey {
        let mut hasher = blake3::Hasher::new();
        for part in [model, target_language, text] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        *hasher.finalize().as_bytes()
    }

    /// 获取缓存的译文
    pub fn get(&self, model: &str, target_language: &str, text: &str) -> Option<String> {
        let key = Self::cache_key(model, target_language, text);
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.stats.total_requests += 1;

        let expired = match inner.entries.get_mut(&key) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                entry.access_count += 1;
                let text = entry.translated_text.clone();
                inner.stats.cache_hits += 1;
                return Some(text);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.pop(&key);
            inner.stats.expirations += 1;
        }
        inner.stats.cache_misses += 1;
        None
    }

    /// 写入译文
    pub fn insert(&self, model: &str, target_language: &str, text: &str, translated: &str) {
        let key = Self::cache_key(model, target_language, text);
        let mut inner = self.lock();
        let evicted = inner
            .entries
            .push(key, CacheEntry::new(translated.to_string()))
            .is_some_and(|(old_key, _)| old_key != key);
        if evicted {
            inner.stats.evictions += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 获取统计信息
    pub fn get_stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            total_entries: inner.entries.len(),
            ..inner.stats
        }
    }

    /// 清空缓存
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// 清理过期条目，返回清理数量
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.lock();
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.ttl))
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            inner.entries.pop(key);
        }
        inner.stats.expirations += expired.len() as u64;
        expired.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::with_config(constants::DEFAULT_CACHE_SIZE, constants::DEFAULT_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_depends_on_all_parts() {
        let base = TranslationCache::cache_key("m", "ja", "hello");
        assert_eq!(base, TranslationCache::cache_key("m", "ja", "hello"));
        assert_ne!(base, TranslationCache::cache_key("m", "zh-CN", "hello"));
        assert_ne!(base, TranslationCache::cache_key("other", "ja", "hello"));
        // 长度前缀避免拼接歧义
        assert_ne!(
            TranslationCache::cache_key("ab", "c", "x"),
            TranslationCache::cache_key("a", "bc", "x")
        );
    }

    #[tokio::test]
    async fn test_hit_and_miss_are_counted() {
        let cache = TranslationCache::with_config(10, Duration::from_secs(60));
        assert_eq!(cache.get("m", "ja", "hello"), None);
        cache.insert("m", "ja", "hello", "こんにちは");
        assert_eq!(cache.get("m", "ja", "hello").as_deref(), Some("こんにちは"));

        let stats = cache.get_stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.hit_rate(), 50.0);
    }

    #[tokio::test]
    async fn test_least_recently_used_is_evicted() {
        let cache = TranslationCache::with_config(2, Duration::from_secs(60));
        cache.insert("m", "ja", "a", "A");
        cache.insert("m", "ja", "b", "B");
        assert!(cache.get("m", "ja", "a").is_some());
        cache.insert("m", "ja", "c", "C");

        assert_eq!(cache.len(), 2);
        assert!(cache.get("m", "ja", "b").is_none());
        assert!(cache.get("m", "ja", "a").is_some());
        assert_eq!(cache.get_stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = TranslationCache::with_config(10, Duration::from_secs(5));
        cache.insert("m", "ja", "a", "A");
        cache.insert("m", "ja", "b", "B");

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get("m", "ja", "a"), None);
        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.get_stats().expirations, 2);
    }
}
