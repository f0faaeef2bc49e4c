// 集成测试公共模块
//
// 提供可编程的桩客户端、测试配置和数据生成器

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::time::Instant;

use page_translator::translation::pipeline::batch::{decode_indexed, escape_markers};
use page_translator::translation::{
    RequestContext, SchedulerConfig, TranslationClient, TranslationError, TranslationResult,
    TranslationUnit,
};

/// 一次客户端调用的记录
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub at: Instant,
    pub payload: String,
    pub target_language: String,
}

type Responder = dyn Fn(usize, &str) -> TranslationResult<String> + Send + Sync;

/// 桩翻译客户端
///
/// 每次调用先等待 `latency`，再由 `responder(调用序号, 请求文本)` 决定结果。
pub struct StubClient {
    responder: Box<Responder>,
    latency: Duration,
    calls: Mutex<Vec<CallRecord>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(usize, &str) -> TranslationResult<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// 把每一项翻译成 `译:原文` 并保留索引标记
    pub fn echo() -> Self {
        Self::new(|_, payload| Ok(echo_translation(payload)))
    }

    /// 总是返回同一个错误
    pub fn failing(error: TranslationError) -> Self {
        Self::new(move |_, _| Err(error.clone()))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationClient for StubClient {
    async fn translate(&self, context: &RequestContext, text: &str) -> TranslationResult<String> {
        let sequence = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(CallRecord {
                at: Instant::now(),
                payload: text.to_string(),
                target_language: context.target_language.clone(),
            });
            calls.len() - 1
        };

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.responder)(sequence, text)
    }
}

/// 按索引标记逐项“翻译”，正文中的转义原样保留
pub fn echo_translation(payload: &str) -> String {
    let items = marker_count(payload);
    decode_indexed(payload, items)
        .into_iter()
        .enumerate()
        .map(|(i, text)| format!("[[{}]] 译:{}", i, escape_markers(&text.unwrap_or_default())))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 请求文本中的索引标记数
pub fn marker_count(payload: &str) -> usize {
    Regex::new(r"(?m)^\[\[\d+\]\]")
        .unwrap()
        .find_iter(payload)
        .count()
}

/// 令牌桶基本不限流的配置，便于单独观察其他行为
pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        capacity: 1000.0,
        refill_per_second: 1000.0,
        ..SchedulerConfig::default()
    }
}

pub fn context() -> RequestContext {
    RequestContext::new("test-key", "zh-CN", "test-model")
}

/// 生成 `count` 个长度为 `len` 的不同文本单元
pub fn units_of_len(count: usize, len: usize) -> Vec<TranslationUnit> {
    (0..count)
        .map(|i| {
            let head = format!("Item {} says ", i);
            let body = "a".repeat(len.saturating_sub(head.len()));
            TranslationUnit::new(format!("u{}", i), format!("{}{}", head, body))
        })
        .collect()
}

/// 生成约 `min_chars` 字符、由完整句子组成的长文本
pub fn long_text(min_chars: usize) -> String {
    let mut text = String::new();
    let mut i = 0;
    while text.chars().count() <= min_chars {
        text.push_str(&format!("Sentence {} keeps the reader busy for a while. ", i));
        i += 1;
    }
    text.trim_end().to_string()
}
