//! 批次执行引擎
//!
//! 负责单个批次的一次完整执行：编码、限流、调用翻译客户端、按退避策略重试，
//! 最后把响应解码回批次中的各项。
//!
//! 重试规则：
//!
//! - 可重试错误（限流、服务不可用、网络错误）等待
//!   `min(base * 1.5^k, max)` 后重发，最多重试 `max_retries` 次
//! - 其余错误只尝试一次，直接返回
//! - 每次尝试前都要重新获取令牌
//! - 停止信号在每次尝试前后检查，收到后返回 `Cancelled`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::sleep;

use super::stats::SchedulerStats;
use super::token_bucket::TokenBucket;
use crate::translation::client::{RequestContext, TranslationClient};
use crate::translation::config::SchedulerConfig;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::Batch;

/// 协作式停止信号
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 批次执行器
pub struct BatchExecutor {
    client: Arc<dyn TranslationClient>,
    bucket: Arc<TokenBucket>,
    config: SchedulerConfig,
    stats: Arc<SchedulerStats>,
    stop: StopSignal,
}

impl BatchExecutor {
    pub fn new(
        client: Arc<dyn TranslationClient>,
        bucket: Arc<TokenBucket>,
        config: SchedulerConfig,
        stats: Arc<SchedulerStats>,
        stop: StopSignal,
    ) -> Self {
        Self {
            client,
            bucket,
            config,
            stats,
            stop,
        }
    }

    /// 执行一个批次
    ///
    /// 成功时返回与 `batch.items` 下标一致的译文，响应中缺失的位置为 `None`。
    pub async fn execute(
        &self,
        context: &RequestContext,
        batch: &Batch,
    ) -> TranslationResult<Vec<Option<String>>> {
        let payload = batch.encode();
        let mut retries = 0u32;

        loop {
            self.check_stopped()?;
            self.bucket.acquire().await;
            self.check_stopped()?;

            self.stats.inc_attempts();
            self.stats.add_chars_sent(payload.chars().count());
            tracing::debug!(
                "发送批次 {}：{} 项，{} 字符（第 {} 次尝试）",
                batch.id,
                batch.len(),
                payload.chars().count(),
                retries + 1
            );

            match self.client.translate(context, &payload).await {
                Ok(response) => {
                    // 停止后返回的结果直接丢弃
                    self.check_stopped()?;
                    return Ok(batch.decode(&response));
                }
                Err(error) if error.is_retryable() && retries < self.config.max_retries => {
                    let delay = self.config.backoff_delay(retries);
                    retries += 1;
                    self.stats.inc_retries();
                    tracing::warn!(
                        "批次 {} 翻译失败，{}ms后重试 (重试 {}/{}): {}",
                        batch.id,
                        delay.as_millis(),
                        retries,
                        self.config.max_retries,
                        error
                    );
                    sleep(delay).await;
                }
                Err(error) => {
                    if error.is_retryable() {
                        tracing::error!(
                            "批次 {} 重试 {} 次后仍然失败: {}",
                            batch.id,
                            self.config.max_retries,
                            error
                        );
                    }
                    return Err(error);
                }
            }
        }
    }

    fn check_stopped(&self) -> TranslationResult<()> {
        if self.stop.is_stopped() {
            Err(TranslationError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::translation::pipeline::BatchItem;

    /// 按顺序返回预设结果的客户端，记录每次调用的时间
    struct ScriptedClient {
        script: Mutex<Vec<TranslationResult<String>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedClient {
        fn new(mut script: Vec<TranslationResult<String>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TranslationClient for ScriptedClient {
        async fn translate(&self, _: &RequestContext, _: &str) -> TranslationResult<String> {
            self.calls.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(TranslationError::Unknown("script exhausted".to_string())))
        }
    }

    fn batch(texts: &[&str]) -> Batch {
        Batch {
            id: 0,
            items: texts
                .iter()
                .enumerate()
                .map(|(i, text)| BatchItem {
                    unit_index: i,
                    segment_index: 0,
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    fn executor(client: Arc<ScriptedClient>, stop: StopSignal) -> (BatchExecutor, Arc<SchedulerStats>) {
        let config = SchedulerConfig {
            capacity: 100.0,
            refill_per_second: 100.0,
            ..SchedulerConfig::default()
        };
        let stats = Arc::new(SchedulerStats::default());
        let bucket = Arc::new(TokenBucket::new(config.capacity, config.refill_per_second));
        (
            BatchExecutor::new(client, bucket, config, stats.clone(), stop),
            stats,
        )
    }

    fn context() -> RequestContext {
        RequestContext::new("key", "zh-CN", "test-model")
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let client = ScriptedClient::new(vec![
            Err(TranslationError::RateLimited("429".to_string())),
            Err(TranslationError::ServiceUnavailable("503".to_string())),
            Ok("[[0]] 一\n\n[[1]] 二".to_string()),
        ]);
        let (executor, stats) = executor(client.clone(), StopSignal::new());

        let result = executor.execute(&context(), &batch(&["one", "two"])).await;
        assert_eq!(
            result.unwrap(),
            vec![Some("一".to_string()), Some("二".to_string())]
        );

        let calls = client.call_times();
        assert_eq!(calls.len(), 3);
        assert!(calls[1] - calls[0] >= Duration::from_millis(2000));
        assert!(calls[2] - calls[1] >= Duration::from_millis(3000));
        assert_eq!(stats.snapshot().retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_response_is_not_retried() {
        let client = ScriptedClient::new(vec![Err(TranslationError::MalformedResponse(
            "no text".to_string(),
        ))]);
        let (executor, stats) = executor(client.clone(), StopSignal::new());

        let result = executor.execute(&context(), &batch(&["one"])).await;
        assert!(matches!(result, Err(TranslationError::MalformedResponse(_))));
        assert_eq!(client.call_times().len(), 1);
        assert_eq!(stats.snapshot().attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_executor_does_not_dispatch() {
        let client = ScriptedClient::new(vec![Ok("[[0]] 一".to_string())]);
        let stop = StopSignal::new();
        stop.stop();
        let (executor, _) = executor(client.clone(), stop);

        let result = executor.execute(&context(), &batch(&["one"])).await;
        assert_eq!(result, Err(TranslationError::Cancelled));
        assert!(client.call_times().is_empty());
    }
}
