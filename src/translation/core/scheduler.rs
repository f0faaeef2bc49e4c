//! 请求调度器
//!
//! 调度器是整个翻译流程的中枢：调用方提交一组翻译单元，调度器把它们放入队列，
//! 由唯一的排空循环逐个取出处理。每个提交会被规划成若干批次，按
//! `max_concurrent` 分波并发发送，两波之间插入节流间隔；单个批次的限流与重试
//! 由 [`BatchExecutor`] 负责。
//!
//! ## 结果约定
//!
//! - 每个提交的单元最终要么带有译文，要么在报告中有一条失败记录
//! - 某个批次失败只影响它包含的单元，其余批次照常进行
//! - 只有当所有批次都以不可重试的致命错误失败时，`submit` 才返回错误
//! - 缺少API密钥时在发送任何请求之前直接返回 `MissingCredential`
//!
//! ## 使用示例
//!
//! ```no_run
//! use std::sync::Arc;
//! use page_translator::translation::{
//!     GeminiClient, RequestContext, RequestScheduler, SchedulerConfig, TranslationUnit,
//! };
//!
//! # async fn run() -> page_translator::translation::TranslationResult<()> {
//! let scheduler = RequestScheduler::new(
//!     SchedulerConfig::default(),
//!     RequestContext::new("api-key", "zh-CN", "gemini-2.0-flash"),
//!     Arc::new(GeminiClient::default()),
//! )?;
//!
//! let report = scheduler
//!     .submit(vec![TranslationUnit::new("p1", "Hello world")])
//!     .await?;
//! println!("{:?}", report.translation_of("p1"));
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use tokio::sync::{oneshot, watch};
use tokio::time::{sleep, Instant};

use super::engine::{BatchExecutor, StopSignal};
use super::stats::{SchedulerStats, SchedulerStatsSnapshot};
use super::token_bucket::TokenBucket;
use crate::translation::client::{RequestContext, TranslationClient};
use crate::translation::config::{SchedulerConfig, TranslationConfig};
use crate::translation::error::{helpers, TranslationError, TranslationResult};
use crate::translation::pipeline::{plan_batches, BatchPlan, SubmissionReport, TranslationUnit, UnitFailure};
use crate::translation::storage::TranslationCache;

/// 提交进度（按单元计）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }
}

struct QueueEntry {
    context: RequestContext,
    units: Vec<TranslationUnit>,
    reply: oneshot::Sender<TranslationResult<SubmissionReport>>,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<QueueEntry>,
    draining: bool,
}

struct Inner {
    config: SchedulerConfig,
    context: RequestContext,
    executor: BatchExecutor,
    cache: Option<TranslationCache>,
    state: Mutex<QueueState>,
    stop: StopSignal,
    progress: watch::Sender<Progress>,
    stats: Arc<SchedulerStats>,
}

/// 请求调度器
///
/// 克隆得到的是同一个调度器的句柄，共享队列、令牌桶和统计。
#[derive(Clone)]
pub struct RequestScheduler {
    inner: Arc<Inner>,
}

impl RequestScheduler {
    /// 创建不带缓存的调度器
    pub fn new(
        config: SchedulerConfig,
        context: RequestContext,
        client: Arc<dyn TranslationClient>,
    ) -> TranslationResult<Self> {
        Self::with_cache(config, context, client, None)
    }

    /// 创建调度器，可选地附带结果缓存
    pub fn with_cache(
        config: SchedulerConfig,
        context: RequestContext,
        client: Arc<dyn TranslationClient>,
        cache: Option<TranslationCache>,
    ) -> TranslationResult<Self> {
        config.validate()?;

        let stats = Arc::new(SchedulerStats::default());
        let stop = StopSignal::new();
        let bucket = Arc::new(TokenBucket::new(config.capacity, config.refill_per_second));
        let executor = BatchExecutor::new(client, bucket, config.clone(), stats.clone(), stop.clone());
        let (progress, _) = watch::channel(Progress::default());

        tracing::debug!(
            "创建调度器: 并发 {}，令牌桶容量 {}，补充速率 {}/s，{}",
            config.max_concurrent,
            config.capacity,
            config.refill_per_second,
            if cache.is_some() { "启用缓存" } else { "不使用缓存" }
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                context,
                executor,
                cache,
                state: Mutex::new(QueueState::default()),
                stop,
                progress,
                stats,
            }),
        })
    }

    /// 按完整配置创建调度器，缓存按配置启用
    pub fn from_config(
        config: &TranslationConfig,
        client: Arc<dyn TranslationClient>,
    ) -> TranslationResult<Self> {
        config.validate()?;
        Self::with_cache(
            config.scheduler.clone(),
            config.settings.request_context(),
            client,
            TranslationCache::from_config(config),
        )
    }

    /// 使用默认请求上下文提交
    pub async fn submit(&self, units: Vec<TranslationUnit>) -> TranslationResult<SubmissionReport> {
        let context = self.inner.context.clone();
        self.submit_with(context, units).await
    }

    /// 使用指定请求上下文提交
    pub async fn submit_with(
        &self,
        context: RequestContext,
        units: Vec<TranslationUnit>,
    ) -> TranslationResult<SubmissionReport> {
        if !context.has_credential() {
            let error = TranslationError::MissingCredential;
            helpers::log_error(&error);
            return Err(error);
        }

        if units.is_empty() {
            return Ok(SubmissionReport::default());
        }

        let (reply, receiver) = oneshot::channel();
        let start_loop = {
            let mut state = self.inner.lock_state();
            state.queue.push_back(QueueEntry {
                context,
                units,
                reply,
            });
            let idle = !state.draining;
            state.draining = true;
            idle
        };

        if start_loop {
            // 新的排空循环开始时清除上一轮的停止请求
            self.inner.stop.reset();
            tokio::spawn(drain(self.inner.clone()));
        }

        receiver
            .await
            .unwrap_or_else(|_| Err(TranslationError::Unknown("调度循环意外退出".to_string())))
    }

    /// 请求停止：不再发出新的请求，队列中和进行中的单元以 `Cancelled` 结束
    pub fn stop(&self) {
        tracing::info!("收到停止请求");
        self.inner.stop.stop();
    }

    /// 订阅进度更新
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.inner.progress.subscribe()
    }

    /// 获取统计信息
    pub fn stats(&self) -> SchedulerStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// 等待处理的提交数
    pub fn queued(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    /// 排空循环是否在运行
    pub fn is_draining(&self) -> bool {
        self.inner.lock_state().draining
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> Option<&TranslationCache> {
        self.inner.cache.as_ref()
    }
}

/// 排空循环：逐个处理队列中的提交，队列为空时退出
async fn drain(inner: Arc<Inner>) {
    tracing::debug!("排空循环启动");

    loop {
        let entry = {
            let mut state = inner.lock_state();
            match state.queue.pop_front() {
                Some(entry) => entry,
                None => {
                    state.draining = false;
                    break;
                }
            }
        };

        let QueueEntry {
            context,
            units,
            reply,
        } = entry;

        let result = if inner.stop.is_stopped() {
            Ok(inner.cancelled_report(units))
        } else {
            inner.process(&context, units).await
        };

        if reply.send(result).is_err() {
            tracing::debug!("提交方已放弃等待结果");
        }
    }

    tracing::debug!("排空循环结束");
}

/// 单元在一次提交中的处理状态
struct UnitSlots {
    /// 每个片段的译文
    segments: Vec<Option<String>>,
    /// 尚未返回结果的片段数
    outstanding: usize,
    error: Option<TranslationError>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cancelled_report(&self, units: Vec<TranslationUnit>) -> SubmissionReport {
        self.stats.add_units_submitted(units.len());
        self.stats.add_units_failed(units.len());
        let failures = units
            .iter()
            .map(|unit| UnitFailure {
                id: unit.id.clone(),
                error: TranslationError::Cancelled,
            })
            .collect();
        SubmissionReport { units, failures }
    }

    async fn process(
        &self,
        context: &RequestContext,
        mut units: Vec<TranslationUnit>,
    ) -> TranslationResult<SubmissionReport> {
        let started = Instant::now();
        let total = units.len();
        self.stats.inc_submissions();
        self.stats.add_units_submitted(total);

        let mut failures: Vec<Option<TranslationError>> = vec![None; total];
        let mut pending = Vec::with_capacity(total);

        for (index, unit) in units.iter_mut().enumerate() {
            if unit.text.is_empty() {
                failures[index] = Some(TranslationError::InvalidInput(format!(
                    "单元 {} 没有可翻译的文本",
                    unit.id
                )));
                continue;
            }

            match self.cached(context, &unit.text) {
                Some(hit) => unit.translation = Some(hit),
                None => pending.push(index),
            }
        }

        let mut completed = total - pending.len();
        self.progress.send_replace(Progress { completed, total });

        let plan = plan_batches(
            pending.iter().map(|&index| (index, units[index].text.as_str())),
            &self.config,
        );
        self.stats.add_batches_planned(plan.batch_count());

        tracing::info!(
            "处理提交: {} 个单元，{} 个来自缓存，规划 {} 个批次",
            total,
            total - pending.len() - failures.iter().filter(|f| f.is_some()).count(),
            plan.batch_count()
        );

        let mut slots: HashMap<usize, UnitSlots> = plan
            .layouts
            .iter()
            .map(|(&index, layout)| {
                (
                    index,
                    UnitSlots {
                        segments: vec![None; layout.segment_count()],
                        outstanding: layout.segment_count(),
                        error: None,
                    },
                )
            })
            .collect();

        let batch_errors = self
            .dispatch(context, &plan, &mut slots, &mut completed, total)
            .await;

        // 所有批次都因致命错误失败且没有任何缓存命中时整体失败
        if !plan.is_empty()
            && batch_errors.len() == plan.batch_count()
            && batch_errors.iter().all(TranslationError::is_fatal)
            && units.iter().all(|unit| unit.translation.is_none())
        {
            let error = batch_errors[0].clone();
            self.stats.add_units_failed(total);
            self.progress.send_replace(Progress { completed: total, total });
            helpers::log_error(&error);
            return Err(error);
        }

        for &index in &pending {
            let Some(state) = slots.remove(&index) else {
                continue;
            };
            if let Some(error) = state.error {
                failures[index] = Some(error);
                continue;
            }

            let rejoined = plan.layouts.get(&index).and_then(|layout| layout.rejoin(&state.segments));
            match rejoined {
                Some(translation) => {
                    if let Some(cache) = &self.cache {
                        cache.insert(&context.model, &context.target_language, &units[index].text, &translation);
                    }
                    units[index].translation = Some(translation);
                }
                None => {
                    failures[index] = Some(TranslationError::MalformedResponse(format!(
                        "响应中缺少单元 {} 的译文",
                        units[index].id
                    )));
                }
            }
        }

        let failures: Vec<UnitFailure> = units
            .iter()
            .zip(failures)
            .filter_map(|(unit, error)| {
                error.map(|error| UnitFailure {
                    id: unit.id.clone(),
                    error,
                })
            })
            .collect();

        let report = SubmissionReport { units, failures };
        self.stats.add_units_translated(report.translated_count());
        self.stats.add_units_failed(report.failures.len());
        self.stats.add_processing_time(started.elapsed());
        self.progress.send_replace(Progress { completed: total, total });

        tracing::info!(
            "提交完成: {}/{} 个单元已翻译，{} 个失败，耗时 {:?}",
            report.translated_count(),
            total,
            report.failures.len(),
            started.elapsed()
        );

        Ok(report)
    }

    /// 分波发送批次，返回失败批次的错误
    async fn dispatch(
        &self,
        context: &RequestContext,
        plan: &BatchPlan,
        slots: &mut HashMap<usize, UnitSlots>,
        completed: &mut usize,
        total: usize,
    ) -> Vec<TranslationError> {
        let mut batch_errors = Vec::new();
        let pacing = self.config.pacing_delay();
        let wave_size = self.config.max_concurrent.max(1);

        for (wave_index, wave) in plan.batches.chunks(wave_size).enumerate() {
            if wave_index > 0 && !self.stop.is_stopped() {
                sleep(pacing).await;
            }

            let outcomes: Vec<TranslationResult<Vec<Option<String>>>> = if self.stop.is_stopped() {
                wave.iter().map(|_| Err(TranslationError::Cancelled)).collect()
            } else {
                tracing::debug!("第 {} 波: 并发发送 {} 个批次", wave_index + 1, wave.len());
                join_all(wave.iter().map(|batch| self.executor.execute(context, batch))).await
            };

            for (batch, outcome) in wave.iter().zip(outcomes) {
                let decoded = match outcome {
                    Ok(decoded) => Some(decoded),
                    Err(error) => {
                        if error != TranslationError::Cancelled {
                            tracing::error!("批次 {} 失败: {}", batch.id, error);
                        }
                        self.stats.inc_batches_failed();
                        batch_errors.push(error);
                        None
                    }
                };

                for (position, item) in batch.items.iter().enumerate() {
                    let Some(state) = slots.get_mut(&item.unit_index) else {
                        continue;
                    };
                    match &decoded {
                        Some(decoded) => {
                            state.segments[item.segment_index] = decoded.get(position).cloned().flatten();
                        }
                        None => {
                            if state.error.is_none() {
                                state.error = batch_errors.last().cloned();
                            }
                        }
                    }
                    state.outstanding = state.outstanding.saturating_sub(1);
                    if state.outstanding == 0 {
                        *completed += 1;
                    }
                }
            }

            self.progress.send_replace(Progress {
                completed: *completed,
                total,
            });
        }

        batch_errors
    }

    fn cached(&self, context: &RequestContext, text: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        match cache.get(&context.model, &context.target_language, text) {
            Some(hit) => {
                self.stats.inc_cache_hits();
                Some(hit)
            }
            None => {
                self.stats.inc_cache_misses();
                None
            }
        }
    }
}
