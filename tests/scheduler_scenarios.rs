//! 请求调度器集成测试
//!
//! 使用暂停的 tokio 时钟，所有时间断言都是确定的

use std::sync::Arc;
use std::time::Duration;

use page_translator::translation::pipeline::batch::decode_indexed;
use page_translator::translation::{
    Progress, RequestContext, RequestScheduler, SchedulerConfig, TranslationCache,
    TranslationError, TranslationUnit,
};

mod common;

use common::{context, fast_config, long_text, marker_count, units_of_len, StubClient};

fn scheduler(config: SchedulerConfig, client: Arc<StubClient>) -> RequestScheduler {
    RequestScheduler::new(config, context(), client).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_twelve_units_dispatch_in_two_waves() {
    let client = StubClient::echo().with_latency(Duration::from_secs(1)).shared();
    let config = SchedulerConfig {
        max_batch_chars: 300,
        max_concurrent: 2,
        ..fast_config()
    };
    let scheduler = scheduler(config, client.clone());

    let units = units_of_len(12, 80);
    let sources: Vec<String> = units.iter().map(|u| u.text.clone()).collect();
    let report = scheduler.submit(units).await.unwrap();

    // 4 个批次，每批 3 项
    let calls = client.calls();
    assert_eq!(calls.len(), 4);
    for call in &calls {
        assert_eq!(marker_count(&call.payload), 3);
        assert!(call.payload.chars().count() <= 300);
    }

    // 两波，每波 2 个并发批次，波间有节流间隔
    assert_eq!(client.max_in_flight(), 2);
    assert_eq!(calls[0].at, calls[1].at);
    assert_eq!(calls[2].at, calls[3].at);
    assert!(calls[2].at - calls[0].at >= Duration::from_millis(1500));

    // 结果按提交顺序返回
    assert!(report.is_complete());
    for (i, (id, result)) in report.results().into_iter().enumerate() {
        assert_eq!(id, format!("u{}", i));
        assert_eq!(result.unwrap(), format!("译:{}", sources[i]));
    }

    let stats = scheduler.stats();
    assert_eq!(stats.batches_planned, 4);
    assert_eq!(stats.attempts, 4);
    assert_eq!(stats.units_translated, 12);
}

#[tokio::test(start_paused = true)]
async fn test_long_unit_is_segmented_and_rejoined() {
    let client = StubClient::echo().shared();
    let config = SchedulerConfig {
        max_segment_length: 1000,
        min_segment_length: 50,
        ..fast_config()
    };
    let scheduler = scheduler(config, client.clone());

    let text = long_text(2500);
    assert!(text.chars().count() >= 2500);
    let report = scheduler
        .submit(vec![TranslationUnit::new("article", &text)])
        .await
        .unwrap();

    let calls = client.calls();
    let segments: usize = calls.iter().map(|call| marker_count(&call.payload)).sum();
    assert!(segments >= 3, "only {} segments", segments);
    for call in &calls {
        let items = decode_indexed(&call.payload, marker_count(&call.payload));
        for item in items {
            assert!(item.unwrap().chars().count() <= 1000);
        }
    }

    assert_eq!(report.units.len(), 1);
    let translation = report.translation_of("article").unwrap();
    assert_eq!(translation.matches("译:").count(), segments);
    assert!(translation.starts_with("译:Sentence 0 "));
    assert!(!translation.contains("[["));
}

#[tokio::test(start_paused = true)]
async fn test_retryable_failure_exhausts_retries_with_backoff() {
    let client = StubClient::failing(TranslationError::RateLimited("429".to_string())).shared();
    let scheduler = scheduler(fast_config(), client.clone());

    let report = scheduler
        .submit(vec![TranslationUnit::new("a", "Hello")])
        .await
        .unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 4);
    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].at - w[0].at).collect();
    let expected = [2000, 3000, 4500];
    for (gap, millis) in gaps.iter().zip(expected) {
        assert!(*gap >= Duration::from_millis(millis), "gap {:?}", gap);
        assert!(*gap < Duration::from_millis(millis + 100), "gap {:?}", gap);
    }

    assert!(matches!(
        report.failure_of("a"),
        Some(TranslationError::RateLimited(_))
    ));
    let stats = scheduler.stats();
    assert_eq!(stats.retries, 3);
    assert_eq!(stats.batches_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_is_capped() {
    let client = StubClient::failing(TranslationError::ServiceUnavailable("503".to_string())).shared();
    let config = SchedulerConfig {
        max_retries: 2,
        base_backoff_ms: 1000,
        max_backoff_ms: 1200,
        ..fast_config()
    };
    let scheduler = scheduler(config, client.clone());
    scheduler
        .submit(vec![TranslationUnit::new("a", "Hello")])
        .await
        .unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1].at - calls[0].at, Duration::from_millis(1000));
    assert_eq!(calls[2].at - calls[1].at, Duration::from_millis(1200));
}

#[tokio::test(start_paused = true)]
async fn test_authentication_failure_is_not_retried() {
    let client =
        StubClient::failing(TranslationError::AuthenticationFailed("401".to_string())).shared();
    let scheduler = scheduler(fast_config(), client.clone());

    let result = scheduler.submit(units_of_len(3, 20)).await;

    assert_eq!(client.call_count(), 1);
    assert!(matches!(result, Err(TranslationError::AuthenticationFailed(_))));
    assert_eq!(scheduler.stats().retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_every_batch_failing_fatally_fails_the_submission() {
    let client =
        StubClient::failing(TranslationError::AuthenticationFailed("401".to_string())).shared();
    let config = SchedulerConfig {
        max_batch_chars: 30,
        ..fast_config()
    };
    let scheduler = scheduler(config, client.clone());

    let result = scheduler.submit(units_of_len(3, 20)).await;

    // 每个单元一个批次，每个批次只尝试一次
    assert!(matches!(result, Err(TranslationError::AuthenticationFailed(_))));
    assert_eq!(client.call_count(), 3);
    let stats = scheduler.stats();
    assert_eq!(stats.batches_planned, 3);
    assert_eq!(stats.attempts, 3);
    assert_eq!(stats.retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_batch_failures_give_partial_report() {
    let client = StubClient::new(|_, payload| {
        if payload.contains("Item 0 ") {
            Err(TranslationError::Unknown("500".to_string()))
        } else if payload.contains("Item 1 ") {
            Err(TranslationError::MalformedResponse("no candidates".to_string()))
        } else {
            Ok(common::echo_translation(payload))
        }
    })
    .shared();
    let config = SchedulerConfig {
        max_batch_chars: 30,
        ..fast_config()
    };
    let scheduler = scheduler(config, client.clone());

    let report = scheduler.submit(units_of_len(3, 20)).await.unwrap();

    assert_eq!(client.call_count(), 3);
    assert!(matches!(report.failure_of("u0"), Some(TranslationError::Unknown(_))));
    assert!(matches!(
        report.failure_of("u1"),
        Some(TranslationError::MalformedResponse(_))
    ));
    assert!(report.translation_of("u2").unwrap().starts_with("译:Item 2 "));
    assert_eq!(scheduler.stats().retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_is_retried_until_success() {
    let client = StubClient::new(|sequence, payload| {
        if sequence < 2 {
            Err(TranslationError::TransportError("connection reset".to_string()))
        } else {
            Ok(common::echo_translation(payload))
        }
    })
    .shared();
    let scheduler = scheduler(fast_config(), client.clone());

    let report = scheduler
        .submit(vec![TranslationUnit::new("a", "Hello")])
        .await
        .unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 3);
    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].at - w[0].at).collect();
    for (gap, millis) in gaps.iter().zip([2000, 3000]) {
        assert!(*gap >= Duration::from_millis(millis), "gap {:?}", gap);
        assert!(*gap < Duration::from_millis(millis + 100), "gap {:?}", gap);
    }
    assert_eq!(report.translation_of("a"), Some("译:Hello"));
    assert_eq!(scheduler.stats().retries, 2);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_failure_keeps_cached_translations() {
    let client = StubClient::new(|sequence, payload| {
        if sequence == 0 {
            Ok(common::echo_translation(payload))
        } else {
            Err(TranslationError::AuthenticationFailed("key revoked".to_string()))
        }
    })
    .shared();
    let scheduler = RequestScheduler::with_cache(
        fast_config(),
        context(),
        client.clone(),
        Some(TranslationCache::with_config(100, Duration::from_secs(3600))),
    )
    .unwrap();

    scheduler
        .submit(vec![TranslationUnit::new("warm", "cached text")])
        .await
        .unwrap();

    let report = scheduler
        .submit(vec![
            TranslationUnit::new("cached", "cached text"),
            TranslationUnit::new("fresh", "fresh text"),
        ])
        .await
        .unwrap();

    assert_eq!(client.call_count(), 2);
    assert_eq!(report.translation_of("cached"), Some("译:cached text"));
    assert!(matches!(
        report.failure_of("fresh"),
        Some(TranslationError::AuthenticationFailed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_marker_shaped_source_text_is_not_split_across_units() {
    // 原样返回请求文本
    let client = StubClient::new(|_, payload| Ok(payload.to_string())).shared();
    let scheduler = scheduler(fast_config(), client.clone());

    let report = scheduler
        .submit(vec![
            TranslationUnit::new("a", "Footnotes:\n[[1]] see appendix"),
            TranslationUnit::new("b", "Second node"),
        ])
        .await
        .unwrap();

    assert_eq!(client.call_count(), 1);
    assert!(report.is_complete());
    assert_eq!(report.translation_of("a"), Some("Footnotes:\n[[1]] see appendix"));
    assert_eq!(report.translation_of("b"), Some("Second node"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_credential_fails_before_dispatch() {
    let client = StubClient::echo().shared();
    let scheduler = RequestScheduler::new(
        fast_config(),
        RequestContext::new("", "zh-CN", "test-model"),
        client.clone(),
    )
    .unwrap();

    let result = scheduler.submit(units_of_len(2, 20)).await;

    assert_eq!(result.unwrap_err(), TranslationError::MissingCredential);
    assert_eq!(client.call_count(), 0);
    assert!(!scheduler.is_draining());
}

#[tokio::test(start_paused = true)]
async fn test_failed_batch_only_fails_its_units() {
    let client = StubClient::new(|_, payload| {
        if payload.contains("poison") {
            Err(TranslationError::AuthenticationFailed("key revoked".to_string()))
        } else {
            Ok(common::echo_translation(payload))
        }
    })
    .shared();
    let config = SchedulerConfig {
        max_batch_chars: 20,
        ..fast_config()
    };
    let scheduler = scheduler(config, client.clone());

    let report = scheduler
        .submit(vec![
            TranslationUnit::new("good", "good one"),
            TranslationUnit::new("bad", "poison pill"),
            TranslationUnit::new("also-good", "fine too"),
        ])
        .await
        .unwrap();

    assert_eq!(client.call_count(), 3);
    assert_eq!(report.translation_of("good"), Some("译:good one"));
    assert_eq!(report.translation_of("also-good"), Some("译:fine too"));
    assert!(matches!(
        report.failure_of("bad"),
        Some(TranslationError::AuthenticationFailed(_))
    ));
    assert_eq!(report.translated_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_missing_result_position_is_reported() {
    let client = StubClient::new(|_, _| Ok("[[0]] 只有第一项".to_string())).shared();
    let scheduler = scheduler(fast_config(), client.clone());

    let report = scheduler
        .submit(vec![
            TranslationUnit::new("first", "first"),
            TranslationUnit::new("second", "second"),
        ])
        .await
        .unwrap();

    assert_eq!(report.translation_of("first"), Some("只有第一项"));
    assert!(matches!(
        report.failure_of("second"),
        Some(TranslationError::MalformedResponse(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_positional_fallback_without_markers() {
    let client = StubClient::new(|_, _| Ok("甲\n乙\n丙".to_string())).shared();
    let scheduler = scheduler(fast_config(), client);

    let report = scheduler.submit(units_of_len(3, 15)).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.translation_of("u0"), Some("甲"));
    assert_eq!(report.translation_of("u2"), Some("丙"));
}

#[tokio::test(start_paused = true)]
async fn test_empty_unit_is_rejected_without_blocking_others() {
    let client = StubClient::echo().shared();
    let scheduler = scheduler(fast_config(), client.clone());

    let report = scheduler
        .submit(vec![
            TranslationUnit::new("blank", "   "),
            TranslationUnit::new("text", "hello"),
        ])
        .await
        .unwrap();

    assert!(matches!(
        report.failure_of("blank"),
        Some(TranslationError::InvalidInput(_))
    ));
    assert_eq!(report.translation_of("text"), Some("译:hello"));
    assert_eq!(marker_count(&client.calls()[0].payload), 1);
}

#[tokio::test(start_paused = true)]
async fn test_token_bucket_spaces_dispatches() {
    let client = StubClient::echo().shared();
    let config = SchedulerConfig {
        capacity: 1.0,
        refill_per_second: 0.5,
        max_concurrent: 1,
        max_batch_chars: 20,
        ..SchedulerConfig::default()
    };
    let scheduler = scheduler(config, client.clone());

    scheduler.submit(units_of_len(3, 14)).await.unwrap();

    let calls = client.calls();
    assert_eq!(calls.len(), 3);
    for pair in calls.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_secs(2));
    }
}

#[tokio::test(start_paused = true)]
async fn test_submissions_are_processed_one_at_a_time() {
    let client = StubClient::echo().with_latency(Duration::from_secs(1)).shared();
    let scheduler = scheduler(fast_config(), client.clone());

    let first = vec![
        TranslationUnit::new("a1", "first batch one"),
        TranslationUnit::new("a2", "first batch two"),
    ];
    let second = vec![TranslationUnit::new("b1", "second batch")];

    let (a, b) = tokio::join!(scheduler.submit(first), scheduler.submit(second));
    assert!(a.unwrap().is_complete());
    assert!(b.unwrap().is_complete());

    let calls = client.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].payload.contains("first batch"));
    assert!(calls[1].payload.contains("second batch"));
    assert!(calls[1].at - calls[0].at >= Duration::from_secs(1));
    assert!(!scheduler.is_draining());
    assert_eq!(scheduler.stats().submissions, 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_in_flight_and_queued_work() {
    let client = StubClient::echo().with_latency(Duration::from_secs(5)).shared();
    let scheduler = scheduler(fast_config(), client.clone());

    let running = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.submit(units_of_len(2, 20)).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let queued = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            scheduler
                .submit(vec![TranslationUnit::new("later", "later text")])
                .await
        }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.queued(), 1);

    scheduler.stop();

    let running = running.await.unwrap().unwrap();
    assert_eq!(running.translated_count(), 0);
    assert_eq!(running.failure_of("u0"), Some(&TranslationError::Cancelled));
    assert_eq!(running.failure_of("u1"), Some(&TranslationError::Cancelled));

    let queued = queued.await.unwrap().unwrap();
    assert_eq!(queued.failure_of("later"), Some(&TranslationError::Cancelled));
    assert_eq!(client.call_count(), 1);

    // 新的提交重新启动排空循环
    let report = scheduler
        .submit(vec![TranslationUnit::new("again", "again")])
        .await
        .unwrap();
    assert_eq!(report.translation_of("again"), Some("译:again"));
}

#[tokio::test(start_paused = true)]
async fn test_cache_skips_repeated_text() {
    let client = StubClient::echo().shared();
    let scheduler = RequestScheduler::with_cache(
        fast_config(),
        context(),
        client.clone(),
        Some(TranslationCache::with_config(100, Duration::from_secs(3600))),
    )
    .unwrap();

    let first = scheduler.submit(units_of_len(3, 30)).await.unwrap();
    let second = scheduler.submit(units_of_len(3, 30)).await.unwrap();

    assert_eq!(client.call_count(), 1);
    assert_eq!(first.results(), second.results());
    let stats = scheduler.stats();
    assert_eq!(stats.cache_hits, 3);
    assert_eq!(stats.cache_misses, 3);

    // 不同目标语言不命中
    let other = RequestContext::new("test-key", "ja", "test-model");
    scheduler
        .submit_with(other, units_of_len(3, 30))
        .await
        .unwrap();
    let calls = client.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].target_language, "ja");
}

#[tokio::test(start_paused = true)]
async fn test_progress_reaches_total() {
    let client = StubClient::echo().shared();
    let config = SchedulerConfig {
        max_batch_chars: 40,
        max_concurrent: 1,
        ..fast_config()
    };
    let scheduler = scheduler(config, client);
    let progress = scheduler.progress();

    scheduler.submit(units_of_len(4, 25)).await.unwrap();

    assert_eq!(
        *progress.borrow(),
        Progress {
            completed: 4,
            total: 4
        }
    );
    assert!(progress.borrow().is_done());
}
