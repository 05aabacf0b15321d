//! Health aggregation over real core components and the worst-case
//! roll-up contract.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{config_from, core};
use textforge::prelude::*;

#[tokio::test]
async fn three_probes_roll_up_to_worst_status() {
    let checker = HealthChecker::new(config_from(&[]).health.clone())
        .with_sleeper(Arc::new(InstantSleeper));
    let invocations = Arc::new(AtomicUsize::new(0));

    for (name, status) in [
        ("ai_model", HealthStatus::Healthy),
        ("cache", HealthStatus::Degraded),
        ("resilience", HealthStatus::Healthy),
    ] {
        let invocations = invocations.clone();
        checker
            .register(name, move || {
                let invocations = invocations.clone();
                async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Ok(match status {
                        HealthStatus::Degraded => ComponentStatus::degraded(name, "slow"),
                        _ => ComponentStatus::healthy(name),
                    })
                }
            })
            .unwrap();
    }

    let system = checker.check_all().await;
    assert_eq!(system.overall_status, HealthStatus::Degraded);
    assert_eq!(system.components.len(), 3);
    assert!(system.timestamp_epoch_ms > 0);
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn probes_over_real_components_report_healthy() {
    let h = core(Arc::new(StaticModel::new("ok")), &[]);
    let checker = HealthChecker::new(h.config.health.clone())
        .with_sleeper(Arc::new(InstantSleeper));

    let cache = h.cache.clone();
    checker
        .register("cache", move || {
            let cache = cache.clone();
            async move {
                cache.ping().await?;
                let stats = cache.stats().await;
                Ok(ComponentStatus::healthy("cache")
                    .with_metadata("l1_entries", stats.l1.entries)
                    .with_metadata("l2_connected", stats.l2.connected))
            }
        })
        .unwrap();

    let resilience = h.resilience.clone();
    checker
        .register("resilience", move || {
            let resilience = resilience.clone();
            async move {
                let open = resilience.open_breaker_count();
                if open == 0 {
                    Ok(ComponentStatus::healthy("resilience"))
                } else {
                    Ok(ComponentStatus::degraded(
                        "resilience",
                        format!("{open} circuit breaker(s) open"),
                    ))
                }
            }
        })
        .unwrap();

    let system = checker.check_all().await;
    assert_eq!(system.overall_status, HealthStatus::Healthy);

    let cache_status = system.components.iter().find(|c| c.name == "cache").unwrap();
    assert_eq!(cache_status.metadata["l2_connected"], serde_json::json!(true));
}

#[tokio::test]
async fn open_breaker_degrades_the_resilience_probe() {
    let model = Arc::new(ScriptedModel::always_transient("down"));
    let h = core(
        model,
        &[(
            "RESILIENCE_CUSTOM_CONFIG",
            r#"{"retry_attempts": 1, "circuit_breaker_threshold": 1}"#,
        )],
    );

    // Trip the summarize breaker through the pipeline.
    let degraded = h.processor.process(common::summarize_request("doc")).await.unwrap();
    assert!(degraded.fallback_used());
    assert_eq!(h.resilience.open_breaker_count(), 1);

    let checker = HealthChecker::new(h.config.health.clone())
        .with_sleeper(Arc::new(InstantSleeper));
    let resilience = h.resilience.clone();
    checker
        .register("resilience", move || {
            let resilience = resilience.clone();
            async move {
                let open = resilience.open_breaker_count();
                if open == 0 {
                    Ok(ComponentStatus::healthy("resilience"))
                } else {
                    Ok(ComponentStatus::degraded(
                        "resilience",
                        format!("{open} circuit breaker(s) open"),
                    ))
                }
            }
        })
        .unwrap();

    let system = checker.check_all().await;
    assert_eq!(system.overall_status, HealthStatus::Degraded);
}

#[tokio::test]
async fn failing_l2_degrades_the_cache_probe_to_unhealthy() {
    let h = core(Arc::new(StaticModel::new("ok")), &[]);
    h.backend.set_failing(true);

    let checker = HealthChecker::new(h.config.health.clone())
        .with_sleeper(Arc::new(InstantSleeper));
    let cache = h.cache.clone();
    checker
        .register("cache", move || {
            let cache = cache.clone();
            async move {
                cache.ping().await?;
                Ok(ComponentStatus::healthy("cache"))
            }
        })
        .unwrap();

    let system = checker.check_all().await;
    assert_eq!(system.overall_status, HealthStatus::Unhealthy);
    let cache_status = &system.components[0];
    assert!(cache_status.message.contains("unavailable"));
}

#[tokio::test]
async fn retry_count_zero_probes_exactly_once_per_check_all() {
    let checker = HealthChecker::new(
        config_from(&[("HEALTH_CHECK_RETRY_COUNT", "0")]).health.clone(),
    )
    .with_sleeper(Arc::new(InstantSleeper));

    let invocations = Arc::new(AtomicUsize::new(0));
    let invocations_clone = invocations.clone();
    checker
        .register("flaky", move || {
            let invocations = invocations_clone.clone();
            async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Err::<ComponentStatus, _>(ServiceError::transient("down"))
            }
        })
        .unwrap();

    let system = checker.check_all().await;
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(system.overall_status, HealthStatus::Unhealthy);
}
