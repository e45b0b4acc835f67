//! # Retry Tests
//!
//! Throttled provider calls are retried with non-decreasing backoff, within
//! the attempt budget.

mod common;

use common::{Cloud, ContainerProps, Containers};
use converge::provider::{ErrorCategory, RetryConfig};
use converge::{ApplyOptions, Change, Engine, Scope};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_throttled_create_succeeds_on_fourth_attempt() {
    let cloud = Arc::new(Cloud::new());
    let containers = Arc::new(Containers::new(Arc::clone(&cloud)));
    let engine = Engine::in_memory();
    let scope = Scope::root("shop", "dev");
    cloud.throttle(3);

    let out = engine
        .apply(&scope, "db", &containers, ContainerProps::new("postgres:16"), ApplyOptions::new())
        .await
        .unwrap();

    assert_eq!(out.change, Change::Created);
    assert_eq!(out.name, "shop-dev-db");
    assert_eq!(cloud.create_calls(), 4);
    assert_eq!(cloud.len(), 1);

    let delays = containers.delays.delays();
    assert_eq!(delays.len(), 3);
    assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]), "{delays:?}");
    assert!(delays[0] >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_throttling_past_budget_surfaces_rate_limit() {
    let cloud = Arc::new(Cloud::new());
    let containers = Arc::new(
        Containers::new(Arc::clone(&cloud))
            .with_retry(RetryConfig::new(3, Duration::from_millis(50), 2.0).with_jitter(0.0)),
    );
    let engine = Engine::in_memory();
    let scope = Scope::root("shop", "dev");
    cloud.throttle(10);

    let err = engine
        .apply(&scope, "db", &containers, ContainerProps::new("postgres:16"), ApplyOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.category(), Some(ErrorCategory::RateLimited));
    assert_eq!(cloud.create_calls(), 3);
    assert_eq!(
        containers.delays.delays(),
        vec![Duration::from_millis(50), Duration::from_millis(100)]
    );
    assert!(engine.store().load(&scope, "db").await.unwrap().is_none());
}

#[tokio::test]
async fn test_conflict_is_not_retried() {
    let cloud = Arc::new(Cloud::new());
    let containers = Arc::new(Containers::new(Arc::clone(&cloud)));
    let engine = Engine::in_memory();
    let scope = Scope::root("shop", "dev");
    cloud.seed("shop-dev-db", "postgres:15");

    let err = engine
        .apply(&scope, "db", &containers, ContainerProps::new("postgres:16"), ApplyOptions::new())
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(cloud.create_calls(), 1);
    assert!(containers.delays.delays().is_empty());
}
