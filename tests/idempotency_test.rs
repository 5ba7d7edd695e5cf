//! Exercises the idempotency ledger against a real Redis.
//! Run with: docker-compose up -d redis && cargo test -- --ignored

use uuid::Uuid;

use immopay_core::middleware::idempotency::{IdempotencyService, IdempotencyStatus};

const REDIS_URL: &str = "redis://127.0.0.1:6379";

fn unique_key() -> String {
    format!("test-{}", Uuid::new_v4())
}

#[tokio::test]
#[ignore] // Ignore by default since it requires Redis
async fn test_fresh_key_takes_the_processing_lock() {
    let service = IdempotencyService::new(REDIS_URL).unwrap();
    let key = unique_key();

    let first = service.check_idempotency(&key).await.unwrap();
    assert!(matches!(first, IdempotencyStatus::New));

    // The same key immediately afterwards is locked, not new.
    let second = service.check_idempotency(&key).await.unwrap();
    assert!(matches!(second, IdempotencyStatus::Processing));

    service.release_lock(&key).await.unwrap();
}

#[tokio::test]
#[ignore] // Ignore by default since it requires Redis
async fn test_stored_response_replays_for_duplicates() {
    let service = IdempotencyService::new(REDIS_URL).unwrap();
    let key = unique_key();

    assert!(matches!(
        service.check_idempotency(&key).await.unwrap(),
        IdempotencyStatus::New
    ));

    service
        .store_response(&key, 200, r#"{"transaction_id":"txn_a_1_ff"}"#.to_string())
        .await
        .unwrap();

    match service.check_idempotency(&key).await.unwrap() {
        IdempotencyStatus::Completed(cached) => {
            assert_eq!(cached.status, 200);
            assert!(cached.body.contains("txn_a_1_ff"));
        }
        other => panic!("expected a cached response, got {other:?}"),
    }

    service.release_lock(&key).await.unwrap();
}

#[tokio::test]
#[ignore] // Ignore by default since it requires Redis
async fn test_released_lock_lets_the_caller_retry() {
    let service = IdempotencyService::new(REDIS_URL).unwrap();
    let key = unique_key();

    assert!(matches!(
        service.check_idempotency(&key).await.unwrap(),
        IdempotencyStatus::New
    ));

    // A failed attempt gives the lock back.
    service.release_lock(&key).await.unwrap();

    assert!(matches!(
        service.check_idempotency(&key).await.unwrap(),
        IdempotencyStatus::New
    ));

    service.release_lock(&key).await.unwrap();
}
