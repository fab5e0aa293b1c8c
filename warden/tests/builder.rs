use std::{sync::Arc, time::Duration as StdDuration};

use chrono::Duration;
use tokio::sync::watch;
use warden::{CodeMode, Identifier, IssueOutcome, WardenBuilder, WardenBuilderError, WardenError};
use warden_core::{clock::ManualClock, notification::OutboxGateway};

#[tokio::test]
async fn test_builder_rejects_non_numeric_fixed_code() {
    let result = WardenBuilder::new()
        .with_memory_storage()
        .with_code_mode(CodeMode::Fixed("abc".to_string()))
        .build()
        .await;

    assert!(matches!(
        result,
        Err(WardenBuilderError::InvalidConfiguration(_))
    ));
}

#[tokio::test]
async fn test_builder_rejects_zero_timeout() {
    let result = WardenBuilder::new()
        .with_memory_storage()
        .with_delivery_timeout(StdDuration::ZERO)
        .build()
        .await;

    assert!(matches!(
        result,
        Err(WardenBuilderError::InvalidConfiguration(_))
    ));
}

#[tokio::test]
async fn test_builder_rejects_out_of_range_length() {
    let result = WardenBuilder::new()
        .with_memory_storage()
        .with_code_mode(CodeMode::Random { length: 12 })
        .build()
        .await;

    assert!(matches!(
        result,
        Err(WardenBuilderError::InvalidConfiguration(_))
    ));
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_with_sqlite_url_and_migrations() {
    let warden = WardenBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .unwrap()
        .apply_migrations(true)
        .build()
        .await
        .unwrap();

    warden.health_check().await.unwrap();
}

#[tokio::test]
async fn test_custom_gateway_receives_codes() {
    let outbox = Arc::new(OutboxGateway::new());
    let warden = WardenBuilder::new()
        .with_memory_storage()
        .with_gateway(outbox.clone())
        .with_code_mode(CodeMode::Random { length: 8 })
        .build()
        .await
        .unwrap();

    let email = Identifier::email("user@example.com").unwrap();
    let IssueOutcome::Issued { code } = warden.request_otp(&email).await.unwrap() else {
        panic!("Expected a code to be issued");
    };

    assert_eq!(code.len(), 8);
    assert_eq!(outbox.last_code_for(&email), Some(code));
}

#[tokio::test]
async fn test_empty_code_is_validation_error() {
    let warden = WardenBuilder::new()
        .with_memory_storage()
        .build()
        .await
        .unwrap();
    let phone = Identifier::phone("+15550001").unwrap();

    let err = warden.verify_otp(&phone, "").await.unwrap_err();
    assert!(matches!(err, WardenError::Validation(_)));
}

#[tokio::test]
async fn test_cleanup_tasks_stop_on_shutdown() {
    let clock = Arc::new(ManualClock::default());
    let warden = WardenBuilder::new()
        .with_memory_storage()
        .with_code_mode(CodeMode::test())
        .with_clock(clock.clone())
        .with_cleanup_interval(StdDuration::from_millis(10))
        .build()
        .await
        .unwrap();

    for _ in 0..5 {
        warden.record_login_failure("alice").await.unwrap();
    }
    clock.advance(Duration::seconds(601));

    let (tx, rx) = watch::channel(false);
    let handles = warden.start_cleanup_tasks(rx);
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(!warden.unlock_login("alice").await.unwrap());
}
