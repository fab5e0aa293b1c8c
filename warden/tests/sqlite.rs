#![cfg(feature = "sqlite")]

use std::sync::Arc;

use chrono::{DateTime, Duration};
use sqlx::sqlite::SqlitePoolOptions;
use warden::{
    CodeMode, DenialReason, Identifier, IssueOutcome, SqliteRepositoryProvider, VerifyOutcome,
    Warden, WardenBuilder,
};
use warden_core::{
    clock::{Clock, ManualClock},
    notification::OutboxGateway,
};

struct TestWarden {
    warden: Warden<SqliteRepositoryProvider>,
    clock: Arc<ManualClock>,
    outbox: Arc<OutboxGateway>,
}

async fn setup() -> TestWarden {
    setup_with_clock(Arc::new(ManualClock::default())).await
}

async fn setup_with_clock(clock: Arc<ManualClock>) -> TestWarden {
    let _ = tracing_subscriber::fmt().try_init();

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let outbox = Arc::new(OutboxGateway::new());

    let warden = WardenBuilder::new()
        .with_sqlite_pool(pool)
        .with_code_mode(CodeMode::test())
        .with_gateway(outbox.clone())
        .with_clock(clock.clone())
        .apply_migrations(true)
        .build()
        .await
        .unwrap();

    TestWarden {
        warden,
        clock,
        outbox,
    }
}

fn phone() -> Identifier {
    Identifier::phone("+15550001").unwrap()
}

#[tokio::test]
async fn test_request_verify_block_and_recover() {
    let t = setup().await;

    // Fixed code in test mode.
    let issued = t.warden.request_otp(&phone()).await.unwrap();
    assert_eq!(
        issued,
        IssueOutcome::Issued {
            code: "123456".to_string()
        }
    );
    assert_eq!(t.outbox.sent().len(), 1);

    // Immediate resend is rate limited.
    match t.warden.request_otp(&phone()).await.unwrap() {
        IssueOutcome::Denied(denial) => {
            assert_eq!(denial.reason, DenialReason::RateLimited);
            assert_eq!(denial.retry_after_seconds(), 60);
        }
        other => panic!("Expected rate limit, got {other:?}"),
    }

    // Four mismatches are plain failures, the fifth starts a block.
    for _ in 0..4 {
        assert_eq!(
            t.warden.verify_otp(&phone(), "000000").await.unwrap(),
            VerifyOutcome::Invalid
        );
    }
    match t.warden.verify_otp(&phone(), "000000").await.unwrap() {
        VerifyOutcome::Denied(denial) => {
            assert_eq!(denial.reason, DenialReason::NewlyBlocked);
            assert_eq!(denial.retry_after_seconds(), 600);
        }
        other => panic!("Expected new block, got {other:?}"),
    }
    let status = t.warden.otp_status(&phone()).await.unwrap().unwrap();
    assert!(status.is_blocked);
    assert_eq!(status.hit_count, 5);

    // The right code does not help while blocked.
    t.clock.advance(Duration::seconds(10));
    match t.warden.verify_otp(&phone(), "123456").await.unwrap() {
        VerifyOutcome::Denied(denial) => {
            assert_eq!(denial.reason, DenialReason::BlockActive);
            assert_eq!(denial.retry_after_seconds(), 590);
        }
        other => panic!("Expected active block, got {other:?}"),
    }

    // Once the block window has passed the code verifies and the record is gone.
    t.clock.advance(Duration::seconds(590));
    assert_eq!(
        t.warden.verify_otp(&phone(), "123456").await.unwrap(),
        VerifyOutcome::Verified
    );
    assert!(t.warden.otp_status(&phone()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_identifier_looks_like_mismatch() {
    let t = setup().await;
    assert_eq!(
        t.warden.verify_otp(&phone(), "123456").await.unwrap(),
        VerifyOutcome::Invalid
    );
}

#[tokio::test]
async fn test_phone_and_email_throttle_independently() {
    let t = setup().await;
    let email = Identifier::email("user@example.com").unwrap();

    t.warden.request_otp(&phone()).await.unwrap();
    assert!(matches!(
        t.warden.request_otp(&email).await.unwrap(),
        IssueOutcome::Issued { .. }
    ));
    assert_eq!(t.outbox.sent().len(), 2);
}

#[tokio::test]
async fn test_success_after_failures_starts_fresh() {
    let t = setup().await;
    t.warden.request_otp(&phone()).await.unwrap();
    for _ in 0..2 {
        t.warden.verify_otp(&phone(), "000000").await.unwrap();
    }

    assert_eq!(
        t.warden.verify_otp(&phone(), "123456").await.unwrap(),
        VerifyOutcome::Verified
    );

    // No record, so no resend window applies.
    assert!(matches!(
        t.warden.request_otp(&phone()).await.unwrap(),
        IssueOutcome::Issued { .. }
    ));
    let status = t.warden.otp_status(&phone()).await.unwrap().unwrap();
    assert_eq!(status.hit_count, 0);
    assert_eq!(status.issued_at, t.clock.now());
}

#[tokio::test]
async fn test_concurrent_mismatches_are_counted() {
    let t = setup().await;
    t.warden.request_otp(&phone()).await.unwrap();
    let warden = Arc::new(t.warden);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let warden = Arc::clone(&warden);
        handles.push(tokio::spawn(async move {
            warden.verify_otp(&phone(), "999999").await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), VerifyOutcome::Invalid);
    }

    let status = warden.otp_status(&phone()).await.unwrap().unwrap();
    assert_eq!(status.hit_count, 4);
    assert!(!status.is_blocked);
}

#[tokio::test]
async fn test_windows_hold_when_clock_is_mid_second() {
    let start = DateTime::from_timestamp(1_000_000, 900_000_000).unwrap();
    let t = setup_with_clock(Arc::new(ManualClock::new(start))).await;

    t.warden.request_otp(&phone()).await.unwrap();
    let status = t.warden.otp_status(&phone()).await.unwrap().unwrap();
    assert_eq!(status.issued_at, start);

    // 800ms of the resend window remain.
    t.clock.advance(Duration::milliseconds(59_200));
    match t.warden.request_otp(&phone()).await.unwrap() {
        IssueOutcome::Denied(denial) => {
            assert_eq!(denial.reason, DenialReason::RateLimited);
            assert_eq!(denial.retry_after, Duration::milliseconds(800));
            assert_eq!(denial.retry_after_seconds(), 1);
        }
        other => panic!("Expected rate limit, got {other:?}"),
    }

    for _ in 0..4 {
        t.warden.verify_otp(&phone(), "000000").await.unwrap();
    }
    let blocked = t.warden.verify_otp(&phone(), "000000").await.unwrap();
    assert!(matches!(
        blocked,
        VerifyOutcome::Denied(ref denial) if denial.reason == DenialReason::NewlyBlocked
    ));

    // Half a second short of the block window.
    t.clock.advance(Duration::milliseconds(599_500));
    match t.warden.verify_otp(&phone(), "123456").await.unwrap() {
        VerifyOutcome::Denied(denial) => {
            assert_eq!(denial.reason, DenialReason::BlockActive);
            assert_eq!(denial.retry_after, Duration::milliseconds(500));
        }
        other => panic!("Expected active block, got {other:?}"),
    }

    t.clock.advance(Duration::milliseconds(500));
    assert_eq!(
        t.warden.verify_otp(&phone(), "123456").await.unwrap(),
        VerifyOutcome::Verified
    );
}
