use std::sync::Arc;

use chrono::Duration;
use warden::{DenialReason, LoginFailure, LoginGate, WardenBuilder};
use warden_core::{
    clock::ManualClock,
    settings::{StaticSettings, keys},
};

#[tokio::test]
async fn test_login_throttle_lifecycle() {
    let clock = Arc::new(ManualClock::default());
    let settings = Arc::new(
        StaticSettings::new()
            .with(keys::MAXIMUM_LOGIN_HIT, 3)
            .with(keys::TEMPORARY_LOGIN_BLOCK_TIME, 300),
    );
    let warden = WardenBuilder::new()
        .with_memory_storage()
        .with_settings(settings)
        .with_clock(clock.clone())
        .build()
        .await
        .unwrap();

    assert_eq!(warden.check_login("alice").await.unwrap(), LoginGate::Allowed);
    assert_eq!(
        warden.record_login_failure("alice").await.unwrap(),
        LoginFailure::Invalid { remaining: 2 }
    );
    assert_eq!(
        warden.record_login_failure("alice").await.unwrap(),
        LoginFailure::Invalid { remaining: 1 }
    );
    match warden.record_login_failure("alice").await.unwrap() {
        LoginFailure::Denied(denial) => {
            assert_eq!(denial.reason, DenialReason::NewlyBlocked);
            assert_eq!(denial.retry_after_seconds(), 300);
        }
        other => panic!("Expected block, got {other:?}"),
    }

    clock.advance(Duration::seconds(100));
    match warden.check_login("alice").await.unwrap() {
        LoginGate::Denied(denial) => {
            assert_eq!(denial.reason, DenialReason::BlockActive);
            assert_eq!(denial.retry_after_seconds(), 200);
        }
        other => panic!("Expected active block, got {other:?}"),
    }

    // Other accounts are unaffected.
    assert_eq!(warden.check_login("bob").await.unwrap(), LoginGate::Allowed);

    clock.advance(Duration::seconds(200));
    assert_eq!(warden.check_login("alice").await.unwrap(), LoginGate::Allowed);
    assert_eq!(
        warden.record_login_failure("alice").await.unwrap(),
        LoginFailure::Invalid { remaining: 2 }
    );

    warden.record_login_success("alice").await.unwrap();
    assert_eq!(
        warden.record_login_failure("alice").await.unwrap(),
        LoginFailure::Invalid { remaining: 2 }
    );
}

#[tokio::test]
async fn test_unlock_login() {
    let warden = WardenBuilder::new()
        .with_memory_storage()
        .build()
        .await
        .unwrap();

    for _ in 0..5 {
        warden.record_login_failure("alice").await.unwrap();
    }
    assert!(matches!(
        warden.check_login("alice").await.unwrap(),
        LoginGate::Denied(_)
    ));

    assert!(warden.unlock_login("alice").await.unwrap());
    assert_eq!(warden.check_login("alice").await.unwrap(), LoginGate::Allowed);
    assert!(!warden.unlock_login("alice").await.unwrap());
}
