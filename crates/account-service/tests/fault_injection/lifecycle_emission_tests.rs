//! Fault injection for lifecycle transitions, deletion, purge and login codes
//!
//! A lifecycle mutation that cannot announce itself fails the call but stays
//! applied; repeating the call converges and emits.

use account_service::errors::AccountError;
use account_service::models::LifecycleEventKind;
use account_test_utils::*;
use chrono::Utc;
use secrecy::SecretString;

// ============================================================================
// Event emission
// ============================================================================

#[tokio::test]
async fn test_archive_emission_failure_keeps_mutation() -> Result<(), anyhow::Error> {
    // Arrange
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    harness.events.fail_kind(LifecycleEventKind::Archived, true);

    // Act
    let err = harness
        .service
        .archive(account_id, harness.deadline())
        .await
        .expect_err("emission failure should fail the call");

    // Assert
    assert!(err.is_retryable());
    assert!(err.message().starts_with("emit_event"), "got {err:?}");
    let stored = harness.accounts.snapshot(account_id).expect("row exists");
    assert!(stored.is_archived, "Mutation is not rolled back");
    assert_eq!(
        harness.events.count(LifecycleEventKind::Archived, account_id),
        0
    );

    // Retry converges
    harness.events.fail_kind(LifecycleEventKind::Archived, false);
    let retried = harness.service.archive(account_id, harness.deadline()).await?;
    assert_eq!(retried.archived_at, stored.archived_at);
    assert_eq!(
        harness.events.count(LifecycleEventKind::Archived, account_id),
        1
    );

    Ok(())
}

#[tokio::test]
async fn test_delete_emission_failure_then_retry_emits_once() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    harness.archive(account_id).await;
    harness.events.fail_kind(LifecycleEventKind::Deleted, true);

    let first = harness.service.delete(account_id, harness.deadline()).await;
    assert!(matches!(first, Err(AccountError::InternalFailure(_))));
    assert!(harness.accounts.snapshot(account_id).is_none());
    assert_eq!(harness.identities.count_for(account_id), 0);

    harness.events.fail_kind(LifecycleEventKind::Deleted, false);
    harness.service.delete(account_id, harness.deadline()).await?;
    assert_eq!(
        harness.events.count(LifecycleEventKind::Deleted, account_id),
        1
    );

    Ok(())
}

#[tokio::test]
async fn test_storage_failure_emits_nothing() {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    harness.accounts.set_fail_apply(true);

    let result = harness.service.block(account_id, harness.deadline()).await;

    assert!(matches!(result, Err(AccountError::InternalFailure(_))));
    assert!(harness.events.events().is_empty());
    let stored = harness.accounts.snapshot(account_id).expect("row exists");
    assert!(!stored.is_blocked);
}

#[tokio::test]
async fn test_identity_removal_failure_keeps_account_row() {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    harness.archive(account_id).await;
    harness.identities.set_fail_remove(true);

    let result = harness.service.delete(account_id, harness.deadline()).await;

    assert!(matches!(result, Err(AccountError::InternalFailure(_))));
    assert!(
        harness.accounts.snapshot(account_id).is_some(),
        "Row outlives its identities, never the other way round"
    );
    assert_eq!(
        harness.events.count(LifecycleEventKind::Deleted, account_id),
        0
    );
}

// ============================================================================
// Purge
// ============================================================================

/// One failing account does not stop the sweep; it is retried next time.
#[tokio::test]
async fn test_purge_skips_failing_account() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    harness.archive(account_id).await;
    harness.accounts.set_fail_delete(true);
    let past_retention = Utc::now() + chrono::Duration::days(31);

    let purged = harness
        .service
        .purge_expired(past_retention, harness.deadline())
        .await?;
    assert_eq!(purged, 0);
    assert!(harness.accounts.snapshot(account_id).is_some());

    harness.accounts.set_fail_delete(false);
    let purged = harness
        .service
        .purge_expired(past_retention, harness.deadline())
        .await?;
    assert_eq!(purged, 1);
    assert!(harness.accounts.snapshot(account_id).is_none());

    Ok(())
}

// ============================================================================
// Login codes
// ============================================================================

#[tokio::test]
async fn test_code_cache_outage_fails_login_as_internal() {
    let harness = TestAccountHarness::new();
    harness.create_local_account(TEST_EMAIL_ALICE).await;
    harness.cache.set_unavailable(true);

    let result = harness
        .service
        .issue_login_code(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
        .await;

    assert!(matches!(result, Err(AccountError::InternalFailure(_))));
}

/// An outage during exchange is retryable and does not consume the code.
#[tokio::test]
async fn test_code_cache_outage_during_exchange_keeps_code() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    harness.create_local_account(TEST_EMAIL_ALICE).await;
    let issued = harness.login_code(TEST_EMAIL_ALICE).await;
    let subject = issued.subject.to_string();

    harness.cache.set_unavailable(true);
    let during_outage = harness
        .service
        .verify_login_code(&subject, &issued.code, harness.deadline())
        .await;
    assert!(matches!(
        during_outage,
        Err(AccountError::InternalFailure(_))
    ));

    harness.cache.set_unavailable(false);
    harness
        .service
        .verify_login_code(&subject, &issued.code, harness.deadline())
        .await?;

    Ok(())
}

/// A stalled cache is bounded by the caller deadline.
#[tokio::test(start_paused = true)]
async fn test_stalled_code_cache_times_out() {
    let harness = TestAccountHarness::new();
    harness
        .cache
        .set_delay(Some(TEST_DEADLINE * 2));

    let result = harness
        .service
        .verify_login_code(
            &TEST_ACCOUNT_ALICE.to_string(),
            &SecretString::from("code"),
            harness.deadline(),
        )
        .await;

    let err = result.expect_err("stalled cache should time out");
    assert!(err.is_retryable());
    assert!(err.message().contains("timed out"), "got {err:?}");
}
