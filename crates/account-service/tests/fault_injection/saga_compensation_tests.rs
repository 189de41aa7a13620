//! Fault injection for account creation
//!
//! Each test breaks one collaborator during creation and checks that every
//! side effect already taken is reversed, that exactly one `creation_failed`
//! event is emitted, and that the first failure reaches the caller.

use account_service::errors::AccountError;
use account_service::models::{AccountId, LifecycleEventKind, Provider};
use account_test_utils::*;
use std::time::Duration;

/// Account id carried by the single `creation_failed` event.
fn failed_account(harness: &TestAccountHarness) -> AccountId {
    let events = harness.events.events();
    assert_eq!(events.len(), 1, "Expected exactly one event, got {events:?}");
    assert_eq!(events[0].kind, LifecycleEventKind::CreationFailed);
    events[0].account_id
}

fn assert_nothing_left(harness: &TestAccountHarness) {
    assert!(harness.accounts.is_empty(), "Account row should be removed");
    assert!(harness.identities.is_empty(), "Identity should be removed");
    assert!(harness.profiles.is_empty(), "Profile should be removed");
}

// ============================================================================
// Branch failures
// ============================================================================

#[tokio::test]
async fn test_profile_failure_reverses_row_and_identity() {
    // Arrange
    let harness = TestAccountHarness::new();
    harness.profiles.set_fail_create(true);

    // Act
    let err = harness
        .service
        .create_account(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
        .await
        .expect_err("creation should fail");

    // Assert
    assert!(matches!(err, AccountError::InternalFailure(_)), "got {err:?}");
    assert!(err.message().starts_with("create_profile"));
    assert_nothing_left(&harness);
    let account_id = failed_account(&harness);
    assert!(harness.leaves_no_trace(account_id));
    assert!(harness.mail.sent().is_empty(), "No mail for a failed account");
}

#[tokio::test]
async fn test_identity_failure_reverses_row_and_profile() {
    let harness = TestAccountHarness::new();
    harness.identities.set_fail_enroll(true);

    let err = harness
        .service
        .create_account(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
        .await
        .expect_err("creation should fail");

    assert!(err.message().starts_with("enroll_identity"));
    assert!(err.is_retryable());
    assert_nothing_left(&harness);
    assert_eq!(harness.profiles.delete_calls(), 1);
    failed_account(&harness);
}

#[tokio::test]
async fn test_row_failure_reverses_identity_and_profile() {
    let harness = TestAccountHarness::new();
    harness.accounts.set_fail_insert(true);

    let err = harness
        .service
        .create_account(
            &provider_credential(Provider::Github, TEST_PROVIDER_TOKEN),
            harness.deadline(),
        )
        .await
        .expect_err("creation should fail");

    assert!(err.message().starts_with("persist_account"));
    assert_nothing_left(&harness);
    failed_account(&harness);
}

/// Every branch runs to completion even after another branch failed.
#[tokio::test]
async fn test_all_branches_run_when_one_fails() {
    let harness = TestAccountHarness::new();
    harness.identities.set_fail_enroll(true);

    let _ = harness
        .service
        .create_account(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
        .await;

    assert_eq!(harness.accounts.insert_calls(), 1);
    assert_eq!(harness.profiles.create_calls(), 1);
}

// ============================================================================
// Timeouts
// ============================================================================

/// A branch that outlives the step timeout counts as failed, and its
/// reversal runs in case the call landed after all.
#[tokio::test(start_paused = true)]
async fn test_profile_timeout_fails_and_runs_reversal() {
    // Arrange
    let harness = TestAccountHarness::new();
    harness
        .profiles
        .set_create_delay(Some(test_settings().step_timeout * 5));

    // Act
    let err = harness
        .service
        .create_account(
            &provider_credential(Provider::Github, TEST_PROVIDER_TOKEN),
            harness.deadline(),
        )
        .await
        .expect_err("creation should time out");

    // Assert
    assert!(matches!(err, AccountError::InternalFailure(_)));
    assert!(err.message().contains("timed out"), "got {err:?}");
    assert_eq!(
        harness.profiles.delete_calls(),
        1,
        "Timed-out step must still be reversed"
    );
    assert_nothing_left(&harness);
    failed_account(&harness);
}

/// The caller deadline bounds the whole fan-out even when it is shorter than
/// the step timeout.
#[tokio::test(start_paused = true)]
async fn test_caller_deadline_caps_step_timeout() {
    let harness = TestAccountHarness::new();
    harness
        .identities
        .set_enroll_delay(Some(Duration::from_secs(1)));

    let started = tokio::time::Instant::now();
    let err = harness
        .service
        .create_account(
            &provider_credential(Provider::Github, TEST_PROVIDER_TOKEN),
            account_service::services::Deadline::after(Duration::from_millis(200)),
        )
        .await
        .expect_err("creation should time out");

    assert!(err.message().starts_with("enroll_identity"), "got {err:?}");
    assert!(started.elapsed() < test_settings().step_timeout);
    assert_nothing_left(&harness);
}

// ============================================================================
// Verification mail
// ============================================================================

#[tokio::test]
async fn test_mail_failure_reverses_everything() {
    // Arrange
    let harness = TestAccountHarness::new();
    harness.mail.set_fail(true);

    // Act
    let err = harness
        .service
        .create_account(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
        .await
        .expect_err("creation should fail");

    // Assert
    assert!(err.message().starts_with("send_verification"), "got {err:?}");
    assert_nothing_left(&harness);
    assert!(harness.cache.is_empty(), "Email code should be revoked");
    failed_account(&harness);
}

#[tokio::test]
async fn test_code_cache_failure_during_creation_reverses_everything() {
    let harness = TestAccountHarness::new();
    harness.cache.set_unavailable(true);

    let err = harness
        .service
        .create_account(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
        .await
        .expect_err("creation should fail");

    assert!(err.is_retryable());
    assert_nothing_left(&harness);
    assert!(harness.mail.sent().is_empty());
    failed_account(&harness);
}

// ============================================================================
// Compensation failures
// ============================================================================

/// A failing reversal is logged, the remaining reversals still run, and the
/// caller sees the original error.
#[tokio::test]
async fn test_failed_reversal_does_not_replace_original_error() {
    // Arrange
    let harness = TestAccountHarness::new();
    harness.profiles.set_fail_create(true);
    harness.identities.set_fail_remove(true);

    // Act
    let err = harness
        .service
        .create_account(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
        .await
        .expect_err("creation should fail");

    // Assert
    assert!(err.message().starts_with("create_profile"), "got {err:?}");
    assert!(harness.accounts.is_empty(), "Row reversal still runs");
    assert_eq!(
        harness.identities.len(),
        1,
        "Identity stays behind when its reversal fails"
    );
    failed_account(&harness);
}

/// Losing the `creation_failed` event does not change the outcome.
#[tokio::test]
async fn test_failed_creation_event_does_not_replace_original_error() {
    let harness = TestAccountHarness::new();
    harness.profiles.set_fail_create(true);
    harness
        .events
        .fail_kind(LifecycleEventKind::CreationFailed, true);

    let err = harness
        .service
        .create_account(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
        .await
        .expect_err("creation should fail");

    assert!(err.message().starts_with("create_profile"));
    assert_nothing_left(&harness);
    assert!(harness.events.events().is_empty());
}

/// A conflict is definitive: the conflicting branch registered nothing, so
/// the existing account keeps its identity.
#[tokio::test]
async fn test_conflict_never_removes_the_existing_identity() {
    let harness = TestAccountHarness::new();
    let existing = harness.create_local_account(TEST_EMAIL_ALICE).await;

    let err = harness
        .service
        .create_account(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
        .await
        .expect_err("duplicate should conflict");

    assert!(matches!(err, AccountError::Conflict(_)));
    assert!(harness.leaves_no_trace(failed_account(&harness)));
    assert_eq!(harness.identities.count_for(existing), 1);
}
