//! Account creation through the orchestrator.
//!
//! ## Test Naming
//!
//! Tests follow the convention: `test_<feature>_<scenario>_<expected_result>`

use account_service::errors::AccountError;
use account_service::models::{LifecycleEventKind, Provider};
use account_test_utils::*;
use common::jwt::TokenKind;

// ============================================================================
// Password accounts
// ============================================================================

/// A password account gets a row, an identity, a profile and a verification
/// mail, and no lifecycle event.
#[tokio::test]
async fn test_create_password_account_persists_every_part() -> Result<(), anyhow::Error> {
    // Arrange
    let harness = TestAccountHarness::new();

    // Act
    let account_id = harness
        .service
        .create_account(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
        .await?;

    // Assert
    let account = harness
        .accounts
        .snapshot(account_id)
        .expect("account row should exist");
    assert!(account.is_active(), "New account should be active");
    assert_eq!(harness.identities.count_for(account_id), 1);
    assert!(harness.profiles.exists(account_id));

    let identity = harness
        .identities
        .local(TEST_EMAIL_ALICE)
        .expect("local identity should exist");
    assert_eq!(identity.account_id, account_id);
    assert!(!identity.is_verified, "Email is unverified until the link is used");
    assert_ne!(identity.password_hash, TEST_PASSWORD, "Password must be hashed");

    assert!(
        harness.events.events().is_empty(),
        "Successful creation emits no lifecycle event"
    );

    Ok(())
}

#[tokio::test]
async fn test_create_password_account_sends_verification_token() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();

    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;

    let token = harness.verification_token_for(TEST_EMAIL_ALICE);
    token
        .assert_valid_jwt()
        .assert_kind(TokenKind::EmailVerification)
        .assert_for_subject(&account_id.to_string())
        .assert_claim("email", TEST_EMAIL_ALICE)
        .assert_expires_in(TEST_EMAIL_TTL.as_secs());
    assert_eq!(harness.mail.sent().len(), 1);

    // The email code behind the token is live in the cache
    assert_eq!(harness.cache.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_create_account_normalizes_email() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();

    let account_id = harness
        .service
        .create_account(
            &password_credential("  Alice@Example.COM "),
            harness.deadline(),
        )
        .await?;

    let identity = harness
        .identities
        .local(TEST_EMAIL_ALICE)
        .expect("identity should be stored under the normalized email");
    assert_eq!(identity.account_id, account_id);
    assert!(harness.mail.last_to(TEST_EMAIL_ALICE).is_some());

    Ok(())
}

#[tokio::test]
async fn test_create_account_short_password_is_invalid_input() {
    let harness = TestAccountHarness::new();

    let result = harness
        .service
        .create_account(
            &password_credential_with(TEST_EMAIL_ALICE, "short"),
            harness.deadline(),
        )
        .await;

    assert!(matches!(result, Err(AccountError::InvalidInput(_))));
    assert_eq!(
        harness.accounts.insert_calls(),
        0,
        "Validation failures must not reach storage"
    );
    assert_eq!(harness.profiles.create_calls(), 0);
    assert!(harness.events.events().is_empty());
}

#[tokio::test]
async fn test_create_account_malformed_email_is_invalid_input() {
    let harness = TestAccountHarness::new();

    let result = harness
        .service
        .create_account(&password_credential("not-an-email"), harness.deadline())
        .await;

    assert!(matches!(result, Err(AccountError::InvalidInput(_))));
    assert!(harness.accounts.is_empty());
}

/// A second account for a taken email fails with `Conflict` and rolls back
/// its own row and profile without touching the first account.
#[tokio::test]
async fn test_create_account_duplicate_email_conflicts_and_rolls_back() -> Result<(), anyhow::Error>
{
    // Arrange
    let harness = TestAccountHarness::new();
    let first = harness.create_local_account(TEST_EMAIL_ALICE).await;

    // Act
    let result = harness
        .service
        .create_account(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
        .await;

    // Assert
    let err = result.expect_err("duplicate email should be rejected");
    assert!(matches!(err, AccountError::Conflict(_)), "got {err:?}");
    assert!(err.message().starts_with("enroll_identity"));

    assert_eq!(harness.accounts.len(), 1, "Only the first account remains");
    assert!(harness.accounts.snapshot(first).is_some());
    assert_eq!(harness.profiles.len(), 1);
    assert!(harness.profiles.exists(first));
    assert_eq!(
        harness.identities.local(TEST_EMAIL_ALICE).map(|i| i.account_id),
        Some(first)
    );

    let events = harness.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, LifecycleEventKind::CreationFailed);
    assert_ne!(events[0].account_id, first);

    Ok(())
}

// ============================================================================
// Provider accounts
// ============================================================================

/// A verified provider email needs no verification mail.
#[tokio::test]
async fn test_create_provider_account_with_verified_email_sends_no_mail(
) -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();

    let account_id = harness
        .service
        .create_account(
            &provider_credential(Provider::Github, TEST_PROVIDER_TOKEN),
            harness.deadline(),
        )
        .await?;

    assert!(harness.accounts.snapshot(account_id).is_some());
    assert_eq!(harness.identities.count_for(account_id), 1);
    assert!(harness.profiles.exists(account_id));
    assert!(harness.mail.sent().is_empty());
    assert!(harness.cache.is_empty());
    assert_eq!(harness.provider.calls(), 1);

    Ok(())
}

#[tokio::test]
async fn test_create_provider_account_with_unverified_email_sends_mail(
) -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    harness.provider.accept(
        "unverified-token",
        provider_profile("subject-2", TEST_EMAIL_BOB, false),
    );

    let account_id = harness
        .service
        .create_account(
            &provider_credential(Provider::Github, "unverified-token"),
            harness.deadline(),
        )
        .await?;

    harness
        .verification_token_for(TEST_EMAIL_BOB)
        .assert_for_subject(&account_id.to_string());

    Ok(())
}

#[tokio::test]
async fn test_create_provider_account_rejected_token_is_unauthorized() {
    let harness = TestAccountHarness::new();

    let result = harness
        .service
        .create_account(
            &provider_credential(Provider::Github, "forged-token"),
            harness.deadline(),
        )
        .await;

    assert!(matches!(result, Err(AccountError::Unauthorized(_))));
    assert_eq!(harness.accounts.insert_calls(), 0);
    assert!(harness.events.events().is_empty());
}

#[tokio::test]
async fn test_create_account_unconfigured_provider_is_invalid_input() {
    let harness = TestAccountHarness::new();

    let result = harness
        .service
        .create_account(
            &provider_credential(Provider::Google, TEST_PROVIDER_TOKEN),
            harness.deadline(),
        )
        .await;

    assert!(matches!(result, Err(AccountError::InvalidInput(_))));
    assert_eq!(harness.provider.calls(), 0);
}

#[tokio::test]
async fn test_create_same_provider_subject_twice_conflicts() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let credential = provider_credential(Provider::Github, TEST_PROVIDER_TOKEN);

    let first = harness
        .service
        .create_account(&credential, harness.deadline())
        .await?;
    let second = harness
        .service
        .create_account(&credential, harness.deadline())
        .await;

    assert!(matches!(second, Err(AccountError::Conflict(_))));
    assert_eq!(harness.accounts.len(), 1);
    assert!(harness.profiles.exists(first));
    assert_eq!(harness.profiles.len(), 1);

    Ok(())
}
