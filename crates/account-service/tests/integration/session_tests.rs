//! Session refresh and email verification.

use account_service::errors::AccountError;
use account_service::models::Provider;
use account_test_utils::*;
use common::jwt::{RefreshClaims, TokenKind};

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test]
async fn test_refresh_session_mints_new_tokens() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    let session = harness.login(TEST_EMAIL_ALICE).await;

    let refreshed = harness
        .service
        .refresh_session(&session.refresh_token, harness.deadline())
        .await?;

    refreshed
        .access_token
        .assert_valid_jwt()
        .assert_kind(TokenKind::Access)
        .assert_for_subject(&account_id.to_string());
    refreshed
        .refresh_token
        .assert_kind(TokenKind::Refresh)
        .assert_for_subject(&account_id.to_string());

    Ok(())
}

/// An access token is signed with another key and never refreshes.
#[tokio::test]
async fn test_refresh_with_access_token_is_unauthorized() {
    let harness = TestAccountHarness::new();
    harness.create_local_account(TEST_EMAIL_ALICE).await;
    let session = harness.login(TEST_EMAIL_ALICE).await;

    let result = harness
        .service
        .refresh_session(&session.access_token, harness.deadline())
        .await;

    assert!(matches!(result, Err(AccountError::Unauthorized(_))));
}

#[tokio::test]
async fn test_refresh_with_garbage_is_unauthorized() {
    let harness = TestAccountHarness::new();

    let result = harness
        .service
        .refresh_session("not.a.token", harness.deadline())
        .await;

    assert!(matches!(result, Err(AccountError::Unauthorized(_))));
}

#[tokio::test]
async fn test_refresh_for_blocked_account_is_unauthorized() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    let session = harness.login(TEST_EMAIL_ALICE).await;

    harness.service.block(account_id, harness.deadline()).await?;
    let result = harness
        .service
        .refresh_session(&session.refresh_token, harness.deadline())
        .await;

    assert!(matches!(result, Err(AccountError::Unauthorized(_))));

    Ok(())
}

/// A validly signed refresh token whose subject is not an account id.
#[tokio::test]
async fn test_refresh_with_foreign_subject_is_unauthorized() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let token = harness
        .service
        .tokens()
        .generate::<RefreshClaims>("service-account", ())?;

    let result = harness
        .service
        .refresh_session(&token.token, harness.deadline())
        .await;

    assert!(matches!(result, Err(AccountError::Unauthorized(_))));

    Ok(())
}

#[tokio::test]
async fn test_refresh_for_deleted_account_is_unauthorized() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    let session = harness.login(TEST_EMAIL_ALICE).await;
    harness.archive(account_id).await;
    harness.service.delete(account_id, harness.deadline()).await?;

    let result = harness
        .service
        .refresh_session(&session.refresh_token, harness.deadline())
        .await;

    assert!(matches!(result, Err(AccountError::Unauthorized(_))));

    Ok(())
}

// ============================================================================
// Email verification
// ============================================================================

#[tokio::test]
async fn test_verify_email_marks_identity_verified() -> Result<(), anyhow::Error> {
    // Arrange
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    let token = harness.verification_token_for(TEST_EMAIL_ALICE);

    // Act
    let verified = harness
        .service
        .verify_email(&token, harness.deadline())
        .await?;

    // Assert
    assert_eq!(verified, account_id);
    let identity = harness
        .identities
        .local(TEST_EMAIL_ALICE)
        .expect("identity exists");
    assert!(identity.is_verified);
    assert!(harness.cache.is_empty(), "Email code is consumed");

    Ok(())
}

#[tokio::test]
async fn test_verification_link_works_once() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    harness.create_local_account(TEST_EMAIL_ALICE).await;
    let token = harness.verification_token_for(TEST_EMAIL_ALICE);

    harness.service.verify_email(&token, harness.deadline()).await?;
    let replay = harness.service.verify_email(&token, harness.deadline()).await;

    assert!(matches!(replay, Err(AccountError::Unauthorized(_))));

    Ok(())
}

#[tokio::test]
async fn test_verify_email_rejects_session_token() {
    let harness = TestAccountHarness::new();
    harness.create_local_account(TEST_EMAIL_ALICE).await;
    let session = harness.login(TEST_EMAIL_ALICE).await;

    let result = harness
        .service
        .verify_email(&session.access_token, harness.deadline())
        .await;

    assert!(matches!(result, Err(AccountError::Unauthorized(_))));
}

/// A verification token and a login code for the same account live in
/// separate namespaces and do not consume each other.
#[tokio::test]
async fn test_email_code_and_login_code_are_independent() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    harness.create_local_account(TEST_EMAIL_ALICE).await;
    let token = harness.verification_token_for(TEST_EMAIL_ALICE);

    let issued = harness.login_code(TEST_EMAIL_ALICE).await;
    harness
        .service
        .verify_login_code(&issued.subject.to_string(), &issued.code, harness.deadline())
        .await?;

    harness.service.verify_email(&token, harness.deadline()).await?;

    Ok(())
}

#[tokio::test]
async fn test_verify_email_for_provider_identity() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    harness.provider.accept(
        "unverified-token",
        provider_profile("subject-3", TEST_EMAIL_BOB, false),
    );
    let account_id = harness
        .service
        .create_account(
            &provider_credential(Provider::Github, "unverified-token"),
            harness.deadline(),
        )
        .await?;

    let verified = harness
        .service
        .verify_email(
            &harness.verification_token_for(TEST_EMAIL_BOB),
            harness.deadline(),
        )
        .await?;

    assert_eq!(verified, account_id);

    Ok(())
}
