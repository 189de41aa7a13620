//! Login-code issuance and exchange.

use account_service::errors::AccountError;
use account_service::models::{AccountId, LifecycleEventKind, Provider};
use account_test_utils::*;
use common::jwt::TokenKind;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

// ============================================================================
// Password logins
// ============================================================================

/// Happy path: password → login code → session.
#[tokio::test]
async fn test_password_login_returns_session_tokens() -> Result<(), anyhow::Error> {
    // Arrange
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;

    // Act
    let issued = harness
        .service
        .issue_login_code(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
        .await?;
    let session = harness
        .service
        .verify_login_code(&issued.subject.to_string(), &issued.code, harness.deadline())
        .await?;

    // Assert
    assert_eq!(issued.subject, account_id);
    assert!(!issued.code.expose_secret().is_empty());

    let subject = account_id.to_string();
    session
        .access_token
        .assert_valid_jwt()
        .assert_kind(TokenKind::Access)
        .assert_for_subject(&subject)
        .assert_expires_in(TEST_ACCESS_TTL.as_secs());
    session
        .refresh_token
        .assert_valid_jwt()
        .assert_kind(TokenKind::Refresh)
        .assert_for_subject(&subject)
        .assert_expires_in(TEST_REFRESH_TTL.as_secs());
    assert!(session.refresh_expires_at > session.access_expires_at);

    Ok(())
}

#[tokio::test]
async fn test_login_code_is_single_use() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    harness.create_local_account(TEST_EMAIL_ALICE).await;
    let issued = harness.login_code(TEST_EMAIL_ALICE).await;
    let subject = issued.subject.to_string();

    harness
        .service
        .verify_login_code(&subject, &issued.code, harness.deadline())
        .await?;
    let replay = harness
        .service
        .verify_login_code(&subject, &issued.code, harness.deadline())
        .await;

    assert!(matches!(replay, Err(AccountError::Unauthorized(_))));

    Ok(())
}

/// A wrong guess does not burn the real code.
#[tokio::test]
async fn test_wrong_code_does_not_consume_login_code() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    harness.create_local_account(TEST_EMAIL_ALICE).await;
    let issued = harness.login_code(TEST_EMAIL_ALICE).await;
    let subject = issued.subject.to_string();

    let wrong = harness
        .service
        .verify_login_code(&subject, &SecretString::from("guess"), harness.deadline())
        .await;
    assert!(matches!(wrong, Err(AccountError::Unauthorized(_))));

    harness
        .service
        .verify_login_code(&subject, &issued.code, harness.deadline())
        .await?;

    Ok(())
}

/// A code is bound to the account it was issued for.
#[tokio::test]
async fn test_login_code_for_other_account_is_rejected() {
    let harness = TestAccountHarness::new();
    harness.create_local_account(TEST_EMAIL_ALICE).await;
    let bob = harness.create_local_account(TEST_EMAIL_BOB).await;
    let alice_code = harness.login_code(TEST_EMAIL_ALICE).await;

    let result = harness
        .service
        .verify_login_code(&bob.to_string(), &alice_code.code, harness.deadline())
        .await;

    assert!(matches!(result, Err(AccountError::Unauthorized(_))));
}

#[tokio::test]
async fn test_reissued_code_replaces_previous_code() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    harness.create_local_account(TEST_EMAIL_ALICE).await;
    let first = harness.login_code(TEST_EMAIL_ALICE).await;
    let second = harness.login_code(TEST_EMAIL_ALICE).await;
    let subject = first.subject.to_string();

    let stale = harness
        .service
        .verify_login_code(&subject, &first.code, harness.deadline())
        .await;
    assert!(matches!(stale, Err(AccountError::Unauthorized(_))));

    harness
        .service
        .verify_login_code(&subject, &second.code, harness.deadline())
        .await?;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_expired_login_code_is_rejected() {
    let harness = TestAccountHarness::new();
    harness.create_local_account(TEST_EMAIL_ALICE).await;
    let issued = harness.login_code(TEST_EMAIL_ALICE).await;

    tokio::time::advance(test_settings().login_code_ttl + Duration::from_secs(1)).await;

    let result = harness
        .service
        .verify_login_code(&issued.subject.to_string(), &issued.code, harness.deadline())
        .await;
    assert!(matches!(result, Err(AccountError::Unauthorized(_))));
}

#[tokio::test]
async fn test_verify_login_code_rejects_malformed_input() {
    let harness = TestAccountHarness::new();

    let bad_subject = harness
        .service
        .verify_login_code("not-a-uuid", &SecretString::from("code"), harness.deadline())
        .await;
    assert!(matches!(bad_subject, Err(AccountError::InvalidInput(_))));

    let empty_code = harness
        .service
        .verify_login_code(
            &AccountId::from_uuid(TEST_ACCOUNT_ALICE).to_string(),
            &SecretString::from(""),
            harness.deadline(),
        )
        .await;
    assert!(matches!(empty_code, Err(AccountError::InvalidInput(_))));
}

/// Unknown email and wrong password fail identically.
#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let harness = TestAccountHarness::new();
    harness.create_local_account(TEST_EMAIL_ALICE).await;

    let wrong_password = harness
        .service
        .issue_login_code(
            &password_credential_with(TEST_EMAIL_ALICE, TEST_WRONG_PASSWORD),
            harness.deadline(),
        )
        .await
        .expect_err("wrong password should be rejected");
    let unknown_email = harness
        .service
        .issue_login_code(&password_credential(TEST_EMAIL_BOB), harness.deadline())
        .await
        .expect_err("unknown email should be rejected");

    assert!(matches!(wrong_password, AccountError::Unauthorized(_)));
    assert_eq!(wrong_password, unknown_email);
}

#[tokio::test]
async fn test_inactive_identity_cannot_log_in() {
    let harness = TestAccountHarness::new();
    harness.create_local_account(TEST_EMAIL_ALICE).await;
    harness.identities.set_local_active(TEST_EMAIL_ALICE, false);

    let result = harness
        .service
        .issue_login_code(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
        .await;

    assert!(matches!(result, Err(AccountError::Unauthorized(_))));
}

// ============================================================================
// Account state
// ============================================================================

#[tokio::test]
async fn test_archived_account_cannot_get_login_code() {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    harness.archive(account_id).await;

    let result = harness
        .service
        .issue_login_code(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
        .await;

    assert!(matches!(result, Err(AccountError::Unauthorized(_))));
}

/// Blocking between issue and exchange stops the exchange.
#[tokio::test]
async fn test_account_blocked_after_issue_cannot_exchange_code() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    let issued = harness.login_code(TEST_EMAIL_ALICE).await;

    harness.service.block(account_id, harness.deadline()).await?;
    let result = harness
        .service
        .verify_login_code(&account_id.to_string(), &issued.code, harness.deadline())
        .await;

    assert!(matches!(result, Err(AccountError::Unauthorized(_))));

    Ok(())
}

// ============================================================================
// Provider logins
// ============================================================================

/// First provider login provisions the account; the second finds it.
#[tokio::test]
async fn test_provider_login_provisions_account_once() -> Result<(), anyhow::Error> {
    // Arrange
    let harness = TestAccountHarness::new();
    let credential = provider_credential(Provider::Github, TEST_PROVIDER_TOKEN);

    // Act
    let first = harness
        .service
        .issue_login_code(&credential, harness.deadline())
        .await?;
    let second = harness
        .service
        .issue_login_code(&credential, harness.deadline())
        .await?;

    // Assert
    assert_eq!(first.subject, second.subject);
    assert_eq!(harness.accounts.len(), 1);
    assert!(harness.profiles.exists(first.subject));
    assert_eq!(harness.identities.count_for(first.subject), 1);
    assert!(harness.mail.sent().is_empty(), "Provider email is verified");

    harness
        .service
        .verify_login_code(
            &second.subject.to_string(),
            &second.code,
            harness.deadline(),
        )
        .await?;

    Ok(())
}

#[tokio::test]
async fn test_provider_login_failed_provisioning_leaves_nothing() {
    let harness = TestAccountHarness::new();
    harness.profiles.set_fail_create(true);

    let result = harness
        .service
        .issue_login_code(
            &provider_credential(Provider::Github, TEST_PROVIDER_TOKEN),
            harness.deadline(),
        )
        .await;

    assert!(matches!(result, Err(AccountError::InternalFailure(_))));
    assert!(harness.accounts.is_empty());
    assert!(harness.identities.is_empty());
    assert_eq!(harness.events.events().len(), 1);
    assert_eq!(
        harness.events.events()[0].kind,
        LifecycleEventKind::CreationFailed
    );
}

#[tokio::test]
async fn test_provider_unavailable_is_internal_failure() {
    let harness = TestAccountHarness::new();
    harness.provider.set_unavailable(true);

    let result = harness
        .service
        .issue_login_code(
            &provider_credential(Provider::Github, TEST_PROVIDER_TOKEN),
            harness.deadline(),
        )
        .await;

    assert!(matches!(result, Err(AccountError::InternalFailure(_))));
    assert!(harness.accounts.is_empty());
}
