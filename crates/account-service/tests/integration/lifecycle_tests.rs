//! Lifecycle transitions, deletion and the retention purge.

use account_service::errors::AccountError;
use account_service::models::{Account, AccountId, LifecycleEventKind, SyncCode};
use account_test_utils::*;
use chrono::{Duration as ChronoDuration, Utc};

// ============================================================================
// Archive / restore
// ============================================================================

#[tokio::test]
async fn test_archive_sets_retention_and_emits_event() -> Result<(), anyhow::Error> {
    // Arrange
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    let before = harness.accounts.snapshot(account_id).expect("account exists");

    // Act
    let account = harness.service.archive(account_id, harness.deadline()).await?;

    // Assert
    assert!(account.is_archived);
    assert!(!account.is_active());
    let archived_at = account.archived_at.expect("archived_at should be set");
    assert_eq!(
        account.delete_after,
        Some(archived_at + ChronoDuration::days(30)),
        "Purge is due one retention period after archiving"
    );
    assert_ne!(account.sync_code, before.sync_code, "Sync code must rotate");

    let events = harness.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, LifecycleEventKind::Archived);
    assert_eq!(events[0].account_id, account_id);
    assert_eq!(
        events[0].sync_code, account.sync_code,
        "Event carries the sync code of the stored row"
    );

    Ok(())
}

/// Archiving twice keeps the original retention deadline and still emits.
#[tokio::test]
async fn test_archive_twice_keeps_first_archive_time() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;

    let first = harness.service.archive(account_id, harness.deadline()).await?;
    let second = harness.service.archive(account_id, harness.deadline()).await?;

    assert_eq!(first.archived_at, second.archived_at);
    assert_eq!(first.delete_after, second.delete_after);
    assert_ne!(first.sync_code, second.sync_code);
    assert_eq!(
        harness.events.count(LifecycleEventKind::Archived, account_id),
        2
    );

    Ok(())
}

#[tokio::test]
async fn test_restore_clears_archive_state() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    harness.archive(account_id).await;

    let account = harness.service.restore(account_id, harness.deadline()).await?;

    assert!(!account.is_archived);
    assert_eq!(account.archived_at, None);
    assert_eq!(account.delete_after, None);
    assert!(account.is_active());
    assert_eq!(
        harness.events.count(LifecycleEventKind::Restored, account_id),
        1
    );

    Ok(())
}

// ============================================================================
// Block / unblock
// ============================================================================

#[tokio::test]
async fn test_block_and_unblock_toggle_activity() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;

    let blocked = harness.service.block(account_id, harness.deadline()).await?;
    assert!(blocked.is_blocked);
    assert!(!blocked.is_active());

    let unblocked = harness.service.unblock(account_id, harness.deadline()).await?;
    assert!(!unblocked.is_blocked);
    assert!(unblocked.is_active());

    let kinds: Vec<_> = harness.events.events().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![LifecycleEventKind::Blocked, LifecycleEventKind::Unblocked]
    );

    Ok(())
}

/// Block and archive are independent flags.
#[tokio::test]
async fn test_block_survives_restore() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;

    harness.service.block(account_id, harness.deadline()).await?;
    harness.archive(account_id).await;
    let account = harness.service.restore(account_id, harness.deadline()).await?;

    assert!(account.is_blocked);
    assert!(!account.is_archived);
    assert!(!account.is_active());

    Ok(())
}

#[tokio::test]
async fn test_transition_on_missing_account_is_not_found() {
    let harness = TestAccountHarness::new();
    let account_id = AccountId::from_uuid(TEST_ACCOUNT_BOB);

    let result = harness.service.block(account_id, harness.deadline()).await;

    assert!(matches!(result, Err(AccountError::NotFound(_))));
    assert!(
        harness.events.events().is_empty(),
        "No event without a mutation"
    );
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_active_account_conflicts() {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;

    let result = harness.service.delete(account_id, harness.deadline()).await;

    assert!(matches!(result, Err(AccountError::Conflict(_))));
    assert!(harness.accounts.snapshot(account_id).is_some());
    assert_eq!(harness.identities.count_for(account_id), 1);
    assert_eq!(
        harness.events.count(LifecycleEventKind::Deleted, account_id),
        0
    );
}

#[tokio::test]
async fn test_delete_archived_account_removes_rows_and_emits() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    harness.archive(account_id).await;

    harness.service.delete(account_id, harness.deadline()).await?;

    assert!(harness.accounts.snapshot(account_id).is_none());
    assert_eq!(harness.identities.count_for(account_id), 0);
    assert_eq!(
        harness.events.count(LifecycleEventKind::Deleted, account_id),
        1
    );

    Ok(())
}

/// Deleting an account that is already gone still reports the deletion.
#[tokio::test]
async fn test_delete_missing_account_still_emits() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let account_id = AccountId::from_uuid(TEST_ACCOUNT_CAROL);

    harness.service.delete(account_id, harness.deadline()).await?;

    assert_eq!(
        harness.events.count(LifecycleEventKind::Deleted, account_id),
        1
    );

    Ok(())
}

#[tokio::test]
async fn test_deleted_account_email_can_register_again() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let first = harness.create_local_account(TEST_EMAIL_ALICE).await;
    harness.archive(first).await;
    harness.service.delete(first, harness.deadline()).await?;

    let second = harness.create_local_account(TEST_EMAIL_ALICE).await;

    assert_ne!(first, second);
    assert_eq!(
        harness.identities.local(TEST_EMAIL_ALICE).map(|i| i.account_id),
        Some(second)
    );

    Ok(())
}

// ============================================================================
// Purge
// ============================================================================

fn archived_account(id: AccountId, archived_days_ago: i64) -> Account {
    let archived_at = Utc::now() - ChronoDuration::days(archived_days_ago);
    let mut account = Account::new(id, SyncCode::new("seeded"), archived_at);
    account.is_archived = true;
    account.archived_at = Some(archived_at);
    account.delete_after = Some(archived_at + ChronoDuration::days(30));
    account
}

#[tokio::test]
async fn test_purge_deletes_only_accounts_past_retention() -> Result<(), anyhow::Error> {
    // Arrange
    let harness = TestAccountHarness::new();
    let expired = AccountId::from_uuid(TEST_ACCOUNT_ALICE);
    let retained = AccountId::from_uuid(TEST_ACCOUNT_BOB);
    harness.accounts.put(archived_account(expired, 31));
    harness.accounts.put(archived_account(retained, 5));
    let active = harness.create_local_account(TEST_EMAIL_CAROL).await;

    // Act
    let purged = harness
        .service
        .purge_expired(Utc::now(), harness.deadline())
        .await?;

    // Assert
    assert_eq!(purged, 1);
    assert!(harness.accounts.snapshot(expired).is_none());
    assert!(harness.accounts.snapshot(retained).is_some());
    assert!(harness.accounts.snapshot(active).is_some());
    assert_eq!(
        harness.events.count(LifecycleEventKind::Deleted, expired),
        1
    );

    Ok(())
}

#[tokio::test]
async fn test_purge_respects_batch_size() -> Result<(), anyhow::Error> {
    let mut settings = test_settings();
    settings.purge_batch_size = 2;
    let harness = TestAccountHarness::with_settings(settings);
    for n in 0..3u128 {
        harness
            .accounts
            .put(archived_account(AccountId::from_uuid(uuid::Uuid::from_u128(200 + n)), 40));
    }

    let first = harness
        .service
        .purge_expired(Utc::now(), harness.deadline())
        .await?;
    let second = harness
        .service
        .purge_expired(Utc::now(), harness.deadline())
        .await?;

    assert_eq!(first, 2);
    assert_eq!(second, 1);
    assert!(harness.accounts.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_purge_with_nothing_due_is_noop() -> Result<(), anyhow::Error> {
    let harness = TestAccountHarness::new();
    let account_id = harness.create_local_account(TEST_EMAIL_ALICE).await;
    harness.archive(account_id).await;

    let purged = harness
        .service
        .purge_expired(Utc::now(), harness.deadline())
        .await?;

    assert_eq!(purged, 0);
    assert!(harness.accounts.snapshot(account_id).is_some());

    Ok(())
}
