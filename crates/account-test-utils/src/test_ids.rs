//! Fixed test IDs for deterministic tests
//!
//! All test IDs are deterministic to ensure reproducible test results.
//! Using fixed UUIDs prevents flaky tests caused by random data.

use uuid::Uuid;

// Account IDs (100-199)
pub const TEST_ACCOUNT_ALICE: Uuid = Uuid::from_u128(100);
pub const TEST_ACCOUNT_BOB: Uuid = Uuid::from_u128(101);
pub const TEST_ACCOUNT_CAROL: Uuid = Uuid::from_u128(102);

// Emails
pub const TEST_EMAIL_ALICE: &str = "alice@example.com";
pub const TEST_EMAIL_BOB: &str = "bob@example.com";
pub const TEST_EMAIL_CAROL: &str = "carol@example.com";

// Passwords (local identities)
pub const TEST_PASSWORD: &str = "correct-horse-battery";
pub const TEST_WRONG_PASSWORD: &str = "wrong-horse-battery";

// Provider tokens and subjects
pub const TEST_PROVIDER_TOKEN: &str = "provider-token-do-not-use-in-production";
pub const TEST_PROVIDER_SUBJECT: &str = "provider-subject-1";
pub const TEST_PROVIDER_EMAIL: &str = "octo@example.com";

// Signing key seeds, one per token kind
pub const TEST_ACCESS_KEY_SEED: u8 = 1;
pub const TEST_REFRESH_KEY_SEED: u8 = 2;
pub const TEST_EMAIL_KEY_SEED: u8 = 3;
