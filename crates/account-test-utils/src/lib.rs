//! # Account Test Utilities
//!
//! Shared test utilities for the account lifecycle service.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed keys for reproducible tests)
//! - Fixed test IDs and credentials
//! - A harness wiring the orchestrator to in-memory collaborators
//!   (TestAccountHarness)
//! - Custom assertions (TokenAssertions trait)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use account_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestAccountHarness::new();
//!
//!     let account_id = harness
//!         .service
//!         .create_account(&password_credential(TEST_EMAIL_ALICE), harness.deadline())
//!         .await
//!         .unwrap();
//!
//!     // Fault injection on any collaborator
//!     harness.profiles.set_fail_create(true);
//! }
//! ```

pub mod assertions;
pub mod crypto_fixtures;
pub mod harness;
pub mod test_ids;

// Re-export commonly used items
pub use assertions::*;
pub use crypto_fixtures::*;
pub use harness::*;
pub use test_ids::*;
