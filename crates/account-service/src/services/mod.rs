//! Orchestration and business logic.

pub mod account_service;
pub mod compensation;
pub mod deadline;
pub mod identity_service;
pub mod login_code_service;
pub mod mail_client;
pub mod profile_client;
pub mod task_group;
pub mod token_service;

pub use account_service::{AccountService, AccountSettings, Collaborators};
pub use deadline::Deadline;
