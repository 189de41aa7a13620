pub mod accounts;
pub mod identities;

pub use accounts::{AccountRepository, PgAccountRepository};
pub use identities::{IdentityStore, PgIdentityStore};
