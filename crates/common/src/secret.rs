//! Secret wrappers for passwords, provider tokens, login codes and key material.
//!
//! Re-exported from [`secrecy`]. `Debug` on these types prints a redaction
//! marker, so structs deriving `Debug` stay safe to log, and the wrapped bytes
//! are zeroized on drop. Reading the value requires an explicit
//! `expose_secret()` call, which keeps every disclosure greppable.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct PasswordLogin {
//!     email: String,
//!     password: SecretString,
//! }
//!
//! let login = PasswordLogin {
//!     email: "alice@example.com".to_string(),
//!     password: SecretString::from("correct horse"),
//! };
//!
//! assert!(!format!("{login:?}").contains("correct horse"));
//! assert_eq!(login.password.expose_secret(), "correct horse");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
