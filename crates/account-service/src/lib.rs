//! Account lifecycle service library
//!
//! Orchestrates account creation and lifecycle transitions across
//! independently failing collaborators, exchanges verified identities for
//! single-use login codes, and issues the signed tokens that establish a
//! session.
//!
//! # Modules
//!
//! - `config` - Service configuration
//! - `crypto` - Password hashing, random codes, key helpers
//! - `errors` - Error types
//! - `models` - Domain types
//! - `observability` - Metrics and log-safe correlation
//! - `redis` - Code cache and lifecycle event stream adapters
//! - `repositories` - Database access layer
//! - `services` - Orchestration and business logic

pub mod config;
pub mod crypto;
pub mod errors;
pub mod models;
pub mod observability;
pub mod redis;
pub mod repositories;
pub mod services;
