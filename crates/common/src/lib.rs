//! Common utilities and types shared by the account platform services.
//!
//! Anything a process needs in order to *verify* account tokens lives here,
//! so that verifying services never link the issuer or its private keys.

#![warn(clippy::pedantic)]

/// Module for signed token kinds, typed claim sets, and verification
pub mod jwt;

/// Module for secret types that prevent accidental logging
pub mod secret;
