//! Instagram web API client.
//!
//! This module provides the `ApiClient` used to log in, answer two-factor
//! challenges and look up profiles, plus the `AuthClient` trait the
//! bootstrap flow is written against.
//!
//! The session is a set of cookies (`sessionid`, `csrftoken`, `ds_user_id`,
//! ...) kept in a jar that can be exported and restored.

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthClient, TwoFactorChallenge};
pub use error::{ApiError, AuthError};
