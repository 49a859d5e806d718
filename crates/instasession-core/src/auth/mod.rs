//! Session persistence.
//!
//! This module provides:
//! - `SessionData`: the cookie session of one account
//! - `SessionStore`: reads and atomically writes `session-<username>`
//!
//! Sessions have no local expiry; the server decides whether one is still
//! accepted.

pub mod session;

pub use session::{SessionData, SessionError, SessionStore};
