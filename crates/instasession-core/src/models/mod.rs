//! Data models for Instagram entities.
//!
//! Only the account's own profile summary is needed: it doubles as the
//! session validation request and the confirmation shown after login.

pub mod profile;

pub use profile::{Profile, WebProfileInfoResponse};
