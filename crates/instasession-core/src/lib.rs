//! instasession core library.
//!
//! Logs one Instagram account in through the web endpoints, keeps the
//! resulting cookie session on disk, and reuses it on later runs as long as
//! the server still accepts it.
//!
//! - `api`: web client and the `AuthClient` seam
//! - `auth`: session file store
//! - `bootstrap`: the load-or-login flow
//! - `config`: account and session directory settings
//! - `models`: profile summary

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, AuthClient, AuthError};
pub use auth::{SessionData, SessionStore};
pub use bootstrap::{BootstrapError, Bootstrapper, Outcome, Terminal};
pub use config::Config;
