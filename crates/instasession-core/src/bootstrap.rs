//! Session bootstrap flow.
//!
//! Produces a validated, usable session for one account:
//!
//! ```text
//! Start ── stored session accepted ──────────────────────────> Restored
//!   │
//!   └─ no file / load or validation failed ─> FreshLogin
//!        FreshLogin ── ok ──────────────> persist ──────────> LoggedIn
//!        FreshLogin ── wrong password ───────────────────────> BadCredentials
//!        FreshLogin ── two-factor ─> code ── ok ─> persist ──> TwoFactorLoggedIn
//!                                         └── failed ────────> TwoFactorFailed
//!        FreshLogin ── anything else ────────────────────────> Auth error
//! ```
//!
//! Nothing is retried. The session file is written only on the two login
//! success paths.

use std::io;
use std::path::PathBuf;

use secrecy::SecretString;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{AuthClient, AuthError, TwoFactorChallenge};
use crate::auth::{SessionError, SessionStore};
use crate::models::Profile;

/// Interactive side of the flow: status lines and prompts.
pub trait Terminal {
    fn say(&mut self, line: &str);

    /// Read a secret without echoing it.
    fn read_password(&mut self, prompt: &str) -> io::Result<SecretString>;

    /// Read one visible line (the two-factor code).
    fn read_line(&mut self, prompt: &str) -> io::Result<String>;
}

/// How a successful run ended.
#[derive(Debug)]
pub enum Outcome {
    /// The stored session was accepted; nothing was written.
    Restored(Profile),
    /// Password login succeeded and the session was saved.
    LoggedIn {
        session_path: PathBuf,
        profile: Option<Profile>,
    },
    /// Two-factor login succeeded and the session was saved.
    TwoFactorLoggedIn { session_path: PathBuf },
}

/// Terminal failures. Each is reported as one line by the caller.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Wrong password!")]
    BadCredentials,

    #[error("2FA error: {0}")]
    TwoFactorFailed(#[source] AuthError),

    #[error("Error: {0}")]
    Auth(#[source] AuthError),

    #[error("Failed to save session: {0}")]
    Persist(#[from] SessionError),

    #[error("Failed to read input: {0}")]
    Prompt(#[from] io::Error),
}

/// Why a stored session could not be reused.
#[derive(Error, Debug)]
enum RestoreFailure {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("session has no login cookie")]
    NotLoggedIn,
}

pub struct Bootstrapper<'a, C, T> {
    client: &'a mut C,
    terminal: &'a mut T,
    store: SessionStore,
}

impl<'a, C: AuthClient, T: Terminal> Bootstrapper<'a, C, T> {
    pub fn new(client: &'a mut C, terminal: &'a mut T, store: SessionStore) -> Self {
        Self {
            client,
            terminal,
            store,
        }
    }

    /// Run the whole flow once.
    pub async fn run(&mut self) -> Result<Outcome, BootstrapError> {
        let username = self.store.username().to_string();
        self.terminal
            .say(&format!("\n=== Instagram login @{} ===\n", username));

        if let Some(profile) = self.try_restore().await {
            self.terminal.say(&format!(
                "✓ Session valid! Logged in as @{}",
                profile.username
            ));
            if let Some(name) = &profile.full_name {
                self.terminal.say(&format!("  Name: {}", name));
            }
            self.terminal.say(&format!("  Posts: {}", profile.post_count));
            self.terminal
                .say(&format!("  Followers: {}", profile.follower_count));
            self.terminal
                .say(&format!("  Following: {}", profile.following_count));
            if profile.is_private {
                self.terminal.say("  Private account");
            }
            return Ok(Outcome::Restored(profile));
        }

        self.fresh_login(&username).await
    }

    /// Locate-and-load. Every failure is a warning followed by a fresh login.
    async fn try_restore(&mut self) -> Option<Profile> {
        if !self.store.exists() {
            debug!(path = %self.store.path().display(), "No stored session");
            return None;
        }

        self.terminal.say(&format!(
            "Existing session found: {}",
            self.store.path().display()
        ));

        match self.validate_stored().await {
            Ok(profile) => {
                info!(username = %profile.username, "Stored session accepted");
                Some(profile)
            }
            Err(e) => {
                warn!(error = %e, "Stored session rejected");
                self.terminal
                    .say(&format!("Session expired or invalid: {}", e));
                self.terminal.say("Logging in again...\n");
                None
            }
        }
    }

    async fn validate_stored(&mut self) -> Result<Profile, RestoreFailure> {
        let data = self.store.load()?;
        if !data.has_session_cookie() {
            return Err(RestoreFailure::NotLoggedIn);
        }

        self.client.load_session(&data)?;
        let profile = self.client.fetch_profile(self.store.username()).await?;

        // The server clears sessionid when it no longer honours it.
        if !self.client.is_logged_in() {
            return Err(RestoreFailure::NotLoggedIn);
        }
        Ok(profile)
    }

    async fn fresh_login(&mut self, username: &str) -> Result<Outcome, BootstrapError> {
        let password = self
            .terminal
            .read_password(&format!("Password for @{}: ", username))?;

        match self.client.login(username, &password).await {
            Ok(()) => {
                self.terminal.say("\n✓ Login successful!");
                let session_path = self.persist(username)?;
                self.terminal
                    .say(&format!("✓ Session saved to: {}", session_path.display()));

                let profile = match self.client.fetch_profile(username).await {
                    Ok(profile) => {
                        self.terminal
                            .say(&format!("\nProfile: @{}", profile.username));
                        self.terminal
                            .say(&format!("Total posts: {}", profile.post_count));
                        Some(profile)
                    }
                    Err(e) => {
                        warn!(error = %e, "Profile check after login failed");
                        self.terminal
                            .say(&format!("⚠ Could not fetch profile: {}", e));
                        None
                    }
                };

                self.terminal
                    .say("\n=== Done! The session is ready to use ===");
                Ok(Outcome::LoggedIn {
                    session_path,
                    profile,
                })
            }
            Err(AuthError::BadCredentials) => Err(BootstrapError::BadCredentials),
            Err(AuthError::TwoFactorRequired(challenge)) => {
                self.two_factor(username, &challenge).await
            }
            Err(e) => Err(BootstrapError::Auth(e)),
        }
    }

    async fn two_factor(
        &mut self,
        username: &str,
        challenge: &TwoFactorChallenge,
    ) -> Result<Outcome, BootstrapError> {
        self.terminal
            .say("\n⚠ Two-factor authentication required!");
        let code = self.terminal.read_line("2FA code: ")?;

        self.client
            .complete_two_factor(challenge, code.trim())
            .await
            .map_err(BootstrapError::TwoFactorFailed)?;

        let session_path = self.persist(username)?;
        self.terminal
            .say("✓ Two-factor login successful! Session saved.");
        Ok(Outcome::TwoFactorLoggedIn { session_path })
    }

    fn persist(&mut self, username: &str) -> Result<PathBuf, BootstrapError> {
        let data = self.client.export_session(username);
        let path = self.store.save(&data)?;
        info!(path = %path.display(), "Session persisted");
        Ok(path)
    }
}
