//! instasession - log an Instagram account in once and keep the session.
//!
//! Reuses the stored session when the server still accepts it, otherwise
//! prompts for the password (and a two-factor code when asked) and saves the
//! new session for other tools to pick up.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Result;
use secrecy::SecretString;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use instasession_core::{
    ApiClient, BootstrapError, Bootstrapper, Config, Outcome, SessionStore, Terminal,
};

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes buffered log lines when dropped.
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();

    guard
}

/// Prompts and status lines on the controlling terminal.
struct StdTerminal;

impl Terminal for StdTerminal {
    fn say(&mut self, line: &str) {
        println!("{}", line);
    }

    fn read_password(&mut self, prompt: &str) -> io::Result<SecretString> {
        rpassword::prompt_password(prompt).map(SecretString::from)
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<String> {
        print!("{}", prompt);
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed before a code was entered",
            ));
        }
        Ok(input)
    }
}

async fn run() -> Result<Outcome> {
    let config = Config::load()?;
    let store = SessionStore::new(config.session_dir()?, config.username()?);
    debug!(path = %store.path().display(), "Session file location");

    let mut client = ApiClient::new()?;
    let mut terminal = StdTerminal;
    let outcome = Bootstrapper::new(&mut client, &mut terminal, store)
        .run()
        .await?;
    Ok(outcome)
}

/// The single line printed when a run fails.
fn failure_line(e: &anyhow::Error) -> String {
    match e.downcast_ref::<BootstrapError>() {
        Some(failure) => format!("\n✗ {}", failure),
        None => format!("\n✗ Error: {:#}", e),
    }
}

fn exit_code(result: &Result<Outcome>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();
    info!("instasession starting");

    let result = run().await;
    match &result {
        Ok(outcome) => debug!(?outcome, "Finished"),
        Err(e) => println!("{}", failure_line(e)),
    }
    ExitCode::from(exit_code(&result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use anyhow::anyhow;
    use instasession_core::{ApiError, AuthError};

    fn assert_single_failure_line(line: &str) {
        let body = line.strip_prefix('\n').expect("leading blank line");
        assert!(body.starts_with("✗ "));
        assert!(!body.contains('\n'));
        assert_eq!(line.matches('✗').count(), 1);
    }

    #[test]
    fn test_bootstrap_failures_print_their_own_message() {
        let wrong = anyhow::Error::from(BootstrapError::BadCredentials);
        assert_eq!(failure_line(&wrong), "\n✗ Wrong password!");

        let rate_limited =
            anyhow::Error::from(BootstrapError::Auth(AuthError::Api(ApiError::RateLimited)));
        let line = failure_line(&rate_limited);
        assert_single_failure_line(&line);
        assert!(line.starts_with("\n✗ Error: Rate limited"));
    }

    #[test]
    fn test_other_failures_are_prefixed_with_error() {
        let err = anyhow!("Invalid username \"../x\"").context("Failed to load configuration");
        let line = failure_line(&err);
        assert_single_failure_line(&line);
        assert_eq!(
            line,
            "\n✗ Error: Failed to load configuration: Invalid username \"../x\""
        );
    }

    #[test]
    fn test_exit_code_reflects_result() {
        let ok: Result<Outcome> = Ok(Outcome::TwoFactorLoggedIn {
            session_path: PathBuf::from("/tmp/session-someone"),
        });
        assert_eq!(exit_code(&ok), 0);

        let failed: Result<Outcome> = Err(anyhow::Error::from(BootstrapError::BadCredentials));
        assert_eq!(exit_code(&failed), 1);
    }
}
