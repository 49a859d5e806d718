//! Application configuration management.
//!
//! Configuration is optional. It is read from
//! `~/.config/instasession/config.json` and then overridden by the
//! `INSTASESSION_USERNAME` and `INSTASESSION_SESSION_DIR` environment
//! variables. Without either, the built-in account is used and its session
//! lives in `~/.config/instaloader/`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for the config directory path
const APP_NAME: &str = "instasession";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Account the tool operates on when nothing else is configured.
pub const DEFAULT_USERNAME: &str = "nextleveldj1";

/// Directory (under the platform config dir) that holds session files.
const SESSION_DIR_NAME: &str = "instaloader";

const USERNAME_ENV: &str = "INSTASESSION_USERNAME";
const SESSION_DIR_ENV: &str = "INSTASESSION_SESSION_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub username: Option<String>,
    pub session_dir: Option<PathBuf>,
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Ok(path) => Self::load_from(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Read a config file, treating a missing file as the default config.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Some(username) = non_empty_env(USERNAME_ENV) {
            self.username = Some(username);
        }
        if let Some(dir) = non_empty_env(SESSION_DIR_ENV) {
            self.session_dir = Some(PathBuf::from(dir));
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Account identifier, with a leading `@` tolerated.
    ///
    /// The name becomes part of the session file name, so only the characters
    /// Instagram allows in usernames are accepted.
    pub fn username(&self) -> Result<&str> {
        let username = self
            .username
            .as_deref()
            .map(|u| u.trim().trim_start_matches('@'))
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_USERNAME);

        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
        {
            bail!(
                "Invalid username {:?}: only letters, digits, '.' and '_' are allowed",
                username
            );
        }
        Ok(username)
    }

    pub fn session_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.session_dir {
            return Ok(dir.clone());
        }
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(SESSION_DIR_NAME))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
