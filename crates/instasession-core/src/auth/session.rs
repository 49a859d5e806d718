use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Session file name prefix; the account identifier is appended.
const SESSION_FILE_PREFIX: &str = "session-";

/// Suffix for the temporary file written before the atomic rename.
const TEMP_SUFFIX: &str = "tmp";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to access session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Session file belongs to @{found}, expected @{expected}")]
    UsernameMismatch { expected: String, found: String },
}

impl SessionError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        SessionError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Persisted cookie session for one account.
///
/// The cookie map is owned by the web client; nothing else reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub username: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub cookies: BTreeMap<String, String>,
    pub saved_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(username: &str, cookies: BTreeMap<String, String>) -> Self {
        let user_id = cookies.get("ds_user_id").cloned();
        Self {
            username: username.to_string(),
            user_id,
            cookies,
            saved_at: Utc::now(),
        }
    }

    /// The session cookie Instagram uses to recognise a logged-in browser.
    pub fn has_session_cookie(&self) -> bool {
        self.cookies
            .get("sessionid")
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }
}

/// Reads and writes the session file of a single account.
pub struct SessionStore {
    session_dir: PathBuf,
    username: String,
}

impl SessionStore {
    pub fn new(session_dir: PathBuf, username: &str) -> Self {
        Self {
            session_dir,
            username: username.to_string(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// `<session_dir>/session-<username>`
    pub fn path(&self) -> PathBuf {
        self.session_dir
            .join(format!("{}{}", SESSION_FILE_PREFIX, self.username))
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Load the stored session. Any problem is an error; the caller decides
    /// whether that is fatal.
    pub fn load(&self) -> Result<SessionData, SessionError> {
        let path = self.path();
        let contents = fs::read_to_string(&path).map_err(|e| SessionError::io(&path, e))?;
        let data: SessionData = serde_json::from_str(&contents)
            .map_err(|source| SessionError::Corrupt {
                path: path.clone(),
                source,
            })?;

        if data.username != self.username {
            return Err(SessionError::UsernameMismatch {
                expected: self.username.clone(),
                found: data.username,
            });
        }

        debug!(path = %path.display(), cookies = data.cookies.len(), "Session file loaded");
        Ok(data)
    }

    /// Write the session atomically, replacing any previous file.
    pub fn save(&self, data: &SessionData) -> Result<PathBuf, SessionError> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SessionError::io(parent, e))?;
        }

        let contents = serde_json::to_string_pretty(data).map_err(|source| {
            SessionError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;

        let mut tmp_name = path.clone().into_os_string();
        tmp_name.push(".");
        tmp_name.push(TEMP_SUFFIX);
        let tmp_path = PathBuf::from(tmp_name);
        if let Err(e) = write_private(&tmp_path, contents.as_bytes()) {
            let _ = fs::remove_file(&tmp_path);
            return Err(SessionError::io(&tmp_path, e));
        }
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(SessionError::io(&path, e));
        }

        debug!(path = %path.display(), "Session file saved");
        Ok(path)
    }
}

/// Write `bytes` to a new file readable only by the owner, flushed to disk.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(username: &str) -> SessionData {
        let mut cookies = BTreeMap::new();
        cookies.insert("csrftoken".to_string(), "tok".to_string());
        cookies.insert("sessionid".to_string(), "abc%3A123".to_string());
        cookies.insert("ds_user_id".to_string(), "4242".to_string());
        SessionData::new(username, cookies)
    }

    #[test]
    fn test_path_is_derived_from_username() {
        let store = SessionStore::new(PathBuf::from("/cfg/instaloader"), "nextleveldj1");
        assert_eq!(
            store.path(),
            PathBuf::from("/cfg/instaloader/session-nextleveldj1")
        );
    }

    #[test]
    fn test_session_data_picks_up_user_id() {
        let data = sample("someone");
        assert_eq!(data.user_id.as_deref(), Some("4242"));
        assert!(data.has_session_cookie());

        let empty = SessionData::new("someone", BTreeMap::new());
        assert!(!empty.has_session_cookie());
    }

    #[test]
    fn test_save_creates_directory_and_load_reads_it_back() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path().join("nested/instaloader"), "someone");
        assert!(!store.exists());

        let data = sample("someone");
        let written = store.save(&data).unwrap();
        assert_eq!(written, store.path());
        assert!(store.exists());
        assert_eq!(store.load().unwrap(), data);

        // Only the session file remains; the temporary file was renamed away.
        let entries: Vec<_> = fs::read_dir(written.parent().unwrap())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path().to_path_buf(), "someone");
        let path = store.save(&sample("someone")).unwrap();
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_failed_rename_removes_temporary_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path().to_path_buf(), "someone");
        // A non-empty directory in the way makes the final rename fail.
        fs::create_dir(store.path()).unwrap();
        fs::write(store.path().join("keep"), "x").unwrap();

        let err = store.save(&sample("someone")).unwrap_err();
        assert!(matches!(err, SessionError::Io { ref path, .. } if *path == store.path()));
        assert!(!temp_dir.path().join("session-someone.tmp").exists());
        assert!(store.path().join("keep").exists());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path().to_path_buf(), "someone");
        assert!(matches!(store.load(), Err(SessionError::Io { .. })));
    }

    #[test]
    fn test_load_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path().to_path_buf(), "someone");
        fs::write(store.path(), "\u{80}garbage{").unwrap();
        assert!(matches!(store.load(), Err(SessionError::Corrupt { .. })));
    }

    #[test]
    fn test_load_rejects_other_account() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path().to_path_buf(), "someone");
        let foreign = sample("someone_else");
        fs::write(store.path(), serde_json::to_string(&foreign).unwrap()).unwrap();

        match store.load() {
            Err(SessionError::UsernameMismatch { expected, found }) => {
                assert_eq!(expected, "someone");
                assert_eq!(found, "someone_else");
            }
            other => panic!("expected username mismatch, got {:?}", other),
        }
    }
}
