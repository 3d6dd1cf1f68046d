use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use super::types::UserRecord;

pub const SESSION_DIRECTORY_NAME: &str = "courier";
pub const SESSION_FILE_NAME: &str = "session.json";

/// Persisted auth session: the bearer credential plus the signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserRecord,
}

impl StoredSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// File-backed session store; the key-value persistence the app reads its
/// bearer credential from. Expired or unreadable content reads as absent.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SESSION_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".courier"))
    }

    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join(SESSION_FILE_NAME)
    }

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn open_default() -> Self {
        Self::new(Self::default_path())
    }

    /// Reads the stored session, treating expiry and corruption as absence.
    pub fn load(&self) -> Option<StoredSession> {
        if !self.path.exists() {
            return None;
        }

        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!(path = ?self.path, error = %error, "failed to read session file");
                return None;
            }
        };

        let session: StoredSession = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(error) => {
                tracing::warn!(path = ?self.path, error = %error, "failed to parse session file");
                return None;
            }
        };

        if session.is_expired() {
            tracing::info!(
                expired_at = %session.expires_at,
                "stored session has expired, treating as signed out"
            );
            return None;
        }

        Some(session)
    }

    /// Returns the bearer credential from a live session, if any.
    pub fn access_token(&self) -> Option<String> {
        self.load().map(|session| session.access_token)
    }

    pub fn store(&self, session: &StoredSession) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-session-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(session).context(SerializeSessionSnafu {
            stage: "serialize-session-json",
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-session-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.path).context(RenameTempFileSnafu {
            stage: "rename-temporary-session-file",
            from: temp_path,
            to: self.path.clone(),
        })?;

        tracing::info!(path = ?self.path, "saved session");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        if !self.path.exists() {
            return Ok(());
        }
        std::fs::remove_file(&self.path).context(RemoveFileSnafu {
            stage: "remove-session-file",
            path: self.path.clone(),
        })
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("failed to create session directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize session on `{stage}`: {source}"))]
    SerializeSession {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write session file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace session file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to remove session file at {path:?} on `{stage}`: {source}"))]
    RemoveFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use chrono::Duration;

    fn sample_user() -> UserRecord {
        UserRecord {
            id: UserId::new(1),
            name: "You".to_string(),
            username: "me".to_string(),
            avatar_url: None,
            bio: None,
            phone: None,
            email: None,
            is_online: true,
            last_seen: Utc::now(),
        }
    }

    fn temp_store(name: &str) -> SessionStore {
        let mut path = std::env::temp_dir();
        path.push(format!("courier-session-test-{name}-{}", std::process::id()));
        path.push(SESSION_FILE_NAME);
        let store = SessionStore::new(path);
        let _ = store.clear();
        store
    }

    #[test]
    fn round_trips_a_live_session() {
        let store = temp_store("live");
        let session = StoredSession {
            access_token: "token-123".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            user: sample_user(),
        };

        store.store(&session).unwrap();
        assert_eq!(store.load(), Some(session));
        assert_eq!(store.access_token().as_deref(), Some("token-123"));
        store.clear().unwrap();
    }

    #[test]
    fn expired_session_loads_as_absent() {
        let store = temp_store("expired");
        let session = StoredSession {
            access_token: "stale".to_string(),
            expires_at: Utc::now() - Duration::minutes(1),
            user: sample_user(),
        };

        store.store(&session).unwrap();
        assert_eq!(store.load(), None);
        store.clear().unwrap();
    }

    #[test]
    fn missing_file_loads_as_absent() {
        let store = temp_store("missing");
        assert_eq!(store.load(), None);
    }
}
