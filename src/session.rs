//! Login session.
//!
//! A session is two session-scoped keys: `auth_token` (a ULID string) and
//! `current_user` (`{"username", "loginTime"}`). Logging out removes both.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::config::{AuthConfig, Config};
use crate::error::{Error, Result};
use crate::storage::{read_json, write_json, DataDir, FileStore, KeyValueStore};

pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const CURRENT_USER_KEY: &str = "current_user";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub username: String,
    pub login_time: DateTime<Utc>,
}

pub struct Session {
    kv: Arc<dyn KeyValueStore>,
    auth: AuthConfig,
    require_login: bool,
}

impl Session {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        Self {
            kv,
            auth: config.auth.clone(),
            require_login: config.session.require_login,
        }
    }

    /// Session backed by `<data-dir>/session/`
    pub fn open(data_dir: &DataDir, config: &Config) -> Self {
        let store =
            FileStore::new(data_dir.session_dir()).with_lock_timeout(config.storage.lock_timeout_ms);
        Self::new(Arc::new(store), config)
    }

    /// Check credentials and start a session.
    ///
    /// Nothing is written when the credentials are wrong.
    pub fn login(&self, username: &str, password: &str) -> Result<SessionInfo> {
        if username.is_empty() || password.is_empty() {
            return Err(Error::InvalidArgument(
                "username and password are required".to_string(),
            ));
        }
        if !self.auth.accepts(username, password) {
            warn!(username, "login failed");
            return Err(Error::InvalidCredentials);
        }

        let info = SessionInfo {
            username: username.to_string(),
            login_time: Utc::now(),
        };
        let token = Ulid::new().to_string();
        write_json(self.kv.as_ref(), AUTH_TOKEN_KEY, &token)?;
        if let Err(err) = write_json(self.kv.as_ref(), CURRENT_USER_KEY, &info) {
            let _ = self.kv.remove(AUTH_TOKEN_KEY);
            return Err(err);
        }
        debug!(username, "session started");
        Ok(info)
    }

    /// End the session. Returns whether one was active.
    pub fn logout(&self) -> Result<bool> {
        let was_active = self.is_authenticated();
        self.kv.remove(AUTH_TOKEN_KEY)?;
        self.kv.remove(CURRENT_USER_KEY)?;
        if was_active {
            debug!("session ended");
        }
        Ok(was_active)
    }

    pub fn token(&self) -> Option<String> {
        read_json::<String>(self.kv.as_ref(), AUTH_TOKEN_KEY)
            .ok()
            .flatten()
            .filter(|token| !token.is_empty())
    }

    /// Logged-in user; `None` when absent or unreadable
    pub fn current_user(&self) -> Option<SessionInfo> {
        match read_json(self.kv.as_ref(), CURRENT_USER_KEY) {
            Ok(info) => info,
            Err(err) => {
                warn!(error = %err, "session record unreadable");
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Fail with `NotAuthenticated` when a login is required and missing.
    pub fn require(&self) -> Result<()> {
        if self.require_login && !self.is_authenticated() {
            return Err(Error::NotAuthenticated);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn session() -> (Arc<MemoryStore>, Session) {
        let kv = Arc::new(MemoryStore::new());
        let session = Session::new(kv.clone(), &Config::default());
        (kv, session)
    }

    #[test]
    fn login_writes_both_keys() {
        let (kv, session) = session();
        let info = session.login("admin", "admin").unwrap();
        assert_eq!(info.username, "admin");
        assert!(session.is_authenticated());
        assert_eq!(session.current_user(), Some(info));
        let raw = kv.get(CURRENT_USER_KEY).unwrap().unwrap();
        assert!(raw.contains("\"loginTime\""));
        assert_eq!(session.token().unwrap().len(), 26);
    }

    #[test]
    fn wrong_password_writes_nothing() {
        let (kv, session) = session();
        assert!(matches!(
            session.login("admin", "nope"),
            Err(Error::InvalidCredentials)
        ));
        assert!(kv.keys().is_empty());
        assert!(matches!(session.require(), Err(Error::NotAuthenticated)));
    }

    #[test]
    fn empty_fields_are_invalid() {
        let (_kv, session) = session();
        assert!(matches!(
            session.login("", "admin"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn logout_is_idempotent() {
        let (kv, session) = session();
        session.login("admin", "admin").unwrap();
        assert!(session.logout().unwrap());
        assert!(!session.logout().unwrap());
        assert!(kv.keys().is_empty());
    }

    #[test]
    fn corrupt_record_reads_as_none() {
        let (kv, session) = session();
        kv.set(CURRENT_USER_KEY, "{not json").unwrap();
        assert!(session.current_user().is_none());
    }

    #[test]
    fn require_passes_when_login_optional() {
        let kv = Arc::new(MemoryStore::new());
        let mut config = Config::default();
        config.session.require_login = false;
        let session = Session::new(kv, &config);
        assert!(session.require().is_ok());
    }
}
