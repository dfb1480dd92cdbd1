//! The session entity and its persisted mirror.

use crate::store::{PersistenceStore, StoreError};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use tracing::warn;

/// Privileges assigned when none are given or stored.
pub const DEFAULT_PRIVILEGES: &str = "NONE";

/// Namespace the desktop application has always stored its session under.
pub const DEFAULT_NAMESPACE: &str = "com.example.app.usersession";

pub const KEY_USERNAME: &str = "USERNAME";
pub const KEY_PASSWORD: &str = "PASSWORD";
pub const KEY_PRIVILEGES: &str = "PRIVILEGES";
pub const KEY_LOGIN_TIME: &str = "LOGIN_TIME";

/// Every key of a persisted session record.
pub const RECORD_KEYS: [&str; 4] = [KEY_USERNAME, KEY_PASSWORD, KEY_PRIVILEGES, KEY_LOGIN_TIME];

/// All mutable session fields. Always read and written as one unit.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct SessionState {
    pub(crate) username: Option<String>,
    pub(crate) credential_digest: Option<String>,
    pub(crate) privileges: String,
    pub(crate) authenticated: bool,
    pub(crate) login_time_ms: i64,
}

impl SessionState {
    pub(crate) fn authenticated(
        username: String,
        credential_digest: String,
        privileges: String,
        login_time_ms: i64,
    ) -> Self {
        Self {
            username: Some(username),
            credential_digest: Some(credential_digest),
            privileges,
            authenticated: true,
            login_time_ms,
        }
    }

    pub(crate) fn cleared() -> Self {
        Self {
            username: None,
            credential_digest: None,
            privileges: DEFAULT_PRIVILEGES.to_string(),
            authenticated: false,
            login_time_ms: 0,
        }
    }

    pub(crate) fn from_record(record: PersistedSessionRecord) -> Self {
        Self::authenticated(
            record.username,
            record.password_digest,
            record.privileges,
            record.login_time_ms,
        )
    }

    pub(crate) fn is_live(&self) -> bool {
        self.authenticated && self.username.is_some() && self.credential_digest.is_some()
    }

    /// The record that mirrors this state, if it is authenticated.
    pub(crate) fn to_record(&self) -> Option<PersistedSessionRecord> {
        if !self.authenticated {
            return None;
        }
        Some(PersistedSessionRecord {
            username: self.username.clone()?,
            password_digest: self.credential_digest.clone()?,
            privileges: self.privileges.clone(),
            login_time_ms: self.login_time_ms,
        })
    }
}

/// Public view of a session without the credential digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub username: Option<String>,
    pub privileges: String,
    pub authenticated: bool,
    pub login_time_ms: i64,
}

/// An authenticated (or, after logout, cleared) user session.
///
/// Handed out as `Arc<Session>` by the
/// [`SessionManager`](crate::manager::SessionManager); all field access goes
/// through the manager or through the lock-protected helpers here.
pub struct Session {
    generation: u64,
    state: RwLock<SessionState>,
}

impl Session {
    pub(crate) fn new(generation: u64, state: SessionState) -> Self {
        Self {
            generation,
            state: RwLock::new(state),
        }
    }

    /// Process-local sequence number, unique per created or restored session.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True if both handles refer to the same session object.
    pub fn same_as(&self, other: &Session) -> bool {
        std::ptr::eq(self, other)
    }

    /// Consistent snapshot of the session fields, minus the digest.
    pub fn info(&self) -> SessionInfo {
        let state = self.read();
        SessionInfo {
            username: state.username.clone(),
            privileges: state.privileges.clone(),
            authenticated: state.authenticated,
            login_time_ms: state.login_time_ms,
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("Session")
            .field("generation", &self.generation)
            .field("username", &state.username)
            .field("credential_digest", &state.credential_digest.as_ref().map(|_| "<redacted>"))
            .field("privileges", &state.privileges)
            .field("authenticated", &state.authenticated)
            .field("login_time_ms", &state.login_time_ms)
            .finish()
    }
}

/// The four values that mirror a live session in the store.
#[derive(Clone, PartialEq, Eq)]
pub struct PersistedSessionRecord {
    pub username: String,
    /// Already-hashed password. Never plaintext, never re-hashed on load.
    pub password_digest: String,
    pub privileges: String,
    /// Milliseconds since the Unix epoch.
    pub login_time_ms: i64,
}

impl PersistedSessionRecord {
    /// Key/value pairs in store layout.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (KEY_USERNAME, self.username.clone()),
            (KEY_PASSWORD, self.password_digest.clone()),
            (KEY_PRIVILEGES, self.privileges.clone()),
            (KEY_LOGIN_TIME, self.login_time_ms.to_string()),
        ]
    }

    /// Write all four keys.
    pub fn save(&self, store: &dyn PersistenceStore) -> Result<(), StoreError> {
        store.put_all(&self.entries())
    }

    /// Remove all four keys.
    pub fn clear(store: &dyn PersistenceStore) -> Result<(), StoreError> {
        store.remove_all(&RECORD_KEYS)
    }

    /// True iff both the username and the password digest are stored.
    pub fn has_credentials(store: &dyn PersistenceStore) -> Result<bool, StoreError> {
        Ok(store.get(KEY_USERNAME)?.is_some() && store.get(KEY_PASSWORD)?.is_some())
    }

    /// Read the stored record.
    ///
    /// Returns `None` unless both username and password are present. A
    /// missing `PRIVILEGES` defaults to `"NONE"`; a missing or unparsable
    /// `LOGIN_TIME` defaults to `now_ms`.
    pub fn load(store: &dyn PersistenceStore, now_ms: i64) -> Result<Option<Self>, StoreError> {
        let (Some(username), Some(password_digest)) =
            (store.get(KEY_USERNAME)?, store.get(KEY_PASSWORD)?)
        else {
            return Ok(None);
        };

        let privileges = store
            .get(KEY_PRIVILEGES)?
            .unwrap_or_else(|| DEFAULT_PRIVILEGES.to_string());

        let login_time_ms = match store.get(KEY_LOGIN_TIME)? {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(ms) => ms,
                Err(_) => {
                    warn!(
                        namespace = store.namespace(),
                        value = %raw,
                        "Stored LOGIN_TIME is not an integer, using current time"
                    );
                    now_ms
                }
            },
            None => now_ms,
        };

        Ok(Some(Self {
            username,
            password_digest,
            privileges,
            login_time_ms,
        }))
    }
}

impl fmt::Debug for PersistedSessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedSessionRecord")
            .field("username", &self.username)
            .field("password_digest", &"<redacted>")
            .field("privileges", &self.privileges)
            .field("login_time_ms", &self.login_time_ms)
            .finish()
    }
}
