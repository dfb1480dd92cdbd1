//! Process-wide owner of the authenticated user session.
//!
//! A host constructs one [`SessionManager`] at startup and hands it (by
//! reference or `Arc`) to whatever needs the current user. The manager holds
//! at most one live [`Session`] at a time:
//!
//! ```text
//!   Unauthenticated --acquire / restore_if_present--> Authenticated
//!   Authenticated   --update_privileges-------------> Authenticated
//!   Authenticated   --end---------------------------> Unauthenticated
//! ```
//!
//! Locking: the slot lock is always taken before a session's own lock.
//! Store writes happen while the relevant exclusive lock is held, so other
//! callers never observe a state change whose persistence is still pending.

use crate::clock::{Clock, SystemClock};
use crate::error::{PersistOp, Result, SessionError};
use crate::hasher::{CredentialHasher, Sha256Hasher};
use crate::session::{PersistedSessionRecord, Session, SessionState, DEFAULT_PRIVILEGES};
use crate::store::PersistenceStore;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

fn ensure_live(state: &SessionState) -> Result<()> {
    if state.is_live() {
        Ok(())
    } else {
        Err(SessionError::InvalidState("session is not authenticated".to_string()))
    }
}

/// Builder for [`SessionManager`]. Hasher and clock default to
/// [`Sha256Hasher`] and [`SystemClock`].
pub struct SessionManagerBuilder {
    store: Arc<dyn PersistenceStore>,
    hasher: Arc<dyn CredentialHasher>,
    clock: Arc<dyn Clock>,
}

impl SessionManagerBuilder {
    pub fn hasher(mut self, hasher: Arc<dyn CredentialHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> SessionManager {
        SessionManager {
            store: self.store,
            hasher: self.hasher,
            clock: self.clock,
            slot: RwLock::new(None),
            generations: AtomicU64::new(0),
        }
    }
}

/// Owns the single live session and mediates every read and write of it.
pub struct SessionManager {
    store: Arc<dyn PersistenceStore>,
    hasher: Arc<dyn CredentialHasher>,
    clock: Arc<dyn Clock>,
    slot: RwLock<Option<Arc<Session>>>,
    generations: AtomicU64,
}

impl SessionManager {
    /// Manager over `store` with the default hasher and the system clock.
    pub fn new(store: impl PersistenceStore + 'static) -> Self {
        Self::builder(Arc::new(store)).build()
    }

    pub fn builder(store: Arc<dyn PersistenceStore>) -> SessionManagerBuilder {
        SessionManagerBuilder {
            store,
            hasher: Arc::new(Sha256Hasher),
            clock: Arc::new(SystemClock),
        }
    }

    /// The store this manager persists to.
    pub fn store(&self) -> &dyn PersistenceStore {
        &*self.store
    }

    /// The installed session, if any.
    pub fn current(&self) -> Option<Arc<Session>> {
        self.slot.read().clone()
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Log in with the default privileges. See [`acquire`](Self::acquire).
    pub fn acquire_default(&self, username: &str, password: &str) -> Result<Arc<Session>> {
        self.acquire(username, password, DEFAULT_PRIVILEGES)
    }

    /// Return the live session, creating it on first use.
    ///
    /// When no session is installed, `password` is hashed, a new
    /// authenticated session is persisted and installed, and returned.
    ///
    /// When a session is already installed it is returned unchanged and the
    /// arguments are ignored, even if they name a different user. A new user
    /// can only log in after [`end`](Self::end).
    ///
    /// On any error nothing is installed.
    #[instrument(skip(self, password, privileges))]
    pub fn acquire(
        &self,
        username: &str,
        password: &str,
        privileges: &str,
    ) -> Result<Arc<Session>> {
        if let Some(existing) = self.current() {
            debug!(generation = existing.generation(), "Returning existing session");
            return Ok(existing);
        }

        let mut slot = self.slot.write();
        if let Some(existing) = slot.as_ref() {
            debug!(
                generation = existing.generation(),
                "Session created concurrently, returning it"
            );
            return Ok(Arc::clone(existing));
        }

        let record = PersistedSessionRecord {
            username: username.to_string(),
            password_digest: self.hasher.hash(password)?,
            privileges: privileges.to_string(),
            login_time_ms: self.clock.now_ms(),
        };

        if let Err(e) = record.save(self.store()) {
            warn!(error = %e, "Could not persist new session, nothing installed");
            if let Err(cleanup) = PersistedSessionRecord::clear(self.store()) {
                warn!(error = %cleanup, "Could not remove partially written session record");
            }
            return Err(SessionError::persistence(PersistOp::Acquire)(e));
        }

        let session = Arc::new(Session::new(
            self.next_generation(),
            SessionState::from_record(record),
        ));
        *slot = Some(Arc::clone(&session));
        info!(generation = session.generation(), "New user session created");
        Ok(session)
    }

    /// Check `candidate` against the session's stored digest.
    pub fn verify(&self, session: &Session, candidate: &str) -> Result<bool> {
        let state = session.read();
        ensure_live(&state)?;
        let digest = state
            .credential_digest
            .as_deref()
            .ok_or_else(|| SessionError::InvalidState("session has no credential".to_string()))?;
        Ok(self.hasher.verify(candidate, digest)?)
    }

    pub fn privileges(&self, session: &Session) -> Result<String> {
        let state = session.read();
        ensure_live(&state)?;
        Ok(state.privileges.clone())
    }

    /// The session's username; `None` once it has ended.
    pub fn username(&self, session: &Session) -> Option<String> {
        session.read().username.clone()
    }

    pub fn is_authenticated(&self, session: &Session) -> bool {
        session.read().authenticated
    }

    /// Time since login. Zero if the clock has moved behind the login time.
    pub fn session_duration(&self, session: &Session) -> Result<Duration> {
        let state = session.read();
        ensure_live(&state)?;
        let elapsed = self.clock.now_ms().saturating_sub(state.login_time_ms);
        Ok(Duration::from_millis(elapsed.max(0) as u64))
    }

    /// Replace the session's privileges and re-persist its record.
    ///
    /// The in-memory change is only made once the store write succeeded.
    #[instrument(skip(self, session), fields(generation = session.generation()))]
    pub fn update_privileges(&self, session: &Session, new_privileges: &str) -> Result<()> {
        let mut state = session.write();
        ensure_live(&state)?;
        let previous = state.to_record().ok_or_else(|| {
            SessionError::InvalidState("session is not authenticated".to_string())
        })?;

        let mut updated = previous.clone();
        updated.privileges = new_privileges.to_string();

        if let Err(e) = updated.save(self.store()) {
            warn!(error = %e, "Could not persist privilege change, keeping previous privileges");
            if let Err(restore) = previous.save(self.store()) {
                warn!(error = %restore, "Could not restore previous session record");
            }
            return Err(SessionError::persistence(PersistOp::UpdatePrivileges)(e));
        }

        state.privileges = updated.privileges;
        info!(username = ?state.username, "Privileges updated");
        Ok(())
    }

    /// Log out: clear the session, release the slot and remove the stored
    /// record.
    ///
    /// The in-memory logout always takes effect. If removing the stored
    /// record fails, the error reports [`PersistOp::End`] and the record on
    /// disk is stale. Ending a session that has already ended does nothing.
    #[instrument(skip(self, session), fields(generation = session.generation()))]
    pub fn end(&self, session: &Session) -> Result<()> {
        let mut slot = self.slot.write();
        let mut state = session.write();

        if !state.authenticated {
            debug!("Session already ended");
            return Ok(());
        }

        let username = state.username.take();
        *state = SessionState::cleared();
        if slot.as_ref().is_some_and(|current| current.same_as(session)) {
            *slot = None;
        }

        let result = PersistedSessionRecord::clear(self.store())
            .map_err(SessionError::persistence(PersistOp::End));
        match &result {
            Ok(()) => info!(username = ?username, "User session cleaned"),
            Err(e) => warn!(
                username = ?username,
                error = %e,
                "Session ended but stored record was not removed"
            ),
        }
        result
    }

    /// True iff the store holds a username and a password digest.
    pub fn has_stored_credentials(&self) -> Result<bool> {
        PersistedSessionRecord::has_credentials(self.store())
            .map_err(SessionError::persistence(PersistOp::Read))
    }

    /// Reinstall the session recorded in the store, if there is one.
    ///
    /// The stored password is already a digest and is used as-is. Nothing
    /// is written back. A session installed before the call is cleared and
    /// replaced by the restored one.
    #[instrument(skip(self))]
    pub fn restore_if_present(&self) -> Result<Option<Arc<Session>>> {
        let mut slot = self.slot.write();
        // Lock the installed session before reading the store so an in-flight
        // privilege update finishes first and its record is the one loaded.
        let previous = slot.clone();
        let mut previous_state = previous.as_ref().map(|session| session.write());

        let record = PersistedSessionRecord::load(self.store(), self.clock.now_ms())
            .map_err(SessionError::persistence(PersistOp::Read))?;
        let Some(record) = record else {
            debug!("No stored session");
            return Ok(None);
        };

        if let (Some(previous), Some(state)) = (previous.as_ref(), previous_state.as_mut()) {
            debug!(generation = previous.generation(), "Clearing session replaced by restore");
            **state = SessionState::cleared();
        }
        drop(previous_state);

        let session = Arc::new(Session::new(
            self.next_generation(),
            SessionState::from_record(record),
        ));
        *slot = Some(Arc::clone(&session));
        info!(
            generation = session.generation(),
            username = ?session.info().username,
            "Session restored"
        );
        Ok(Some(session))
    }

    /// Human-readable one-line summary, never including the digest.
    pub fn describe(&self, session: &Session) -> String {
        let info = session.info();
        let duration_ms = if info.authenticated {
            self.clock.now_ms().saturating_sub(info.login_time_ms).max(0)
        } else {
            0
        };
        format!(
            "Session{{username='{}', privileges={}, authenticated={}, duration={}ms}}",
            info.username.as_deref().unwrap_or("-"),
            info.privileges,
            info.authenticated,
            duration_ms
        )
    }
}
