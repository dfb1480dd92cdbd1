//! Shared test infrastructure for integration tests
//!
//! Provides a store with switchable failures, a hasher that is never
//! available, and manager constructors wired to a manual clock.

#![allow(dead_code)]

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use user_session::clock::ManualClock;
use user_session::hasher::{CredentialHasher, HashError};
use user_session::session::{KEY_LOGIN_TIME, KEY_PRIVILEGES};
use user_session::store::{MemoryStore, PersistenceStore, StoreError};
use user_session::SessionManager;

pub const NAMESPACE: &str = "com.example.app.usersession";

/// Login time used by every manual clock created here.
pub const START_MS: i64 = 1_700_000_000_000;

/// Memory store whose writes and removals can be made to fail.
///
/// Uses the per-key default `put_all` / `remove_all`, so a failure after
/// `fail_after_puts` successful puts leaves a partially written record.
pub struct FlakyStore {
    inner: MemoryStore,
    fail_puts: AtomicBool,
    fail_removes: AtomicBool,
    /// Number of puts still allowed before failing, when `fail_puts` is set.
    puts_before_failure: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(NAMESPACE),
            fail_puts: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
            puts_before_failure: AtomicUsize::new(0),
        }
    }

    /// Fail every put after the next `allowed` ones.
    pub fn fail_puts_after(&self, allowed: usize) {
        self.puts_before_failure.store(allowed, Ordering::SeqCst);
        self.fail_puts.store(true, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_puts.store(false, Ordering::SeqCst);
        self.fail_removes.store(false, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl PersistenceStore for FlakyStore {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            let allowed = self.puts_before_failure.load(Ordering::SeqCst);
            if allowed == 0 {
                return Err(StoreError::Other(format!("injected put failure for {}", key)));
            }
            self.puts_before_failure.store(allowed - 1, Ordering::SeqCst);
        }
        self.inner.put(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StoreError::Other(format!("injected remove failure for {}", key)));
        }
        self.inner.remove(key)
    }
}

#[derive(Default)]
struct GateState {
    privileges_put_pending: bool,
    login_time_read: bool,
}

/// Memory store that, once armed, holds the next `PRIVILEGES` write until a
/// reader has fetched `LOGIN_TIME` (or `GATE_TIMEOUT` passes).
///
/// A reader that is not serialized with the writer therefore loads the
/// record while the privilege change is half applied.
pub struct GateStore {
    inner: MemoryStore,
    armed: AtomicBool,
    state: Mutex<GateState>,
    changed: Condvar,
}

pub const GATE_TIMEOUT: Duration = Duration::from_millis(500);

impl GateStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(NAMESPACE),
            armed: AtomicBool::new(false),
            state: Mutex::new(GateState::default()),
            changed: Condvar::new(),
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Block until a `PRIVILEGES` write is being held.
    pub fn wait_for_held_write(&self) {
        let mut state = self.state.lock();
        self.changed.wait_while(&mut state, |s| !s.privileges_put_pending);
    }
}

impl PersistenceStore for GateStore {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key == KEY_PRIVILEGES && self.armed.swap(false, Ordering::SeqCst) {
            let mut state = self.state.lock();
            state.privileges_put_pending = true;
            self.changed.notify_all();
            self.changed.wait_while_for(&mut state, |s| !s.login_time_read, GATE_TIMEOUT);
        }
        self.inner.put(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if key == KEY_LOGIN_TIME {
            let mut state = self.state.lock();
            if state.privileges_put_pending {
                state.login_time_read = true;
                self.changed.notify_all();
            }
        }
        self.inner.get(key)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key)
    }
}

/// A hasher whose primitive is missing.
pub struct UnavailableHasher;

impl CredentialHasher for UnavailableHasher {
    fn hash(&self, _plaintext: &str) -> Result<String, HashError> {
        Err(HashError::Unavailable("SHA-256 not provided".to_string()))
    }
}

pub struct Harness<S> {
    pub manager: SessionManager,
    pub store: Arc<S>,
    pub clock: Arc<ManualClock>,
}

/// Manager over a fresh memory store and a manual clock at `START_MS`.
pub fn memory_harness() -> Harness<MemoryStore> {
    harness_with(Arc::new(MemoryStore::new(NAMESPACE)))
}

pub fn flaky_harness() -> Harness<FlakyStore> {
    harness_with(Arc::new(FlakyStore::new()))
}

pub fn harness_with<S: PersistenceStore + 'static>(store: Arc<S>) -> Harness<S> {
    let clock = Arc::new(ManualClock::new(START_MS));
    let manager = SessionManager::builder(store.clone())
        .clock(clock.clone())
        .build();
    Harness {
        manager,
        store,
        clock,
    }
}
