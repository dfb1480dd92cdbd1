//! User Session - authenticated-user identity for a desktop records application
//!
//! This library owns the single logged-in user of a process: credential
//! hashing, a thread-safe session slot, and persistence of the session across
//! restarts.

pub mod clock;
pub mod config;
pub mod error;
pub mod hasher;
pub mod manager;
pub mod session;
pub mod store;

pub use error::{PersistOp, Result, SessionError};
pub use manager::{SessionManager, SessionManagerBuilder};
pub use session::{PersistedSessionRecord, Session, SessionInfo};
