//! Session error types

use crate::hasher::HashError;
use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// Which manager operation was talking to the store when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOp {
    /// Writing the record of a freshly created session. Nothing was installed.
    Acquire,
    /// Rewriting the record with new privileges. In-memory privileges are unchanged.
    UpdatePrivileges,
    /// Removing the record on logout. The in-memory session is already cleared.
    End,
    /// Reading the stored record.
    Read,
}

impl fmt::Display for PersistOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PersistOp::Acquire => "acquire",
            PersistOp::UpdatePrivileges => "update_privileges",
            PersistOp::End => "end",
            PersistOp::Read => "read",
        })
    }
}

/// Errors returned by the session manager
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("credential hashing unavailable: {0}")]
    HashingUnavailable(#[from] HashError),

    #[error("persistence failed during {op}: {source}")]
    Persistence {
        op: PersistOp,
        #[source]
        source: StoreError,
    },

    #[error("invalid session state: {0}")]
    InvalidState(String),
}

impl SessionError {
    pub(crate) fn persistence(op: PersistOp) -> impl FnOnce(StoreError) -> Self {
        move |source| SessionError::Persistence { op, source }
    }

    /// True when the in-memory session changed but the stored record does
    /// not reflect it.
    pub fn is_unpersisted(&self) -> bool {
        matches!(
            self,
            SessionError::Persistence {
                op: PersistOp::End,
                ..
            }
        )
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::InvalidState("session has ended".to_string());
        assert_eq!(err.to_string(), "invalid session state: session has ended");

        let err: SessionError = HashError::Unavailable("no sha256".to_string()).into();
        assert_eq!(
            err.to_string(),
            "credential hashing unavailable: hash primitive unavailable: no sha256"
        );

        let err = SessionError::persistence(PersistOp::UpdatePrivileges)(StoreError::Other(
            "disk gone".to_string(),
        ));
        assert_eq!(
            err.to_string(),
            "persistence failed during update_privileges: Store error: disk gone"
        );
        assert!(!err.is_unpersisted());
    }

    #[test]
    fn test_unpersisted_only_for_end() {
        let err = SessionError::persistence(PersistOp::End)(StoreError::Other("x".into()));
        assert!(err.is_unpersisted());
    }
}
