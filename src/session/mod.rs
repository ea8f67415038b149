//! Narrow view of the host's session manager
//!
//! Everything else in the crate talks to sessions through [`SessionStore`],
//! never through a concrete host implementation.

mod memory;

pub use memory::MemorySessionStore;

use thiserror::Error;

/// Identifier and validity of a host-owned session.
///
/// Holds no session content, only what is needed to decide on invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: String,
    pub valid: bool,
    /// Authenticated principal name, if the session has logged in
    pub principal: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    #[error("session store operation failed: {0}")]
    Operation(String),
}

/// Host session manager operations used by the relay.
///
/// Implementations must be cheap: calls run on request-handling tasks.
pub trait SessionStore: Send + Sync {
    fn find_by_id(&self, session_id: &str) -> Result<Option<SessionHandle>, SessionStoreError>;

    /// Invalidate a session. Returns `false` if it was already absent or invalid.
    fn invalidate(&self, session_id: &str) -> Result<bool, SessionStoreError>;

    /// Snapshot of all sessions currently known to the host
    fn sessions(&self) -> Result<Vec<SessionHandle>, SessionStoreError>;
}

/// First 8 characters of a session id, for log output
pub fn truncate_session_id(session_id: &str) -> String {
    let prefix: String = session_id.chars().take(8).collect();
    format!("{}...", prefix)
}
