//! In-process session store backed by a concurrent map

use dashmap::DashMap;

use super::{SessionHandle, SessionStore, SessionStoreError};

#[derive(Debug, Clone)]
struct SessionRecord {
    principal: Option<String>,
    valid: bool,
}

/// Session store for standalone deployments and tests.
///
/// Invalidated sessions stay in the map flagged invalid, so a repeated
/// logout is told apart from an unknown session.
pub struct MemorySessionStore {
    sessions: DashMap<String, SessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register a valid session, replacing any previous one with the same id
    pub fn create(&self, session_id: impl Into<String>, principal: Option<&str>) {
        self.sessions.insert(
            session_id.into(),
            SessionRecord {
                principal: principal.map(str::to_string),
                valid: true,
            },
        );
    }

    /// Whether a session exists and is still valid
    pub fn is_valid(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .map(|record| record.valid)
            .unwrap_or(false)
    }

    pub fn valid_count(&self) -> usize {
        self.sessions.iter().filter(|r| r.valid).count()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    fn find_by_id(&self, session_id: &str) -> Result<Option<SessionHandle>, SessionStoreError> {
        Ok(self.sessions.get(session_id).map(|record| SessionHandle {
            id: session_id.to_string(),
            valid: record.valid,
            principal: record.principal.clone(),
        }))
    }

    fn invalidate(&self, session_id: &str) -> Result<bool, SessionStoreError> {
        // The entry guard makes check-and-flip atomic per session
        match self.sessions.get_mut(session_id) {
            Some(mut record) if record.valid => {
                record.valid = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn sessions(&self) -> Result<Vec<SessionHandle>, SessionStoreError> {
        Ok(self
            .sessions
            .iter()
            .map(|entry| SessionHandle {
                id: entry.key().clone(),
                valid: entry.value().valid,
                principal: entry.value().principal.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_create_and_find() {
        let store = MemorySessionStore::new();
        store.create("S123", Some("alice"));

        let handle = store.find_by_id("S123").unwrap().unwrap();
        assert_eq!(handle.id, "S123");
        assert!(handle.valid);
        assert_eq!(handle.principal.as_deref(), Some("alice"));
        assert!(store.find_by_id("missing").unwrap().is_none());
    }

    #[test]
    fn test_invalidate_only_once() {
        let store = MemorySessionStore::new();
        store.create("S123", None);

        assert!(store.invalidate("S123").unwrap());
        assert!(!store.invalidate("S123").unwrap());
        assert!(!store.invalidate("unknown").unwrap());
        assert!(!store.is_valid("S123"));

        let handle = store.find_by_id("S123").unwrap().unwrap();
        assert!(!handle.valid);
    }

    #[test]
    fn test_invalidated_sessions_are_still_listed() {
        let store = MemorySessionStore::new();
        store.create("S1", None);
        store.create("S2", None);
        store.invalidate("S1").unwrap();

        assert_eq!(store.valid_count(), 1);
        assert_eq!(store.sessions().unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_invalidate_has_single_winner() {
        let store = Arc::new(MemorySessionStore::new());
        store.create("S123", None);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.invalidate("S123").unwrap())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
