use crate::models::SessionMeta;
use log_parser::timestamp::now_iso;
use log_parser::LogRecord;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// One uploaded file's records. Immutable once stored.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub filename: String,
    pub created_at: String,
    pub records: Arc<[LogRecord]>,
}

impl Session {
    pub fn meta(&self) -> SessionMeta {
        SessionMeta::collect(&self.id, &self.filename, &self.created_at, &self.records)
    }
}

/// Process-local upload sessions. Nothing is written to disk.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_session(&self, filename: &str, records: Vec<LogRecord>) -> Arc<Session> {
        let session = Arc::new(Session {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            created_at: now_iso(),
            records: Arc::from(records),
        });

        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id.clone(), Arc::clone(&session));

        info!("Created session {} with {} records", session.id, session.records.len());
        session
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        let session = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned();
        debug!("Session lookup {}: found={}", session_id, session.is_some());
        session
    }

    /// Returns false if there was no such session.
    pub fn delete_session(&self, session_id: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some();
        if removed {
            info!("Deleted session {}", session_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
