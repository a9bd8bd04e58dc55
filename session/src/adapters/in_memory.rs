use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde_json::{Map, Value};
use sessionkit_core::{SessionError, SessionResult};

use crate::store::{SessionRecord, SessionStore};

/// Ini knob: seconds of inactivity after which a record counts as garbage
pub const GC_MAXLIFETIME: &str = "gc_maxlifetime";

/// In-memory implementation of SessionStore
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    /// Thread-safe storage of records
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    /// Idle lifetime in seconds, 0 when disabled
    gc_maxlifetime: AtomicI64,
}

impl InMemorySessionStore {
    /// Create a new InMemorySessionStore
    pub fn new() -> Self {
        Self::default()
    }

    fn is_stale(&self, record: &SessionRecord, now: DateTime<Utc>) -> bool {
        if record.is_expired_at(now) {
            return true;
        }
        let idle = self.gc_maxlifetime.load(Ordering::Relaxed);
        idle > 0 && now - record.updated_at > Duration::seconds(idle)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_session(&self, id: &str) -> SessionResult<SessionRecord> {
        let sessions = self.sessions.read().map_err(|e| {
            SessionError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;

        let record = sessions
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        // Check if record has expired
        if self.is_stale(&record, Utc::now()) {
            return Err(SessionError::NotFound(format!("Session expired: {}", id)));
        }

        Ok(record)
    }

    async fn save_session(&self, record: SessionRecord) -> SessionResult<()> {
        let mut sessions = self.sessions.write().map_err(|e| {
            SessionError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;

        sessions.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> SessionResult<()> {
        let mut sessions = self.sessions.write().map_err(|e| {
            SessionError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;

        if sessions.remove(id).is_none() {
            return Err(SessionError::NotFound(id.to_string()));
        }

        debug!("Deleted session: {}", id);
        Ok(())
    }

    async fn cleanup_expired_sessions(&self) -> SessionResult<usize> {
        let mut sessions = self.sessions.write().map_err(|e| {
            SessionError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;

        let now = Utc::now();
        let expired_ids: Vec<String> = sessions
            .iter()
            .filter(|(_, record)| self.is_stale(record, now))
            .map(|(id, _)| id.clone())
            .collect();

        let count = expired_ids.len();
        for id in expired_ids {
            sessions.remove(&id);
            debug!("Cleaned up expired session: {}", id);
        }

        if count > 0 {
            warn!("Cleaned up {} expired sessions", count);
        }

        Ok(count)
    }

    async fn list_sessions(&self) -> SessionResult<Vec<SessionRecord>> {
        let sessions = self.sessions.read().map_err(|e| {
            SessionError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;

        let now = Utc::now();
        let active: Vec<SessionRecord> = sessions
            .values()
            .filter(|record| !self.is_stale(record, now))
            .cloned()
            .collect();

        debug!("Listed {} active sessions", active.len());
        Ok(active)
    }

    fn configure(&self, settings: &Map<String, Value>) -> SessionResult<()> {
        if let Some(value) = settings.get(GC_MAXLIFETIME) {
            let seconds = value.as_i64().filter(|s| *s >= 0).ok_or_else(|| {
                SessionError::Config(format!(
                    "{} must be a non-negative integer, got {}",
                    GC_MAXLIFETIME, value
                ))
            })?;
            // Duration::seconds panics beyond this bound
            let seconds = seconds.min(i64::MAX / 1000);
            self.gc_maxlifetime.store(seconds, Ordering::Relaxed);
            debug!("Session gc_maxlifetime set to {}s", seconds);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::test;

    #[test]
    async fn test_save_and_get_session() {
        let store = InMemorySessionStore::new();
        let session_id = "test_session_1".to_string();

        store
            .save_session(SessionRecord::new(session_id.clone()))
            .await
            .unwrap();

        let retrieved = store.get_session(&session_id).await.unwrap();
        assert_eq!(retrieved.id, session_id);
    }

    #[test]
    async fn test_session_blob() {
        let store = InMemorySessionStore::new();
        let session_id = "test_session_2".to_string();

        let mut record = SessionRecord::new(session_id.clone());
        record
            .data
            .insert("_sessionData".to_string(), json!({"key1": "value1"}));
        store.save_session(record).await.unwrap();

        let retrieved = store.get_session(&session_id).await.unwrap();
        assert_eq!(retrieved.data["_sessionData"], json!({"key1": "value1"}));
    }

    #[test]
    async fn test_delete_session() {
        let store = InMemorySessionStore::new();
        let session_id = "test_session_3".to_string();

        store
            .save_session(SessionRecord::new(session_id.clone()))
            .await
            .unwrap();

        // Delete the record
        store.delete_session(&session_id).await.unwrap();

        // Verify it's gone
        let result = store.get_session(&session_id).await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));

        // Deleting twice reports the missing record
        let result = store.delete_session(&session_id).await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[test]
    async fn test_session_expiry() {
        let store = InMemorySessionStore::new();
        let session_id = "test_session_4".to_string();

        let mut record = SessionRecord::new(session_id.clone());

        // Set record to expire in the past
        record.set_expiry(Utc::now() - Duration::seconds(1));
        store.save_session(record).await.unwrap();

        // Verify it's considered expired
        let result = store.get_session(&session_id).await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
        assert!(store.list_sessions().await.unwrap().is_empty());

        // Clean up expired records
        let cleaned = store.cleanup_expired_sessions().await.unwrap();
        assert_eq!(cleaned, 1);
        assert_eq!(store.cleanup_expired_sessions().await.unwrap(), 0);
    }

    #[test]
    async fn test_gc_maxlifetime_expires_idle_records() {
        let store = InMemorySessionStore::new();
        let mut settings = Map::new();
        settings.insert(GC_MAXLIFETIME.to_string(), json!(60));
        store.configure(&settings).unwrap();

        let mut idle = SessionRecord::new("idle".to_string());
        idle.updated_at = Utc::now() - Duration::seconds(120);
        store.save_session(idle).await.unwrap();
        store
            .save_session(SessionRecord::new("fresh".to_string()))
            .await
            .unwrap();

        assert!(store.get_session("idle").await.is_err());
        assert!(store.get_session("fresh").await.is_ok());
        assert_eq!(store.list_sessions().await.unwrap().len(), 1);
        assert_eq!(store.cleanup_expired_sessions().await.unwrap(), 1);
    }

    #[test]
    async fn test_configure_rejects_invalid_gc_maxlifetime() {
        let store = InMemorySessionStore::new();
        let mut settings = Map::new();
        settings.insert(GC_MAXLIFETIME.to_string(), json!("forever"));

        let err = store.configure(&settings).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));

        settings.insert(GC_MAXLIFETIME.to_string(), json!(-5));
        assert!(store.configure(&settings).is_err());

        settings.clear();
        settings.insert("cookie_secure".to_string(), json!(true));
        assert!(store.configure(&settings).is_ok());
    }
}
