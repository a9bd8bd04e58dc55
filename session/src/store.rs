use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sessionkit_core::{Blob, SessionResult};

/// Session record as persisted between requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session identifier
    pub id: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Last time the session was accessed or modified
    pub updated_at: DateTime<Utc>,
    /// Optional time when the session expires
    pub expires_at: Option<DateTime<Utc>>,
    /// The session blob
    pub data: Blob,
}

impl SessionRecord {
    /// Create a new record with the given ID and an empty blob
    pub fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            expires_at: None,
            data: Blob::new(),
        }
    }

    /// Check if the record has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check if the record is expired at the given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }

    /// Set the expiration time for this record
    pub fn set_expiry(&mut self, expires_at: DateTime<Utc>) {
        self.expires_at = Some(expires_at);
        self.updated_at = Utc::now();
    }
}

/// Trait defining the interface for session stores
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    /// Get a live record by ID; expired records count as missing
    async fn get_session(&self, id: &str) -> SessionResult<SessionRecord>;

    /// Save changes to a record
    async fn save_session(&self, record: SessionRecord) -> SessionResult<()>;

    /// Delete a record by ID
    async fn delete_session(&self, id: &str) -> SessionResult<()>;

    /// Delete expired records
    async fn cleanup_expired_sessions(&self) -> SessionResult<usize>;

    /// List all live records
    async fn list_sessions(&self) -> SessionResult<Vec<SessionRecord>>;

    /// Apply store-specific tuning knobs. Unknown knobs are ignored.
    fn configure(&self, _settings: &Map<String, Value>) -> SessionResult<()> {
        Ok(())
    }
}

/// Type alias for Arc-wrapped SessionStore trait objects
pub type SessionStoreRef = Arc<dyn SessionStore>;
