//! The host session: lifecycle state, identity, cookie parameters and the blob.
//!
//! A [`Session`] is a cheap, cloneable handle. Every clone observes the same
//! state, so the request pipeline, the flash helper and the session data
//! helper can each hold one without aliasing the blob itself: all reads and
//! writes go through the methods below.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sessionkit_core::{
    not_started, Blob, CookieOptions, SessionError, SessionOptions, SessionResult,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::SessionRecord;

/// Lifecycle of a host session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    Active,
    Destroyed,
}

/// What the request pipeline has to persist once the request is done
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// The session is active and its record must be saved.
    Save {
        record: SessionRecord,
        /// A record that was replaced by id regeneration and must be deleted.
        stale_id: Option<String>,
        /// The client does not know this id yet.
        issue_cookie: bool,
    },
    /// The session was destroyed during the request.
    Delete { id: String },
    /// Nothing was started.
    Untouched,
}

#[derive(Debug)]
struct SessionState {
    status: SessionStatus,
    options: SessionOptions,
    id: Option<String>,
    /// Id the client presented, if it was resumed from the store
    client_id: Option<String>,
    stale_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    blob: Blob,
}

/// Handle to the session of the current request
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<RwLock<SessionState>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl Session {
    /// Create a handle that has not been started yet
    pub fn new(options: SessionOptions) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState {
                status: SessionStatus::NotStarted,
                options,
                id: None,
                client_id: None,
                stale_id: None,
                created_at: None,
                blob: Blob::new(),
            })),
        }
    }

    // The state is plain data, a panic elsewhere cannot leave it half-updated
    // in a way later readers could not cope with.
    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state
    pub fn status(&self) -> SessionStatus {
        self.read().status
    }

    /// Whether the session is active
    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::Active
    }

    /// Start a fresh session with a new id and an empty blob
    pub fn start(&self) -> SessionResult<bool> {
        let mut state = self.write();
        if state.status == SessionStatus::Active {
            return Err(SessionError::AlreadyStarted(
                "Session start failed. Session already started.".to_string(),
            ));
        }

        // A session destroyed earlier in this request leaves its record behind
        if state.status == SessionStatus::Destroyed {
            if let Some(previous) = state.client_id.take() {
                state.stale_id = Some(previous);
            }
        }

        let id = generate_id();
        info!(session_id = %id, name = %state.options.name, "Session started");
        state.id = Some(id);
        state.created_at = Some(Utc::now());
        state.blob = Blob::new();
        state.status = SessionStatus::Active;
        Ok(true)
    }

    /// Start the session from a previously persisted record
    pub fn resume(&self, record: SessionRecord) -> SessionResult<bool> {
        let mut state = self.write();
        if state.status == SessionStatus::Active {
            return Err(SessionError::AlreadyStarted(
                "Session start failed. Session already started.".to_string(),
            ));
        }

        debug!(session_id = %record.id, "Session resumed");
        state.client_id = Some(record.id.clone());
        state.id = Some(record.id);
        state.created_at = Some(record.created_at);
        state.blob = record.data;
        state.status = SessionStatus::Active;
        Ok(true)
    }

    /// Destroy the session and drop its blob
    pub fn destroy(&self) -> SessionResult<bool> {
        let mut state = self.write();
        if state.status != SessionStatus::Active {
            return Err(SessionError::NotStarted(
                "Session destroy failed. Session not started yet.".to_string(),
            ));
        }

        info!(session_id = ?state.id, "Session destroyed");
        state.blob = Blob::new();
        state.status = SessionStatus::Destroyed;
        Ok(true)
    }

    /// Session id
    pub fn id(&self) -> SessionResult<String> {
        let state = self.read();
        match (&state.status, &state.id) {
            (SessionStatus::Active, Some(id)) => Ok(id.clone()),
            _ => Err(SessionError::NotStarted(
                "Session id does not exists. Session not started yet.".to_string(),
            )),
        }
    }

    /// Replace the session id, keeping the blob.
    ///
    /// With `delete_old` the record stored under the previous id is removed
    /// when the request finishes.
    pub fn regenerate_id(&self, delete_old: bool) -> SessionResult<String> {
        let mut state = self.write();
        if state.status != SessionStatus::Active {
            return Err(SessionError::NotStarted(
                "Generate session id failed. Session not started yet.".to_string(),
            ));
        }

        let id = generate_id();
        debug!(session_id = %id, previous = ?state.id, delete_old, "Session id regenerated");
        state.id = Some(id.clone());
        if delete_old {
            if let Some(previous) = state.client_id.take() {
                state.stale_id = Some(previous);
            }
        }
        Ok(id)
    }

    /// Session (cookie) name
    pub fn name(&self) -> SessionResult<String> {
        let state = self.read();
        if state.status != SessionStatus::Active {
            return Err(SessionError::NotStarted(
                "Session name does not exists. Session not started yet.".to_string(),
            ));
        }
        Ok(state.options.name.clone())
    }

    /// Change the session name; only allowed before the session starts
    pub fn set_name(&self, name: impl Into<String>) -> SessionResult<()> {
        let mut state = self.write();
        if state.status == SessionStatus::Active {
            return Err(SessionError::AlreadyStarted(
                "Set session name failed. Session already started.".to_string(),
            ));
        }
        state.options.name = name.into();
        Ok(())
    }

    /// Cookie parameters
    pub fn cookie_options(&self) -> CookieOptions {
        self.read().options.cookie.clone()
    }

    /// Change the cookie parameters; only allowed before the session starts
    pub fn set_cookie_options(&self, cookie: CookieOptions) -> SessionResult<()> {
        let mut state = self.write();
        if state.status == SessionStatus::Active {
            return Err(SessionError::AlreadyStarted(
                "Set cookie parameters failed. Session already started.".to_string(),
            ));
        }
        state.options.cookie = cookie;
        Ok(())
    }

    /// Lifetime in seconds
    pub fn lifetime(&self) -> u64 {
        self.read().options.lifetime
    }

    /// Options the session was created with
    pub fn options(&self) -> SessionOptions {
        self.read().options.clone()
    }

    /// Copy of the whole blob
    pub fn blob(&self) -> SessionResult<Blob> {
        self.with_blob(Blob::clone)
    }

    /// Read access to the blob; fails when the session is not active
    pub fn with_blob<R>(&self, f: impl FnOnce(&Blob) -> R) -> SessionResult<R> {
        let state = self.read();
        if state.status != SessionStatus::Active {
            return Err(not_started());
        }
        Ok(f(&state.blob))
    }

    /// Write access to the blob; fails when the session is not active
    pub fn with_blob_mut<R>(&self, f: impl FnOnce(&mut Blob) -> R) -> SessionResult<R> {
        let mut state = self.write();
        if state.status != SessionStatus::Active {
            return Err(not_started());
        }
        Ok(f(&mut state.blob))
    }

    /// Read access to the mapping stored at `key`. A missing or non-mapping
    /// entry reads as empty.
    pub(crate) fn with_entry<R>(&self, key: &str, f: impl FnOnce(&Blob) -> R) -> SessionResult<R> {
        self.with_blob(|blob| match blob.get(key) {
            Some(Value::Object(entry)) => f(entry),
            _ => f(&Blob::new()),
        })
    }

    /// Write access to the mapping stored at `key`, creating it when missing
    /// and replacing any non-mapping value.
    pub(crate) fn with_entry_mut<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut Blob) -> R,
    ) -> SessionResult<R> {
        self.with_blob_mut(|blob| {
            let mut entry = match blob.get_mut(key) {
                Some(Value::Object(entry)) => std::mem::take(entry),
                _ => Blob::new(),
            };
            let result = f(&mut entry);
            blob.insert(key.to_string(), Value::Object(entry));
            result
        })
    }

    /// Decide what has to be persisted for this request
    pub fn outcome(&self) -> SessionOutcome {
        let state = self.read();
        match (state.status, &state.id) {
            (SessionStatus::Active, Some(id)) => {
                let now = Utc::now();
                let expires_at = expiry_from(now, state.options.lifetime);
                let record = SessionRecord {
                    id: id.clone(),
                    created_at: state.created_at.unwrap_or(now),
                    updated_at: now,
                    expires_at,
                    data: state.blob.clone(),
                };
                SessionOutcome::Save {
                    record,
                    stale_id: state.stale_id.clone(),
                    issue_cookie: state.client_id.as_deref() != Some(id.as_str()),
                }
            }
            (SessionStatus::Destroyed, Some(_)) => {
                match state.client_id.as_ref().or(state.stale_id.as_ref()) {
                    Some(persisted) => SessionOutcome::Delete {
                        id: persisted.clone(),
                    },
                    // Never persisted
                    None => SessionOutcome::Untouched,
                }
            }
            _ => SessionOutcome::Untouched,
        }
    }
}

/// Expiry of a record saved at `now`; a lifetime of 0 never expires
fn expiry_from(now: DateTime<Utc>, lifetime: u64) -> Option<DateTime<Utc>> {
    if lifetime == 0 {
        return None;
    }
    let seconds = i64::try_from(lifetime).unwrap_or(i64::MAX).min(i64::MAX / 1000);
    now.checked_add_signed(Duration::seconds(seconds))
}

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
