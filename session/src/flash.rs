//! Flash messages: values that are readable exactly one request after they were set.
//!
//! Two generations share one blob entry. On construction the entry is copied into
//! the read-only `old` generation and then reset, so everything written through
//! the `*_new` methods becomes the `old` generation of the next request.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sessionkit_core::blob::{self, Blob, MergeMode};
use sessionkit_core::{not_started, SessionResult, DEFAULT_FLASH_KEY};
use tracing::debug;

use crate::host::Session;

/// Flash message helper for the current request
#[derive(Debug, Clone)]
pub struct FlashStore {
    session: Session,
    key: String,
    /// Messages set in the previous request
    messages: Blob,
}

impl FlashStore {
    /// Capture the previous generation stored at `key` and start an empty one.
    ///
    /// Fails with `NotStarted` when the session is not active.
    pub fn new(session: Session, key: impl Into<String>) -> SessionResult<Self> {
        let key = key.into();
        let messages = session.with_blob_mut(|blob| {
            let previous = blob::as_blob(blob.get(&key));
            blob.insert(key.clone(), Value::Object(Blob::new()));
            previous
        })?;

        debug!(key = %key, carried = messages.len(), "Flash messages loaded");
        Ok(Self {
            session,
            key,
            messages,
        })
    }

    /// Same as [`FlashStore::new`] with the default `_flashMessages` key
    pub fn with_default_key(session: Session) -> SessionResult<Self> {
        Self::new(session, DEFAULT_FLASH_KEY)
    }

    /// Blob key holding the new generation
    pub fn key(&self) -> &str {
        &self.key
    }

    fn ensure_active(&self) -> SessionResult<()> {
        if self.session.is_active() {
            Ok(())
        } else {
            Err(not_started())
        }
    }

    /// Get a flash message set in the previous request
    pub fn get(&self, key: &str) -> SessionResult<Option<Value>> {
        self.ensure_active()?;
        Ok(self.messages.get(key).cloned())
    }

    /// Get a flash message, or `default` when the key doesn't exist
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> SessionResult<Value> {
        Ok(self.get(key)?.unwrap_or_else(|| default.into()))
    }

    /// Get a flash message deserialized into `T`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> SessionResult<Option<T>> {
        self.get(key)?
            .map(|value| serde_json::from_value(value).map_err(Into::into))
            .transpose()
    }

    /// Check whether a flash message exists
    pub fn exists(&self, key: &str) -> SessionResult<bool> {
        self.ensure_active()?;
        Ok(self.messages.contains_key(key))
    }

    /// Check whether a flash message is empty or missing
    pub fn empty(&self, key: &str) -> SessionResult<bool> {
        self.ensure_active()?;
        Ok(blob::is_empty_value(self.messages.get(key)))
    }

    /// Flash messages set in the previous request
    pub fn to_map(&self) -> SessionResult<Blob> {
        self.ensure_active()?;
        Ok(self.messages.clone())
    }

    /// Call `f(value, key)` for every flash message of the previous request
    pub fn each<F>(&self, mut f: F) -> SessionResult<()>
    where
        F: FnMut(&Value, &str),
    {
        self.ensure_active()?;
        for (key, value) in &self.messages {
            f(value, key);
        }
        Ok(())
    }

    /// Set a new flash message, replacing any existing one
    pub fn set_new(&self, key: &str, value: impl Into<Value>) -> SessionResult<&Self> {
        let value = value.into();
        self.session.with_entry_mut(&self.key, |messages| {
            messages.insert(key.to_string(), value);
        })?;
        Ok(self)
    }

    /// Set a new flash message unless the key already exists
    pub fn set_new_if_absent(&self, key: &str, value: impl Into<Value>) -> SessionResult<&Self> {
        let value = value.into();
        self.session.with_entry_mut(&self.key, |messages| {
            if !messages.contains_key(key) {
                messages.insert(key.to_string(), value);
            }
        })?;
        Ok(self)
    }

    /// Serialize `value` and set it as a new flash message
    pub fn set_new_as<T: Serialize>(&self, key: &str, value: &T) -> SessionResult<&Self> {
        self.set_new(key, serde_json::to_value(value)?)
    }

    /// Check whether a new flash message exists
    pub fn exists_new(&self, key: &str) -> SessionResult<bool> {
        self.session
            .with_entry(&self.key, |messages| messages.contains_key(key))
    }

    /// Check whether a new flash message is empty or missing
    pub fn empty_new(&self, key: &str) -> SessionResult<bool> {
        self.session
            .with_entry(&self.key, |messages| blob::is_empty_value(messages.get(key)))
    }

    /// Get a new flash message
    pub fn get_new(&self, key: &str) -> SessionResult<Option<Value>> {
        self.session
            .with_entry(&self.key, |messages| messages.get(key).cloned())
    }

    /// Get a new flash message, or `default` when the key doesn't exist
    pub fn get_new_or(&self, key: &str, default: impl Into<Value>) -> SessionResult<Value> {
        Ok(self.get_new(key)?.unwrap_or_else(|| default.into()))
    }

    /// Get a new flash message deserialized into `T`
    pub fn get_new_as<T: DeserializeOwned>(&self, key: &str) -> SessionResult<Option<T>> {
        self.get_new(key)?
            .map(|value| serde_json::from_value(value).map_err(Into::into))
            .transpose()
    }

    /// Delete a new flash message; missing keys are ignored
    pub fn delete_new(&self, key: &str) -> SessionResult<&Self> {
        self.session.with_entry_mut(&self.key, |messages| {
            blob::remove_key(messages, key);
        })?;
        Ok(self)
    }

    /// Append a value to the sequence stored at `key`.
    ///
    /// Fails with `NotASequence` when the key holds anything but a sequence.
    pub fn push_new(&self, key: &str, value: impl Into<Value>) -> SessionResult<&Self> {
        let value = value.into();
        self.session
            .with_entry_mut(&self.key, |messages| blob::push_value(messages, key, value))??;
        Ok(self)
    }

    /// Merge several new flash messages at once
    pub fn merge_new(&self, messages: Blob, mode: MergeMode) -> SessionResult<&Self> {
        self.session.with_entry_mut(&self.key, |current| {
            blob::merge(current, messages, mode);
        })?;
        Ok(self)
    }

    /// New flash messages set in this request
    pub fn to_map_new(&self) -> SessionResult<Blob> {
        self.session.with_entry(&self.key, Blob::clone)
    }

    /// Call `f(value, key)` for every new flash message
    pub fn each_new<F>(&self, mut f: F) -> SessionResult<()>
    where
        F: FnMut(&Value, &str),
    {
        // Iterate a snapshot so `f` may call back into this helper
        let messages = self.to_map_new()?;
        for (key, value) in &messages {
            f(value, key);
        }
        Ok(())
    }

    /// Apply a callback to the flash helper
    pub fn apply<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        f(self)
    }
}
