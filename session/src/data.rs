use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sessionkit_core::blob::{self, Blob, MergeMode};
use sessionkit_core::{SessionResult, DEFAULT_DATA_KEY};
use tracing::debug;

use crate::flash::FlashStore;
use crate::host::Session;

/// Persistent session values, stored under one blob key
#[derive(Debug, Clone)]
pub struct SessionData {
    session: Session,
    flash: FlashStore,
    key: String,
}

impl SessionData {
    /// Bind to the mapping at `key`, creating it when missing.
    ///
    /// Fails with `NotStarted` when the session is not active.
    pub fn new(session: Session, flash: FlashStore, key: impl Into<String>) -> SessionResult<Self> {
        let key = key.into();
        // Touching the entry creates it (or replaces a non-mapping value)
        session.with_entry_mut(&key, |_| ())?;

        Ok(Self {
            session,
            flash,
            key,
        })
    }

    /// Same as [`SessionData::new`] with the default `_sessionData` key
    pub fn with_default_key(session: Session, flash: FlashStore) -> SessionResult<Self> {
        Self::new(session, flash, DEFAULT_DATA_KEY)
    }

    /// Build the flash helper and the session data helper for a request,
    /// using the keys from the session options. The flash helper is built
    /// first so it captures the previous generation.
    pub fn attach(session: Session) -> SessionResult<Self> {
        let options = session.options();
        let flash = FlashStore::new(session.clone(), options.flash_key)?;
        let data = Self::new(session, flash, options.data_key)?;
        debug!(key = %data.key, "Session data attached");
        Ok(data)
    }

    /// Get the flash helper
    pub fn flash(&self) -> &FlashStore {
        &self.flash
    }

    /// Get the host session handle
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Blob key holding the session values
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get a session value
    pub fn get(&self, key: &str) -> SessionResult<Option<Value>> {
        self.session
            .with_entry(&self.key, |data| data.get(key).cloned())
    }

    /// Get a session value, or `default` when the key doesn't exist
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> SessionResult<Value> {
        Ok(self.get(key)?.unwrap_or_else(|| default.into()))
    }

    /// Get a session value deserialized into `T`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> SessionResult<Option<T>> {
        self.get(key)?
            .map(|value| serde_json::from_value(value).map_err(Into::into))
            .transpose()
    }

    /// Check whether a session value exists
    pub fn exists(&self, key: &str) -> SessionResult<bool> {
        self.session
            .with_entry(&self.key, |data| data.contains_key(key))
    }

    /// Check whether a session value is empty or missing
    pub fn empty(&self, key: &str) -> SessionResult<bool> {
        self.session
            .with_entry(&self.key, |data| blob::is_empty_value(data.get(key)))
    }

    /// Set a session value, replacing any existing one
    pub fn set(&self, key: &str, value: impl Into<Value>) -> SessionResult<&Self> {
        let value = value.into();
        self.session.with_entry_mut(&self.key, |data| {
            data.insert(key.to_string(), value);
        })?;
        Ok(self)
    }

    /// Set a session value unless the key already exists
    pub fn set_if_absent(&self, key: &str, value: impl Into<Value>) -> SessionResult<&Self> {
        let value = value.into();
        self.session.with_entry_mut(&self.key, |data| {
            if !data.contains_key(key) {
                data.insert(key.to_string(), value);
            }
        })?;
        Ok(self)
    }

    /// Serialize `value` and store it
    pub fn set_as<T: Serialize>(&self, key: &str, value: &T) -> SessionResult<&Self> {
        self.set(key, serde_json::to_value(value)?)
    }

    /// Delete a session value; missing keys are ignored
    pub fn delete(&self, key: &str) -> SessionResult<&Self> {
        self.session.with_entry_mut(&self.key, |data| {
            blob::remove_key(data, key);
        })?;
        Ok(self)
    }

    /// Merge several session values at once
    pub fn merge(&self, values: Blob, mode: MergeMode) -> SessionResult<&Self> {
        self.session.with_entry_mut(&self.key, |data| {
            blob::merge(data, values, mode);
        })?;
        Ok(self)
    }

    /// Append a value to the sequence stored at `key`.
    ///
    /// Fails with `NotASequence` when the key holds anything but a sequence.
    pub fn push(&self, key: &str, value: impl Into<Value>) -> SessionResult<&Self> {
        let value = value.into();
        self.session
            .with_entry_mut(&self.key, |data| blob::push_value(data, key, value))??;
        Ok(self)
    }

    /// All session values
    pub fn to_map(&self) -> SessionResult<Blob> {
        self.session.with_entry(&self.key, Blob::clone)
    }

    /// Call `f(value, key)` for every session value
    pub fn each<F>(&self, mut f: F) -> SessionResult<()>
    where
        F: FnMut(&Value, &str),
    {
        let data = self.to_map()?;
        for (key, value) in &data {
            f(value, key);
        }
        Ok(())
    }

    /// Apply a callback to the session data
    pub fn apply<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        f(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use sessionkit_core::{SessionError, SessionOptions};

    fn fixture() -> Value {
        json!({
            "a": "A",
            "b": {"b-a": "b-A", "b-b": "b-B"},
            "c": ["c-A", "c-B"],
            "d": null
        })
    }

    fn map(value: Value) -> Blob {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    fn setup() -> SessionData {
        let session = Session::default();
        session.start().unwrap();
        session
            .with_blob_mut(|blob| {
                blob.insert(DEFAULT_DATA_KEY.to_string(), fixture());
            })
            .unwrap();
        SessionData::attach(session).unwrap()
    }

    #[test]
    fn test_requires_active_session() {
        let session = Session::default();
        session.start().unwrap();
        let flash = FlashStore::with_default_key(session.clone()).unwrap();
        session.destroy().unwrap();

        let err = SessionData::with_default_key(session, flash).unwrap_err();
        assert!(err.is_not_started());
        assert_eq!(err.to_string(), "Session not started yet.");
    }

    #[test]
    fn test_initializes_missing_entry() {
        let session = Session::default();
        session.start().unwrap();
        let data = SessionData::attach(session.clone()).unwrap();

        assert!(data.to_map().unwrap().is_empty());
        assert_eq!(session.blob().unwrap()[DEFAULT_DATA_KEY], json!({}));
    }

    #[test]
    fn test_get() {
        let data = setup();
        assert_eq!(data.get("a").unwrap(), Some(json!("A")));
        assert_eq!(data.get("z").unwrap(), None);
        assert_eq!(data.get_or("z", "default").unwrap(), json!("default"));
    }

    #[test]
    fn test_exists() {
        let data = setup();
        assert!(data.exists("a").unwrap());
        assert!(!data.exists("z").unwrap());
    }

    #[test]
    fn test_empty() {
        let data = setup();
        assert!(data.empty("d").unwrap());
        assert!(!data.empty("a").unwrap());
    }

    #[test]
    fn test_set() {
        let data = setup();
        data.set("e", "E").unwrap();
        assert_eq!(data.get("e").unwrap(), Some(json!("E")));

        data.set_if_absent("f", "F").unwrap();
        data.set_if_absent("f", "SpecialF").unwrap();
        assert_eq!(data.get("f").unwrap(), Some(json!("F")));
    }

    #[test]
    fn test_typed_values() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Cart {
            items: Vec<u32>,
            coupon: Option<String>,
        }

        let data = setup();
        let cart = Cart {
            items: vec![3, 5],
            coupon: None,
        };
        data.set_as("cart", &cart).unwrap();

        assert_eq!(data.get_as::<Cart>("cart").unwrap(), Some(cart));
        assert_eq!(data.get_as::<Cart>("missing").unwrap(), None);
        assert!(matches!(data.get_as::<Cart>("a"), Err(SessionError::Json(_))));
    }

    #[test]
    fn test_delete() {
        let data = setup();
        data.delete("a").unwrap();
        assert!(!data.exists("a").unwrap());
        data.delete("a").unwrap();
    }

    #[test]
    fn test_push() {
        let data = setup();
        data.push("c", "c-C").unwrap();
        assert_eq!(data.get("c").unwrap(), Some(json!(["c-A", "c-B", "c-C"])));
    }

    #[test]
    fn test_push_on_scalar_fails() {
        let data = setup();
        data.set("a", "not a list").unwrap();

        let err = data.push("a", "A").unwrap_err();
        assert!(matches!(err, SessionError::NotASequence { ref key } if key == "a"));
        assert!(err.to_string().contains("\"a\""));
    }

    #[test]
    fn test_push_on_null_fails() {
        let data = setup();
        assert!(matches!(
            data.push("d", "x"),
            Err(SessionError::NotASequence { .. })
        ));
    }

    #[test]
    fn test_merge_recursive() {
        let data = setup();
        data.merge(
            map(json!({
                "a": "SpecialA",
                "b": {"b-a": "Specialb-A", "b-c": "Specialb-C"}
            })),
            MergeMode::Recursive,
        )
        .unwrap();

        assert_eq!(
            Value::Object(data.to_map().unwrap()),
            json!({
                "a": "SpecialA",
                "b": {"b-a": "Specialb-A", "b-b": "b-B", "b-c": "Specialb-C"},
                "c": ["c-A", "c-B"],
                "d": null
            })
        );
    }

    #[test]
    fn test_merge_shallow() {
        let data = setup();
        data.merge(
            map(json!({
                "a": "SpecialA",
                "b": {"b-a": "Specialb-A", "b-c": []}
            })),
            MergeMode::Shallow,
        )
        .unwrap();

        assert_eq!(
            Value::Object(data.to_map().unwrap()),
            json!({
                "a": "SpecialA",
                "b": {"b-a": "Specialb-A", "b-c": []},
                "c": ["c-A", "c-B"],
                "d": null
            })
        );
    }

    #[test]
    fn test_each() {
        let data = setup();
        let snapshot = data.to_map().unwrap();
        let mut visited = 0;
        data.each(|value, key| {
            assert_eq!(snapshot.get(key), Some(value));
            visited += 1;
        })
        .unwrap();
        assert_eq!(visited, 4);
    }

    #[test]
    fn test_apply_with_arguments() {
        let data = setup();
        let suffix = "-applied";
        let result = data.apply(|data| {
            let value = data.get("a").unwrap().unwrap();
            format!("{}{}", value.as_str().unwrap_or_default(), suffix)
        });
        assert_eq!(result, "A-applied");
    }

    #[test]
    fn test_flash_is_exposed() {
        let data = setup();
        data.flash().set_new("msg", "saved").unwrap();
        assert_eq!(data.flash().get_new("msg").unwrap(), Some(json!("saved")));
        assert!(data.exists("a").unwrap());
    }

    #[test]
    fn test_custom_keys_from_options() {
        let mut options = SessionOptions::default();
        options.flash_key = "_flash".to_string();
        options.data_key = "_data".to_string();
        let session = Session::new(options);
        session.start().unwrap();

        let data = SessionData::attach(session.clone()).unwrap();
        data.set("user", 42).unwrap();
        data.flash().set_new("msg", "hi").unwrap();

        let blob = session.blob().unwrap();
        assert_eq!(blob["_data"], json!({"user": 42}));
        assert_eq!(blob["_flash"], json!({"msg": "hi"}));
    }

    #[test]
    fn test_operations_fail_after_destroy() {
        let data = setup();
        data.session().destroy().unwrap();

        assert!(data.get("a").unwrap_err().is_not_started());
        assert!(data.set("a", "A").unwrap_err().is_not_started());
        assert!(data.to_map().unwrap_err().is_not_started());
    }

    #[test]
    fn test_session_data_survives_requests() {
        let session = Session::default();
        session.start().unwrap();
        let data = SessionData::attach(session.clone()).unwrap();
        data.set("visits", 1).unwrap();
        data.flash().set_new("msg", "saved").unwrap();

        let next = SessionData::attach(session).unwrap();
        assert_eq!(next.get("visits").unwrap(), Some(json!(1)));
        assert_eq!(next.flash().get("msg").unwrap(), Some(json!("saved")));
        assert_eq!(next.flash().get_new("msg").unwrap(), None);
    }
}
