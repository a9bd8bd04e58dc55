//! Blob manipulation shared by the flash and session data helpers.
//!
//! A blob is an insertion-ordered JSON object. Everything here operates on
//! owned maps; callers decide where the result is written back.

use crate::errors::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key/value storage persisted for one session
pub type Blob = Map<String, Value>;

/// How incoming values are combined with the existing ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Nested mappings are merged key by key; everything else is replaced.
    #[default]
    Recursive,
    /// Every incoming top-level value replaces the existing one.
    Shallow,
}

/// Merge `incoming` into `base` using the given mode.
pub fn merge(base: &mut Blob, incoming: Blob, mode: MergeMode) {
    match mode {
        MergeMode::Recursive => deep_merge(base, incoming),
        MergeMode::Shallow => shallow_merge(base, incoming),
    }
}

/// Recursive merge where only mapping-against-mapping recurses.
///
/// Sequences are atomic: an incoming sequence replaces the existing value
/// wholesale and is never concatenated or merged by index. Keys already in
/// `base` keep their position, new keys are appended in `incoming` order.
pub fn deep_merge(base: &mut Blob, incoming: Blob) {
    for (key, value) in incoming {
        match base.get_mut(&key) {
            Some(Value::Object(existing)) if value.is_object() => {
                if let Value::Object(nested) = value {
                    deep_merge(existing, nested);
                }
            }
            Some(slot) => *slot = value,
            None => {
                base.insert(key, value);
            }
        }
    }
}

/// Top-level replace, no recursion into nested mappings.
pub fn shallow_merge(base: &mut Blob, incoming: Blob) {
    for (key, value) in incoming {
        base.insert(key, value);
    }
}

/// Whether a value counts as empty: null, false, zero, or an empty string,
/// sequence or mapping. An absent value (`None`) is empty as well.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f == 0.0),
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
    }
}

/// Remove `key` while keeping the order of the remaining entries.
pub fn remove_key(map: &mut Blob, key: &str) -> Option<Value> {
    map.shift_remove(key)
}

/// Append `value` to the sequence stored at `key`.
///
/// An absent key starts a new sequence. Any other present value, `null`
/// included, is rejected with [`SessionError::NotASequence`].
pub fn push_value(map: &mut Blob, key: &str, value: Value) -> SessionResult<()> {
    match map.get_mut(key) {
        Some(Value::Array(items)) => {
            items.push(value);
            Ok(())
        }
        Some(_) => Err(SessionError::NotASequence {
            key: key.to_string(),
        }),
        None => {
            map.insert(key.to_string(), Value::Array(vec![value]));
            Ok(())
        }
    }
}

/// Interpret a stored value as a mapping; anything else yields an empty one.
pub fn as_blob(value: Option<&Value>) -> Blob {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => Blob::new(),
    }
}
