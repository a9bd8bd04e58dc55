//! Session management for sessionkit
//!
//! This crate provides the per-request session handle and the two helpers layered on
//! top of its blob: [`FlashStore`] for one-request flash messages and [`SessionData`]
//! for persistent values. Persistence between requests goes through the
//! [`SessionStore`] trait, which can be implemented by different storage backends.

pub mod adapters;
pub mod data;
pub mod flash;
pub mod host;
pub mod store;

pub use adapters::InMemorySessionStore;
pub use data::SessionData;
pub use flash::FlashStore;
pub use host::{Session, SessionOutcome, SessionStatus};
pub use sessionkit_core::{Blob, MergeMode, SessionError, SessionOptions, SessionResult};
pub use store::{SessionRecord, SessionStore, SessionStoreRef};
