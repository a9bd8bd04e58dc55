// This crate holds what every sessionkit crate shares:
// - Error types and the result alias
// - Session options and their TOML loading
// - Blob helpers (deep merge, emptiness, sequence push)

// Export errors module - Shared error types
pub mod errors;
pub use errors::*;

// Export config module - Configuration loading
pub mod config;
pub use config::*;

// Export blob module - Blob type and merge engine
pub mod blob;
pub use blob::{Blob, MergeMode};
