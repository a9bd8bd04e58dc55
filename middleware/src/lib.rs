//! Request pipeline integration for sessionkit
//!
//! [`SessionLayer`] is a tower layer that resumes or starts the session for every
//! request, exposes [`sessionkit_session::Session`] and [`sessionkit_session::SessionData`]
//! as request extensions, and writes the session back together with its cookie.
//! The `http_server` module wires it into a small axum application.

pub mod cookies;
pub mod http_server;
pub mod layer;

pub use layer::{SessionLayer, SessionService};
