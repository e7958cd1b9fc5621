//! Shared types for the ajo savings-pool service
//!
//! Domain models, request/response payloads and the unified error
//! system used by the server and its API clients.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};
