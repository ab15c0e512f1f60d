//! The aspree API boundary: typed identifiers, status sum types, persistent
//! entity models, request/response models, and the serializable error types
//! shared between the domain crates and the HTTP server.
//!
//! Everything here is "shape", not behavior. Internal field names are Rust
//! snake_case; the JSON boundary is camelCase via serde renames, and the
//! storage boundary is snake_case columns mapped explicitly in the store.

/// Persistent entity models.
pub mod entities;
/// Serializable error kinds, HTTP status mapping, response envelope.
pub mod error;
/// Request / response models.
pub mod models;
/// Identifier newtypes, status enums, money and phone helpers.
pub mod types;
