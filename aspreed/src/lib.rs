//! The aspree invoicing backend server.
//!
//! Thin HTTP shell over `aspree-core`: routing, rate limiting, the bearer
//! auth middleware, file-upload validation, and the response envelope. All
//! invariant-bearing logic lives in the domain crate.

/// CLI arguments and environment configuration.
pub mod config;
/// Extractors: merchant principal, client metadata, enveloped JSON.
pub mod extract;
/// `tracing` initialization.
pub mod logger;
/// Rate limiting, security headers, metrics recording.
pub mod middleware;
/// Route handlers, one module per group.
pub mod routes;
/// Router assembly and the serve loop.
pub mod serve;
/// The service aggregate shared by all handlers.
pub mod state;
/// Upload validation and storage for payment confirmations.
pub mod upload;
