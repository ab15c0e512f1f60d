//! The aspree domain: merchant-scoped storage, authentication, the invoice
//! lifecycle state machine, customer matching, identifier minting, the
//! payment-gateway adapter, and the process-wide cache / queue / metrics.
//!
//! The HTTP server (`aspreed`) is a thin shell over the services in this
//! crate; everything stateful or invariant-bearing lives here.

/// Registration, login, tokens, password lifecycle.
pub mod auth;
/// In-process TTL cache with hit-rate accounting.
pub mod cache;
/// Payment-gateway adapter and webhook verification.
pub mod gateway;
/// The invoice lifecycle state machine.
pub mod lifecycle;
/// Deterministic + fuzzy customer resolution.
pub mod matcher;
/// Request counters and latency tracking.
pub mod metrics;
/// Collision-free document numbers and access tokens.
pub mod minter;
/// Business settings and logo lifecycle.
pub mod profile;
/// Asynchronous side-effect queue.
pub mod queue;
/// Merchant-scoped persistence. The only module that talks to the database.
pub mod store;
/// Seams for the external collaborators (extractor, notifier, blob host).
pub mod traits;

pub use store::{Store, StoreError};
