//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span with method, uri, status, latency)
//! 3. Request ID (correlate logs, Sentry events and responses)

pub mod request_id;

pub use request_id::{RequestId, request_id_middleware};
