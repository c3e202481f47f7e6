//! Localmart storefront library.
//!
//! Payment orchestration for the marketplace checkout (intent creation,
//! confirmation, saved payment methods) and the seller-attribution repair
//! used by the maintenance CLI. The binary in `main.rs` serves the JSON API.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod stripe;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
