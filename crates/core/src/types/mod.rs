//! Core types for Localmart.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod money;
pub mod status;

pub use id::*;
pub use money::{CurrencyCode, Money, MoneyError, application_fee};
pub use status::*;
