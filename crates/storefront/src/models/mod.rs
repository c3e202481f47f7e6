//! Domain models for storefront.
//!
//! These types represent validated domain objects separate from database row
//! types. Gateway-owned records (payment intents, customers) live in
//! [`crate::stripe`] and are only referenced from here by ID.

pub mod order;
pub mod profile;

pub use order::{Order, OrderItem, Product};
pub use profile::UserProfile;
