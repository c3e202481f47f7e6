//! Business logic services for storefront.
//!
//! # Services
//!
//! - [`payments`] - Payment intents, confirmation, saved payment methods
//! - [`attribution`] - Out-of-band repair of orders missing a seller
//!
//! Services hold borrowed handles (`&dyn PaymentGateway`, `&dyn OrderStore`,
//! ...) and never construct clients themselves.

pub mod attribution;
pub mod payments;
