//! User profile domain type.

use localmart_core::{CustomerId, UserId};

/// A buyer's profile as far as payments are concerned.
///
/// `stripe_customer_id` caches the gateway customer created for this user the
/// first time they save a payment method. At most one is ever recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// User this profile belongs to.
    pub id: UserId,
    /// Gateway customer holding the user's saved payment methods.
    pub stripe_customer_id: Option<CustomerId>,
}
