//! Payment orchestration.
//!
//! - [`PaymentIntentCreator`] - creates intents, with marketplace splits
//! - [`PaymentConfirmationReconciler`] - marks orders paid once the gateway
//!   reports success
//! - [`PaymentMethodVault`] - saves reusable payment methods
//!
//! Services borrow their gateway and store handles; construct them per
//! request from [`crate::state::AppState`].

mod confirmation;
mod error;
mod intent;
mod vault;

pub use confirmation::{ConfirmationOutcome, PaymentConfirmationReconciler};
pub use error::{ErrorKind, PaymentError};
pub use intent::{CreatedIntent, PaymentIntentCreator};
pub use vault::{PaymentMethodVault, SavedPaymentMethod};

use std::fmt::Display;
use std::str::FromStr;

/// Require a non-blank request field.
///
/// # Errors
///
/// Returns `PaymentError::MissingField` if the value is absent or blank.
pub fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, PaymentError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(PaymentError::MissingField(field))
}

/// Require a non-blank request field and parse it.
///
/// # Errors
///
/// Returns `PaymentError::MissingField` if the value is absent or blank, and
/// `PaymentError::InvalidField` if it does not parse.
pub fn parse_required<T>(value: Option<&str>, field: &'static str) -> Result<T, PaymentError>
where
    T: FromStr,
    T::Err: Display,
{
    required(value, field)?
        .parse()
        .map_err(|e: T::Err| PaymentError::InvalidField {
            field,
            reason: e.to_string(),
        })
}
