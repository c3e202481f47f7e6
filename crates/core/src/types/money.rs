//! Type-safe monetary amounts using decimal arithmetic.
//!
//! Amounts are carried in the currency's standard unit (dollars, not cents) and
//! converted to the gateway's smallest currency unit only at the boundary.
//! Conversion rounds half away from zero, which for the positive amounts the
//! checkout produces is the familiar "round half up".

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Basis points in one whole (100%).
const BASIS_POINTS_PER_UNIT: i64 = 10_000;

/// Errors produced when converting monetary amounts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Charges must be strictly positive.
    #[error("amount must be greater than zero (got {0})")]
    NotPositive(Decimal),

    /// The amount does not fit into the gateway's integer representation.
    #[error("amount {0} is too large")]
    Overflow(Decimal),

    /// Currency code not supported by the storefront.
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),
}

/// A monetary amount with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: CurrencyCode,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub const fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// Convert to the smallest currency unit (e.g., cents).
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::NotPositive` for zero or negative amounts and
    /// `MoneyError::Overflow` if the result does not fit in an `i64`.
    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        if self.amount <= Decimal::ZERO {
            return Err(MoneyError::NotPositive(self.amount));
        }

        let factor = Decimal::from(self.currency.minor_unit_factor());
        self.amount
            .checked_mul(factor)
            .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|rounded| rounded.to_i64())
            .ok_or(MoneyError::Overflow(self.amount))
            .and_then(|minor| {
                if minor == 0 {
                    Err(MoneyError::NotPositive(self.amount))
                } else {
                    Ok(minor)
                }
            })
    }
}

/// Compute a platform fee on an amount already expressed in minor units.
///
/// The fee is `minor_units × basis_points / 10_000`, rounded the same way as
/// [`Money::to_minor_units`]. 500 basis points is 5%.
#[must_use]
pub fn application_fee(minor_units: i64, basis_points: u32) -> i64 {
    let fee = Decimal::from(minor_units) * Decimal::from(basis_points)
        / Decimal::from(BASIS_POINTS_PER_UNIT);
    fee.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(i64::MAX)
}

/// ISO 4217 currency codes accepted by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
    JPY,
}

impl CurrencyCode {
    /// Number of minor units in one standard unit.
    #[must_use]
    pub const fn minor_unit_factor(self) -> i64 {
        match self {
            Self::JPY => 1,
            Self::USD | Self::EUR | Self::GBP | Self::CAD | Self::AUD => 100,
        }
    }

    /// Lowercase code as expected by the payment gateway.
    #[must_use]
    pub const fn gateway_code(self) -> &'static str {
        match self {
            Self::USD => "usd",
            Self::EUR => "eur",
            Self::GBP => "gbp",
            Self::CAD => "cad",
            Self::AUD => "aud",
            Self::JPY => "jpy",
        }
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.gateway_code().to_ascii_uppercase())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::USD),
            "eur" => Ok(Self::EUR),
            "gbp" => Ok(Self::GBP),
            "cad" => Ok(Self::CAD),
            "aud" => Ok(Self::AUD),
            "jpy" => Ok(Self::JPY),
            other => Err(MoneyError::UnsupportedCurrency(other.to_owned())),
        }
    }
}
