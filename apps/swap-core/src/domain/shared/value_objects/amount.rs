//! Fixed-point decimal amount value object.
//!
//! Every monetary or price quantity that crosses a domain boundary is an
//! `Amount`. There is no floating-point representation anywhere in this
//! module; construction always goes through `rust_decimal::Decimal`.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Neg, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::DomainError;

/// Maximum amount accepted for a single swap, DCA execution, or limit order.
///
/// Chosen generously above any realistic retail swap; exists to catch
/// obviously-malformed intents (e.g. a misplaced decimal point) before they
/// reach the aggregator.
const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// A fixed-point decimal amount (source amount, settle amount, price, or
/// balance adjustment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    /// Zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a `Decimal` as an `Amount`.
    #[must_use]
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Parse an amount from its canonical string representation (as stored
    /// in a `TEXT` column).
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidValue` if the string is not a valid
    /// decimal.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        s.parse::<Decimal>()
            .map(Self)
            .map_err(|e| DomainError::InvalidValue {
                field: "amount".to_string(),
                message: format!("'{s}' is not a valid decimal: {e}"),
            })
    }

    /// Get the inner `Decimal`.
    #[must_use]
    pub const fn value(self) -> Decimal {
        self.0
    }

    /// True if strictly greater than zero.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// True if strictly less than zero.
    #[must_use]
    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// True if exactly zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Absolute value.
    #[must_use]
    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// Validate this amount is usable as a swap/DCA/limit-order amount:
    /// strictly positive and below `MAX_AMOUNT`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidValue` if the amount is not positive or
    /// exceeds the maximum.
    pub fn validate_for_order(self) -> Result<(), DomainError> {
        if !self.is_positive() {
            return Err(DomainError::InvalidValue {
                field: "amount".to_string(),
                message: "amount must be strictly positive".to_string(),
            });
        }
        if self.0 > MAX_AMOUNT {
            return Err(DomainError::InvalidValue {
                field: "amount".to_string(),
                message: format!("amount exceeds maximum of {MAX_AMOUNT}"),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Amount {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}
