//! Money in integer micro-units
//!
//! All budget arithmetic uses [`Micros`], a signed 64-bit count of one
//! millionth of the accounting currency. No floating point anywhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

use crate::error::TypeError;

/// Micro-units per whole currency unit
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// An amount of money in micro-units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Micros(pub i64);

impl Micros {
    pub const ZERO: Micros = Micros(0);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Whole currency units, e.g. `Micros::from_units(10)` is 10_000_000 micros
    pub const fn from_units(units: i64) -> Self {
        Self(units * MICROS_PER_UNIT)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Micros) -> Result<Micros, TypeError> {
        self.0
            .checked_add(other.0)
            .map(Micros)
            .ok_or(TypeError::AmountOverflow)
    }

    pub fn checked_sub(self, other: Micros) -> Result<Micros, TypeError> {
        self.0
            .checked_sub(other.0)
            .map(Micros)
            .ok_or(TypeError::AmountOverflow)
    }

    /// Subtraction floored at zero
    pub fn saturating_sub_floor(self, other: Micros) -> Micros {
        Micros(self.0.saturating_sub(other.0).max(0))
    }

    /// Fail unless the amount is strictly positive
    pub fn ensure_positive(self, field: &str) -> Result<Micros, TypeError> {
        if self.0 > 0 {
            Ok(self)
        } else {
            Err(TypeError::InvalidAmount {
                field: field.to_string(),
                reason: "must be greater than zero".to_string(),
            })
        }
    }

    /// Fail if the amount is negative
    pub fn ensure_non_negative(self, field: &str) -> Result<Micros, TypeError> {
        if self.0 >= 0 {
            Ok(self)
        } else {
            Err(TypeError::InvalidAmount {
                field: field.to_string(),
                reason: "must not be negative".to_string(),
            })
        }
    }
}

impl Add for Micros {
    type Output = Micros;

    fn add(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Micros {
    type Output = Micros;

    fn sub(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_sub(rhs.0))
    }
}

impl From<i64> for Micros {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Micros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let unit = MICROS_PER_UNIT as u64;
        write!(f, "{}{}.{:06}", sign, abs / unit, abs % unit)
    }
}
