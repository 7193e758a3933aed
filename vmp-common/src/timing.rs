//! 16.16 fixed-point timing
//!
//! Decoders report elapsed time as a raw tick counter and describe the
//! stream's time base with a 16.16 fixed-point "time scale". Both values are
//! carried around as [`Fxp`]; seconds are obtained by dividing one by the
//! other.
//!
//! # Examples
//!
//! ```rust
//! use vmp_common::timing::{elapsed_seconds, Fxp};
//!
//! // 600 ticks at a time scale of 600 ticks/second is one second
//! let scale = Fxp::from_int(600);
//! let elapsed = elapsed_seconds(Fxp::from_int(600).raw(), scale);
//! assert_eq!(elapsed, Some(Fxp::ONE));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Number of fractional bits in an [`Fxp`] value
pub const FRACTION_BITS: u32 = 16;

/// Raw representation of 1.0
pub const RAW_ONE: i32 = 1 << FRACTION_BITS;

// ============================================================================
// Fixed-point type
// ============================================================================

/// Signed 16.16 fixed-point number
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Fxp(i32);

impl Fxp {
    pub const ZERO: Fxp = Fxp(0);
    pub const ONE: Fxp = Fxp(RAW_ONE);
    pub const MAX: Fxp = Fxp(i32::MAX);
    pub const MIN: Fxp = Fxp(i32::MIN);

    /// Wrap a raw 16.16 value without conversion
    pub const fn from_raw(raw: i32) -> Self {
        Fxp(raw)
    }

    /// Raw 16.16 value
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Whole number to fixed point
    pub const fn from_int(value: i16) -> Self {
        Fxp((value as i32) << FRACTION_BITS)
    }

    /// Nearest fixed-point value, saturating at the representable range
    pub fn from_f64(value: f64) -> Self {
        let scaled = (value * RAW_ONE as f64).round();
        Fxp(scaled.clamp(i32::MIN as f64, i32::MAX as f64) as i32)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / RAW_ONE as f64
    }

    /// Integer part, rounded toward negative infinity
    pub const fn floor(self) -> i32 {
        self.0 >> FRACTION_BITS
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Division that returns `None` on a zero divisor instead of panicking
    pub fn checked_div(self, rhs: Fxp) -> Option<Fxp> {
        if rhs.0 == 0 {
            return None;
        }
        let quotient = ((self.0 as i64) << FRACTION_BITS) / rhs.0 as i64;
        Some(Fxp(saturate(quotient)))
    }

    /// Non-negative value as a `Duration`; negative values map to zero
    pub fn to_duration(self) -> Duration {
        if self.0 <= 0 {
            return Duration::ZERO;
        }
        let nanos = (self.0 as u128 * 1_000_000_000) >> FRACTION_BITS;
        Duration::from_nanos(nanos as u64)
    }
}

fn saturate(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl Add for Fxp {
    type Output = Fxp;

    fn add(self, rhs: Fxp) -> Fxp {
        Fxp(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Fxp {
    type Output = Fxp;

    fn sub(self, rhs: Fxp) -> Fxp {
        Fxp(self.0.saturating_sub(rhs.0))
    }
}

impl Mul for Fxp {
    type Output = Fxp;

    fn mul(self, rhs: Fxp) -> Fxp {
        Fxp(saturate((self.0 as i64 * rhs.0 as i64) >> FRACTION_BITS))
    }
}

impl Div for Fxp {
    type Output = Fxp;

    /// # Panics
    ///
    /// Panics when `rhs` is zero; use [`Fxp::checked_div`] for untrusted divisors.
    fn div(self, rhs: Fxp) -> Fxp {
        match self.checked_div(rhs) {
            Some(value) => value,
            None => panic!("fixed-point division by zero"),
        }
    }
}

impl From<i16> for Fxp {
    fn from(value: i16) -> Self {
        Fxp::from_int(value)
    }
}

impl fmt::Display for Fxp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.to_f64())
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Convert a decoder's raw elapsed counter to seconds
///
/// The counter is read as a 16.16 value and divided by `time_scale`.
/// Returns `None` when the time scale is not positive (header not read yet).
pub fn elapsed_seconds(elapsed_raw: i32, time_scale: Fxp) -> Option<Fxp> {
    if !time_scale.is_positive() {
        return None;
    }
    Fxp::from_raw(elapsed_raw).checked_div(time_scale)
}
