//! Display rounding as a pluggable policy.
//!
//! The core never rounds stored values. Components that expose display text
//! build a policy from their resolved `displayDigits`/`displayDecimals`
//! settings and format through it.

use crate::value::format_number;

pub trait RoundingPolicy {
    fn round(&self, value: f64) -> f64;

    fn format(&self, value: f64) -> String {
        format_number(self.round(value))
    }
}

/// Round to a number of significant digits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignificantDigits {
    pub digits: u32,
    pub pad_zeros: bool,
}

impl RoundingPolicy for SignificantDigits {
    fn round(&self, value: f64) -> f64 {
        if !value.is_finite() || value == 0.0 || self.digits == 0 {
            return value;
        }
        let magnitude = value.abs().log10().floor() as i32;
        let shift = self.digits as i32 - 1 - magnitude;
        round_at(value, shift)
    }

    fn format(&self, value: f64) -> String {
        let rounded = self.round(value);
        if !self.pad_zeros || !rounded.is_finite() {
            return format_number(rounded);
        }
        let magnitude = if rounded == 0.0 {
            0
        } else {
            rounded.abs().log10().floor() as i32
        };
        let decimals = (self.digits as i32 - 1 - magnitude).max(0) as usize;
        format!("{rounded:.decimals$}")
    }
}

/// Round to a fixed number of decimal places.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecimalPlaces {
    pub decimals: u32,
    pub pad_zeros: bool,
}

impl RoundingPolicy for DecimalPlaces {
    fn round(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return value;
        }
        round_at(value, self.decimals as i32)
    }

    fn format(&self, value: f64) -> String {
        let rounded = self.round(value);
        if self.pad_zeros && rounded.is_finite() {
            let decimals = self.decimals as usize;
            format!("{rounded:.decimals$}")
        } else {
            format_number(rounded)
        }
    }
}

fn round_at(value: f64, decimals: i32) -> f64 {
    if decimals >= 0 {
        let factor = 10f64.powi(decimals.min(300));
        (value * factor).round() / factor
    } else {
        let factor = 10f64.powi(-decimals);
        (value / factor).round() * factor
    }
}

/// Picks the policy a component's settings describe. Decimals win over digits.
pub fn policy_for(digits: Option<u32>, decimals: Option<u32>, pad_zeros: bool) -> Box<dyn RoundingPolicy> {
    match (decimals, digits) {
        (Some(decimals), _) => Box::new(DecimalPlaces { decimals, pad_zeros }),
        (None, Some(digits)) => Box::new(SignificantDigits { digits, pad_zeros }),
        (None, None) => Box::new(SignificantDigits {
            digits: 10,
            pad_zeros,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn significant_digits() {
        let policy = SignificantDigits {
            digits: 3,
            pad_zeros: false,
        };
        assert_eq!(policy.format(37.0 / 3.0), "12.3");
        assert_eq!(policy.format(123456.0), "123000");
        assert_eq!(policy.format(0.000123456), "0.000123");
    }

    #[test]
    fn pad_zeros() {
        let policy = SignificantDigits {
            digits: 4,
            pad_zeros: true,
        };
        assert_eq!(policy.format(2.0), "2.000");
        let policy = DecimalPlaces {
            decimals: 2,
            pad_zeros: true,
        };
        assert_eq!(policy.format(1.5), "1.50");
    }

    #[test]
    fn non_finite_passes_through() {
        let policy = policy_for(Some(3), None, false);
        assert_eq!(policy.format(f64::NAN), "NaN");
    }
}
