//! Resource names and quantities
//!
//! Quantities use the Kubernetes notation (`"250m"`, `"1.5"`, `"100M"`,
//! `"2Gi"`, `"1e3"`) and are stored exactly as a count of milli-units, so a
//! CPU request of `"250m"` and a memory request of `"10M"` both fit the same
//! integer representation. Anything finer than a milli-unit rounds up.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resource types the updater compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceName {
    Cpu,
    Memory,
}

impl ResourceName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceName::Cpu => "cpu",
            ResourceName::Memory => "memory",
        }
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(ResourceName::Cpu),
            "memory" => Ok(ResourceName::Memory),
            other => Err(ValidationError::UnknownResource(other.to_string())),
        }
    }
}

/// Non-negative resource amount in milli-units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity {
    millis: i64,
}

/// Largest decimal exponent accepted before the value is rejected as overflow
const MAX_EXPONENT: i32 = 30;

impl Quantity {
    pub const ZERO: Quantity = Quantity { millis: 0 };

    pub fn from_millis(millis: u32) -> Self {
        Self {
            millis: i64::from(millis),
        }
    }

    pub fn from_units(units: u32) -> Self {
        Self {
            millis: i64::from(units) * 1000,
        }
    }

    pub fn millis(&self) -> i64 {
        self.millis
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }

    /// Value as a float, only meaningful relative to another quantity of the
    /// same resource.
    pub fn as_f64(&self) -> f64 {
        self.millis as f64
    }

    /// Bound `self` into `[min, max]`; either side may be open.
    pub fn clamp_to(self, min: Option<Quantity>, max: Option<Quantity>) -> Quantity {
        let mut value = self;
        if let Some(min) = min {
            value = value.max(min);
        }
        if let Some(max) = max {
            value = value.min(max);
        }
        value
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.millis % 1000 == 0 {
            write!(f, "{}", self.millis / 1000)
        } else {
            write!(f, "{}m", self.millis)
        }
    }
}

impl FromStr for Quantity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidQuantity(s.to_string());

        let text = s.trim();
        if text.starts_with('-') {
            return Err(ValidationError::NegativeQuantity(s.to_string()));
        }
        let text = text.strip_prefix('+').unwrap_or(text);

        let (number, suffix) = split_suffix(text);
        let (binary_factor, decimal_exponent) = suffix_multiplier(suffix).ok_or_else(invalid)?;
        let (mantissa, number_exponent) = parse_decimal(number).ok_or_else(invalid)?;

        // Scale into milli-units.
        let exponent = number_exponent
            .checked_add(decimal_exponent + 3)
            .ok_or_else(invalid)?;
        if exponent.abs() > MAX_EXPONENT {
            return if mantissa == 0 { Ok(Quantity::ZERO) } else { Err(invalid()) };
        }

        let scaled = mantissa.checked_mul(binary_factor).ok_or_else(invalid)?;
        let pow = 10i128.pow(exponent.unsigned_abs());
        let millis = if exponent >= 0 {
            scaled.checked_mul(pow).ok_or_else(invalid)?
        } else {
            // Round sub-milli remainders up.
            scaled.checked_add(pow - 1).ok_or_else(invalid)? / pow
        };

        let millis = i64::try_from(millis).map_err(|_| invalid())?;
        Ok(Quantity { millis })
    }
}

impl TryFrom<String> for Quantity {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quantity> for String {
    fn from(value: Quantity) -> Self {
        value.to_string()
    }
}

/// Split `"1.5Gi"` into `("1.5", "Gi")`. Exponent notation stays with the number.
fn split_suffix(text: &str) -> (&str, &str) {
    for binary in ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"] {
        if let Some(number) = text.strip_suffix(binary) {
            return (number, binary);
        }
    }
    match text.char_indices().last() {
        Some((idx, c)) if "numkMGTPE".contains(c) => {
            // "1E" is exa, "1e3" is an exponent.
            (&text[..idx], &text[idx..])
        }
        _ => (text, ""),
    }
}

/// Returns `(binary factor, decimal exponent)` for a suffix.
fn suffix_multiplier(suffix: &str) -> Option<(i128, i32)> {
    let multiplier = match suffix {
        "" => (1, 0),
        "n" => (1, -9),
        "u" => (1, -6),
        "m" => (1, -3),
        "k" => (1, 3),
        "M" => (1, 6),
        "G" => (1, 9),
        "T" => (1, 12),
        "P" => (1, 15),
        "E" => (1, 18),
        "Ki" => (1 << 10, 0),
        "Mi" => (1 << 20, 0),
        "Gi" => (1 << 30, 0),
        "Ti" => (1 << 40, 0),
        "Pi" => (1 << 50, 0),
        "Ei" => (1 << 60, 0),
        _ => return None,
    };
    Some(multiplier)
}

/// Parse `digits[.digits][e[+-]digits]` exactly into `(mantissa, exponent)`.
fn parse_decimal(number: &str) -> Option<(i128, i32)> {
    let (significand, exponent) = match number.find(|c| c == 'e' || c == 'E') {
        Some(idx) => (&number[..idx], number[idx + 1..].parse::<i32>().ok()?),
        None => (number, 0),
    };

    let (whole, fraction) = match significand.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (significand, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let digits = format!("{whole}{fraction}");
    let digits = digits.trim_start_matches('0');
    if digits.len() > 30 {
        return None;
    }
    let mantissa = if digits.is_empty() {
        0
    } else {
        digits.parse::<i128>().ok()?
    };

    let fraction_len = i32::try_from(fraction.len()).ok()?;
    Some((mantissa, exponent.checked_sub(fraction_len)?))
}
