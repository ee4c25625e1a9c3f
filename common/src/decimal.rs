//! Decimal parsing, rounding and quantisation helpers.
//!
//! All amount storage goes through `BigDecimal`; nothing here ever passes
//! through binary floating point.

use bigdecimal::{BigDecimal, RoundingMode};
use num_traits::{One, Zero};
use std::str::FromStr;
use std::sync::Arc;

/// Rounding modes recognised by policies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    #[default]
    HalfUp,
    HalfEven,
    Down,
    Up,
    Ceiling,
    Floor,
}

impl Rounding {
    pub fn mode(self) -> RoundingMode {
        match self {
            Rounding::HalfUp => RoundingMode::HalfUp,
            Rounding::HalfEven => RoundingMode::HalfEven,
            Rounding::Down => RoundingMode::Down,
            Rounding::Up => RoundingMode::Up,
            Rounding::Ceiling => RoundingMode::Ceiling,
            Rounding::Floor => RoundingMode::Floor,
        }
    }
}

/// Produces the quantum a policy rounds amounts to, given its decimal places.
pub trait QuantizerFactory: Send + Sync {
    /// Stable label, part of the policy signature.
    fn label(&self) -> &str;

    /// The quantum for the given number of decimal places.
    fn quantum(&self, places: u32) -> BigDecimal;
}

/// Default quantizer: 10^-places.
pub struct PowerOfTen;

impl QuantizerFactory for PowerOfTen {
    fn label(&self) -> &str {
        "pow10"
    }

    fn quantum(&self, places: u32) -> BigDecimal {
        // FromStr accepts scientific notation, avoiding BigInt plumbing
        BigDecimal::from_str(&format!("1e-{places}")).unwrap_or_else(|_| BigDecimal::one())
    }
}

/// Shared handle to the default quantizer.
pub fn power_of_ten() -> Arc<dyn QuantizerFactory> {
    Arc::new(PowerOfTen)
}

/// Parse a raw string as a decimal. Whitespace is trimmed; anything
/// unparseable yields None rather than an error.
pub fn parse_decimal(raw: &str) -> Option<BigDecimal> {
    BigDecimal::from_str(raw.trim()).ok()
}

/// Round an amount to the nearest multiple of the quantizer's quantum.
pub fn quantize(
    amount: &BigDecimal,
    places: u32,
    rounding: Rounding,
    quantizer: &dyn QuantizerFactory,
) -> BigDecimal {
    let quantum = quantizer.quantum(places);
    if quantum.is_zero() {
        return amount.clone();
    }
    let steps = (amount / &quantum).with_scale_round(0, rounding.mode());
    let result = steps * quantum;
    // Pad with zeros up to the policy's places, but never drop digits a
    // custom quantum may have produced
    let (_, scale) = result.as_bigint_and_exponent();
    if scale < places as i64 {
        result.with_scale(places as i64)
    } else {
        result
    }
}

/// Integer power by repeated squaring. Returns None for a negative exponent
/// of a zero base.
pub fn pow_integer(base: &BigDecimal, exponent: i64) -> Option<BigDecimal> {
    if exponent == 0 {
        return Some(BigDecimal::one());
    }
    let negative = exponent < 0;
    if negative && base.is_zero() {
        return None;
    }
    let mut remaining = exponent.unsigned_abs();
    let mut square = base.clone();
    let mut result = BigDecimal::one();
    while remaining > 0 {
        if remaining & 1 == 1 {
            result = &result * &square;
        }
        remaining >>= 1;
        if remaining > 0 {
            square = &square * &square;
        }
    }
    if negative {
        Some(BigDecimal::one() / result)
    } else {
        Some(result)
    }
}

// -- Tests --
#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn parse_trims_whitespace() {
        assert_eq!(parse_decimal(" 12.5 "), Some(dec("12.5")));
        assert_eq!(parse_decimal("n/a"), None);
        assert_eq!(parse_decimal(""), None);
    }

    #[test]
    fn quantize_half_up() {
        let q = quantize(&dec("2.345"), 2, Rounding::HalfUp, &PowerOfTen);
        assert_eq!(q, dec("2.35"));
        let q = quantize(&dec("-2.345"), 2, Rounding::HalfUp, &PowerOfTen);
        assert_eq!(q, dec("-2.35"));
    }

    #[test]
    fn quantize_half_even() {
        assert_eq!(
            quantize(&dec("0.125"), 2, Rounding::HalfEven, &PowerOfTen),
            dec("0.12")
        );
        assert_eq!(
            quantize(&dec("0.135"), 2, Rounding::HalfEven, &PowerOfTen),
            dec("0.14")
        );
    }

    #[test]
    fn quantize_directed_modes() {
        assert_eq!(
            quantize(&dec("1.001"), 2, Rounding::Ceiling, &PowerOfTen),
            dec("1.01")
        );
        assert_eq!(
            quantize(&dec("-1.001"), 2, Rounding::Ceiling, &PowerOfTen),
            dec("-1.00")
        );
        assert_eq!(
            quantize(&dec("1.009"), 2, Rounding::Down, &PowerOfTen),
            dec("1.00")
        );
        assert_eq!(
            quantize(&dec("-1.009"), 2, Rounding::Floor, &PowerOfTen),
            dec("-1.01")
        );
    }

    #[test]
    fn quantize_keeps_trailing_zeros() {
        let q = quantize(&dec("400"), 2, Rounding::HalfUp, &PowerOfTen);
        assert_eq!(q.to_string(), "400.00");
    }

    #[test]
    fn custom_quantum() {
        struct Nickels;
        impl QuantizerFactory for Nickels {
            fn label(&self) -> &str {
                "nickels"
            }
            fn quantum(&self, _places: u32) -> BigDecimal {
                dec("0.05")
            }
        }
        assert_eq!(
            quantize(&dec("1.37"), 2, Rounding::HalfUp, &Nickels),
            dec("1.35")
        );
    }

    #[test]
    fn integer_powers() {
        assert_eq!(pow_integer(&dec("2"), 10), Some(dec("1024")));
        assert_eq!(pow_integer(&dec("1.5"), 2), Some(dec("2.25")));
        assert_eq!(pow_integer(&dec("7"), 0), Some(dec("1")));
        assert_eq!(pow_integer(&dec("2"), -2), Some(dec("0.25")));
        assert_eq!(pow_integer(&dec("0"), -1), None);
    }
}
