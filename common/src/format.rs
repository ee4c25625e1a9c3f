//! Formatter seam for locale-aware rendering.
//!
//! The arithmetic core renders values through `Display` using the policy's
//! plain options; anything locale-aware goes through the [`Formatter`]
//! trait so callers can plug in a real localisation layer.

use crate::policy::{CurrencyStyle, DisplayPolicy};
use crate::unit::Unit;
use crate::value::Value;
use bigdecimal::BigDecimal;
use num_traits::Signed;

/// Renders an amount for display. Implementations receive the unit and the
/// policy's nested display options and return the final string.
pub trait Formatter {
    fn format(&self, amount: Option<&BigDecimal>, unit: &Unit, display: &DisplayPolicy) -> String;
}

/// Format a value through a formatter, using the policy's display options
/// (or defaults when the policy carries none).
pub fn format_value(value: &Value, formatter: &dyn Formatter) -> String {
    let defaults = DisplayPolicy::default();
    let display = value.policy().display().unwrap_or(&defaults);
    formatter.format(value.amount_as_decimal(), value.unit(), display)
}

/// Locale-unaware reference implementation of [`Formatter`].
pub struct PlainFormatter;

impl Formatter for PlainFormatter {
    fn format(&self, amount: Option<&BigDecimal>, unit: &Unit, display: &DisplayPolicy) -> String {
        let Some(amount) = amount else {
            return "-".to_string();
        };

        let digits = display.max_fraction_digits.unwrap_or(2).max(
            display.min_fraction_digits.unwrap_or(0),
        );
        let scaled = amount.with_scale_round(digits as i64, bigdecimal::RoundingMode::HalfUp);
        let negative = scaled.is_negative();
        let rendered = scaled.abs().to_string();
        let rendered = if display.grouping {
            group_digits(&rendered)
        } else {
            rendered
        };

        let code = match unit {
            Unit::Money { code: Some(code) } => Some(code.as_str()),
            Unit::Money { code: None } => display.currency_code.as_deref(),
            _ => None,
        };
        let body = match (code, display.currency_style) {
            (Some(code), CurrencyStyle::Code) => format!("{rendered} {code}"),
            (Some(code), CurrencyStyle::Symbol) => format!("{}{rendered}", symbol_for(code)),
            _ => rendered,
        };

        if negative {
            if display.negative_in_parentheses {
                format!("({body})")
            } else {
                format!("-{body}")
            }
        } else {
            body
        }
    }
}

fn symbol_for(code: &str) -> &str {
    match code {
        "USD" | "CAD" | "AUD" => "$",
        "EUR" => "\u{20ac}",
        "GBP" => "\u{a3}",
        "JPY" => "\u{a5}",
        _ => "",
    }
}

/// Insert thousands separators into a plain decimal string. Only the
/// integer part is grouped.
pub(crate) fn group_digits(rendered: &str) -> String {
    let (integer, fraction) = match rendered.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rendered, None),
    };
    let mut grouped = String::with_capacity(rendered.len() + integer.len() / 3);
    let digits: Vec<char> = integer.chars().collect();
    for (index, ch) in digits.iter().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*ch);
    }
    if let Some(fraction) = fraction {
        grouped.push('.');
        grouped.push_str(fraction);
    }
    grouped
}

// -- Tests --
#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn grouping() {
        assert_eq!(group_digits("1234567.50"), "1,234,567.50");
        assert_eq!(group_digits("100"), "100");
        assert_eq!(group_digits("1000"), "1,000");
        assert_eq!(group_digits("12"), "12");
    }

    #[test]
    fn plain_formatter_with_code_style() {
        let display = DisplayPolicy::default();
        let out = PlainFormatter.format(Some(&dec("1234.5")), &Unit::money("USD"), &display);
        assert_eq!(out, "1,234.50 USD");
    }

    #[test]
    fn plain_formatter_symbol_style() {
        let display = DisplayPolicy {
            currency_style: CurrencyStyle::Symbol,
            negative_in_parentheses: true,
            ..DisplayPolicy::default()
        };
        let out = PlainFormatter.format(Some(&dec("-99.95")), &Unit::money("USD"), &display);
        assert_eq!(out, "($99.95)");
    }

    #[test]
    fn format_value_uses_policy_display() {
        let policy = Policy::builder()
            .display(DisplayPolicy {
                grouping: false,
                ..DisplayPolicy::default()
            })
            .build();
        let value = Value::from_literal_with(dec("4200"), Unit::money("EUR"), policy).unwrap();
        assert_eq!(format_value(&value, &PlainFormatter), "4200.00 EUR");
    }

    #[test]
    fn none_renders_as_dash() {
        let value = Value::none(Unit::Dimensionless);
        assert_eq!(format_value(&value, &PlainFormatter), "-");
    }
}
