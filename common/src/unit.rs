//! Unit tags and the binary unit algebra.

use std::fmt;

/// Categorical tag attached to every value.
///
/// `Money` carries an optional currency code and `Quantity` an optional
/// domain tag; the remaining variants are bare. `Percent` is a display
/// subtype of `Ratio` and the two are interchangeable in arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Unit {
    /// Monetary amount, optionally in a specific currency
    Money { code: Option<String> },

    /// Dimensionless ratio (0.15 = 15%)
    Ratio,

    /// Ratio rendered as a percentage
    Percent,

    /// Plain number
    Dimensionless,

    /// Open domain tag for counts (units, headcount, widgets)
    Quantity { tag: Option<String> },
}

/// Unit category, ignoring codes and tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitCategory {
    Money,
    Ratio,
    Percent,
    Dimensionless,
    Quantity,
}

/// Binary operations the unit algebra dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }
}

impl Unit {
    /// Money in a specific currency.
    pub fn money(code: impl Into<String>) -> Self {
        Unit::Money {
            code: Some(code.into()),
        }
    }

    /// Money with no currency code.
    pub fn uncoded_money() -> Self {
        Unit::Money { code: None }
    }

    /// Tagged quantity.
    pub fn quantity(tag: impl Into<String>) -> Self {
        Unit::Quantity {
            tag: Some(tag.into()),
        }
    }

    pub fn category(&self) -> UnitCategory {
        match self {
            Unit::Money { .. } => UnitCategory::Money,
            Unit::Ratio => UnitCategory::Ratio,
            Unit::Percent => UnitCategory::Percent,
            Unit::Dimensionless => UnitCategory::Dimensionless,
            Unit::Quantity { .. } => UnitCategory::Quantity,
        }
    }

    /// Ratio or Percent.
    pub fn is_ratioish(&self) -> bool {
        matches!(self, Unit::Ratio | Unit::Percent)
    }

    /// Same-unit compatibility: category and code/tag match, with Ratio and
    /// Percent interchangeable.
    pub fn compatible(&self, other: &Unit) -> bool {
        if self.is_ratioish() && other.is_ratioish() {
            return true;
        }
        self == other
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Money { code: Some(code) } => write!(f, "{code}"),
            Unit::Money { code: None } => write!(f, "money"),
            Unit::Ratio => write!(f, "ratio"),
            Unit::Percent => write!(f, "percent"),
            Unit::Dimensionless => write!(f, "dimensionless"),
            Unit::Quantity { tag: Some(tag) } => write!(f, "{tag}"),
            Unit::Quantity { tag: None } => write!(f, "quantity"),
        }
    }
}

/// Total unit algebra for binary operations. `None` means the operation is
/// not permitted for the unit pair and drives the incompatible-units path.
pub fn combine(op: BinaryOp, left: &Unit, right: &Unit) -> Option<Unit> {
    use Unit::*;
    match op {
        BinaryOp::Add | BinaryOp::Sub => match (left, right) {
            (Money { code: a }, Money { code: b }) if a == b => Some(left.clone()),
            (l, r) if l.is_ratioish() && r.is_ratioish() => Some(Ratio),
            (Dimensionless, Dimensionless) => Some(Dimensionless),
            (Quantity { tag: a }, Quantity { tag: b }) if a == b => Some(left.clone()),
            _ => None,
        },
        BinaryOp::Mul => match (left, right) {
            (_, Dimensionless) => Some(left.clone()),
            (Dimensionless, _) => Some(right.clone()),
            (Money { .. }, r) if r.is_ratioish() => Some(left.clone()),
            (l, Money { .. }) if l.is_ratioish() => Some(right.clone()),
            (Quantity { .. }, r) if r.is_ratioish() => Some(left.clone()),
            (l, Quantity { .. }) if l.is_ratioish() => Some(right.clone()),
            (l, r) if l.is_ratioish() && r.is_ratioish() => Some(Ratio),
            _ => None,
        },
        BinaryOp::Div => match (left, right) {
            (Money { code: a }, Money { code: b }) if a == b => Some(Ratio),
            (Money { .. }, Dimensionless) => Some(left.clone()),
            (Quantity { tag: a }, Quantity { tag: b }) if a == b => Some(Ratio),
            (Quantity { .. }, Dimensionless) => Some(left.clone()),
            (l, r) if l.is_ratioish() && r.is_ratioish() => Some(Ratio),
            _ => None,
        },
        BinaryOp::Pow => match (left, right) {
            (Dimensionless, Dimensionless) => Some(Dimensionless),
            (l, Dimensionless) if l.is_ratioish() => Some(Ratio),
            _ => None,
        },
    }
}

// -- Tests --
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_addition_requires_matching_codes() {
        let usd = Unit::money("USD");
        let eur = Unit::money("EUR");
        assert_eq!(combine(BinaryOp::Add, &usd, &usd), Some(usd.clone()));
        assert_eq!(combine(BinaryOp::Add, &usd, &eur), None);
        assert_eq!(combine(BinaryOp::Add, &usd, &Unit::uncoded_money()), None);
    }

    #[test]
    fn ratioish_addition_yields_ratio() {
        assert_eq!(
            combine(BinaryOp::Add, &Unit::Percent, &Unit::Ratio),
            Some(Unit::Ratio)
        );
        assert_eq!(
            combine(BinaryOp::Sub, &Unit::Percent, &Unit::Percent),
            Some(Unit::Ratio)
        );
    }

    #[test]
    fn money_times_ratio_is_money() {
        let usd = Unit::money("USD");
        assert_eq!(combine(BinaryOp::Mul, &usd, &Unit::Ratio), Some(usd.clone()));
        assert_eq!(combine(BinaryOp::Mul, &Unit::Percent, &usd), Some(usd.clone()));
        assert_eq!(
            combine(BinaryOp::Mul, &usd, &Unit::Dimensionless),
            Some(usd.clone())
        );
        assert_eq!(combine(BinaryOp::Mul, &usd, &usd), None);
    }

    #[test]
    fn money_division() {
        let usd = Unit::money("USD");
        let eur = Unit::money("EUR");
        assert_eq!(combine(BinaryOp::Div, &usd, &usd), Some(Unit::Ratio));
        assert_eq!(combine(BinaryOp::Div, &usd, &eur), None);
        assert_eq!(
            combine(BinaryOp::Div, &usd, &Unit::Dimensionless),
            Some(usd.clone())
        );
        assert_eq!(combine(BinaryOp::Div, &usd, &Unit::Ratio), None);
    }

    #[test]
    fn division_by_dimensionless_is_unsupported_for_ratioish() {
        // Only Money and Quantity may be divided by Dimensionless
        assert_eq!(combine(BinaryOp::Div, &Unit::Ratio, &Unit::Dimensionless), None);
        assert_eq!(
            combine(BinaryOp::Div, &Unit::Percent, &Unit::Dimensionless),
            None
        );
        assert_eq!(
            combine(BinaryOp::Div, &Unit::Dimensionless, &Unit::Dimensionless),
            None
        );
        assert_eq!(
            combine(BinaryOp::Div, &Unit::Dimensionless, &Unit::Ratio),
            None
        );
    }

    #[test]
    fn money_plus_percent_is_unsupported() {
        assert_eq!(
            combine(BinaryOp::Add, &Unit::money("USD"), &Unit::Percent),
            None
        );
    }

    #[test]
    fn quantity_mirrors_money() {
        let units = Unit::quantity("units");
        let boxes = Unit::quantity("boxes");
        assert_eq!(
            combine(BinaryOp::Add, &units, &units),
            Some(units.clone())
        );
        assert_eq!(combine(BinaryOp::Add, &units, &boxes), None);
        assert_eq!(combine(BinaryOp::Div, &units, &units), Some(Unit::Ratio));
        assert_eq!(
            combine(BinaryOp::Mul, &units, &Unit::Ratio),
            Some(units.clone())
        );
    }

    #[test]
    fn power_needs_dimensionless_exponent() {
        assert_eq!(
            combine(BinaryOp::Pow, &Unit::Ratio, &Unit::Dimensionless),
            Some(Unit::Ratio)
        );
        assert_eq!(
            combine(BinaryOp::Pow, &Unit::Dimensionless, &Unit::Dimensionless),
            Some(Unit::Dimensionless)
        );
        assert_eq!(
            combine(BinaryOp::Pow, &Unit::money("USD"), &Unit::Dimensionless),
            None
        );
        assert_eq!(combine(BinaryOp::Pow, &Unit::Ratio, &Unit::Ratio), None);
    }

    #[test]
    fn compatibility_folds_ratioish() {
        assert!(Unit::Percent.compatible(&Unit::Ratio));
        assert!(Unit::money("USD").compatible(&Unit::money("USD")));
        assert!(!Unit::money("USD").compatible(&Unit::money("EUR")));
        assert!(!Unit::money("USD").compatible(&Unit::Dimensionless));
    }
}
