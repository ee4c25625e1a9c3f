//! The immutable Value triple: decimal amount, unit tag, policy.
//!
//! A none-Value keeps its unit and policy but has no amount. Arithmetic
//! resolves a policy per operation, consults the unit algebra, propagates
//! none operands and quantises every produced amount.

use crate::context;
use crate::convert::{self, ConversionContext};
use crate::decimal::{self, parse_decimal};
use crate::errors::ValueError;
use crate::hash::NodeId;
use crate::policy::{PercentDisplay, Policy, PolicyResolution};
use crate::provenance::{self, Meta};
use crate::nullability::BinaryNulls;
use crate::unit::{combine, BinaryOp, Unit};
use bigdecimal::{BigDecimal, RoundingMode};
use num_traits::{Signed, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Raw literal input accepted by value constructors.
#[derive(Debug, Clone)]
pub enum Literal {
    Decimal(BigDecimal),
    Text(String),
    Null,
}

impl From<BigDecimal> for Literal {
    fn from(value: BigDecimal) -> Self {
        Literal::Decimal(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Decimal(BigDecimal::from(value))
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Decimal(BigDecimal::from(value))
    }
}

impl From<u64> for Literal {
    fn from(value: u64) -> Self {
        Literal::Decimal(BigDecimal::from(value))
    }
}

impl From<u32> for Literal {
    fn from(value: u32) -> Self {
        Literal::Decimal(BigDecimal::from(value))
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        // Route through the shortest decimal rendering, never through
        // binary float arithmetic
        Literal::Text(value.to_string())
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

macro_rules! lift_numeric {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    let policy = context::current_policy();
                    let amount = BigDecimal::from(value);
                    let provenance = provenance::record_literal(
                        &amount.normalized().to_string(),
                        &policy,
                        Meta::new(),
                    )
                    .unwrap_or_default();
                    Value {
                        amount: Some(amount),
                        unit: Unit::Dimensionless,
                        policy,
                        provenance,
                    }
                }
            }
        )*
    };
}

// Infallible dimensionless lifts, used when raw numbers feed reductions
lift_numeric!(i64, i32, u64, u32);

impl From<BigDecimal> for Value {
    fn from(amount: BigDecimal) -> Self {
        let policy = context::current_policy();
        let provenance = provenance::record_literal(
            &amount.normalized().to_string(),
            &policy,
            Meta::new(),
        )
        .unwrap_or_default();
        Value {
            amount: Some(amount),
            unit: Unit::Dimensionless,
            policy,
            provenance,
        }
    }
}

/// Immutable (amount, unit, policy) triple with optional provenance.
#[derive(Debug, Clone)]
pub struct Value {
    amount: Option<BigDecimal>,
    unit: Unit,
    policy: Arc<Policy>,
    provenance: Option<NodeId>,
}

impl Value {
    /// Build a value from a raw literal under the ambient policy.
    pub fn from_literal(raw: impl Into<Literal>, unit: Unit) -> Result<Value, ValueError> {
        Self::from_literal_with(raw, unit, context::current_policy())
    }

    /// Build a value from a raw literal under an explicit policy.
    pub fn from_literal_with(
        raw: impl Into<Literal>,
        unit: Unit,
        policy: Arc<Policy>,
    ) -> Result<Value, ValueError> {
        Self::literal_impl(raw.into(), unit, policy, Meta::new())
    }

    /// Literal lifted from a calculation-context input; records the input
    /// name on the provenance node.
    pub fn input_literal(
        name: &str,
        raw: impl Into<Literal>,
        unit: Unit,
        policy: Arc<Policy>,
    ) -> Result<Value, ValueError> {
        let mut meta = Meta::new();
        meta.insert("input_name".to_string(), name.into());
        Self::literal_impl(raw.into(), unit, policy, meta)
    }

    fn literal_impl(
        raw: Literal,
        unit: Unit,
        policy: Arc<Policy>,
        extra: Meta,
    ) -> Result<Value, ValueError> {
        let amount = match raw {
            Literal::Decimal(d) => Some(d),
            Literal::Text(s) => match parse_decimal(&s) {
                Some(d) => Some(d),
                None if policy.arithmetic_strict() => {
                    return Err(ValueError::InvalidLiteral { literal: s });
                }
                None => None,
            },
            Literal::Null => None,
        };
        let rendered = amount
            .as_ref()
            .map(|a| a.normalized().to_string())
            .unwrap_or_else(|| "none".to_string());
        let provenance = provenance::record_literal(&rendered, &policy, extra)
            .map_err(|e| ValueError::External(e.into()))?;
        Ok(Value {
            amount,
            unit,
            policy,
            provenance,
        })
    }

    /// A none-Value with the ambient policy.
    pub fn none(unit: Unit) -> Value {
        Self::none_with(unit, context::current_policy())
    }

    /// A none-Value with an explicit policy.
    pub fn none_with(unit: Unit, policy: Arc<Policy>) -> Value {
        let provenance = provenance::record_literal("none", &policy, Meta::new()).unwrap_or_default();
        Value {
            amount: None,
            unit,
            policy,
            provenance,
        }
    }

    /// Zero in the given unit with the ambient policy.
    pub fn zero(unit: Unit) -> Value {
        let policy = context::current_policy();
        let provenance = provenance::record_literal("0", &policy, Meta::new()).unwrap_or_default();
        Value {
            amount: Some(BigDecimal::zero()),
            unit,
            policy,
            provenance,
        }
    }

    /// Money in a specific currency.
    pub fn money(raw: impl Into<Literal>, code: &str) -> Result<Value, ValueError> {
        Self::from_literal(raw, Unit::money(code))
    }

    /// Money with no currency code.
    pub fn uncoded_money(raw: impl Into<Literal>) -> Result<Value, ValueError> {
        Self::from_literal(raw, Unit::Money { code: None })
    }

    pub fn ratio(raw: impl Into<Literal>) -> Result<Value, ValueError> {
        Self::from_literal(raw, Unit::Ratio)
    }

    /// Percent stores the underlying ratio (0.15 for 15%).
    pub fn percent(raw: impl Into<Literal>) -> Result<Value, ValueError> {
        Self::from_literal(raw, Unit::Percent)
    }

    pub fn dimensionless(raw: impl Into<Literal>) -> Result<Value, ValueError> {
        Self::from_literal(raw, Unit::Dimensionless)
    }

    pub fn quantity(raw: impl Into<Literal>, tag: &str) -> Result<Value, ValueError> {
        Self::from_literal(raw, Unit::quantity(tag))
    }

    // -- Accessors --

    pub fn amount_as_decimal(&self) -> Option<&BigDecimal> {
        self.amount.as_ref()
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn policy(&self) -> &Arc<Policy> {
        &self.policy
    }

    pub fn provenance_id(&self) -> Option<NodeId> {
        self.provenance
    }

    pub fn is_none(&self) -> bool {
        self.amount.is_none()
    }

    pub fn is_negative(&self) -> bool {
        self.amount.as_ref().is_some_and(|a| a.is_negative())
    }

    /// Replace the provenance id, leaving everything else untouched.
    pub fn with_provenance(mut self, provenance: Option<NodeId>) -> Value {
        self.provenance = provenance;
        self
    }

    /// Assemble a value from already-resolved parts. Used by conversions
    /// and reductions, which quantise and record provenance themselves.
    pub(crate) fn from_parts(
        amount: Option<BigDecimal>,
        unit: Unit,
        policy: Arc<Policy>,
        provenance: Option<NodeId>,
    ) -> Value {
        Value {
            amount,
            unit,
            policy,
            provenance,
        }
    }

    // -- Arithmetic --

    pub fn add(&self, other: &Value) -> Result<Value, ValueError> {
        self.binary(other, BinaryOp::Add)
    }

    pub fn subtract(&self, other: &Value) -> Result<Value, ValueError> {
        self.binary(other, BinaryOp::Sub)
    }

    pub fn multiply(&self, other: &Value) -> Result<Value, ValueError> {
        self.binary(other, BinaryOp::Mul)
    }

    pub fn divide(&self, other: &Value) -> Result<Value, ValueError> {
        self.binary(other, BinaryOp::Div)
    }

    /// Raise to a dimensionless integer exponent.
    pub fn power(&self, exponent: &Value) -> Result<Value, ValueError> {
        self.binary(exponent, BinaryOp::Pow)
    }

    pub fn negate(&self) -> Result<Value, ValueError> {
        self.unary("neg", |a| -a)
    }

    pub fn absolute(&self) -> Result<Value, ValueError> {
        self.unary("abs", |a| a.abs())
    }

    fn binary(&self, other: &Value, op: BinaryOp) -> Result<Value, ValueError> {
        let policy = resolve_binary_policy(self, other)?;
        let result_unit = combine(op, &self.unit, &other.unit);

        let (left, right) = match (&self.amount, &other.amount) {
            (Some(l), Some(r)) => (l, r),
            _ => {
                return match context::current_nulls().binary {
                    BinaryNulls::Raise => Err(ValueError::InvalidOperand { op: op.symbol() }),
                    BinaryNulls::Propagate => {
                        let unit = result_unit.unwrap_or_else(|| self.unit.clone());
                        self.none_result(op, other, unit, policy)
                    }
                };
            }
        };

        let strict_units = policy.arithmetic_strict()
            || context::current_resolution() == PolicyResolution::StrictMatch;
        let Some(unit) = result_unit else {
            if strict_units {
                return Err(ValueError::IncompatibleUnits {
                    op: op.symbol(),
                    left: self.unit.clone(),
                    right: other.unit.clone(),
                });
            }
            let unit = self.unit.clone();
            return self.none_result(op, other, unit, policy);
        };

        let amount = match op {
            BinaryOp::Add => left + right,
            BinaryOp::Sub => left - right,
            BinaryOp::Mul => left * right,
            BinaryOp::Div => {
                if right.is_zero() {
                    if policy.arithmetic_strict() {
                        return Err(ValueError::DivisionByZero);
                    }
                    return self.none_result(op, other, unit, policy);
                }
                left / right
            }
            BinaryOp::Pow => {
                let truncated = right.with_scale_round(0, RoundingMode::Down);
                let exponent = if &truncated == right {
                    truncated.to_i64()
                } else {
                    None
                };
                let Some(exponent) = exponent else {
                    if policy.arithmetic_strict() {
                        return Err(ValueError::InvalidOperand { op: op.symbol() });
                    }
                    return self.none_result(op, other, unit, policy);
                };
                match decimal::pow_integer(left, exponent) {
                    Some(amount) => amount,
                    None => {
                        // Negative power of zero divides by zero
                        if policy.arithmetic_strict() {
                            return Err(ValueError::DivisionByZero);
                        }
                        return self.none_result(op, other, unit, policy);
                    }
                }
            }
        };

        let amount = policy.quantize(&amount);
        let provenance = record_op(op.symbol(), &[self.provenance, other.provenance], &policy)?;
        Ok(Value {
            amount: Some(amount),
            unit,
            policy,
            provenance,
        })
    }

    fn none_result(
        &self,
        op: BinaryOp,
        other: &Value,
        unit: Unit,
        policy: Arc<Policy>,
    ) -> Result<Value, ValueError> {
        let provenance = record_op(op.symbol(), &[self.provenance, other.provenance], &policy)?;
        Ok(Value {
            amount: None,
            unit,
            policy,
            provenance,
        })
    }

    fn unary(&self, op: &str, f: impl Fn(&BigDecimal) -> BigDecimal) -> Result<Value, ValueError> {
        let policy = self.policy.clone();
        let amount = self.amount.as_ref().map(|a| policy.quantize(&f(a)));
        let provenance = record_op(op, &[self.provenance], &policy)?;
        Ok(Value {
            amount,
            unit: self.unit.clone(),
            policy,
            provenance,
        })
    }

    // -- Unit conversions --

    /// Reinterpret a ratioish or dimensionless amount as a Percent value.
    /// The stored ratio is unchanged apart from the policy's percentage cap.
    pub fn as_percentage(&self) -> Result<Value, ValueError> {
        match &self.unit {
            Unit::Percent => Ok(self.clone()),
            Unit::Ratio | Unit::Dimensionless => {
                let amount = self.amount.as_ref().map(|a| {
                    match self.policy.cap_percentage_at() {
                        Some(cap) if a > cap => cap.clone(),
                        _ => a.clone(),
                    }
                });
                let provenance = record_op("as_percentage", &[self.provenance], &self.policy)?;
                Ok(Value {
                    amount,
                    unit: Unit::Percent,
                    policy: self.policy.clone(),
                    provenance,
                })
            }
            _ => {
                if self.policy.arithmetic_strict() {
                    return Err(ValueError::IncompatibleUnits {
                        op: "as_percentage",
                        left: self.unit.clone(),
                        right: Unit::Percent,
                    });
                }
                let provenance = record_op("as_percentage", &[self.provenance], &self.policy)?;
                Ok(Value {
                    amount: None,
                    unit: Unit::Percent,
                    policy: self.policy.clone(),
                    provenance,
                })
            }
        }
    }

    /// Reinterpret as a plain Ratio; the stored amount is unchanged.
    pub fn as_ratio(&self) -> Result<Value, ValueError> {
        match &self.unit {
            Unit::Ratio => Ok(self.clone()),
            Unit::Percent | Unit::Dimensionless => {
                let provenance = record_op("as_ratio", &[self.provenance], &self.policy)?;
                Ok(Value {
                    amount: self.amount.clone(),
                    unit: Unit::Ratio,
                    policy: self.policy.clone(),
                    provenance,
                })
            }
            _ => {
                if self.policy.arithmetic_strict() {
                    return Err(ValueError::IncompatibleUnits {
                        op: "as_ratio",
                        left: self.unit.clone(),
                        right: Unit::Ratio,
                    });
                }
                let provenance = record_op("as_ratio", &[self.provenance], &self.policy)?;
                Ok(Value {
                    amount: None,
                    unit: Unit::Ratio,
                    policy: self.policy.clone(),
                    provenance,
                })
            }
        }
    }

    /// Convert through the default conversion registry.
    pub fn convert_to(
        &self,
        target: &Unit,
        ctx: &ConversionContext,
    ) -> Result<Value, ValueError> {
        convert::default_registry().convert(self, target, ctx)
    }

    // -- Comparison --

    /// Equality on amount and unit compatibility; policies are ignored.
    pub fn equals(&self, other: &Value) -> bool {
        if !self.unit.compatible(&other.unit) {
            return false;
        }
        match (&self.amount, &other.amount) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Equality that additionally requires matching policy signatures.
    pub fn same_policy_equals(&self, other: &Value) -> bool {
        self.equals(other) && self.policy.signature() == other.policy.signature()
    }
}

fn record_op(
    op: &str,
    inputs: &[Option<NodeId>],
    policy: &Policy,
) -> Result<Option<NodeId>, ValueError> {
    provenance::record_operation(op, inputs, policy, Meta::new())
        .map_err(|e| ValueError::External(e.into()))
}

fn resolve_binary_policy(left: &Value, right: &Value) -> Result<Arc<Policy>, ValueError> {
    match context::current_resolution() {
        PolicyResolution::Context => {
            Ok(context::context_policy().unwrap_or_else(Policy::default_policy))
        }
        PolicyResolution::LeftOperand => Ok(left.policy.clone()),
        PolicyResolution::StrictMatch => {
            if left.policy.signature() == right.policy.signature() {
                Ok(left.policy.clone())
            } else {
                Err(ValueError::PolicyConflict {
                    left: left.policy.signature()[..12].to_string(),
                    right: right.policy.signature()[..12].to_string(),
                })
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for Value {}

fn unit_rank(unit: &Unit) -> (u8, Option<&str>) {
    match unit {
        Unit::Money { code } => (0, code.as_deref()),
        // Percent folds into Ratio so ordering and hashing agree with
        // ratioish equality
        Unit::Ratio | Unit::Percent => (1, None),
        Unit::Dimensionless => (2, None),
        Unit::Quantity { tag } => (3, tag.as_deref()),
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        unit_rank(&self.unit).hash(state);
        match &self.amount {
            Some(a) => a.normalized().to_string().hash(state),
            None => "none".hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.amount, &other.amount) {
            // None sorts before any non-none
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => unit_rank(&self.unit).cmp(&unit_rank(&other.unit)),
            (Some(a), Some(b)) => {
                if self.unit.compatible(&other.unit) {
                    a.cmp(b)
                } else {
                    unit_rank(&self.unit)
                        .cmp(&unit_rank(&other.unit))
                        .then_with(|| a.cmp(b))
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy = &self.policy;
        let Some(amount) = &self.amount else {
            return write!(f, "{}", policy.none_text());
        };

        let mut shown = amount.clone();
        let mut suffix = String::new();
        if self.unit == Unit::Percent && policy.percent_display() == PercentDisplay::Percent {
            shown = shown * BigDecimal::from(100);
            suffix.push('%');
        }
        if let Unit::Money { code: Some(code) } = &self.unit {
            suffix = format!(" {code}");
        }

        let shown =
            shown.with_scale_round(policy.decimal_places() as i64, policy.rounding().mode());
        let negative = shown.is_negative();
        let digits = shown.abs().to_string();
        let digits = if policy.thousands_separator() {
            crate::format::group_digits(&digits)
        } else {
            digits
        };
        let body = format!("{digits}{suffix}");

        if negative {
            if policy.negative_in_parentheses() {
                write!(f, "({body})")
            } else {
                write!(f, "-{body}")
            }
        } else {
            write!(f, "{body}")
        }
    }
}
