//! Error types for value arithmetic, reductions and conversions.

use crate::unit::Unit;

/// Errors raised by [`Value`](crate::value::Value) operations.
///
/// In non-strict mode most invalid arithmetic degrades to a none-Value
/// instead of surfacing one of these; strict policies and raise-mode null
/// behaviour turn the same conditions into errors.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// A raw string could not be interpreted as a decimal under a strict policy.
    #[error("invalid literal: {literal:?}")]
    InvalidLiteral { literal: String },

    /// An operand was none while binary null behaviour was set to raise.
    #[error("none operand in '{op}' with raise null behaviour")]
    InvalidOperand { op: &'static str },

    /// The unit algebra does not permit the operation.
    #[error("incompatible units: {left} {op} {right}")]
    IncompatibleUnits {
        op: &'static str,
        left: Unit,
        right: Unit,
    },

    /// Strict-match policy resolution with non-identical policy signatures.
    #[error("policy conflict: {left} != {right}")]
    PolicyConflict { left: String, right: String },

    /// Division by a zero denominator under an arithmetic-strict policy.
    #[error("division by zero")]
    DivisionByZero,

    /// A reduction in raise mode encountered a none element.
    #[error("none element in '{reduction}' reduction")]
    NullInReduction { reduction: &'static str },

    /// No conversion edge or path exists under a strict conversion policy.
    #[error("no conversion path from {from} to {to}")]
    MissingConversion { from: Unit, to: Unit },

    /// Failure from a user-supplied conversion function, or a provenance
    /// failure surfaced because `fail_on_error` is configured.
    #[error(transparent)]
    External(#[from] anyhow::Error),
}
