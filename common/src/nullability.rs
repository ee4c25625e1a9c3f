//! Null-behaviour modes shared by value arithmetic and reductions.

/// How binary operations treat a none operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinaryNulls {
    /// A none operand yields a none result
    #[default]
    Propagate,

    /// A none operand fails with `InvalidOperand`
    Raise,
}

/// How reductions treat none elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReductionNulls {
    /// Drop none elements before reducing
    #[default]
    Skip,

    /// Any none element yields a none result
    Propagate,

    /// Replace a none amount with zero; the element still counts
    Zero,

    /// Any none element fails with `NullInReduction`
    Raise,
}

/// Paired binary and reduction modes, scoped via the context stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullBehavior {
    pub binary: BinaryNulls,
    pub reduction: ReductionNulls,
}

impl NullBehavior {
    pub fn new(binary: BinaryNulls, reduction: ReductionNulls) -> Self {
        Self { binary, reduction }
    }

    /// Library default: propagate in binaries, skip in reductions.
    pub fn default_nulls() -> Self {
        Self::new(BinaryNulls::Propagate, ReductionNulls::Skip)
    }

    /// Raise everywhere.
    pub fn strict_raise() -> Self {
        Self::new(BinaryNulls::Raise, ReductionNulls::Raise)
    }

    /// Reduction-only preset: treat none as zero.
    pub fn sum_zero() -> Self {
        Self::new(BinaryNulls::Propagate, ReductionNulls::Zero)
    }

    /// Reduction-only preset: propagate none.
    pub fn sum_propagate() -> Self {
        Self::new(BinaryNulls::Propagate, ReductionNulls::Propagate)
    }

    /// Reduction-only preset: raise on none.
    pub fn sum_raise() -> Self {
        Self::new(BinaryNulls::Propagate, ReductionNulls::Raise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let nulls = NullBehavior::default();
        assert_eq!(nulls.binary, BinaryNulls::Propagate);
        assert_eq!(nulls.reduction, ReductionNulls::Skip);
        assert_eq!(nulls, NullBehavior::default_nulls());
    }

    #[test]
    fn presets() {
        assert_eq!(NullBehavior::strict_raise().binary, BinaryNulls::Raise);
        assert_eq!(NullBehavior::sum_zero().reduction, ReductionNulls::Zero);
        assert_eq!(
            NullBehavior::sum_propagate().reduction,
            ReductionNulls::Propagate
        );
        assert_eq!(NullBehavior::sum_raise().reduction, ReductionNulls::Raise);
    }
}
