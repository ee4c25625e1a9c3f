//! Reductions over value sequences with explicit missing-data modes.
//!
//! The active `NullBehavior.reduction` decides how none elements are
//! treated unless a mode is passed explicitly. Custom reducers can be
//! registered by name alongside the built-in sum, mean and weighted mean.

use crate::context;
use crate::errors::ValueError;
use crate::hash::NodeId;
use crate::nullability::ReductionNulls;
use crate::policy::Policy;
use crate::provenance::{self, Meta};
use crate::unit::Unit;
use crate::value::Value;
use bigdecimal::BigDecimal;
use num_traits::Zero;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

/// Custom reducer signature: the full element slice plus the resolved mode.
pub type ReduceFn = Arc<dyn Fn(&[Value], ReductionNulls) -> Result<Value, ValueError> + Send + Sync>;

static REDUCERS: LazyLock<RwLock<HashMap<String, ReduceFn>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Sum under the ambient reduction mode.
pub fn sum<I>(items: I) -> Result<Value, ValueError>
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    sum_with(items, context::current_nulls().reduction)
}

/// Sum with an explicit mode.
pub fn sum_with<I>(items: I, mode: ReductionNulls) -> Result<Value, ValueError>
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    let items: Vec<Value> = items.into_iter().map(Into::into).collect();
    let input_ids = ids_of(&items);
    match prepare("sum", items, mode)? {
        Prepared::NoneResult { unit, policy } => finish("sum", None, unit, policy, &input_ids),
        Prepared::Values { kept, unit, policy } => {
            let total = total_of(&kept);
            let amount = policy.quantize(&total);
            finish("sum", Some(amount), unit, policy, &input_ids)
        }
    }
}

/// Arithmetic mean under the ambient reduction mode.
pub fn mean<I>(items: I) -> Result<Value, ValueError>
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    mean_with(items, context::current_nulls().reduction)
}

/// Arithmetic mean with an explicit mode. In zero mode a none element
/// counts towards the denominator; in skip mode it does not.
pub fn mean_with<I>(items: I, mode: ReductionNulls) -> Result<Value, ValueError>
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    let items: Vec<Value> = items.into_iter().map(Into::into).collect();
    let input_ids = ids_of(&items);
    match prepare("mean", items, mode)? {
        Prepared::NoneResult { unit, policy } => finish("mean", None, unit, policy, &input_ids),
        Prepared::Values { kept, unit, policy } => {
            let total = total_of(&kept);
            let amount = policy.quantize(&(total / BigDecimal::from(kept.len() as u64)));
            finish("mean", Some(amount), unit, policy, &input_ids)
        }
    }
}

/// Weighted mean over (value, weight) pairs under the ambient mode.
pub fn weighted_mean(values: &[Value], weights: &[Value]) -> Result<Value, ValueError> {
    weighted_mean_with(values, weights, context::current_nulls().reduction)
}

/// Weighted mean with an explicit mode. A length mismatch or a zero weight
/// sum under a non-strict policy yields a none-Value.
pub fn weighted_mean_with(
    values: &[Value],
    weights: &[Value],
    mode: ReductionNulls,
) -> Result<Value, ValueError> {
    let input_ids: Vec<Option<NodeId>> = values
        .iter()
        .chain(weights.iter())
        .map(Value::provenance_id)
        .collect();

    let first = values.iter().find(|v| !v.is_none());
    let unit = first
        .map(|v| v.unit().clone())
        .unwrap_or(Unit::Dimensionless);
    let policy = first
        .map(|v| v.policy().clone())
        .or_else(context::context_policy)
        .unwrap_or_else(Policy::default_policy);

    if values.len() != weights.len() {
        return finish("weighted_mean", None, unit, policy, &input_ids);
    }
    for value in values.iter().filter(|v| !v.is_none()) {
        if !value.unit().compatible(&unit) {
            return Err(ValueError::IncompatibleUnits {
                op: "weighted_mean",
                left: unit,
                right: value.unit().clone(),
            });
        }
    }

    let zero = BigDecimal::zero();
    let mut weighted = BigDecimal::zero();
    let mut weight_total = BigDecimal::zero();
    let mut any_kept = false;
    for (value, weight) in values.iter().zip(weights.iter()) {
        let pair_none = value.is_none() || weight.is_none();
        match mode {
            ReductionNulls::Raise if pair_none => {
                return Err(ValueError::NullInReduction {
                    reduction: "weighted_mean",
                });
            }
            ReductionNulls::Propagate if pair_none => {
                return finish("weighted_mean", None, unit, policy, &input_ids);
            }
            ReductionNulls::Skip if pair_none => continue,
            _ => {}
        }
        let amount = value.amount_as_decimal().unwrap_or(&zero);
        let weight = weight.amount_as_decimal().unwrap_or(&zero);
        weighted += amount * weight;
        weight_total += weight;
        any_kept = true;
    }

    if !any_kept {
        return finish("weighted_mean", None, unit, policy, &input_ids);
    }
    if weight_total.is_zero() {
        if policy.arithmetic_strict() {
            return Err(ValueError::DivisionByZero);
        }
        return finish("weighted_mean", None, unit, policy, &input_ids);
    }

    let amount = policy.quantize(&(weighted / weight_total));
    finish("weighted_mean", Some(amount), unit, policy, &input_ids)
}

/// Register a custom reducer under a unique name.
pub fn register_reducer(name: &str, function: ReduceFn) -> anyhow::Result<()> {
    let mut reducers = REDUCERS.write().unwrap_or_else(PoisonError::into_inner);
    if reducers.contains_key(name) {
        anyhow::bail!("reducer already registered: {name}");
    }
    reducers.insert(name.to_string(), function);
    Ok(())
}

/// Reduce by name: the built-ins, or any registered custom reducer.
pub fn reduce(name: &str, items: &[Value]) -> Result<Value, ValueError> {
    let mode = context::current_nulls().reduction;
    match name {
        "sum" => sum_with(items.to_vec(), mode),
        "mean" => mean_with(items.to_vec(), mode),
        _ => {
            let function = {
                let reducers = REDUCERS.read().unwrap_or_else(PoisonError::into_inner);
                reducers.get(name).cloned()
            };
            match function {
                Some(function) => function(items, mode),
                None => Err(ValueError::External(anyhow::anyhow!(
                    "unknown reducer: {name}"
                ))),
            }
        }
    }
}

enum Prepared {
    Values {
        kept: Vec<Value>,
        unit: Unit,
        policy: Arc<Policy>,
    },
    NoneResult {
        unit: Unit,
        policy: Arc<Policy>,
    },
}

fn prepare(
    op: &'static str,
    items: Vec<Value>,
    mode: ReductionNulls,
) -> Result<Prepared, ValueError> {
    let first = items.iter().find(|v| !v.is_none());
    let unit = first
        .map(|v| v.unit().clone())
        .unwrap_or(Unit::Dimensionless);
    let policy = first
        .map(|v| v.policy().clone())
        .or_else(context::context_policy)
        .unwrap_or_else(Policy::default_policy);

    for item in items.iter().filter(|v| !v.is_none()) {
        if !item.unit().compatible(&unit) {
            return Err(ValueError::IncompatibleUnits {
                op,
                left: unit,
                right: item.unit().clone(),
            });
        }
    }

    let has_none = items.iter().any(Value::is_none);
    if has_none {
        match mode {
            ReductionNulls::Raise => {
                return Err(ValueError::NullInReduction { reduction: op });
            }
            ReductionNulls::Propagate => {
                return Ok(Prepared::NoneResult { unit, policy });
            }
            _ => {}
        }
    }

    let kept: Vec<Value> = match mode {
        // Zero mode keeps none elements; their amounts count as zero and
        // they still count towards a mean's denominator
        ReductionNulls::Zero => items,
        _ => items.into_iter().filter(|v| !v.is_none()).collect(),
    };

    if kept.is_empty() {
        return Ok(Prepared::NoneResult { unit, policy });
    }
    Ok(Prepared::Values { kept, unit, policy })
}

fn total_of(kept: &[Value]) -> BigDecimal {
    let mut total = BigDecimal::zero();
    for value in kept {
        if let Some(amount) = value.amount_as_decimal() {
            total += amount;
        }
    }
    total
}

fn ids_of(items: &[Value]) -> Vec<Option<NodeId>> {
    items.iter().map(Value::provenance_id).collect()
}

fn finish(
    op: &'static str,
    amount: Option<BigDecimal>,
    unit: Unit,
    policy: Arc<Policy>,
    input_ids: &[Option<NodeId>],
) -> Result<Value, ValueError> {
    let provenance = provenance::record_operation(op, input_ids, &policy, Meta::new())
        .map_err(|e| ValueError::External(e.into()))?;
    Ok(Value::from_parts(amount, unit, policy, provenance))
}
