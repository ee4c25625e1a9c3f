//! Unit conversion registry with registered edges and path search.
//!
//! Edges are user-supplied functions between unit tags. When no direct
//! edge exists and paths are allowed, a breadth-first search finds the
//! shortest composition. Readers take a consistent snapshot under a
//! read-side lock; the path cache is invalidated on registration.

use crate::context;
use crate::errors::ValueError;
use crate::policy::Policy;
use crate::provenance::{self, Meta};
use crate::unit::Unit;
use crate::value::Value;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::warn;

/// Conversion function over raw amounts.
pub type ConvertFn = Arc<dyn Fn(&BigDecimal, &ConversionContext) -> anyhow::Result<BigDecimal> + Send + Sync>;

/// Behaviour switches for conversion, scoped via the context stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionPolicy {
    /// Fail with `MissingConversion` when no path exists
    pub strict: bool,

    /// Search for multi-edge paths when there is no direct edge
    pub allow_paths: bool,
}

impl Default for ConversionPolicy {
    fn default() -> Self {
        Self {
            strict: true,
            allow_paths: true,
        }
    }
}

/// Per-call conversion context handed to every conversion function.
#[derive(Debug, Default, Clone)]
pub struct ConversionContext {
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

impl ConversionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(timestamp),
            metadata: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Default)]
struct Graph {
    edges: HashMap<Unit, Vec<(Unit, ConvertFn)>>,

    // Memoised shortest paths, including misses; cleared on registration
    path_cache: HashMap<(Unit, Unit), Option<Vec<ConvertFn>>>,
}

/// Registry of conversion edges.
#[derive(Default)]
pub struct ConversionRegistry {
    graph: RwLock<Graph>,
}

/// The process-wide default registry used by `Value::convert_to`.
pub fn default_registry() -> &'static ConversionRegistry {
    static REGISTRY: OnceLock<ConversionRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ConversionRegistry::new)
}

impl ConversionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an edge. Invalidates the path cache.
    pub fn register<F>(&self, from: Unit, to: Unit, function: F)
    where
        F: Fn(&BigDecimal, &ConversionContext) -> anyhow::Result<BigDecimal>
            + Send
            + Sync
            + 'static,
    {
        let mut graph = self.graph.write().unwrap_or_else(PoisonError::into_inner);
        graph
            .edges
            .entry(from)
            .or_default()
            .push((to, Arc::new(function)));
        graph.path_cache.clear();
    }

    /// Number of registered edges.
    pub fn edge_count(&self) -> usize {
        let graph = self.graph.read().unwrap_or_else(PoisonError::into_inner);
        graph.edges.values().map(Vec::len).sum()
    }

    /// Convert a raw amount between units, without value semantics.
    pub fn convert_amount(
        &self,
        amount: &BigDecimal,
        from: &Unit,
        to: &Unit,
        ctx: &ConversionContext,
    ) -> Result<BigDecimal, ValueError> {
        if from == to {
            return Ok(amount.clone());
        }
        let policy = context::current_conversion_policy();
        match self.path(from, to, policy.allow_paths) {
            Some(steps) => apply(steps, amount, ctx),
            None => Err(ValueError::MissingConversion {
                from: from.clone(),
                to: to.clone(),
            }),
        }
    }

    /// Convert a value to the target unit.
    ///
    /// Same-unit conversions return the value unchanged. When no path
    /// exists the strictness of the active conversion policy decides
    /// between failing and logging a pass-through.
    pub fn convert(
        &self,
        value: &Value,
        target: &Unit,
        ctx: &ConversionContext,
    ) -> Result<Value, ValueError> {
        if value.unit() == target {
            return Ok(value.clone());
        }
        let conversion_policy = context::current_conversion_policy();
        let steps = self.path(value.unit(), target, conversion_policy.allow_paths);

        let Some(steps) = steps else {
            if conversion_policy.strict {
                return Err(ValueError::MissingConversion {
                    from: value.unit().clone(),
                    to: target.clone(),
                });
            }
            warn!(from = %value.unit(), to = %target, "no conversion path, passing value through");
            return Ok(value.clone());
        };

        let policy = value.policy().clone();
        let amount = match value.amount_as_decimal() {
            None => None,
            Some(amount) => Some(policy.quantize(&apply(steps, amount, ctx)?)),
        };
        let provenance = record_convert(value, target, &policy)?;
        Ok(Value::from_parts(amount, target.clone(), policy, provenance))
    }

    fn path(&self, from: &Unit, to: &Unit, allow_paths: bool) -> Option<Vec<ConvertFn>> {
        // The cache holds full-search results only; direct-edge-only lookups
        // are cheap and must not shadow multi-edge paths
        if !allow_paths {
            return self.search(from, to, false);
        }
        {
            let graph = self.graph.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = graph.path_cache.get(&(from.clone(), to.clone())) {
                return cached.clone();
            }
        }
        let found = self.search(from, to, true);
        let mut graph = self.graph.write().unwrap_or_else(PoisonError::into_inner);
        graph
            .path_cache
            .insert((from.clone(), to.clone()), found.clone());
        found
    }

    fn search(&self, from: &Unit, to: &Unit, allow_paths: bool) -> Option<Vec<ConvertFn>> {
        let graph = self.graph.read().unwrap_or_else(PoisonError::into_inner);

        // Direct edge first
        if let Some(direct) = graph.edges.get(from).and_then(|outgoing| {
            outgoing
                .iter()
                .find(|(next, _)| next == to)
                .map(|(_, f)| vec![f.clone()])
        }) {
            return Some(direct);
        }
        if !allow_paths {
            return None;
        }

        // Breadth-first over the edge set for a shortest composition
        let mut queue = VecDeque::from([from.clone()]);
        let mut came_from: HashMap<Unit, (Unit, ConvertFn)> = HashMap::new();
        while let Some(unit) = queue.pop_front() {
            let Some(outgoing) = graph.edges.get(&unit) else {
                continue;
            };
            for (next, function) in outgoing {
                if next == from || came_from.contains_key(next) {
                    continue;
                }
                came_from.insert(next.clone(), (unit.clone(), function.clone()));
                if next == to {
                    let mut steps = Vec::new();
                    let mut cursor = to.clone();
                    while let Some((previous, function)) = came_from.get(&cursor) {
                        steps.push(function.clone());
                        cursor = previous.clone();
                    }
                    steps.reverse();
                    return Some(steps);
                }
                queue.push_back(next.clone());
            }
        }
        None
    }
}

fn apply(
    steps: Vec<ConvertFn>,
    amount: &BigDecimal,
    ctx: &ConversionContext,
) -> Result<BigDecimal, ValueError> {
    let mut current = amount.clone();
    for step in steps {
        current = step(&current, ctx)?;
    }
    Ok(current)
}

fn record_convert(
    value: &Value,
    target: &Unit,
    policy: &Policy,
) -> Result<Option<crate::hash::NodeId>, ValueError> {
    let mut meta = Meta::new();
    meta.insert("from".to_string(), value.unit().to_string().into());
    meta.insert("to".to_string(), target.to_string().into());
    provenance::record_operation("convert", &[value.provenance_id()], policy, meta)
        .map_err(|e| ValueError::External(e.into()))
}
