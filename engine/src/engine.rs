//! Dependency-driven evaluation of named calculations.
//!
//! Each call builds the transitive dependency subgraph for its targets,
//! detects cycles, lifts context leaves into literal values and invokes
//! calculation functions in a deterministic topological order. The
//! evaluation cache lives and dies with the call.

use crate::errors::EngineError;
use crate::graph::{self, BuildOptions, NodeKind};
use crate::inputs::{Context, Input};
use crate::registry::{self, Registry};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tally_common::context as scopes;
use tally_common::hash::NodeId;
use tally_common::provenance::{self, Meta};
use tally_common::{Literal, Policy, Unit, Value, ValueError};
use tracing::debug;

/// Evaluator bound to a loaded registry.
pub struct Engine {
    registry: Arc<Registry>,
}

impl Engine {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn with_registry(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Bind to the installed process-wide registry.
    pub fn from_global() -> anyhow::Result<Self> {
        registry::global()
            .map(|registry| Self { registry })
            .ok_or_else(|| anyhow::anyhow!("no global registry installed"))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Evaluate a single named calculation over the context.
    pub fn calculate(&self, name: &str, context: &Context) -> Result<Value, EngineError> {
        self.calculate_with(name, context, None, false)
    }

    /// Evaluate with an explicit call policy and partial-evaluation flag.
    pub fn calculate_with(
        &self,
        name: &str,
        context: &Context,
        policy: Option<Arc<Policy>>,
        allow_partial: bool,
    ) -> Result<Value, EngineError> {
        let mut cache = self.evaluate(&[name], context, policy, allow_partial)?;
        cache
            .remove(name)
            .ok_or_else(|| EngineError::UnknownCalculation {
                name: name.to_string(),
            })
    }

    /// Evaluate several targets over one shared per-call cache.
    pub fn calculate_many(
        &self,
        names: &[&str],
        context: &Context,
    ) -> Result<BTreeMap<String, Value>, EngineError> {
        self.calculate_many_with(names, context, None, false)
    }

    pub fn calculate_many_with(
        &self,
        names: &[&str],
        context: &Context,
        policy: Option<Arc<Policy>>,
        allow_partial: bool,
    ) -> Result<BTreeMap<String, Value>, EngineError> {
        let mut cache = self.evaluate(names, context, policy, allow_partial)?;
        let mut results = BTreeMap::new();
        for name in names {
            if let Some(value) = cache.remove(*name) {
                results.insert(name.to_string(), value);
            }
        }
        Ok(results)
    }

    /// Transitive dependency names of a calculation, in evaluation order.
    /// Unregistered names are reported as leaves.
    pub fn dependencies(&self, name: &str) -> Result<Vec<String>, EngineError> {
        let graph = graph::build(
            &self.registry,
            &[name],
            &Context::new(),
            &BuildOptions {
                allow_partial: false,
                unknown_as_leaf: true,
            },
        )?;
        Ok(graph.order.into_iter().filter(|n| n != name).collect())
    }

    /// Check that the calculation resolves and its graph is acyclic.
    pub fn validate(&self, name: &str) -> Result<(), EngineError> {
        graph::build(
            &self.registry,
            &[name],
            &Context::new(),
            &BuildOptions {
                allow_partial: false,
                unknown_as_leaf: true,
            },
        )
        .map(|_| ())
    }

    fn evaluate(
        &self,
        targets: &[&str],
        context: &Context,
        policy: Option<Arc<Policy>>,
        allow_partial: bool,
    ) -> Result<HashMap<String, Value>, EngineError> {
        // The call policy also becomes the scoped context policy for the
        // duration of the evaluation
        let _scope = policy.map(scopes::use_policy);

        let graph = graph::build(
            &self.registry,
            targets,
            context,
            &BuildOptions {
                allow_partial,
                unknown_as_leaf: false,
            },
        )?;

        let mut cache: HashMap<String, Value> = HashMap::new();
        for name in &graph.order {
            let value = match graph.kinds.get(name.as_str()) {
                Some(NodeKind::ContextLeaf) => match context.get(name) {
                    Some(input) => lift(name, input)?,
                    None => missing_leaf(name)?,
                },
                Some(NodeKind::MissingLeaf) => missing_leaf(name)?,
                Some(NodeKind::Calc(descriptor)) => {
                    let mut args = Vec::with_capacity(descriptor.dependencies.len());
                    for dependency in &descriptor.dependencies {
                        let Some(value) = cache.get(dependency) else {
                            return Err(EngineError::MissingInput {
                                name: dependency.clone(),
                            });
                        };
                        args.push(value.clone());
                    }
                    debug!(calculation = %name, inputs = args.len(), "evaluating");
                    let value = (descriptor.function)(&args).map_err(|source| {
                        EngineError::Calculation {
                            name: name.clone(),
                            source,
                        }
                    })?;

                    let input_ids: Vec<Option<NodeId>> =
                        args.iter().map(Value::provenance_id).collect();
                    let mut meta = Meta::new();
                    meta.insert(
                        "input_names".to_string(),
                        descriptor.dependencies.clone().into(),
                    );
                    let provenance = provenance::record_calculation(
                        name,
                        &input_ids,
                        value.policy().as_ref(),
                        meta,
                    )
                    .map_err(|e| ValueError::External(e.into()))?;
                    value.with_provenance(provenance)
                }
                None => {
                    return Err(EngineError::UnknownCalculation { name: name.clone() });
                }
            };
            cache.insert(name.clone(), value);
        }
        Ok(cache)
    }
}

fn lift(name: &str, input: &Input) -> Result<Value, EngineError> {
    let policy = scopes::current_policy();
    let value = match input {
        Input::Value(value) => value.clone(),
        Input::Number(amount) => {
            Value::input_literal(name, amount.clone(), Unit::Dimensionless, policy)?
        }
        Input::Text(text) => Value::input_literal(name, text.as_str(), Unit::Dimensionless, policy)?,
        Input::None => Value::input_literal(name, Literal::Null, Unit::Dimensionless, policy)?,
    };
    Ok(value)
}

fn missing_leaf(name: &str) -> Result<Value, EngineError> {
    let policy = scopes::current_policy();
    Ok(Value::input_literal(
        name,
        Literal::Null,
        Unit::Dimensionless,
        policy,
    )?)
}
