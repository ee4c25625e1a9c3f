//! Per-call dependency subgraph: resolution, cycle detection, topo order.

use crate::errors::EngineError;
use crate::inputs::Context;
use crate::registry::{CalcDescriptor, Registry};
use std::collections::HashMap;
use std::sync::Arc;

/// How a name in the graph resolves.
#[derive(Debug)]
pub(crate) enum NodeKind {
    /// Registered calculation
    Calc(Arc<CalcDescriptor>),

    /// Present in the supplied context
    ContextLeaf,

    /// Absent everywhere; only reachable with partial evaluation
    MissingLeaf,
}

/// The transitive dependency subgraph for one call.
#[derive(Debug)]
pub(crate) struct DepGraph {
    /// Deterministic topological order: dependencies before dependents,
    /// ties broken by declaration order
    pub order: Vec<String>,
    pub kinds: HashMap<String, NodeKind>,
}

pub(crate) struct BuildOptions {
    /// Substitute none-Values for unresolvable leaves instead of failing
    pub allow_partial: bool,

    /// Treat unregistered, out-of-context names as leaves; used by
    /// `validate` and `dependencies`, which have no context
    pub unknown_as_leaf: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    Grey,
    Black,
}

/// Build the dependency subgraph for the given targets by depth-first
/// search over declared dependency names.
pub(crate) fn build(
    registry: &Registry,
    targets: &[&str],
    context: &Context,
    options: &BuildOptions,
) -> Result<DepGraph, EngineError> {
    let mut graph = DepGraph {
        order: Vec::new(),
        kinds: HashMap::new(),
    };
    let mut colors: HashMap<String, Color> = HashMap::new();
    let mut path: Vec<String> = Vec::new();

    for target in targets {
        let Some(descriptor) = registry.get(target) else {
            return Err(EngineError::UnknownCalculation {
                name: target.to_string(),
            });
        };
        visit_calc(
            descriptor,
            registry,
            context,
            options,
            &mut graph,
            &mut colors,
            &mut path,
        )?;
    }
    Ok(graph)
}

fn visit_calc(
    descriptor: Arc<CalcDescriptor>,
    registry: &Registry,
    context: &Context,
    options: &BuildOptions,
    graph: &mut DepGraph,
    colors: &mut HashMap<String, Color>,
    path: &mut Vec<String>,
) -> Result<(), EngineError> {
    let name = descriptor.name.clone();
    match colors.get(&name) {
        Some(Color::Black) => return Ok(()),
        Some(Color::Grey) => {
            // Grey means the name is on the current DFS path: a cycle
            let start = path.iter().position(|n| n == &name).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].to_vec();
            cycle.push(name);
            return Err(EngineError::CircularDependency { path: cycle });
        }
        None => {}
    }

    colors.insert(name.clone(), Color::Grey);
    path.push(name.clone());

    for dependency in &descriptor.dependencies {
        // Context entries shadow registered calculations
        if context.contains(dependency) {
            mark_leaf(dependency, NodeKind::ContextLeaf, graph, colors);
            continue;
        }
        if let Some(dependency_descriptor) = registry.get(dependency) {
            visit_calc(
                dependency_descriptor,
                registry,
                context,
                options,
                graph,
                colors,
                path,
            )?;
            continue;
        }
        if options.unknown_as_leaf {
            mark_leaf(dependency, NodeKind::ContextLeaf, graph, colors);
        } else if options.allow_partial {
            mark_leaf(dependency, NodeKind::MissingLeaf, graph, colors);
        } else {
            return Err(EngineError::MissingInput {
                name: dependency.clone(),
            });
        }
    }

    path.pop();
    colors.insert(name.clone(), Color::Black);
    graph.kinds.insert(name.clone(), NodeKind::Calc(descriptor));
    graph.order.push(name);
    Ok(())
}

fn mark_leaf(
    name: &str,
    kind: NodeKind,
    graph: &mut DepGraph,
    colors: &mut HashMap<String, Color>,
) {
    if colors.contains_key(name) {
        return;
    }
    colors.insert(name.to_string(), Color::Black);
    graph.kinds.insert(name.to_string(), kind);
    graph.order.push(name.to_string());
}
