//! Deterministic exports of the provenance graph.

use super::node::ProvNode;
use super::{config, node, ProvenanceError};
use crate::hash::NodeId;
use crate::value::Value;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// The node map for everything reachable from the value's provenance,
/// keyed by id. Empty when the value carries no provenance.
pub fn graph(value: &Value) -> Result<BTreeMap<NodeId, Arc<ProvNode>>, ProvenanceError> {
    match value.provenance_id() {
        Some(root) => closure(root, config().graph_size_limit),
        None => Ok(BTreeMap::new()),
    }
}

/// JSON trace export: `{root, nodes: {id: {id, op, inputs, meta}}}`.
///
/// Key ordering is canonical, so equal graphs export byte-identically.
pub fn to_trace_json(value: &Value) -> Result<serde_json::Value, ProvenanceError> {
    let Some(root) = value.provenance_id() else {
        return Ok(json!({ "root": serde_json::Value::Null, "nodes": {} }));
    };
    let nodes = closure(root, config().graph_size_limit)?;
    let rendered: BTreeMap<String, serde_json::Value> = nodes
        .values()
        .map(|n| (n.id.to_string(), n.to_json()))
        .collect();
    Ok(json!({ "root": root.to_string(), "nodes": rendered }))
}

/// Deterministic text tree describing how the value was computed.
/// Recursion stops at literals or at `max_depth` levels.
pub fn explain(value: &Value, max_depth: usize) -> String {
    let mut out = String::new();
    match value.provenance_id() {
        None => out.push_str("(no provenance)\n"),
        Some(root) => explain_node(root, 0, max_depth, &mut out),
    }
    out
}

fn explain_node(id: NodeId, level: usize, max_depth: usize, out: &mut String) {
    for _ in 0..level {
        out.push_str("  ");
    }
    let Some(node) = node(id) else {
        let _ = writeln!(out, "[{}] (not recorded)", id.short());
        return;
    };
    let _ = write!(out, "{} [{}]", node.op, id.short());
    if let Some(value) = node.meta.get("value").and_then(|v| v.as_str()) {
        let _ = write!(out, " = {value}");
    }
    if let Some(name) = node.meta.get("input_name").and_then(|v| v.as_str()) {
        let _ = write!(out, " ({name})");
    }
    out.push('\n');
    if node.is_literal() || level + 1 >= max_depth {
        return;
    }
    for input in &node.inputs {
        explain_node(*input, level + 1, max_depth, out);
    }
}

fn closure(
    root: NodeId,
    limit: Option<usize>,
) -> Result<BTreeMap<NodeId, Arc<ProvNode>>, ProvenanceError> {
    let mut nodes = BTreeMap::new();
    let mut pending = vec![root];
    while let Some(id) = pending.pop() {
        if nodes.contains_key(&id) {
            continue;
        }
        // Evicted or never-recorded inputs are simply absent from the export
        let Some(node) = node(id) else { continue };
        pending.extend(node.inputs.iter().copied());
        nodes.insert(id, node);
        if let Some(limit) = limit {
            if nodes.len() > limit {
                return Err(ProvenanceError::GraphTooLarge {
                    nodes: nodes.len(),
                    limit,
                });
            }
        }
    }
    Ok(nodes)
}

// -- Tests --
#[cfg(test)]
mod tests {
    use super::super::{record_literal, record_operation, Meta};
    use super::*;
    use crate::policy::Policy;

    fn chained(tag: &str, links: usize) -> NodeId {
        let policy = Policy::default_policy();
        let mut id = record_literal(tag, &policy, Meta::new()).unwrap();
        for _ in 0..links {
            id = record_operation("neg", &[id], &policy, Meta::new()).unwrap();
        }
        id.unwrap()
    }

    #[test]
    fn closure_collects_transitively() {
        let root = chained("closure-root", 2);
        let nodes = closure(root, None).unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(nodes.contains_key(&root));
    }

    #[test]
    fn size_limit_fails_export() {
        let root = chained("limited-root", 3);
        let result = closure(root, Some(2));
        assert!(matches!(
            result,
            Err(ProvenanceError::GraphTooLarge { limit: 2, .. })
        ));
        assert!(closure(root, Some(10)).is_ok());
    }
}
