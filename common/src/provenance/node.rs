//! Immutable provenance nodes.

use crate::hash::NodeId;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Canonically ordered metadata map attached to a node.
pub type Meta = BTreeMap<String, serde_json::Value>;

/// A content-addressed record of one arithmetic or calculation step.
///
/// The id is a SHA-256 hash of the op, the ordered input ids, the
/// canonicalised meta map and the policy signature; nodes are never
/// mutated after creation.
#[derive(Debug, Clone)]
pub struct ProvNode {
    pub id: NodeId,
    pub op: Arc<str>,
    pub inputs: Vec<NodeId>,
    pub meta: Meta,

    /// Longest input chain below this node, used for history truncation
    pub(crate) depth: usize,
}

impl ProvNode {
    /// Export shape: `{id, op, inputs, meta}` with sorted keys.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id.to_string(),
            "op": &*self.op,
            "inputs": self.inputs.iter().map(|i| i.to_string()).collect::<Vec<_>>(),
            "meta": self.meta,
        })
    }

    pub fn is_literal(&self) -> bool {
        &*self.op == "literal"
    }
}
