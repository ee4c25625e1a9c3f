//! Provenance recording: content-addressed lineage for every value.
//!
//! Recording failures never abort the underlying arithmetic; they log and
//! degrade to absent provenance unless `fail_on_error` is configured.

pub mod export;
pub mod node;
pub mod span;

pub use export::{explain, graph, to_trace_json};
pub use node::{Meta, ProvNode};
pub use span::{span, Span, SpanGuard};

use crate::hash::NodeId;
use crate::policy::Policy;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tracing::warn;

/// Configuration toggles for the provenance subsystem.
#[derive(Debug, Clone, Copy)]
pub struct ProvenanceConfig {
    /// Master switch
    pub enabled: bool,
    pub track_literals: bool,
    pub track_operations: bool,
    pub track_calculations: bool,
    pub track_spans: bool,

    /// Nodes deeper than this have their lineage truncated
    pub max_depth: Option<usize>,

    /// Export fails with `GraphTooLarge` beyond this many nodes
    pub graph_size_limit: Option<usize>,

    /// Share storage for duplicate op strings
    pub intern_ids: bool,

    /// Surface recording failures instead of degrading
    pub fail_on_error: bool,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            track_literals: true,
            track_operations: true,
            track_calculations: true,
            track_spans: true,
            max_depth: None,
            graph_size_limit: None,
            intern_ids: true,
            fail_on_error: false,
        }
    }
}

/// Failures within the provenance subsystem.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProvenanceError {
    /// The transitive closure reachable from the export root exceeds the
    /// configured node budget.
    #[error("provenance graph too large: {nodes} nodes exceeds limit {limit}")]
    GraphTooLarge { nodes: usize, limit: usize },

    /// Canonical serialisation of a node preimage failed.
    #[error("provenance serialisation failed: {0}")]
    Serialization(String),
}

static CONFIG: LazyLock<RwLock<ProvenanceConfig>> =
    LazyLock::new(|| RwLock::new(ProvenanceConfig::default()));

static STORE: LazyLock<RwLock<HashMap<NodeId, Arc<ProvNode>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

static INTERNED_OPS: LazyLock<RwLock<HashSet<Arc<str>>>> =
    LazyLock::new(|| RwLock::new(HashSet::new()));

/// Current configuration snapshot.
pub fn config() -> ProvenanceConfig {
    *CONFIG.read().unwrap_or_else(PoisonError::into_inner)
}

/// Mutate the global configuration.
pub fn configure(f: impl FnOnce(&mut ProvenanceConfig)) {
    let mut cfg = CONFIG.write().unwrap_or_else(PoisonError::into_inner);
    f(&mut cfg);
}

/// Drop all recorded nodes and interned strings.
pub fn clear() {
    STORE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
    INTERNED_OPS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

/// Number of nodes currently recorded.
pub fn recorded_nodes() -> usize {
    STORE.read().unwrap_or_else(PoisonError::into_inner).len()
}

/// Look up a recorded node.
pub fn node(id: NodeId) -> Option<Arc<ProvNode>> {
    STORE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .cloned()
}

fn intern_op(op: &str, interning: bool) -> Arc<str> {
    if !interning {
        return Arc::from(op);
    }
    {
        let set = INTERNED_OPS.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = set.get(op) {
            return existing.clone();
        }
    }
    let mut set = INTERNED_OPS
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = set.get(op) {
        return existing.clone();
    }
    let shared: Arc<str> = Arc::from(op);
    set.insert(shared.clone());
    shared
}

/// Record a literal construction. Returns the node id, or None when
/// literal tracking is off.
pub fn record_literal(
    rendered: &str,
    policy: &Policy,
    extra: Meta,
) -> Result<Option<NodeId>, ProvenanceError> {
    literal_with(&config(), rendered, policy, extra)
}

/// Record an arithmetic operation over already-recorded inputs. Inputs
/// without provenance (tracking off when they were built) are skipped.
pub fn record_operation(
    op: &str,
    inputs: &[Option<NodeId>],
    policy: &Policy,
    extra: Meta,
) -> Result<Option<NodeId>, ProvenanceError> {
    operation_with(&config(), op, inputs, policy, extra)
}

/// Record a named-calculation invocation (`op = "calc:<name>"`).
pub fn record_calculation(
    name: &str,
    inputs: &[Option<NodeId>],
    policy: &Policy,
    extra: Meta,
) -> Result<Option<NodeId>, ProvenanceError> {
    calculation_with(&config(), name, inputs, policy, extra)
}

fn literal_with(
    cfg: &ProvenanceConfig,
    rendered: &str,
    policy: &Policy,
    extra: Meta,
) -> Result<Option<NodeId>, ProvenanceError> {
    if !cfg.enabled || !cfg.track_literals {
        return Ok(None);
    }
    let mut meta = extra;
    meta.insert("value".to_string(), rendered.into());
    record("literal", &[], policy, meta, cfg)
}

fn operation_with(
    cfg: &ProvenanceConfig,
    op: &str,
    inputs: &[Option<NodeId>],
    policy: &Policy,
    extra: Meta,
) -> Result<Option<NodeId>, ProvenanceError> {
    if !cfg.enabled || !cfg.track_operations {
        return Ok(None);
    }
    let ids: Vec<NodeId> = inputs.iter().filter_map(|i| *i).collect();
    record(op, &ids, policy, extra, cfg)
}

fn calculation_with(
    cfg: &ProvenanceConfig,
    name: &str,
    inputs: &[Option<NodeId>],
    policy: &Policy,
    extra: Meta,
) -> Result<Option<NodeId>, ProvenanceError> {
    if !cfg.enabled || !cfg.track_calculations {
        return Ok(None);
    }
    let ids: Vec<NodeId> = inputs.iter().filter_map(|i| *i).collect();
    let mut meta = extra;
    meta.insert("calculation".to_string(), name.into());
    record(&format!("calc:{name}"), &ids, policy, meta, cfg)
}

fn record(
    op: &str,
    inputs: &[NodeId],
    policy: &Policy,
    mut meta: Meta,
    cfg: &ProvenanceConfig,
) -> Result<Option<NodeId>, ProvenanceError> {
    if cfg.track_spans {
        if let Some(span_meta) = span::span_meta() {
            meta.extend(span_meta);
        }
    }

    let mut inputs = inputs.to_vec();
    let mut depth = 1 + {
        let store = STORE.read().unwrap_or_else(PoisonError::into_inner);
        inputs
            .iter()
            .filter_map(|id| store.get(id).map(|n| n.depth))
            .max()
            .unwrap_or(0)
    };
    if let Some(cap) = cfg.max_depth {
        if depth > cap {
            // Truncate lineage rather than grow an unbounded chain
            inputs.clear();
            depth = 1;
        }
    }

    let id = match hash_preimage(op, &inputs, &meta, policy.signature()) {
        Ok(id) => id,
        Err(error) => {
            warn!(%error, op, "provenance recording failed");
            if cfg.fail_on_error {
                return Err(error);
            }
            return Ok(None);
        }
    };

    let mut store = STORE.write().unwrap_or_else(PoisonError::into_inner);
    store.entry(id).or_insert_with(|| {
        Arc::new(ProvNode {
            id,
            op: intern_op(op, cfg.intern_ids),
            inputs,
            meta,
            depth,
        })
    });
    Ok(Some(id))
}

fn hash_preimage(
    op: &str,
    inputs: &[NodeId],
    meta: &Meta,
    policy_signature: &str,
) -> Result<NodeId, ProvenanceError> {
    let mut preimage: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
    preimage.insert("op", op.into());
    preimage.insert(
        "inputs",
        inputs
            .iter()
            .map(|i| serde_json::Value::from(i.to_string()))
            .collect::<Vec<_>>()
            .into(),
    );
    preimage.insert(
        "meta",
        serde_json::to_value(meta).map_err(|e| ProvenanceError::Serialization(e.to_string()))?,
    );
    preimage.insert("policy", policy_signature.into());
    let canonical = serde_json::to_string(&preimage)
        .map_err(|e| ProvenanceError::Serialization(e.to_string()))?;
    Ok(NodeId::digest(canonical.as_bytes()))
}

// -- Tests --
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_addressing_is_stable() {
        let policy = Policy::default_policy();
        let a = record_literal("100", &policy, Meta::new()).unwrap().unwrap();
        let b = record_literal("100", &policy, Meta::new()).unwrap().unwrap();
        assert_eq!(a, b);
        let c = record_literal("101", &policy, Meta::new()).unwrap().unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn policy_signature_distinguishes_ids() {
        let default = Policy::default_policy();
        let strict = Policy::builder().arithmetic_strict(true).build();
        let a = record_literal("5", &default, Meta::new()).unwrap().unwrap();
        let b = record_literal("5", &strict, Meta::new()).unwrap().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn operation_nodes_chain_inputs() {
        let policy = Policy::default_policy();
        let lhs = record_literal("2", &policy, Meta::new()).unwrap();
        let rhs = record_literal("3", &policy, Meta::new()).unwrap();
        let sum = record_operation("+", &[lhs, rhs], &policy, Meta::new())
            .unwrap()
            .unwrap();
        let node = node(sum).unwrap();
        assert_eq!(&*node.op, "+");
        assert_eq!(node.inputs, vec![lhs.unwrap(), rhs.unwrap()]);
        assert_eq!(node.depth, 2);
    }

    #[test]
    fn disabled_tracking_records_nothing() {
        let cfg = ProvenanceConfig {
            enabled: false,
            ..ProvenanceConfig::default()
        };
        let policy = Policy::default_policy();
        assert!(literal_with(&cfg, "9", &policy, Meta::new())
            .unwrap()
            .is_none());

        let cfg = ProvenanceConfig {
            track_operations: false,
            ..ProvenanceConfig::default()
        };
        assert!(operation_with(&cfg, "+", &[], &policy, Meta::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn depth_cap_truncates_lineage() {
        let capped = ProvenanceConfig {
            max_depth: Some(2),
            ..ProvenanceConfig::default()
        };
        let policy = Policy::default_policy();
        let a = literal_with(&capped, "depth-a", &policy, Meta::new()).unwrap();
        let b = operation_with(&capped, "neg", &[a], &policy, Meta::new()).unwrap();
        let c = operation_with(&capped, "abs", &[b], &policy, Meta::new())
            .unwrap()
            .unwrap();
        let node = node(c).unwrap();
        assert!(node.inputs.is_empty());
        assert_eq!(node.depth, 1);
    }

    #[test]
    fn interned_ops_share_storage() {
        let policy = Policy::default_policy();
        let a = record_literal("intern-1", &policy, Meta::new()).unwrap().unwrap();
        let b = record_literal("intern-2", &policy, Meta::new()).unwrap().unwrap();
        let (a, b) = (node(a).unwrap(), node(b).unwrap());
        assert!(Arc::ptr_eq(&a.op, &b.op));
    }

    #[test]
    fn span_meta_lands_on_nodes() {
        let policy = Policy::default_policy();
        let _guard = span("reporting").attr("period", "Q2").enter();
        let id = record_literal("spanned", &policy, Meta::new())
            .unwrap()
            .unwrap();
        let node = node(id).unwrap();
        assert_eq!(node.meta["span"], "reporting");
        assert_eq!(node.meta["span_depth"], 1);
        assert_eq!(node.meta["span_attrs"]["period"], "Q2");
    }
}
