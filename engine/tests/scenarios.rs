//! End-to-end scenarios across the engine and the value layer.

use bigdecimal::BigDecimal;
use std::str::FromStr;
use tally_common::provenance::{self, span};
use tally_common::{Policy, Unit, Value};
use tally_engine::{Collection, Context, Engine, EngineError, Registry};

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn pricing_engine() -> Engine {
    let mut collection = Collection::new("pricing").unwrap();
    collection
        .register("gross_profit", &["sales", "cost"], |args: &[Value]| {
            args[0].subtract(&args[1]).map_err(anyhow::Error::from)
        })
        .unwrap();
    collection
        .register(
            "gross_margin_ratio",
            &["pricing.gross_profit", "sales"],
            |args: &[Value]| args[0].divide(&args[1]).map_err(anyhow::Error::from),
        )
        .unwrap();
    let mut registry = Registry::new();
    registry.load(collection).unwrap();
    Engine::new(registry)
}

#[test]
fn margin_report_end_to_end() {
    init_tracing();
    let engine = pricing_engine();
    let context = Context::new()
        .with("sales", Value::money(1000, "USD").unwrap())
        .with("cost", Value::money(600, "USD").unwrap());

    let profit = engine.calculate("pricing.gross_profit", &context).unwrap();
    assert_eq!(profit.amount_as_decimal(), Some(&dec("400.00")));
    assert_eq!(profit.unit(), &Unit::money("USD"));

    let margin = engine
        .calculate("pricing.gross_margin_ratio", &context)
        .unwrap();
    assert_eq!(margin.amount_as_decimal(), Some(&dec("0.40")));
    assert_eq!(margin.unit(), &Unit::Ratio);
    assert_eq!(margin.as_percentage().unwrap().to_string(), "40.00%");
}

#[test]
fn cycle_fails_validate_and_calculate() {
    let mut collection = Collection::new("loops").unwrap();
    collection
        .register("a", &["loops.b"], |args: &[Value]| Ok(args[0].clone()))
        .unwrap();
    collection
        .register("b", &["loops.a"], |args: &[Value]| Ok(args[0].clone()))
        .unwrap();
    let mut registry = Registry::new();
    registry.load(collection).unwrap();
    let engine = Engine::new(registry);

    match engine.validate("loops.a") {
        Err(EngineError::CircularDependency { path }) => {
            assert_eq!(path, vec!["loops.a", "loops.b", "loops.a"]);
        }
        other => panic!("expected a cycle from validate, got {:?}", other.err()),
    }
    assert!(matches!(
        engine.calculate("loops.a", &Context::new()),
        Err(EngineError::CircularDependency { .. })
    ));
}

#[test]
fn provenance_ids_are_reproducible() {
    // Independent constructions of the same subtraction share a root id
    let build = || {
        let a = Value::money(100, "USD").unwrap();
        let b = Value::money(60, "USD").unwrap();
        a.subtract(&b).unwrap()
    };
    let first = build();
    let second = build();
    assert_eq!(first.provenance_id(), second.provenance_id());

    let first_trace = provenance::to_trace_json(&first).unwrap();
    let second_trace = provenance::to_trace_json(&second).unwrap();
    assert_eq!(
        serde_json::to_string(&first_trace).unwrap(),
        serde_json::to_string(&second_trace).unwrap()
    );
}

#[test]
fn trace_export_shape() {
    let engine = pricing_engine();
    let context = Context::new().with("sales", 1000).with("cost", 650);
    let margin = engine
        .calculate("pricing.gross_margin_ratio", &context)
        .unwrap();

    let trace = provenance::to_trace_json(&margin).unwrap();
    let root = trace["root"].as_str().expect("root id");
    assert_eq!(root, margin.provenance_id().unwrap().to_string());

    let nodes = trace["nodes"].as_object().expect("node map");
    assert!(nodes.len() >= 4);
    let root_node = &nodes[root];
    assert_eq!(root_node["id"], root);
    assert_eq!(root_node["op"], "calc:pricing.gross_margin_ratio");
    assert_eq!(
        root_node["meta"]["input_names"],
        serde_json::json!(["pricing.gross_profit", "sales"])
    );
    for (id, node) in nodes {
        assert_eq!(node["id"].as_str(), Some(id.as_str()));
    }
}

#[test]
fn explain_renders_a_stable_tree() {
    let engine = pricing_engine();
    let context = Context::new().with("sales", 1000).with("cost", 650);
    let margin = engine
        .calculate("pricing.gross_margin_ratio", &context)
        .unwrap();

    let tree = provenance::explain(&margin, 8);
    assert!(tree.starts_with("calc:pricing.gross_margin_ratio"));
    assert!(tree.contains("calc:pricing.gross_profit"));
    assert!(tree.contains("literal"));
    assert!(tree.contains("(sales)"));
    assert_eq!(tree, provenance::explain(&margin, 8));

    let shallow = provenance::explain(&margin, 1);
    assert_eq!(shallow.lines().count(), 1);
}

#[test]
fn spans_annotate_engine_results() {
    let engine = pricing_engine();
    let context = Context::new().with("sales", 1000).with("cost", 650);

    let _quarter = span("q1_close").attr("quarter", "Q1").enter();
    let margin = engine
        .calculate("pricing.gross_margin_ratio", &context)
        .unwrap();
    let node = provenance::node(margin.provenance_id().unwrap()).unwrap();
    assert_eq!(node.meta["span"], "q1_close");
    assert_eq!(node.meta["span_hierarchy"], serde_json::json!(["q1_close"]));
    assert_eq!(node.meta["span_attrs"]["quarter"], "Q1");
}

#[test]
fn graph_returns_the_reachable_nodes() {
    let value = Value::money(7, "USD")
        .unwrap()
        .add(&Value::money(3, "USD").unwrap())
        .unwrap();
    let graph = provenance::graph(&value).unwrap();
    assert_eq!(graph.len(), 3);
    assert!(graph.contains_key(&value.provenance_id().unwrap()));

    let bare = Value::none(Unit::Dimensionless).with_provenance(None);
    assert!(provenance::graph(&bare).unwrap().is_empty());
}

#[test]
fn call_policy_overrides_for_the_whole_call() {
    let engine = pricing_engine();
    let context = Context::new().with("sales", 1000).with("cost", 650);
    let coarse = Policy::builder().decimal_places(1).build();
    let profit = engine
        .calculate_with("pricing.gross_profit", &context, Some(coarse), false)
        .unwrap();
    assert_eq!(profit.amount_as_decimal(), Some(&dec("350.0")));
}
