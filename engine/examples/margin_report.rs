// Example: Quarterly margin metrics over a small calculation registry
//
// Usage: cargo run --example margin_report

use anyhow::Result;
use bigdecimal::BigDecimal;
use std::str::FromStr;
use tally_common::convert::{default_registry, ConversionContext};
use tally_common::provenance::{self, span};
use tally_common::reduce;
use tally_common::{Unit, Value};
use tally_engine::{Collection, Context, Engine, Registry};

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    // Declare the metrics once, load them into a registry
    let mut pricing = Collection::new("pricing")?;
    pricing.register("gross_profit", &["sales", "cost"], |args: &[Value]| {
        args[0].subtract(&args[1]).map_err(anyhow::Error::from)
    })?;
    pricing.register(
        "gross_margin_ratio",
        &["pricing.gross_profit", "sales"],
        |args: &[Value]| args[0].divide(&args[1]).map_err(anyhow::Error::from),
    )?;
    let mut registry = Registry::new();
    registry.load(pricing)?;
    let engine = Engine::new(registry);

    // Evaluate one quarter inside a span so provenance carries the label
    let _quarter = span("q1_close").attr("quarter", "Q1").enter();
    let context = Context::new()
        .with("sales", Value::money(125_000, "USD")?)
        .with("cost", Value::money(81_250, "USD")?);

    let margin = engine.calculate("pricing.gross_margin_ratio", &context)?;
    println!("gross margin: {}", margin.as_percentage()?);

    println!("\nhow it was computed:");
    print!("{}", provenance::explain(&margin, 6));

    // Reductions over monthly figures with a gap in the data
    let months = vec![
        Value::money(42_000, "USD")?,
        Value::none(Unit::money("USD")),
        Value::money(40_500, "USD")?,
        Value::money(42_500, "USD")?,
    ];
    println!("\nquarter sales: {}", reduce::sum(months.clone())?);
    println!("monthly mean:  {}", reduce::mean(months)?);

    // A registered conversion edge, applied through the value layer
    default_registry().register(Unit::money("USD"), Unit::money("EUR"), |amount, _ctx| {
        Ok(amount * BigDecimal::from_str("0.92")?)
    });
    let eur = Value::money(1000, "USD")?.convert_to(&Unit::money("EUR"), &ConversionContext::new())?;
    println!("\n1000.00 USD is {eur}");

    Ok(())
}
