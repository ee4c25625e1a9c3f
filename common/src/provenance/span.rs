//! Scoped span labels recorded onto provenance nodes.

use super::node::Meta;
use std::cell::RefCell;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Frame {
    name: String,
    attrs: BTreeMap<String, serde_json::Value>,
}

thread_local! {
    static SPANS: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Builder for a span scope. Attach attributes, then [`Span::enter`].
pub struct Span {
    name: String,
    attrs: BTreeMap<String, serde_json::Value>,
}

/// Start building a span with the given name.
pub fn span(name: impl Into<String>) -> Span {
    Span {
        name: name.into(),
        attrs: BTreeMap::new(),
    }
}

impl Span {
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Push the span; nodes created before the guard drops record it.
    #[must_use = "the span is popped when the guard drops"]
    pub fn enter(self) -> SpanGuard {
        SPANS.with(|stack| {
            stack.borrow_mut().push(Frame {
                name: self.name,
                attrs: self.attrs,
            })
        });
        SpanGuard(())
    }
}

/// Pops the span stack on drop.
pub struct SpanGuard(());

impl Drop for SpanGuard {
    fn drop(&mut self) {
        SPANS.with(|stack| stack.borrow_mut().pop());
    }
}

/// Span metadata for the innermost active span, if any.
pub(crate) fn span_meta() -> Option<Meta> {
    SPANS.with(|stack| {
        let stack = stack.borrow();
        let inner = stack.last()?;
        let mut meta = Meta::new();
        meta.insert("span".to_string(), inner.name.clone().into());
        meta.insert(
            "span_hierarchy".to_string(),
            stack
                .iter()
                .map(|f| serde_json::Value::from(f.name.clone()))
                .collect::<Vec<_>>()
                .into(),
        );
        meta.insert("span_depth".to_string(), stack.len().into());
        if !inner.attrs.is_empty() {
            meta.insert(
                "span_attrs".to_string(),
                serde_json::to_value(&inner.attrs).unwrap_or_default(),
            );
        }
        Some(meta)
    })
}

// -- Tests --
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_span_no_meta() {
        assert!(span_meta().is_none());
    }

    #[test]
    fn nested_spans_record_hierarchy() {
        let _outer = span("quarter").attr("period", "Q1").enter();
        {
            let _inner = span("margin").enter();
            let meta = span_meta().unwrap();
            assert_eq!(meta["span"], "margin");
            assert_eq!(
                meta["span_hierarchy"],
                serde_json::json!(["quarter", "margin"])
            );
            assert_eq!(meta["span_depth"], 2);
            assert!(!meta.contains_key("span_attrs"));
        }
        let meta = span_meta().unwrap();
        assert_eq!(meta["span"], "quarter");
        assert_eq!(meta["span_depth"], 1);
        assert_eq!(meta["span_attrs"]["period"], "Q1");
    }
}
