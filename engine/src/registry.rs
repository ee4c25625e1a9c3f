//! Namespaced calculation registration.
//!
//! Calculations are declared in [`Collection`]s and merged into a
//! [`Registry`] in an explicit load step before first use. Dependency
//! names are stored verbatim; resolution happens at engine build time.

use crate::errors::EngineError;
use itertools::Itertools;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tally_common::{Unit, Value};

/// Calculation function: resolved dependency values in declaration order.
pub type CalcFn = Arc<dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// A registered calculation.
#[derive(Clone)]
pub struct CalcDescriptor {
    /// Fully-qualified name
    pub name: String,

    /// Dependency names, verbatim as declared
    pub dependencies: Vec<String>,

    pub function: CalcFn,

    /// Declared return unit, documentation only
    pub return_unit: Option<Unit>,

    /// Declared input units, documentation only
    pub input_units: Vec<Unit>,
}

impl fmt::Debug for CalcDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalcDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("return_unit", &self.return_unit)
            .finish()
    }
}

/// A namespaced container of calculations awaiting load.
pub struct Collection {
    namespace: String,
    entries: Vec<CalcDescriptor>,
}

impl Collection {
    pub fn new(namespace: &str) -> Result<Self, EngineError> {
        validate_name(namespace)?;
        Ok(Self {
            namespace: namespace.to_string(),
            entries: Vec::new(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Register a calculation under this collection's namespace.
    ///
    /// A local name is prefixed with the namespace; a name containing `.`
    /// (or starting with the `:` sigil, which is stripped) is absolute.
    pub fn register<F>(
        &mut self,
        name: &str,
        dependencies: &[&str],
        function: F,
    ) -> Result<(), EngineError>
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register_described(name, dependencies, function, None, &[])
    }

    /// Register with declared units for documentation.
    pub fn register_described<F>(
        &mut self,
        name: &str,
        dependencies: &[&str],
        function: F,
        return_unit: Option<Unit>,
        input_units: &[Unit],
    ) -> Result<(), EngineError>
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let qualified = self.qualify(name)?;
        if self.entries.iter().any(|e| e.name == qualified) {
            return Err(EngineError::DuplicateCalculation { name: qualified });
        }
        self.entries.push(CalcDescriptor {
            name: qualified,
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            function: Arc::new(function),
            return_unit,
            input_units: input_units.to_vec(),
        });
        Ok(())
    }

    fn qualify(&self, name: &str) -> Result<String, EngineError> {
        // Leading ':' marks an absolute name and is stripped
        let (name, absolute) = match name.strip_prefix(':') {
            Some(stripped) => (stripped, true),
            None => (name, name.contains('.')),
        };
        let qualified = if absolute {
            name.to_string()
        } else {
            format!("{}.{}", self.namespace, name)
        };
        validate_name(&qualified)?;
        Ok(qualified)
    }
}

/// Process-wide mapping from fully-qualified name to descriptor.
#[derive(Default)]
pub struct Registry {
    map: HashMap<String, Arc<CalcDescriptor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialise a collection into the registry. Duplicate
    /// fully-qualified names fail the whole load.
    pub fn load(&mut self, collection: Collection) -> Result<(), EngineError> {
        for descriptor in &collection.entries {
            if self.map.contains_key(&descriptor.name) {
                return Err(EngineError::DuplicateCalculation {
                    name: descriptor.name.clone(),
                });
            }
        }
        for descriptor in collection.entries {
            self.map.insert(descriptor.name.clone(), Arc::new(descriptor));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CalcDescriptor>> {
        self.map.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.map.keys().cloned().sorted().collect()
    }
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

/// Install the process-wide registry. Write-once: a second install fails.
pub fn install_global(registry: Registry) -> anyhow::Result<()> {
    GLOBAL
        .set(Arc::new(registry))
        .map_err(|_| anyhow::anyhow!("global registry already installed"))
}

/// The process-wide registry, if installed.
pub fn global() -> Option<Arc<Registry>> {
    GLOBAL.get().cloned()
}

fn validate_name(name: &str) -> Result<(), EngineError> {
    let invalid = || EngineError::InvalidName {
        name: name.to_string(),
    };
    if name.is_empty() {
        return Err(invalid());
    }
    for segment in name.split('.') {
        if segment.is_empty() {
            return Err(invalid());
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(invalid());
        }
    }
    Ok(())
}

// -- Tests --
#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> impl Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static {
        |_args: &[Value]| Ok(Value::zero(Unit::Dimensionless))
    }

    #[test]
    fn local_names_are_prefixed() {
        let mut collection = Collection::new("pricing").unwrap();
        collection.register("gross_profit", &["sales", "cost"], noop()).unwrap();
        let mut registry = Registry::new();
        registry.load(collection).unwrap();
        assert!(registry.contains("pricing.gross_profit"));
        assert!(!registry.contains("gross_profit"));
    }

    #[test]
    fn dotted_and_sigil_names_are_absolute() {
        let mut collection = Collection::new("pricing").unwrap();
        collection.register("other.metric", &[], noop()).unwrap();
        collection.register(":top_level", &[], noop()).unwrap();
        let mut registry = Registry::new();
        registry.load(collection).unwrap();
        assert!(registry.contains("other.metric"));
        assert!(registry.contains("top_level"));
    }

    #[test]
    fn duplicates_fail_at_registration() {
        let mut collection = Collection::new("pricing").unwrap();
        collection.register("margin", &[], noop()).unwrap();
        assert!(matches!(
            collection.register("margin", &[], noop()),
            Err(EngineError::DuplicateCalculation { .. })
        ));
    }

    #[test]
    fn duplicates_fail_across_collections_at_load() {
        let mut first = Collection::new("pricing").unwrap();
        first.register("margin", &[], noop()).unwrap();
        let mut second = Collection::new("sales").unwrap();
        second.register("pricing.margin", &[], noop()).unwrap();

        let mut registry = Registry::new();
        registry.load(first).unwrap();
        assert!(matches!(
            registry.load(second),
            Err(EngineError::DuplicateCalculation { .. })
        ));
    }

    #[test]
    fn bad_names_are_rejected() {
        assert!(matches!(
            Collection::new(""),
            Err(EngineError::InvalidName { .. })
        ));
        let mut collection = Collection::new("ns").unwrap();
        assert!(collection.register("has space", &[], noop()).is_err());
        assert!(collection.register("trailing.", &[], noop()).is_err());
        assert!(collection.register("a..b", &[], noop()).is_err());
    }

    #[test]
    fn dependencies_are_stored_verbatim() {
        let mut collection = Collection::new("ns").unwrap();
        collection
            .register("metric", &["raw_input", "other.calc"], noop())
            .unwrap();
        let mut registry = Registry::new();
        registry.load(collection).unwrap();
        let descriptor = registry.get("ns.metric").unwrap();
        assert_eq!(descriptor.dependencies, vec!["raw_input", "other.calc"]);
    }
}
