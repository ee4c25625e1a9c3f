//! Error types for calculation registration and evaluation.

use tally_common::ValueError;

/// Errors returned by the registry and engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The target name is not registered.
    #[error("unknown calculation: {name}")]
    UnknownCalculation { name: String },

    /// A fully-qualified name was registered twice.
    #[error("duplicate calculation: {name}")]
    DuplicateCalculation { name: String },

    /// The name is empty, has empty segments or carries illegal characters.
    #[error("invalid calculation name: {name:?}")]
    InvalidName { name: String },

    /// The dependency graph contains a cycle; the path walks it once.
    #[error("circular dependency: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    /// A required leaf is neither in the context nor registered.
    #[error("missing input: {name}")]
    MissingInput { name: String },

    /// A user calculation function failed; the source is unchanged.
    #[error("calculation {name} failed: {source}")]
    Calculation {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// A value-level failure while lifting inputs or recording provenance.
    #[error(transparent)]
    Value(#[from] ValueError),
}
