//! Error taxonomy for the autoscheduler core.
//!
//! Two kinds only, per the design: a [`ConfigError`] halts the search before
//! it starts (bad input from the front-end), an [`InvariantError`] is a bug
//! surfaced with enough context to locate it — the search never silently
//! downgrades to a suboptimal schedule.

use crate::dag::FuncId;

/// Reported immediately; the search never starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("function \"{func}\" is missing a bound estimate on dimension {dim}")]
    MissingEstimate { func: String, dim: usize },

    #[error("function \"{func}\" has an update/reduction definition, which this scheduler does not support")]
    UpdateDefinition { func: String },

    #[error("function \"{func}\" is defined twice with conflicting bodies")]
    DuplicateDefinition { func: String },
}

/// A bug in the caller or in this crate: the DAG or partial schedule violated
/// one of its own invariants. Fatal, with a location hint.
#[derive(Debug, thiserror::Error)]
pub enum InvariantError {
    #[error("region endpoint for \"{func}\" dimension {dim} did not simplify to a constant: {detail}")]
    NonConstantBound {
        func: String,
        dim: usize,
        detail: String,
    },

    #[error("get_bounds({func}) called at a non-root level but {func} has no consumers")]
    OutputWithoutRoot { func: String },

    #[error("no legal placement found for \"{func}\" at this point in the search")]
    NoPlacement { func: String },

    #[error("the beam-search queue emptied before every function was scheduled ({scheduled}/{total})")]
    SearchExhausted { scheduled: usize, total: usize },

    #[error("unresolved variable \"{0}\" while simplifying an expression")]
    UnboundVariable(String),

    #[error("function \"{0}\" does not appear in the function DAG")]
    UnknownFunction(FuncId),
}
