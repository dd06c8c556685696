//! The output vocabulary (§4.6): abstract scheduling directives a
//! front-end would replay against its own IR. This crate never touches a
//! real loop nest — it only ever describes one.

use serde::{Deserialize, Serialize};

use crate::dag::FuncId;

/// How a split handles an extent that isn't a multiple of its factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TailStrategy {
    RoundUp,
    GuardWithIf,
}

/// One scheduling instruction. A materialized schedule is a flat,
/// dependency-ordered list of these (outer loops emitted before the inner
/// loops they contain).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Directive {
    Split {
        func: FuncId,
        var: String,
        outer: String,
        inner: String,
        factor: i64,
        tail: TailStrategy,
    },
    Reorder {
        func: FuncId,
        vars: Vec<String>,
    },
    Vectorize {
        func: FuncId,
        var: String,
        lanes: i64,
    },
    Parallel {
        func: FuncId,
        var: String,
    },
    ComputeRoot {
        func: FuncId,
    },
    ComputeAt {
        func: FuncId,
        at: FuncId,
        var: String,
    },
    StoreAt {
        func: FuncId,
        at: FuncId,
    },
    Fuse {
        func: FuncId,
        outer: String,
        inner: String,
        fused: String,
    },
    Inline {
        func: FuncId,
    },
}
