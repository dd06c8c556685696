//! Crate root: public surface and the one top-level entry point.
//!
//! A tree-search autoscheduler core for a data-parallel array-language
//! compiler: given a pipeline's function DAG and its output bound
//! estimates, search for a loop nest schedule (what to inline, what to
//! realize in full, what to tile and parallelize) that minimizes a
//! cache-aware analytic cost model, then hand the decision back as a flat
//! list of scheduling directives.
//!
//! ```text
//! FuncSpec (+ estimates) -> FunctionDag -> beam search -> PartialSchedule -> directives
//! ```
//!
//! Submodules are listed below in dependency order (leaves first): bounds
//! algebra and leaf counting underlie the function DAG; the DAG and the
//! tile enumerator underlie the partial schedule tree; the schedule tree
//! underlies the cost evaluator; the cost evaluator underlies the beam
//! search driver; and the finished schedule is turned into directives by
//! the materializer.

#![forbid(unsafe_code)]

/// Symbolic interval arithmetic and the bounds-required-of-a-producer query.
pub mod bounds;
/// Machine parameters, target info, and the beam search's env-backed knobs.
pub mod config;
/// The analytic, cache-aware cost evaluator.
pub mod cost;
/// The function DAG: nodes, edges, and the construction algorithm.
pub mod dag;
/// The output vocabulary: abstract scheduling directives.
pub mod directive;
/// Configuration and invariant error taxonomy.
pub mod error;
/// The minimal integer-expression AST and leaf counter.
pub mod expr;
/// Turns a finished schedule tree into directives plus a cost breakdown.
pub mod materialize;
/// The partial schedule tree and its structural edits.
pub mod schedule;
/// The beam-search driver.
pub mod search;
/// Tile-shape enumeration.
pub mod tiling;

pub use config::{MachineParams, SearchConfig, TargetInfo};
pub use dag::{FuncId, FuncSpec, FunctionDag};
pub use directive::Directive;
pub use error::{ConfigError, InvariantError};
pub use expr::{CallKind, Expr};
pub use materialize::MaterializeResult;
pub use search::State;

use std::collections::HashMap;

use thiserror::Error;
use tracing::info;

/// Either stage of the pipeline can fail: a malformed pipeline description
/// is rejected before the search starts, and a bug surfacing mid-search is
/// reported rather than silently producing a worse schedule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}

/// Build the function DAG for `outputs`/`funcs`, search for a schedule
/// within `search_config`'s budget, and materialize the winning schedule
/// into directives. This is the crate's one entry point; every stage is
/// also exposed directly for front-ends that want to drive the pipeline
/// themselves (e.g. to inspect intermediate costs).
pub fn schedule_pipeline(
    outputs: &[FuncId],
    funcs: Vec<FuncSpec>,
    estimates: HashMap<FuncId, Vec<(i64, i64)>>,
    params: &MachineParams,
    target: &TargetInfo,
    search_config: &SearchConfig,
) -> Result<MaterializeResult, ScheduleError> {
    let dag = FunctionDag::build(outputs, funcs, params, target)?;
    info!(functions = dag.nodes.len(), "built function DAG");

    let best = search::search(&dag, &estimates, params, search_config)?;
    info!(cost = best.cost, "search converged");

    Ok(materialize::materialize(&dag, &best.schedule, params, &estimates)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use std::rc::Rc;

    #[test]
    fn point_wise_chain_schedules_end_to_end() {
        // S1: a short chain of point-wise functions should schedule cleanly
        // without error, producing at least one directive per function.
        let f = FuncSpec {
            id: FuncId::new("f"),
            args: vec![Rc::from("x"), Rc::from("y")],
            values: vec![Expr::add(Expr::var("x"), Expr::var("y"))],
            estimates: vec![None, None],
            has_update: false,
            bytes_per_element: 4,
            narrowest_scalar_bytes: 4,
        };
        let g = FuncSpec {
            id: FuncId::new("g"),
            args: vec![Rc::from("x"), Rc::from("y")],
            values: vec![Expr::add(
                Expr::call(FuncId::new("f"), vec![Expr::var("x"), Expr::var("y")]),
                Expr::Const(1),
            )],
            estimates: vec![Some((0, 512)), Some((0, 512))],
            has_update: false,
            bytes_per_element: 4,
            narrowest_scalar_bytes: 4,
        };

        let outputs = vec![FuncId::new("g")];
        let mut estimates = HashMap::new();
        estimates.insert(FuncId::new("g"), vec![(0, 512), (0, 512)]);

        let config = SearchConfig {
            random_dropout: 100,
            random_seed: 7,
            beam_size: 8,
            time_limit: None,
        };

        let result = schedule_pipeline(
            &outputs,
            vec![f, g],
            estimates,
            &MachineParams::default(),
            &TargetInfo::default(),
            &config,
        )
        .unwrap();

        assert!(!result.directives.is_empty());
        assert!(result.cost.total() >= 0.0);
    }
}
