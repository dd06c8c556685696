//! Turns a finished [`PartialSchedule`] into a flat list of
//! [`Directive`]s plus the cost breakdown that justified them — the
//! output this crate actually hands back to a caller (§4.6/§4.7).
//!
//! Two small passes: [`FuncVars`] names each function's loop variables from
//! its resolved region, then [`materialize`] walks the tree once, emitting
//! directives in outer-to-inner order.

use std::collections::HashMap;

use crate::config::MachineParams;
use crate::cost::{evaluate, CostBreakdown};
use crate::dag::{FuncId, FunctionDag};
use crate::directive::{Directive, TailStrategy};
use crate::error::InvariantError;
use crate::schedule::PartialSchedule;

/// One named loop variable over a function's dimension, with its resolved
/// extent.
#[derive(Debug, Clone)]
pub struct FuncVar {
    pub name: String,
    pub extent: i64,
}

/// A function's loop variables, named `<func>.<dim>` to match the region
/// variables the DAG builder already uses internally.
#[derive(Debug, Clone)]
pub struct FuncVars {
    pub vars: Vec<FuncVar>,
}

impl FuncVars {
    fn from_bound(id: &FuncId, region: &[(i64, i64)]) -> Self {
        let vars = region
            .iter()
            .enumerate()
            .map(|(i, &(_, extent))| FuncVar {
                name: format!("{id}.{i}"),
                extent,
            })
            .collect();
        FuncVars { vars }
    }
}

/// The materializer's output: the directive stream plus the predicted cost
/// that drove it.
#[derive(Debug, Clone)]
pub struct MaterializeResult {
    pub directives: Vec<Directive>,
    pub cost: CostBreakdown,
}

/// Materialize `root` into directives, reporting the cost of the schedule
/// as a whole.
pub fn materialize(
    dag: &FunctionDag,
    root: &PartialSchedule,
    params: &MachineParams,
    estimates: &HashMap<FuncId, Vec<(i64, i64)>>,
) -> Result<MaterializeResult, InvariantError> {
    let cost = evaluate(dag, root, params, estimates)?;
    let mut directives = Vec::new();

    for id in root.inlined.keys() {
        directives.push(Directive::Inline { func: id.clone() });
    }
    for child in &root.children {
        materialize_node(dag, child, &mut directives);
    }

    Ok(MaterializeResult { directives, cost })
}

fn materialize_node(dag: &FunctionDag, node: &PartialSchedule, out: &mut Vec<Directive>) {
    let id = node
        .func
        .clone()
        .expect("every direct child of the root carries a func, by construction");
    out.push(Directive::ComputeRoot { func: id.clone() });

    let region = &node
        .bound
        .as_ref()
        .expect("a scheduled node always carries its resolved bound")
        .region;
    let vars = FuncVars::from_bound(&id, region);

    if node.children.is_empty() {
        if let Some(d) = node.vectorized_dim {
            emit_vectorize(dag, &id, &vars, d, out);
        }
        for inlined_id in node.inlined.keys() {
            out.push(Directive::Inline {
                func: inlined_id.clone(),
            });
        }
        return;
    }

    let inner = &node.children[0];
    let inner_region = &inner
        .bound
        .as_ref()
        .expect("tiled inner node always carries its resolved bound")
        .region;

    let mut outer_vars = Vec::with_capacity(vars.vars.len());
    for (i, var) in vars.vars.iter().enumerate() {
        let inner_extent = inner_region[i].1;
        if inner_extent >= var.extent {
            outer_vars.push(var.name.clone());
            continue;
        }
        let outer = format!("{}.o", var.name);
        let inner_name = format!("{}.i", var.name);
        out.push(Directive::Split {
            func: id.clone(),
            var: var.name.clone(),
            outer: outer.clone(),
            inner: inner_name,
            factor: inner_extent,
            tail: tail_strategy(var.extent, inner_extent),
        });
        outer_vars.push(outer);
    }

    if node.parallel {
        if let Some(first) = outer_vars.first() {
            out.push(Directive::Parallel {
                func: id.clone(),
                var: first.clone(),
            });
        }
    }

    if let Some(d) = inner.vectorized_dim {
        let var_name = format!("{}.i", vars.vars[d].name);
        let lanes = dag.node(&id).vector_size;
        out.push(Directive::Vectorize {
            func: id.clone(),
            var: var_name,
            lanes,
        });
    }

    for inlined_id in inner.inlined.keys() {
        out.push(Directive::Inline {
            func: inlined_id.clone(),
        });
    }
}

fn emit_vectorize(dag: &FunctionDag, id: &FuncId, vars: &FuncVars, dim: usize, out: &mut Vec<Directive>) {
    let lanes = dag.node(id).vector_size;
    let var = &vars.vars[dim];
    let outer = format!("{}.o", var.name);
    let inner = format!("{}.i", var.name);
    out.push(Directive::Split {
        func: id.clone(),
        var: var.name.clone(),
        outer,
        inner: inner.clone(),
        factor: lanes,
        tail: tail_strategy(var.extent, lanes),
    });
    out.push(Directive::Vectorize {
        func: id.clone(),
        var: inner,
        lanes,
    });
}

/// `RoundUp` iff `parent_extent` splits evenly by `factor`, else
/// `GuardWithIf` — the original's `ShiftInwards` isn't in this crate's
/// directive vocabulary (spec §6 only names the two).
fn tail_strategy(parent_extent: i64, factor: i64) -> TailStrategy {
    if factor != 0 && parent_extent % factor == 0 {
        TailStrategy::RoundUp
    } else {
        TailStrategy::GuardWithIf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetInfo;
    use crate::dag::FuncSpec;
    use crate::expr::Expr;
    use crate::schedule::{Bound, PartialSchedule};
    use std::rc::Rc;

    fn tiny_dag() -> FunctionDag {
        let f = FuncSpec {
            id: FuncId::new("f"),
            args: vec![Rc::from("x")],
            values: vec![Expr::var("x")],
            estimates: vec![Some((0, 1024))],
            has_update: false,
            bytes_per_element: 4,
            narrowest_scalar_bytes: 4,
        };
        FunctionDag::build(
            &[FuncId::new("f")],
            vec![f],
            &MachineParams::default(),
            &TargetInfo::default(),
        )
        .unwrap()
    }

    #[test]
    fn a_leaf_realization_emits_compute_root_and_vectorize() {
        let dag = tiny_dag();
        let params = MachineParams::default();
        let f = FuncId::new("f");
        let root = PartialSchedule::new_root().compute_here(&dag, &f, Bound::new(vec![(0, 1024)]));
        let mut estimates = HashMap::new();
        estimates.insert(f.clone(), vec![(0, 1024)]);

        let result = materialize(&dag, &root, &params, &estimates).unwrap();
        assert!(result
            .directives
            .iter()
            .any(|d| matches!(d, Directive::ComputeRoot { func } if func == &f)));
        assert!(result
            .directives
            .iter()
            .any(|d| matches!(d, Directive::Vectorize { func, .. } if func == &f)));
    }

    #[test]
    fn a_tiled_realization_emits_a_split_and_parallel() {
        let dag = tiny_dag();
        let params = MachineParams::default();
        let f = FuncId::new("f");
        let root = PartialSchedule::new_root().compute_in_tiles(
            &dag,
            &f,
            Bound::new(vec![(0, 1024)]),
            &[64],
            true,
        );
        let mut estimates = HashMap::new();
        estimates.insert(f.clone(), vec![(0, 1024)]);

        let result = materialize(&dag, &root, &params, &estimates).unwrap();
        assert!(result
            .directives
            .iter()
            .any(|d| matches!(d, Directive::Split { func, factor: 64, .. } if func == &f)));
        assert!(result
            .directives
            .iter()
            .any(|d| matches!(d, Directive::Parallel { func, .. } if func == &f)));
        // 1024 % 64 == 0: the tail should round up, not guard.
        assert!(result.directives.iter().any(|d| matches!(
            d,
            Directive::Split {
                func,
                factor: 64,
                tail: TailStrategy::RoundUp,
                ..
            } if func == &f
        )));
    }

    #[test]
    fn an_indivisible_tile_factor_guards_with_if() {
        let dag = tiny_dag();
        let params = MachineParams::default();
        let f = FuncId::new("f");
        let root = PartialSchedule::new_root().compute_in_tiles(
            &dag,
            &f,
            Bound::new(vec![(0, 1024)]),
            &[100],
            true,
        );
        let mut estimates = HashMap::new();
        estimates.insert(f.clone(), vec![(0, 1024)]);

        let result = materialize(&dag, &root, &params, &estimates).unwrap();
        assert!(result.directives.iter().any(|d| matches!(
            d,
            Directive::Split {
                func,
                factor: 100,
                tail: TailStrategy::GuardWithIf,
                ..
            } if func == &f
        )));
    }
}
