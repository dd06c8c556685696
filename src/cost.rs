//! The analytic, cache-aware cost evaluator (§4.4): walks a finished or
//! in-progress [`PartialSchedule`] and produces a single scalar predicting
//! relative runtime, plus a per-function breakdown for diagnostics.
//!
//! Grounded on the original's `cost_of_cold_load` plus its `cost()` walk
//! over the schedule tree — reshaped here into a single recursive pass
//! keyed by each node's already-resolved [`Bound`] rather than re-deriving
//! regions on the fly, since this crate's tree carries that bound directly
//! (see `schedule.rs`'s module doc for why parent pointers aren't needed).

use std::collections::{HashMap, HashSet};

use crate::config::MachineParams;
use crate::dag::{FuncId, FunctionDag};
use crate::error::InvariantError;
use crate::schedule::{get_bounds, Bound, PartialSchedule};

/// Predicted cost of one schedule, broken down for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct CostBreakdown {
    pub compute_cost: f64,
    pub memory_cost: f64,
    /// Essential compute this schedule cannot avoid (§4.3/§4.4): the sum,
    /// over every distinct scheduled function, of `get_bounds(n).min_cost`.
    /// Subtracted out of [`total`](Self::total) so the search objective
    /// measures only redundant work plus memory, not total work.
    pub essential_cost: f64,
    /// `(compute, memory)` contribution attributed to each function.
    pub per_func: HashMap<FuncId, (f64, f64)>,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.compute_cost + self.memory_cost - self.essential_cost
    }

    fn add(&mut self, id: &FuncId, compute: f64, memory: f64) {
        self.compute_cost += compute;
        self.memory_cost += memory;
        let entry = self.per_func.entry(id.clone()).or_insert((0.0, 0.0));
        entry.0 += compute;
        entry.1 += memory;
    }
}

/// Cost of bringing `bytes` bytes in from a cold cache: `balance ×
/// sqrt(bytes / last_level_cache_size)`, the calibration point at which a
/// full-cache-size load costs exactly `balance`.
pub fn cost_of_cold_load(bytes: f64, params: &MachineParams) -> f64 {
    params.balance * (bytes.max(0.0) / params.last_level_cache_size as f64).sqrt()
}

/// Evaluate the total predicted cost of `root`: the raw tree-walked compute
/// and memory cost, normalized by subtracting each scheduled function's
/// essential (unavoidable) cost per §4.4's "Final cost per State".
pub fn evaluate(
    dag: &FunctionDag,
    root: &PartialSchedule,
    params: &MachineParams,
    estimates: &HashMap<FuncId, Vec<(i64, i64)>>,
) -> Result<CostBreakdown, InvariantError> {
    let mut breakdown = CostBreakdown::default();
    walk(dag, root, 1.0, params, &mut breakdown);

    let mut seen = HashSet::new();
    essential_cost(dag, root, root, estimates, &mut seen, &mut breakdown.essential_cost)?;

    Ok(breakdown)
}

/// Sum `get_bounds(n).min_cost` once per distinct function realized
/// (compute-rooted, anywhere in the tree) or inlined in `node`'s subtree.
fn essential_cost(
    dag: &FunctionDag,
    root: &PartialSchedule,
    node: &PartialSchedule,
    estimates: &HashMap<FuncId, Vec<(i64, i64)>>,
    seen: &mut HashSet<FuncId>,
    sum: &mut f64,
) -> Result<(), InvariantError> {
    if let Some(id) = &node.func {
        if node.store_here && seen.insert(id.clone()) {
            let bound = node
                .bound
                .as_ref()
                .expect("a store_here node always carries its resolved bound");
            *sum += bound.min_cost;
        }
    }
    for id in node.inlined.keys() {
        if seen.insert(id.clone()) {
            *sum += get_bounds(dag, root, id, estimates)?.min_cost;
        }
    }
    for child in &node.children {
        essential_cost(dag, root, child, estimates, seen, sum)?;
    }
    Ok(())
}

fn walk(
    dag: &FunctionDag,
    node: &PartialSchedule,
    instances: f64,
    params: &MachineParams,
    out: &mut CostBreakdown,
) {
    for (id, calls) in &node.inlined {
        let n = dag.node(id);
        let compute = instances * (*calls as f64) * n.compute_if_inlined;
        out.add(id, compute, 0.0);
    }

    if let Some(id) = &node.func {
        let n = dag.node(id);
        let region = node
            .bound
            .as_ref()
            .expect("a node carrying a func always carries its resolved bound");

        if node.store_here {
            let points = region.points() as f64;
            let fold = fold_discount(node);
            let allocation_size = n.memory * points;
            let edges = dag.outgoing(id).len() as f64;
            let memory =
                instances * n.memory * points * cost_of_cold_load(allocation_size, params) * fold * edges;
            out.add(id, 0.0, memory);
        }

        if node.children.is_empty() {
            let overcompute = overcompute_factor(n.vector_size, region);
            let compute = instances * region.points() as f64 * n.compute * overcompute;
            out.add(id, compute, 0.0);
        }
    }

    for child in &node.children {
        let trip = match (&node.bound, &child.bound) {
            (Some(outer), Some(inner)) => tile_count(outer, inner),
            _ => 1.0,
        };
        walk(dag, child, instances * trip, params, out);
    }
}

/// Number of times a tiled node's inner child runs per execution of the
/// outer level: the product, across dimensions, of the outer extent
/// divided by the inner (tile) extent, rounded up.
fn tile_count(outer: &Bound, inner: &Bound) -> f64 {
    outer
        .region
        .iter()
        .zip(inner.region.iter())
        .map(|(&(_, oe), &(_, ie))| (oe as f64 / (ie.max(1)) as f64).ceil())
        .product()
}

/// Discount (or penalty) applied to the allocation size of a `store_here`
/// node whose compute site differs from its storage site: scan the region
/// dimensions outermost to innermost (this crate lists dimensions
/// innermost-first, so that's index `dims - 1` down to `0`) for the first
/// one where the computed (inner, per-tile) extent is strictly smaller than
/// the realized (outer, stored) extent. If that first shrinking dimension
/// is the innermost one, folding it would break vectorization, so the
/// discount is forced to a large penalty instead. If no dimension shrinks,
/// a small tax models unnecessary folding machinery. Compute and storage
/// coincide at a leaf (`children.is_empty()`), so the baseline is `1`.
fn fold_discount(node: &PartialSchedule) -> f64 {
    if node.children.is_empty() {
        return 1.0;
    }
    let realized = node
        .bound
        .as_ref()
        .expect("a store_here node always carries its resolved bound");
    let computed = match node.children[0].bound.as_ref() {
        Some(b) => b,
        None => return 1.0,
    };

    for dim in (0..realized.dims()).rev() {
        let (_, er) = realized.region[dim];
        let (_, ec) = computed.region[dim];
        if ec < er {
            return if dim == 0 { 1e10 } else { ec as f64 / er as f64 };
        }
    }
    1.01
}

/// Extra work incurred in an innermost loop: rounding a vectorized
/// dimension's extent up to a whole number of vector lanes, plus a
/// loop-boundary overhead tax that applies even without vectorization.
fn overcompute_factor(vector_size: i64, region: &Bound) -> f64 {
    match region.region.first() {
        Some(&(_, s0)) if s0 > 0 => {
            let lanes = vector_size.max(1) as f64;
            let s0 = s0 as f64;
            let vectors = (s0 / lanes).ceil();
            let vector_ratio = (vectors * lanes) / s0;
            let boundary_tax = (s0 + 100.0) / s0;
            vector_ratio * boundary_tax
        }
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetInfo;
    use crate::dag::FuncSpec;
    use crate::expr::Expr;
    use crate::schedule::PartialSchedule;
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

    /// A two-dimensional producer `f` consumed by output `g`, so `f` has an
    /// outgoing edge (memory cost is billed) and a tileable outer dimension
    /// distinct from its innermost one (so tiling it earns a fold discount
    /// rather than the innermost-folding penalty).
    fn producer_consumer_dag() -> FunctionDag {
        let f = FuncSpec {
            id: FuncId::new("f"),
            args: vec![Rc::from("x"), Rc::from("y")],
            values: vec![Expr::var("x")],
            estimates: vec![None, None],
            has_update: false,
            bytes_per_element: 4,
            narrowest_scalar_bytes: 4,
        };
        let g = FuncSpec {
            id: FuncId::new("g"),
            args: vec![Rc::from("x"), Rc::from("y")],
            values: vec![Expr::call(
                FuncId::new("f"),
                vec![Expr::var("x"), Expr::var("y")],
            )],
            estimates: vec![Some((0, 64)), Some((0, 64))],
            has_update: false,
            bytes_per_element: 4,
            narrowest_scalar_bytes: 4,
        };
        FunctionDag::build(
            &[FuncId::new("g")],
            vec![f, g],
            &MachineParams::default(),
            &TargetInfo::default(),
        )
        .unwrap()
    }

    #[test]
    fn tiled_schedule_costs_less_memory_than_fully_realized() {
        let dag = producer_consumer_dag();
        let params = MachineParams::default();
        let f = FuncId::new("f");
        let g = FuncId::new("g");

        let mut estimates = HashMap::new();
        estimates.insert(g.clone(), vec![(0, 64), (0, 64)]);

        let root = PartialSchedule::new_root();
        let g_bound = get_bounds(&dag, &root, &g, &estimates).unwrap();
        let root = root.compute_here(&dag, &g, g_bound);
        let f_bound = get_bounds(&dag, &root, &f, &estimates).unwrap();

        let realized = root.clone().compute_here(&dag, &f, f_bound.clone());
        // Tile only the outer (y) dimension; the innermost (x) stays full so
        // this doesn't trip the innermost-folding penalty.
        let tiled = root.compute_in_tiles(&dag, &f, f_bound, &[64, 8], false);

        let realized_cost = evaluate(&dag, &realized, &params, &estimates).unwrap();
        let tiled_cost = evaluate(&dag, &tiled, &params, &estimates).unwrap();

        assert!(tiled_cost.memory_cost < realized_cost.memory_cost);
        assert!(realized_cost.per_func.contains_key(&f));
        assert!(tiled_cost.per_func.contains_key(&f));
    }

    #[test]
    fn innermost_folding_incurs_the_large_penalty() {
        let dag = producer_consumer_dag();
        let params = MachineParams::default();
        let f = FuncId::new("f");
        let g = FuncId::new("g");

        let mut estimates = HashMap::new();
        estimates.insert(g.clone(), vec![(0, 64), (0, 64)]);

        let root = PartialSchedule::new_root();
        let g_bound = get_bounds(&dag, &root, &g, &estimates).unwrap();
        let root = root.compute_here(&dag, &g, g_bound);
        let f_bound = get_bounds(&dag, &root, &f, &estimates).unwrap();

        let realized = root.clone().compute_here(&dag, &f, f_bound.clone());
        // Tile the innermost (x) dimension: folding it should be penalized.
        let folded = root.compute_in_tiles(&dag, &f, f_bound, &[8, 64], false);

        let realized_cost = evaluate(&dag, &realized, &params, &estimates).unwrap();
        let folded_cost = evaluate(&dag, &folded, &params, &estimates).unwrap();

        assert!(folded_cost.memory_cost >= 1e9 * realized_cost.memory_cost);
    }

    #[test]
    fn inlining_attributes_compute_cost_to_the_inlined_function() {
        let dag = tiny_dag();
        let params = MachineParams::default();
        let f = FuncId::new("f");
        let mut estimates = HashMap::new();
        estimates.insert(f.clone(), vec![(0, 1024)]);

        let root = PartialSchedule::new_root().inline_func(&f, 5);
        let cost = evaluate(&dag, &root, &params, &estimates).unwrap();
        assert!(cost.compute_cost > 0.0);
        assert_eq!(cost.memory_cost, 0.0);
    }
}
