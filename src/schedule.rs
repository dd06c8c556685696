//! The partial schedule tree (§4.3): a structurally-shared loop nest under
//! construction. Every edit (`inline_func`, `compute_here`,
//! `compute_in_tiles`) returns a new root; unaffected subtrees are shared
//! via `Rc`, never deep-copied.
//!
//! Unlike the original's intrusive, parent-pointed tree, nodes here never
//! point upward — a node's concrete region is resolved once, at the moment
//! it's created, from its caller's already-resolved region, and cached on
//! the node itself. Whole-tree queries (`computes`, the cost walk in
//! [`crate::cost`]) take the root and recurse down instead of chasing
//! parent links.

use std::collections::HashMap;
use std::rc::Rc;

use crate::dag::{FuncId, FunctionDag};
use crate::error::InvariantError;

/// A concrete per-dimension `(min, extent)` footprint, resolved from the
/// DAG's symbolic region algebra once bound estimates are known.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub region: Vec<(i64, i64)>,
    /// The smallest number of points this function's consumers could force
    /// it to produce, per §4.3's `get_bounds` (7): `min(region_points, Σ
    /// consumer_min_points × edge.calls)`. Equal to `region_points` for a
    /// `Bound` not produced by [`get_bounds`] (e.g. a tile shape).
    pub min_points: i64,
    /// The essential compute this function cannot avoid, regardless of how
    /// it ends up scheduled: `min(region_points × compute, min_points ×
    /// compute_if_inlined)`. Zero for a `Bound` not produced by
    /// [`get_bounds`].
    pub min_cost: f64,
}

impl Bound {
    pub fn new(region: Vec<(i64, i64)>) -> Self {
        let min_points = region.iter().map(|(_, extent)| *extent).product();
        Bound {
            region,
            min_points,
            min_cost: 0.0,
        }
    }

    /// Total points in this footprint.
    pub fn points(&self) -> i64 {
        self.region.iter().map(|(_, extent)| *extent).product()
    }

    pub fn dims(&self) -> usize {
        self.region.len()
    }
}

/// One level of the loop nest: either the synthetic root (no `func`, no
/// `bound`) or a concrete realization of one function.
#[derive(Debug, Clone)]
pub struct PartialSchedule {
    pub func: Option<FuncId>,
    pub bound: Option<Bound>,
    /// Index into `bound.region` of the vectorized dimension, if any.
    pub vectorized_dim: Option<usize>,
    /// True when storage for `func` is allocated at this level (as opposed
    /// to an ancestor). Always true for a node created by `compute_here`;
    /// true only for the outer of the two levels `compute_in_tiles` creates.
    pub store_here: bool,
    /// True when this level's loop is requested to run in parallel.
    pub parallel: bool,
    pub children: Vec<Rc<PartialSchedule>>,
    /// Functions fully inlined directly under this level, with the number
    /// of calls made to each per instance of this level's loop body.
    pub inlined: HashMap<FuncId, i64>,
}

impl PartialSchedule {
    pub fn new_root() -> Rc<Self> {
        Rc::new(PartialSchedule {
            func: None,
            bound: None,
            vectorized_dim: None,
            store_here: false,
            parallel: false,
            children: Vec::new(),
            inlined: HashMap::new(),
        })
    }

    pub fn is_root(&self) -> bool {
        self.func.is_none()
    }

    /// True if `id` is realized (compute-rooted or inlined) anywhere in
    /// this subtree.
    pub fn computes(&self, id: &FuncId) -> bool {
        if self.func.as_ref() == Some(id) {
            return true;
        }
        if self.inlined.contains_key(id) {
            return true;
        }
        self.children.iter().any(|c| c.computes(id))
    }

    /// Number of direct calls `consumer` makes to `producer` per instance
    /// of `consumer`'s own loop body, per the DAG's static edge count.
    pub fn calls_per_instance(dag: &FunctionDag, consumer: &FuncId, producer: &FuncId) -> i64 {
        dag.outgoing(producer)
            .iter()
            .map(|&ei| &dag.edges[ei])
            .filter(|e| &e.consumer == consumer)
            .map(|e| e.calls)
            .sum()
    }

    /// Returns a copy of this subtree with `id` marked fully inlined here,
    /// called `calls` times per instance of this level.
    pub fn inline_func(self: &Rc<Self>, id: &FuncId, calls: i64) -> Rc<Self> {
        let mut inlined = self.inlined.clone();
        *inlined.entry(id.clone()).or_insert(0) += calls;
        Rc::new(PartialSchedule {
            func: self.func.clone(),
            bound: self.bound.clone(),
            vectorized_dim: self.vectorized_dim,
            store_here: self.store_here,
            parallel: self.parallel,
            children: self.children.clone(),
            inlined,
        })
    }

    /// Returns a copy of this subtree with a new child computing `id` in
    /// full, over `region`, as a single uninterrupted loop nest.
    pub fn compute_here(self: &Rc<Self>, dag: &FunctionDag, id: &FuncId, region: Bound) -> Rc<Self> {
        let vectorized_dim = choose_vectorized_dim(dag, id, &region);
        let child = Rc::new(PartialSchedule {
            func: Some(id.clone()),
            bound: Some(region),
            vectorized_dim,
            store_here: true,
            parallel: false,
            children: Vec::new(),
            inlined: HashMap::new(),
        });
        self.with_child(child)
    }

    /// Returns a copy of this subtree with a new, two-level tiled
    /// realization of `id` appended: an outer loop over tiles (storage
    /// allocated here) wrapping one inner loop over a single tile.
    pub fn compute_in_tiles(
        self: &Rc<Self>,
        dag: &FunctionDag,
        id: &FuncId,
        region: Bound,
        tile: &[i64],
        mark_parallel: bool,
    ) -> Rc<Self> {
        assert_eq!(region.dims(), tile.len(), "tile shape must match region dimensionality");

        let tile_region: Vec<(i64, i64)> = region
            .region
            .iter()
            .zip(tile.iter())
            .map(|(&(min, _), &t)| (min, t))
            .collect();
        let tile_bound = Bound::new(tile_region);
        let vectorized_dim = choose_vectorized_dim(dag, id, &tile_bound);

        let inner = Rc::new(PartialSchedule {
            func: Some(id.clone()),
            bound: Some(tile_bound),
            vectorized_dim,
            store_here: false,
            parallel: false,
            children: Vec::new(),
            inlined: HashMap::new(),
        });

        let outer = Rc::new(PartialSchedule {
            func: Some(id.clone()),
            bound: Some(region),
            vectorized_dim: None,
            store_here: true,
            parallel: mark_parallel,
            children: vec![inner],
            inlined: HashMap::new(),
        });

        self.with_child(outer)
    }

    fn with_child(self: &Rc<Self>, child: Rc<PartialSchedule>) -> Rc<Self> {
        let mut children = self.children.clone();
        children.push(child);
        Rc::new(PartialSchedule {
            func: self.func.clone(),
            bound: self.bound.clone(),
            vectorized_dim: self.vectorized_dim,
            store_here: self.store_here,
            parallel: self.parallel,
            children,
            inlined: self.inlined.clone(),
        })
    }

    /// The resolved region for `id` as realized directly under this node
    /// (not searching descendants), if any.
    pub fn bound_of(&self, id: &FuncId) -> Option<&Bound> {
        if self.func.as_ref() == Some(id) {
            self.bound.as_ref()
        } else {
            None
        }
    }

    /// Search the whole subtree for the (unique, by construction) node
    /// realizing `id` and return its resolved region.
    pub fn resolved_region(&self, id: &FuncId) -> Option<&Bound> {
        if let Some(b) = self.bound_of(id) {
            return Some(b);
        }
        for c in &self.children {
            if let Some(b) = c.resolved_region(id) {
                return Some(b);
            }
        }
        None
    }
}

/// Resolve the concrete region required of `id`, given every already-scheduled
/// consumer found in `root`. For a pipeline output this is the caller-supplied
/// estimate; for anything else it's the union, across every edge into `id`,
/// of that edge's symbolic box evaluated at its consumer's own resolved
/// region. Only ever called with the tree's actual root — scheduling always
/// proceeds outputs-first, so by the time a producer needs its region every
/// function that calls it has already been placed somewhere in `root`.
pub fn get_bounds(
    dag: &FunctionDag,
    root: &PartialSchedule,
    id: &FuncId,
    estimates: &HashMap<FuncId, Vec<(i64, i64)>>,
) -> Result<Bound, InvariantError> {
    if !root.is_root() {
        return Err(InvariantError::OutputWithoutRoot {
            func: id.to_string(),
        });
    }

    let node = dag.node(id);

    if dag.outgoing(id).is_empty() {
        let region = estimates
            .get(id)
            .ok_or_else(|| InvariantError::NoPlacement {
                func: id.to_string(),
            })?;
        let region_points: i64 = region.iter().map(|(_, extent)| *extent).product();
        return Ok(Bound {
            region: region.clone(),
            min_points: region_points,
            min_cost: region_points as f64 * node.compute,
        });
    }

    let mut acc: Option<Vec<(i64, i64)>> = None;
    let mut min_points_sum: i64 = 0;
    for &ei in dag.outgoing(id) {
        let edge = &dag.edges[ei];
        let consumer_region = root
            .resolved_region(&edge.consumer)
            .ok_or_else(|| InvariantError::NoPlacement {
                func: edge.consumer.to_string(),
            })?;
        min_points_sum += consumer_region.min_points * edge.calls;

        let mut subst = HashMap::new();
        for (i, &(min, extent)) in consumer_region.region.iter().enumerate() {
            subst.insert(Rc::from(format!("{}.{}.min", edge.consumer, i)), min);
            subst.insert(
                Rc::from(format!("{}.{}.max", edge.consumer, i)),
                min + extent - 1,
            );
        }

        let mut box_here = Vec::with_capacity(edge.bounds.len());
        for interval in &edge.bounds {
            let lo = interval
                .min
                .simplify_to_const(&subst)
                .map_err(|e| to_non_constant(id, box_here.len(), e))?;
            let hi = interval
                .max
                .simplify_to_const(&subst)
                .map_err(|e| to_non_constant(id, box_here.len(), e))?;
            box_here.push((lo, hi - lo + 1));
        }

        acc = Some(match acc {
            None => box_here,
            Some(existing) => existing
                .into_iter()
                .zip(box_here.into_iter())
                .map(|((emin, eext), (nmin, next))| {
                    let lo = emin.min(nmin);
                    let hi = (emin + eext - 1).max(nmin + next - 1);
                    (lo, hi - lo + 1)
                })
                .collect(),
        });
    }

    let region = acc.ok_or_else(|| InvariantError::NoPlacement {
        func: id.to_string(),
    })?;
    let region_points: i64 = region.iter().map(|(_, extent)| *extent).product();
    let min_points = region_points.min(min_points_sum);
    let min_cost = (region_points as f64 * node.compute).min(min_points as f64 * node.compute_if_inlined);
    Ok(Bound {
        region,
        min_points,
        min_cost,
    })
}

fn to_non_constant(id: &FuncId, dim: usize, err: InvariantError) -> InvariantError {
    InvariantError::NonConstantBound {
        func: id.to_string(),
        dim,
        detail: err.to_string(),
    }
}

/// Pick the dimension to vectorize: the innermost (index 0, by this
/// crate's convention that a function's arguments are listed innermost
/// first) dimension whose extent is at least the function's natural vector
/// width. Falls back to no vectorization for sub-vector-width extents.
fn choose_vectorized_dim(dag: &FunctionDag, id: &FuncId, region: &Bound) -> Option<usize> {
    let node = dag.node(id);
    let width = node.vector_size;
    region
        .region
        .first()
        .and_then(|&(_, extent)| if extent >= width { Some(0) } else { None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MachineParams, TargetInfo};
    use crate::expr::Expr;
    use std::rc::Rc as StdRc;

    fn tiny_dag() -> FunctionDag {
        let f = crate::dag::FuncSpec {
            id: FuncId::new("f"),
            args: vec![StdRc::from("x")],
            values: vec![Expr::var("x")],
            estimates: vec![Some((0, 100))],
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
    fn inline_is_recorded_on_a_fresh_copy_sharing_the_rest() {
        let root = PartialSchedule::new_root();
        let g = FuncId::new("g");
        let inlined = root.inline_func(&g, 3);
        assert!(!root.computes(&g));
        assert!(inlined.computes(&g));
        assert_eq!(inlined.inlined[&g], 3);
    }

    #[test]
    fn compute_here_adds_a_fully_realized_child() {
        let dag = tiny_dag();
        let f = FuncId::new("f");
        let root = PartialSchedule::new_root();
        let root = root.compute_here(&dag, &f, Bound::new(vec![(0, 100)]));
        assert!(root.computes(&f));
        assert_eq!(root.resolved_region(&f).unwrap().points(), 100);
        assert_eq!(root.children[0].vectorized_dim, Some(0));
    }

    #[test]
    fn compute_in_tiles_splits_into_outer_and_inner_levels() {
        let dag = tiny_dag();
        let f = FuncId::new("f");
        let root = PartialSchedule::new_root();
        let root = root.compute_in_tiles(&dag, &f, Bound::new(vec![(0, 100)]), &[10], true);
        let outer = &root.children[0];
        assert!(outer.store_here);
        assert!(outer.parallel);
        assert_eq!(outer.bound.as_ref().unwrap().points(), 100);
        let inner = &outer.children[0];
        assert!(!inner.store_here);
        assert_eq!(inner.bound.as_ref().unwrap().points(), 10);
    }

    #[test]
    fn get_bounds_resolves_a_producer_region_from_its_scheduled_consumer() {
        let g = crate::dag::FuncSpec {
            id: FuncId::new("f"),
            args: vec![StdRc::from("x")],
            values: vec![Expr::var("x")],
            estimates: vec![None],
            has_update: false,
            bytes_per_element: 4,
            narrowest_scalar_bytes: 4,
        };
        let h = crate::dag::FuncSpec {
            id: FuncId::new("h"),
            args: vec![StdRc::from("x")],
            values: vec![Expr::call(FuncId::new("f"), vec![Expr::var("x")])],
            estimates: vec![Some((0, 100))],
            has_update: false,
            bytes_per_element: 4,
            narrowest_scalar_bytes: 4,
        };
        let dag = FunctionDag::build(
            &[FuncId::new("h")],
            vec![g, h],
            &MachineParams::default(),
            &TargetInfo::default(),
        )
        .unwrap();

        let h_id = FuncId::new("h");
        let f_id = FuncId::new("f");
        let mut estimates = HashMap::new();
        estimates.insert(h_id.clone(), vec![(0, 100)]);

        let root = PartialSchedule::new_root();
        let h_region = get_bounds(&dag, &root, &h_id, &estimates).unwrap();
        let root = root.compute_here(&dag, &h_id, h_region);

        let f_region = get_bounds(&dag, &root, &f_id, &estimates).unwrap();
        assert_eq!(f_region.points(), 100);
    }

    #[test]
    fn structural_sharing_leaves_the_original_root_untouched() {
        let dag = tiny_dag();
        let f = FuncId::new("f");
        let root = PartialSchedule::new_root();
        let edited = root.clone().compute_here(&dag, &f, Bound::new(vec![(0, 100)]));
        assert!(root.children.is_empty());
        assert_eq!(edited.children.len(), 1);
    }
}
