//! The function DAG: an immutable, cost-annotated representation of the
//! pipeline being scheduled, built once up front (§4.1).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bounds::{bounds_required, Interval};
use crate::config::{MachineParams, TargetInfo};
use crate::error::ConfigError;
use crate::expr::{count_leaves, Expr};

/// An opaque function identity, as the front-end would hand us a `Function`
/// token. Cheap to clone and compare; used as the key everywhere.
#[derive(Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct FuncId(pub Rc<str>);

impl FuncId {
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        FuncId(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serialized as its bare name — diagnostic JSON output shouldn't expose
/// this crate's internal `Rc<str>` representation.
impl Serialize for FuncId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for FuncId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(FuncId::new)
    }
}

/// What the front-end hands this crate for one function: its arguments,
/// its (pure) defining expressions, and — for outputs only — its bound
/// estimates. Stands in for `has_pure_definition`/`f.values()`/`f.args()`/
/// `f.dimensions()`/`f.schedule().estimates()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuncSpec {
    pub id: FuncId,
    pub args: Vec<Rc<str>>,
    pub values: Vec<Expr>,
    /// One entry per dimension; `None` where no estimate was supplied.
    /// Only consulted for functions with no outgoing edges (outputs).
    pub estimates: Vec<Option<(i64, i64)>>,
    pub has_update: bool,
    /// Total bytes of one output tuple (summed across `values`).
    pub bytes_per_element: i64,
    /// Narrowest scalar type appearing in `values`, in bytes; drives the
    /// natural vector width query.
    pub narrowest_scalar_bytes: usize,
}

impl FuncSpec {
    pub fn dims(&self) -> usize {
        self.args.len()
    }
}

/// One function's per-point cost characteristics and symbolic region.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: FuncId,
    pub dims: usize,
    /// Compute cost per point evaluated, including the cost of generating
    /// the call (weighted by output bytes).
    pub compute: f64,
    /// Compute cost per point evaluated if this function were inlined.
    pub compute_if_inlined: f64,
    /// Memory cost coefficient (bytes) of loading one point.
    pub memory: f64,
    /// Natural vector width, in elements.
    pub vector_size: i64,
    /// Symbolic `<func>.<i>.min/.max` region, used to parameterize edges.
    pub region: Vec<Interval>,
}

/// A producer → consumer edge: the region required of `producer`,
/// expressed symbolically in the consumer's own region variables.
#[derive(Debug, Clone)]
pub struct Edge {
    pub producer: FuncId,
    pub consumer: FuncId,
    pub bounds: Vec<Interval>,
    pub calls: i64,
}

/// The immutable function DAG, built once per search.
#[derive(Debug)]
pub struct FunctionDag {
    /// In reverse realization order: outputs first.
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub outgoing_edges: HashMap<FuncId, Vec<usize>>,
    pub incoming_edges: HashMap<FuncId, Vec<usize>>,
    node_index: HashMap<FuncId, usize>,
}

impl FunctionDag {
    pub fn build(
        outputs: &[FuncId],
        funcs: Vec<FuncSpec>,
        _params: &MachineParams,
        target: &TargetInfo,
    ) -> Result<Self, ConfigError> {
        let mut env: HashMap<FuncId, FuncSpec> = HashMap::new();
        for spec in funcs {
            if env.contains_key(&spec.id) {
                return Err(ConfigError::DuplicateDefinition {
                    func: spec.id.to_string(),
                });
            }
            env.insert(spec.id.clone(), spec);
        }

        let reachable = transitive_closure(outputs, &env);
        let order = topological_order(outputs, &env, &reachable);

        let mut nodes = Vec::with_capacity(order.len());
        let mut edges = Vec::new();
        let outputs_set: HashSet<&FuncId> = outputs.iter().collect();

        for id in order.iter().rev() {
            let spec = env
                .get(id)
                .expect("reachable id must have a spec: transitive_closure only follows Call edges into env");

            if spec.has_update {
                return Err(ConfigError::UpdateDefinition {
                    func: id.to_string(),
                });
            }

            let mut scope = HashMap::new();
            let mut region = Vec::with_capacity(spec.dims());
            for (i, arg) in spec.args.iter().enumerate() {
                let min_var = Expr::var(format!("{id}.{i}.min"));
                let max_var = Expr::var(format!("{id}.{i}.max"));
                let interval = Interval {
                    min: min_var,
                    max: max_var,
                };
                scope.insert(arg.clone(), interval.clone());
                region.push(interval);
            }

            let leaf_count = count_leaves(&spec.values);
            let bytes = spec.bytes_per_element as f64;
            let compute = leaf_count.leaves as f64 * bytes;
            let compute_if_inlined =
                (leaf_count.leaves - spec.dims() as i64).max(0) as f64 * bytes;
            let vector_size = target.natural_vector_size(spec.narrowest_scalar_bytes);

            nodes.push(Node {
                id: id.clone(),
                dims: spec.dims(),
                compute,
                compute_if_inlined,
                memory: bytes,
                vector_size,
                region,
            });

            let mut required: HashMap<FuncId, Vec<Interval>> = HashMap::new();
            for value in &spec.values {
                let per_value = bounds_required(value, &scope);
                for (producer, boxed) in per_value {
                    required
                        .entry(producer)
                        .and_modify(|existing| {
                            for (e, n) in existing.iter_mut().zip(boxed.iter()) {
                                e.min = Expr::min(e.min.clone(), n.min.clone());
                                e.max = Expr::max(e.max.clone(), n.max.clone());
                            }
                        })
                        .or_insert(boxed);
                }
            }
            for (producer, bounds) in required {
                if !reachable.contains(&producer) {
                    continue;
                }
                let calls = leaf_count.calls.get(&producer).copied().unwrap_or(0);
                edges.push(Edge {
                    producer,
                    consumer: id.clone(),
                    bounds,
                    calls,
                });
            }
        }

        let mut outgoing_edges: HashMap<FuncId, Vec<usize>> = HashMap::new();
        let mut incoming_edges: HashMap<FuncId, Vec<usize>> = HashMap::new();
        for n in &nodes {
            outgoing_edges.entry(n.id.clone()).or_default();
            incoming_edges.entry(n.id.clone()).or_default();
        }
        for (i, e) in edges.iter().enumerate() {
            outgoing_edges.entry(e.producer.clone()).or_default().push(i);
            incoming_edges.entry(e.consumer.clone()).or_default().push(i);
        }

        // Outputs must carry an estimate on every dimension.
        for id in outputs {
            let spec = env.get(id).expect("output must be in env");
            for (dim, est) in spec.estimates.iter().enumerate() {
                if est.is_none() {
                    return Err(ConfigError::MissingEstimate {
                        func: id.to_string(),
                        dim,
                    });
                }
            }
            debug_assert!(outputs_set.contains(id));
        }

        let node_index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        Ok(FunctionDag {
            nodes,
            edges,
            outgoing_edges,
            incoming_edges,
            node_index,
        })
    }

    pub fn node(&self, id: &FuncId) -> &Node {
        &self.nodes[self.node_index[id]]
    }

    pub fn node_index(&self, id: &FuncId) -> usize {
        self.node_index[id]
    }

    pub fn outgoing(&self, id: &FuncId) -> &[usize] {
        self.outgoing_edges
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn incoming(&self, id: &FuncId) -> &[usize] {
        self.incoming_edges
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn transitive_closure(outputs: &[FuncId], env: &HashMap<FuncId, FuncSpec>) -> HashSet<FuncId> {
    let mut seen = HashSet::new();
    let mut stack: Vec<FuncId> = outputs.to_vec();
    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(spec) = env.get(&id) {
            for dep in count_leaves(&spec.values).calls.into_keys() {
                if !seen.contains(&dep) {
                    stack.push(dep);
                }
            }
        }
    }
    seen
}

/// Producers before consumers.
fn topological_order(
    outputs: &[FuncId],
    env: &HashMap<FuncId, FuncSpec>,
    reachable: &HashSet<FuncId>,
) -> Vec<FuncId> {
    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(reachable.len());

    fn visit(
        id: &FuncId,
        env: &HashMap<FuncId, FuncSpec>,
        visited: &mut HashSet<FuncId>,
        order: &mut Vec<FuncId>,
    ) {
        if !visited.insert(id.clone()) {
            return;
        }
        if let Some(spec) = env.get(id) {
            let mut deps: Vec<FuncId> = count_leaves(&spec.values).calls.into_keys().collect();
            deps.sort();
            for dep in deps {
                visit(&dep, env, visited, order);
            }
        }
        order.push(id.clone());
    }

    let mut sorted_outputs = outputs.to_vec();
    sorted_outputs.sort();
    for o in &sorted_outputs {
        visit(o, env, &mut visited, &mut order);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CallKind;

    fn spec(name: &str, args: &[&str], values: Vec<Expr>, estimates: Vec<Option<(i64, i64)>>) -> FuncSpec {
        FuncSpec {
            id: FuncId::new(name),
            args: args.iter().map(|a| Rc::from(*a)).collect(),
            values,
            estimates,
            has_update: false,
            bytes_per_element: 4,
            narrowest_scalar_bytes: 4,
        }
    }

    #[test]
    fn point_wise_chain_has_edges_in_realization_order() {
        // f(x,y) = x+y; g(x,y) = f*2+1; h(x,y) = g*2+1
        let f = spec(
            "f",
            &["x", "y"],
            vec![Expr::add(Expr::var("x"), Expr::var("y"))],
            vec![None, None],
        );
        let g = spec(
            "g",
            &["x", "y"],
            vec![Expr::add(
                Expr::mul(
                    Expr::call(FuncId::new("f"), vec![Expr::var("x"), Expr::var("y")]),
                    Expr::Const(2),
                ),
                Expr::Const(1),
            )],
            vec![None, None],
        );
        let h = spec(
            "h",
            &["x", "y"],
            vec![Expr::add(
                Expr::mul(
                    Expr::call(FuncId::new("g"), vec![Expr::var("x"), Expr::var("y")]),
                    Expr::Const(2),
                ),
                Expr::Const(1),
            )],
            vec![Some((0, 1000)), Some((0, 1000))],
        );

        let outputs = vec![FuncId::new("h")];
        let dag = FunctionDag::build(
            &outputs,
            vec![f, g, h],
            &MachineParams::default(),
            &TargetInfo::default(),
        )
        .unwrap();

        assert_eq!(dag.nodes.len(), 3);
        assert_eq!(dag.nodes[0].id, FuncId::new("h"));
        assert_eq!(dag.nodes[2].id, FuncId::new("f"));
        assert_eq!(dag.edges.len(), 2);
        assert!(dag.outgoing(&FuncId::new("f")).len() == 1);
        assert!(dag.incoming(&FuncId::new("h"))[0] < dag.edges.len());
    }

    #[test]
    fn missing_estimate_is_a_config_error() {
        let h = spec(
            "h",
            &["x"],
            vec![Expr::var("x")],
            vec![None],
        );
        let outputs = vec![FuncId::new("h")];
        let err = FunctionDag::build(
            &outputs,
            vec![h],
            &MachineParams::default(),
            &TargetInfo::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEstimate { .. }));
    }

    #[test]
    fn update_definition_is_a_config_error() {
        let mut h = spec("h", &["x"], vec![Expr::var("x")], vec![Some((0, 10))]);
        h.has_update = true;
        let outputs = vec![FuncId::new("h")];
        let err = FunctionDag::build(
            &outputs,
            vec![h],
            &MachineParams::default(),
            &TargetInfo::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UpdateDefinition { .. }));
    }

    #[test]
    fn duplicate_definition_is_a_config_error() {
        let h1 = spec("h", &["x"], vec![Expr::var("x")], vec![Some((0, 10))]);
        let h2 = spec(
            "h",
            &["x"],
            vec![Expr::Call(CallKind::Input("in".into()), vec![])],
            vec![Some((0, 10))],
        );
        let outputs = vec![FuncId::new("h")];
        let err = FunctionDag::build(
            &outputs,
            vec![h1, h2],
            &MachineParams::default(),
            &TargetInfo::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateDefinition { .. }));
    }
}
