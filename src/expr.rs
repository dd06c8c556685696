//! A minimal integer-expression AST — the narrow boundary this crate needs
//! from the compiler's real IR (out of scope per the purpose statement).
//!
//! Just enough structure to drive the leaf counter (§4.1) and the bounds
//! algebra's substitution/simplification (§4.3): arithmetic, `min`/`max`,
//! calls to other functions in the DAG (or to opaque externs), and `likely`
//! hints. No types beyond "this leaf is `bytes` wide" are modeled — a real
//! type system belongs to the front-end this crate doesn't own.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::dag::FuncId;
use crate::error::InvariantError;

/// A call target: either another function in the DAG, or an opaque
/// extern (e.g. a transcendental intrinsic like `sin`/`pow`), billed extra
/// in the leaf counter (§4.1.b).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallKind {
    /// Call into a producer function tracked by the DAG.
    Producer(FuncId),
    /// Read of an external input (e.g. a buffer parameter); never becomes
    /// an edge, but still counts towards leaves.
    Input(String),
    /// An expensive pure extern call (e.g. `sin`, `pow`).
    PureExtern(String),
}

/// An integer-valued expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(i64),
    Var(Rc<str>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Min(Box<Expr>, Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
    /// `cond != 0 ? t : f`.
    Select(Box<Expr>, Box<Expr>, Box<Expr>),
    /// A hint that one arm of an enclosing `Select`/`Min`/`Max` dominates.
    Likely(Box<Expr>),
    Call(CallKind, Vec<Expr>),
}

impl Expr {
    pub fn var(name: impl Into<Rc<str>>) -> Expr {
        Expr::Var(name.into())
    }

    pub fn add(a: Expr, b: Expr) -> Expr {
        Expr::Add(Box::new(a), Box::new(b))
    }

    pub fn sub(a: Expr, b: Expr) -> Expr {
        Expr::Sub(Box::new(a), Box::new(b))
    }

    pub fn mul(a: Expr, b: Expr) -> Expr {
        Expr::Mul(Box::new(a), Box::new(b))
    }

    pub fn min(a: Expr, b: Expr) -> Expr {
        Expr::Min(Box::new(a), Box::new(b))
    }

    pub fn max(a: Expr, b: Expr) -> Expr {
        Expr::Max(Box::new(a), Box::new(b))
    }

    pub fn call(f: FuncId, args: Vec<Expr>) -> Expr {
        Expr::Call(CallKind::Producer(f), args)
    }

    pub fn likely(e: Expr) -> Expr {
        Expr::Likely(Box::new(e))
    }

    /// Substitute every named variable with a constant and fold to a single
    /// integer. Fails if a variable appears that isn't in `subst`, or a
    /// `Select` condition can't itself be resolved.
    pub fn simplify_to_const(&self, subst: &HashMap<Rc<str>, i64>) -> Result<i64, InvariantError> {
        match self {
            Expr::Const(c) => Ok(*c),
            Expr::Var(name) => subst
                .get(name.as_ref())
                .copied()
                .ok_or_else(|| InvariantError::UnboundVariable(name.to_string())),
            Expr::Add(a, b) => Ok(a.simplify_to_const(subst)? + b.simplify_to_const(subst)?),
            Expr::Sub(a, b) => Ok(a.simplify_to_const(subst)? - b.simplify_to_const(subst)?),
            Expr::Mul(a, b) => Ok(a.simplify_to_const(subst)? * b.simplify_to_const(subst)?),
            Expr::Min(a, b) => Ok(a.simplify_to_const(subst)?.min(b.simplify_to_const(subst)?)),
            Expr::Max(a, b) => Ok(a.simplify_to_const(subst)?.max(b.simplify_to_const(subst)?)),
            Expr::Select(c, t, f) => {
                if c.simplify_to_const(subst)? != 0 {
                    t.simplify_to_const(subst)
                } else {
                    f.simplify_to_const(subst)
                }
            }
            Expr::Likely(inner) => inner.simplify_to_const(subst),
            Expr::Call(_, _) => Err(InvariantError::UnboundVariable(
                "cannot simplify a call to a constant".to_string(),
            )),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{c}"),
            Expr::Var(v) => write!(f, "{v}"),
            Expr::Add(a, b) => write!(f, "({a} + {b})"),
            Expr::Sub(a, b) => write!(f, "({a} - {b})"),
            Expr::Mul(a, b) => write!(f, "({a} * {b})"),
            Expr::Min(a, b) => write!(f, "min({a}, {b})"),
            Expr::Max(a, b) => write!(f, "max({a}, {b})"),
            Expr::Select(c, t, e) => write!(f, "select({c}, {t}, {e})"),
            Expr::Likely(e) => write!(f, "likely({e})"),
            Expr::Call(CallKind::Producer(p), args) => {
                write!(f, "{p}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expr::Call(CallKind::Input(name), _) => write!(f, "{name}"),
            Expr::Call(CallKind::PureExtern(name), _) => write!(f, "{name}(..)"),
        }
    }
}

/// Result of counting the leaves of one function's defining expressions:
/// total weighted leaf count, and the number of direct calls made to each
/// producer (used to populate `Edge::calls`).
#[derive(Debug, Default, Clone)]
pub struct LeafCount {
    pub leaves: i64,
    pub calls: HashMap<FuncId, i64>,
}

/// Count leaves across a bundle of expressions (a function's `values()`),
/// applying the likely-aware rule for `Select`/`Min`/`Max` described in the
/// DAG construction algorithm (§4.1.b): of two candidate arms, if exactly
/// one carries a propagated `likely` tag, only that arm's leaves
/// contribute; otherwise both do.
pub fn count_leaves(exprs: &[Expr]) -> LeafCount {
    let mut counter = Counter::default();
    for e in exprs {
        counter.visit(e);
    }
    LeafCount {
        leaves: counter.leaves,
        calls: counter.calls,
    }
}

#[derive(Default)]
struct Counter {
    leaves: i64,
    likely: bool,
    calls: HashMap<FuncId, i64>,
}

impl Counter {
    fn visit(&mut self, e: &Expr) {
        match e {
            Expr::Const(_) | Expr::Var(_) => self.leaves += 1,
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) => {
                self.visit(a);
                self.visit(b);
            }
            Expr::Min(a, b) | Expr::Max(a, b) => {
                self.visit_likely_pair(a, b);
            }
            Expr::Select(cond, t, f) => {
                if self.visit_likely_pair(t, f) {
                    self.visit(cond);
                }
            }
            Expr::Likely(inner) => {
                self.visit(inner);
                self.leaves += 1;
                self.likely = true;
            }
            Expr::Call(kind, args) => {
                for a in args {
                    self.visit(a);
                }
                self.leaves += args.len() as i64;
                match kind {
                    CallKind::Producer(p) => {
                        *self.calls.entry(p.clone()).or_insert(0) += 1;
                    }
                    CallKind::Input(_) => {}
                    CallKind::PureExtern(_) => {
                        // Assume an expensive floating-point intrinsic like pow or sin.
                        self.leaves += 100;
                    }
                }
            }
        }
    }

    /// Visits `a` and `b` in isolation, then folds their leaf counts back
    /// in according to which (if either) carried a `likely` tag. Returns
    /// whether either arm was likely. `calls` is never saved/restored here:
    /// both arms are always walked for call-counting purposes, even though
    /// only the likely arm's leaves (if any) contribute to the total.
    fn visit_likely_pair(&mut self, a: &Expr, b: &Expr) -> bool {
        let old_likely = self.likely;
        let old_leaves = self.leaves;

        self.likely = false;
        self.leaves = 0;
        self.visit(a);
        let (a_leaves, a_likely) = (self.leaves, self.likely);

        self.likely = false;
        self.leaves = 0;
        self.visit(b);
        let (b_leaves, b_likely) = (self.leaves, self.likely);

        self.leaves = if a_likely {
            old_leaves + a_leaves
        } else if b_likely {
            old_leaves + b_leaves
        } else {
            old_leaves + a_leaves + b_leaves
        };
        self.likely = old_likely;

        a_likely || b_likely
    }
}
