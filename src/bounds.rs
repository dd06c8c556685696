//! Bounds algebra: symbolic intervals over [`Expr`], and the
//! bounds-required-of-a-producer query used when building DAG edges.
//!
//! This is the crate's own small interval arithmetic, scoped to exactly
//! what the DAG builder and `get_bounds` need — not a general-purpose
//! range-inference pass over the whole IR (that stays with the front-end,
//! per the purpose statement's non-goals).

use std::collections::HashMap;
use std::rc::Rc;

use crate::dag::FuncId;
use crate::expr::{CallKind, Expr};

/// A symbolic `[min, max]` interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub min: Expr,
    pub max: Expr,
}

impl Interval {
    pub fn point(e: Expr) -> Self {
        Interval {
            min: e.clone(),
            max: e,
        }
    }

    pub fn constant(min: i64, max: i64) -> Self {
        Interval {
            min: Expr::Const(min),
            max: Expr::Const(max),
        }
    }
}

/// Evaluate the symbolic interval of `expr` given a `scope` mapping each
/// free variable to its own interval (e.g. a consumer's per-dimension
/// `min`/`max` symbols). Constant folding of the produced endpoints
/// happens later, under concrete bound estimates (see `Expr::simplify_to_const`).
pub fn interval_of(expr: &Expr, scope: &HashMap<Rc<str>, Interval>) -> Interval {
    match expr {
        Expr::Const(c) => Interval::point(Expr::Const(*c)),
        Expr::Var(name) => scope
            .get(name)
            .cloned()
            .unwrap_or_else(|| Interval::point(Expr::Var(name.clone()))),
        Expr::Add(a, b) => {
            let (ia, ib) = (interval_of(a, scope), interval_of(b, scope));
            Interval {
                min: Expr::add(ia.min, ib.min),
                max: Expr::add(ia.max, ib.max),
            }
        }
        Expr::Sub(a, b) => {
            let (ia, ib) = (interval_of(a, scope), interval_of(b, scope));
            Interval {
                min: Expr::sub(ia.min, ib.max),
                max: Expr::sub(ia.max, ib.min),
            }
        }
        Expr::Mul(a, b) => {
            // Only the common case this scheduler needs: one side is a
            // compile-time constant coefficient (a stride/offset factor).
            let (ia, ib) = (interval_of(a, scope), interval_of(b, scope));
            if let (Expr::Const(k), _) = (&ia.min, &ia.max) {
                scale(&ib, *k)
            } else if let (Expr::Const(k), _) = (&ib.min, &ib.max) {
                scale(&ia, *k)
            } else {
                Interval {
                    min: Expr::mul(ia.min, ib.min),
                    max: Expr::mul(ia.max, ib.max),
                }
            }
        }
        Expr::Min(a, b) => {
            let (ia, ib) = (interval_of(a, scope), interval_of(b, scope));
            Interval {
                min: Expr::min(ia.min, ib.min),
                max: Expr::min(ia.max, ib.max),
            }
        }
        Expr::Max(a, b) => {
            let (ia, ib) = (interval_of(a, scope), interval_of(b, scope));
            Interval {
                min: Expr::max(ia.min, ib.min),
                max: Expr::max(ia.max, ib.max),
            }
        }
        Expr::Select(_, t, f) => {
            // Conservative union of both arms — we don't track the
            // condition's range.
            let (it, ifl) = (interval_of(t, scope), interval_of(f, scope));
            Interval {
                min: Expr::min(it.min, ifl.min),
                max: Expr::max(it.max, ifl.max),
            }
        }
        Expr::Likely(inner) => interval_of(inner, scope),
        Expr::Call(_, _) => {
            // A call's result range isn't tracked by this narrow algebra;
            // treat it as an opaque point so the argument expressions that
            // actually matter for region inference can still be folded.
            Interval::point(expr.clone())
        }
    }
}

fn scale(i: &Interval, k: i64) -> Interval {
    if k >= 0 {
        Interval {
            min: Expr::mul(Expr::Const(k), i.min.clone()),
            max: Expr::mul(Expr::Const(k), i.max.clone()),
        }
    } else {
        Interval {
            min: Expr::mul(Expr::Const(k), i.max.clone()),
            max: Expr::mul(Expr::Const(k), i.min.clone()),
        }
    }
}

/// Walk `expr` and, for every call to a producer tracked by the DAG,
/// compute the symbolic box of arguments passed to it (in terms of
/// `scope`'s variables), unioning across repeated calls to the same
/// producer.
pub fn bounds_required(
    expr: &Expr,
    scope: &HashMap<Rc<str>, Interval>,
) -> HashMap<FuncId, Vec<Interval>> {
    let mut boxes: HashMap<FuncId, Vec<Interval>> = HashMap::new();
    collect(expr, scope, &mut boxes);
    boxes
}

fn collect(expr: &Expr, scope: &HashMap<Rc<str>, Interval>, out: &mut HashMap<FuncId, Vec<Interval>>) {
    match expr {
        Expr::Const(_) | Expr::Var(_) => {}
        Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Min(a, b) | Expr::Max(a, b) => {
            collect(a, scope, out);
            collect(b, scope, out);
        }
        Expr::Select(c, t, f) => {
            collect(c, scope, out);
            collect(t, scope, out);
            collect(f, scope, out);
        }
        Expr::Likely(inner) => collect(inner, scope, out),
        Expr::Call(kind, args) => {
            for a in args {
                collect(a, scope, out);
            }
            if let CallKind::Producer(p) = kind {
                let box_here: Vec<Interval> = args.iter().map(|a| interval_of(a, scope)).collect();
                out.entry(p.clone())
                    .and_modify(|existing| {
                        for (e, n) in existing.iter_mut().zip(box_here.iter()) {
                            e.min = Expr::min(e.min.clone(), n.min.clone());
                            e.max = Expr::max(e.max.clone(), n.max.clone());
                        }
                    })
                    .or_insert(box_here);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translated_call_argument_tracks_the_consumer_scope() {
        let mut scope = HashMap::new();
        scope.insert(Rc::from("x"), Interval::constant(0, 999));
        scope.insert(Rc::from("y"), Interval::constant(0, 999));

        let f = FuncId::new("f");
        let e = Expr::call(
            f.clone(),
            vec![
                Expr::sub(Expr::var("x"), Expr::Const(9)),
                Expr::var("y"),
            ],
        );
        let boxes = bounds_required(&e, &scope);
        let region = &boxes[&f];
        let subst = HashMap::new();
        assert_eq!(region[0].min.simplify_to_const(&subst).unwrap(), -9);
        assert_eq!(region[1].min.simplify_to_const(&subst).unwrap(), 0);
    }
}
