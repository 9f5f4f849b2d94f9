//! Read-only traversals over operator templates.

use indexmap::IndexSet;

use super::expr::{Expr, Operator};

/// Visit `expr` and every descendant, parents before children.
pub fn walk<'a>(expr: &'a Expr, visit: &mut impl FnMut(&'a Expr)) {
    visit(expr);
    for child in expr.children() {
        walk(child, visit);
    }
}

/// Free variables read by `expr`, in order of first appearance.
pub fn dependencies(expr: &Expr) -> IndexSet<String> {
    let mut deps = IndexSet::new();
    walk(expr, &mut |e| {
        if let Expr::Variable(name) = e {
            deps.insert(name.clone());
        }
    });
    deps
}

/// Every flux node in `expr`, including fluxes nested in flux operands.
pub fn contained_fluxes(expr: &Expr) -> IndexSet<Expr> {
    let mut fluxes = IndexSet::new();
    walk(expr, &mut |e| {
        if matches!(e, Expr::Flux(_)) {
            fluxes.insert(e.clone());
        }
    });
    fluxes
}

/// Operator bindings whose operator satisfies `pred`.
pub fn bound_operators(expr: &Expr, pred: impl Fn(&Operator) -> bool) -> IndexSet<Expr> {
    let mut found = IndexSet::new();
    walk(expr, &mut |e| {
        if let Expr::OperatorBinding { op, .. } = e {
            if pred(op) {
                found.insert(e.clone());
            }
        }
    });
    found
}
