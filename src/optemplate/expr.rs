//! Operator-template expression tree.
//!
//! Templates arrive already bound and normalized: operators are applied to
//! field expressions, fluxes are explicit nodes, and shared sub-expressions
//! may be marked with [`Expr::CommonSubexpression`]. Structural equality and
//! hashing drive deduplication in the compiler.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops;

use super::flux::WholeDomainFlux;

/// An `f64` with bitwise equality, usable as a hash key.
#[derive(Clone, Copy, Debug, Default)]
pub struct Scalar(pub f64);

impl Scalar {
    pub fn get(self) -> f64 {
        self.0
    }

    fn key(self) -> u64 {
        // +0.0 and -0.0 compare equal
        if self.0 == 0.0 {
            0
        } else {
            self.0.to_bits()
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar(v)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strong (`D`) or weak (`M^{-1} D^T M`) differentiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiffKind {
    Strong,
    Weak,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MassKind {
    Mass,
    InverseMass,
}

/// Operators that can be bound to a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Derivative along physical axis `axis`.
    Diff { kind: DiffKind, axis: usize },
    Mass(MassKind),
    /// Receive the `index`-th exchanged field from `rank`.
    FluxReceive { index: usize, rank: usize },
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Diff { kind: DiffKind::Strong, axis } => write!(f, "Diff{axis}"),
            Operator::Diff { kind: DiffKind::Weak, axis } => write!(f, "WeakDiff{axis}"),
            Operator::Mass(MassKind::Mass) => f.write_str("Mass"),
            Operator::Mass(MassKind::InverseMass) => f.write_str("InvMass"),
            Operator::FluxReceive { index, rank } => write!(f, "Receive[{index}@{rank}]"),
        }
    }
}

/// A node of an operator template.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    Variable(String),
    Constant(Scalar),
    Sum(Vec<Expr>),
    Product(Vec<Expr>),
    Neg(Box<Expr>),
    OperatorBinding { op: Operator, field: Box<Expr> },
    Flux(Box<WholeDomainFlux>),
    /// Evaluate `child` once and reuse it; `priority` orders its assignment.
    CommonSubexpression { child: Box<Expr>, priority: i32 },
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    pub fn constant(value: f64) -> Self {
        Expr::Constant(Scalar(value))
    }

    pub fn bind(op: Operator, field: Expr) -> Self {
        Expr::OperatorBinding {
            op,
            field: Box::new(field),
        }
    }

    /// Strong derivative along `axis`.
    pub fn diff(axis: usize, field: Expr) -> Self {
        Self::bind(
            Operator::Diff {
                kind: DiffKind::Strong,
                axis,
            },
            field,
        )
    }

    /// Weak derivative along `axis`.
    pub fn weak_diff(axis: usize, field: Expr) -> Self {
        Self::bind(
            Operator::Diff {
                kind: DiffKind::Weak,
                axis,
            },
            field,
        )
    }

    pub fn mass(field: Expr) -> Self {
        Self::bind(Operator::Mass(MassKind::Mass), field)
    }

    pub fn inverse_mass(field: Expr) -> Self {
        Self::bind(Operator::Mass(MassKind::InverseMass), field)
    }

    pub fn flux_receive(index: usize, rank: usize, field: Expr) -> Self {
        Self::bind(Operator::FluxReceive { index, rank }, field)
    }

    pub fn flux(flux: WholeDomainFlux) -> Self {
        Expr::Flux(Box::new(flux))
    }

    pub fn cse(child: Expr, priority: i32) -> Self {
        Expr::CommonSubexpression {
            child: Box::new(child),
            priority,
        }
    }

    /// Variable name if this is a bare variable.
    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Expr::Variable(name) => Some(name),
            _ => None,
        }
    }

    /// Direct children, in order. Flux operands are children of the flux.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Variable(_) | Expr::Constant(_) => Vec::new(),
            Expr::Sum(terms) | Expr::Product(terms) => terms.iter().collect(),
            Expr::Neg(inner) => vec![inner],
            Expr::OperatorBinding { field, .. } => vec![field],
            Expr::Flux(flux) => flux.operands().collect(),
            Expr::CommonSubexpression { child, .. } => vec![child],
        }
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        Expr::var(name)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::constant(value)
    }
}

impl ops::Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        let mut terms = match self {
            Expr::Sum(terms) => terms,
            other => vec![other],
        };
        match rhs {
            Expr::Sum(more) => terms.extend(more),
            other => terms.push(other),
        }
        Expr::Sum(terms)
    }
}

impl ops::Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        self + (-rhs)
    }
}

impl ops::Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        let mut factors = match self {
            Expr::Product(factors) => factors,
            other => vec![other],
        };
        match rhs {
            Expr::Product(more) => factors.extend(more),
            other => factors.push(other),
        }
        Expr::Product(factors)
    }
}

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Variable(name) => f.write_str(name),
            Expr::Constant(c) => write!(f, "{c}"),
            Expr::Sum(terms) => write_joined(f, terms, " + "),
            Expr::Product(factors) => write_joined(f, factors, " * "),
            Expr::Neg(inner) => write!(f, "-{inner}"),
            Expr::OperatorBinding { op, field } => write!(f, "{op}({field})"),
            Expr::Flux(flux) => write!(f, "{flux}"),
            Expr::CommonSubexpression { child, .. } => write!(f, "CSE({child})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_scalar_hash_eq() {
        let mut set = HashSet::new();
        set.insert(Scalar(0.5));
        set.insert(Scalar(0.5));
        set.insert(Scalar(-0.0));
        set.insert(Scalar(0.0));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_operators_flatten() {
        let e = Expr::var("a") + Expr::var("b") + Expr::var("c");
        assert_eq!(
            e,
            Expr::Sum(vec![Expr::var("a"), Expr::var("b"), Expr::var("c")])
        );
        let p = Expr::constant(2.0) * Expr::var("u");
        assert_eq!(p.to_string(), "(2 * u)");
    }

    #[test]
    fn test_structural_equality() {
        let a = Expr::diff(0, Expr::var("u"));
        let b = Expr::diff(0, Expr::var("u"));
        let c = Expr::weak_diff(0, Expr::var("u"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "Diff0(u)");
    }

    #[test]
    fn test_children() {
        let e = Expr::cse(Expr::var("x") - Expr::var("y"), 1);
        assert_eq!(e.children().len(), 1);
        assert_eq!(Expr::var("x").as_variable(), Some("x"));
        assert!(Expr::constant(1.0).children().is_empty());
    }
}
