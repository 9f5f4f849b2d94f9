//! Node-by-node evaluation of element-wise expressions.
//!
//! Every intermediate vector is checked out of the pool, so a deep
//! expression allocates once per node. [`super::VectorProgram`] fuses the
//! same computation into a single pass.

use std::sync::Arc;

use super::value::{Bindings, Value};
use crate::device::MemoryPool;
use crate::error::{ExecError, Result};
use crate::optemplate::Expr;

/// Combine two values element-wise; scalars broadcast.
pub fn combine(
    pool: &Arc<MemoryPool>,
    a: &Value,
    b: &Value,
    op: impl Fn(f64, f64) -> f64,
) -> Result<Value> {
    match (a, b) {
        (Value::Scalar(x), Value::Scalar(y)) => Ok(Value::Scalar(op(*x, *y))),
        (Value::Vector(v), Value::Scalar(s)) => {
            let mut out = pool.allocate(v.len())?;
            for (o, x) in out.iter_mut().zip(v.iter()) {
                *o = op(*x, *s);
            }
            Ok(out.into())
        }
        (Value::Scalar(s), Value::Vector(v)) => {
            let mut out = pool.allocate(v.len())?;
            for (o, x) in out.iter_mut().zip(v.iter()) {
                *o = op(*s, *x);
            }
            Ok(out.into())
        }
        (Value::Vector(v), Value::Vector(w)) => {
            if v.len() != w.len() {
                return Err(ExecError::dimension_mismatch(v.len(), w.len()).into());
            }
            let mut out = pool.allocate(v.len())?;
            for ((o, x), y) in out.iter_mut().zip(v.iter()).zip(w.iter()) {
                *o = op(*x, *y);
            }
            Ok(out.into())
        }
    }
}

/// Evaluate an expression built from variables, constants, sums,
/// products and negation.
pub fn evaluate(expr: &Expr, ctx: &Bindings, pool: &Arc<MemoryPool>) -> Result<Value> {
    match expr {
        Expr::Variable(name) => ctx
            .get(name)
            .cloned()
            .ok_or_else(|| ExecError::UnboundVariable(name.clone()).into()),
        Expr::Constant(c) => Ok(Value::Scalar(c.get())),
        Expr::Sum(terms) => fold(terms, ctx, pool, 0.0, |x, y| x + y),
        Expr::Product(factors) => fold(factors, ctx, pool, 1.0, |x, y| x * y),
        Expr::Neg(inner) => {
            let value = evaluate(inner, ctx, pool)?;
            combine(pool, &Value::Scalar(-1.0), &value, |x, y| x * y)
        }
        Expr::OperatorBinding { .. } | Expr::Flux(_) | Expr::CommonSubexpression { .. } => {
            Err(ExecError::Unsupported(format!("cannot evaluate '{expr}' element-wise")).into())
        }
    }
}

fn fold(
    items: &[Expr],
    ctx: &Bindings,
    pool: &Arc<MemoryPool>,
    empty: f64,
    op: impl Fn(f64, f64) -> f64 + Copy,
) -> Result<Value> {
    let mut iter = items.iter();
    let Some(first) = iter.next() else {
        return Ok(Value::Scalar(empty));
    };
    let mut acc = evaluate(first, ctx, pool)?;
    for item in iter {
        let value = evaluate(item, ctx, pool)?;
        acc = combine(pool, &acc, &value, op)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PoolKind;

    fn setup() -> (Arc<MemoryPool>, Bindings) {
        let pool = Arc::new(MemoryPool::new(PoolKind::Device, None));
        let mut ctx = Bindings::new();
        ctx.insert("u".into(), Value::vector_from_slice(&pool, &[1.0, 2.0, 3.0]).unwrap());
        ctx.insert("s".into(), Value::Scalar(2.0));
        (pool, ctx)
    }

    #[test]
    fn test_broadcast() {
        let (pool, ctx) = setup();
        let e = Expr::var("s") * Expr::var("u") - Expr::constant(1.0);
        let v = evaluate(&e, &ctx, &pool).unwrap();
        assert_eq!(v.to_vec(), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_scalar_only() {
        let (pool, ctx) = setup();
        let v = evaluate(&(Expr::var("s") + Expr::constant(0.5)), &ctx, &pool).unwrap();
        assert_eq!(v.as_scalar(), Some(2.5));
    }

    #[test]
    fn test_errors() {
        let (pool, mut ctx) = setup();
        let err = evaluate(&Expr::var("missing"), &ctx, &pool).unwrap_err();
        assert!(matches!(err, crate::Error::Exec(ExecError::UnboundVariable(_))));

        ctx.insert("w".into(), Value::vector_from_slice(&pool, &[1.0]).unwrap());
        let err = evaluate(&(Expr::var("u") + Expr::var("w")), &ctx, &pool).unwrap_err();
        assert!(matches!(err, crate::Error::Exec(ExecError::DimensionMismatch { .. })));

        let err = evaluate(&Expr::mass(Expr::var("u")), &ctx, &pool).unwrap_err();
        assert!(matches!(err, crate::Error::Exec(ExecError::Unsupported(_))));
    }
}
