//! Fused element-wise vector programs.
//!
//! An element-wise expression is compiled once into postfix form and then
//! run per vector entry on a small value stack, writing a single output
//! buffer.

use std::sync::Arc;

use super::value::{Bindings, Value};
use crate::device::MemoryPool;
use crate::error::{CompileError, ExecError, Result};
use crate::optemplate::Expr;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Op {
    Load(usize),
    Const(f64),
    /// Pop `n` values, push their sum.
    Add(usize),
    Mul(usize),
    Neg,
}

/// Postfix program over a fixed variable list.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorProgram {
    variables: Vec<String>,
    ops: Vec<Op>,
    max_stack: usize,
}

impl VectorProgram {
    /// Compile `expr`. Only variables, constants, sums, products and
    /// negation are allowed.
    pub fn compile(expr: &Expr) -> std::result::Result<Self, CompileError> {
        let mut program = Self {
            variables: Vec::new(),
            ops: Vec::new(),
            max_stack: 0,
        };
        let mut depth = 0;
        program.emit(expr, &mut depth)?;
        Ok(program)
    }

    fn push(&mut self, op: Op, depth: &mut usize) {
        match op {
            Op::Load(_) | Op::Const(_) => *depth += 1,
            Op::Add(n) | Op::Mul(n) => *depth = *depth + 1 - n,
            Op::Neg => {}
        }
        self.max_stack = self.max_stack.max(*depth);
        self.ops.push(op);
    }

    fn emit(&mut self, expr: &Expr, depth: &mut usize) -> std::result::Result<(), CompileError> {
        match expr {
            Expr::Variable(name) => {
                let index = match self.variables.iter().position(|v| v == name) {
                    Some(i) => i,
                    None => {
                        self.variables.push(name.clone());
                        self.variables.len() - 1
                    }
                };
                self.push(Op::Load(index), depth);
            }
            Expr::Constant(c) => self.push(Op::Const(c.get()), depth),
            Expr::Sum(items) | Expr::Product(items) if items.is_empty() => {
                let empty = if matches!(expr, Expr::Sum(_)) { 0.0 } else { 1.0 };
                self.push(Op::Const(empty), depth);
            }
            Expr::Sum(items) => {
                for item in items {
                    self.emit(item, depth)?;
                }
                self.push(Op::Add(items.len()), depth);
            }
            Expr::Product(items) => {
                for item in items {
                    self.emit(item, depth)?;
                }
                self.push(Op::Mul(items.len()), depth);
            }
            Expr::Neg(inner) => {
                self.emit(inner, depth)?;
                self.push(Op::Neg, depth);
            }
            Expr::OperatorBinding { .. } | Expr::Flux(_) | Expr::CommonSubexpression { .. } => {
                return Err(CompileError::NotElementwise(expr.to_string()));
            }
        }
        Ok(())
    }

    /// Variables read, in load-slot order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    fn run(&self, inputs: &[f64], stack: &mut Vec<f64>) -> f64 {
        stack.clear();
        for op in &self.ops {
            match *op {
                Op::Load(i) => stack.push(inputs[i]),
                Op::Const(c) => stack.push(c),
                Op::Add(n) => {
                    let at = stack.len() - n;
                    let sum = stack[at..].iter().fold(0.0, |acc, x| acc + x);
                    stack.truncate(at);
                    stack.push(sum);
                }
                Op::Mul(n) => {
                    let at = stack.len() - n;
                    let product = stack[at..].iter().fold(1.0, |acc, x| acc * x);
                    stack.truncate(at);
                    stack.push(product);
                }
                Op::Neg => {
                    if let Some(top) = stack.last_mut() {
                        *top = -*top;
                    }
                }
            }
        }
        stack.pop().unwrap_or(0.0)
    }

    /// Run over bound values. Scalars broadcast; all vectors must agree
    /// in length. With no vector operand the result is a scalar.
    pub fn evaluate(&self, ctx: &Bindings, pool: &Arc<MemoryPool>) -> Result<Value> {
        let values = self
            .variables
            .iter()
            .map(|name| {
                ctx.get(name)
                    .ok_or_else(|| ExecError::UnboundVariable(name.clone()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut len = None;
        for value in &values {
            if let Some(n) = value.vector_len() {
                match len {
                    None => len = Some(n),
                    Some(expected) if expected != n => {
                        return Err(ExecError::dimension_mismatch(expected, n).into())
                    }
                    Some(_) => {}
                }
            }
        }

        let mut inputs: Vec<f64> = values
            .iter()
            .map(|v| v.as_scalar().unwrap_or(0.0))
            .collect();
        let mut stack = Vec::with_capacity(self.max_stack);

        let Some(len) = len else {
            return Ok(Value::Scalar(self.run(&inputs, &mut stack)));
        };

        let vectors: Vec<(usize, &[f64])> = values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_vector().map(|buf| (i, &buf[..])))
            .collect();
        let mut out = pool.allocate(len)?;
        for (k, o) in out.iter_mut().enumerate() {
            for (slot, data) in &vectors {
                inputs[*slot] = data[k];
            }
            *o = self.run(&inputs, &mut stack);
        }
        Ok(out.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PoolKind;
    use crate::exec::eval::evaluate;
    use approx::assert_relative_eq;

    #[test]
    fn test_fused_matches_tree_evaluation() {
        let pool = Arc::new(MemoryPool::new(PoolKind::Device, None));
        let mut ctx = Bindings::new();
        ctx.insert("u".into(), Value::vector_from_slice(&pool, &[1.0, -2.0, 0.5]).unwrap());
        ctx.insert("v".into(), Value::vector_from_slice(&pool, &[3.0, 4.0, 5.0]).unwrap());
        ctx.insert("a".into(), Value::Scalar(0.25));

        let expr = Expr::var("a") * Expr::var("u") * Expr::var("v") - Expr::var("u")
            + Expr::constant(2.0);
        let program = VectorProgram::compile(&expr).unwrap();
        assert_eq!(program.variables(), &["a", "u", "v"]);

        let fused = program.evaluate(&ctx, &pool).unwrap().to_vec();
        let tree = evaluate(&expr, &ctx, &pool).unwrap().to_vec();
        for (x, y) in fused.iter().zip(&tree) {
            assert_relative_eq!(x, y);
        }
        assert_relative_eq!(fused[0], 0.25 * 3.0 - 1.0 + 2.0);
    }

    #[test]
    fn test_scalar_program() {
        let pool = Arc::new(MemoryPool::new(PoolKind::Device, None));
        let mut ctx = Bindings::new();
        ctx.insert("a".into(), Value::Scalar(3.0));
        let program = VectorProgram::compile(&-(Expr::var("a") * Expr::var("a"))).unwrap();
        assert_eq!(program.evaluate(&ctx, &pool).unwrap().as_scalar(), Some(-9.0));
    }

    #[test]
    fn test_rejects_operators() {
        let err = VectorProgram::compile(&Expr::diff(0, Expr::var("u"))).unwrap_err();
        assert!(matches!(err, CompileError::NotElementwise(_)));
    }
}
