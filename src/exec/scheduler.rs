//! Dependency-driven execution of compiled code.
//!
//! The executor keeps a ready set of instructions whose inputs are all
//! bound and a list of outstanding futures. Each step first polls the
//! futures, binding every one that has completed, then runs the ready
//! instruction with the lowest priority. When nothing is ready but futures
//! remain, the oldest future is resolved (blocking). Once both sets are
//! empty the result expressions are evaluated.

use std::collections::VecDeque;

use tracing::{debug, trace};

use super::mapper::{ExecutionMapper, Output};
use super::value::{Bindings, Value};
use crate::compiler::Code;
use crate::device::DeviceFuture;
use crate::error::{ExecError, Result};
use crate::types::InstructionId;

/// Which of several equal-priority ready instructions runs first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// Smallest instruction index.
    #[default]
    First,
    /// Largest instruction index.
    Last,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    Executed(InstructionId),
    /// Future found complete while polling.
    FutureReady(String),
    /// Future resolved because nothing else could run.
    FutureForced(String),
}

/// What happened during one run, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionTrace {
    pub events: Vec<TraceEvent>,
}

impl ExecutionTrace {
    /// Instructions in execution order.
    pub fn executed(&self) -> Vec<InstructionId> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Executed(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Position of `id` in the execution order.
    pub fn position(&self, id: InstructionId) -> Option<usize> {
        self.executed().iter().position(|&x| x == id)
    }

    pub fn forced_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, TraceEvent::FutureForced(_)))
            .count()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Executor {
    tie_break: TieBreak,
}

struct RunState<'c> {
    code: &'c Code,
    ctx: Bindings,
    front: Vec<InstructionId>,
    queued: Vec<bool>,
}

impl RunState<'_> {
    fn make_available(&mut self, name: String, value: Value) {
        let code = self.code;
        self.ctx.insert(name.clone(), value);
        for &cand in code.insns_depending_on(&name) {
            if self.queued[cand.get()] {
                continue;
            }
            if code
                .dependencies_of(cand)
                .iter()
                .all(|d| self.ctx.contains_key(d))
            {
                self.queued[cand.get()] = true;
                self.front.push(cand);
            }
        }
    }
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    fn pick(&self, code: &Code, front: &[InstructionId]) -> Option<usize> {
        let key = |id: InstructionId| code.instruction(id).priority();
        match self.tie_break {
            TieBreak::First => front
                .iter()
                .enumerate()
                .min_by_key(|(_, &id)| (key(id), id))
                .map(|(pos, _)| pos),
            TieBreak::Last => front
                .iter()
                .enumerate()
                .min_by_key(|(_, &id)| (key(id), std::cmp::Reverse(id)))
                .map(|(pos, _)| pos),
        }
    }

    /// Run `code` with `bindings` as inputs.
    ///
    /// Returns one value per result expression and the execution trace.
    pub fn run(
        &self,
        code: &Code,
        mapper: &mut dyn ExecutionMapper,
        bindings: Bindings,
    ) -> Result<(Vec<Value>, ExecutionTrace)> {
        let mut queued = vec![false; code.len()];
        for id in code.initial_exec_front() {
            queued[id.get()] = true;
        }
        let mut state = RunState {
            code,
            ctx: bindings,
            front: code.initial_exec_front().to_vec(),
            queued,
        };
        let mut futures: VecDeque<(String, Box<dyn DeviceFuture>)> = VecDeque::new();
        let mut trace = ExecutionTrace::default();
        let mut executed = 0;

        while !state.front.is_empty() || !futures.is_empty() {
            let mut i = 0;
            while i < futures.len() {
                if futures[i].1.is_ready() {
                    if let Some((name, future)) = futures.remove(i) {
                        trace!(target_var = %name, "future ready");
                        let value = future.resolve()?;
                        trace.events.push(TraceEvent::FutureReady(name.clone()));
                        state.make_available(name, value);
                    }
                } else {
                    i += 1;
                }
            }

            if let Some(pos) = self.pick(code, &state.front) {
                let id = state.front.remove(pos);
                if let Some(missing) = code
                    .dependencies_of(id)
                    .iter()
                    .find(|d| !state.ctx.contains_key(*d))
                {
                    return Err(ExecError::UnboundVariable(missing.clone()).into());
                }

                let insn = code.instruction(id);
                trace!(insn = %id, kind = insn.kind_name(), priority = insn.priority(), "executing");
                let outputs = mapper.exec_instruction(insn, &state.ctx)?;
                trace.events.push(TraceEvent::Executed(id));
                executed += 1;

                for (name, output) in outputs {
                    match output {
                        Output::Ready(value) => state.make_available(name, value),
                        Output::Pending(future) => futures.push_back((name, future)),
                    }
                }
            } else if let Some((name, future)) = futures.pop_front() {
                debug!(target_var = %name, pending = futures.len(), "forcing future");
                let value = future.resolve()?;
                trace.events.push(TraceEvent::FutureForced(name.clone()));
                state.make_available(name, value);
            }
        }

        if executed < code.len() {
            return Err(ExecError::Stalled(code.len() - executed).into());
        }

        let results = code
            .result()
            .iter()
            .map(|expr| mapper.evaluate(expr, &state.ctx))
            .collect::<Result<Vec<_>>>()?;
        Ok((results, trace))
    }
}

/// Run `code` with default scheduling and return the result values.
pub fn execute(code: &Code, mapper: &mut dyn ExecutionMapper, bindings: Bindings) -> Result<Vec<Value>> {
    Executor::default()
        .run(code, mapper, bindings)
        .map(|(values, _)| values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::compiler::{
        Assign, DiffBatchAssign, FluxBatchAssign, FluxReceiveBatchAssign, Instruction, MassAssign,
        VectorExprAssign,
    };
    use crate::device::{MemoryPool, PoolKind, ReadyFuture};
    use crate::exec::mapper::Outputs;
    use crate::optemplate::Expr;

    /// Evaluates assigns; mass assigns come back as futures.
    struct ScalarMapper {
        pool: Arc<MemoryPool>,
    }

    impl ScalarMapper {
        fn new() -> Self {
            Self {
                pool: Arc::new(MemoryPool::new(PoolKind::Device, None)),
            }
        }
    }

    impl ExecutionMapper for ScalarMapper {
        fn exec_assign(&mut self, insn: &Assign, ctx: &Bindings) -> Result<Outputs> {
            let value = crate::exec::evaluate(&insn.expr, ctx, &self.pool)?;
            Ok(vec![(insn.name.clone(), value.into())])
        }

        fn exec_vector_expr_assign(&mut self, insn: &VectorExprAssign, ctx: &Bindings) -> Result<Outputs> {
            let value = insn.program.evaluate(ctx, &self.pool)?;
            Ok(vec![(insn.name.clone(), value.into())])
        }

        fn exec_flux_batch_assign(&mut self, _: &FluxBatchAssign, _: &Bindings) -> Result<Outputs> {
            Err(ExecError::Unsupported("flux".into()).into())
        }

        fn exec_diff_batch_assign(&mut self, _: &DiffBatchAssign, _: &Bindings) -> Result<Outputs> {
            Err(ExecError::Unsupported("diff".into()).into())
        }

        fn exec_mass_assign(&mut self, insn: &MassAssign, ctx: &Bindings) -> Result<Outputs> {
            let value = crate::exec::evaluate(&insn.field, ctx, &self.pool)?;
            Ok(vec![(
                insn.name.clone(),
                Output::Pending(Box::new(ReadyFuture(value))),
            )])
        }

        fn exec_flux_receive_batch_assign(
            &mut self,
            _: &FluxReceiveBatchAssign,
            _: &Bindings,
        ) -> Result<Outputs> {
            Err(ExecError::Unsupported("receive".into()).into())
        }

        fn evaluate(&mut self, expr: &Expr, ctx: &Bindings) -> Result<Value> {
            crate::exec::evaluate(expr, ctx, &self.pool)
        }
    }

    fn assign(name: &str, expr: Expr, priority: i32) -> Instruction {
        Instruction::Assign(Assign {
            name: name.into(),
            expr,
            priority,
        })
    }

    fn inputs(x: f64) -> Bindings {
        let mut b = Bindings::new();
        b.insert("x".into(), Value::Scalar(x));
        b
    }

    #[test]
    fn test_priority_orders_ready_set() {
        let code = Code::new(
            vec![
                assign("a", Expr::var("x"), 2),
                assign("b", Expr::var("x"), -1),
                assign("c", Expr::var("x"), 0),
            ],
            vec![Expr::var("a") + Expr::var("b") + Expr::var("c")],
        );
        let (values, trace) = Executor::new()
            .run(&code, &mut ScalarMapper::new(), inputs(1.0))
            .unwrap();
        assert_eq!(values[0].as_scalar(), Some(3.0));
        let order: Vec<usize> = trace.executed().iter().map(|i| i.get()).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_tie_break() {
        let code = Code::new(
            vec![assign("a", Expr::var("x"), 0), assign("b", Expr::var("x"), 0)],
            vec![Expr::var("a") * Expr::var("b")],
        );
        let (_, first) = Executor::new()
            .run(&code, &mut ScalarMapper::new(), inputs(2.0))
            .unwrap();
        let (values, last) = Executor::new()
            .with_tie_break(TieBreak::Last)
            .run(&code, &mut ScalarMapper::new(), inputs(2.0))
            .unwrap();
        assert_eq!(first.position(InstructionId::new(0)), Some(0));
        assert_eq!(last.position(InstructionId::new(1)), Some(0));
        assert_eq!(values[0].as_scalar(), Some(4.0));
    }

    #[test]
    fn test_future_unblocks_dependents() {
        let code = Code::new(
            vec![
                Instruction::MassAssign(MassAssign {
                    name: "m".into(),
                    kind: crate::optemplate::MassKind::Mass,
                    field: Expr::var("x") * Expr::constant(3.0),
                }),
                assign("y", Expr::var("m") + Expr::constant(1.0), 0),
            ],
            vec![Expr::var("y")],
        );
        let (values, trace) = Executor::new()
            .run(&code, &mut ScalarMapper::new(), inputs(2.0))
            .unwrap();
        assert_eq!(values[0].as_scalar(), Some(7.0));
        assert_eq!(trace.executed().len(), 2);
        assert!(trace
            .events
            .iter()
            .any(|e| matches!(e, TraceEvent::FutureReady(n) | TraceEvent::FutureForced(n) if n == "m")));
    }

    #[test]
    fn test_missing_input() {
        let code = Code::new(vec![assign("a", Expr::var("q"), 0)], vec![Expr::var("a")]);
        let err = execute(&code, &mut ScalarMapper::new(), Bindings::new()).unwrap_err();
        assert!(matches!(err, crate::Error::Exec(ExecError::UnboundVariable(n)) if n == "q"));
    }
}
