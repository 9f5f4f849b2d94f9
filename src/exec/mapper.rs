//! Instruction dispatch interface between the scheduler and kernels.

use std::fmt;

use super::value::{Bindings, Value};
use crate::compiler::{
    Assign, DiffBatchAssign, FluxBatchAssign, FluxReceiveBatchAssign, Instruction, MassAssign,
    VectorExprAssign,
};
use crate::device::DeviceFuture;
use crate::error::Result;
use crate::optemplate::Expr;

/// Value produced by an instruction: bound now, or once a future resolves.
pub enum Output {
    Ready(Value),
    Pending(Box<dyn DeviceFuture>),
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Ready(v) => f.debug_tuple("Ready").field(v).finish(),
            Output::Pending(_) => f.write_str("Pending"),
        }
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::Ready(value)
    }
}

/// Outputs of one instruction, by assignee.
pub type Outputs = Vec<(String, Output)>;

/// Executes instructions against bound values.
///
/// The scheduler guarantees that every dependency of an instruction is in
/// `ctx` when its method is called.
pub trait ExecutionMapper {
    fn exec_assign(&mut self, insn: &Assign, ctx: &Bindings) -> Result<Outputs>;

    fn exec_vector_expr_assign(&mut self, insn: &VectorExprAssign, ctx: &Bindings) -> Result<Outputs>;

    fn exec_flux_batch_assign(&mut self, insn: &FluxBatchAssign, ctx: &Bindings) -> Result<Outputs>;

    fn exec_diff_batch_assign(&mut self, insn: &DiffBatchAssign, ctx: &Bindings) -> Result<Outputs>;

    fn exec_mass_assign(&mut self, insn: &MassAssign, ctx: &Bindings) -> Result<Outputs>;

    fn exec_flux_receive_batch_assign(
        &mut self,
        insn: &FluxReceiveBatchAssign,
        ctx: &Bindings,
    ) -> Result<Outputs>;

    /// Evaluate a result expression once all instructions have run.
    fn evaluate(&mut self, expr: &Expr, ctx: &Bindings) -> Result<Value>;

    /// Dispatch on the instruction kind.
    fn exec_instruction(&mut self, insn: &Instruction, ctx: &Bindings) -> Result<Outputs> {
        match insn {
            Instruction::Assign(i) => self.exec_assign(i, ctx),
            Instruction::VectorExprAssign(i) => self.exec_vector_expr_assign(i, ctx),
            Instruction::FluxBatchAssign(i) => self.exec_flux_batch_assign(i, ctx),
            Instruction::DiffBatchAssign(i) => self.exec_diff_batch_assign(i, ctx),
            Instruction::MassAssign(i) => self.exec_mass_assign(i, ctx),
            Instruction::FluxReceiveBatchAssign(i) => self.exec_flux_receive_batch_assign(i, ctx),
        }
    }
}
