//! Instruction dispatch onto a discretization's kernels.

use std::sync::Arc;
use std::time::Instant;

use tracing::trace;

use super::eval::evaluate;
use super::exchange::{LoopbackExchange, NeighborExchange};
use super::mapper::{ExecutionMapper, Output, Outputs};
use super::stats::ExecutionStats;
use super::value::{Bindings, Value};
use crate::compiler::{
    Assign, DiffBatchAssign, FluxBatchAssign, FluxReceiveBatchAssign, MassAssign, VectorExprAssign,
};
use crate::config::DebugFlag;
use crate::discretization::Discretization;
use crate::error::{ConsistencyError, ExecError, Result};
use crate::kernels::diff::{apply_diff, diff_flops};
use crate::kernels::element_local::{apply_mass, mass_flops};
use crate::kernels::flux::{apply_flux, flux_flops, FluxLayout, FluxOperands, Operand};
use crate::kernels::{KernelBackend, ReferenceBackend};
use crate::optemplate::{walk, Expr};

/// Arithmetic nodes in `expr`, for flop estimates.
fn arithmetic_ops(expr: &Expr) -> u64 {
    let mut count = 0;
    walk(expr, &mut |e| match e {
        Expr::Sum(terms) | Expr::Product(terms) => count += terms.len().saturating_sub(1) as u64,
        Expr::Neg(_) => count += 1,
        _ => {}
    });
    count
}

fn operand(value: &Value) -> Operand<'_> {
    match value {
        Value::Scalar(s) => Operand::Scalar(*s),
        Value::Vector(v) => Operand::Vector(&v[..]),
    }
}

/// Runs every instruction kind against a [`Discretization`].
#[derive(Debug)]
pub struct GpuExecutionMapper<'a> {
    discr: &'a Discretization,
    backend: Arc<dyn KernelBackend>,
    exchange: Arc<dyn NeighborExchange>,
    stats: ExecutionStats,
    instrumented: bool,
    nan_check: bool,
}

impl<'a> GpuExecutionMapper<'a> {
    /// Reference kernels and a loopback neighbor exchange.
    pub fn new(discr: &'a Discretization) -> Self {
        let exchange = LoopbackExchange::new(Arc::clone(discr.streams()), Arc::clone(discr.device_pool()));
        Self {
            discr,
            backend: Arc::new(ReferenceBackend::new()),
            exchange: Arc::new(exchange),
            stats: ExecutionStats::new(),
            instrumented: discr.config().instrumented,
            nan_check: discr.config().has_debug(DebugFlag::NanCheck),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn KernelBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_exchange(mut self, exchange: Arc<dyn NeighborExchange>) -> Self {
        self.exchange = exchange;
        self
    }

    pub fn backend(&self) -> &dyn KernelBackend {
        self.backend.as_ref()
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn take_stats(&mut self) -> ExecutionStats {
        std::mem::take(&mut self.stats)
    }

    fn record(&mut self, kind: &'static str, flops: u64, start: Instant) {
        if self.instrumented {
            self.stats.record(kind, flops, start.elapsed());
        }
    }

    fn check_nan(&self, name: &str, value: &Value) -> Result<()> {
        if !self.nan_check {
            return Ok(());
        }
        let found = match value {
            Value::Scalar(s) => s.is_nan().then_some(0),
            Value::Vector(v) => v.iter().position(|x| x.is_nan()),
        };
        match found {
            Some(index) => Err(ConsistencyError::NanDetected {
                name: name.to_string(),
                index,
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Evaluate `expr` and require a device volume vector.
    fn volume_field(&self, expr: &Expr, ctx: &Bindings) -> Result<Value> {
        let value = evaluate(expr, ctx, self.discr.device_pool())?;
        let len = value.expect_vector("operator field")?.len();
        if len != self.discr.gpu_dof_count() {
            return Err(ExecError::dimension_mismatch(self.discr.gpu_dof_count(), len).into());
        }
        Ok(value)
    }

    fn finish(&self, names: &[String], values: Vec<Value>) -> Result<Outputs> {
        for (name, value) in names.iter().zip(&values) {
            self.check_nan(name, value)?;
        }
        Ok(names.iter().cloned().zip(values.into_iter().map(Output::Ready)).collect())
    }
}

impl ExecutionMapper for GpuExecutionMapper<'_> {
    fn exec_assign(&mut self, insn: &Assign, ctx: &Bindings) -> Result<Outputs> {
        let start = Instant::now();
        let value = evaluate(&insn.expr, ctx, self.discr.device_pool())?;
        let len = value.vector_len().unwrap_or(1) as u64;
        self.record("assign", len * arithmetic_ops(&insn.expr), start);
        self.finish(std::slice::from_ref(&insn.name), vec![value])
    }

    fn exec_vector_expr_assign(&mut self, insn: &VectorExprAssign, ctx: &Bindings) -> Result<Outputs> {
        let start = Instant::now();
        let value = insn.program.evaluate(ctx, self.discr.device_pool())?;
        let len = value.vector_len().unwrap_or(1) as u64;
        self.record("vector_expr", len * arithmetic_ops(&insn.expr), start);
        self.finish(std::slice::from_ref(&insn.name), vec![value])
    }

    fn exec_flux_batch_assign(&mut self, insn: &FluxBatchAssign, ctx: &Bindings) -> Result<Outputs> {
        let start = Instant::now();
        let discr = self.discr;
        let pool = discr.device_pool();
        let layout = FluxLayout {
            info: discr.face_storage(),
            geometry: discr.geometry(),
            el_offsets: discr.element_offsets(),
            volume_len: discr.gpu_dof_count(),
            boundary_len: discr.aligned_boundary_dof_count(),
        };

        let mut flops = 0;
        let mut values = Vec::with_capacity(insn.fluxes.len());
        for flux in &insn.fluxes {
            let interiors = flux
                .interiors
                .iter()
                .map(|term| evaluate(&term.field, ctx, pool))
                .collect::<Result<Vec<_>>>()?;
            let boundaries = flux
                .boundaries
                .iter()
                .map(|term| -> Result<(Value, Value)> {
                    Ok((evaluate(&term.field, ctx, pool)?, evaluate(&term.bfield, ctx, pool)?))
                })
                .collect::<Result<Vec<_>>>()?;
            let operands = FluxOperands {
                interiors: interiors.iter().map(operand).collect(),
                boundaries: boundaries.iter().map(|(f, b)| (operand(f), operand(b))).collect(),
            };

            let mut out = pool.allocate(discr.gpu_dof_count())?;
            apply_flux(
                self.backend.as_ref(),
                &discr.operators().flux,
                flux,
                &operands,
                &layout,
                &mut out,
            )?;
            flops += flux_flops(&discr.operators().flux, flux, &layout);
            values.push(Value::Vector(Arc::new(out)));
        }
        trace!(fluxes = insn.fluxes.len(), kind = ?insn.kind, "flux batch");
        self.record("flux_batch", flops, start);
        self.finish(&insn.names, values)
    }

    fn exec_diff_batch_assign(&mut self, insn: &DiffBatchAssign, ctx: &Bindings) -> Result<Outputs> {
        let start = Instant::now();
        let discr = self.discr;
        let field = self.volume_field(&insn.field, ctx)?;
        let field = field.expect_vector("diff field")?;

        let mut buffers = insn
            .axes
            .iter()
            .map(|_| discr.device_pool().allocate(discr.gpu_dof_count()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        {
            let mut outputs: Vec<&mut [f64]> = buffers.iter_mut().map(|b| &mut b[..]).collect();
            apply_diff(
                self.backend.as_ref(),
                &discr.operators().diff,
                insn.kind,
                &insn.axes,
                discr.geometry(),
                discr.element_offsets(),
                field,
                &mut outputs,
            )?;
        }
        let flops = diff_flops(&discr.operators().diff, insn.axes.len(), discr.element_offsets().len());
        self.record("diff_batch", flops, start);
        let values = buffers
            .into_iter()
            .map(|b| Value::Vector(Arc::new(b)))
            .collect();
        self.finish(&insn.names, values)
    }

    fn exec_mass_assign(&mut self, insn: &MassAssign, ctx: &Bindings) -> Result<Outputs> {
        let start = Instant::now();
        let discr = self.discr;
        let field = self.volume_field(&insn.field, ctx)?;
        let mut out = discr.device_pool().allocate(discr.gpu_dof_count())?;
        apply_mass(
            self.backend.as_ref(),
            &discr.operators().mass,
            insn.kind,
            discr.geometry(),
            discr.element_offsets(),
            field.expect_vector("mass field")?,
            &mut out,
        )?;
        self.record(
            "mass",
            mass_flops(&discr.operators().mass, discr.element_offsets().len()),
            start,
        );
        self.finish(std::slice::from_ref(&insn.name), vec![Value::Vector(Arc::new(out))])
    }

    fn exec_flux_receive_batch_assign(
        &mut self,
        insn: &FluxReceiveBatchAssign,
        ctx: &Bindings,
    ) -> Result<Outputs> {
        let start = Instant::now();
        let field = evaluate(&insn.field, ctx, self.discr.device_pool())?;
        let field = field.expect_vector("received field")?;
        let outputs = insn
            .names
            .iter()
            .zip(&insn.indices_and_ranks)
            .map(|(name, &(index, rank))| -> Result<(String, Output)> {
                let future = self.exchange.receive(field, index, rank)?;
                Ok((name.clone(), Output::Pending(future)))
            })
            .collect::<Result<Outputs>>()?;
        self.record("flux_receive", 0, start);
        Ok(outputs)
    }

    fn evaluate(&mut self, expr: &Expr, ctx: &Bindings) -> Result<Value> {
        let value = evaluate(expr, ctx, self.discr.device_pool())?;
        self.check_nan("result", &value)?;
        Ok(value)
    }
}
