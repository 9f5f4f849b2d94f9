//! Operator template to instruction list.
//!
//! Compilation runs in two phases. First, every flux in the template is
//! placed into a batch: fluxes whose operands contain no unevaluated flux
//! form the first layer, fluxes depending only on earlier layers the next,
//! and so on; each layer is split by [`FluxKind`]. Differentiation and
//! flux-receive bindings are collected so that all derivatives of one
//! field (and all receives of one field) are emitted together.
//!
//! Second, the template is rebuilt bottom-up. Operator bindings and fluxes
//! become instructions whose outputs are fresh variables; structurally
//! equal sub-expressions map to the same variable. Top-level results that
//! are not already variables get a final assignment.

use std::collections::{BTreeMap, HashMap, HashSet};

use indexmap::IndexSet;
use tracing::debug;

use super::code::Code;
use super::instruction::{
    Assign, DiffBatchAssign, FluxBatchAssign, FluxReceiveBatchAssign, Instruction, MassAssign,
    VectorExprAssign,
};
use crate::error::CompileError;
use crate::exec::VectorProgram;
use crate::optemplate::{bound_operators, contained_fluxes, DiffKind, Expr, FluxKind, MassKind, Operator};

/// Compiler settings.
#[derive(Clone, Debug)]
pub struct CompilerOptions {
    /// Prefix of generated variable names.
    pub prefix: String,
    /// Emit fused vector programs instead of plain assignments.
    pub vectorize: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            prefix: "_expr".to_string(),
            vectorize: false,
        }
    }
}

impl CompilerOptions {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_vectorize(mut self, vectorize: bool) -> Self {
        self.vectorize = vectorize;
        self
    }
}

/// A flux and the fluxes it has to wait for.
#[derive(Clone, Debug, PartialEq)]
pub struct FluxRecord {
    /// The [`Expr::Flux`] node.
    pub flux: Expr,
    pub dependencies: IndexSet<Expr>,
    pub kind: FluxKind,
}

impl FluxRecord {
    /// Record for `flux`, depending on every flux inside its operands.
    ///
    /// Returns `None` if `flux` is not a flux node.
    pub fn of(flux: &Expr) -> Option<Self> {
        let Expr::Flux(wdflux) = flux else {
            return None;
        };
        let dependencies = wdflux.operands().flat_map(contained_fluxes).collect();
        Some(Self {
            flux: flux.clone(),
            dependencies,
            kind: wdflux.kind(),
        })
    }
}

/// Fluxes evaluated by one instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct FluxBatch {
    pub kind: FluxKind,
    pub fluxes: Vec<Expr>,
}

/// Order flux records into batches.
///
/// Each pass takes every record whose dependencies are already batched,
/// and splits it by kind (`WholeDomain` before `Boundary`). A pass that
/// takes nothing means the remaining records depend on each other.
pub fn batch_fluxes(records: Vec<FluxRecord>) -> Result<Vec<FluxBatch>, CompileError> {
    let mut queue = records;
    let mut admissible: HashSet<Expr> = HashSet::new();
    let mut batches = Vec::new();

    while !queue.is_empty() {
        let (ready, rest): (Vec<_>, Vec<_>) = queue
            .into_iter()
            .partition(|r| r.dependencies.iter().all(|d| admissible.contains(d)));
        if ready.is_empty() {
            return Err(CompileError::UnresolvableFluxOrder {
                remaining: rest.len(),
            });
        }

        let mut by_kind: BTreeMap<FluxKind, Vec<Expr>> = BTreeMap::new();
        for record in ready {
            admissible.insert(record.flux.clone());
            by_kind.entry(record.kind).or_default().push(record.flux);
        }
        batches.extend(
            by_kind
                .into_iter()
                .map(|(kind, fluxes)| FluxBatch { kind, fluxes }),
        );
        queue = rest;
    }
    Ok(batches)
}

/// Flux records for every distinct flux in `outputs`.
pub fn flux_records(outputs: &[Expr]) -> Vec<FluxRecord> {
    let fluxes: IndexSet<Expr> = outputs.iter().flat_map(contained_fluxes).collect();
    fluxes.iter().filter_map(FluxRecord::of).collect()
}

/// Compiles operator templates into [`Code`]. One instance per template.
#[derive(Debug)]
pub struct OperatorCompiler {
    options: CompilerOptions,
    code: Vec<Instruction>,
    assigned_var_count: usize,
    expr_to_var: HashMap<Expr, Expr>,
    flux_batches: Vec<FluxBatch>,
    diff_ops: IndexSet<Expr>,
    flux_receive_ops: IndexSet<Expr>,
}

impl Default for OperatorCompiler {
    fn default() -> Self {
        Self::new(CompilerOptions::default())
    }
}

impl OperatorCompiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            code: Vec::new(),
            assigned_var_count: 0,
            expr_to_var: HashMap::new(),
            flux_batches: Vec::new(),
            diff_ops: IndexSet::new(),
            flux_receive_ops: IndexSet::new(),
        }
    }

    /// First flux batch `expr` would evaluate, if it has fluxes.
    pub fn first_flux_batch(expr: &Expr) -> Result<Option<FluxBatch>, CompileError> {
        let batches = batch_fluxes(flux_records(std::slice::from_ref(expr)))?;
        Ok(batches.into_iter().next())
    }

    pub fn compile(self, expr: &Expr) -> Result<Code, CompileError> {
        self.compile_many(std::slice::from_ref(expr))
    }

    /// Compile several outputs into one code object sharing intermediates.
    pub fn compile_many(mut self, outputs: &[Expr]) -> Result<Code, CompileError> {
        self.flux_batches = batch_fluxes(flux_records(outputs))?;
        for output in outputs {
            self.diff_ops
                .extend(bound_operators(output, |op| matches!(op, Operator::Diff { .. })));
            self.flux_receive_ops.extend(bound_operators(output, |op| {
                matches!(op, Operator::FluxReceive { .. })
            }));
        }

        let mut result = Vec::with_capacity(outputs.len());
        for output in outputs {
            let mapped = self.rec(output)?;
            result.push(self.assign_to_new_var(mapped, 0)?);
        }

        debug!(
            instructions = self.code.len(),
            flux_batches = self.flux_batches.len(),
            variables = self.assigned_var_count,
            "compiled operator template"
        );
        Ok(Code::new(self.code, result))
    }

    fn get_var_name(&mut self) -> String {
        let name = format!("{}{}", self.options.prefix, self.assigned_var_count);
        self.assigned_var_count += 1;
        name
    }

    fn assign_to_new_var(&mut self, expr: Expr, priority: i32) -> Result<Expr, CompileError> {
        if matches!(expr, Expr::Variable(_)) {
            return Ok(expr);
        }
        let name = self.get_var_name();
        let insn = if self.options.vectorize {
            Instruction::VectorExprAssign(VectorExprAssign {
                program: VectorProgram::compile(&expr)?,
                name: name.clone(),
                expr,
                priority,
            })
        } else {
            Instruction::Assign(Assign {
                name: name.clone(),
                expr,
                priority,
            })
        };
        self.code.push(insn);
        Ok(Expr::Variable(name))
    }

    fn rec(&mut self, expr: &Expr) -> Result<Expr, CompileError> {
        match expr {
            Expr::Variable(_) | Expr::Constant(_) => Ok(expr.clone()),
            Expr::Sum(terms) => Ok(Expr::Sum(self.rec_all(terms)?)),
            Expr::Product(factors) => Ok(Expr::Product(self.rec_all(factors)?)),
            Expr::Neg(inner) => Ok(Expr::Neg(Box::new(self.rec(inner)?))),
            Expr::OperatorBinding { op, field } => match op {
                Operator::Diff { kind, .. } => self.map_diff_op_binding(expr, *kind, field),
                Operator::Mass(kind) => self.map_mass_op_binding(expr, *kind, field),
                Operator::FluxReceive { .. } => self.map_flux_receive_op_binding(expr, field),
            },
            Expr::Flux(_) => self.map_planned_flux(expr),
            Expr::CommonSubexpression { child, priority } => {
                if let Some(var) = self.expr_to_var.get(child.as_ref()) {
                    return Ok(var.clone());
                }
                let mapped = self.rec(child)?;
                let var = self.assign_to_new_var(mapped, *priority)?;
                self.expr_to_var.insert((**child).clone(), var.clone());
                Ok(var)
            }
        }
    }

    fn rec_all(&mut self, exprs: &[Expr]) -> Result<Vec<Expr>, CompileError> {
        exprs.iter().map(|e| self.rec(e)).collect()
    }

    fn map_diff_op_binding(
        &mut self,
        expr: &Expr,
        kind: DiffKind,
        field: &Expr,
    ) -> Result<Expr, CompileError> {
        if let Some(var) = self.expr_to_var.get(expr) {
            return Ok(var.clone());
        }

        let all_diffs: Vec<(Expr, usize)> = self
            .diff_ops
            .iter()
            .filter_map(|d| match d {
                Expr::OperatorBinding {
                    op: Operator::Diff { kind: k, axis },
                    field: f,
                } if *k == kind && f.as_ref() == field => Some((d.clone(), *axis)),
                _ => None,
            })
            .collect();
        if all_diffs.is_empty() {
            return Err(CompileError::UncollectedBinding(expr.to_string()));
        }

        let names: Vec<String> = all_diffs.iter().map(|_| self.get_var_name()).collect();
        let mapped_field = self.rec(field)?;
        self.code.push(Instruction::DiffBatchAssign(DiffBatchAssign {
            names: names.clone(),
            kind,
            axes: all_diffs.iter().map(|(_, axis)| *axis).collect(),
            field: mapped_field,
        }));
        for (name, (diff, _)) in names.into_iter().zip(all_diffs) {
            self.expr_to_var.insert(diff, Expr::Variable(name));
        }

        self.expr_to_var
            .get(expr)
            .cloned()
            .ok_or_else(|| CompileError::UncollectedBinding(expr.to_string()))
    }

    fn map_mass_op_binding(
        &mut self,
        expr: &Expr,
        kind: MassKind,
        field: &Expr,
    ) -> Result<Expr, CompileError> {
        if let Some(var) = self.expr_to_var.get(expr) {
            return Ok(var.clone());
        }
        let name = self.get_var_name();
        let mapped_field = self.rec(field)?;
        self.code.push(Instruction::MassAssign(MassAssign {
            name: name.clone(),
            kind,
            field: mapped_field,
        }));
        let var = Expr::Variable(name);
        self.expr_to_var.insert(expr.clone(), var.clone());
        Ok(var)
    }

    fn map_flux_receive_op_binding(&mut self, expr: &Expr, field: &Expr) -> Result<Expr, CompileError> {
        if let Some(var) = self.expr_to_var.get(expr) {
            return Ok(var.clone());
        }

        let all_receives: Vec<(Expr, (usize, usize))> = self
            .flux_receive_ops
            .iter()
            .filter_map(|r| match r {
                Expr::OperatorBinding {
                    op: Operator::FluxReceive { index, rank },
                    field: f,
                } if f.as_ref() == field => Some((r.clone(), (*index, *rank))),
                _ => None,
            })
            .collect();
        if all_receives.is_empty() {
            return Err(CompileError::UncollectedBinding(expr.to_string()));
        }

        let names: Vec<String> = all_receives.iter().map(|_| self.get_var_name()).collect();
        let mapped_field = self.rec(field)?;
        self.code
            .push(Instruction::FluxReceiveBatchAssign(FluxReceiveBatchAssign {
                names: names.clone(),
                indices_and_ranks: all_receives.iter().map(|(_, ir)| *ir).collect(),
                field: mapped_field,
            }));
        for (name, (receive, _)) in names.into_iter().zip(all_receives) {
            self.expr_to_var.insert(receive, Expr::Variable(name));
        }

        self.expr_to_var
            .get(expr)
            .cloned()
            .ok_or_else(|| CompileError::UncollectedBinding(expr.to_string()))
    }

    fn map_planned_flux(&mut self, expr: &Expr) -> Result<Expr, CompileError> {
        if let Some(var) = self.expr_to_var.get(expr) {
            return Ok(var.clone());
        }

        let Some(batch) = self
            .flux_batches
            .iter()
            .find(|b| b.fluxes.contains(expr))
            .cloned()
        else {
            return Err(CompileError::FluxNotBatched(expr.to_string()));
        };

        let mut mapped = Vec::with_capacity(batch.fluxes.len());
        for flux in &batch.fluxes {
            let Expr::Flux(wdflux) = flux else {
                return Err(CompileError::FluxNotBatched(flux.to_string()));
            };
            mapped.push(wdflux.map_operands(|operand| self.rec(operand))?);
        }

        let names: Vec<String> = batch.fluxes.iter().map(|_| self.get_var_name()).collect();
        self.code.push(Instruction::FluxBatchAssign(FluxBatchAssign {
            names: names.clone(),
            fluxes: mapped,
            kind: batch.kind,
        }));
        for (name, flux) in names.into_iter().zip(batch.fluxes) {
            self.expr_to_var.insert(flux, Expr::Variable(name));
        }

        self.expr_to_var
            .get(expr)
            .cloned()
            .ok_or_else(|| CompileError::FluxNotBatched(expr.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::BoundaryTag;
    use crate::optemplate::{FluxTerm, WholeDomainFlux};

    fn lift(field: Expr) -> Expr {
        Expr::flux(WholeDomainFlux::lift().with_interior(FluxTerm::central(), field))
    }

    fn count(code: &Code, kind: &str) -> usize {
        code.instructions()
            .iter()
            .filter(|i| i.kind_name() == kind)
            .count()
    }

    #[test]
    fn test_diffs_of_one_field_batched() {
        let u = Expr::var("u");
        let expr = Expr::diff(0, u.clone()) + Expr::diff(1, u.clone()) + Expr::weak_diff(0, u);
        let code = OperatorCompiler::default().compile(&expr).unwrap();
        // one strong batch with two axes, one weak batch, one final assign
        assert_eq!(count(&code, "diff_batch"), 2);
        assert_eq!(count(&code, "assign"), 1);
        let Instruction::DiffBatchAssign(strong) = &code.instructions()[0] else {
            panic!("expected diff batch first");
        };
        assert_eq!(strong.axes, vec![0, 1]);
        assert_eq!(strong.names, vec!["_expr0", "_expr1"]);
    }

    #[test]
    fn test_structural_dedup() {
        let d = Expr::inverse_mass(Expr::var("u"));
        let expr = d.clone() * d;
        let code = OperatorCompiler::default().compile(&expr).unwrap();
        assert_eq!(count(&code, "mass"), 1);
    }

    #[test]
    fn test_bare_variable_result_not_wrapped() {
        let code = OperatorCompiler::default()
            .compile(&Expr::mass(Expr::var("u")))
            .unwrap();
        assert_eq!(code.len(), 1);
        assert_eq!(code.result(), &[Expr::var("_expr0")]);
    }

    #[test]
    fn test_cse_priority() {
        let expr = Expr::cse(Expr::var("a") + Expr::var("b"), 5) * Expr::constant(2.0);
        let code = OperatorCompiler::new(CompilerOptions::default().with_prefix("t"))
            .compile(&expr)
            .unwrap();
        assert_eq!(code.len(), 2);
        assert_eq!(code.instructions()[0].priority(), 5);
        assert_eq!(code.instructions()[0].assignees(), vec!["t0"]);
        assert_eq!(code.result(), &[Expr::var("t1")]);
    }

    #[test]
    fn test_flux_layers() {
        let inner = lift(Expr::var("u"));
        let other = lift(Expr::var("v"));
        let outer = lift(inner.clone());
        let expr = outer + other;
        let batches = batch_fluxes(flux_records(std::slice::from_ref(&expr))).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].fluxes.len(), 2);
        assert!(batches[0].fluxes.contains(&inner));
        assert_eq!(batches[1].fluxes.len(), 1);

        let code = OperatorCompiler::default().compile(&expr).unwrap();
        assert_eq!(count(&code, "flux_batch"), 2);
    }

    #[test]
    fn test_layer_split_by_kind() {
        let wd = lift(Expr::var("u"));
        let bd = Expr::flux(WholeDomainFlux::lift().with_boundary(
            FluxTerm::jump(),
            Expr::var("u"),
            Expr::var("bc"),
            BoundaryTag::Wall,
        ));
        let batches = batch_fluxes(flux_records(&[bd + wd])).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].kind, FluxKind::WholeDomain);
        assert_eq!(batches[1].kind, FluxKind::Boundary);
    }

    #[test]
    fn test_cycle_is_fatal() {
        let a = lift(Expr::var("a"));
        let b = lift(Expr::var("b"));
        let records = vec![
            FluxRecord {
                flux: a.clone(),
                dependencies: IndexSet::from([b.clone()]),
                kind: FluxKind::WholeDomain,
            },
            FluxRecord {
                flux: b,
                dependencies: IndexSet::from([a]),
                kind: FluxKind::WholeDomain,
            },
        ];
        assert_eq!(
            batch_fluxes(records).unwrap_err(),
            CompileError::UnresolvableFluxOrder { remaining: 2 }
        );
    }

    #[test]
    fn test_receive_batched_by_field() {
        let u = Expr::var("u");
        let expr = Expr::flux_receive(0, 1, u.clone()) + Expr::flux_receive(1, 2, u);
        let code = OperatorCompiler::default().compile(&expr).unwrap();
        assert_eq!(count(&code, "flux_receive"), 1);
        let Instruction::FluxReceiveBatchAssign(r) = &code.instructions()[0] else {
            panic!("expected receive batch");
        };
        assert_eq!(r.indices_and_ranks, vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_vectorize_option() {
        let expr = Expr::var("a") * Expr::constant(3.0) + Expr::var("b");
        let code = OperatorCompiler::new(CompilerOptions::default().with_vectorize(true))
            .compile(&expr)
            .unwrap();
        assert_eq!(count(&code, "vector_expr"), 1);
    }

    #[test]
    fn test_first_flux_batch() {
        let expr = lift(Expr::var("u")) + lift(Expr::var("v"));
        let batch = OperatorCompiler::first_flux_batch(&expr).unwrap().unwrap();
        assert_eq!(batch.fluxes.len(), 2);
        assert!(OperatorCompiler::first_flux_batch(&Expr::var("u")).unwrap().is_none());
    }
}
