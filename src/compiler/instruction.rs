//! Instructions of a compiled operator template.
//!
//! Every instruction names the variables it assigns and reads. Reads are
//! the free variables of its input expressions; operator bindings and
//! fluxes never appear in an instruction's inputs after compilation.

use std::fmt;

use indexmap::IndexSet;

use crate::exec::VectorProgram;
use crate::optemplate::{dependencies, DiffKind, Expr, FluxKind, MassKind, WholeDomainFlux};

/// `name <- expr`, evaluated node by node.
#[derive(Clone, Debug, PartialEq)]
pub struct Assign {
    pub name: String,
    pub expr: Expr,
    pub priority: i32,
}

/// `name <- expr`, fused into one element-wise pass.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorExprAssign {
    pub name: String,
    pub expr: Expr,
    pub program: VectorProgram,
    pub priority: i32,
}

/// Fluxes evaluated together in one gather pass.
#[derive(Clone, Debug, PartialEq)]
pub struct FluxBatchAssign {
    pub names: Vec<String>,
    /// Fluxes with operands already reduced to variables and arithmetic.
    pub fluxes: Vec<WholeDomainFlux>,
    pub kind: FluxKind,
}

/// Derivatives of one field along several axes, sharing the rst pass.
#[derive(Clone, Debug, PartialEq)]
pub struct DiffBatchAssign {
    pub names: Vec<String>,
    pub kind: DiffKind,
    pub axes: Vec<usize>,
    pub field: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MassAssign {
    pub name: String,
    pub kind: MassKind,
    pub field: Expr,
}

/// Asynchronous receipt of exchanged face data.
#[derive(Clone, Debug, PartialEq)]
pub struct FluxReceiveBatchAssign {
    pub names: Vec<String>,
    pub indices_and_ranks: Vec<(usize, usize)>,
    pub field: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Assign(Assign),
    VectorExprAssign(VectorExprAssign),
    FluxBatchAssign(FluxBatchAssign),
    DiffBatchAssign(DiffBatchAssign),
    MassAssign(MassAssign),
    FluxReceiveBatchAssign(FluxReceiveBatchAssign),
}

impl Instruction {
    /// Variables written by this instruction.
    pub fn assignees(&self) -> Vec<&str> {
        match self {
            Instruction::Assign(a) => vec![a.name.as_str()],
            Instruction::VectorExprAssign(a) => vec![a.name.as_str()],
            Instruction::FluxBatchAssign(a) => a.names.iter().map(String::as_str).collect(),
            Instruction::DiffBatchAssign(a) => a.names.iter().map(String::as_str).collect(),
            Instruction::MassAssign(a) => vec![a.name.as_str()],
            Instruction::FluxReceiveBatchAssign(a) => a.names.iter().map(String::as_str).collect(),
        }
    }

    /// Variables read by this instruction.
    pub fn dependencies(&self) -> IndexSet<String> {
        match self {
            Instruction::Assign(a) => dependencies(&a.expr),
            Instruction::VectorExprAssign(a) => dependencies(&a.expr),
            Instruction::FluxBatchAssign(a) => a
                .fluxes
                .iter()
                .flat_map(|f| f.operands())
                .flat_map(dependencies)
                .collect(),
            Instruction::DiffBatchAssign(a) => dependencies(&a.field),
            Instruction::MassAssign(a) => dependencies(&a.field),
            Instruction::FluxReceiveBatchAssign(a) => dependencies(&a.field),
        }
    }

    /// Lower runs first among ready instructions.
    pub fn priority(&self) -> i32 {
        match self {
            Instruction::Assign(a) => a.priority,
            Instruction::VectorExprAssign(a) => a.priority,
            Instruction::FluxReceiveBatchAssign(_) => -1,
            Instruction::FluxBatchAssign(_)
            | Instruction::DiffBatchAssign(_)
            | Instruction::MassAssign(_) => 0,
        }
    }

    /// Short kind name for logs and statistics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Instruction::Assign(_) => "assign",
            Instruction::VectorExprAssign(_) => "vector_expr",
            Instruction::FluxBatchAssign(_) => "flux_batch",
            Instruction::DiffBatchAssign(_) => "diff_batch",
            Instruction::MassAssign(_) => "mass",
            Instruction::FluxReceiveBatchAssign(_) => "flux_receive",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Assign(a) => write!(f, "{} <- {}", a.name, a.expr),
            Instruction::VectorExprAssign(a) => write!(f, "{} <- vec {}", a.name, a.expr),
            Instruction::FluxBatchAssign(a) => {
                writeln!(f, "{{ /* {:?} */", a.kind)?;
                for (name, flux) in a.names.iter().zip(&a.fluxes) {
                    writeln!(f, "  {name} <- {flux}")?;
                }
                f.write_str("}")
            }
            Instruction::DiffBatchAssign(a) => {
                let op = match a.kind {
                    DiffKind::Strong => "Diff",
                    DiffKind::Weak => "WeakDiff",
                };
                if a.names.len() > 1 {
                    writeln!(f, "{{")?;
                    for (name, axis) in a.names.iter().zip(&a.axes) {
                        writeln!(f, "  {name} <- {op}{axis} * {}", a.field)?;
                    }
                    f.write_str("}")
                } else {
                    for (name, axis) in a.names.iter().zip(&a.axes) {
                        write!(f, "{name} <- {op}{axis} * {}", a.field)?;
                    }
                    Ok(())
                }
            }
            Instruction::MassAssign(a) => {
                let op = match a.kind {
                    MassKind::Mass => "Mass",
                    MassKind::InverseMass => "InvMass",
                };
                write!(f, "{} <- {op} * {}", a.name, a.field)
            }
            Instruction::FluxReceiveBatchAssign(a) => {
                writeln!(f, "{{")?;
                for (name, (index, rank)) in a.names.iter().zip(&a.indices_and_ranks) {
                    writeln!(
                        f,
                        "  {name} <- receive index {index} from rank {rank} [{}]",
                        a.field
                    )?;
                }
                f.write_str("}")
            }
        }
    }
}
