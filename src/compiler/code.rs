//! Compiled operator templates.

use std::collections::HashSet;
use std::fmt;

use indexmap::{IndexMap, IndexSet};

use super::instruction::Instruction;
use crate::error::Result;
use crate::exec::{Bindings, ExecutionMapper, Value};
use crate::optemplate::{dependencies, Expr};
use crate::types::InstructionId;

/// Instruction list plus result expressions.
///
/// Instruction order carries no meaning for execution; the scheduler
/// follows dependencies. The dependency index and the initial ready set
/// are derived once here.
#[derive(Clone, Debug)]
pub struct Code {
    instructions: Vec<Instruction>,
    result: Vec<Expr>,
    dependencies: Vec<IndexSet<String>>,
    insns_depending_on: IndexMap<String, Vec<InstructionId>>,
    initial_exec_front: Vec<InstructionId>,
}

impl Code {
    pub fn new(instructions: Vec<Instruction>, result: Vec<Expr>) -> Self {
        let dependencies: Vec<IndexSet<String>> =
            instructions.iter().map(Instruction::dependencies).collect();

        let mut insns_depending_on: IndexMap<String, Vec<InstructionId>> = IndexMap::new();
        let mut generated: HashSet<&str> = HashSet::new();
        for (i, (insn, deps)) in instructions.iter().zip(&dependencies).enumerate() {
            for dep in deps {
                insns_depending_on
                    .entry(dep.clone())
                    .or_default()
                    .push(InstructionId::new(i));
            }
            generated.extend(insn.assignees());
        }

        let initial_exec_front = dependencies
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.iter().all(|d| !generated.contains(d.as_str())))
            .map(|(i, _)| InstructionId::new(i))
            .collect();

        Self {
            instructions,
            result,
            dependencies,
            insns_depending_on,
            initial_exec_front,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn instruction(&self, id: InstructionId) -> &Instruction {
        &self.instructions[id]
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Result expressions, one per compiled output.
    pub fn result(&self) -> &[Expr] {
        &self.result
    }

    /// Variables read by instruction `id`.
    pub fn dependencies_of(&self, id: InstructionId) -> &IndexSet<String> {
        &self.dependencies[id]
    }

    /// Instructions reading `name`.
    pub fn insns_depending_on(&self, name: &str) -> &[InstructionId] {
        self.insns_depending_on
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Instructions that read no generated variable.
    pub fn initial_exec_front(&self) -> &[InstructionId] {
        &self.initial_exec_front
    }

    /// Free variables the caller has to bind.
    pub fn inputs(&self) -> IndexSet<String> {
        let generated: HashSet<&str> = self
            .instructions
            .iter()
            .flat_map(Instruction::assignees)
            .collect();
        let result_deps = self.result.iter().flat_map(dependencies);
        self.dependencies
            .iter()
            .flatten()
            .cloned()
            .chain(result_deps)
            .filter(|d| !generated.contains(d.as_str()))
            .collect()
    }

    /// Run with default scheduling. See [`crate::exec::execute`].
    pub fn execute(&self, mapper: &mut dyn ExecutionMapper, bindings: Bindings) -> Result<Vec<Value>> {
        crate::exec::execute(self, mapper, bindings)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for insn in &self.instructions {
            writeln!(f, "{insn}")?;
        }
        for (i, expr) in self.result.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{expr}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Assign;

    fn assign(name: &str, expr: Expr) -> Instruction {
        Instruction::Assign(Assign {
            name: name.into(),
            expr,
            priority: 0,
        })
    }

    #[test]
    fn test_dependency_index() {
        let code = Code::new(
            vec![
                assign("a", Expr::var("x") * Expr::constant(2.0)),
                assign("b", Expr::var("a") + Expr::var("y")),
                assign("c", Expr::var("y") * Expr::var("y")),
            ],
            vec![Expr::var("b"), Expr::var("c")],
        );
        assert_eq!(code.insns_depending_on("a"), &[InstructionId::new(1)]);
        assert_eq!(
            code.insns_depending_on("y"),
            &[InstructionId::new(1), InstructionId::new(2)]
        );
        assert!(code.insns_depending_on("b").is_empty());
        assert_eq!(
            code.initial_exec_front(),
            &[InstructionId::new(0), InstructionId::new(2)]
        );
        let inputs: Vec<_> = code.inputs().into_iter().collect();
        assert_eq!(inputs, vec!["x", "y"]);
    }

    #[test]
    fn test_display() {
        let code = Code::new(vec![assign("a", -Expr::var("x"))], vec![Expr::var("a")]);
        assert_eq!(code.to_string(), "a <- -x\na");
    }
}
