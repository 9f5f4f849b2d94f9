//! Graphviz rendering of a compiled dataflow graph.

use std::collections::HashMap;
use std::fmt::Write;

use super::code::Code;
use crate::optemplate::Expr;

/// Default label truncation for [`Code::dot_dataflow_graph`].
pub const DEFAULT_MAX_LABEL_LENGTH: usize = 30;

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

impl Code {
    /// Render the dataflow graph in dot syntax.
    ///
    /// Each instruction is a box labeled with its priority and (truncated)
    /// text. Edges run from the instruction producing a variable, or from
    /// `initial` for inputs, to every reader and to `result`.
    pub fn dot_dataflow_graph(&self, max_label_length: usize) -> String {
        let mut lines = vec![
            "initial [label=\"initial\"];".to_string(),
            "result [label=\"result\"];".to_string(),
        ];
        let mut origins: HashMap<&str, String> = HashMap::new();

        for (num, insn) in self.instructions().iter().enumerate() {
            let node = format!("node{num}");
            let label: String = escape(&insn.to_string())
                .chars()
                .take(max_label_length)
                .collect();
            lines.push(format!(
                "{node} [ label=\"p{}: {label}\" shape=box ];",
                insn.priority()
            ));
            for assignee in insn.assignees() {
                origins.insert(assignee, node.clone());
            }
        }

        let origin = |name: &str| {
            origins
                .get(name)
                .cloned()
                .unwrap_or_else(|| "initial".to_string())
        };

        for (num, insn) in self.instructions().iter().enumerate() {
            for dep in insn.dependencies() {
                lines.push(format!("{} -> node{num} [label=\"{}\"];", origin(&dep), escape(&dep)));
            }
        }
        for expr in self.result() {
            let from = match expr {
                Expr::Variable(name) => origin(name),
                _ => "initial".to_string(),
            };
            lines.push(format!(
                "{from} -> result [label=\"{}\"];",
                escape(&expr.to_string())
            ));
        }

        let mut out = String::from("digraph dataflow {\n");
        for line in lines {
            let _ = writeln!(out, "{line}");
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::OperatorCompiler;
    use crate::optemplate::Expr;

    #[test]
    fn test_dot_graph() {
        let expr = Expr::inverse_mass(Expr::var("u")) + Expr::var("u");
        let code = OperatorCompiler::default().compile(&expr).unwrap();
        let dot = code.dot_dataflow_graph(super::DEFAULT_MAX_LABEL_LENGTH);
        assert!(dot.starts_with("digraph dataflow {"));
        assert!(dot.contains("node0 [ label=\"p0: _expr0 <- InvMass * u\" shape=box ];"));
        assert!(dot.contains("initial -> node0 [label=\"u\"];"));
        assert!(dot.contains("node0 -> node1 [label=\"_expr0\"];"));
        assert!(dot.contains("node1 -> result [label=\"_expr1\"];"));
    }
}
