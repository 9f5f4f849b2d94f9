//! Dataflow compiler: operator templates to instruction lists.
//!
//! ```
//! use dg_gpu::compiler::OperatorCompiler;
//! use dg_gpu::optemplate::Expr;
//!
//! let expr = Expr::diff(0, Expr::var("u")) * Expr::constant(2.0);
//! let code = OperatorCompiler::default().compile(&expr).unwrap();
//! assert_eq!(code.len(), 2);
//! assert_eq!(code.initial_exec_front().len(), 1);
//! ```

mod code;
mod dot;
mod instruction;
mod operator_compiler;

pub use code::Code;
pub use dot::DEFAULT_MAX_LABEL_LENGTH;
pub use instruction::{
    Assign, DiffBatchAssign, FluxBatchAssign, FluxReceiveBatchAssign, Instruction, MassAssign,
    VectorExprAssign,
};
pub use operator_compiler::{
    batch_fluxes, flux_records, CompilerOptions, FluxBatch, FluxRecord, OperatorCompiler,
};
