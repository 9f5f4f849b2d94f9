//! Execution of compiled code.
//!
//! - [`Executor`]: dependency-driven scheduler with futures and priorities
//! - [`ExecutionMapper`]: per-instruction-kind dispatch
//! - [`GpuExecutionMapper`]: dispatch onto a discretization's kernels
//! - [`VectorProgram`]: fused element-wise expressions

mod eval;
mod exchange;
mod gpu_mapper;
mod mapper;
mod scheduler;
mod stats;
mod value;
mod vector_expr;

pub use eval::{combine, evaluate};
pub use exchange::{LoopbackExchange, NeighborExchange};
pub use gpu_mapper::GpuExecutionMapper;
pub use mapper::{ExecutionMapper, Output, Outputs};
pub use scheduler::{execute, ExecutionTrace, Executor, TieBreak, TraceEvent};
pub use stats::{ExecutionStats, KindStats};
pub use value::{Bindings, DeviceVector, Value};
pub use vector_expr::VectorProgram;
