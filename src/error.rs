//! Error types for planning, compilation and execution.
//!
//! Failures are structured (kind + context) and never rendered here. The
//! surrounding application decides how to present them.

use thiserror::Error;

use crate::types::{ElementIndex, FaceStorageId, IndexListId};

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure surfaced by this crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Invalid construction-time configuration. Never recovered.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Mesh does not satisfy the connectivity contract.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    /// Block size of zero requested from the partitioner.
    #[error("max block size must be at least 1")]
    ZeroBlockSize,

    /// Scalar type and quadrature combination the device cannot run.
    #[error("unsupported combination: {0}")]
    Unsupported(String),

    /// No candidate plan fits within the device limits.
    #[error("no valid {kind} plan: {reason}")]
    NoValidPlan { kind: &'static str, reason: String },

    /// Unknown debug flag name.
    #[error("unknown debug flag: {0}")]
    UnknownDebugFlag(String),
}

/// Ordering violations in the two-phase plan construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Block layout requested before `post_decomposition`.
    #[error("plan queried for {0} before post_decomposition")]
    NotDecomposed(&'static str),

    /// `post_decomposition` called again with different values.
    #[error(
        "plan already decomposed into {existing_blocks} blocks x {existing_mbs} microblocks, \
         got {blocks} x {mbs}"
    )]
    AlreadyDecomposed {
        existing_blocks: usize,
        existing_mbs: usize,
        blocks: usize,
        mbs: usize,
    },

    /// Decomposition posted for a different partition than the one laid out.
    #[error("plan decomposed into {decomposed} blocks, partition has {partition}")]
    BlockCountMismatch { decomposed: usize, partition: usize },

    /// A block holds more microblocks than the plan allows.
    #[error("block {block} needs {needed} microblocks, plan allows {allowed}")]
    BlockOverflow {
        block: usize,
        needed: usize,
        allowed: usize,
    },
}

/// Fatal compilation failures. No partial code is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Cyclic dependency between fluxes.
    #[error("cannot resolve flux evaluation order: {remaining} fluxes left unbatched")]
    UnresolvableFluxOrder { remaining: usize },

    /// A flux was reached during code generation that no batch contains.
    #[error("flux '{0}' not in any flux batch")]
    FluxNotBatched(String),

    /// A bound operator was reached without its batch having been collected.
    #[error("operator binding '{0}' was not collected")]
    UncollectedBinding(String),

    /// Expression cannot be fused into an element-wise vector program.
    #[error("not an element-wise expression: {0}")]
    NotElementwise(String),
}

/// Modeling bugs. Always fatal, even in release builds.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsistencyError {
    /// Face opposite set twice to different records.
    #[error("face {face} already linked to {existing}, refusing to relink to {requested}")]
    OppositeRelinked {
        face: FaceStorageId,
        existing: FaceStorageId,
        requested: FaceStorageId,
    },

    /// Two storage records were created for the same element face.
    #[error("duplicate face storage for element {element} face {face}")]
    DuplicateFace { element: ElementIndex, face: usize },

    /// No storage record exists for an element face.
    #[error("no face storage for element {element} face {face}")]
    UnknownFace { element: ElementIndex, face: usize },

    /// A face record ended up without an opposite.
    #[error("face {0} has no opposite")]
    MissingOpposite(FaceStorageId),

    /// Recomputed index list differs from the registered one.
    #[error("index list {id} changed on recomputation")]
    IndexListMismatch { id: IndexListId },

    /// A write map does not describe a permutation.
    #[error("write map is not a permutation: {0}")]
    InvalidWriteMap(String),

    /// NaN found in a computed field (debug scan).
    #[error("NaN detected in '{name}' at index {index}")]
    NanDetected { name: String, index: usize },

    /// Layout produced an index outside its vector.
    #[error("{what}: index {index} exceeds size {size}")]
    LayoutOverflow {
        what: &'static str,
        index: usize,
        size: usize,
    },
}

/// Resource failures. Propagated to the caller, not retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Memory pool cannot satisfy the allocation.
    #[error("{pool} pool exhausted: requested {requested} bytes, {available} available")]
    PoolExhausted {
        pool: &'static str,
        requested: usize,
        available: usize,
    },

    /// A stream worker died or disconnected.
    #[error("stream failure: {0}")]
    Stream(String),
}

/// Failures while running compiled code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    /// Expression read a variable that was never bound.
    #[error("unbound variable '{0}'")]
    UnboundVariable(String),

    /// Operand kinds cannot be combined.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Vector lengths disagree.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Instructions remained blocked although nothing was pending.
    #[error("{0} instructions never became ready")]
    Stalled(usize),

    /// Asynchronous operation failed.
    #[error("future failed: {0}")]
    FutureFailed(String),

    /// A kernel backend failed while running or reading back a kernel.
    #[error("{backend} kernel failed: {reason}")]
    KernelFailed { backend: &'static str, reason: String },

    /// Operation has no implementation for the given arguments.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl ExecError {
    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    pub fn kernel_failed(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::KernelFailed {
            backend,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_failure_keeps_backend() {
        let err: Error = ExecError::kernel_failed("burn", "tensor readback: shape").into();
        assert!(matches!(
            err,
            Error::Exec(ExecError::KernelFailed { backend: "burn", .. })
        ));
        assert_eq!(err.to_string(), "burn kernel failed: tensor readback: shape");
    }
}
