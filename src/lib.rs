//! # dg-gpu
//!
//! Execution planning and dataflow scheduling for nodal discontinuous
//! Galerkin operators on GPU-style hardware.
//!
//! This crate provides the pieces between a mesh plus an operator template
//! and a stream of kernel launches:
//! - Mesh partitioning into thread-block sized element clusters
//! - Kernel plan search against device limits (flux gather, diff, mass)
//! - Block and face storage layout with host/device index maps
//! - A dataflow compiler from operator templates to instruction lists
//! - A priority scheduler that overlaps asynchronous work with compute
//! - Kernel backends (reference CPU, optional Burn tensors)
//!
//! ```
//! use dg_gpu::config::DiscretizationConfig;
//! use dg_gpu::device::DeviceData;
//! use dg_gpu::local::LocalDiscretization;
//! use dg_gpu::mesh::Mesh1D;
//! use dg_gpu::optemplate::Expr;
//! use dg_gpu::{Bindings, Discretization};
//!
//! let discr = Discretization::new(
//!     Mesh1D::uniform(0.0, 1.0, 4).unwrap(),
//!     LocalDiscretization::line(2),
//!     DeviceData::reference(),
//!     DiscretizationConfig::default(),
//! )
//! .unwrap();
//! let u = discr.convert_volume(&vec![1.0; discr.host_dof_count()]).unwrap();
//! let mut bindings = Bindings::new();
//! bindings.insert("u".into(), u);
//! let out = discr
//!     .run(&(Expr::constant(2.0) * Expr::var("u")), bindings)
//!     .unwrap();
//! assert_eq!(discr.volume_to_host(&out[0]).unwrap(), vec![2.0; 12]);
//! ```

pub mod compiler;
pub mod config;
pub mod device;
pub mod discretization;
pub mod error;
pub mod exec;
pub mod kernels;
pub mod local;
pub mod mesh;
pub mod optemplate;
pub mod partition;
pub mod plan;
pub mod storage;
pub mod types;

pub use error::{Error, Result};

pub use compiler::{Code, OperatorCompiler};
pub use config::{DebugFlag, DiscretizationConfig, ScalarType};
pub use device::{DeviceData, DeviceFuture};
pub use discretization::Discretization;
pub use exec::{Bindings, ExecutionMapper, Executor, GpuExecutionMapper, Value};
pub use kernels::{KernelBackend, ReferenceBackend};
pub use local::LocalDiscretization;
pub use mesh::{BoundarySelector, BoundaryTag, DgMesh, Mesh1D, Mesh2D};
pub use optemplate::Expr;
pub use partition::{partition_greedy, PartitionData};
pub use plan::PlanGivenData;
pub use storage::{FaceStorageInfo, GpuBlock};
