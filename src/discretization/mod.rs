//! The discretization context.
//!
//! [`Discretization::new`] runs the whole construction pipeline once:
//! mesh validation, flux plan search, partitioning, decomposition, block
//! and face storage construction, local plan search and device layout.
//! Afterwards the context owns everything an execution needs and hands
//! out compiled [`Code`] (memoized per template) and field conversions.
//!
//! ```
//! use dg_gpu::config::DiscretizationConfig;
//! use dg_gpu::device::DeviceData;
//! use dg_gpu::discretization::Discretization;
//! use dg_gpu::local::LocalDiscretization;
//! use dg_gpu::mesh::Mesh1D;
//! use dg_gpu::optemplate::Expr;
//!
//! let mesh = Mesh1D::uniform(0.0, 1.0, 8).unwrap();
//! let discr = Discretization::new(
//!     mesh,
//!     LocalDiscretization::line(2),
//!     DeviceData::reference(),
//!     DiscretizationConfig::default(),
//! )
//! .unwrap();
//!
//! let u = discr.convert_volume(&vec![1.0; discr.host_dof_count()]).unwrap();
//! let code = discr.compile(&(Expr::constant(2.0) * Expr::var("u"))).unwrap();
//! let result = discr.execute(&code, [("u".to_string(), u)].into()).unwrap();
//! let host = discr.volume_to_host(&result[0]).unwrap();
//! assert!(host.iter().all(|&v| v == 2.0));
//! ```

mod convert;

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::compiler::{Code, CompilerOptions, OperatorCompiler};
use crate::config::{DebugFlag, DiscretizationConfig, ScalarType};
use crate::device::{DeviceData, MemoryPool, PoolKind, StreamPool};
use crate::error::{CompileError, ConfigError, Result};
use crate::exec::{Bindings, GpuExecutionMapper, Value};
use crate::kernels::diff::DiffOperators;
use crate::kernels::element_local::MassOperators;
use crate::kernels::flux::FluxOperators;
use crate::kernels::ElementGeometry;
use crate::local::LocalDiscretization;
use crate::mesh::{BoundarySelector, DgMesh};
use crate::optemplate::Expr;
use crate::partition::PartitionData;
use crate::plan::{
    make_diff_plan, make_element_local_plan, make_flux_plan, DiffPlan, ElementLocalPlan,
    FluxGatherPlan, FluxPlanKey, GivenOptions, MicroblockInfo, PlanCache, PlanGivenData,
};
use crate::storage::{build_blocks, build_face_storage_info, FaceStorageInfo, GpuBlock, VolumeLayout};
use crate::types::ElementIndex;

/// Flux plans also depend on the device, the layout scalar and the element
/// shape constants, so the process-wide memo is keyed by all of them.
type FluxCacheKey = (DeviceData, ScalarType, MicroblockInfo, usize, usize, FluxPlanKey);

fn flux_plan_cache() -> &'static PlanCache<FluxCacheKey, FluxGatherPlan> {
    static CACHE: OnceLock<PlanCache<FluxCacheKey, FluxGatherPlan>> = OnceLock::new();
    CACHE.get_or_init(PlanCache::new)
}

/// Kernel plans chosen for this discretization.
#[derive(Clone, Debug)]
pub struct Plans {
    pub flux: FluxGatherPlan,
    pub diff: DiffPlan,
    pub mass: ElementLocalPlan,
    pub lift: ElementLocalPlan,
}

/// Local operators in the forms the kernels consume.
#[derive(Clone, Debug)]
pub(crate) struct Operators {
    pub diff: DiffOperators,
    pub mass: MassOperators,
    pub flux: FluxOperators,
}

/// A mesh discretized onto the (simulated) device.
#[derive(Debug)]
pub struct Discretization {
    config: DiscretizationConfig,
    mesh: Arc<dyn DgMesh>,
    ldis: LocalDiscretization,
    given: PlanGivenData,
    plans: Plans,
    partition: PartitionData,
    blocks: Vec<GpuBlock>,
    face_storage: FaceStorageInfo,
    layout: VolumeLayout,
    volume_embedding: Vec<usize>,
    el_offsets: Vec<usize>,
    geometry: ElementGeometry,
    operators: Operators,
    device_pool: Arc<MemoryPool>,
    pagelocked_pool: Arc<MemoryPool>,
    streams: Arc<StreamPool>,
    partitions: Mutex<IndexMap<usize, PartitionData>>,
    compiled: Mutex<IndexMap<Expr, Arc<Code>>>,
    boundary_embeddings: Mutex<IndexMap<BoundarySelector, Arc<Vec<usize>>>>,
    boundarize_maps: Mutex<IndexMap<BoundarySelector, Arc<(Vec<usize>, Vec<usize>)>>>,
}

fn check_compatible(mesh: &dyn DgMesh, ldis: &LocalDiscretization, config: &DiscretizationConfig) -> Result<()> {
    mesh.validate()?;
    if mesh.dimensions() != ldis.dimensions() {
        return Err(ConfigError::InvalidMesh(format!(
            "{}D mesh with {}D elements",
            mesh.dimensions(),
            ldis.dimensions()
        ))
        .into());
    }
    if mesh.faces_per_element() != ldis.face_count() {
        return Err(ConfigError::InvalidMesh(format!(
            "mesh elements have {} faces, local discretization {}",
            mesh.faces_per_element(),
            ldis.face_count()
        ))
        .into());
    }
    if let (Some(tag), ScalarType::F32) = (ldis.quadrature_tag(), config.scalar_type) {
        return Err(ConfigError::Unsupported(format!(
            "face quadrature '{tag}' requires F64 layout"
        ))
        .into());
    }
    Ok(())
}

fn cached_partition(
    cache: &Mutex<IndexMap<usize, PartitionData>>,
    mesh: &dyn DgMesh,
    max_block_size: usize,
) -> std::result::Result<PartitionData, ConfigError> {
    if let Some(data) = cache.lock().get(&max_block_size) {
        return Ok(data.clone());
    }
    let data = PartitionData::compute(mesh, max_block_size)?;
    cache.lock().insert(max_block_size, data.clone());
    Ok(data)
}

impl Discretization {
    /// Build the discretization of `mesh` for `devdata`.
    pub fn new(
        mesh: impl DgMesh + 'static,
        ldis: LocalDiscretization,
        devdata: DeviceData,
        config: DiscretizationConfig,
    ) -> Result<Self> {
        let mesh: Arc<dyn DgMesh> = Arc::new(mesh);
        check_compatible(mesh.as_ref(), &ldis, &config)?;
        let plan_log = config.has_debug(DebugFlag::PlanLog);

        let options = GivenOptions {
            allow_microblocking: !config.has_debug(DebugFlag::NoMicroblock),
            scalar_type: config.scalar_type,
            max_face_dofs: None,
        };
        let mut given = PlanGivenData::new(devdata.clone(), &ldis, options);
        debug!(
            dofs_per_el = given.dofs_per_el(),
            mb_elements = given.microblock.elements,
            mb_aligned_floats = given.microblock.aligned_floats,
            "plan constants"
        );

        let flux_count = match &config.tune_for {
            Some(template) => OperatorCompiler::first_flux_batch(template)?
                .map_or(1, |batch| batch.fluxes.len()),
            None => 1,
        };
        let key = FluxPlanKey {
            max_face_dofs: given.max_face_dofs(),
            quadrature_tag: ldis.quadrature_tag(),
            tune_for: config.tune_for.clone(),
            given_mbs_per_block: None,
        };
        let cache_key = (
            devdata,
            config.scalar_type,
            given.microblock,
            given.dofs_per_el(),
            given.faces_per_el(),
            key,
        );
        let flux_plan = flux_plan_cache().get_or_try_insert_with(&cache_key, || {
            make_flux_plan(&given, flux_count, None, plan_log)
        })?;
        debug!(plan = %flux_plan, flux_count, "flux plan");

        let partitions = Mutex::new(IndexMap::new());
        let partition = cached_partition(&partitions, mesh.as_ref(), flux_plan.elements_per_block())?;
        given.post_decomposition(partition.partition.block_count(), flux_plan.microblocks_per_block())?;
        debug!(
            blocks = partition.partition.block_count(),
            mbs_per_block = flux_plan.microblocks_per_block(),
            "posted decomposition"
        );

        let blocks = build_blocks(&partition.partition, &given)?;
        let face_storage = build_face_storage_info(
            mesh.as_ref(),
            &ldis,
            &partition.partition,
            &given,
            config.has_debug(DebugFlag::VerifyIndexLists),
        )?;

        let diff = make_diff_plan(&given, ldis.dimensions(), plan_log)?;
        let mass = make_element_local_plan(&given, ldis.node_count(), plan_log)?;
        let lift = make_element_local_plan(&given, ldis.face_count() * ldis.face_node_count(), plan_log)?;
        debug!(diff = %diff, mass = %mass, lift = %lift, "local plans");

        let layout = VolumeLayout::new(&blocks, mesh.n_elements(), &given, diff.dofs_per_macroblock())?;
        let volume_embedding = layout.volume_embedding()?;
        let el_offsets = ElementIndex::iter(mesh.n_elements())
            .map(|el| layout.find_el_gpu_index(el))
            .collect();

        let memory_log = config.has_debug(DebugFlag::MemoryLog);
        let device_capacity = config
            .device_pool_bytes
            .unwrap_or(given.devdata.total_memory_bytes);
        let device_pool =
            Arc::new(MemoryPool::new(PoolKind::Device, Some(device_capacity)).with_logging(memory_log));
        let pagelocked_pool = Arc::new(
            MemoryPool::new(PoolKind::PageLocked, config.pagelocked_pool_bytes).with_logging(memory_log),
        );
        let streams = Arc::new(StreamPool::with_streams(config.initial_streams)?);

        info!(
            elements = mesh.n_elements(),
            blocks = blocks.len(),
            gpu_dofs = layout.gpu_dof_count(),
            host_dofs = layout.host_dof_count(),
            boundary_dofs = face_storage.aligned_boundary_dof_count,
            face_records = face_storage.records.len(),
            index_lists = face_storage.index_lists.len(),
            "discretization ready"
        );

        Ok(Self {
            geometry: ElementGeometry::from_mesh(mesh.as_ref()),
            operators: Operators {
                diff: DiffOperators::new(&ldis),
                mass: MassOperators::new(&ldis),
                flux: FluxOperators::new(&ldis),
            },
            plans: Plans {
                flux: flux_plan,
                diff,
                mass,
                lift,
            },
            config,
            mesh,
            ldis,
            given,
            partition,
            blocks,
            face_storage,
            layout,
            volume_embedding,
            el_offsets,
            device_pool,
            pagelocked_pool,
            streams,
            partitions,
            compiled: Mutex::new(IndexMap::new()),
            boundary_embeddings: Mutex::new(IndexMap::new()),
            boundarize_maps: Mutex::new(IndexMap::new()),
        })
    }

    pub fn config(&self) -> &DiscretizationConfig {
        &self.config
    }

    pub fn mesh(&self) -> &dyn DgMesh {
        self.mesh.as_ref()
    }

    pub fn local_discretization(&self) -> &LocalDiscretization {
        &self.ldis
    }

    pub fn given(&self) -> &PlanGivenData {
        &self.given
    }

    pub fn plans(&self) -> &Plans {
        &self.plans
    }

    /// The partition the device layout was built from.
    pub fn partition(&self) -> &PartitionData {
        &self.partition
    }

    /// Partition statistics for another block size, memoized.
    pub fn partition_data(&self, max_block_size: usize) -> std::result::Result<PartitionData, ConfigError> {
        cached_partition(&self.partitions, self.mesh.as_ref(), max_block_size)
    }

    pub fn blocks(&self) -> &[GpuBlock] {
        &self.blocks
    }

    pub fn face_storage(&self) -> &FaceStorageInfo {
        &self.face_storage
    }

    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    pub fn geometry(&self) -> &ElementGeometry {
        &self.geometry
    }

    /// Device index of each element's first dof.
    pub fn element_offsets(&self) -> &[usize] {
        &self.el_offsets
    }

    pub(crate) fn operators(&self) -> &Operators {
        &self.operators
    }

    pub fn device_pool(&self) -> &Arc<MemoryPool> {
        &self.device_pool
    }

    pub fn pagelocked_pool(&self) -> &Arc<MemoryPool> {
        &self.pagelocked_pool
    }

    pub fn streams(&self) -> &Arc<StreamPool> {
        &self.streams
    }

    pub fn host_dof_count(&self) -> usize {
        self.layout.host_dof_count()
    }

    pub fn gpu_dof_count(&self) -> usize {
        self.layout.gpu_dof_count()
    }

    /// Length of a device boundary vector.
    pub fn aligned_boundary_dof_count(&self) -> usize {
        self.face_storage.aligned_boundary_dof_count
    }

    /// Compile `template`, reusing earlier results for equal templates.
    pub fn compile(&self, template: &Expr) -> std::result::Result<Arc<Code>, CompileError> {
        let mut compiled = self.compiled.lock();
        if let Some(code) = compiled.get(template) {
            return Ok(Arc::clone(code));
        }
        let options = CompilerOptions::default().with_vectorize(self.config.vectorize);
        let code = Arc::new(OperatorCompiler::new(options).compile(template)?);
        compiled.insert(template.clone(), Arc::clone(&code));
        Ok(code)
    }

    /// Number of memoized compiled templates.
    pub fn compiled_count(&self) -> usize {
        self.compiled.lock().len()
    }

    /// An execution mapper with the reference kernels and loopback exchange.
    pub fn mapper(&self) -> GpuExecutionMapper<'_> {
        GpuExecutionMapper::new(self)
    }

    pub fn execute(&self, code: &Code, bindings: Bindings) -> Result<Vec<Value>> {
        let mut mapper = self.mapper();
        code.execute(&mut mapper, bindings)
    }

    /// Compile (memoized) and execute `template`.
    pub fn run(&self, template: &Expr, bindings: Bindings) -> Result<Vec<Value>> {
        let code = self.compile(template)?;
        self.execute(&code, bindings)
    }
}
