//! Problem- and device-derived constants shared by every plan.
//!
//! Built in two phases: [`PlanGivenData::new`] uses device and element
//! metadata only; [`PlanGivenData::post_decomposition`] adds the block
//! count and microblocks per block once the mesh has been partitioned.
//! Block-dependent accessors fail until the second phase has run.

use crate::config::ScalarType;
use crate::device::DeviceData;
use crate::error::PlanError;
use crate::local::LocalDiscretization;

/// Elements per microblock and the aligned storage they occupy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MicroblockInfo {
    pub elements: usize,
    pub aligned_floats: usize,
}

/// Construction options for [`PlanGivenData`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GivenOptions {
    pub allow_microblocking: bool,
    pub scalar_type: ScalarType,
    /// Face node count of the finest face quadrature (None = nodal faces).
    pub max_face_dofs: Option<usize>,
}

impl Default for GivenOptions {
    fn default() -> Self {
        Self {
            allow_microblocking: true,
            scalar_type: ScalarType::F64,
            max_face_dofs: None,
        }
    }
}

/// Largest tolerated padding fraction inside a microblock.
const MAX_MICROBLOCK_OVERHEAD: f64 = 0.05;

#[derive(Clone, Debug, PartialEq)]
pub struct PlanGivenData {
    pub devdata: DeviceData,
    pub microblock: MicroblockInfo,
    dofs_per_el: usize,
    dofs_per_face: usize,
    faces_per_el: usize,
    max_face_dofs: usize,
    scalar_type: ScalarType,
    decomposition: Option<(usize, usize)>,
}

impl PlanGivenData {
    pub fn new(devdata: DeviceData, ldis: &LocalDiscretization, options: GivenOptions) -> Self {
        let dofs_per_el = ldis.node_count();
        let float_size = options.scalar_type.size();
        let microblock = if options.allow_microblocking {
            find_microblock_size(&devdata, dofs_per_el, float_size)
        } else {
            MicroblockInfo {
                elements: 1,
                aligned_floats: devdata.align_words(dofs_per_el, float_size),
            }
        };

        Self {
            microblock,
            dofs_per_el,
            dofs_per_face: ldis.face_node_count(),
            faces_per_el: ldis.face_count(),
            max_face_dofs: options.max_face_dofs.unwrap_or(ldis.face_node_count()),
            scalar_type: options.scalar_type,
            decomposition: None,
            devdata,
        }
    }

    pub fn dofs_per_el(&self) -> usize {
        self.dofs_per_el
    }

    pub fn dofs_per_face(&self) -> usize {
        self.dofs_per_face
    }

    pub fn faces_per_el(&self) -> usize {
        self.faces_per_el
    }

    pub fn face_dofs_per_el(&self) -> usize {
        self.faces_per_el * self.dofs_per_face
    }

    pub fn max_face_dofs(&self) -> usize {
        self.max_face_dofs
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.scalar_type
    }

    /// Bytes per scalar.
    pub fn float_size(&self) -> usize {
        self.scalar_type.size()
    }

    /// Aligned face storage of one microblock, in floats.
    pub fn aligned_face_dofs_per_microblock(&self) -> usize {
        self.devdata.align_words(
            self.microblock.elements * self.face_dofs_per_el(),
            self.float_size(),
        )
    }

    /// Inject the decomposition. Repeating the call with the same values is
    /// a no-op; different values are an error.
    pub fn post_decomposition(
        &mut self,
        block_count: usize,
        microblocks_per_block: usize,
    ) -> Result<(), PlanError> {
        match self.decomposition {
            None => {
                self.decomposition = Some((block_count, microblocks_per_block));
                Ok(())
            }
            Some(existing) if existing == (block_count, microblocks_per_block) => Ok(()),
            Some((existing_blocks, existing_mbs)) => Err(PlanError::AlreadyDecomposed {
                existing_blocks,
                existing_mbs,
                blocks: block_count,
                mbs: microblocks_per_block,
            }),
        }
    }

    pub fn is_decomposed(&self) -> bool {
        self.decomposition.is_some()
    }

    pub fn block_count(&self) -> Result<usize, PlanError> {
        self.decomposition
            .map(|(blocks, _)| blocks)
            .ok_or(PlanError::NotDecomposed("block_count"))
    }

    pub fn microblocks_per_block(&self) -> Result<usize, PlanError> {
        self.decomposition
            .map(|(_, mbs)| mbs)
            .ok_or(PlanError::NotDecomposed("microblocks_per_block"))
    }

    /// Aligned volume storage of one block, in floats.
    pub fn input_dofs_per_block(&self) -> Result<usize, PlanError> {
        Ok(self.microblocks_per_block()? * self.microblock.aligned_floats)
    }
}

/// Pick the smallest microblock whose alignment padding stays within
/// `MAX_MICROBLOCK_OVERHEAD`.
fn find_microblock_size(devdata: &DeviceData, dofs_per_el: usize, float_size: usize) -> MicroblockInfo {
    let align = devdata.alignment_words(float_size);
    for chunks in 1..=256 {
        let elements = chunks * align / dofs_per_el;
        if elements == 0 {
            continue;
        }
        let floats = elements * dofs_per_el;
        let aligned_floats = devdata.align_words(floats, float_size);
        let overhead = (aligned_floats - floats) as f64 / aligned_floats as f64;
        if overhead <= MAX_MICROBLOCK_OVERHEAD {
            return MicroblockInfo {
                elements,
                aligned_floats,
            };
        }
    }

    let elements = (align / dofs_per_el).max(1);
    MicroblockInfo {
        elements,
        aligned_floats: devdata.align_words(elements * dofs_per_el, float_size),
    }
}
