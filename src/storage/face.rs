//! Per-face storage records.
//!
//! Every element face gets an interior record. Its `opposite` is the
//! interior record of the neighboring element face, or a boundary record
//! describing where the face's boundary values live.

use crate::error::ConsistencyError;
use crate::mesh::{BoundaryTag, ElementFace};
use crate::types::{BlockIndex, FaceStorageId, IndexListId};

/// Storage of one element face.
#[derive(Clone, Debug, PartialEq)]
pub struct InteriorFaceStorage {
    pub id: FaceStorageId,
    pub el_face: ElementFace,
    pub native_block: BlockIndex,
    /// Volume node indices of the face in native order.
    pub native_index_list_id: IndexListId,
    /// Volume node indices read for this side of the flux.
    pub global_int_flux_index_list_id: IndexListId,
    /// Volume node indices read on the opposite element, in this side's
    /// order. Identity for boundary faces.
    pub global_ext_flux_index_list_id: IndexListId,
    /// Write map into the opposite face's native order (interior pairs only).
    pub ext_write_index_list_id: Option<IndexListId>,
    opposite: Option<FaceStorageId>,
}

/// Storage of boundary values across one boundary face.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundaryFaceStorage {
    pub id: FaceStorageId,
    pub tag: BoundaryTag,
    /// Start of this face in unaligned (host) boundary storage.
    pub cpu_bdry_index: usize,
    /// Start of this face in aligned (device) boundary storage.
    pub gpu_bdry_index: usize,
    opposite: Option<FaceStorageId>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FaceStorage {
    Interior(InteriorFaceStorage),
    Boundary(BoundaryFaceStorage),
}

impl InteriorFaceStorage {
    pub fn new(
        id: FaceStorageId,
        el_face: ElementFace,
        native_block: BlockIndex,
        native_index_list_id: IndexListId,
    ) -> Self {
        Self {
            id,
            el_face,
            native_block,
            native_index_list_id,
            global_int_flux_index_list_id: native_index_list_id,
            global_ext_flux_index_list_id: IndexListId::ZERO,
            ext_write_index_list_id: None,
            opposite: None,
        }
    }
}

impl BoundaryFaceStorage {
    pub fn new(id: FaceStorageId, tag: BoundaryTag, cpu_bdry_index: usize, gpu_bdry_index: usize) -> Self {
        Self {
            id,
            tag,
            cpu_bdry_index,
            gpu_bdry_index,
            opposite: None,
        }
    }
}

impl FaceStorage {
    pub fn id(&self) -> FaceStorageId {
        match self {
            FaceStorage::Interior(f) => f.id,
            FaceStorage::Boundary(f) => f.id,
        }
    }

    pub fn opposite(&self) -> Option<FaceStorageId> {
        match self {
            FaceStorage::Interior(f) => f.opposite,
            FaceStorage::Boundary(f) => f.opposite,
        }
    }

    /// Link to `opposite`. Setting the same opposite again is a no-op;
    /// relinking to a different record is an error.
    pub fn set_opposite(&mut self, opposite: FaceStorageId) -> Result<(), ConsistencyError> {
        let face = self.id();
        let slot = match self {
            FaceStorage::Interior(f) => &mut f.opposite,
            FaceStorage::Boundary(f) => &mut f.opposite,
        };
        match *slot {
            None => {
                *slot = Some(opposite);
                Ok(())
            }
            Some(existing) if existing == opposite => Ok(()),
            Some(existing) => Err(ConsistencyError::OppositeRelinked {
                face,
                existing,
                requested: opposite,
            }),
        }
    }

    pub fn as_interior(&self) -> Option<&InteriorFaceStorage> {
        match self {
            FaceStorage::Interior(f) => Some(f),
            FaceStorage::Boundary(_) => None,
        }
    }

    pub fn as_boundary(&self) -> Option<&BoundaryFaceStorage> {
        match self {
            FaceStorage::Interior(_) => None,
            FaceStorage::Boundary(f) => Some(f),
        }
    }
}
