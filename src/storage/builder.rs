//! Face storage construction.
//!
//! Walks all interior face pairs, then all boundary faces, creating one
//! record per element face and registering the index lists the flux
//! kernels read through.
//!
//! For an interior pair with int side face `f1` and ext side face `f2`:
//! - face 1 reads its own nodes natively and the ext nodes matched to its
//!   order; its write map scatters matched values into `f2`'s native order
//! - face 2 mirrors this with the roles swapped
//!
//! Boundary faces read their own nodes natively and the boundary vector
//! through the identity list; each gets an aligned slot in device
//! boundary storage.

use indexmap::IndexMap;
use tracing::debug;

use super::face::{BoundaryFaceStorage, FaceStorage, InteriorFaceStorage};
use super::index_list::{write_to_map, IndexListKey, IndexListRegistry};
use crate::error::{self, ConsistencyError, PlanError};
use crate::local::LocalDiscretization;
use crate::mesh::{BoundarySelector, DgMesh, ElementFace};
use crate::partition::Partition;
use crate::plan::PlanGivenData;
use crate::types::{FaceStorageId, IndexListId};

/// Face records, index lists and boundary storage sizes.
#[derive(Clone, Debug)]
pub struct FaceStorageInfo {
    /// Interior record of every element face.
    pub map: IndexMap<ElementFace, FaceStorageId>,
    pub records: Vec<FaceStorage>,
    pub index_lists: Vec<Vec<usize>>,
    /// Interior records grouped by native block.
    pub block_faces: Vec<Vec<FaceStorageId>>,
    pub face_node_count: usize,
    pub aligned_boundary_dofs_per_face: usize,
    pub aligned_boundary_dof_count: usize,
}

impl FaceStorageInfo {
    pub fn record(&self, id: FaceStorageId) -> &FaceStorage {
        &self.records[id]
    }

    /// Interior record of an element face.
    pub fn get(&self, el_face: ElementFace) -> Option<&InteriorFaceStorage> {
        self.map
            .get(&el_face)
            .and_then(|&id| self.records[id].as_interior())
    }

    /// The record linked to `id`.
    pub fn opposite(&self, id: FaceStorageId) -> Result<&FaceStorage, ConsistencyError> {
        self.records[id]
            .opposite()
            .map(|opp| &self.records[opp])
            .ok_or(ConsistencyError::MissingOpposite(id))
    }

    pub fn index_list(&self, id: IndexListId) -> &[usize] {
        &self.index_lists[id]
    }

    /// Interior records in creation order.
    pub fn interior_faces(&self) -> impl Iterator<Item = &InteriorFaceStorage> {
        self.records.iter().filter_map(FaceStorage::as_interior)
    }

    pub fn boundary_face_count(&self) -> usize {
        self.records.iter().filter(|r| r.as_boundary().is_some()).count()
    }
}

struct Builder<'a> {
    ldis: &'a LocalDiscretization,
    partition: &'a Partition,
    map: IndexMap<ElementFace, FaceStorageId>,
    records: Vec<FaceStorage>,
    registry: IndexListRegistry,
}

impl Builder<'_> {
    fn next_id(&self) -> FaceStorageId {
        FaceStorageId::new(self.records.len())
    }

    fn native_list(&mut self, face: usize) -> Result<IndexListId, ConsistencyError> {
        let ldis = self.ldis;
        self.registry
            .register(Some(IndexListKey::Native { face }), || ldis.face_indices(face).to_vec())
    }

    /// Volume nodes of `face` in the order of the face it is matched with.
    fn matched_list(&mut self, face: usize, reversed: bool) -> Result<IndexListId, ConsistencyError> {
        let list = matched_indices(self.ldis, face, reversed);
        self.registry
            .register(Some(IndexListKey::Matched { face, reversed }), || list)
    }

    fn ext_write_list(&mut self, face: usize, reversed: bool) -> Result<IndexListId, ConsistencyError> {
        let wmap = write_to_map(
            &matched_indices(self.ldis, face, reversed),
            self.ldis.face_indices(face),
        )?;
        self.registry
            .register(Some(IndexListKey::ExtWrite { face, reversed }), || wmap)
    }

    fn make_int_face(&mut self, el_face: ElementFace) -> Result<FaceStorageId, ConsistencyError> {
        if self.map.contains_key(&el_face) {
            return Err(ConsistencyError::DuplicateFace {
                element: el_face.element,
                face: el_face.face,
            });
        }
        let id = self.next_id();
        let native = self.native_list(el_face.face)?;
        let block = self.partition.block_of(el_face.element);
        self.records.push(FaceStorage::Interior(InteriorFaceStorage::new(
            id, el_face, block, native,
        )));
        self.map.insert(el_face, id);
        Ok(id)
    }

    fn link(&mut self, a: FaceStorageId, b: FaceStorageId) -> Result<(), ConsistencyError> {
        self.records[a].set_opposite(b)?;
        self.records[b].set_opposite(a)
    }

    fn set_lists(
        &mut self,
        id: FaceStorageId,
        global_int: IndexListId,
        global_ext: IndexListId,
        ext_write: Option<IndexListId>,
    ) {
        if let FaceStorage::Interior(f) = &mut self.records[id] {
            f.global_int_flux_index_list_id = global_int;
            f.global_ext_flux_index_list_id = global_ext;
            f.ext_write_index_list_id = ext_write;
        }
    }
}

fn matched_indices(ldis: &LocalDiscretization, face: usize, reversed: bool) -> Vec<usize> {
    let native = ldis.face_indices(face);
    if reversed {
        native.iter().rev().copied().collect()
    } else {
        native.to_vec()
    }
}

/// Build face storage for `mesh`.
///
/// # Arguments
///
/// * `mesh` - Validated mesh
/// * `ldis` - Element discretization (fixes face node lists)
/// * `partition` - Element-to-block assignment
/// * `given` - Plan constants (alignment and scalar size)
/// * `verify` - Recompute index lists on registry hits
///
/// `given` must already carry the decomposition of `partition`.
pub fn build_face_storage_info(
    mesh: &dyn DgMesh,
    ldis: &LocalDiscretization,
    partition: &Partition,
    given: &PlanGivenData,
    verify: bool,
) -> error::Result<FaceStorageInfo> {
    let decomposed = given.block_count()?;
    if decomposed != partition.block_count() {
        return Err(PlanError::BlockCountMismatch {
            decomposed,
            partition: partition.block_count(),
        }
        .into());
    }

    let nfp = ldis.face_node_count();
    let mut b = Builder {
        ldis,
        partition,
        map: IndexMap::new(),
        records: Vec::new(),
        registry: IndexListRegistry::new(nfp, verify),
    };

    for pair in mesh.interior_face_pairs() {
        let face1 = b.make_int_face(pair.int_side)?;
        let face2 = b.make_int_face(pair.ext_side)?;
        b.link(face1, face2)?;

        let (f1, f2, rev) = (pair.int_side.face, pair.ext_side.face, pair.reversed);
        let native1 = b.native_list(f1)?;
        let native2 = b.native_list(f2)?;
        let matched2 = b.matched_list(f2, rev)?;
        let matched1 = b.matched_list(f1, rev)?;
        let write2 = b.ext_write_list(f2, rev)?;
        let write1 = b.ext_write_list(f1, rev)?;

        b.set_lists(face1, native1, matched2, Some(write2));
        b.set_lists(face2, native2, matched1, Some(write1));
    }

    let aligned_fnc = given.devdata.align_words(nfp, given.float_size());
    let mut gpu_offset = 0;
    let mut cpu_offset = 0;
    for bface in mesh.boundary_faces(BoundarySelector::All) {
        let face1 = b.make_int_face(bface.side)?;
        let face2 = b.next_id();
        b.records.push(FaceStorage::Boundary(BoundaryFaceStorage::new(
            face2, bface.tag, cpu_offset, gpu_offset,
        )));
        cpu_offset += nfp;
        gpu_offset += aligned_fnc;
        b.link(face1, face2)?;

        let native = b.native_list(bface.side.face)?;
        let identity = b.registry.register(None, || (0..nfp).collect())?;
        b.set_lists(face1, native, identity, None);
    }

    for record in &b.records {
        if record.opposite().is_none() {
            return Err(ConsistencyError::MissingOpposite(record.id()).into());
        }
    }

    let mut block_faces = vec![Vec::new(); partition.block_count()];
    for record in b.records.iter().filter_map(FaceStorage::as_interior) {
        block_faces[record.native_block].push(record.id);
    }

    debug!(
        records = b.records.len(),
        index_lists = b.registry.len(),
        boundary_dofs = gpu_offset,
        "built face storage"
    );

    Ok(FaceStorageInfo {
        map: b.map,
        records: b.records,
        index_lists: b.registry.into_lists(),
        block_faces,
        face_node_count: nfp,
        aligned_boundary_dofs_per_face: aligned_fnc,
        aligned_boundary_dof_count: gpu_offset,
    })
}
