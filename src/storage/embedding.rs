//! Host-to-device index maps for volume and boundary vectors.
//!
//! Device volume vectors are laid out block by block, each block holding
//! `microblocks_per_block` aligned microblocks, and padded to a multiple
//! of the diff plan's macroblock. Boundary vectors hold one aligned slot
//! per boundary face.

use tracing::trace;

use super::block::GpuBlock;
use super::builder::FaceStorageInfo;
use crate::error::{ConsistencyError, PlanError};
use crate::mesh::BoundaryFace;
use crate::plan::PlanGivenData;
use crate::types::{BlockIndex, ElementIndex, FaceStorageId};

/// Position of every element in device volume storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeLayout {
    block_of: Vec<BlockIndex>,
    number_in_block: Vec<usize>,
    mb_elements: usize,
    mb_aligned_floats: usize,
    dofs_per_el: usize,
    input_dofs_per_block: usize,
    gpu_dof_count: usize,
}

impl VolumeLayout {
    /// # Arguments
    ///
    /// * `blocks` - GPU blocks covering all `n_elements` elements
    /// * `given` - Decomposed plan constants
    /// * `dofs_per_macroblock` - Diff plan macroblock size; the vector
    ///   length is rounded up to a multiple of it
    pub fn new(
        blocks: &[GpuBlock],
        n_elements: usize,
        given: &PlanGivenData,
        dofs_per_macroblock: usize,
    ) -> Result<Self, PlanError> {
        let input_dofs_per_block = given.input_dofs_per_block()?;
        let mut block_of = vec![BlockIndex::ZERO; n_elements];
        let mut number_in_block = vec![0; n_elements];
        for block in blocks {
            for (&el, &n) in &block.el_number_map {
                block_of[el] = block.number;
                number_in_block[el] = n;
            }
        }

        let raw = input_dofs_per_block * blocks.len();
        let gpu_dof_count = raw.div_ceil(dofs_per_macroblock.max(1)) * dofs_per_macroblock.max(1);

        Ok(Self {
            block_of,
            number_in_block,
            mb_elements: given.microblock.elements,
            mb_aligned_floats: given.microblock.aligned_floats,
            dofs_per_el: given.dofs_per_el(),
            input_dofs_per_block,
            gpu_dof_count,
        })
    }

    pub fn n_elements(&self) -> usize {
        self.block_of.len()
    }

    pub fn dofs_per_el(&self) -> usize {
        self.dofs_per_el
    }

    /// Length of a device volume vector.
    pub fn gpu_dof_count(&self) -> usize {
        self.gpu_dof_count
    }

    /// Length of a host volume vector.
    pub fn host_dof_count(&self) -> usize {
        self.n_elements() * self.dofs_per_el
    }

    pub fn find_number_in_block(&self, el: ElementIndex) -> usize {
        self.number_in_block[el]
    }

    pub fn block_of(&self, el: ElementIndex) -> BlockIndex {
        self.block_of[el]
    }

    /// Device index of the first dof of `el`.
    pub fn find_el_gpu_index(&self, el: ElementIndex) -> usize {
        let n = self.number_in_block[el];
        let (mb, in_mb) = (n / self.mb_elements, n % self.mb_elements);
        self.block_of[el].get() * self.input_dofs_per_block
            + mb * self.mb_aligned_floats
            + in_mb * self.dofs_per_el
    }

    /// Device index of every host dof (`el * dofs_per_el + i`).
    pub fn volume_embedding(&self) -> Result<Vec<usize>, ConsistencyError> {
        let mut result = Vec::with_capacity(self.host_dof_count());
        for el in ElementIndex::iter(self.n_elements()) {
            let base = self.find_el_gpu_index(el);
            result.extend(base..base + self.dofs_per_el);
        }
        if let Some(&index) = result.iter().find(|&&i| i >= self.gpu_dof_count) {
            return Err(ConsistencyError::LayoutOverflow {
                what: "volume embedding",
                index,
                size: self.gpu_dof_count,
            });
        }
        trace!(len = result.len(), gpu_dofs = self.gpu_dof_count, "volume embedding");
        Ok(result)
    }

    /// Sorted device indices that hold real dofs (padding excluded).
    pub fn meaningful_volume_indices(&self) -> Result<Vec<usize>, ConsistencyError> {
        let mut indices = self.volume_embedding()?;
        indices.sort_unstable();
        Ok(indices)
    }
}

impl FaceStorageInfo {
    fn boundary_slot(&self, face: &BoundaryFace) -> Result<(FaceStorageId, usize), ConsistencyError> {
        let id = *self.map.get(&face.side).ok_or(ConsistencyError::UnknownFace {
            element: face.side.element,
            face: face.side.face,
        })?;
        let bdry = self
            .opposite(id)?
            .as_boundary()
            .ok_or(ConsistencyError::MissingOpposite(id))?;
        Ok((id, bdry.gpu_bdry_index))
    }

    /// Device boundary index of every host boundary node of `faces`.
    ///
    /// Host boundary vectors list the faces in the given order with
    /// `face_node_count` nodes each.
    pub fn boundary_embedding(&self, faces: &[BoundaryFace]) -> Result<Vec<usize>, ConsistencyError> {
        let mut result = Vec::with_capacity(faces.len() * self.face_node_count);
        for face in faces {
            let (_, gpu_base) = self.boundary_slot(face)?;
            result.extend(gpu_base..gpu_base + self.face_node_count);
        }
        Ok(result)
    }

    /// Gather and scatter indices moving volume face values into device
    /// boundary storage: `to[i]` in the boundary vector receives `from[i]`
    /// of the volume vector.
    pub fn boundarize_info(
        &self,
        faces: &[BoundaryFace],
        layout: &VolumeLayout,
    ) -> Result<(Vec<usize>, Vec<usize>), ConsistencyError> {
        let mut from = Vec::new();
        let mut to = Vec::new();
        for face in faces {
            let (id, gpu_base) = self.boundary_slot(face)?;
            let vol_face = self.records[id]
                .as_interior()
                .ok_or(ConsistencyError::MissingOpposite(id))?;
            let native = self.index_list(vol_face.native_index_list_id);
            let base = layout.find_el_gpu_index(face.side.element);
            from.extend(native.iter().map(|i| base + i));
            to.extend(gpu_base..gpu_base + native.len());
        }
        Ok((from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceData;
    use crate::local::LocalDiscretization;
    use crate::mesh::{BoundarySelector, BoundaryTag, DgMesh, Mesh1D, Mesh2D};
    use crate::partition::partition_greedy;
    use crate::plan::GivenOptions;
    use crate::storage::{build_blocks, build_face_storage_info};

    struct Fixture {
        layout: VolumeLayout,
        info: FaceStorageInfo,
    }

    fn fixture(mesh: &dyn DgMesh, ldis: &LocalDiscretization, block: usize, mbs: usize) -> Fixture {
        let partition = partition_greedy(&mesh.element_adjacency_graph(), block).unwrap();
        let mut given = PlanGivenData::new(DeviceData::reference(), ldis, GivenOptions::default());
        given.post_decomposition(partition.block_count(), mbs).unwrap();
        let blocks = build_blocks(&partition, &given).unwrap();
        let macroblock = given.microblock.aligned_floats * 2;
        let layout = VolumeLayout::new(&blocks, mesh.n_elements(), &given, macroblock).unwrap();
        let info = build_face_storage_info(mesh, ldis, &partition, &given, false).unwrap();
        Fixture { layout, info }
    }

    #[test]
    fn test_gpu_index_formula() {
        // line order 3: 4 dofs, 2 elements per 8-float microblock
        let mesh = Mesh1D::uniform(0.0, 1.0, 10).unwrap();
        let f = fixture(&mesh, &LocalDiscretization::line(3), 5, 3);
        let layout = &f.layout;
        // 2 blocks x 3 mbs x 8 floats = 48, rounded to macroblock 16
        assert_eq!(layout.gpu_dof_count(), 48);
        for el in ElementIndex::iter(10) {
            let n = layout.find_number_in_block(el);
            let expected = layout.block_of(el).get() * 24 + (n / 2) * 8 + (n % 2) * 4;
            assert_eq!(layout.find_el_gpu_index(el), expected);
        }
    }

    #[test]
    fn test_volume_embedding_injective() {
        let mesh = Mesh2D::uniform_rectangle(0.0, 1.0, 0.0, 1.0, 3, 3).unwrap();
        let f = fixture(&mesh, &LocalDiscretization::quadrilateral(2), 4, 4);
        let emb = f.layout.volume_embedding().unwrap();
        assert_eq!(emb.len(), 9 * 9);
        let sorted = f.layout.meaningful_volume_indices().unwrap();
        assert!(sorted.windows(2).all(|w| w[0] < w[1]));
        assert!(sorted.iter().all(|&i| i < f.layout.gpu_dof_count()));
    }

    #[test]
    fn test_gpu_dof_count_rounds_to_macroblock() {
        let mesh = Mesh1D::uniform(0.0, 1.0, 6).unwrap();
        let f = fixture(&mesh, &LocalDiscretization::line(3), 2, 1);
        // 3 blocks x 8 floats = 24, macroblock 16 -> 32
        assert_eq!(f.layout.gpu_dof_count(), 32);
    }

    #[test]
    fn test_boundary_embedding() {
        let mesh = Mesh2D::uniform_rectangle(0.0, 1.0, 0.0, 1.0, 2, 2).unwrap();
        let f = fixture(&mesh, &LocalDiscretization::quadrilateral(2), 4, 4);
        let faces = mesh.boundary_faces(BoundarySelector::All);
        let emb = f.info.boundary_embedding(&faces).unwrap();
        assert_eq!(emb.len(), 8 * 3);
        let mut sorted = emb.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), emb.len());
        assert!(emb.iter().all(|&i| i < f.info.aligned_boundary_dof_count));
    }

    #[test]
    fn test_boundarize_info_reads_face_nodes() {
        let mesh = Mesh1D::uniform(0.0, 1.0, 4).unwrap();
        let ldis = LocalDiscretization::line(2);
        let f = fixture(&mesh, &ldis, 4, 4);
        let faces = mesh.boundary_faces(BoundaryTag::Wall.into());
        let (from, to) = f.info.boundarize_info(&faces, &f.layout).unwrap();
        assert_eq!(from.len(), 2);
        assert_eq!(to.len(), 2);
        // left face of element 0 is its first node
        assert_eq!(from[0], f.layout.find_el_gpu_index(ElementIndex::new(0)));
        // right face of element 3 is its last node
        assert_eq!(from[1], f.layout.find_el_gpu_index(ElementIndex::new(3)) + 2);
        assert_eq!(to, f.info.boundary_embedding(&faces).unwrap());
    }
}
