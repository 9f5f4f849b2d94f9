//! Partition statistics used for plan sizing and diagnostics.

use tracing::debug;

use super::greedy::{partition_greedy, Partition};
use crate::error::ConfigError;
use crate::mesh::{BoundarySelector, DgMesh};

/// A partition together with per-block face statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionData {
    pub partition: Partition,
    /// External interfaces per block: faces whose other side lives in a
    /// different block or on the boundary.
    pub block_ext_faces: Vec<usize>,
    /// Largest number of face pairs any one block has to process.
    pub max_face_pair_count: usize,
    pub ext_face_avg: f64,
    pub int_face_pair_avg: f64,
    pub face_pair_avg: f64,
}

impl PartitionData {
    /// Partition `mesh` and gather face statistics.
    pub fn compute(mesh: &dyn DgMesh, max_block_size: usize) -> Result<Self, ConfigError> {
        let partition = partition_greedy(&mesh.element_adjacency_graph(), max_block_size)?;
        let n_blocks = partition.block_count();
        let mut block_ext_faces = vec![0usize; n_blocks];

        for pair in mesh.interior_face_pairs() {
            let b1 = partition.block_of(pair.int_side.element);
            let b2 = partition.block_of(pair.ext_side.element);
            if b1 != b2 {
                block_ext_faces[b1.get()] += 1;
                block_ext_faces[b2.get()] += 1;
            }
        }
        for face in mesh.boundary_faces(BoundarySelector::All) {
            block_ext_faces[partition.block_of(face.side.element).get()] += 1;
        }

        let faces_per_el = mesh.faces_per_element();
        let mut max_face_pair_count = 0;
        let mut int_face_pair_count = 0;
        let mut face_pair_count = 0;
        for (block, &ext) in partition.blocks.iter().zip(&block_ext_faces) {
            let int_faces = block.len() * faces_per_el - ext;
            let pairs = int_faces / 2 + ext;
            int_face_pair_count += int_faces / 2;
            face_pair_count += pairs;
            max_face_pair_count = max_face_pair_count.max(pairs);
        }

        let n = n_blocks.max(1) as f64;
        let data = Self {
            ext_face_avg: block_ext_faces.iter().sum::<usize>() as f64 / n,
            int_face_pair_avg: int_face_pair_count as f64 / n,
            face_pair_avg: face_pair_count as f64 / n,
            max_face_pair_count,
            block_ext_faces,
            partition,
        };
        debug!(
            blocks = n_blocks,
            max_face_pairs = data.max_face_pair_count,
            ext_face_avg = data.ext_face_avg,
            "partition statistics"
        );
        Ok(data)
    }
}
