//! Mesh connectivity contract consumed by the planning core.
//!
//! - [`DgMesh`]: element/face connectivity plus affine geometry
//! - [`FaceConnection`]: what lies across one element face
//! - [`FacePair`]: one interior interface, listed once
//!
//! Provided methods derive everything the partitioner and the storage
//! builder need (adjacency graph, face pairs, tagged boundary faces) from
//! `face_connection`, so a mesh only implements the primitive queries.

use std::fmt::Debug;

use super::adjacency::AdjacencyGraph;
use super::boundary_tags::{BoundarySelector, BoundaryTag};
use crate::error::ConfigError;
use crate::types::ElementIndex;

/// Information about a neighbor element across a face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Neighbor {
    /// Index of the neighboring element.
    pub element: ElementIndex,
    /// Local face index on the neighbor that shares this interface.
    pub face: usize,
    /// The neighbor traverses the shared face's nodes in the opposite order.
    pub reversed: bool,
}

/// Result of querying face connectivity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceConnection {
    /// Interior face connecting to a neighbor element.
    Interior(Neighbor),
    /// Boundary face with an associated tag.
    Boundary(BoundaryTag),
}

impl FaceConnection {
    /// Returns the neighbor if this is an interior face.
    #[inline]
    pub fn neighbor(&self) -> Option<&Neighbor> {
        match self {
            FaceConnection::Interior(n) => Some(n),
            FaceConnection::Boundary(_) => None,
        }
    }
}

/// One element face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementFace {
    pub element: ElementIndex,
    pub face: usize,
}

impl ElementFace {
    pub fn new(element: ElementIndex, face: usize) -> Self {
        Self { element, face }
    }
}

/// An interior interface seen from both sides.
///
/// `int_side` is the side with the smaller `(element, face)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FacePair {
    pub int_side: ElementFace,
    pub ext_side: ElementFace,
    /// Ext side's native node order runs opposite to the int side's.
    pub reversed: bool,
}

/// A boundary face with its tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundaryFace {
    pub side: ElementFace,
    pub tag: BoundaryTag,
}

/// Connectivity and affine geometry of a DG mesh.
pub trait DgMesh: Debug + Send + Sync {
    /// Spatial dimension.
    fn dimensions(&self) -> usize;

    /// Number of elements.
    fn n_elements(&self) -> usize;

    /// Number of faces per element.
    fn faces_per_element(&self) -> usize;

    /// What lies across `face` of `element`.
    fn face_connection(&self, element: ElementIndex, face: usize) -> FaceConnection;

    /// Volume Jacobian determinant (constant per affine element).
    fn jacobian(&self, element: ElementIndex) -> f64;

    /// Inverse metric `d r_rst / d x_xyz`, row-major `[xyz][rst]`.
    fn inverse_metric(&self, element: ElementIndex) -> Vec<f64>;

    /// Outward unit normal of a face.
    fn face_normal(&self, element: ElementIndex, face: usize) -> Vec<f64>;

    /// Ratio of physical to reference face measure.
    fn face_jacobian(&self, element: ElementIndex, face: usize) -> f64;

    /// Element adjacency graph over face neighbors.
    fn element_adjacency_graph(&self) -> AdjacencyGraph {
        let mut graph = AdjacencyGraph::with_nodes(self.n_elements());
        for el in ElementIndex::iter(self.n_elements()) {
            for face in 0..self.faces_per_element() {
                if let FaceConnection::Interior(n) = self.face_connection(el, face) {
                    graph.add_edge(el, n.element);
                }
            }
        }
        graph
    }

    /// Every interior interface exactly once, in element order.
    fn interior_face_pairs(&self) -> Vec<FacePair> {
        let mut pairs = Vec::new();
        for el in ElementIndex::iter(self.n_elements()) {
            for face in 0..self.faces_per_element() {
                if let FaceConnection::Interior(n) = self.face_connection(el, face) {
                    let here = ElementFace::new(el, face);
                    let there = ElementFace::new(n.element, n.face);
                    if here < there {
                        pairs.push(FacePair {
                            int_side: here,
                            ext_side: there,
                            reversed: n.reversed,
                        });
                    }
                }
            }
        }
        pairs
    }

    /// Boundary faces matching `selector`, in element order.
    fn boundary_faces(&self, selector: BoundarySelector) -> Vec<BoundaryFace> {
        let mut faces = Vec::new();
        for el in ElementIndex::iter(self.n_elements()) {
            for face in 0..self.faces_per_element() {
                if let FaceConnection::Boundary(tag) = self.face_connection(el, face) {
                    if selector.matches(tag) {
                        faces.push(BoundaryFace {
                            side: ElementFace::new(el, face),
                            tag,
                        });
                    }
                }
            }
        }
        faces
    }

    /// Check that every interior connection is reciprocated.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.n_elements() == 0 {
            return Err(ConfigError::InvalidMesh("mesh has no elements".into()));
        }
        for el in ElementIndex::iter(self.n_elements()) {
            for face in 0..self.faces_per_element() {
                let FaceConnection::Interior(n) = self.face_connection(el, face) else {
                    continue;
                };
                if n.element.get() >= self.n_elements() || n.face >= self.faces_per_element() {
                    return Err(ConfigError::InvalidMesh(format!(
                        "{el} face {face} points at nonexistent {} face {}",
                        n.element, n.face
                    )));
                }
                match self.face_connection(n.element, n.face) {
                    FaceConnection::Interior(back)
                        if back.element == el && back.face == face && back.reversed == n.reversed => {}
                    _ => {
                        return Err(ConfigError::InvalidMesh(format!(
                            "{el} face {face} -> {} face {} is not reciprocated",
                            n.element, n.face
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
