//! 1D mesh representation.
//!
//! A 1D mesh is a partition of an interval [x_min, x_max] into elements.
//! Face 0 is the left end of an element, face 1 the right end.

use super::boundary_tags::BoundaryTag;
use super::traits::{DgMesh, FaceConnection, Neighbor};
use crate::error::ConfigError;
use crate::types::ElementIndex;

/// 1D mesh of an interval.
#[derive(Clone, Debug)]
pub struct Mesh1D {
    /// Left endpoint of domain
    pub x_min: f64,
    /// Right endpoint of domain
    pub x_max: f64,
    /// Element vertices: vertices[k] is left endpoint of element k
    /// vertices has length n_elements + 1
    pub vertices: Vec<f64>,
    /// Neighbor connectivity: neighbors[k] = (left_neighbor, right_neighbor)
    /// None if at boundary (non-periodic)
    pub neighbors: Vec<(Option<usize>, Option<usize>)>,
    /// Tags of the left and right domain ends
    pub boundary_tags: [BoundaryTag; 2],
}

impl Mesh1D {
    /// Create a uniform mesh of [x_min, x_max] with n_elements elements.
    pub fn uniform(x_min: f64, x_max: f64, n_elements: usize) -> Result<Self, ConfigError> {
        Self::build(x_min, x_max, n_elements, false)
    }

    /// Create a uniform periodic mesh of [x_min, x_max] with n_elements elements.
    ///
    /// The left and right boundaries are connected, so there are no boundary faces.
    pub fn uniform_periodic(
        x_min: f64,
        x_max: f64,
        n_elements: usize,
    ) -> Result<Self, ConfigError> {
        Self::build(x_min, x_max, n_elements, true)
    }

    fn build(x_min: f64, x_max: f64, n_elements: usize, periodic: bool) -> Result<Self, ConfigError> {
        if n_elements == 0 {
            return Err(ConfigError::InvalidMesh("need at least one element".into()));
        }
        if !(x_max > x_min) {
            return Err(ConfigError::InvalidMesh(format!(
                "empty interval [{x_min}, {x_max}]"
            )));
        }

        let h = (x_max - x_min) / n_elements as f64;
        let vertices = (0..=n_elements).map(|i| x_min + i as f64 * h).collect();

        let last = n_elements - 1;
        let neighbors = (0..n_elements)
            .map(|k| {
                let left = match k {
                    0 if periodic => Some(last),
                    0 => None,
                    _ => Some(k - 1),
                };
                let right = match k {
                    k if k == last && periodic => Some(0),
                    k if k == last => None,
                    _ => Some(k + 1),
                };
                (left, right)
            })
            .collect();

        Ok(Self {
            x_min,
            x_max,
            vertices,
            neighbors,
            boundary_tags: [BoundaryTag::Wall; 2],
        })
    }

    /// Set the tags of the left and right domain ends.
    pub fn with_boundary_tags(mut self, left: BoundaryTag, right: BoundaryTag) -> Self {
        self.boundary_tags = [left, right];
        self
    }

    /// Whether the two domain ends are connected.
    pub fn is_periodic(&self) -> bool {
        self.neighbors.first().is_some_and(|(left, _)| left.is_some())
    }

    /// Size of element k.
    pub fn element_size(&self, k: usize) -> f64 {
        self.vertices[k + 1] - self.vertices[k]
    }

    /// Map reference coordinate r in [-1, 1] to physical coordinate x in element k.
    ///
    /// x = x_k + (1 + r) * h_k / 2
    pub fn reference_to_physical(&self, k: usize, r: f64) -> f64 {
        self.vertices[k] + (1.0 + r) * self.element_size(k) / 2.0
    }
}

impl DgMesh for Mesh1D {
    fn dimensions(&self) -> usize {
        1
    }

    fn n_elements(&self) -> usize {
        self.neighbors.len()
    }

    fn faces_per_element(&self) -> usize {
        2
    }

    fn face_connection(&self, element: ElementIndex, face: usize) -> FaceConnection {
        let (left, right) = self.neighbors[element.get()];
        let across = if face == 0 { left } else { right };
        match across {
            Some(k) => FaceConnection::Interior(Neighbor {
                element: ElementIndex::new(k),
                face: 1 - face,
                reversed: false,
            }),
            None => FaceConnection::Boundary(self.boundary_tags[face]),
        }
    }

    /// dx/dr = h_k / 2
    fn jacobian(&self, element: ElementIndex) -> f64 {
        self.element_size(element.get()) / 2.0
    }

    fn inverse_metric(&self, element: ElementIndex) -> Vec<f64> {
        vec![2.0 / self.element_size(element.get())]
    }

    fn face_normal(&self, _element: ElementIndex, face: usize) -> Vec<f64> {
        vec![if face == 0 { -1.0 } else { 1.0 }]
    }

    /// Point faces have unit measure.
    fn face_jacobian(&self, _element: ElementIndex, _face: usize) -> f64 {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::BoundarySelector;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_mesh() {
        let mesh = Mesh1D::uniform(0.0, 1.0, 4).unwrap();

        assert_eq!(mesh.n_elements(), 4);
        assert_eq!(mesh.vertices.len(), 5);
        assert_relative_eq!(mesh.element_size(2), 0.25, epsilon = 1e-14);
        assert!(!mesh.is_periodic());
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_reference_to_physical() {
        let mesh = Mesh1D::uniform(0.0, 1.0, 4).unwrap();
        assert_relative_eq!(mesh.reference_to_physical(1, -1.0), 0.25, epsilon = 1e-14);
        assert_relative_eq!(mesh.reference_to_physical(1, 1.0), 0.5, epsilon = 1e-14);
    }

    #[test]
    fn test_boundary_faces() {
        let mesh = Mesh1D::uniform(0.0, 1.0, 3)
            .unwrap()
            .with_boundary_tags(BoundaryTag::Inflow, BoundaryTag::Outflow);
        let faces = mesh.boundary_faces(BoundarySelector::All);
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].side.element, ElementIndex::new(0));
        assert_eq!(faces[0].tag, BoundaryTag::Inflow);
        assert_eq!(faces[1].side.face, 1);

        let inflow = mesh.boundary_faces(BoundaryTag::Inflow.into());
        assert_eq!(inflow.len(), 1);
    }

    #[test]
    fn test_periodic_wraps() {
        let mesh = Mesh1D::uniform_periodic(0.0, 1.0, 3).unwrap();
        assert!(mesh.is_periodic());
        assert!(mesh.boundary_faces(BoundarySelector::All).is_empty());
        assert_eq!(mesh.interior_face_pairs().len(), 3);
        assert!(mesh.validate().is_ok());

        let graph = mesh.element_adjacency_graph();
        assert!(graph.contains_edge(ElementIndex::new(0), ElementIndex::new(2)));
    }

    #[test]
    fn test_face_pairs_listed_once() {
        let mesh = Mesh1D::uniform(0.0, 1.0, 6).unwrap();
        let pairs = mesh.interior_face_pairs();
        assert_eq!(pairs.len(), 5);
        assert_eq!(pairs[0].int_side.face, 1);
        assert_eq!(pairs[0].ext_side.element, ElementIndex::new(1));
        assert_eq!(pairs[0].ext_side.face, 0);
    }

    #[test]
    fn test_invalid_interval() {
        assert!(Mesh1D::uniform(1.0, 0.0, 3).is_err());
        assert!(Mesh1D::uniform(0.0, 1.0, 0).is_err());
    }
}
