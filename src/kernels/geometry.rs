//! Per-element geometric factors gathered once from the mesh.

use crate::mesh::DgMesh;
use crate::types::ElementIndex;

/// Jacobians, inverse metrics, face normals and face jacobians of every
/// element, stored flat in element order.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementGeometry {
    dimensions: usize,
    faces_per_el: usize,
    jacobians: Vec<f64>,
    /// `dimensions^2` entries per element, row-major `[xyz][rst]`.
    inverse_metrics: Vec<f64>,
    /// `dimensions` entries per element face.
    normals: Vec<f64>,
    face_jacobians: Vec<f64>,
}

impl ElementGeometry {
    pub fn from_mesh(mesh: &dyn DgMesh) -> Self {
        let dimensions = mesh.dimensions();
        let faces_per_el = mesh.faces_per_element();
        let n = mesh.n_elements();

        let mut geometry = Self {
            dimensions,
            faces_per_el,
            jacobians: Vec::with_capacity(n),
            inverse_metrics: Vec::with_capacity(n * dimensions * dimensions),
            normals: Vec::with_capacity(n * faces_per_el * dimensions),
            face_jacobians: Vec::with_capacity(n * faces_per_el),
        };
        for el in ElementIndex::iter(n) {
            geometry.jacobians.push(mesh.jacobian(el));
            geometry.inverse_metrics.extend(mesh.inverse_metric(el));
            for face in 0..faces_per_el {
                geometry.normals.extend(mesh.face_normal(el, face));
                geometry.face_jacobians.push(mesh.face_jacobian(el, face));
            }
        }
        geometry
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn faces_per_el(&self) -> usize {
        self.faces_per_el
    }

    pub fn n_elements(&self) -> usize {
        self.jacobians.len()
    }

    pub fn jacobian(&self, el: ElementIndex) -> f64 {
        self.jacobians[el]
    }

    pub fn jacobians(&self) -> &[f64] {
        &self.jacobians
    }

    /// `d(rst_r)/d(xyz_a)` at index `a * dimensions + r`.
    pub fn inverse_metric(&self, el: ElementIndex) -> &[f64] {
        let d2 = self.dimensions * self.dimensions;
        &self.inverse_metrics[el.get() * d2..(el.get() + 1) * d2]
    }

    pub fn normal(&self, el: ElementIndex, face: usize) -> &[f64] {
        let start = (el.get() * self.faces_per_el + face) * self.dimensions;
        &self.normals[start..start + self.dimensions]
    }

    pub fn face_jacobian(&self, el: ElementIndex, face: usize) -> f64 {
        self.face_jacobians[el.get() * self.faces_per_el + face]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Mesh1D, Mesh2D};
    use approx::assert_relative_eq;

    #[test]
    fn test_1d_geometry() {
        let mesh = Mesh1D::uniform(0.0, 2.0, 4).unwrap();
        let geometry = ElementGeometry::from_mesh(&mesh);
        let el = ElementIndex::new(1);
        assert_eq!(geometry.n_elements(), 4);
        assert_relative_eq!(geometry.jacobian(el), 0.25);
        assert_relative_eq!(geometry.inverse_metric(el)[0], 4.0);
        assert_relative_eq!(geometry.normal(el, 0)[0], -1.0);
        assert_relative_eq!(geometry.normal(el, 1)[0], 1.0);
    }

    #[test]
    fn test_2d_layout() {
        let mesh = Mesh2D::uniform_rectangle(0.0, 2.0, 0.0, 1.0, 2, 2).unwrap();
        let geometry = ElementGeometry::from_mesh(&mesh);
        let el = ElementIndex::new(3);
        assert_eq!(geometry.inverse_metric(el).len(), 4);
        for face in 0..4 {
            let n = geometry.normal(el, face);
            assert_relative_eq!(n[0] * n[0] + n[1] * n[1], 1.0);
            assert_eq!(n, mesh.face_normal(el, face).as_slice());
        }
    }
}
