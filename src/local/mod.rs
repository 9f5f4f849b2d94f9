//! Element-local discretization on Gauss-Lobatto-Legendre nodes.
//!
//! Provides the per-element metadata and matrices the planner and kernels
//! consume:
//! - Node counts and face node lists (in each face's native order)
//! - Differentiation matrices per reference axis
//! - Mass, inverse mass, face mass and LIFT matrices
//!
//! Quadrilateral nodes are tensor products ordered `k = j * n_1d + i`
//! (r index fastest). Face node lists run counter-clockwise around the
//! element, matching the face convention of [`crate::mesh::Mesh2D`].

mod nodes;

use faer::Mat;

pub use nodes::{differentiation_matrix, gauss_lobatto_nodes, gauss_lobatto_weights, legendre};

/// Reference element shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementShape {
    /// Interval [-1, 1]
    Line,
    /// Square [-1, 1]²
    Quadrilateral,
}

impl ElementShape {
    /// Spatial dimension of the reference element.
    pub fn dimensions(self) -> usize {
        match self {
            ElementShape::Line => 1,
            ElementShape::Quadrilateral => 2,
        }
    }

    /// Number of faces.
    pub fn face_count(self) -> usize {
        match self {
            ElementShape::Line => 2,
            ElementShape::Quadrilateral => 4,
        }
    }
}

/// Nodal DG element of a given shape and polynomial order.
#[derive(Clone, Debug)]
pub struct LocalDiscretization {
    shape: ElementShape,
    order: usize,
    nodes_1d: Vec<f64>,
    weights_1d: Vec<f64>,
    diff: Vec<Mat<f64>>,
    mass_diag: Vec<f64>,
    face_indices: Vec<Vec<usize>>,
    face_weights: Vec<f64>,
}

impl LocalDiscretization {
    /// Line element of polynomial order `order` (order + 1 nodes).
    pub fn line(order: usize) -> Self {
        let nodes_1d = gauss_lobatto_nodes(order);
        let weights_1d = gauss_lobatto_weights(order, &nodes_1d);
        let n = nodes_1d.len();
        let diff = vec![differentiation_matrix(&nodes_1d)];

        Self {
            shape: ElementShape::Line,
            order,
            mass_diag: weights_1d.clone(),
            face_indices: vec![vec![0], vec![n - 1]],
            face_weights: vec![1.0],
            nodes_1d,
            weights_1d,
            diff,
        }
    }

    /// Tensor-product quadrilateral of polynomial order `order` ((order + 1)² nodes).
    pub fn quadrilateral(order: usize) -> Self {
        let nodes_1d = gauss_lobatto_nodes(order);
        let weights_1d = gauss_lobatto_weights(order, &nodes_1d);
        let n = nodes_1d.len();
        let d1 = differentiation_matrix(&nodes_1d);
        let idx = |i: usize, j: usize| j * n + i;

        let mut dr = Mat::zeros(n * n, n * n);
        let mut ds = Mat::zeros(n * n, n * n);
        for j in 0..n {
            for i in 0..n {
                for k in 0..n {
                    dr[(idx(i, j), idx(k, j))] = d1[(i, k)];
                    ds[(idx(i, j), idx(i, k))] = d1[(j, k)];
                }
            }
        }

        let mut mass_diag = Vec::with_capacity(n * n);
        for j in 0..n {
            for i in 0..n {
                mass_diag.push(weights_1d[i] * weights_1d[j]);
            }
        }

        let face_indices = vec![
            (0..n).map(|i| idx(i, 0)).collect(),
            (0..n).map(|j| idx(n - 1, j)).collect(),
            (0..n).rev().map(|i| idx(i, n - 1)).collect(),
            (0..n).rev().map(|j| idx(0, j)).collect(),
        ];

        Self {
            shape: ElementShape::Quadrilateral,
            order,
            face_weights: weights_1d.clone(),
            nodes_1d,
            weights_1d,
            diff: vec![dr, ds],
            mass_diag,
            face_indices,
        }
    }

    pub fn shape(&self) -> ElementShape {
        self.shape
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn dimensions(&self) -> usize {
        self.shape.dimensions()
    }

    /// Number of nodes (dofs) per element.
    pub fn node_count(&self) -> usize {
        self.mass_diag.len()
    }

    /// Number of nodes on one face.
    pub fn face_node_count(&self) -> usize {
        self.face_weights.len()
    }

    pub fn face_count(&self) -> usize {
        self.shape.face_count()
    }

    /// Volume node indices of `face`, in the face's native order.
    pub fn face_indices(&self, face: usize) -> &[usize] {
        &self.face_indices[face]
    }

    /// Quadrature tag for non-nodal face quadrature. GLL faces are nodal.
    pub fn quadrature_tag(&self) -> Option<&'static str> {
        None
    }

    /// Reference coordinates of every volume node, `[node][rst]`.
    pub fn reference_nodes(&self) -> Vec<Vec<f64>> {
        match self.shape {
            ElementShape::Line => self.nodes_1d.iter().map(|&r| vec![r]).collect(),
            ElementShape::Quadrilateral => {
                let n = self.nodes_1d.len();
                let mut out = Vec::with_capacity(n * n);
                for j in 0..n {
                    for i in 0..n {
                        out.push(vec![self.nodes_1d[i], self.nodes_1d[j]]);
                    }
                }
                out
            }
        }
    }

    /// Reference quadrature weights of the 1D node set.
    pub fn weights_1d(&self) -> &[f64] {
        &self.weights_1d
    }

    /// Differentiation matrices `d/dr`, `d/ds`, ... on the reference element.
    pub fn differentiation_matrices(&self) -> &[Mat<f64>] {
        &self.diff
    }

    /// Diagonal (GLL-quadrature) mass matrix.
    pub fn mass_matrix(&self) -> Mat<f64> {
        diagonal(&self.mass_diag)
    }

    pub fn inverse_mass_matrix(&self) -> Mat<f64> {
        let inv: Vec<f64> = self.mass_diag.iter().map(|w| 1.0 / w).collect();
        diagonal(&inv)
    }

    /// Mass matrix of one face on its own nodes.
    pub fn face_mass_matrix(&self) -> Mat<f64> {
        diagonal(&self.face_weights)
    }

    /// Map from all face values to the volume: LIFT = M^{-1} E.
    ///
    /// Shape `(node_count, face_count * face_node_count)`; column
    /// `face * face_node_count + k` belongs to node k of `face`.
    pub fn lift_matrix(&self) -> Mat<f64> {
        self.face_matrix(true)
    }

    /// Face mass embedded in the volume (E without M^{-1}).
    pub fn multi_face_mass_matrix(&self) -> Mat<f64> {
        self.face_matrix(false)
    }

    fn face_matrix(&self, with_inverse_mass: bool) -> Mat<f64> {
        let nfp = self.face_node_count();
        let mut m = Mat::zeros(self.node_count(), self.face_count() * nfp);
        for (face, indices) in self.face_indices.iter().enumerate() {
            for (k, &node) in indices.iter().enumerate() {
                let scale = if with_inverse_mass {
                    1.0 / self.mass_diag[node]
                } else {
                    1.0
                };
                m[(node, face * nfp + k)] = self.face_weights[k] * scale;
            }
        }
        m
    }
}

fn diagonal(values: &[f64]) -> Mat<f64> {
    let n = values.len();
    let mut m = Mat::zeros(n, n);
    for (i, &v) in values.iter().enumerate() {
        m[(i, i)] = v;
    }
    m
}
