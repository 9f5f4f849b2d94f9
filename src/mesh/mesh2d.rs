//! 2D mesh representation for quadrilateral elements.
//!
//! The mesh stores:
//! - Vertex coordinates
//! - Element-vertex connectivity (counter-clockwise ordering)
//! - Face neighbors for inter-element flux computation
//! - Boundary tags per domain side
//!
//! Face convention (counter-clockwise around element):
//! - Face 0 (bottom): from vertex 0 to vertex 1
//! - Face 1 (right):  from vertex 1 to vertex 2
//! - Face 2 (top):    from vertex 2 to vertex 3
//! - Face 3 (left):   from vertex 3 to vertex 0
//!
//! Every element walks its faces counter-clockwise, so the two sides of a
//! shared edge always traverse it in opposite directions.

use super::boundary_tags::BoundaryTag;
use super::traits::{DgMesh, FaceConnection, Neighbor};
use crate::error::ConfigError;
use crate::types::ElementIndex;

/// Domain side, indexing `Mesh2D::side_tags`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    South = 0,
    East = 1,
    North = 2,
    West = 3,
}

impl Side {
    /// Side touched by local face `face` when it lies on the domain boundary.
    pub fn of_face(face: usize) -> Self {
        match face {
            0 => Side::South,
            1 => Side::East,
            2 => Side::North,
            _ => Side::West,
        }
    }
}

/// 2D mesh of a uniformly subdivided rectangle.
#[derive(Clone, Debug)]
pub struct Mesh2D {
    /// Vertex coordinates: vertices[i] = (x, y)
    pub vertices: Vec<(f64, f64)>,

    /// Element-vertex connectivity: elements[k] = [v0, v1, v2, v3]
    /// - v0: bottom-left  (r=-1, s=-1)
    /// - v1: bottom-right (r=+1, s=-1)
    /// - v2: top-right    (r=+1, s=+1)
    /// - v3: top-left     (r=-1, s=+1)
    pub elements: Vec<[usize; 4]>,

    /// neighbors[k][f] = (element, face) across face f, None on the boundary
    pub neighbors: Vec<[Option<(usize, usize)>; 4]>,

    /// Boundary tags for [south, east, north, west]
    pub side_tags: [BoundaryTag; 4],

    /// Element counts in x and y
    pub nx: usize,
    pub ny: usize,

    dx: f64,
    dy: f64,
}

impl Mesh2D {
    /// Create a uniform rectangular mesh of [x0, x1] × [y0, y1] with wall boundaries.
    pub fn uniform_rectangle(
        x0: f64,
        x1: f64,
        y0: f64,
        y1: f64,
        nx: usize,
        ny: usize,
    ) -> Result<Self, ConfigError> {
        Self::uniform_rectangle_with_sides(x0, x1, y0, y1, nx, ny, [BoundaryTag::Wall; 4])
    }

    /// Create a uniform rectangular mesh with different boundary tags on each side.
    ///
    /// # Arguments
    /// * `x0`, `x1` - x-coordinate bounds
    /// * `y0`, `y1` - y-coordinate bounds
    /// * `nx` - number of elements in x-direction
    /// * `ny` - number of elements in y-direction
    /// * `side_tags` - boundary tags for [south, east, north, west] sides
    #[allow(clippy::too_many_arguments)]
    pub fn uniform_rectangle_with_sides(
        x0: f64,
        x1: f64,
        y0: f64,
        y1: f64,
        nx: usize,
        ny: usize,
        side_tags: [BoundaryTag; 4],
    ) -> Result<Self, ConfigError> {
        Self::build(x0, x1, y0, y1, nx, ny, side_tags, (false, false))
    }

    /// Create a fully periodic mesh (periodic in both x and y).
    pub fn uniform_periodic(
        x0: f64,
        x1: f64,
        y0: f64,
        y1: f64,
        nx: usize,
        ny: usize,
    ) -> Result<Self, ConfigError> {
        Self::build(x0, x1, y0, y1, nx, ny, [BoundaryTag::Wall; 4], (true, true))
    }

    /// Create a mesh that is periodic in the x-direction (channel flow).
    pub fn channel_periodic_x(
        x0: f64,
        x1: f64,
        y0: f64,
        y1: f64,
        nx: usize,
        ny: usize,
    ) -> Result<Self, ConfigError> {
        Self::build(x0, x1, y0, y1, nx, ny, [BoundaryTag::Wall; 4], (true, false))
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        x0: f64,
        x1: f64,
        y0: f64,
        y1: f64,
        nx: usize,
        ny: usize,
        side_tags: [BoundaryTag; 4],
        (periodic_x, periodic_y): (bool, bool),
    ) -> Result<Self, ConfigError> {
        if nx == 0 || ny == 0 {
            return Err(ConfigError::InvalidMesh(
                "need at least one element in each direction".into(),
            ));
        }
        if !(x1 > x0 && y1 > y0) {
            return Err(ConfigError::InvalidMesh(format!(
                "invalid domain bounds [{x0}, {x1}] x [{y0}, {y1}]"
            )));
        }
        // A single periodic column would make an element its own neighbor
        // through two faces with the same orientation.
        if (periodic_x && nx < 2) || (periodic_y && ny < 2) {
            return Err(ConfigError::InvalidMesh(
                "periodic direction needs at least two elements".into(),
            ));
        }

        let dx = (x1 - x0) / nx as f64;
        let dy = (y1 - y0) / ny as f64;

        // Generate vertices: (nx+1) × (ny+1) grid
        let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
        for j in 0..=ny {
            for i in 0..=nx {
                vertices.push((x0 + i as f64 * dx, y0 + j as f64 * dy));
            }
        }

        let elem_idx = |i: usize, j: usize| -> usize { j * nx + i };

        let mut elements = Vec::with_capacity(nx * ny);
        let mut neighbors = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let v0 = j * (nx + 1) + i; // bottom-left
                let v1 = v0 + 1; // bottom-right
                let v2 = v1 + (nx + 1); // top-right
                let v3 = v0 + (nx + 1); // top-left
                elements.push([v0, v1, v2, v3]);

                let south = if j > 0 {
                    Some((elem_idx(i, j - 1), 2))
                } else if periodic_y {
                    Some((elem_idx(i, ny - 1), 2))
                } else {
                    None
                };
                let east = if i + 1 < nx {
                    Some((elem_idx(i + 1, j), 3))
                } else if periodic_x {
                    Some((elem_idx(0, j), 3))
                } else {
                    None
                };
                let north = if j + 1 < ny {
                    Some((elem_idx(i, j + 1), 0))
                } else if periodic_y {
                    Some((elem_idx(i, 0), 0))
                } else {
                    None
                };
                let west = if i > 0 {
                    Some((elem_idx(i - 1, j), 1))
                } else if periodic_x {
                    Some((elem_idx(nx - 1, j), 1))
                } else {
                    None
                };
                neighbors.push([south, east, north, west]);
            }
        }

        Ok(Self {
            vertices,
            elements,
            neighbors,
            side_tags,
            nx,
            ny,
            dx,
            dy,
        })
    }

    /// Get the vertex coordinates of element k.
    pub fn element_vertices(&self, k: usize) -> [(f64, f64); 4] {
        let [v0, v1, v2, v3] = self.elements[k];
        [
            self.vertices[v0],
            self.vertices[v1],
            self.vertices[v2],
            self.vertices[v3],
        ]
    }

    /// Map reference coordinates (r, s) in [-1, 1]² to physical (x, y) in element k.
    pub fn reference_to_physical(&self, k: usize, r: f64, s: f64) -> (f64, f64) {
        let (x_left, y_bottom) = self.vertices[self.elements[k][0]];
        (
            x_left + (1.0 + r) * self.dx / 2.0,
            y_bottom + (1.0 + s) * self.dy / 2.0,
        )
    }

    /// Element widths (dx, dy).
    pub fn spacing(&self) -> (f64, f64) {
        (self.dx, self.dy)
    }
}

impl DgMesh for Mesh2D {
    fn dimensions(&self) -> usize {
        2
    }

    fn n_elements(&self) -> usize {
        self.elements.len()
    }

    fn faces_per_element(&self) -> usize {
        4
    }

    fn face_connection(&self, element: ElementIndex, face: usize) -> FaceConnection {
        match self.neighbors[element.get()][face] {
            Some((k, f)) => FaceConnection::Interior(Neighbor {
                element: ElementIndex::new(k),
                face: f,
                reversed: true,
            }),
            None => FaceConnection::Boundary(self.side_tags[Side::of_face(face) as usize]),
        }
    }

    /// (dx/2) * (dy/2)
    fn jacobian(&self, _element: ElementIndex) -> f64 {
        self.dx * self.dy / 4.0
    }

    fn inverse_metric(&self, _element: ElementIndex) -> Vec<f64> {
        // [[rx, sx], [ry, sy]]
        vec![2.0 / self.dx, 0.0, 0.0, 2.0 / self.dy]
    }

    fn face_normal(&self, _element: ElementIndex, face: usize) -> Vec<f64> {
        match face {
            0 => vec![0.0, -1.0],
            1 => vec![1.0, 0.0],
            2 => vec![0.0, 1.0],
            _ => vec![-1.0, 0.0],
        }
    }

    fn face_jacobian(&self, _element: ElementIndex, face: usize) -> f64 {
        if face % 2 == 0 {
            self.dx / 2.0
        } else {
            self.dy / 2.0
        }
    }
}
