//! Mesh representation.
//!
//! Provides the connectivity contract the planning core consumes:
//! - [`DgMesh`] trait with derived adjacency, face pairs and boundary faces
//! - 1D interval mesh with optional periodicity
//! - 2D uniform quadrilateral mesh with edge connectivity
//! - Insertion-ordered element adjacency graph

mod adjacency;
mod boundary_tags;
mod mesh1d;
mod mesh2d;
mod traits;

pub use adjacency::AdjacencyGraph;
pub use boundary_tags::{BoundarySelector, BoundaryTag};
pub use mesh1d::Mesh1D;
pub use mesh2d::{Mesh2D, Side};
pub use traits::{BoundaryFace, DgMesh, ElementFace, FaceConnection, FacePair, Neighbor};
