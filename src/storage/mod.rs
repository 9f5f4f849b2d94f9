//! Device data layout: blocks, face storage and host/device index maps.

mod block;
mod builder;
mod embedding;
mod face;
mod index_list;

pub use block::{build_blocks, GpuBlock};
pub use builder::{build_face_storage_info, FaceStorageInfo};
pub use embedding::VolumeLayout;
pub use face::{BoundaryFaceStorage, FaceStorage, InteriorFaceStorage};
pub use index_list::{apply_write_map, write_to_map, IndexListKey, IndexListRegistry};
