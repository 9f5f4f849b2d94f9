//! Strongly-typed index types for safer APIs.
//!
//! Planning and layout juggle many integer handles at once. Each gets a
//! newtype so that an element number can never be passed where a block
//! number or a face-storage handle is expected.
//!
//! # Example
//!
//! ```
//! use dg_gpu::types::{BlockIndex, ElementIndex};
//!
//! let partition = vec![BlockIndex::new(0), BlockIndex::new(0), BlockIndex::new(1)];
//! assert_eq!(partition[ElementIndex::new(2)], BlockIndex::new(1));
//! ```

mod indices;

pub use indices::{BlockIndex, ElementIndex, FaceStorageId, IndexListId, InstructionId};
