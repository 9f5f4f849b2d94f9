//! Index newtypes for elements, blocks, face records, index lists and
//! instructions.
//!
//! All of them wrap a `usize` position into a flat table and index `[T]`
//! and `Vec<T>` directly, so tables keyed by one kind of handle cannot be
//! read with another.

use std::fmt;
use std::ops::{Index, IndexMut};

macro_rules! container_index {
    ($name:ident, $container:ty) => {
        impl<T> Index<$name> for $container {
            type Output = T;
            #[inline]
            fn index(&self, idx: $name) -> &T {
                &self[idx.0]
            }
        }

        impl<T> IndexMut<$name> for $container {
            #[inline]
            fn index_mut(&mut self, idx: $name) -> &mut T {
                &mut self[idx.0]
            }
        }
    };
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident => $tag:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            pub const ZERO: Self = Self(0);

            #[inline]
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            #[inline]
            pub const fn get(self) -> usize {
                self.0
            }

            /// Handles `0..n` in order.
            pub fn iter(n: usize) -> impl ExactSizeIterator<Item = $name> {
                (0..n).map($name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str($tag)?;
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<usize> for $name {
            fn from(index: usize) -> Self {
                Self(index)
            }
        }

        impl From<$name> for usize {
            fn from(handle: $name) -> usize {
                handle.0
            }
        }

        container_index!($name, [T]);
        container_index!($name, Vec<T>);
    };
}

handle! {
    /// Element number in mesh order.
    ///
    /// ```
    /// use dg_gpu::types::ElementIndex;
    ///
    /// let el = ElementIndex::new(42);
    /// assert_eq!(el.get(), 42);
    /// assert_eq!(el.to_string(), "E42");
    /// ```
    ElementIndex => "E"
}

handle! {
    /// Block number produced by the partitioner.
    BlockIndex => "B"
}

handle! {
    /// Handle into the flat face-storage table. Paired faces refer to each
    /// other through this handle rather than through references.
    FaceStorageId => "FS"
}

handle! {
    /// Id of a deduplicated list in an index-list registry; 0 is the
    /// identity list.
    IndexListId => "IL"
}

handle! {
    /// Position of an instruction in a compiled code object.
    InstructionId => "I"
}
