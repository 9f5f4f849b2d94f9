//! Mesh partitioning into GPU thread-block sized element clusters.

mod data;
mod greedy;

pub use data::PartitionData;
pub use greedy::{partition_greedy, Partition};
