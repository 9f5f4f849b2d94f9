//! GPU blocks: partition blocks split into fixed-size microblocks.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::PlanError;
use crate::partition::Partition;
use crate::plan::PlanGivenData;
use crate::types::{BlockIndex, ElementIndex};

/// One thread block's worth of elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpuBlock {
    pub number: BlockIndex,
    /// Elements grouped into microblocks; only the last may be short.
    pub microblocks: Vec<Vec<ElementIndex>>,
    /// Position of each element within the block.
    pub el_number_map: IndexMap<ElementIndex, usize>,
}

impl GpuBlock {
    pub fn element_count(&self) -> usize {
        self.el_number_map.len()
    }

    /// Elements in storage order.
    pub fn elements(&self) -> impl Iterator<Item = ElementIndex> + '_ {
        self.microblocks.iter().flatten().copied()
    }

    pub fn number_in_block(&self, el: ElementIndex) -> Option<usize> {
        self.el_number_map.get(&el).copied()
    }
}

/// Split every partition block into microblocks.
///
/// Elements enter each block in ascending element order. `given` must have
/// been decomposed; a block needing more microblocks than it allows is an
/// error.
pub fn build_blocks(partition: &Partition, given: &PlanGivenData) -> Result<Vec<GpuBlock>, PlanError> {
    let allowed = given.microblocks_per_block()?;
    let mb_elements = given.microblock.elements;

    let mut block_el_numbers: Vec<Vec<ElementIndex>> = vec![Vec::new(); partition.block_count()];
    for (el, block) in partition.assignment.iter().enumerate() {
        block_el_numbers[*block].push(ElementIndex::new(el));
    }

    let blocks = block_el_numbers
        .into_iter()
        .enumerate()
        .map(|(number, elements)| {
            let microblocks: Vec<Vec<ElementIndex>> =
                elements.chunks(mb_elements).map(<[_]>::to_vec).collect();
            if microblocks.len() > allowed {
                return Err(PlanError::BlockOverflow {
                    block: number,
                    needed: microblocks.len(),
                    allowed,
                });
            }
            let el_number_map = elements
                .iter()
                .enumerate()
                .map(|(i, &el)| (el, i))
                .collect();
            Ok(GpuBlock {
                number: BlockIndex::new(number),
                microblocks,
                el_number_map,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        blocks = blocks.len(),
        mb_elements,
        mbs_per_block = allowed,
        "built GPU blocks"
    );
    Ok(blocks)
}
