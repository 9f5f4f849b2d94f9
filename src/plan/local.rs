//! Plans for element-local matrix application (differentiation, mass, lift).
//!
//! Both kernels multiply a small dense matrix into every element. A thread
//! block handles `parallel` microblocks side by side and loops over
//! `serial` of them; rows of the matrix are streamed through shared memory
//! in segments of `segment_size`.

use std::fmt;

use super::{optimize_plan, ExecutionPlan, PlanGivenData};
use crate::error::ConfigError;

const MAX_PARALLEL: usize = 16;
const MAX_SERIAL: usize = 4;

/// Microblocks handled concurrently and sequentially per thread block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Parallelism {
    pub parallel: usize,
    pub serial: usize,
}

impl Parallelism {
    pub fn new(parallel: usize, serial: usize) -> Self {
        Self { parallel, serial }
    }

    /// Microblocks per thread block.
    pub fn total(&self) -> usize {
        self.parallel * self.serial
    }
}

impl fmt::Display for Parallelism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.parallel, self.serial)
    }
}

/// Candidate segment sizes: multiples of the alignment up to one microblock.
fn segment_sizes(given: &PlanGivenData) -> Vec<usize> {
    let align = given.devdata.alignment_words(given.float_size());
    (1..=given.microblock.aligned_floats / align)
        .map(|k| k * align)
        .collect()
}

fn segment_fill(given: &PlanGivenData, segment_size: usize) -> f64 {
    let rows = given.microblock.aligned_floats;
    let segments = rows.div_ceil(segment_size);
    rows as f64 / (segments * segment_size) as f64
}

fn serial_gain(p: Parallelism) -> f64 {
    p.serial as f64 / (p.serial as f64 + 1.0)
}

fn parallelisms() -> impl Iterator<Item = Parallelism> {
    (1..=MAX_PARALLEL).flat_map(|parallel| {
        (1..=MAX_SERIAL).map(move |serial| Parallelism::new(parallel, serial))
    })
}

/// Differentiation kernel plan.
#[derive(Clone, Debug, PartialEq)]
pub struct DiffPlan {
    given: PlanGivenData,
    pub parallelism: Parallelism,
    pub segment_size: usize,
    pub dimensions: usize,
}

impl DiffPlan {
    pub fn new(
        given: PlanGivenData,
        parallelism: Parallelism,
        segment_size: usize,
        dimensions: usize,
    ) -> Self {
        Self {
            given,
            parallelism,
            segment_size,
            dimensions,
        }
    }

    /// Floats processed by one thread block. Volume vectors are padded to a
    /// multiple of this.
    pub fn dofs_per_macroblock(&self) -> usize {
        self.parallelism.total() * self.given.microblock.aligned_floats
    }
}

impl fmt::Display for DiffPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "diff(parallelism={}, segment={}, dims={})",
            self.parallelism, self.segment_size, self.dimensions
        )
    }
}

impl ExecutionPlan for DiffPlan {
    fn given(&self) -> &PlanGivenData {
        &self.given
    }

    fn threads(&self) -> usize {
        self.segment_size * self.parallelism.parallel
    }

    fn shared_mem_use(&self) -> usize {
        let g = &self.given;
        g.float_size()
            * (self.dimensions * self.segment_size * g.dofs_per_el()
                + self.parallelism.parallel * g.microblock.aligned_floats)
    }

    fn registers(&self) -> usize {
        self.threads() * (10 + 2 * self.dimensions)
    }

    fn efficiency(&self) -> f64 {
        segment_fill(&self.given, self.segment_size) * serial_gain(self.parallelism)
    }
}

/// Plan for applying one dense `dofs_per_el x columns` matrix per element.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementLocalPlan {
    given: PlanGivenData,
    pub parallelism: Parallelism,
    pub segment_size: usize,
    /// Input values per element (dofs for mass, face dofs for lift).
    pub columns: usize,
}

impl ElementLocalPlan {
    pub fn new(
        given: PlanGivenData,
        parallelism: Parallelism,
        segment_size: usize,
        columns: usize,
    ) -> Self {
        Self {
            given,
            parallelism,
            segment_size,
            columns,
        }
    }
}

impl fmt::Display for ElementLocalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "element_local(parallelism={}, segment={}, columns={})",
            self.parallelism, self.segment_size, self.columns
        )
    }
}

impl ExecutionPlan for ElementLocalPlan {
    fn given(&self) -> &PlanGivenData {
        &self.given
    }

    fn threads(&self) -> usize {
        self.segment_size * self.parallelism.parallel
    }

    fn shared_mem_use(&self) -> usize {
        let g = &self.given;
        g.float_size()
            * (self.segment_size * self.columns
                + self.parallelism.parallel * g.microblock.aligned_floats)
    }

    fn registers(&self) -> usize {
        self.threads() * 12
    }

    fn efficiency(&self) -> f64 {
        segment_fill(&self.given, self.segment_size) * serial_gain(self.parallelism)
    }
}

/// Search the differentiation plan space.
pub fn make_diff_plan(
    given: &PlanGivenData,
    dimensions: usize,
    log: bool,
) -> Result<DiffPlan, ConfigError> {
    let segments = segment_sizes(given);
    let candidates = parallelisms().flat_map(|p| {
        segments
            .iter()
            .map(move |&seg| DiffPlan::new(given.clone(), p, seg, dimensions))
    });
    optimize_plan("diff", candidates, log)
}

/// Search the element-local plan space for a matrix with `columns` inputs.
pub fn make_element_local_plan(
    given: &PlanGivenData,
    columns: usize,
    log: bool,
) -> Result<ElementLocalPlan, ConfigError> {
    let segments = segment_sizes(given);
    let candidates = parallelisms().flat_map(|p| {
        segments
            .iter()
            .map(move |&seg| ElementLocalPlan::new(given.clone(), p, seg, columns))
    });
    optimize_plan("element local", candidates, log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceData;
    use crate::local::LocalDiscretization;
    use crate::plan::GivenOptions;

    fn given(dev: DeviceData) -> PlanGivenData {
        PlanGivenData::new(
            dev,
            &LocalDiscretization::quadrilateral(3),
            GivenOptions::default(),
        )
    }

    #[test]
    fn test_segment_sizes() {
        let g = given(DeviceData::reference());
        // 16 dofs, 8-word alignment
        assert_eq!(segment_sizes(&g), vec![8, 16]);
    }

    #[test]
    fn test_diff_plan_valid() {
        let g = given(DeviceData::reference());
        let plan = make_diff_plan(&g, 2, false).unwrap();
        assert!(plan.invalid_reason().is_none());
        assert_eq!(
            plan.dofs_per_macroblock(),
            plan.parallelism.total() * g.microblock.aligned_floats
        );
        assert_eq!(plan.dofs_per_macroblock() % g.microblock.aligned_floats, 0);
    }

    #[test]
    fn test_element_local_plan_valid() {
        let g = given(DeviceData::small());
        let plan = make_element_local_plan(&g, g.face_dofs_per_el(), true).unwrap();
        assert!(plan.invalid_reason().is_none());
        assert!(plan.threads() <= g.devdata.max_threads_per_block);
    }

    #[test]
    fn test_no_valid_diff_plan() {
        let mut dev = DeviceData::small();
        dev.registers_per_block = 1;
        let g = given(dev);
        assert!(matches!(
            make_diff_plan(&g, 2, false),
            Err(ConfigError::NoValidPlan { kind: "diff", .. })
        ));
    }
}
