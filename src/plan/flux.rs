//! Flux gather plan: how many faces a thread block processes in parallel
//! and how many microblocks it covers.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use parking_lot::Mutex;

use super::{optimize_plan, ExecutionPlan, PlanGivenData};
use crate::error::ConfigError;
use crate::optemplate::Expr;

/// Bytes of per-face descriptor data staged in shared memory.
const FACE_DESCRIPTOR_BYTES: usize = 16;

const MAX_PARALLEL_FACES: usize = 32;
const MAX_MICROBLOCKS_PER_BLOCK: usize = 64;

#[derive(Clone, Debug, PartialEq)]
pub struct FluxGatherPlan {
    given: PlanGivenData,
    pub parallel_faces: usize,
    pub mbs_per_block: usize,
    /// Fluxes gathered together in one launch.
    pub flux_count: usize,
}

impl FluxGatherPlan {
    pub fn new(
        given: PlanGivenData,
        parallel_faces: usize,
        mbs_per_block: usize,
        flux_count: usize,
    ) -> Self {
        Self {
            given,
            parallel_faces,
            mbs_per_block,
            flux_count,
        }
    }

    pub fn microblocks_per_block(&self) -> usize {
        self.mbs_per_block
    }

    pub fn elements_per_block(&self) -> usize {
        self.mbs_per_block * self.given.microblock.elements
    }

    /// Aligned volume storage of one block, in floats.
    pub fn input_dofs_per_block(&self) -> usize {
        self.mbs_per_block * self.given.microblock.aligned_floats
    }

    /// Aligned face storage of one block, in floats.
    pub fn aligned_face_dofs_per_block(&self) -> usize {
        self.mbs_per_block * self.given.aligned_face_dofs_per_microblock()
    }

    fn faces_per_block(&self) -> usize {
        self.elements_per_block() * self.given.faces_per_el()
    }
}

impl fmt::Display for FluxGatherPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flux_gather(parallel_faces={}, mbs_per_block={}, fluxes={})",
            self.parallel_faces, self.mbs_per_block, self.flux_count
        )
    }
}

impl ExecutionPlan for FluxGatherPlan {
    fn given(&self) -> &PlanGivenData {
        &self.given
    }

    fn threads(&self) -> usize {
        self.parallel_faces * self.given.max_face_dofs()
    }

    fn shared_mem_use(&self) -> usize {
        self.given.float_size() * self.flux_count * self.aligned_face_dofs_per_block()
            + self.faces_per_block() * FACE_DESCRIPTOR_BYTES
    }

    fn registers(&self) -> usize {
        self.threads() * (12 + 2 * self.flux_count)
    }

    fn efficiency(&self) -> f64 {
        let faces = self.faces_per_block();
        let rounds = faces.div_ceil(self.parallel_faces);
        let fill = faces as f64 / (rounds * self.parallel_faces) as f64;
        // larger blocks amortize the per-block setup
        let epb = self.elements_per_block() as f64;
        fill * epb / (epb + self.given.faces_per_el() as f64)
    }
}

/// Search the flux gather plan space.
///
/// # Arguments
///
/// * `given` - Problem constants (need not be decomposed yet)
/// * `flux_count` - Fluxes per batch the plan is tuned for
/// * `given_mbs_per_block` - Pin the microblocks per block instead of searching
/// * `log` - Log every candidate
pub fn make_flux_plan(
    given: &PlanGivenData,
    flux_count: usize,
    given_mbs_per_block: Option<usize>,
    log: bool,
) -> Result<FluxGatherPlan, ConfigError> {
    let flux_count = flux_count.max(1);
    let mbs_range: Vec<usize> = match given_mbs_per_block {
        Some(mbs) => vec![mbs],
        None => (1..=MAX_MICROBLOCKS_PER_BLOCK).collect(),
    };

    let candidates = mbs_range.into_iter().flat_map(|mbs| {
        (1..=MAX_PARALLEL_FACES)
            .map(move |pf| FluxGatherPlan::new(given.clone(), pf, mbs, flux_count))
    });
    optimize_plan("flux gather", candidates, log)
}

/// Memoization key for flux plans.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FluxPlanKey {
    pub max_face_dofs: usize,
    pub quadrature_tag: Option<&'static str>,
    pub tune_for: Option<Expr>,
    pub given_mbs_per_block: Option<usize>,
}

/// Thread-safe memo of computed plans.
#[derive(Debug)]
pub struct PlanCache<K, P> {
    entries: Mutex<HashMap<K, P>>,
}

impl<K, P> Default for PlanCache<K, P> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, P: Clone> PlanCache<K, P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached plan for `key`, computing it with `make` on a miss.
    ///
    /// Failed computations are not cached.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &K,
        make: impl FnOnce() -> Result<P, E>,
    ) -> Result<P, E> {
        if let Some(plan) = self.entries.lock().get(key) {
            return Ok(plan.clone());
        }
        let plan = make()?;
        self.entries.lock().insert(key.clone(), plan.clone());
        Ok(plan)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceData;
    use crate::local::LocalDiscretization;
    use crate::plan::GivenOptions;

    fn given(dev: DeviceData, order: usize) -> PlanGivenData {
        PlanGivenData::new(
            dev,
            &LocalDiscretization::quadrilateral(order),
            GivenOptions::default(),
        )
    }

    #[test]
    fn test_plan_fits_device() {
        let g = given(DeviceData::reference(), 3);
        let plan = make_flux_plan(&g, 1, None, false).unwrap();
        assert!(plan.invalid_reason().is_none());
        assert!(plan.threads() <= g.devdata.max_threads_per_block);
        assert!(plan.shared_mem_use() <= g.devdata.shared_memory_bytes);
        assert_eq!(
            plan.input_dofs_per_block(),
            plan.mbs_per_block * g.microblock.aligned_floats
        );
    }

    #[test]
    fn test_pinned_microblocks() {
        let g = given(DeviceData::reference(), 1);
        let plan = make_flux_plan(&g, 1, Some(3), false).unwrap();
        assert_eq!(plan.mbs_per_block, 3);
    }

    #[test]
    fn test_fluxes_cost_shared_memory() {
        let g = given(DeviceData::reference(), 3);
        let one = FluxGatherPlan::new(g.clone(), 4, 2, 1);
        let many = FluxGatherPlan::new(g.clone(), 4, 2, 8);
        assert!(many.shared_mem_use() > one.shared_mem_use());
        assert!(many.registers() > one.registers());
        assert!(make_flux_plan(&g, 8, None, false).is_ok());
    }

    #[test]
    fn test_no_plan_on_tiny_device() {
        let mut dev = DeviceData::small();
        dev.shared_memory_bytes = 8;
        let g = given(dev, 4);
        assert!(matches!(
            make_flux_plan(&g, 1, None, false),
            Err(ConfigError::NoValidPlan { .. })
        ));
    }

    #[test]
    fn test_cache_memoizes() {
        let cache: PlanCache<usize, usize> = PlanCache::new();
        let mut calls = 0;
        for _ in 0..3 {
            let v = cache
                .get_or_try_insert_with(&7, || -> Result<usize, ()> {
                    calls += 1;
                    Ok(49)
                })
                .unwrap();
            assert_eq!(v, 49);
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.len(), 1);

        let failed: Result<usize, &str> = cache.get_or_try_insert_with(&8, || Err("boom"));
        assert!(failed.is_err());
        assert_eq!(cache.len(), 1);
    }
}
