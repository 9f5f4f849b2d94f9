//! Kernel execution plans and the search that picks them.
//!
//! A plan fixes the launch geometry of one kernel family (threads, shared
//! memory, registers). Candidates are generated from the
//! [`PlanGivenData`] constants, checked against the device limits and
//! ranked by [`ExecutionPlan::score`]; [`optimize_plan`] keeps the best.

mod flux;
mod given;
mod local;

use std::fmt;

use tracing::debug;

use crate::device::DeviceData;
use crate::error::ConfigError;

pub use flux::{make_flux_plan, FluxGatherPlan, FluxPlanKey, PlanCache};
pub use given::{GivenOptions, MicroblockInfo, PlanGivenData};
pub use local::{make_diff_plan, make_element_local_plan, DiffPlan, ElementLocalPlan, Parallelism};

/// Which resource bounds the number of resident thread blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OccupancyLimit {
    Device,
    Warps,
    SharedMemory,
    Registers,
}

/// Resident thread blocks and warp occupancy of a launch configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OccupancyRecord {
    pub tb_per_mp: usize,
    pub warps_per_block: usize,
    pub limit: OccupancyLimit,
    /// Resident warps over the maximum, in `[0, 1]`.
    pub occupancy: f64,
}

impl OccupancyRecord {
    pub fn new(devdata: &DeviceData, threads: usize, shared_mem: usize, registers: usize) -> Self {
        let warps_per_block = threads.div_ceil(devdata.warp_size).max(1);
        let limits = [
            (devdata.thread_blocks_per_mp, OccupancyLimit::Device),
            (devdata.max_warps_per_mp() / warps_per_block, OccupancyLimit::Warps),
            (
                devdata.shared_memory_bytes / shared_mem.max(1),
                OccupancyLimit::SharedMemory,
            ),
            (
                devdata.registers_per_block / registers.max(1),
                OccupancyLimit::Registers,
            ),
        ];
        let (tb_per_mp, limit) = limits
            .iter()
            .copied()
            .min_by_key(|(n, _)| *n)
            .unwrap_or((0, OccupancyLimit::Device));

        let occupancy =
            (tb_per_mp * warps_per_block) as f64 / devdata.max_warps_per_mp().max(1) as f64;
        Self {
            tb_per_mp,
            warps_per_block,
            limit,
            occupancy: occupancy.min(1.0),
        }
    }
}

/// A candidate launch configuration for one kernel family.
pub trait ExecutionPlan: fmt::Display {
    fn given(&self) -> &PlanGivenData;

    /// Threads per thread block.
    fn threads(&self) -> usize;

    /// Shared memory per thread block, in bytes.
    fn shared_mem_use(&self) -> usize;

    /// Registers per thread block.
    fn registers(&self) -> usize;

    /// Fraction of launched work that is useful, in `(0, 1]`.
    fn efficiency(&self) -> f64 {
        1.0
    }

    /// Why this plan cannot run on the device, if it cannot.
    fn invalid_reason(&self) -> Option<String> {
        let dev = &self.given().devdata;
        if self.threads() == 0 {
            return Some("zero threads".into());
        }
        if self.threads() > dev.max_threads_per_block {
            return Some(format!(
                "too many threads: {} > {}",
                self.threads(),
                dev.max_threads_per_block
            ));
        }
        if self.shared_mem_use() > dev.shared_memory_bytes {
            return Some(format!(
                "too much shared memory: {} > {}",
                self.shared_mem_use(),
                dev.shared_memory_bytes
            ));
        }
        if self.registers() > dev.registers_per_block {
            return Some(format!(
                "too many registers: {} > {}",
                self.registers(),
                dev.registers_per_block
            ));
        }
        None
    }

    fn occupancy_record(&self) -> OccupancyRecord {
        OccupancyRecord::new(
            &self.given().devdata,
            self.threads(),
            self.shared_mem_use(),
            self.registers(),
        )
    }

    /// Higher is better.
    fn score(&self) -> f64 {
        self.occupancy_record().occupancy * self.efficiency()
    }
}

/// Pick the best valid plan. The first candidate wins ties.
///
/// # Arguments
///
/// * `kind` - Plan family name used in logs and errors
/// * `candidates` - Plans in generation order
/// * `log` - Log every candidate with its score or rejection reason
pub fn optimize_plan<P, I>(kind: &'static str, candidates: I, log: bool) -> Result<P, ConfigError>
where
    P: ExecutionPlan,
    I: IntoIterator<Item = P>,
{
    let mut best: Option<(f64, P)> = None;
    let mut last_reason = String::from("no candidates generated");
    let mut considered = 0usize;

    for plan in candidates {
        considered += 1;
        if let Some(reason) = plan.invalid_reason() {
            if log {
                debug!(kind, %plan, %reason, "plan rejected");
            }
            last_reason = reason;
            continue;
        }

        let score = plan.score();
        if log {
            debug!(kind, %plan, score, "plan candidate");
        }
        match &best {
            Some((best_score, _)) if score <= *best_score => {}
            _ => best = Some((score, plan)),
        }
    }

    match best {
        Some((score, plan)) => {
            debug!(kind, %plan, score, considered, "plan chosen");
            Ok(plan)
        }
        None => Err(ConfigError::NoValidPlan {
            kind,
            reason: last_reason,
        }),
    }
}
