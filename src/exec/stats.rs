//! Per-instruction-kind execution counters.

use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;

/// Counters for one instruction kind.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct KindStats {
    pub count: usize,
    /// Estimated floating point operations.
    pub flops: u64,
    pub wall_time: Duration,
}

/// Counters keyed by instruction kind, in first-seen order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionStats {
    kinds: IndexMap<&'static str, KindStats>,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: &'static str, flops: u64, wall_time: Duration) {
        let entry = self.kinds.entry(kind).or_default();
        entry.count += 1;
        entry.flops += flops;
        entry.wall_time += wall_time;
    }

    pub fn get(&self, kind: &str) -> Option<&KindStats> {
        self.kinds.get(kind)
    }

    pub fn total_flops(&self) -> u64 {
        self.kinds.values().map(|k| k.flops).sum()
    }

    pub fn total_time(&self) -> Duration {
        self.kinds.values().map(|k| k.wall_time).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &KindStats)> {
        self.kinds.iter().map(|(k, v)| (*k, v))
    }

    pub fn clear(&mut self) {
        self.kinds.clear();
    }
}

impl fmt::Display for ExecutionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (kind, stats) in &self.kinds {
            writeln!(
                f,
                "{kind:>14}: {:>6} calls {:>12} flops {:>10.3} ms",
                stats.count,
                stats.flops,
                stats.wall_time.as_secs_f64() * 1e3
            )?;
        }
        Ok(())
    }
}
