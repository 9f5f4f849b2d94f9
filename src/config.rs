//! Configuration for building a GPU discretization.
//!
//! ```
//! use dg_gpu::config::{DebugFlag, DiscretizationConfig, ScalarType};
//!
//! let config = DiscretizationConfig::default()
//!     .with_scalar_type(ScalarType::F32)
//!     .with_debug_flag(DebugFlag::NanCheck);
//! assert!(config.has_debug(DebugFlag::NanCheck));
//! assert_eq!(config.scalar_type.size(), 4);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::optemplate::Expr;

/// Environment variable holding a comma-separated list of debug flags.
pub const DEBUG_ENV_VAR: &str = "DG_GPU_DEBUG";

/// Scalar type used for device-side layout.
///
/// Alignment and byte offsets follow the scalar size. The reference device
/// stores values as `f64` regardless, so layouts computed for `F32` are
/// simply padded more sparsely than a real `f32` device would need.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ScalarType {
    /// 32-bit floats
    #[default]
    F32,
    /// 64-bit floats
    F64,
}

impl ScalarType {
    /// Size of one scalar in bytes.
    pub fn size(self) -> usize {
        match self {
            ScalarType::F32 => 4,
            ScalarType::F64 => 8,
        }
    }
}

/// Debug switches. Checks behind these flags are expensive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DebugFlag {
    /// Recompute index lists on registry hits and compare.
    VerifyIndexLists,
    /// Scan every computed vector for NaNs.
    NanCheck,
    /// One element per microblock.
    NoMicroblock,
    /// Log every candidate considered during plan search.
    PlanLog,
    /// Log pool allocations.
    MemoryLog,
}

impl DebugFlag {
    /// All flags, in declaration order.
    pub const ALL: [DebugFlag; 5] = [
        DebugFlag::VerifyIndexLists,
        DebugFlag::NanCheck,
        DebugFlag::NoMicroblock,
        DebugFlag::PlanLog,
        DebugFlag::MemoryLog,
    ];

    /// Name used in `DG_GPU_DEBUG`.
    pub fn name(self) -> &'static str {
        match self {
            DebugFlag::VerifyIndexLists => "verify_index_lists",
            DebugFlag::NanCheck => "nan_check",
            DebugFlag::NoMicroblock => "no_microblock",
            DebugFlag::PlanLog => "plan_log",
            DebugFlag::MemoryLog => "memory_log",
        }
    }
}

impl fmt::Display for DebugFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DebugFlag {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DebugFlag::ALL
            .iter()
            .copied()
            .find(|flag| flag.name() == s.trim())
            .ok_or_else(|| ConfigError::UnknownDebugFlag(s.trim().to_string()))
    }
}

/// Parse a comma-separated debug flag list. Empty entries are skipped.
pub fn parse_debug_flags(list: &str) -> Result<BTreeSet<DebugFlag>, ConfigError> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(DebugFlag::from_str)
        .collect()
}

/// Configuration for [`crate::discretization::Discretization`].
#[derive(Clone, Debug)]
pub struct DiscretizationConfig {
    /// Scalar type used for layout.
    pub scalar_type: ScalarType,
    /// Enabled debug checks.
    pub debug: BTreeSet<DebugFlag>,
    /// Operator template the flux plan is tuned for.
    pub tune_for: Option<Expr>,
    /// Device memory pool capacity in bytes (None = device total memory).
    pub device_pool_bytes: Option<usize>,
    /// Page-locked host pool capacity in bytes (None = unbounded).
    pub pagelocked_pool_bytes: Option<usize>,
    /// Number of streams created up front.
    pub initial_streams: usize,
    /// Collect per-instruction statistics during execution.
    pub instrumented: bool,
    /// Compile element-wise assignments into fused vector programs.
    pub vectorize: bool,
}

impl Default for DiscretizationConfig {
    fn default() -> Self {
        Self {
            scalar_type: ScalarType::F64,
            debug: BTreeSet::new(),
            tune_for: None,
            device_pool_bytes: None,
            pagelocked_pool_bytes: None,
            initial_streams: 0,
            instrumented: true,
            vectorize: false,
        }
    }
}

impl DiscretizationConfig {
    /// Default configuration with debug flags taken from `DG_GPU_DEBUG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(list) = std::env::var(DEBUG_ENV_VAR) {
            config.debug = parse_debug_flags(&list)?;
        }
        Ok(config)
    }

    /// Set the layout scalar type.
    pub fn with_scalar_type(mut self, scalar_type: ScalarType) -> Self {
        self.scalar_type = scalar_type;
        self
    }

    /// Enable a debug flag.
    pub fn with_debug_flag(mut self, flag: DebugFlag) -> Self {
        self.debug.insert(flag);
        self
    }

    /// Tune the flux plan for this operator template.
    ///
    /// Without it, the flux plan assumes a single flux per batch.
    pub fn with_tune_for(mut self, template: Expr) -> Self {
        self.tune_for = Some(template);
        self
    }

    /// Limit the device memory pool.
    pub fn with_device_pool_bytes(mut self, bytes: usize) -> Self {
        self.device_pool_bytes = Some(bytes);
        self
    }

    /// Limit the page-locked host pool.
    pub fn with_pagelocked_pool_bytes(mut self, bytes: usize) -> Self {
        self.pagelocked_pool_bytes = Some(bytes);
        self
    }

    /// Pre-create streams in the stream pool.
    pub fn with_initial_streams(mut self, n: usize) -> Self {
        self.initial_streams = n;
        self
    }

    /// Enable or disable execution statistics.
    pub fn with_instrumentation(mut self, enable: bool) -> Self {
        self.instrumented = enable;
        self
    }

    /// Fuse element-wise assignments when compiling.
    pub fn with_vectorize(mut self, vectorize: bool) -> Self {
        self.vectorize = vectorize;
        self
    }

    /// Check whether a debug flag is enabled.
    pub fn has_debug(&self, flag: DebugFlag) -> bool {
        self.debug.contains(&flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_debug_flags() {
        let flags = parse_debug_flags("nan_check, plan_log,,").unwrap();
        assert_eq!(flags.len(), 2);
        assert!(flags.contains(&DebugFlag::NanCheck));
        assert!(flags.contains(&DebugFlag::PlanLog));
    }

    #[test]
    fn test_unknown_flag() {
        let err = parse_debug_flags("nan_check,bogus").unwrap_err();
        assert_eq!(err, ConfigError::UnknownDebugFlag("bogus".into()));
    }

    #[test]
    fn test_flag_names_round_trip() {
        for flag in DebugFlag::ALL {
            assert_eq!(flag.name().parse::<DebugFlag>().unwrap(), flag);
        }
    }

    #[test]
    fn test_builder() {
        let config = DiscretizationConfig::default()
            .with_device_pool_bytes(1024)
            .with_initial_streams(2)
            .with_instrumentation(false);
        assert_eq!(config.device_pool_bytes, Some(1024));
        assert_eq!(config.initial_streams, 2);
        assert!(!config.instrumented);
        assert_eq!(config.scalar_type, ScalarType::F64);
    }
}
