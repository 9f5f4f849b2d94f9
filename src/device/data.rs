//! Device capability description.
//!
//! Everything the planner needs to know about the target device. The
//! presets describe a mid-range device and a deliberately tiny one that
//! forces plan search to reject most candidates.

/// Resource limits and alignment constants of a device.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceData {
    /// Threads per warp
    pub warp_size: usize,
    /// Global memory alignment in bytes
    pub align_bytes: usize,
    /// Max threads in one thread block
    pub max_threads_per_block: usize,
    /// Max resident threads on one multiprocessor
    pub max_threads_per_mp: usize,
    /// Shared memory available to one thread block, in bytes
    pub shared_memory_bytes: usize,
    /// Registers available to one thread block
    pub registers_per_block: usize,
    /// Number of multiprocessors
    pub multiprocessor_count: usize,
    /// Global memory size in bytes
    pub total_memory_bytes: usize,
    /// Max resident thread blocks on one multiprocessor
    pub thread_blocks_per_mp: usize,
}

impl DeviceData {
    /// A mid-range device.
    pub fn reference() -> Self {
        Self {
            warp_size: 32,
            align_bytes: 64,
            max_threads_per_block: 512,
            max_threads_per_mp: 1024,
            shared_memory_bytes: 16 * 1024,
            registers_per_block: 16 * 1024,
            multiprocessor_count: 16,
            total_memory_bytes: 1 << 30,
            thread_blocks_per_mp: 8,
        }
    }

    /// A small device with tight limits.
    pub fn small() -> Self {
        Self {
            warp_size: 8,
            align_bytes: 16,
            max_threads_per_block: 64,
            max_threads_per_mp: 128,
            shared_memory_bytes: 2 * 1024,
            registers_per_block: 2 * 1024,
            multiprocessor_count: 2,
            total_memory_bytes: 1 << 20,
            thread_blocks_per_mp: 2,
        }
    }

    /// Alignment expressed in words of `word_size` bytes.
    pub fn alignment_words(&self, word_size: usize) -> usize {
        (self.align_bytes / word_size).max(1)
    }

    /// Round `n` words of `word_size` bytes up to the device alignment.
    pub fn align_words(&self, n: usize, word_size: usize) -> usize {
        n.div_ceil(self.alignment_words(word_size)) * self.alignment_words(word_size)
    }

    /// Round a byte count up to the device alignment.
    pub fn align_bytes(&self, bytes: usize) -> usize {
        bytes.div_ceil(self.align_bytes) * self.align_bytes
    }

    /// Max resident warps on one multiprocessor.
    pub fn max_warps_per_mp(&self) -> usize {
        self.max_threads_per_mp / self.warp_size
    }
}

impl Default for DeviceData {
    fn default() -> Self {
        Self::reference()
    }
}
