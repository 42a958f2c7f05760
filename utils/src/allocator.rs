use cap::Cap;
use std::alloc;

#[global_allocator]
pub static GLOBAL_ALLOCATOR: Cap<alloc::System> = Cap::new(alloc::System, usize::MAX);

/// Point-in-time view of the capped allocator, backing the `checkmem` and
/// `detectleaks` diagnostics. Allocation beyond the configured limit
/// fails, which the process treats as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReport {
    pub limit: usize,
    pub allocated: usize,
    pub remaining: usize,
}

impl MemoryReport {
    pub fn capture() -> Self {
        Self {
            limit: GLOBAL_ALLOCATOR.limit(),
            allocated: GLOBAL_ALLOCATOR.allocated(),
            remaining: GLOBAL_ALLOCATOR.remaining(),
        }
    }

    /// Bytes still held relative to an earlier snapshot. Anything left
    /// after the owning structures are dropped points at a leak.
    pub fn growth_since(&self, baseline: &MemoryReport) -> usize {
        self.allocated.saturating_sub(baseline.allocated)
    }
}

impl std::fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "[MEMORY REPORT]")?;
        writeln!(f, "Limit: {} bytes", self.limit)?;
        writeln!(f, "Allocated: {} bytes", self.allocated)?;
        write!(f, "Remaining: {} bytes", self.remaining)
    }
}
