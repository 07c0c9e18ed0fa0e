//! Core utilities and error types for allocators

use core::fmt;

// ============================================================================
// UTILITY FUNCTIONS
// ============================================================================

#[inline]
pub(crate) const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

#[inline]
pub(crate) const fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

#[inline]
pub(crate) fn is_aligned(addr: usize, align: usize) -> bool {
    addr & (align - 1) == 0
}

/// Validates that a memory region is safe to use
pub(crate) fn validate_region(start: usize, size: usize) -> Result<(), HeapError> {
    if start == 0 {
        return Err(HeapError::InvalidAddress);
    }
    if size == 0 {
        return Err(HeapError::InvalidSize);
    }
    start.checked_add(size).ok_or(HeapError::Overflow)?;
    Ok(())
}

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// No free chunk is large enough.
    OutOfMemory,
    InvalidAddress,
    /// Region too small to hold a single chunk.
    InvalidSize,
    Overflow,
    /// No allocator has been initialized.
    Uninitialized,
    /// Pointer was not handed out by this allocator.
    InvalidPointer,
    DoubleFree,
}

impl HeapError {
    pub fn description(&self) -> &'static str {
        match self {
            HeapError::OutOfMemory => "out of memory",
            HeapError::InvalidAddress => "invalid region address",
            HeapError::InvalidSize => "invalid region size",
            HeapError::Overflow => "region wraps the address space",
            HeapError::Uninitialized => "heap is not initialized",
            HeapError::InvalidPointer => "pointer does not belong to the heap",
            HeapError::DoubleFree => "chunk is already free",
        }
    }
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_helpers() {
        assert_eq!(align_up(17, 16), 32);
        assert_eq!(align_up(32, 16), 32);
        assert_eq!(align_down(31, 16), 16);
        assert!(is_aligned(64, 16));
        assert!(!is_aligned(65, 16));
    }

    #[test]
    fn test_validate_region() {
        assert_eq!(validate_region(0, 10), Err(HeapError::InvalidAddress));
        assert_eq!(validate_region(0x1000, 0), Err(HeapError::InvalidSize));
        assert_eq!(validate_region(usize::MAX, 2), Err(HeapError::Overflow));
        assert_eq!(validate_region(0x1000, 0x1000), Ok(()));
    }
}
