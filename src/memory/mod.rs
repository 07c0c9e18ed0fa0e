use bootloader_api::info::{MemoryRegion, MemoryRegionKind};
use bootloader_api::BootInfo;

pub mod allocators;

use crate::config::{HEAP_TAIL_RESERVE, LOW_MEMORY_LIMIT};
use crate::registry::Registry;
use allocators::{HeapError, LockedHeap};

/// The kernel heap.
pub static HEAP: LockedHeap = LockedHeap::empty();

/// Heap backing `alloc`. Empty until `init_heap` installs [`HEAP`].
pub static ACTIVE_HEAP: Registry<LockedHeap> = Registry::new();

/// Largest usable physical range above the low megabyte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpperMemory {
    pub start: u64,
    pub kib: u64,
}

pub fn upper_memory(regions: &[MemoryRegion]) -> Option<UpperMemory> {
    regions
        .iter()
        .filter(|region| region.kind == MemoryRegionKind::Usable)
        .filter_map(|region| {
            let start = region.start.max(LOW_MEMORY_LIMIT);
            (region.end > start).then(|| (start, region.end - start))
        })
        .max_by_key(|&(_, size)| size)
        .map(|(start, size)| UpperMemory {
            start,
            kib: size / 1024,
        })
}

/// Virtual range the heap is built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapRegion {
    pub start: usize,
    pub size: usize,
}

impl HeapRegion {
    /// Covers `upper` through the physical-memory mapping at `physical_offset`,
    /// minus the tail reserve.
    pub fn from_upper_memory(upper: UpperMemory, physical_offset: u64) -> Result<Self, HeapError> {
        let bytes = usize::try_from(upper.kib)
            .ok()
            .and_then(|kib| kib.checked_mul(1024))
            .ok_or(HeapError::Overflow)?;
        let size = bytes
            .checked_sub(HEAP_TAIL_RESERVE)
            .filter(|&size| size > 0)
            .ok_or(HeapError::InvalidSize)?;
        let start = physical_offset
            .checked_add(upper.start)
            .and_then(|start| usize::try_from(start).ok())
            .ok_or(HeapError::Overflow)?;
        Ok(Self { start, size })
    }
}

/// Builds [`HEAP`] over the boot-reported upper memory and makes it the
/// allocator behind `alloc`.
///
/// # Safety
/// Must run once, before anything allocates, with the bootloader's physical
/// memory mapping in place.
pub unsafe fn init_heap(boot_info: &BootInfo) -> Result<HeapRegion, &'static str> {
    let physical_offset = boot_info
        .physical_memory_offset
        .into_option()
        .ok_or("Physical memory is not mapped")?;
    let upper = upper_memory(&boot_info.memory_regions).ok_or("No usable memory found")?;
    let region = HeapRegion::from_upper_memory(upper, physical_offset)
        .map_err(|err| err.description())?;

    HEAP.init(region.start, region.size)
        .map_err(|err| err.description())?;
    ACTIVE_HEAP.install(&HEAP);
    Ok(region)
}

pub fn memory_stats() {
    match HEAP.stats() {
        Some(stats) => println!(
            "Heap: {} KiB total, {} KiB used in {} chunks, {} KiB free (largest {} KiB)",
            stats.total / 1024,
            stats.used / 1024,
            stats.used_chunks,
            stats.free / 1024,
            stats.largest_free / 1024
        ),
        None => println!("Heap: not initialized"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(start: u64, end: u64, kind: MemoryRegionKind) -> MemoryRegion {
        MemoryRegion { start, end, kind }
    }

    #[test]
    fn test_picks_largest_usable_region_above_1mib() {
        let regions = [
            region(0, 0x9_F000, MemoryRegionKind::Usable),
            region(0x10_0000, 0x40_0000, MemoryRegionKind::Bootloader),
            region(0x40_0000, 0x80_0000, MemoryRegionKind::Usable),
            region(0x80_0000, 0x2000_0000, MemoryRegionKind::Usable),
            region(0x2000_0000, 0x4000_0000, MemoryRegionKind::UnknownBios(2)),
        ];
        assert_eq!(
            upper_memory(&regions),
            Some(UpperMemory {
                start: 0x80_0000,
                kib: (0x2000_0000 - 0x80_0000) / 1024,
            })
        );
    }

    #[test]
    fn test_low_memory_is_clipped() {
        let regions = [region(0x8_0000, 0x30_0000, MemoryRegionKind::Usable)];
        assert_eq!(
            upper_memory(&regions),
            Some(UpperMemory {
                start: LOW_MEMORY_LIMIT,
                kib: 2048,
            })
        );
        let low_only = [region(0x1000, 0x9_F000, MemoryRegionKind::Usable)];
        assert_eq!(upper_memory(&low_only), None);
    }

    #[test]
    fn test_heap_region_leaves_tail_reserve() {
        let upper = UpperMemory {
            start: 0x10_0000,
            kib: 4096,
        };
        let region = HeapRegion::from_upper_memory(upper, 0xFFFF_8000_0000_0000).unwrap();
        assert_eq!(region.start, 0xFFFF_8000_0010_0000);
        assert_eq!(region.size, 4096 * 1024 - HEAP_TAIL_RESERVE);

        let tiny = UpperMemory {
            start: 0x10_0000,
            kib: 10,
        };
        assert_eq!(
            HeapRegion::from_upper_memory(tiny, 0),
            Err(HeapError::InvalidSize)
        );
    }
}
