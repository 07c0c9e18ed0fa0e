use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use spin::Mutex;

use crate::memory::allocators::core::HeapError;
use crate::memory::allocators::free_list::{HeapAllocator, HeapStats};
use crate::registry::Registry;

pub struct LockedHeap {
    inner: Mutex<Option<HeapAllocator>>,
}

impl LockedHeap {
    pub const fn empty() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Builds the allocator over `[start, start + size)`.
    ///
    /// # Safety
    /// The region must be mapped, writable and otherwise unused for the rest
    /// of the kernel's run.
    pub unsafe fn init(&self, start: usize, size: usize) -> Result<(), HeapError> {
        let heap = HeapAllocator::new(start, size)?;
        *self.inner.lock() = Some(heap);
        Ok(())
    }

    pub fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, HeapError> {
        self.with_heap(|heap| heap.allocate_layout(layout))
    }

    /// # Safety
    /// `ptr` must come from `allocate` with the same `layout`.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> Result<(), HeapError> {
        self.with_heap(|heap| heap.deallocate_layout(ptr, layout))
    }

    pub fn stats(&self) -> Option<HeapStats> {
        self.with_heap(|heap| Ok(heap.stats())).ok()
    }

    fn with_heap<R>(&self, f: impl FnOnce(&mut HeapAllocator) -> Result<R, HeapError>) -> Result<R, HeapError> {
        without_interrupts(|| f(self.inner.lock().as_mut().ok_or(HeapError::Uninitialized)?))
    }
}

// A handler that allocates must not spin on the lock held by the task it
// preempted.
#[cfg(not(test))]
fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    x86_64::instructions::interrupts::without_interrupts(f)
}

#[cfg(test)]
fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// `GlobalAlloc` front end. Allocation goes to whichever heap is installed
/// in `registry`; with none installed every request fails.
pub struct ActiveHeap {
    registry: &'static Registry<LockedHeap>,
}

impl ActiveHeap {
    pub const fn new(registry: &'static Registry<LockedHeap>) -> Self {
        Self { registry }
    }
}

unsafe impl GlobalAlloc for ActiveHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        match self.registry.current() {
            Some(heap) => heap
                .allocate(layout)
                .map_or(ptr::null_mut(), NonNull::as_ptr),
            None => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if let (Some(heap), Some(ptr)) = (self.registry.current(), NonNull::new(ptr)) {
            if let Err(err) = heap.deallocate(ptr, layout) {
                println!("heap: dealloc of {:p} failed: {}", ptr, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::vec;

    fn leaked_heap(size: usize) -> &'static LockedHeap {
        let region = vec![0u64; size / 8].leak();
        let heap = Box::leak(Box::new(LockedHeap::empty()));
        unsafe { heap.init(region.as_mut_ptr() as usize, size) }.unwrap();
        heap
    }

    #[test]
    fn test_uninitialized_heap_fails() {
        let heap = LockedHeap::empty();
        let layout = Layout::new::<u64>();
        assert_eq!(heap.allocate(layout).err(), Some(HeapError::Uninitialized));
        assert!(heap.stats().is_none());
    }

    #[test]
    fn test_locked_heap_round_trip() {
        let heap = leaked_heap(4096);
        let layout = Layout::from_size_align(100, 64).unwrap();
        let ptr = heap.allocate(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 64, 0);
        assert_eq!(heap.stats().map(|stats| stats.used_chunks), Some(1));

        unsafe { heap.deallocate(ptr, layout) }.unwrap();
        assert_eq!(heap.stats().map(|stats| stats.free_chunks), Some(1));

        let empty = LockedHeap::empty();
        let stray = NonNull::<u8>::dangling();
        assert_eq!(unsafe { empty.deallocate(stray, layout) }, Err(HeapError::Uninitialized));
    }

    #[test]
    fn test_global_alloc_follows_registry() {
        static REGISTRY: Registry<LockedHeap> = Registry::new();
        let front = ActiveHeap::new(&REGISTRY);
        let layout = Layout::from_size_align(24, 8).unwrap();

        assert!(unsafe { front.alloc(layout) }.is_null());

        let heap = leaked_heap(4096);
        REGISTRY.install(heap);
        let ptr = unsafe { front.alloc(layout) };
        assert!(!ptr.is_null());
        assert_eq!(heap.stats().map(|stats| stats.used_chunks), Some(1));

        unsafe { front.dealloc(ptr, layout) };
        assert_eq!(heap.stats().map(|stats| stats.used_chunks), Some(0));

        assert!(REGISTRY.remove(heap));
        assert!(unsafe { front.alloc(layout) }.is_null());
    }
}
