use core::alloc::Layout;
use core::mem::size_of;
use core::ptr::{self, NonNull};

use crate::memory::allocators::core::{align_down, align_up, is_aligned, validate_region, HeapError};

// ============================================================================
// FIRST-FIT FREE-LIST HEAP
// ============================================================================

/// Payload alignment and size granularity of every chunk.
pub const CHUNK_ALIGN: usize = 16;

/// Bytes taken by the in-band header in front of each payload.
pub const HEADER_SIZE: usize = align_up(size_of::<ChunkHeader>(), CHUNK_ALIGN);

const NIL: usize = usize::MAX;

/// In-band header. `next`/`prev` are offsets from the heap base, not
/// pointers, and never imply ownership: the allocator owns the whole region.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct ChunkHeader {
    next: usize,
    prev: usize,
    size: usize,
    allocated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Header offset from the heap base.
    pub offset: usize,
    /// Usable payload bytes.
    pub size: usize,
    pub allocated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub total: usize,
    pub used: usize,
    pub free: usize,
    pub used_chunks: usize,
    pub free_chunks: usize,
    pub largest_free: usize,
}

/// Manages one contiguous region as a list of chunks that exactly partition
/// it. List neighbours are address neighbours, and no two neighbours are ever
/// both free.
///
/// # Safety
/// - The region handed to `new` must stay valid and otherwise unused for the
///   allocator's lifetime
/// - Not reentrant; callers serialise access (see `LockedHeap`)
#[derive(Debug)]
pub struct HeapAllocator {
    base: usize,
    len: usize,
}

impl HeapAllocator {
    /// Takes over `[start, start + size)`, rounded inward to chunk alignment.
    ///
    /// # Safety
    /// See the type-level contract.
    pub unsafe fn new(start: usize, size: usize) -> Result<Self, HeapError> {
        validate_region(start, size)?;

        let base = align_up(start, CHUNK_ALIGN);
        let len = align_down(size.saturating_sub(base - start), CHUNK_ALIGN);
        if len <= HEADER_SIZE {
            return Err(HeapError::InvalidSize);
        }

        let heap = Self { base, len };
        heap.write(
            0,
            ChunkHeader {
                next: NIL,
                prev: NIL,
                size: len - HEADER_SIZE,
                allocated: false,
            },
        );
        Ok(heap)
    }

    pub fn start(&self) -> usize {
        self.base
    }

    pub fn size(&self) -> usize {
        self.len
    }

    /// First fit: takes the first free chunk strictly larger than `size` and
    /// splits off the tail when it can hold another header plus payload.
    /// Chunk sizes are multiples of `CHUNK_ALIGN`, so a fitting chunk always
    /// covers the rounded request.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, HeapError> {
        if size > self.len {
            return Err(HeapError::OutOfMemory);
        }
        let request = align_up(size.max(1), CHUNK_ALIGN);

        let mut offset = 0;
        while offset != NIL {
            let mut chunk = self.read(offset);
            if !chunk.allocated && chunk.size > size {
                if chunk.size >= request + HEADER_SIZE + 1 {
                    let split = offset + HEADER_SIZE + request;
                    self.write(
                        split,
                        ChunkHeader {
                            next: chunk.next,
                            prev: offset,
                            size: chunk.size - request - HEADER_SIZE,
                            allocated: false,
                        },
                    );
                    if chunk.next != NIL {
                        self.update(chunk.next, |next| next.prev = split);
                    }
                    chunk.next = split;
                    chunk.size = request;
                }
                chunk.allocated = true;
                self.write(offset, chunk);

                let payload = (self.base + offset + HEADER_SIZE) as *mut u8;
                return NonNull::new(payload).ok_or(HeapError::InvalidAddress);
            }
            offset = chunk.next;
        }

        Err(HeapError::OutOfMemory)
    }

    /// Returns a chunk to the list, merging with a free predecessor first and
    /// then with a free successor.
    ///
    /// # Safety
    /// `ptr` must not be used after this call.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) -> Result<(), HeapError> {
        let mut offset = self.chunk_offset(ptr)?;
        let mut chunk = self.read(offset);
        if !chunk.allocated {
            return Err(HeapError::DoubleFree);
        }
        chunk.allocated = false;

        if chunk.prev != NIL {
            let prev = self.read(chunk.prev);
            if !prev.allocated {
                offset = self.absorb_next(chunk.prev, prev, chunk);
                chunk = self.read(offset);
            }
        }

        if chunk.next != NIL {
            let next = self.read(chunk.next);
            if !next.allocated {
                offset = self.absorb_next(offset, chunk, next);
                chunk = self.read(offset);
            }
        }

        self.write(offset, chunk);
        Ok(())
    }

    /// Serves a `Layout`. Alignments above `CHUNK_ALIGN` over-allocate and
    /// keep the chunk's payload address in the word below the aligned block.
    pub fn allocate_layout(&mut self, layout: Layout) -> Result<NonNull<u8>, HeapError> {
        if layout.align() <= CHUNK_ALIGN {
            return self.allocate(layout.size());
        }

        let padded = layout
            .size()
            .checked_add(layout.align())
            .ok_or(HeapError::Overflow)?;
        let raw = self.allocate(padded)?.as_ptr() as usize;
        let aligned = align_up(raw + size_of::<usize>(), layout.align());
        unsafe {
            ((aligned - size_of::<usize>()) as *mut usize).write(raw);
        }
        NonNull::new(aligned as *mut u8).ok_or(HeapError::InvalidAddress)
    }

    /// # Safety
    /// `ptr` must come from `allocate_layout` with the same `layout`.
    pub unsafe fn deallocate_layout(&mut self, ptr: NonNull<u8>, layout: Layout) -> Result<(), HeapError> {
        if layout.align() <= CHUNK_ALIGN {
            return self.free(ptr);
        }
        let slot = (ptr.as_ptr() as usize)
            .checked_sub(size_of::<usize>())
            .ok_or(HeapError::InvalidPointer)?;
        if slot < self.base || slot >= self.base + self.len {
            return Err(HeapError::InvalidPointer);
        }
        let raw = (slot as *const usize).read();
        self.free(NonNull::new(raw as *mut u8).ok_or(HeapError::InvalidPointer)?)
    }

    /// Walks the chunk list in address order.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkInfo> + '_ {
        let mut offset = 0;
        core::iter::from_fn(move || {
            if offset == NIL {
                return None;
            }
            let chunk = self.read(offset);
            let info = ChunkInfo {
                offset,
                size: chunk.size,
                allocated: chunk.allocated,
            };
            offset = chunk.next;
            Some(info)
        })
    }

    pub fn stats(&self) -> HeapStats {
        self.chunks().fold(
            HeapStats {
                total: self.len,
                ..HeapStats::default()
            },
            |mut stats, chunk| {
                if chunk.allocated {
                    stats.used += chunk.size;
                    stats.used_chunks += 1;
                } else {
                    stats.free += chunk.size;
                    stats.free_chunks += 1;
                    stats.largest_free = stats.largest_free.max(chunk.size);
                }
                stats
            },
        )
    }

    /// Folds `next` (the chunk after `offset`) into the chunk at `offset`.
    fn absorb_next(&mut self, offset: usize, mut chunk: ChunkHeader, next: ChunkHeader) -> usize {
        chunk.size += HEADER_SIZE + next.size;
        chunk.next = next.next;
        if next.next != NIL {
            self.update(next.next, |after| after.prev = offset);
        }
        self.write(offset, chunk);
        offset
    }

    /// Maps a payload pointer back to its header offset, accepting only
    /// chunks that are actually on the list.
    fn chunk_offset(&self, ptr: NonNull<u8>) -> Result<usize, HeapError> {
        let address = ptr.as_ptr() as usize;
        let offset = address
            .checked_sub(self.base + HEADER_SIZE)
            .ok_or(HeapError::InvalidPointer)?;
        if offset >= self.len || !is_aligned(offset, CHUNK_ALIGN) {
            return Err(HeapError::InvalidPointer);
        }
        if self.chunks().any(|chunk| chunk.offset == offset) {
            Ok(offset)
        } else {
            Err(HeapError::InvalidPointer)
        }
    }

    fn header(&self, offset: usize) -> *mut ChunkHeader {
        (self.base + offset) as *mut ChunkHeader
    }

    fn read(&self, offset: usize) -> ChunkHeader {
        unsafe { ptr::read(self.header(offset)) }
    }

    fn write(&self, offset: usize, chunk: ChunkHeader) {
        unsafe { ptr::write(self.header(offset), chunk) }
    }

    fn update(&self, offset: usize, f: impl FnOnce(&mut ChunkHeader)) {
        let mut chunk = self.read(offset);
        f(&mut chunk);
        self.write(offset, chunk);
    }
}
