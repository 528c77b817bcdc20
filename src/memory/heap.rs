//! Heap allocator layered on the buddy frame allocator, plus the `GlobalAlloc` wiring.
//!
//! Grounded on `kernel/heap.c`: a block header holding just `size` precedes every block's
//! payload; while a block is free, its payload's first two words double as `next`/`prev` of an
//! address-sorted singly-linked free list (a union in the original, a raw-pointer reinterpret
//! here). First-fit with splitting; growth by whole frame-allocator chunks of
//! `max(requested, PAGE_GROWTH)` pages. Per `spec.md` §4.D the source does not coalesce on
//! free — this implementation does, since the spec marks coalescing a conformance-preserving
//! refinement and `SPEC_FULL.md` recommends it.

use core::alloc::{GlobalAlloc, Layout};
use core::mem;
use core::ptr::NonNull;

use spin::Mutex;

const PAGE_GROWTH: usize = 16;
const PAGE_SIZE: usize = 4096;

/// Source of whole-page chunks for the heap to grow into. Implemented by the real buddy
/// allocator in the running kernel; swappable for a host-backed fake in tests.
pub trait ChunkSource {
    fn alloc_chunk(&mut self, size: usize) -> Option<NonNull<u8>>;
}

/// The header preceding every block, free or allocated.
#[repr(C)]
struct BlockHeader {
    size: usize,
}

/// The link fields occupying a free block's payload, right after its header.
#[repr(C)]
struct FreeLinks {
    next: Option<NonNull<BlockHeader>>,
    prev: Option<NonNull<BlockHeader>>,
}

const HEADER_SIZE: usize = mem::size_of::<BlockHeader>();
const MIN_ALLOC_SIZE: usize = mem::size_of::<FreeLinks>();

unsafe fn links(block: NonNull<BlockHeader>) -> *mut FreeLinks {
    (block.as_ptr() as *mut u8).add(HEADER_SIZE) as *mut FreeLinks
}

unsafe fn payload(block: NonNull<BlockHeader>) -> *mut u8 {
    (block.as_ptr() as *mut u8).add(HEADER_SIZE)
}

unsafe fn header_of(payload: *mut u8) -> NonNull<BlockHeader> {
    NonNull::new_unchecked(payload.sub(HEADER_SIZE) as *mut BlockHeader)
}

pub struct Heap<S: ChunkSource> {
    source: S,
    free_blocks: Option<NonNull<BlockHeader>>,
}

unsafe impl<S: ChunkSource + Send> Send for Heap<S> {}

impl<S: ChunkSource> Heap<S> {
    /// `new(source)`: take one multi-page chunk, lay out a single free block spanning it.
    pub fn new(mut source: S) -> Option<Self> {
        let size = PAGE_GROWTH * PAGE_SIZE;
        let chunk = source.alloc_chunk(size)?;
        let block = chunk.as_ptr() as *mut BlockHeader;
        unsafe {
            (*block).size = size - HEADER_SIZE;
            let block = NonNull::new_unchecked(block);
            (*links(block)).next = None;
            (*links(block)).prev = None;
        }
        Some(Heap { source, free_blocks: NonNull::new(block) })
    }

    fn new_free_block(&self, raw: *mut u8, payload_size: usize) -> NonNull<BlockHeader> {
        unsafe {
            let block = raw as *mut BlockHeader;
            (*block).size = payload_size;
            NonNull::new_unchecked(block)
        }
    }

    fn insert_sorted(&mut self, block: NonNull<BlockHeader>) {
        unsafe {
            let mut cursor = self.free_blocks;
            let mut prev: Option<NonNull<BlockHeader>> = None;

            while let Some(c) = cursor {
                if c.as_ptr() as usize > block.as_ptr() as usize {
                    break;
                }
                prev = Some(c);
                cursor = (*links(c)).next;
            }

            (*links(block)).prev = prev;
            (*links(block)).next = cursor;

            if let Some(c) = cursor {
                (*links(c)).prev = Some(block);
            }
            match prev {
                Some(p) => (*links(p)).next = Some(block),
                None => self.free_blocks = Some(block),
            }

            self.try_coalesce(block);
        }
    }

    /// Merge `block` with its immediate free-list neighbours if they are adjacent in memory.
    unsafe fn try_coalesce(&mut self, block: NonNull<BlockHeader>) {
        if let Some(next) = (*links(block)).next {
            let end = block.as_ptr() as usize + HEADER_SIZE + (*block.as_ptr()).size;
            if end == next.as_ptr() as usize {
                (*block.as_ptr()).size += HEADER_SIZE + (*next.as_ptr()).size;
                let next_next = (*links(next)).next;
                (*links(block)).next = next_next;
                if let Some(nn) = next_next {
                    (*links(nn)).prev = Some(block);
                }
            }
        }
        if let Some(prev) = (*links(block)).prev {
            let end = prev.as_ptr() as usize + HEADER_SIZE + (*prev.as_ptr()).size;
            if end == block.as_ptr() as usize {
                (*prev.as_ptr()).size += HEADER_SIZE + (*block.as_ptr()).size;
                let next = (*links(block)).next;
                (*links(prev)).next = next;
                if let Some(n) = next {
                    (*links(n)).prev = Some(prev);
                }
            }
        }
    }

    fn unlink(&mut self, block: NonNull<BlockHeader>) {
        unsafe {
            let prev = (*links(block)).prev;
            let next = (*links(block)).next;
            match prev {
                Some(p) => (*links(p)).next = next,
                None => self.free_blocks = next,
            }
            if let Some(n) = next {
                (*links(n)).prev = prev;
            }
        }
    }

    /// `malloc(n)`: first-fit with splitting; grows via the chunk source on exhaustion.
    pub fn malloc(&mut self, bytes: usize) -> *mut u8 {
        let bytes = core::cmp::max(bytes, MIN_ALLOC_SIZE);

        let mut cursor = self.free_blocks;
        loop {
            let block = match cursor {
                Some(b) => b,
                None => {
                    let num_pages = core::cmp::max((bytes + PAGE_SIZE - 1) / PAGE_SIZE + 1, PAGE_GROWTH);
                    let size = num_pages * PAGE_SIZE;
                    let chunk = match self.source.alloc_chunk(size) {
                        Some(c) => c,
                        None => return core::ptr::null_mut(),
                    };
                    let new_block = self.new_free_block(chunk.as_ptr(), size - HEADER_SIZE);
                    unsafe {
                        (*links(new_block)).next = None;
                        (*links(new_block)).prev = None;
                    }
                    self.insert_sorted(new_block);
                    self.free_blocks.unwrap()
                }
            };

            unsafe {
                let block_size = (*block.as_ptr()).size;
                if block_size >= bytes + HEADER_SIZE + MIN_ALLOC_SIZE {
                    // split: keep `bytes` in this block, carve a new free block from the rest.
                    let next = (*links(block)).next;
                    let prev = (*links(block)).prev;

                    let remainder_raw = payload(block).add(bytes);
                    let remainder_size = block_size - bytes - HEADER_SIZE;
                    let remainder = self.new_free_block(remainder_raw, remainder_size);
                    (*links(remainder)).next = next;
                    (*links(remainder)).prev = prev;
                    if let Some(n) = next {
                        (*links(n)).prev = Some(remainder);
                    }
                    match prev {
                        Some(p) => (*links(p)).next = Some(remainder),
                        None => self.free_blocks = Some(remainder),
                    }

                    (*block.as_ptr()).size = bytes;
                    return payload(block);
                } else if block_size >= bytes {
                    // take whole block
                    self.unlink(block);
                    return payload(block);
                } else {
                    cursor = (*links(block)).next;
                }
            }
        }
    }

    /// `free(p)`: no-op on null; otherwise insert in address order and coalesce neighbours.
    pub fn free(&mut self, p: *mut u8) {
        if p.is_null() {
            return;
        }
        unsafe {
            let block = header_of(p);
            (*links(block)).next = None;
            (*links(block)).prev = None;
            self.insert_sorted(block);
        }
    }
}

/// `GlobalAlloc` wrapper: stores the real `Heap` behind a spinlock so the crate can expose it as
/// `#[global_allocator]`.
pub struct KernelAllocator<S: ChunkSource> {
    inner: Mutex<Option<Heap<S>>>,
}

impl<S: ChunkSource> KernelAllocator<S> {
    pub const fn new() -> Self {
        KernelAllocator { inner: Mutex::new(None) }
    }

    pub fn init(&self, source: S) {
        *self.inner.lock() = Heap::new(source);
    }
}

unsafe impl<S: ChunkSource + Send> GlobalAlloc for KernelAllocator<S> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let mut guard = self.inner.lock();
        match guard.as_mut() {
            Some(heap) => heap.malloc(layout.size()),
            None => core::ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let mut guard = self.inner.lock();
        if let Some(heap) = guard.as_mut() {
            heap.free(ptr);
        }
    }
}

/// Called from the `#[alloc_error_handler]`: out-of-memory at the heap is always fatal at this
/// layer (callers above decide whether OOM is recoverable; here there is nowhere left to go).
pub fn oom(layout: Layout) -> ! {
    panic!("kernel heap out of memory: {:?}", layout);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::alloc::{alloc as sys_alloc, Layout as SysLayout};

    struct HostChunkSource;

    impl ChunkSource for HostChunkSource {
        fn alloc_chunk(&mut self, size: usize) -> Option<NonNull<u8>> {
            let layout = SysLayout::from_size_align(size, PAGE_SIZE).unwrap();
            let ptr = unsafe { sys_alloc(layout) };
            NonNull::new(ptr)
        }
    }

    #[test]
    fn disjoint_interleaved_allocations() {
        let mut heap = Heap::new(HostChunkSource).unwrap();
        let sizes = [147usize, 55, 23, 31, 9, 21, 5];
        let temp_sizes = [71usize, 3, 39, 12];

        let surviving: alloc::vec::Vec<(*mut u8, usize)> =
            sizes.iter().map(|&s| (heap.malloc(s), s)).collect();
        let temps: alloc::vec::Vec<(*mut u8, usize)> =
            temp_sizes.iter().map(|&s| (heap.malloc(s), s)).collect();

        heap.free(temps[1].0);
        heap.free(temps[2].0);
        heap.free(temps[0].0);
        heap.free(temps[3].0);

        for i in 0..surviving.len() {
            for j in (i + 1)..surviving.len() {
                let (a, asz) = surviving[i];
                let (b, bsz) = surviving[j];
                let (a, b) = (a as usize, b as usize);
                assert!(a + asz <= b || b + bsz <= a, "overlap between block {} and {}", i, j);
            }
        }
    }

    #[test]
    fn free_of_null_is_noop() {
        let mut heap = Heap::new(HostChunkSource).unwrap();
        heap.free(core::ptr::null_mut());
    }
}
