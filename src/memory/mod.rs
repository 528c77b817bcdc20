//! Memory subsystem wiring: reconciles the BIOS memory map (A), brings up the buddy frame
//! allocator (B) over it, brings up paging (C) using the frame allocator as a page-table frame
//! source, and finally the heap (D) growing through paging's permanent window.
//!
//! Grounded on `kernel/memory.c`'s `memory_init`, which performs exactly this A→B→C→D sequence
//! and wires `mem_info`/`classify` from the map straight into the frame allocator, and the
//! global-singleton pattern `spec.md` §9 prescribes for the frame allocator/paging/heap: each is
//! a `Mutex<Option<_>>`, guarded by a preempt-disable in the allocator's own `lock`/`unlock`
//! hooks rather than ambient mutability.

pub mod e820;
pub mod frames;
pub mod heap;
pub mod paging;

use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::config;
use crate::sched;
use e820::{BlockKind, MemoryMap, RawRegion};
use frames::{BuddyAllocator, FrameAccess, FrameNode, PhysAddr};
use paging::{FrameSource, PagingImpl, VirtAddr};

static PAGING: Mutex<Option<PagingImpl>> = Mutex::new(None);
static FRAMES: Mutex<Option<BuddyAllocator<KernelFrameAccess>>> = Mutex::new(None);
static PAGING_ENABLED: AtomicBool = AtomicBool::new(false);

/// `FrameAccess` for the live kernel: frames inside the identity window (including every frame
/// touched before `paging::init` runs, since paging is off and every physical address is
/// directly addressable) are reached with a raw pointer; frames beyond it go through the
/// paging subsystem's temp-mapping window, entering and leaving the mapping for the duration of
/// the closure exactly as `spec.md` §9's `with_mapped` design note requires.
pub struct KernelFrameAccess;

impl FrameAccess for KernelFrameAccess {
    fn with_mapped<R>(&mut self, addr: PhysAddr, f: impl FnOnce(&mut FrameNode) -> R) -> R {
        if !PAGING_ENABLED.load(Ordering::Acquire) || addr < config::KERNEL_ID_END as u64 {
            let ptr = addr as u32 as *mut FrameNode;
            unsafe { f(&mut *ptr) }
        } else {
            let mut guard = PAGING.lock();
            let pg = guard.as_mut().expect("paging not initialized");
            let virt: VirtAddr = pg.map_temp(addr);
            let result = unsafe { f(&mut *(virt as *mut FrameNode)) };
            pg.unmap_temp(virt);
            result
        }
    }
}

/// Adapts the live `FRAMES` allocator to paging's `FrameSource`, for the handful of page-table
/// frames `paging::init`/`map_perm` need during bring-up (all allocated while paging is still
/// off, so the identity-window assumption in `KernelFrameAccess` holds for them too).
struct FramesAsSource;

impl FrameSource for FramesAsSource {
    fn alloc_frame(&mut self) -> PhysAddr {
        let mut guard = FRAMES.lock();
        let frames = guard.as_mut().expect("frame allocator not initialized");
        frames.alloc(paging::PAGE_SIZE as u64).expect("out of memory allocating a page-table frame")
    }
}

/// `heap::ChunkSource` backed by the frame allocator and the paging permanent window: the heap
/// asks for whole pages, `memory` turns that into a buddy allocation sized to the nearest power
/// of two and maps it permanently so the heap can address it with ordinary pointers.
pub struct KernelChunkSource;

impl heap::ChunkSource for KernelChunkSource {
    fn alloc_chunk(&mut self, size: usize) -> Option<core::ptr::NonNull<u8>> {
        sched::disable_preemption();
        let phys = {
            let mut guard = FRAMES.lock();
            let frames = guard.as_mut()?;
            frames.alloc(size as u64)
        };
        let result = phys.map(|p| {
            let mut paging = PAGING.lock();
            let pg = paging.as_mut().expect("paging not initialized");
            let v = pg.map_perm_range(&mut FramesAsSource, p, size as u64);
            v as *mut u8
        });
        sched::enable_preemption();
        result.and_then(core::ptr::NonNull::new)
    }
}

/// Bring up the whole memory subsystem in order: reconcile `records` into a `MemoryMap` (A),
/// carve out the low BIOS/kernel-image region, build the buddy allocator over the rest (B),
/// bring up paging for `max_physical_memory` bytes of installed RAM (C), and point
/// `global_allocator` (D) at a heap growing through the permanent window. Matches
/// `memory_init`'s call order.
pub fn init(
    records: &[RawRegion],
    kernel_image_end: u64,
    max_physical_memory: u64,
    global_allocator: &'static heap::KernelAllocator<KernelChunkSource>,
) {
    let mut map = MemoryMap::reconcile(records);
    // The kernel image and everything below it (BIOS, the v8086 stack, low memory) is never
    // handed out by the frame allocator.
    map.reserve(0, kernel_image_end);

    let start = kernel_image_end;
    let end = core::cmp::min(max_physical_memory, config::MAX_KERNEL_MEMORY_SIZE_LEGACY);

    let classify = |base: PhysAddr, size: u64| -> BlockKind { map.classify(base, size) };

    let frames = BuddyAllocator::init(KernelFrameAccess, start, end, config::FRAMES_MIN_ORDER, classify, None)
        .expect("failed to initialize the frame allocator: region too small");
    *FRAMES.lock() = Some(frames);

    let paging = paging::init(&mut FramesAsSource, max_physical_memory)
        .expect("CPU lacks PSE (large-page) support; cannot bring up paging");
    *PAGING.lock() = Some(paging);
    PAGING_ENABLED.store(true, Ordering::Release);

    global_allocator.init(KernelChunkSource);
}

/// Total bytes still free in the frame allocator, for diagnostics.
pub fn available_bytes() -> u64 {
    FRAMES.lock().as_ref().map_or(0, |f| f.available_bytes())
}

pub fn max_memory() -> u64 {
    PAGING.lock().as_ref().map_or(0, |p| p.max_memory())
}
