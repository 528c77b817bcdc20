//! Paging subsystem dispatcher.
//!
//! Grounded on `kernel/paging.c`/`kernel/paging/paging.c`: a single `{ops, data}` pair chosen
//! once at boot between the legacy and PAE variants, exposed to the rest of the kernel as four
//! entry points (`map_temp`/`unmap_temp`/`map_perm`/`max_memory`). Modelled here as an enum over
//! the two concrete tables rather than a vtable struct, since Rust's `match` gives the same
//! dispatch without the `void *` cast the original needs to thread `ops_data` through.

pub mod legacy;
pub mod pae;

use crate::x86;

/// A physical address, as handed out by `memory::frames`.
pub type PhysAddr = u64;
/// A virtual address inside one of the three managed windows.
pub type VirtAddr = u32;

pub const PAGE_BITS: u32 = 12;
pub const PAGE_SIZE: u32 = 1 << PAGE_BITS;

/// Entry flags shared by both table formats' low bits.
pub mod flags {
    pub const PRESENT: u64 = 1 << 0;
    pub const RW: u64 = 1 << 1;
    pub const LARGE_PAGE: u64 = 1 << 7;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingError {
    /// The target CPU lacks PSE (large-page) support; paging cannot be brought up at all.
    NoLargePageSupport,
}

/// The active paging implementation, tagged by variant the way `spec.md` §9's "polymorphic
/// interfaces" note prescribes (`enum PagingImpl { Legacy(..), Pae(..) }`) in place of the
/// original's function-pointer `pg_ops_t`.
pub enum PagingImpl {
    Legacy(legacy::LegacyTables),
    Pae(pae::PaeTables),
}

impl PagingImpl {
    pub fn map_temp(&mut self, p: PhysAddr) -> VirtAddr {
        match self {
            PagingImpl::Legacy(t) => t.map_temp(p),
            PagingImpl::Pae(t) => t.map_temp(p),
        }
    }

    pub fn unmap_temp(&mut self, v: VirtAddr) {
        match self {
            PagingImpl::Legacy(t) => t.unmap_temp(v),
            PagingImpl::Pae(t) => t.unmap_temp(v),
        }
    }

    /// Map one physical page into the permanent window, lazily allocating its leaf table from
    /// `frames` if absent. `frames` plays the role the original's globally-reachable `falloc`
    /// plays in C; here it is threaded explicitly.
    pub fn map_perm<F: FrameSource>(&mut self, frames: &mut F, p: PhysAddr) -> VirtAddr {
        match self {
            PagingImpl::Legacy(t) => t.map_perm(frames, p),
            PagingImpl::Pae(t) => t.map_perm(frames, p),
        }
    }

    /// Map `size` contiguous bytes of physical memory starting at `p` into the permanent
    /// window, one page at a time; returns the virtual address of the first page. Matches
    /// `paging_perm_map_pages`.
    pub fn map_perm_range<F: FrameSource>(&mut self, frames: &mut F, p: PhysAddr, size: u64) -> VirtAddr {
        let end = p + size;
        let mut cur = p;
        let mut first = None;
        while cur < end {
            let v = self.map_perm(frames, cur);
            if first.is_none() {
                first = Some(v);
            }
            cur += PAGE_SIZE as u64;
        }
        first.expect("map_perm_range called with size == 0")
    }

    pub fn max_memory(&self) -> u64 {
        match self {
            PagingImpl::Legacy(t) => t.max_memory(),
            PagingImpl::Pae(t) => t.max_memory(),
        }
    }
}

/// A source of freshly zeroed physical frames, to back new page table pages. Implemented by
/// `memory::frames::BuddyAllocator` in the real kernel; faked out in tests.
pub trait FrameSource {
    /// Allocate one zeroed, page-aligned physical frame.
    fn alloc_frame(&mut self) -> PhysAddr;
}

/// Choose and bring up the paging implementation for `max_physical_memory` bytes of installed
/// RAM. PAE is chosen only above the 4 GiB legacy ceiling and only if the CPU reports PAE
/// support; otherwise legacy. Matches `paging_init`'s selection predicate exactly.
pub fn init<F: FrameSource>(
    frames: &mut F,
    max_physical_memory: u64,
) -> Result<PagingImpl, PagingError> {
    if max_physical_memory > (1u64 << 32) && x86::cpuid_check_pae() {
        pae::PaeTables::init(frames).map(PagingImpl::Pae)
    } else {
        legacy::LegacyTables::init(frames).map(PagingImpl::Legacy)
    }
}
