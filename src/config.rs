//! Compile-time tunables, gathered in one place rather than scattered through each module,
//! since the paging subsystem has two variants that both need the same window constants.

/// Start of the v8086 real-mode stack (inside the BIOS/low-memory reserved region).
pub const V8086_STACK_BASE: u32 = 0x2000;

/// Start of the identity-mapped kernel window.
pub const KERNEL_ID_START: u32 = 0;

/// End of the identity-mapped kernel window (exclusive).
pub const KERNEL_ID_END: u32 = 8 << 20; // 8 MiB

/// Start of the temporary-mapping window. Backed by exactly one non-large page table.
pub const TEMP_START: u32 = KERNEL_ID_END;

/// Number of entries in the temp window's single leaf table (`spec.md` §9: expose as a
/// configurable constant).
pub const TEMP_ENTRIES: usize = 1024;

/// End of the temporary-mapping window (exclusive).
pub const TEMP_END: u32 = TEMP_START + (TEMP_ENTRIES as u32) * 4096;

/// Start of the permanent-mapping window.
pub const PERM_START: u32 = TEMP_END;

/// End of the permanent-mapping window (exclusive); legacy paging has one directory's worth of
/// space left after the identity and temp windows.
pub const PERM_END: u32 = 0xFFC0_0000;

/// Implementation cap on physical memory managed by the legacy paging variant.
pub const MAX_KERNEL_MEMORY_SIZE_LEGACY: u64 = 126 << 20;

/// Minimum order the buddy frame allocator bootstraps at.
pub const FRAMES_MIN_ORDER: u32 = 14;

/// Timer ticks given to each task per scheduling quantum.
pub const SCHEDULER_QUANTUM: u32 = 20;

/// Target PIT frequency, in Hz.
pub const PIT_HZ: u32 = 1000;

/// The PIT's own oscillator frequency; used to compute the programmable divisor.
pub const PIT_BASE_HZ: u32 = 1_193_182;

/// First vector used for hardware IRQs after the PIC remap.
pub const IRQ_BASE: u8 = 0x20;

/// Number of CPU exception/ISR vectors reserved below `IRQ_BASE`.
pub const NUM_ISR: u8 = 0x14;

/// Number of IRQ lines (two cascaded 8259 PICs).
pub const NUM_IRQ: u8 = 0x10;

/// Software interrupt vector used for `yield`.
pub const SYSCALL_VECTOR: u8 = 0x7f;

pub const IRQ_TIMER: u8 = 0;
pub const IRQ_KEYBOARD: u8 = 1;
