//! Global Descriptor Table and Task State Segment bring-up.
//!
//! Grounded on `core/gdt.c`: four entries (null, kernel code, kernel data, and a TSS
//! descriptor patched in at init time), built the same way — hand-populated descriptor bytes
//! rather than a builder API, since the hand-rolled 32-bit IDT trampolines need a GDT built the
//! same way the original does, not a long-mode segment builder.

use core::arch::asm;
use core::mem;

use spin::Mutex;

/// A single 8-byte GDT entry.
#[derive(Copy, Clone, Default)]
#[repr(C, packed)]
pub struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    flags: u8,
    granularity: u8,
    base_high: u8,
}

impl GdtEntry {
    const fn zero() -> Self {
        GdtEntry { limit_low: 0, base_low: 0, base_mid: 0, flags: 0, granularity: 0, base_high: 0 }
    }

    fn set(&mut self, base: u32, limit: u32, flags: u8, granularity: u8) {
        self.limit_low = (limit & 0xffff) as u16;
        self.granularity = ((granularity << 4) & 0xf0) | (((limit >> 16) & 0x0f) as u8);
        self.base_low = (base & 0xffff) as u16;
        self.base_mid = ((base >> 16) & 0xff) as u8;
        self.base_high = ((base >> 24) & 0xff) as u8;
        self.flags = flags;
    }
}

#[repr(C, packed)]
struct GdtPointer {
    size: u16,
    offset: u32,
}

/// Selector indices, matching `core/gdt.h`'s `GDT_*` enum.
pub const GDT_NULL: u16 = 0;
pub const GDT_CODE: u16 = 1;
pub const GDT_DATA: u16 = 2;
pub const GDT_TASK: u16 = 3;
pub const GDT_NUM_ENTRIES: usize = 4;

pub const fn selector(index: u16) -> u16 {
    index * mem::size_of::<GdtEntry>() as u16
}

/// Selector values usable as `asm!` `const` operands (e.g. in the naked ISR trampoline, which
/// cannot call a function to compute its segment selector).
pub const KERNEL_CODE_SELECTOR: u16 = selector(GDT_CODE);
pub const KERNEL_DATA_SELECTOR: u16 = selector(GDT_DATA);

/// 32-bit hardware TSS, used only for `esp0`/`ss0` (the ring-0 stack pointer the CPU loads on a
/// privilege-level change) and by v8086 returns which restore `esp0` directly.
#[repr(C, packed)]
pub struct Tss {
    prev: u32,
    pub esp0: u32,
    pub ss0: u32,
    esp1: u32,
    ss1: u32,
    esp2: u32,
    ss2: u32,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u32,
    cs: u32,
    ss: u32,
    ds: u32,
    fs: u32,
    gs: u32,
    ldt: u32,
    trap: u16,
    iomap_base: u16,
}

impl Tss {
    const fn zero() -> Self {
        Tss {
            prev: 0, esp0: 0, ss0: 0, esp1: 0, ss1: 0, esp2: 0, ss2: 0,
            cr3: 0, eip: 0, eflags: 0, eax: 0, ecx: 0, edx: 0, ebx: 0,
            esp: 0, ebp: 0, esi: 0, edi: 0, es: 0, cs: 0, ss: 0, ds: 0,
            fs: 0, gs: 0, ldt: 0, trap: 0, iomap_base: 0,
        }
    }
}

struct GdtState {
    entries: [GdtEntry; GDT_NUM_ENTRIES],
    tss: Tss,
}

static GDT: Mutex<GdtState> = Mutex::new(GdtState {
    entries: [GdtEntry::zero(); GDT_NUM_ENTRIES],
    tss: Tss::zero(),
});

/// Build the GDT/TSS and load them via `lgdt`/`ltr`. Must run before `interrupts::init`.
pub fn init() {
    let mut gdt = GDT.lock();

    gdt.entries[GDT_CODE as usize].set(0, 0xfffff, 0x9a, 0xc);
    gdt.entries[GDT_DATA as usize].set(0, 0xfffff, 0x92, 0xc);

    let tss_base = &gdt.tss as *const Tss as u32;
    let tss_limit = mem::size_of::<Tss>() as u32;
    gdt.entries[GDT_TASK as usize].set(tss_base, tss_limit, 0x89, 0x0);

    gdt.tss.ss0 = selector(GDT_DATA) as u32;

    let pointer = GdtPointer {
        size: (mem::size_of::<[GdtEntry; GDT_NUM_ENTRIES]>() - 1) as u16,
        offset: gdt.entries.as_ptr() as u32,
    };

    unsafe {
        asm!("lgdt [{0}]", in(reg) &pointer, options(readonly, nostack));
        reload_segments();
        let tss_sel = selector(GDT_TASK);
        asm!("ltr {0:x}", in(reg) tss_sel, options(nostack, preserves_flags));
    }
}

unsafe fn reload_segments() {
    let code_sel = selector(GDT_CODE) as u32;
    let data_sel = selector(GDT_DATA) as u32;
    asm!(
        "push {code_sel}",
        "lea {tmp}, [2f]",
        "push {tmp}",
        "retf",
        "2:",
        "mov ax, {data_sel:x}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "mov ss, ax",
        code_sel = in(reg) code_sel,
        data_sel = in(reg) data_sel,
        tmp = out(reg) _,
        out("ax") _,
    );
}

/// Set the ring-0 stack pointer the CPU will load on any interrupt/exception taken while not
/// already in ring 0 (including the return path from a v8086 BIOS call).
pub fn set_esp0(esp0: u32) -> u32 {
    let mut gdt = GDT.lock();
    let old = gdt.tss.esp0;
    gdt.tss.esp0 = esp0;
    old
}

pub fn esp0() -> u32 {
    GDT.lock().tss.esp0
}
