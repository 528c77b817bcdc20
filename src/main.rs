//! Crate entry point: the multiboot header and `_start` trampoline, then `kernel_main`'s boot
//! sequence. `kernel_main` is grounded on `kernel/main.c`'s `kernel_start`: serial, GDT, IDT,
//! PIC, a BIOS text-mode call, then the PIT/keyboard/memory/scheduler bring-up in the same order,
//! ending with the root task spawned and the boot context folding into the idle loop.
//!
//! The `no_std`/`no_main` shape, the panic handler, the global allocator, and the boot trampoline
//! itself only make sense for a freestanding kernel image; under `cargo test` this builds as an
//! ordinary host binary instead; `boot` (and its `#[global_allocator]`/`#[panic_handler]`) is
//! compiled out so each module's own `#[cfg(test)]` unit tests link against the host's libtest
//! harness and its ordinary allocator.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![feature(naked_functions)]
#![cfg_attr(not(test), feature(alloc_error_handler))]

extern crate alloc;

#[macro_use]
pub mod debug;
#[cfg(not(test))]
pub mod bare_bones;
pub mod config;
pub mod contracts;
pub mod error;
pub mod gdt;
pub mod interrupts;
pub mod memory;
pub mod sched;
pub mod x86;

#[cfg(not(test))]
mod boot {
    use core::arch::global_asm;
    use core::mem::size_of;

    use crate::interrupts::v8086::{bios_int, Regs16};
    use crate::memory::e820::{RawKind, RawRegion};
    use crate::{config, debug, interrupts, memory, sched, x86};

    /// The kernel heap, backed by the buddy frame allocator through paging's permanent window.
    #[global_allocator]
    static ALLOCATOR: memory::heap::KernelAllocator<memory::KernelChunkSource> =
        memory::heap::KernelAllocator::new();

    #[alloc_error_handler]
    fn alloc_error(layout: core::alloc::Layout) -> ! {
        memory::heap::oom(layout)
    }

    const MB_MAGIC: u32 = 0x1bad_b002;
    const MB_FLAGS: u32 = 0x1;
    const MB_MAGIC_EAX: u32 = 0x2bad_b002;

    /// The multiboot header and `_start`: reserve a small boot stack, load it, and call into
    /// `kernel_main` with GRUB's `eax`/`ebx` (magic and the multiboot info pointer) preserved as
    /// arguments. Expressed as `global_asm!` rather than a separate assembled object file, since a
    /// GRUB-loadable header and a three-instruction trampoline don't need their own build step.
    global_asm!(
        ".section .multiboot, \"a\"",
        ".align 4",
        ".long {mb_magic}",
        ".long {mb_flags}",
        ".long -({mb_magic} + {mb_flags})",
        ".section .text",
        ".global _start",
        "_start:",
        "lea esp, [{stack} + {stack_size}]",
        "push eax", // multiboot magic
        "push ebx", // multiboot info pointer
        "call {kernel_main}",
        "2:",
        "hlt",
        "jmp 2b",
        mb_magic = const MB_MAGIC,
        mb_flags = const MB_FLAGS,
        stack = sym BOOT_STACK,
        stack_size = const BOOT_STACK_SIZE,
        kernel_main = sym kernel_main,
    );

    const BOOT_STACK_SIZE: usize = 0x4000;

    #[repr(align(16))]
    struct BootStack([u8; BOOT_STACK_SIZE]);

    static mut BOOT_STACK: BootStack = BootStack([0; BOOT_STACK_SIZE]);

    const E820_SCRATCH: u32 = 0x8000;
    const E820_SMAP: u32 = 0x534d4150;
    const MAX_E820_RECORDS: usize = 64;

    /// One raw BIOS `INT 15h, AX=E820h` record as the BIOS writes it into `E820_SCRATCH`.
    #[repr(C, packed)]
    struct E820Entry {
        base: u64,
        length: u64,
        kind: u32,
    }

    /// Replay `memory_get_chunks`'s BIOS loop: repeatedly call `INT 15h, AX=E820h` through the
    /// v8086 core, continuation key in `ebx`, until the BIOS reports no more entries or a call
    /// fails. `E820_SCRATCH` is inside the identity window, so `main` can read it directly between
    /// calls.
    fn gather_memory_map(out: &mut [RawRegion; MAX_E820_RECORDS]) -> usize {
        let seg = (E820_SCRATCH >> 4) as u16;
        let off = (E820_SCRATCH & 0xf) as u32;

        let mut regs = Regs16::default();
        regs.ebx = 0;
        let mut count = 0;

        loop {
            regs.eax = 0xe820;
            regs.edx = E820_SMAP;
            regs.es = seg;
            regs.edi = off;
            regs.ecx = size_of::<E820Entry>() as u32;

            let flags = bios_int(0x15, &mut regs);

            if flags & x86::eflags::CF != 0 || regs.eax != E820_SMAP {
                break;
            }

            let entry = unsafe { core::ptr::read_unaligned(E820_SCRATCH as *const E820Entry) };
            if count < out.len() {
                out[count] = RawRegion {
                    base: entry.base,
                    size: entry.length,
                    kind: if entry.kind == 1 { RawKind::Available } else { RawKind::Reserved },
                };
                count += 1;
            }

            if regs.ebx == 0 {
                break;
            }
        }

        count
    }

    extern "C" fn idle_loop() -> ! {
        loop {
            unsafe { x86::sti() };
            unsafe { asm_hlt() };
        }
    }

    #[inline(always)]
    unsafe fn asm_hlt() {
        core::arch::asm!("hlt", options(nomem, nostack));
    }

    extern "C" fn root_task() -> ! {
        log::info!("root task running");
        sched::tasklet::init_keyboard();
        sched::spawn(tasklet_entry, 0x1000);
        loop {
            sched::yield_now();
        }
    }

    extern "C" fn tasklet_entry() -> ! {
        sched::tasklet::run()
    }

    /// Entry point for the first Rust code that runs, called from `_start` with GRUB's magic and
    /// multiboot info pointer. Never returns: folds into `idle_loop`'s `hlt` loop once the boot
    /// sequence completes and preemption takes over.
    #[no_mangle]
    extern "C" fn kernel_main(multiboot_info: u32, magic: u32) -> ! {
        unsafe { x86::cli() };

        debug::init();
        log::info!("Helium starting (magic = {:#x}, multiboot info = {:#x})", magic, multiboot_info);
        if magic != MB_MAGIC_EAX {
            log::warn!("not multiboot-loaded; continuing without loader-provided info");
        }

        log::info!("gdt/idt/pic/pit...");
        interrupts::init();

        // text mode, cursor hidden: matches `kernel_start`'s two cosmetic BIOS calls.
        let mut regs = Regs16::default();
        regs.eax = 0x2;
        bios_int(0x10, &mut regs);
        regs.eax = 0x0100;
        regs.ecx = 0x2000;
        bios_int(0x10, &mut regs);

        unsafe { x86::sti() };

        log::info!("memory...");
        let mut records = [RawRegion { base: 0, size: 0, kind: RawKind::Reserved }; MAX_E820_RECORDS];
        let count = gather_memory_map(&mut records);
        assert!(count > 0, "BIOS e820 memory map query returned no usable entries");

        let max_physical_memory = records[..count].iter().map(|r| r.base + r.size).max().unwrap_or(0);

        // The kernel image, this boot stack, and the v8086 scratch area all live inside the
        // identity-mapped window; none of it is ever handed out by the frame allocator.
        let kernel_image_end = config::KERNEL_ID_END as u64;

        memory::init(&records[..count], kernel_image_end, max_physical_memory, &ALLOCATOR);
        log::info!("memory ok, {} bytes free", memory::available_bytes());

        log::info!("scheduler...");
        sched::init(idle_loop);
        sched::spawn(root_task, 0x2000);

        idle_loop()
    }
}
