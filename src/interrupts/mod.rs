//! Interrupt and v8086 dispatch core (`spec.md` §4.E): GDT/IDT/PIC/PIT bring-up, the shared
//! ISR dispatcher, and the per-IRQ handler table drivers register into.
//!
//! Grounded on `core/interrupts.c`'s `generic_interrupt_handler`: v8086 takes priority over
//! everything else, then IRQ demux, then the syscall vector, then an unhandled-exception panic
//! with a register dump. `spec.md` §7 calls CPU faults never-recoverable; this is the one place
//! that distinction is enforced.

pub mod idt;
pub mod pic;
pub mod pit;
pub mod v8086;

use spin::Mutex;

use crate::config;
use crate::gdt;
use crate::sched;
use crate::x86;
use idt::IsrStack;
use v8086::V8086Frame;

/// An IRQ handler receives the trap frame and returns the `esp` the common stub should resume
/// on — its own frame's address to stay on the interrupted task, or a different task's saved
/// frame to switch to it. Matches `idt::Dispatcher`'s contract, scoped to one IRQ line.
pub type IrqHandler = fn(&mut IsrStack) -> u32;

static IRQ_HANDLERS: Mutex<[Option<IrqHandler>; config::NUM_IRQ as usize]> =
    Mutex::new([None; config::NUM_IRQ as usize]);

/// Register a handler for one IRQ line (0..16). The timer and keyboard lines are claimed by
/// `sched::init`/the keyboard tasklet; every other line EOIs and drops until a driver installs
/// one, per `spec.md` §7's "IRQ without a handler: EOI and drop".
pub fn set_irq_handler(irq: u8, handler: IrqHandler) {
    IRQ_HANDLERS.lock()[irq as usize] = Some(handler);
}

/// Bring up the GDT, IDT, and both PICs (everything masked), program the PIT, and install the
/// shared dispatcher. Must run with interrupts still disabled; the caller `sti`s afterward.
pub fn init() {
    gdt::init();
    idt::init();
    pic::init();
    pit::init();
    idt::set_dispatcher(dispatch);
}

/// The single dispatcher installed into every ISR/IRQ/syscall vector's shared stub. Priority
/// order, per `spec.md` §4.E: v8086 first, then IRQ routing, then syscall, then panic.
fn dispatch(stack: &mut IsrStack) -> u32 {
    if stack.eflags & x86::eflags::VM != 0 {
        // Safe: `V8086Frame` is `IsrStack` followed by the four extra words the CPU pushes on
        // any trap taken while `EFLAGS.VM` is set (see `v8086::PendingEntry`'s doc comment) —
        // the common stub never trims the stack before calling in, so they are still there.
        let v8086_frame = unsafe { &mut *(stack as *mut IsrStack as *mut V8086Frame) };
        if v8086::manager(v8086_frame) {
            return stack as *mut IsrStack as u32;
        }
    }

    let vector = stack.int_num as u8;

    if vector >= config::IRQ_BASE && vector < config::IRQ_BASE + config::NUM_IRQ {
        let irq = vector - config::IRQ_BASE;
        let handler = IRQ_HANDLERS.lock()[irq as usize];
        return match handler {
            Some(h) => h(stack),
            None => {
                pic::eoi(irq);
                stack as *mut IsrStack as u32
            }
        };
    }

    if vector == config::SYSCALL_VECTOR {
        return match stack.eax {
            sched::SYSCALL_YIELD => sched::schedule(stack),
            other => panic!("unknown syscall number {:#x}", other),
        };
    }

    panic!(
        "unhandled exception {:#x} (error {:#x}) at cs:eip={:#06x}:{:#010x} eflags={:#010x}",
        vector, stack.error, stack.cs, stack.eip, stack.eflags
    );
}
