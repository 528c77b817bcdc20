//! Tasklet (bottom-half) queue: an IRQ handler that has more than a few instructions of work
//! schedules a tasklet instead of doing it in interrupt context, and a dedicated low-priority
//! task drains the queue with interrupts enabled.
//!
//! Grounded on `kernel/keyboard.c`'s split between `keyboard_irq` (reads the scancode — the only
//! part that must run with interrupts off) and `keyboard_bottom_half` (scancode translation and
//! delivery); the worked example below mirrors that split.

use alloc::collections::VecDeque;

use spin::Mutex;

use crate::config;
use crate::interrupts;
use crate::interrupts::idt::IsrStack;
use crate::interrupts::pic;
use crate::sched::semaphore::Semaphore;
use crate::x86;

pub type TaskletFn = fn();

static QUEUE: Mutex<VecDeque<TaskletFn>> = Mutex::new(VecDeque::new());
static READY: Semaphore = Semaphore::new(0);

/// Queue `f` to run on the tasklet task, outside interrupt context. Safe to call from an IRQ
/// handler: takes no lock an IRQ handler could already be holding.
pub fn schedule(f: TaskletFn) {
    QUEUE.lock().push_back(f);
    READY.up();
}

/// Entry point for the dedicated tasklet task: drain the queue forever, blocking on `READY`
/// whenever it's empty.
pub extern "C" fn run() -> ! {
    loop {
        READY.down();
        let next = QUEUE.lock().pop_front();
        if let Some(f) = next {
            f();
        }
    }
}

const KEYBOARD_DATA: u16 = 0x60;
static SCANCODES: Mutex<VecDeque<u8>> = Mutex::new(VecDeque::new());

/// IRQ1 handler: read the scancode out of the controller (must happen before the next one
/// arrives) and defer everything else to the tasklet task.
fn keyboard_irq(stack: &mut IsrStack) -> u32 {
    let scancode = unsafe { x86::inb(KEYBOARD_DATA) };
    SCANCODES.lock().push_back(scancode);
    schedule(keyboard_bottom_half);
    pic::eoi(config::IRQ_KEYBOARD);
    stack as *mut IsrStack as u32
}

/// Bottom half: drain whatever scancodes piled up since the last run. Scancode-to-keycode
/// translation and console delivery belong to the console driver, out of this core's scope; this
/// only demonstrates the IRQ/tasklet split the driver hooks into.
fn keyboard_bottom_half() {
    let mut scancodes = SCANCODES.lock();
    while scancodes.pop_front().is_some() {}
}

/// Register the keyboard IRQ handler and unmask the line. Called once during boot.
pub fn init_keyboard() {
    interrupts::set_irq_handler(config::IRQ_KEYBOARD, keyboard_irq);
    pic::unmask(config::IRQ_KEYBOARD);
}
