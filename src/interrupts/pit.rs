//! Programmable Interval Timer: programmed in mode 3 (square wave) at `config::PIT_HZ`.
//!
//! Grounded on `kernel/timer.c`/`kernel/timer.h`: the `PIT_DATA0`/`PIT_CMD` ports, the
//! access/mode/channel bit layout, and `timer_set_divider`'s low/high/lo-hi byte selection based
//! on how much of the divisor is nonzero.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::x86;

const PIT_DATA0: u16 = 0x40;
const PIT_CMD: u16 = 0x43;

mod cmd {
    pub const ACCESS_LO: u8 = 1 << 4;
    pub const ACCESS_HI: u8 = 2 << 4;
    pub const ACCESS_LOHI: u8 = 3 << 4;
    pub const MODE_SQUARE_WAVE: u8 = 3 << 1;
}

static TICKS: AtomicU64 = AtomicU64::new(0);

fn send_command(mode: u8, divisor: u16) {
    unsafe {
        if divisor < 0x100 {
            x86::outb(PIT_CMD, mode | cmd::ACCESS_LO);
            x86::outb(PIT_DATA0, divisor as u8);
        } else if divisor & 0xff == 0 {
            x86::outb(PIT_CMD, mode | cmd::ACCESS_HI);
            x86::outb(PIT_DATA0, (divisor >> 8) as u8);
        } else {
            x86::outb(PIT_CMD, mode | cmd::ACCESS_LOHI);
            x86::outb(PIT_DATA0, (divisor & 0xff) as u8);
            x86::outb(PIT_DATA0, (divisor >> 8) as u8);
        }
    }
}

/// Program the PIT to fire at `crate::config::PIT_HZ`. `crate::config::PIT_BASE_HZ / PIT_HZ`
/// must fit a 16-bit divisor (true for any target frequency above ~18 Hz).
pub fn init() {
    let divisor = crate::config::PIT_BASE_HZ / crate::config::PIT_HZ;
    assert!(divisor <= 0xffff, "PIT divisor does not fit in 16 bits");
    send_command(cmd::MODE_SQUARE_WAVE, divisor as u16);
}

/// Called from the timer IRQ handler.
pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}
