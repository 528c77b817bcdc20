//! Serial-port logging: a `core::fmt::Write` sink over COM1, the `printk!` macro built on it,
//! and a `log::Log` implementation layered on top so the rest of the crate can use the `log`
//! facade (`info!`/`warn!`/`error!`) instead of bare `printk!` call sites.

use core::fmt::{self, Write};

use crate::x86::{inb, outb};

/// COM1 I/O port base.
const PORT: u16 = 0x3F8;

/// A sink that writes bytes to the serial console, busy-waiting on the line-status register's
/// "transmit holding register empty" bit before each byte.
pub struct Debug;

impl Debug {
    pub fn write_bytes(&self, bytes: &[u8]) {
        for &b in bytes {
            unsafe {
                while inb(PORT + 5) & 0x20 == 0 {}
                outb(PORT, b);
            }
        }
    }
}

impl Write for Debug {
    #[inline]
    fn write_str(&mut self, data: &str) -> fmt::Result {
        self.write_bytes(data.as_bytes());
        Ok(())
    }
}

/// Print using format strings to the serial console. Never fails and never blocks beyond the
/// UART's own transmit-ready wait; safe to call before the logger is installed, and the only
/// sanctioned call site during panic handling.
#[macro_export]
macro_rules! printk {
    ($($arg:tt)*) => ({
        use ::core::fmt::Write;
        let _ = write!($crate::debug::Debug, $($arg)*);
    })
}

/// A `log::Log` implementation over the same serial sink `printk!` uses.
struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        printk!(
            "[{} {}] {}\n",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Install the serial logger as the `log` crate's global logger. Call once, early in boot,
/// before any other module uses `log::info!` and friends.
pub fn init() {
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(log::LevelFilter::Trace))
        .expect("logger already initialized");
}
