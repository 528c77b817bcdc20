//! External interfaces: the seams between this core and the out-of-scope collaborators
//! (`spec.md` §6) — storage, NIC, console, and VFS-file backends. Each is a plain trait rather
//! than the original's `{ops, data}` function-pointer pair, per `spec.md` §9's "polymorphic
//! interfaces" note; a concrete driver (ATA, RTL8139, framebuffer console, ext2) implements the
//! trait and the core only ever depends on the trait object.

use crate::error::KernelResult;

/// A block storage backend (`spec.md` §6 "Storage backend"). Offsets and lengths are in bytes;
/// the `_unaligned` variants accept a scratch buffer at least `sector_size()` bytes long and
/// internally read/write a full sector to satisfy offsets or lengths that aren't sector
/// multiples. Implemented by an ATA driver in the full system; out of this core's scope.
pub trait Storage {
    fn sector_size(&self) -> usize;

    /// `offset` and `bytes.len()` must both be multiples of `sector_size()`.
    fn read(&mut self, offset: u64, bytes: &mut [u8]) -> KernelResult<()>;

    /// `offset` and `bytes.len()` must both be multiples of `sector_size()`.
    fn write(&mut self, offset: u64, bytes: &[u8]) -> KernelResult<()>;

    fn read_unaligned(&mut self, offset: u64, bytes: &mut [u8], scratch: &mut [u8]) -> KernelResult<()>;

    fn write_unaligned(&mut self, offset: u64, bytes: &[u8], scratch: &mut [u8]) -> KernelResult<()>;
}

/// An Ethernet NIC backend (`spec.md` §6 "NIC backend"). `transmit` takes a complete frame
/// (destination, source, ethertype, payload) padded to at least 60 bytes; the core appends the
/// CRC. The receive path is push-based: `grab` registers a callback invoked with each raw frame,
/// CRC included, as it arrives — the callee is responsible for validating it.
pub trait Nic {
    fn mac(&self) -> [u8; 6];

    fn transmit(&mut self, frame: &[u8]) -> KernelResult<()>;

    /// Register `on_packet` to be called, with `ctx`, for every received frame. `ctx` is an
    /// opaque token threaded back to the callback unchanged (the original's `void *`); this
    /// core never inspects it.
    fn grab(&mut self, on_packet: fn(&[u8], usize), ctx: usize) -> KernelResult<()>;
}

/// The pixel/character geometry a console backend renders into (`spec.md` §6 "Console
/// backend"). The console owns the buffer/cursor/dirty-span state and calls back into the
/// backend only to push pixels to the screen and to learn about input readiness.
pub trait ConsoleBackend {
    fn set_geometry(&mut self, width: u32, height: u32);

    /// Repaint from `state`'s buffer/cursor/dirty-span fields; the backend decides how much of
    /// the dirty region it actually needs to redraw.
    fn repaint(&mut self, state: &ConsoleState);

    /// Ask the backend to schedule a repaint at its own convenience (e.g. on the next vsync or
    /// the next scheduler quantum), rather than blocking the caller on one now.
    fn schedule_repaint(&mut self);

    /// Block the calling task until the backend has new input (e.g. a keystroke) ready.
    fn wait(&mut self);
}

/// State a console owns, read by `ConsoleBackend::repaint` — published here rather than behind
/// the trait so a backend can inspect it without a round-trip of getter calls.
pub struct ConsoleState<'a> {
    pub width: u32,
    pub height: u32,
    pub cursor_x: u32,
    pub cursor_y: u32,
    /// `(row, col_start, col_end)` spans touched since the last repaint.
    pub dirty: &'a [(u32, u32, u32)],
    pub buffer: &'a [u8],
}

/// A read-only file handle from a virtual filesystem (`spec.md` §6 "VFS file"), e.g. an ext2
/// inode reader. Out of this core's scope; fixed here only as the contract other components
/// (the ELF loader) consume.
pub trait VfsFile {
    /// Read up to `buf.len()` bytes starting at the file's current position; returns the
    /// number of bytes actually read (0 at end of file).
    fn read(&mut self, buf: &mut [u8]) -> KernelResult<usize>;

    /// Seek to an absolute byte offset.
    fn seek(&mut self, absolute_offset: u64) -> KernelResult<()>;

    fn position(&self) -> u64;
}
