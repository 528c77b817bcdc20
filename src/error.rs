//! Error types at the seams where a caller can actually do something about a failure.
//!
//! Allocator-level out-of-memory conditions stay sentinel returns (`None`/null), matching the
//! original C convention of returning 0 on failure and never unwinding: wrapping them in
//! `Result` would suggest there is more detail to recover than "no memory left". Programmer
//! errors and CPU faults panic unconditionally and are not represented here at all.

use core::fmt;

/// Recoverable failures surfaced across the external contracts (storage/NIC) and a handful of
/// core seams that accept a fallible caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// A physical or virtual allocation request could not be satisfied.
    OutOfMemory,
    /// An interrupt vector index was out of the valid `0..256` range.
    InvalidVector(u8),
    /// An address or length failed an alignment requirement (e.g. sector size, page size).
    Misaligned,
    /// A backend (storage, NIC) reported a hardware-level error.
    HardwareFault(&'static str),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::OutOfMemory => write!(f, "out of memory"),
            KernelError::InvalidVector(v) => write!(f, "invalid interrupt vector {}", v),
            KernelError::Misaligned => write!(f, "misaligned address or length"),
            KernelError::HardwareFault(msg) => write!(f, "hardware fault: {}", msg),
        }
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
