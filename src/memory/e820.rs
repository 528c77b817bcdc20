//! Memory map reconciler: turn BIOS E820-style `(base, size, type)` records into a sorted,
//! non-overlapping chunk list tagged `{RESERVED, USABLE, PARTIAL}`.
//!
//! Grounded on `kernel/memory.c`: `isort` (insertion sort by base), `mm_type_combine`
//! (overlap-combine rule), and the breakpoint-walk that builds the final chunk list, including
//! its final `RESERVED` terminator chunk and `memory_reserve_chunk`'s two-breakpoint carve-out.

use alloc::vec::Vec;

/// Raw input record, as BIOS `INT 15h, AX=E820h` would hand back (mediated through the v8086
/// core in this crate — see `interrupts::v8086`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Available,
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRegion {
    pub base: u64,
    pub size: u64,
    pub kind: RawKind,
}

/// The kind of a reconciled chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Available,
    Reserved,
}

/// A `(base, kind)` breakpoint; a chunk implicitly extends to the next breakpoint's base (or to
/// infinity, for the last one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub base: u64,
    pub kind: Kind,
}

/// Combine the kinds of all records covering some sub-range: `AVAILABLE` only if every covering
/// record is `AVAILABLE`, `RESERVED` otherwise. Matches `mm_type_combine`.
fn combine(a: Kind, b: Kind) -> Kind {
    match (a, b) {
        (Kind::Available, Kind::Available) => Kind::Available,
        _ => Kind::Reserved,
    }
}

/// The reconciled, sorted, coalesced memory map.
pub struct MemoryMap {
    chunks: Vec<Chunk>,
}

impl MemoryMap {
    /// Build a `MemoryMap` from raw BIOS records. Sorts, walks pairwise emitting breakpoints
    /// for overlaps/gaps, and coalesces adjacent same-kind runs.
    pub fn reconcile(records: &[RawRegion]) -> Self {
        let mut records: Vec<RawRegion> = records.to_vec();
        records.sort_by_key(|r| r.base);

        if records.is_empty() {
            return MemoryMap { chunks: alloc::vec![Chunk { base: 0, kind: Kind::Reserved }] };
        }

        // Coordinate-compress every record boundary into a sorted list of breakpoints, then
        // classify each resulting interval by which records cover it. This is equivalent to
        // `isort` plus the pairwise walk in `kernel/memory.c`, expressed without mutating a
        // running "current interval" by hand.
        let mut points: Vec<u64> = Vec::with_capacity(records.len() * 2);
        for r in &records {
            points.push(r.base);
            points.push(r.base + r.size);
        }
        points.sort_unstable();
        points.dedup();

        let mut chunks: Vec<Chunk> = Vec::with_capacity(points.len());
        for i in 0..points.len() {
            let base = points[i];
            let end = points.get(i + 1).copied();
            let covering: Vec<Kind> = records
                .iter()
                .filter(|r| r.base <= base && end.map_or(true, |e| r.base + r.size >= e) && r.base + r.size > base)
                .map(|r| match r.kind {
                    RawKind::Available => Kind::Available,
                    RawKind::Reserved => Kind::Reserved,
                })
                .collect();

            let kind = if covering.is_empty() {
                Kind::Reserved
            } else {
                covering.into_iter().fold(Kind::Available, combine)
            };

            push_breakpoint(&mut chunks, base, kind);
        }

        MemoryMap { chunks }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Inject two breakpoints at `[start, end)` and force everything strictly inside to
    /// `RESERVED`. Matches `memory_reserve_chunk`.
    pub fn reserve(&mut self, start: u64, end: u64) {
        // The kind that would naturally continue past `end`, so the chunk resuming there keeps
        // the map accurate outside the reserved range.
        let end_kind = self.kind_at(end);

        let mut out: Vec<Chunk> = Vec::with_capacity(self.chunks.len() + 2);
        for c in self.chunks.iter().filter(|c| c.base < start) {
            out.push(*c);
        }
        out.push(Chunk { base: start, kind: Kind::Reserved });
        out.push(Chunk { base: end, kind: end_kind });
        for c in self.chunks.iter().filter(|c| c.base > end) {
            out.push(*c);
        }

        out.sort_by_key(|c| c.base);
        out.dedup_by(|a, b| a.base == b.base);
        coalesce(&mut out);
        self.chunks = out;
    }

    fn kind_at(&self, addr: u64) -> Kind {
        let mut found = Kind::Reserved;
        for c in &self.chunks {
            if c.base <= addr {
                found = c.kind;
            } else {
                break;
            }
        }
        found
    }

    /// `classify(block_base, block_size)`: `USABLE` iff the whole block lies inside a single
    /// `AVAILABLE` chunk, `RESERVED` iff no byte of it is available, `PARTIAL` otherwise.
    pub fn classify(&self, block_base: u64, block_size: u64) -> BlockKind {
        let block_end = block_base + block_size;
        let mut any_available = false;
        let mut any_reserved = false;
        let mut fully_inside_one_chunk = false;

        for (i, c) in self.chunks.iter().enumerate() {
            let c_end = self.chunks.get(i + 1).map(|n| n.base).unwrap_or(u64::MAX);
            if c_end <= block_base || c.base >= block_end {
                continue;
            }
            match c.kind {
                Kind::Available => any_available = true,
                Kind::Reserved => any_reserved = true,
            }
            if c.base <= block_base && c_end >= block_end && c.kind == Kind::Available {
                fully_inside_one_chunk = true;
            }
        }

        if fully_inside_one_chunk {
            BlockKind::Usable
        } else if any_available && any_reserved {
            BlockKind::Partial
        } else if any_available {
            BlockKind::Usable
        } else {
            BlockKind::Reserved
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Usable,
    Partial,
    Reserved,
}

fn push_breakpoint(chunks: &mut Vec<Chunk>, base: u64, kind: Kind) {
    if let Some(last) = chunks.last() {
        if last.base == base {
            return;
        }
        if last.kind == kind {
            return;
        }
    }
    chunks.push(Chunk { base, kind });
}

fn coalesce(chunks: &mut Vec<Chunk>) {
    let mut out: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for c in chunks.drain(..) {
        match out.last() {
            Some(last) if last.kind == c.kind => continue,
            _ => out.push(c),
        }
    }
    *chunks = out;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_records_produce_gaps_as_reserved() {
        let mm = MemoryMap::reconcile(&[
            RawRegion { base: 0, size: 0x1000, kind: RawKind::Available },
            RawRegion { base: 0x2000, size: 0x1000, kind: RawKind::Available },
        ]);
        assert_eq!(mm.classify(0, 0x1000), BlockKind::Usable);
        assert_eq!(mm.classify(0x1000, 0x1000), BlockKind::Reserved);
        assert_eq!(mm.classify(0x2000, 0x1000), BlockKind::Usable);
    }

    #[test]
    fn overlap_is_reserved_dominant() {
        let mm = MemoryMap::reconcile(&[
            RawRegion { base: 0, size: 0x2000, kind: RawKind::Available },
            RawRegion { base: 0x1000, size: 0x1000, kind: RawKind::Reserved },
        ]);
        assert_eq!(mm.classify(0, 0x1000), BlockKind::Usable);
        assert_eq!(mm.classify(0x1000, 0x1000), BlockKind::Reserved);
    }

    #[test]
    fn overlap_of_two_available_stays_available() {
        let mm = MemoryMap::reconcile(&[
            RawRegion { base: 0, size: 0x2000, kind: RawKind::Available },
            RawRegion { base: 0x1000, size: 0x2000, kind: RawKind::Available },
        ]);
        assert_eq!(mm.classify(0, 0x3000), BlockKind::Usable);
    }

    #[test]
    fn partial_block_spans_available_and_reserved() {
        let mm = MemoryMap::reconcile(&[
            RawRegion { base: 0, size: 0x1000, kind: RawKind::Available },
        ]);
        assert_eq!(mm.classify(0, 0x2000), BlockKind::Partial);
    }

    #[test]
    fn reserve_forces_range_reserved() {
        let mut mm = MemoryMap::reconcile(&[
            RawRegion { base: 0, size: 0x4000, kind: RawKind::Available },
        ]);
        mm.reserve(0x1000, 0x2000);
        assert_eq!(mm.classify(0, 0x1000), BlockKind::Usable);
        assert_eq!(mm.classify(0x1000, 0x1000), BlockKind::Reserved);
        assert_eq!(mm.classify(0x2000, 0x1000), BlockKind::Usable);
    }
}
