//! Offset ↔ block-map-slot arithmetic (`spec.md` §4.3, component C3).
//!
//! Pure functions of `n`, the count of blocks a file currently has (or is
//! growing/shrinking to): where does the `n`-th block's pointer live, and
//! is `n` exactly the point at which an indirect or indirect² meta-block
//! is entered or vacated? [`crate::resize`] uses both halves: the slot to
//! read/write the new pointer, and the boundary check to decide whether a
//! meta-block needs allocating or freeing this step.

use crate::layout::{NDIRECT, NINDIRECT};

/// Where the pointer for block index `n` (0-based) lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// `direct[n]` in the inode itself.
    Direct(usize),
    /// `indirect_block[slot]`.
    Indirect { slot: usize },
    /// `indirect2_block[outer]` names an indirect block, whose `[inner]`
    /// slot names the data block.
    Indirect2 { outer: usize, inner: usize },
}

/// Classifies block index `n`. Returns `None` if `n` is beyond
/// [`crate::layout::MAXFILESIZE`]'s block count.
pub fn classify(n: u64) -> Option<Slot> {
    if n < NDIRECT as u64 {
        return Some(Slot::Direct(n as usize));
    }
    let n = n - NDIRECT as u64;
    if n < NINDIRECT as u64 {
        return Some(Slot::Indirect { slot: n as usize });
    }
    let n = n - NINDIRECT as u64;
    let max_indirect2 = NINDIRECT as u64 * NINDIRECT as u64;
    if n < max_indirect2 {
        let outer = (n / NINDIRECT as u64) as usize;
        let inner = (n % NINDIRECT as u64) as usize;
        return Some(Slot::Indirect2 { outer, inner });
    }
    None
}

/// `true` iff block index `n` is the first one that requires the indirect
/// block itself to exist (i.e. the file is crossing from the direct region
/// into the indirect region at this index).
pub fn enters_indirect_region(n: u64) -> bool {
    n == NDIRECT as u64
}

/// `true` iff freeing block index `n` (the *last* block of a file of
/// length `n + 1`) leaves the indirect block with no live entries, so it
/// should itself be freed.
pub fn leaves_indirect_region(n: u64) -> bool {
    n == NDIRECT as u64
}

/// `true` iff block index `n` is the first one that requires the
/// indirect² block to exist.
pub fn enters_indirect2_region(n: u64) -> bool {
    n == (NDIRECT + NINDIRECT) as u64
}

/// `true` iff freeing block index `n` collapses the indirect² block (its
/// one remaining indirect child was just freed).
pub fn leaves_indirect2_region(n: u64) -> bool {
    n == (NDIRECT + NINDIRECT) as u64
}

/// `true` iff `n` is the first index addressed through a *fresh* indirect
/// block nested inside the indirect² block (`inner == 0`).
pub fn enters_fresh_indirect_child(slot: Slot) -> bool {
    matches!(slot, Slot::Indirect2 { inner: 0, .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_region() {
        assert_eq!(classify(0), Some(Slot::Direct(0)));
        assert_eq!(classify(NDIRECT as u64 - 1), Some(Slot::Direct(NDIRECT - 1)));
    }

    #[test]
    fn indirect_region() {
        assert_eq!(classify(NDIRECT as u64), Some(Slot::Indirect { slot: 0 }));
        assert!(enters_indirect_region(NDIRECT as u64));
        assert!(!enters_indirect_region(NDIRECT as u64 - 1));
    }

    #[test]
    fn indirect2_region() {
        let base = (NDIRECT + NINDIRECT) as u64;
        assert_eq!(classify(base), Some(Slot::Indirect2 { outer: 0, inner: 0 }));
        assert!(enters_indirect2_region(base));
        assert_eq!(
            classify(base + NINDIRECT as u64),
            Some(Slot::Indirect2 { outer: 1, inner: 0 })
        );
    }

    #[test]
    fn out_of_range() {
        let max = (NDIRECT + NINDIRECT + NINDIRECT * NINDIRECT) as u64;
        assert_eq!(classify(max), None);
    }
}
