//! The resize planner (`spec.md` §4.4, component C4).
//!
//! Grows or shrinks a file by exactly one block, working entirely on a
//! local [`ResizePlan`] — a copy of the inode plus scratch copies of
//! whichever indirect-class meta blocks it touches. Nothing here writes to
//! the live image; a finished plan becomes a [`StagedBatch`] that
//! [`crate::journal::Journal::stage`] commits. On any error the plan is
//! simply dropped, so a failed call leaves the file exactly as it was.

use crate::error::{Error, FsResult};
use crate::journal::ResizeTouched;
use crate::layout::BLOCK_SIZE;
use crate::sys::blockmap::{self, Slot};
use crate::sys::inode::RawInode;
use alloc::vec;
use alloc::vec::Vec;

/// What happened during one [`add_block_file`] or [`free_block_file`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// One data block (and possibly a meta block) was added/removed; the
    /// caller may keep going in the same batch.
    Progressed,
    /// A fresh indirect-class meta block is needed, but this was not the
    /// first reservation of the batch. Nothing was changed; the caller
    /// must stage and apply the batch so far, start a new plan, and retry
    /// — where this step will be the batch's first reservation.
    StopBatch,
    /// This step collapsed (freed) the one indirect-class meta block the
    /// batch had already started touching. The step did complete, but a
    /// journal batch carries at most one such meta block, so the caller
    /// must stage and apply now before continuing with a fresh plan.
    Collapsed,
}

/// Working state for growing or shrinking a single file by a run of
/// blocks, not yet committed to the journal.
pub struct ResizePlan {
    /// Local copy of the inode, mutated step by step.
    pub inode: RawInode,
    /// Number of blocks currently mapped, tracked separately from
    /// `inode.size` (the exact logical byte length) since a file's size
    /// need not be a whole multiple of the block size — only callers in
    /// [`crate::size_engine`] decide what `inode.size` should read once a
    /// batch's block-count target is reached.
    pub blocks: u64,
    /// Data (and meta) block indices touched this batch, in the order they
    /// must appear in the journal's affected-block list.
    pub affected: Vec<u32>,
    /// Scratch copy of the second-level meta block this batch touches:
    /// either the inode's own `indirect` block, or an indirect-child block
    /// reached through `indirect2`. `None` until first touched.
    pub indirect_buf: Option<Vec<u8>>,
    /// Block number the above scratch buffer will be written back to.
    pub indirect_blockno: u32,
    /// Scratch copy of the doubly-indirect block, if touched this batch.
    pub indirect2_buf: Option<Vec<u8>>,
    pub indirect2_blockno: u32,
    pub touched: ResizeTouched,
    /// Indices reserved for this batch but not yet reflected in the live
    /// bitmap — checked so the locality search never doubly hands out the
    /// same block twice within one uncommitted batch.
    reserved: Vec<u32>,
    lo: u32,
    hi: u32,
}

impl ResizePlan {
    pub fn new(inode: RawInode, locality_hint: u32) -> ResizePlan {
        let blocks = (inode.size as u64).div_ceil(BLOCK_SIZE as u64);
        ResizePlan {
            inode,
            blocks,
            affected: Vec::new(),
            indirect_buf: None,
            indirect_blockno: 0,
            indirect2_buf: None,
            indirect2_blockno: 0,
            touched: ResizeTouched::empty(),
            reserved: Vec::new(),
            lo: locality_hint.wrapping_sub(1),
            hi: locality_hint,
        }
    }

    fn is_empty_batch(&self) -> bool {
        self.affected.is_empty() && self.indirect_blockno == 0 && self.indirect2_blockno == 0
    }

    /// Break the plan down into the pieces [`crate::journal::StagedBatch`]
    /// needs, consuming it.
    #[allow(clippy::type_complexity)]
    pub fn into_parts(self) -> (RawInode, Vec<u32>, u32, Option<Vec<u8>>, u32, Option<Vec<u8>>, ResizeTouched) {
        (
            self.inode,
            self.affected,
            self.indirect_blockno,
            self.indirect_buf,
            self.indirect2_blockno,
            self.indirect2_buf,
            self.touched,
        )
    }
}

/// Read-only access a planner needs from the live image: the bitmap (to
/// find a free block) and existing meta-block contents (to copy into
/// scratch on first touch).
pub trait PlannerSource {
    fn find_free_block(&self, lo: u32, hi: u32) -> u32;
    fn nblocks(&self) -> u32;
    fn first_data(&self) -> u32;
    fn block_bytes(&self, blockno: u32) -> Vec<u8>;
}

fn reserve<S: PlannerSource>(dev: &S, plan: &mut ResizePlan) -> FsResult<u32> {
    let nblocks = dev.nblocks();
    let mut hi = plan.hi;
    for _ in 0..nblocks.max(1) {
        let k = dev.find_free_block(plan.lo, hi);
        if k == 0 {
            log::warn!("resize: no free block found searching ({}, {})", plan.lo, hi);
            return Err(Error::NoSpace);
        }
        if plan.reserved.contains(&k) {
            hi = k + 1;
            continue;
        }
        if plan.affected.is_empty() && plan.indirect_blockno == 0 && plan.indirect2_blockno == 0 {
            plan.lo = k;
        }
        plan.hi = k + 1;
        plan.reserved.push(k);
        return Ok(k);
    }
    Err(Error::NoSpace)
}

fn read_u32(buf: &[u8], slot: usize) -> u32 {
    let b = slot * 4;
    u32::from_le_bytes(buf[b..b + 4].try_into().unwrap())
}

fn write_u32(buf: &mut [u8], slot: usize, value: u32) {
    let b = slot * 4;
    buf[b..b + 4].copy_from_slice(&value.to_le_bytes());
}

/// Plans the addition of one more data block to the end of the file
/// described by `plan.inode`.
pub fn add_block_file<S: PlannerSource>(dev: &S, plan: &mut ResizePlan) -> FsResult<StepOutcome> {
    let n = plan.blocks;
    let slot = blockmap::classify(n).ok_or(Error::NoSpace)?;

    let needs_fresh_meta = match slot {
        Slot::Direct(_) => false,
        Slot::Indirect { .. } => plan.inode.indirect == 0 && plan.indirect_blockno == 0,
        Slot::Indirect2 { inner, .. } => inner == 0,
    };
    if needs_fresh_meta && !plan.is_empty_batch() {
        return Ok(StepOutcome::StopBatch);
    }

    let data_blockno = reserve(dev, plan)?;

    match slot {
        Slot::Direct(i) => {
            plan.inode.direct[i] = data_blockno;
        }
        Slot::Indirect { slot } => {
            if needs_fresh_meta {
                let meta = reserve(dev, plan)?;
                plan.indirect_blockno = meta;
                plan.indirect_buf = Some(vec![0u8; BLOCK_SIZE]);
                plan.touched.insert(ResizeTouched::INDIRECT);
                plan.inode.indirect = meta;
            }
            write_u32(plan.indirect_buf.as_mut().ok_or(Error::Io)?, slot, data_blockno);
        }
        Slot::Indirect2 { outer, inner } => {
            if needs_fresh_meta {
                let child = reserve(dev, plan)?;
                plan.indirect_blockno = child;
                plan.indirect_buf = Some(vec![0u8; BLOCK_SIZE]);
                plan.touched.insert(ResizeTouched::INDIRECT);

                if plan.indirect2_buf.is_none() {
                    if plan.inode.indirect2 == 0 {
                        let top = reserve(dev, plan)?;
                        plan.indirect2_blockno = top;
                        plan.indirect2_buf = Some(vec![0u8; BLOCK_SIZE]);
                        plan.inode.indirect2 = top;
                    } else {
                        plan.indirect2_blockno = plan.inode.indirect2;
                        plan.indirect2_buf = Some(dev.block_bytes(plan.inode.indirect2));
                    }
                }
                plan.touched.insert(ResizeTouched::INDIRECT2);
                write_u32(plan.indirect2_buf.as_mut().ok_or(Error::Io)?, outer, child);
            }
            write_u32(plan.indirect_buf.as_mut().ok_or(Error::Io)?, inner, data_blockno);
        }
    }

    plan.affected.push(data_blockno);
    plan.inode.size += BLOCK_SIZE as u32;
    Ok(StepOutcome::Progressed)
}

/// Plans the removal of the file's current last data block.
///
/// A journal batch has room for only one indirect-class meta-block change,
/// so once a call collapses (frees) one, it returns
/// [`StepOutcome::Collapsed`] and the caller must stage what has
/// accumulated before calling this again — the next call would otherwise
/// need a *different* indirect-class block than the one this batch already
/// touched.
pub fn free_block_file<S: PlannerSource>(dev: &S, plan: &mut ResizePlan) -> FsResult<StepOutcome> {
    if plan.inode.size == 0 {
        return Err(Error::Io);
    }
    let n = plan.inode.size as u64 / BLOCK_SIZE as u64 - 1;
    let slot = blockmap::classify(n).ok_or(Error::Io)?;

    let freed = match slot {
        Slot::Direct(i) => {
            let v = plan.inode.direct[i];
            plan.inode.direct[i] = 0;
            v
        }
        Slot::Indirect { slot } => {
            if plan.indirect_buf.is_none() {
                if plan.inode.indirect == 0 {
                    return Err(Error::Io);
                }
                plan.indirect_blockno = plan.inode.indirect;
                plan.indirect_buf = Some(dev.block_bytes(plan.inode.indirect));
            }
            let buf = plan.indirect_buf.as_mut().ok_or(Error::Io)?;
            let v = read_u32(buf, slot);
            write_u32(buf, slot, 0);
            plan.touched.insert(ResizeTouched::INDIRECT);
            v
        }
        Slot::Indirect2 { outer, inner } => {
            if plan.indirect2_buf.is_none() {
                if plan.inode.indirect2 == 0 {
                    return Err(Error::Io);
                }
                plan.indirect2_blockno = plan.inode.indirect2;
                plan.indirect2_buf = Some(dev.block_bytes(plan.inode.indirect2));
            }
            let child_blockno = read_u32(plan.indirect2_buf.as_ref().ok_or(Error::Io)?, outer);
            if plan.indirect_blockno != child_blockno {
                if child_blockno == 0 {
                    return Err(Error::Io);
                }
                plan.indirect_blockno = child_blockno;
                plan.indirect_buf = Some(dev.block_bytes(child_blockno));
            }
            let buf = plan.indirect_buf.as_mut().ok_or(Error::Io)?;
            let v = read_u32(buf, inner);
            write_u32(buf, inner, 0);
            plan.touched.insert(ResizeTouched::INDIRECT);
            v
        }
    };
    plan.affected.push(freed);
    plan.inode.size -= BLOCK_SIZE as u32;

    let mut collapsed = false;

    if blockmap::leaves_indirect_region(n) {
        plan.inode.indirect = 0;
        plan.touched.insert(ResizeTouched::INDIRECT | ResizeTouched::INDIRECT_FREED);
        collapsed = true;
    }
    if let Slot::Indirect2 { outer, inner: 0 } = slot {
        plan.touched.insert(ResizeTouched::INDIRECT2);
        if let Some(buf) = plan.indirect2_buf.as_mut() {
            write_u32(buf, outer, 0);
        }
        plan.touched.insert(ResizeTouched::INDIRECT_FREED);
        collapsed = true;
    }
    if blockmap::leaves_indirect2_region(n) {
        plan.inode.indirect2 = 0;
        plan.touched.insert(ResizeTouched::INDIRECT2 | ResizeTouched::INDIRECT2_FREED);
    }

    Ok(if collapsed { StepOutcome::Collapsed } else { StepOutcome::Progressed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::bitmap::scan_free;

    struct FakeDev {
        bitmap: Vec<u8>,
        blocks: alloc::collections::BTreeMap<u32, Vec<u8>>,
    }

    impl PlannerSource for FakeDev {
        fn find_free_block(&self, lo: u32, hi: u32) -> u32 {
            scan_free(&self.bitmap, lo, hi, self.nblocks())
        }
        fn nblocks(&self) -> u32 {
            (self.bitmap.len() * 8) as u32
        }
        fn first_data(&self) -> u32 {
            10
        }
        fn block_bytes(&self, blockno: u32) -> Vec<u8> {
            self.blocks.get(&blockno).cloned().unwrap_or_else(|| vec![0u8; BLOCK_SIZE])
        }
    }

    fn fake_dev() -> FakeDev {
        FakeDev {
            bitmap: vec![0xffu8; 128], // 1024 blocks, all free
            blocks: Default::default(),
        }
    }

    #[test]
    fn add_single_direct_block() {
        let dev = fake_dev();
        let mut plan = ResizePlan::new(RawInode::default(), 10);
        let outcome = add_block_file(&dev, &mut plan).unwrap();
        assert_eq!(outcome, StepOutcome::Progressed);
        assert_eq!(plan.inode.size, BLOCK_SIZE as u32);
        assert_eq!(plan.affected.len(), 1);
        assert_ne!(plan.inode.direct[0], 0);
    }

    #[test]
    fn crossing_into_indirect_region_stops_batch_unless_first() {
        let dev = fake_dev();
        let mut plan = ResizePlan::new(RawInode::default(), 10);
        for _ in 0..crate::layout::NDIRECT {
            add_block_file(&dev, &mut plan).unwrap();
        }
        // next add is the first indirect-region block in a non-empty batch: must stop
        let outcome = add_block_file(&dev, &mut plan).unwrap();
        assert_eq!(outcome, StepOutcome::StopBatch);
        assert_eq!(plan.inode.indirect, 0);

        // retried as the first reservation of a fresh batch, it succeeds
        let mut plan2 = ResizePlan::new(plan.inode, 10);
        let outcome = add_block_file(&dev, &mut plan2).unwrap();
        assert_eq!(outcome, StepOutcome::Progressed);
        assert_ne!(plan2.inode.indirect, 0);
        assert!(plan2.touched.contains(ResizeTouched::INDIRECT));
    }

    #[test]
    fn grow_then_shrink_round_trips_size() {
        let dev = fake_dev();
        let mut plan = ResizePlan::new(RawInode::default(), 10);
        add_block_file(&dev, &mut plan).unwrap();
        add_block_file(&dev, &mut plan).unwrap();
        assert_eq!(plan.inode.size, 2 * BLOCK_SIZE as u32);
        free_block_file(&dev, &mut plan).unwrap();
        assert_eq!(plan.inode.size, BLOCK_SIZE as u32);
        free_block_file(&dev, &mut plan).unwrap();
        assert_eq!(plan.inode.size, 0);
    }
}
