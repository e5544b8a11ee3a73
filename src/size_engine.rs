//! Driving the resize planner across as many journal batches as a size
//! change needs (`spec.md` §4.6, component C6).
//!
//! [`change_size`] is the only place that loops [`crate::resize`] and
//! [`crate::journal`] together: it keeps calling
//! [`crate::resize::add_block_file`] or [`crate::resize::free_block_file`]
//! against one [`crate::resize::ResizePlan`] until that plan is full or hits
//! a meta-block boundary, stages and applies it, and starts a fresh plan
//! seeded from the just-applied inode — repeating until the target size is
//! reached.

use crate::block_device::BlockDevice;
use crate::error::{Error, FsResult};
use crate::journal::{ExecuteType, Journal, StagedBatch};
use crate::layout::{BLOCK_SIZE, JMAX, MAXFILESIZE};
use crate::resize::{add_block_file, free_block_file, ResizePlan, StepOutcome};
use crate::sys::inode::RawInode;

/// Leave headroom in a batch for the up-to-two meta blocks a single
/// [`add_block_file`] call can still append after this check passes.
const MAX_DATA_PER_BATCH: usize = JMAX - 4;

/// Grow or shrink inode `ino` to exactly `new_size` bytes, rounding up to a
/// whole number of blocks the way the rest of the crate treats file length
/// (partial last blocks are zero-padded by [`crate::io`], not here).
///
/// Returns [`Error::NoSpace`] if growth would exceed [`MAXFILESIZE`] or the
/// device runs out of free blocks; in either case the file is left exactly
/// as large as it was before the call (whatever batches already applied
/// stay applied — this mirrors a real crash landing mid-resize, which
/// [`Journal::recover`] would leave in the same state).
pub fn change_size(dev: &mut BlockDevice, ino: u32, new_size: u64) -> FsResult<()> {
    if new_size > MAXFILESIZE {
        return Err(Error::NoSpace);
    }
    let target_blocks = div_ceil(new_size, BLOCK_SIZE as u64);

    loop {
        let inode = dev.read_inode(ino);
        let current_blocks = inode.size as u64 / BLOCK_SIZE as u64;
        if current_blocks == target_blocks {
            break;
        }
        if current_blocks < target_blocks {
            grow_one_batch(dev, ino, inode, target_blocks)?;
        } else {
            shrink_one_batch(dev, ino, inode, target_blocks)?;
        }
    }
    Ok(())
}

fn grow_one_batch(dev: &mut BlockDevice, ino: u32, inode: RawInode, target_blocks: u64) -> FsResult<()> {
    let locality = inode.direct[0].max(dev.superblock().firstdatab);
    let mut plan = ResizePlan::new(inode, locality);
    loop {
        let current = plan.inode.size as u64 / BLOCK_SIZE as u64;
        if current >= target_blocks {
            break;
        }
        if plan.affected.len() >= MAX_DATA_PER_BATCH {
            break;
        }
        match add_block_file(dev, &mut plan)? {
            StepOutcome::Progressed => continue,
            StepOutcome::StopBatch => break,
            StepOutcome::Collapsed => break,
        }
    }
    commit(dev, ino, ExecuteType::Alloc, plan)
}

fn shrink_one_batch(dev: &mut BlockDevice, ino: u32, inode: RawInode, target_blocks: u64) -> FsResult<()> {
    let locality = inode.direct[0].max(dev.superblock().firstdatab);
    let mut plan = ResizePlan::new(inode, locality);
    loop {
        let current = plan.inode.size as u64 / BLOCK_SIZE as u64;
        if current <= target_blocks {
            break;
        }
        if plan.affected.len() >= MAX_DATA_PER_BATCH {
            break;
        }
        match free_block_file(dev, &mut plan)? {
            StepOutcome::Progressed => continue,
            StepOutcome::Collapsed => break,
            StepOutcome::StopBatch => break,
        }
    }
    commit(dev, ino, ExecuteType::Free, plan)
}

fn commit(dev: &mut BlockDevice, ino: u32, kind: ExecuteType, plan: ResizePlan) -> FsResult<()> {
    let batch = match kind {
        ExecuteType::Alloc => StagedBatch::from_alloc_plan(ino, plan),
        _ => StagedBatch::from_free_plan(ino, plan),
    };
    if batch.affected.is_empty() && batch.indirect_blockno == 0 && batch.indirect2_blockno == 0 {
        // Nothing changed this round (a `StopBatch` landed on an empty
        // plan, which can't happen, or target_blocks == current already);
        // avoid staging a no-op batch.
        return Ok(());
    }
    Journal::stage(dev, kind, &batch)?;
    Journal::apply(dev)
}

fn div_ceil(n: u64, d: u64) -> u64 {
    (n + d - 1) / d
}
