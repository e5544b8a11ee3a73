//! The write-ahead journal (`spec.md` §4.5, component C5).
//!
//! Every mutation wider than one field goes through here: [`Journal::stage`]
//! copies a [`StagedBatch`] into the fixed journal region and only then
//! flips `committed`; [`Journal::apply`] copies the staged effect onto the
//! live bitmap, inode table and data blocks and clears the region again.
//! [`Journal::recover`] is the mount-time half: replay a committed batch
//! found left over from a crash, or discard an uncommitted one — the live
//! structures were never touched in that case, so discarding is a no-op.
//!
//! The payload (affected list, snapshots, data) is always written *before*
//! the header's `committed` flag, and the flag is cleared *before* anything
//! else at the start of `apply`. A crash can therefore only ever be caught
//! with `committed == 0` (nothing to redo) or `committed == 1` with a fully
//! written payload (safe to redo in full) — never a half-written payload
//! mistaken for a complete one.

use crate::block_device::BlockDevice;
use crate::error::{Error, FsResult};
use crate::layout::{BLOCK_SIZE, JMAX};
use crate::sys::inode::RawInode;
use alloc::vec::Vec;
use core::mem::size_of;

bitflags::bitflags! {
    /// Which second-level meta blocks a batch touches. Named for *what*
    /// changed, not *whether it is new* — an amended pre-existing
    /// indirect² block sets the same bit as a freshly allocated one, since
    /// both need their scratch buffer copied into place at apply time.
    pub struct ResizeTouched: u32 {
        const INDIRECT  = 0b0001;
        const INDIRECT2 = 0b0010;
        /// Set alongside `INDIRECT` when the touched indirect-class block
        /// (the inode's own `indirect`, or a child reached through
        /// `indirect2`) lost its last live entry this batch and should be
        /// returned to the free-block bitmap rather than written back.
        const INDIRECT_FREED  = 0b0100;
        /// Same, for the top-level `indirect2` block.
        const INDIRECT2_FREED = 0b1000;
    }
}

/// What kind of batch a journal slot holds. `Empty` means nothing is
/// staged; every other variant drives [`Journal::apply`]'s dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExecuteType {
    Empty = 0,
    Write = 1,
    Free = 2,
    Alloc = 3,
    Create = 4,
    HardLink = 5,
}

impl ExecuteType {
    fn from_u32(v: u32) -> ExecuteType {
        match v {
            1 => ExecuteType::Write,
            2 => ExecuteType::Free,
            3 => ExecuteType::Alloc,
            4 => ExecuteType::Create,
            5 => ExecuteType::HardLink,
            _ => ExecuteType::Empty,
        }
    }
}

/// Fixed layout of journal block 0 (`spec.md` §6, "Journal header").
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct JournalHeader {
    pub execute_type: u32,
    pub committed: u32,
    pub target_ino: u32,
    pub inode_after: RawInode,
    pub n_blocks_affected: u32,
    pub indirect_blockno: u32,
    pub indirect2_blockno: u32,
    pub resize_type: u32,
    pub dir_data_blockno: u32,
}

const _: () = assert!(size_of::<JournalHeader>() <= BLOCK_SIZE);

impl Default for JournalHeader {
    fn default() -> Self {
        JournalHeader {
            execute_type: ExecuteType::Empty as u32,
            committed: 0,
            target_ino: 0,
            inode_after: RawInode::default(),
            n_blocks_affected: 0,
            indirect_blockno: 0,
            indirect2_blockno: 0,
            resize_type: 0,
            dir_data_blockno: 0,
        }
    }
}

impl JournalHeader {
    pub fn execute_type(&self) -> ExecuteType {
        ExecuteType::from_u32(self.execute_type)
    }

    pub fn is_committed(&self) -> bool {
        self.committed != 0
    }

    pub fn resize_touched(&self) -> ResizeTouched {
        ResizeTouched::from_bits_truncate(self.resize_type)
    }
}

/// Everything [`Journal::stage`] needs to write a batch, and
/// [`Journal::apply`] needs to realize it. Produced either from a finished
/// [`crate::resize::ResizePlan`] (grow/shrink) or directly by
/// [`crate::io`] (a single data-block write) and [`crate::ops`] (a
/// directory-entry write for create/hardlink).
pub struct StagedBatch {
    pub target_ino: u32,
    pub inode_after: RawInode,
    /// Block numbers in the order the header's affected-block list holds
    /// them: any newly created meta block first (so its own number is
    /// already named before anything that points at it), then data blocks.
    pub affected: Vec<u32>,
    pub indirect_blockno: u32,
    pub indirect_payload: Option<Vec<u8>>,
    pub indirect2_blockno: u32,
    pub indirect2_payload: Option<Vec<u8>>,
    pub touched: ResizeTouched,
    /// Content bytes for each entry of `affected` that is a *data* block
    /// (not a meta block just allocated this batch). Empty for pure
    /// alloc/free batches that only change the block map, not content.
    pub data_payloads: Vec<(u32, Vec<u8>)>,
    pub dir_data_blockno: u32,
    pub dir_data_payload: Option<Vec<u8>>,
}

impl StagedBatch {
    /// A grown batch: every entry in the plan's affected list is a freshly
    /// reserved data block, so each gets a zero-fill payload journaled
    /// alongside it (new blocks must read as zeroes, the same as a freshly
    /// formatted image's data region).
    pub fn from_alloc_plan(target_ino: u32, plan: crate::resize::ResizePlan) -> StagedBatch {
        let (inode_after, affected, indirect_blockno, indirect_payload, indirect2_blockno, indirect2_payload, touched) =
            plan.into_parts();
        let data_payloads = affected.iter().map(|&b| (b, alloc::vec![0u8; BLOCK_SIZE])).collect();
        StagedBatch {
            target_ino,
            inode_after,
            affected,
            indirect_blockno,
            indirect_payload,
            indirect2_blockno,
            indirect2_payload,
            touched,
            data_payloads,
            dir_data_blockno: 0,
            dir_data_payload: None,
        }
    }

    /// A shrunk batch: the affected list only needs its bits returned to
    /// the bitmap, never any content write.
    pub fn from_free_plan(target_ino: u32, plan: crate::resize::ResizePlan) -> StagedBatch {
        let (inode_after, affected, indirect_blockno, indirect_payload, indirect2_blockno, indirect2_payload, touched) =
            plan.into_parts();
        StagedBatch {
            target_ino,
            inode_after,
            affected,
            indirect_blockno,
            indirect_payload,
            indirect2_blockno,
            indirect2_payload,
            touched,
            data_payloads: Vec::new(),
            dir_data_blockno: 0,
            dir_data_payload: None,
        }
    }

    pub fn for_write(target_ino: u32, inode_after: RawInode, blockno: u32, payload: Vec<u8>) -> StagedBatch {
        StagedBatch {
            target_ino,
            inode_after,
            affected: alloc::vec![blockno],
            indirect_blockno: 0,
            indirect_payload: None,
            indirect2_blockno: 0,
            indirect2_payload: None,
            touched: ResizeTouched::empty(),
            data_payloads: alloc::vec![(blockno, payload)],
            dir_data_blockno: 0,
            dir_data_payload: None,
        }
    }

    pub fn for_dir_entry(target_ino: u32, inode_after: RawInode, dir_data_blockno: u32, payload: Vec<u8>) -> StagedBatch {
        StagedBatch {
            target_ino,
            inode_after,
            affected: Vec::new(),
            indirect_blockno: 0,
            indirect_payload: None,
            indirect2_blockno: 0,
            indirect2_payload: None,
            touched: ResizeTouched::empty(),
            data_payloads: Vec::new(),
            dir_data_blockno,
            dir_data_payload: Some(payload),
        }
    }
}

pub struct Journal;

impl Journal {
    /// Write the batch's payload, then flip `committed`. `kind` says which
    /// apply-time dispatch arm will run.
    pub fn stage(dev: &mut BlockDevice, kind: ExecuteType, batch: &StagedBatch) -> FsResult<()> {
        if batch.affected.len() > JMAX {
            return Err(Error::Io);
        }
        log::trace!(
            "journal: staging {:?} batch for inode {} ({} affected blocks)",
            kind,
            batch.target_ino,
            batch.affected.len()
        );

        dev.write_affected_list(&batch.affected);

        if let Some(buf) = &batch.indirect_payload {
            let blockno = dev.journal_block(3);
            dev.block_mut(blockno).copy_from_slice(buf);
        }
        if let Some(buf) = &batch.indirect2_payload {
            let blockno = dev.journal_block(2);
            dev.block_mut(blockno).copy_from_slice(buf);
        }
        for (i, (_, payload)) in batch.data_payloads.iter().enumerate() {
            let blockno = dev.journal_block(4 + i as u32);
            dev.block_mut(blockno).copy_from_slice(payload);
        }
        if let Some(payload) = &batch.dir_data_payload {
            let blockno = dev.journal_block(4);
            dev.block_mut(blockno).copy_from_slice(payload);
        }

        let header = JournalHeader {
            execute_type: kind as u32,
            committed: 0,
            target_ino: batch.target_ino,
            inode_after: batch.inode_after,
            n_blocks_affected: batch.affected.len() as u32,
            indirect_blockno: batch.indirect_blockno,
            indirect2_blockno: batch.indirect2_blockno,
            resize_type: batch.touched.bits(),
            dir_data_blockno: batch.dir_data_blockno,
        };
        dev.write_journal_header(&header);

        let mut committed = header;
        committed.committed = 1;
        dev.write_journal_header(&committed);
        Ok(())
    }

    /// Realize whatever is currently staged (assumed committed), then clear
    /// the journal region.
    pub fn apply(dev: &mut BlockDevice) -> FsResult<()> {
        let header = dev.read_journal_header();
        let kind = header.execute_type();
        if kind == ExecuteType::Empty {
            return Ok(());
        }

        let n = header.n_blocks_affected as usize;
        let affected = dev.read_affected_list(n);
        let touched = header.resize_touched();
        let first_data = dev.superblock().firstdatab;
        let nblocks = dev.superblock().nblocks;

        match kind {
            ExecuteType::Alloc => {
                for (i, &blockno) in affected.iter().enumerate() {
                    dev.bitmap().allocate_blockno(blockno);
                    // Alloc batches always zero-fill the data blocks they
                    // reserve, journaled the same way a Write batch's
                    // content is.
                    let src = dev.journal_block(4 + i as u32);
                    let payload = dev.block(src).to_vec();
                    dev.block_mut(blockno).copy_from_slice(&payload);
                }
                if touched.contains(ResizeTouched::INDIRECT) {
                    dev.bitmap().allocate_blockno(header.indirect_blockno);
                    let src = dev.journal_block(3);
                    let payload = dev.block(src).to_vec();
                    dev.block_mut(header.indirect_blockno).copy_from_slice(&payload);
                }
                if touched.contains(ResizeTouched::INDIRECT2) {
                    dev.bitmap().allocate_blockno(header.indirect2_blockno);
                    let src = dev.journal_block(2);
                    let payload = dev.block(src).to_vec();
                    dev.block_mut(header.indirect2_blockno).copy_from_slice(&payload);
                }
            }
            ExecuteType::Free => {
                for &blockno in &affected {
                    dev.bitmap().free_block(blockno, first_data, nblocks);
                }
                if touched.contains(ResizeTouched::INDIRECT) {
                    if touched.contains(ResizeTouched::INDIRECT_FREED) {
                        dev.bitmap().free_block(header.indirect_blockno, first_data, nblocks);
                    } else {
                        let src = dev.journal_block(3);
                        let payload = dev.block(src).to_vec();
                        dev.block_mut(header.indirect_blockno).copy_from_slice(&payload);
                    }
                }
                if touched.contains(ResizeTouched::INDIRECT2) {
                    if touched.contains(ResizeTouched::INDIRECT2_FREED) {
                        dev.bitmap().free_block(header.indirect2_blockno, first_data, nblocks);
                    } else {
                        let src = dev.journal_block(2);
                        let payload = dev.block(src).to_vec();
                        dev.block_mut(header.indirect2_blockno).copy_from_slice(&payload);
                    }
                }
            }
            ExecuteType::Write => {
                for (blockno, payload) in affected.iter().zip(payload_blocks(dev, n)) {
                    dev.block_mut(*blockno).copy_from_slice(&payload);
                }
            }
            ExecuteType::Create | ExecuteType::HardLink => {
                if header.dir_data_blockno != 0 {
                    let src = dev.journal_block(4);
                    let payload = dev.block(src).to_vec();
                    dev.block_mut(header.dir_data_blockno).copy_from_slice(&payload);
                }
            }
            ExecuteType::Empty => unreachable!(),
        }

        dev.write_inode(header.target_ino, &header.inode_after);
        Self::clear(dev);
        log::trace!("journal: applied {:?} batch for inode {}", kind, header.target_ino);
        Ok(())
    }

    /// Mount-time recovery: replay a committed batch, or silently drop an
    /// uncommitted one (the live image was never touched for it).
    pub fn recover(dev: &mut BlockDevice) -> FsResult<()> {
        let header = dev.read_journal_header();
        if header.execute_type() == ExecuteType::Empty {
            log::trace!("journal: recovery found nothing to replay");
            return Ok(());
        }
        if header.is_committed() {
            log::warn!(
                "journal: recovering committed {:?} batch for inode {} left over from a crash",
                header.execute_type(),
                header.target_ino
            );
            Self::apply(dev)
        } else {
            log::trace!("journal: discarding an uncommitted batch, nothing was live yet");
            Self::clear(dev);
            Ok(())
        }
    }

    fn clear(dev: &mut BlockDevice) {
        dev.write_journal_header(&JournalHeader::default());
    }
}

fn payload_blocks(dev: &BlockDevice, n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| dev.block(dev.journal_block(4 + i as u32)).to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::superblock::Superblock;

    fn fresh_dev(nblocks: u32) -> (Vec<u8>, Superblock) {
        let sb = Superblock::format(nblocks, 64).unwrap();
        (alloc::vec![0u8; nblocks as usize * BLOCK_SIZE], sb)
    }

    #[test]
    fn stage_then_apply_writes_single_block() {
        let (mut image, sb) = fresh_dev(512);
        let mut dev = BlockDevice::new(&mut image, sb);
        let mut inode = RawInode::default();
        inode.ftype = crate::sys::inode::FileType::Regular as u32;
        inode.nlink = 1;
        inode.size = BLOCK_SIZE as u32;
        inode.direct[0] = sb.firstdatab;

        let payload = alloc::vec![0x7au8; BLOCK_SIZE];
        let batch = StagedBatch::for_write(5, inode, sb.firstdatab, payload.clone());
        Journal::stage(&mut dev, ExecuteType::Write, &batch).unwrap();

        let header = dev.read_journal_header();
        assert!(header.is_committed());
        assert_eq!(header.execute_type(), ExecuteType::Write);

        Journal::apply(&mut dev).unwrap();
        assert_eq!(dev.block(sb.firstdatab), &payload[..]);
        assert_eq!(dev.read_inode(5).size, BLOCK_SIZE as u32);

        let cleared = dev.read_journal_header();
        assert_eq!(cleared.execute_type(), ExecuteType::Empty);
        assert!(!cleared.is_committed());
    }

    #[test]
    fn recover_replays_a_committed_but_unapplied_batch() {
        let (mut image, sb) = fresh_dev(512);
        let mut dev = BlockDevice::new(&mut image, sb);
        let mut inode = RawInode::default();
        inode.ftype = crate::sys::inode::FileType::Regular as u32;
        inode.nlink = 1;
        inode.size = BLOCK_SIZE as u32;
        inode.direct[0] = sb.firstdatab;
        let payload = alloc::vec![0x11u8; BLOCK_SIZE];
        let batch = StagedBatch::for_write(7, inode, sb.firstdatab, payload.clone());
        Journal::stage(&mut dev, ExecuteType::Write, &batch).unwrap();

        // simulate a crash right after stage(): the live block was never
        // touched yet.
        assert_ne!(dev.block(sb.firstdatab), &payload[..]);

        Journal::recover(&mut dev).unwrap();
        assert_eq!(dev.block(sb.firstdatab), &payload[..]);
        assert_eq!(dev.read_inode(7).size, BLOCK_SIZE as u32);
    }

    #[test]
    fn recover_discards_an_uncommitted_batch() {
        let (mut image, sb) = fresh_dev(512);
        let mut dev = BlockDevice::new(&mut image, sb);
        let mut header = JournalHeader::default();
        header.execute_type = ExecuteType::Write as u32;
        header.committed = 0;
        header.target_ino = 9;
        dev.write_journal_header(&header);

        Journal::recover(&mut dev).unwrap();
        let cleared = dev.read_journal_header();
        assert_eq!(cleared.execute_type(), ExecuteType::Empty);
        assert_eq!(dev.read_inode(9).nlink, 0);
    }
}
