//! Typed accessors over the raw image (`spec.md` §4.1, component C1).
//!
//! Everything here is pure memory access — no I/O, because the whole image
//! already lives in memory. This is the only place that turns a block
//! index or inode number into a byte range of the backing [`Vec<u8>`].

use crate::journal::JournalHeader;
use crate::layout::{BLOCK_SIZE, JMAX};
use crate::sector::{Address, Size1024};
use crate::sys::bitmap::Bitmap;
use crate::sys::blockmap::{self, Slot};
use crate::sys::inode::RawInode;
use crate::sys::superblock::Superblock;
use crate::volume::Volume;
use alloc::vec::Vec;
use core::mem::size_of;

/// Borrows the whole image alongside the (already-validated, immutable)
/// superblock, and exposes block/inode-granularity accessors over it.
pub struct BlockDevice<'a> {
    image: &'a mut Vec<u8>,
    sb: Superblock,
}

impl<'a> BlockDevice<'a> {
    pub fn new(image: &'a mut Vec<u8>, sb: Superblock) -> BlockDevice<'a> {
        BlockDevice { image, sb }
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    fn block_addr(i: u32) -> Address<Size1024> {
        Address::new(i, 0)
    }

    /// Borrow block `i`'s bytes.
    pub fn block(&self, i: u32) -> &[u8] {
        let start = (i as usize) * BLOCK_SIZE;
        &self.image[start..start + BLOCK_SIZE]
    }

    /// Mutably borrow block `i`'s bytes.
    pub fn block_mut(&mut self, i: u32) -> &mut [u8] {
        let start = (i as usize) * BLOCK_SIZE;
        &mut self.image[start..start + BLOCK_SIZE]
    }

    pub fn zero_block(&mut self, i: u32) {
        self.block_mut(i).fill(0);
    }

    /// The bitmap region, as a [`Bitmap`] over its raw bytes.
    pub fn bitmap(&mut self) -> Bitmap<'_> {
        let start = (crate::layout::BITMAP_START_BLOCK as usize) * BLOCK_SIZE;
        let end = (self.sb.firstinob as usize) * BLOCK_SIZE;
        Bitmap::new(&mut self.image[start..end])
    }

    fn bitmap_bytes(&self) -> &[u8] {
        let start = (crate::layout::BITMAP_START_BLOCK as usize) * BLOCK_SIZE;
        let end = (self.sb.firstinob as usize) * BLOCK_SIZE;
        &self.image[start..end]
    }

    fn inode_addr(&self, ino: u32) -> Address<Size1024> {
        let byte = self.sb.firstinob as u64 * BLOCK_SIZE as u64 + (ino as u64 - 1) * 64;
        Address::from(byte)
    }

    /// Copy inode `ino`'s on-disk record out.
    pub fn read_inode(&self, ino: u32) -> RawInode {
        let start = self.inode_addr(ino);
        let end = start + Address::from(size_of::<RawInode>());
        unsafe { self.image.slice_unchecked(start..end).dynamic_cast::<RawInode>().0 }
    }

    /// Overwrite inode `ino`'s on-disk record.
    pub fn write_inode(&mut self, ino: u32, value: &RawInode) {
        let start = self.inode_addr(ino);
        let end = start + Address::from(size_of::<RawInode>());
        unsafe {
            self.image.slice_unchecked_mut(start..end).write_cast(value);
        }
    }

    /// Read one `u32` block index out of indirect block `blockno` at
    /// `slot`.
    pub fn read_indirect_slot(&self, blockno: u32, slot: usize) -> u32 {
        let base = slot * 4;
        let bytes = &self.block(blockno)[base..base + 4];
        u32::from_le_bytes(bytes.try_into().unwrap())
    }

    pub fn write_indirect_slot(&mut self, blockno: u32, slot: usize, value: u32) {
        let base = slot * 4;
        self.block_mut(blockno)[base..base + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Walk direct / indirect / indirect² as needed to find the data block
    /// backing file offset `off`. Returns `0` (the "out of file" sentinel)
    /// if `off >= inode.size` or `inode` is a symlink.
    pub fn inode_block_at_offset(&self, inode: &RawInode, off: u64) -> u32 {
        if inode.file_type().map(|t| matches!(t, crate::sys::inode::FileType::Symlink)).unwrap_or(true) {
            return 0;
        }
        if off >= inode.size as u64 {
            return 0;
        }
        let n = off / BLOCK_SIZE as u64;
        match blockmap::classify(n) {
            Some(Slot::Direct(i)) => inode.direct[i],
            Some(Slot::Indirect { slot }) => {
                if inode.indirect == 0 {
                    0
                } else {
                    self.read_indirect_slot(inode.indirect, slot)
                }
            }
            Some(Slot::Indirect2 { outer, inner }) => {
                if inode.indirect2 == 0 {
                    return 0;
                }
                let ind_block = self.read_indirect_slot(inode.indirect2, outer);
                if ind_block == 0 {
                    0
                } else {
                    self.read_indirect_slot(ind_block, inner)
                }
            }
            None => 0,
        }
    }

    fn journal_addr(&self) -> Address<Size1024> {
        Address::new(self.sb.firstjournalb, 0)
    }

    /// Block number of journal block `i` (0 = header, 1 = affected list,
    /// 2 = indirect² snapshot, 3 = indirect snapshot, `4..4+n` = payloads).
    pub fn journal_block(&self, i: u32) -> u32 {
        self.sb.firstjournalb + i
    }

    pub fn read_journal_header(&self) -> JournalHeader {
        let start = self.journal_addr();
        let end = start + Address::from(size_of::<JournalHeader>());
        unsafe { self.image.slice_unchecked(start..end).dynamic_cast::<JournalHeader>().0 }
    }

    pub fn write_journal_header(&mut self, header: &JournalHeader) {
        let start = self.journal_addr();
        let end = start + Address::from(size_of::<JournalHeader>());
        unsafe {
            self.image.slice_unchecked_mut(start..end).write_cast(header);
        }
    }

    /// Read the `n` leading entries of the affected-block list (journal
    /// block 1, one `u32` per slot).
    pub fn read_affected_list(&self, n: usize) -> Vec<u32> {
        let blockno = self.journal_block(1);
        (0..n.min(JMAX)).map(|i| self.read_indirect_slot(blockno, i)).collect()
    }

    pub fn write_affected_list(&mut self, entries: &[u32]) {
        let blockno = self.journal_block(1);
        for (i, &v) in entries.iter().enumerate().take(JMAX) {
            self.write_indirect_slot(blockno, i, v);
        }
    }
}

impl<'a> crate::resize::PlannerSource for BlockDevice<'a> {
    fn find_free_block(&self, lo: u32, hi: u32) -> u32 {
        blockmap_bitmap_scan(self.bitmap_bytes(), lo, hi, self.sb.nblocks)
    }

    fn nblocks(&self) -> u32 {
        self.sb.nblocks
    }

    fn first_data(&self) -> u32 {
        self.sb.firstdatab
    }

    fn block_bytes(&self, blockno: u32) -> Vec<u8> {
        self.block(blockno).to_vec()
    }
}

fn blockmap_bitmap_scan(bytes: &[u8], lo: u32, hi: u32, nblocks: u32) -> u32 {
    crate::sys::bitmap::scan_free(bytes, lo, hi, nblocks)
}
