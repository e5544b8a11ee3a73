//! Directory scanning and slot allocation (`spec.md` §4.8, component C8).
//!
//! A directory file's contents are a dense array of [`DirEntry`] records,
//! [`ENTRIES_PER_BLOCK`] per block. Everything here is read-only scanning
//! except [`find_free_slot`], which may grow the directory by one block
//! through [`crate::size_engine::change_size`] — already its own committed
//! journal batch, independent of whatever [`crate::ops`] stages next for
//! the entry itself.

use crate::block_device::BlockDevice;
use crate::error::{Error, FsResult};
use crate::layout::BLOCK_SIZE;
use crate::size_engine::change_size;
use crate::sys::dirent::{DirEntry, DIRENT_SIZE};
use crate::sys::inode::{FileType, RawInode};
use alloc::vec::Vec;

pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIRENT_SIZE;

/// A free (tombstoned) directory-entry slot ready to be overwritten.
#[derive(Debug, Clone, Copy)]
pub struct BlankSlot {
    pub blockno: u32,
    pub offset: usize,
}

/// One entry surfaced by [`readdir`]: the synthetic `.`/`..` names at
/// cursor 0 and 1, or a record out of the dense array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaddirEntry {
    Dot,
    DotDot,
    Entry { name: Vec<u8>, ino: u32 },
}

fn require_directory(dir: &RawInode) -> FsResult<()> {
    if dir.file_type()? != FileType::Directory {
        return Err(Error::NotPermitted);
    }
    Ok(())
}

fn entry_count(dir: &RawInode) -> u64 {
    dir.size as u64 / DIRENT_SIZE as u64
}

fn read_entry(dev: &BlockDevice, dir: &RawInode, idx: u64) -> FsResult<DirEntry> {
    let block_index = idx / ENTRIES_PER_BLOCK as u64;
    let slot = (idx % ENTRIES_PER_BLOCK as u64) as usize;
    let blockno = dev.inode_block_at_offset(dir, block_index * BLOCK_SIZE as u64);
    if blockno == 0 {
        return Err(Error::Io);
    }
    let off = slot * DIRENT_SIZE;
    Ok(DirEntry::from_bytes(&dev.block(blockno)[off..off + DIRENT_SIZE]))
}

/// Linear scan for a live entry named `name`. Returns its inode number.
pub fn find_direntry(dev: &BlockDevice, dir: &RawInode, name: &[u8]) -> FsResult<Option<u32>> {
    require_directory(dir)?;
    let total = entry_count(dir);
    for idx in 0..total {
        let entry = read_entry(dev, dir, idx)?;
        if !entry.is_tombstone() && entry.name() == name {
            return Ok(Some(entry.od_ino));
        }
    }
    Ok(None)
}

/// Linear scan for a live entry named `name`, also returning its exact
/// byte location so the caller can tombstone it in place.
pub fn find_direntry_slot(dev: &BlockDevice, dir: &RawInode, name: &[u8]) -> FsResult<Option<(BlankSlot, u32)>> {
    require_directory(dir)?;
    let total = entry_count(dir);
    for idx in 0..total {
        let block_index = idx / ENTRIES_PER_BLOCK as u64;
        let slot = (idx % ENTRIES_PER_BLOCK as u64) as usize;
        let blockno = dev.inode_block_at_offset(dir, block_index * BLOCK_SIZE as u64);
        if blockno == 0 {
            return Err(Error::Io);
        }
        let off = slot * DIRENT_SIZE;
        let entry = DirEntry::from_bytes(&dev.block(blockno)[off..off + DIRENT_SIZE]);
        if !entry.is_tombstone() && entry.name() == name {
            return Ok(Some((BlankSlot { blockno, offset: off }, entry.od_ino)));
        }
    }
    Ok(None)
}

/// Find the first tombstoned slot in `dir_ino`'s dense array, growing the
/// directory by one freshly zeroed block if none exists.
///
/// Propagates [`Error::NoSpace`] if the grow fails — unlike the source's
/// `create_blank_direntry`, which drops the error from its `change_size`
/// call on one path (`spec.md` §9, open question).
pub fn find_free_slot(dev: &mut BlockDevice, dir_ino: u32) -> FsResult<BlankSlot> {
    let dir = dev.read_inode(dir_ino);
    require_directory(&dir)?;
    let total = entry_count(&dir);
    for idx in 0..total {
        let block_index = idx / ENTRIES_PER_BLOCK as u64;
        let slot = (idx % ENTRIES_PER_BLOCK as u64) as usize;
        let blockno = dev.inode_block_at_offset(&dir, block_index * BLOCK_SIZE as u64);
        if blockno == 0 {
            return Err(Error::Io);
        }
        let off = slot * DIRENT_SIZE;
        let entry = DirEntry::from_bytes(&dev.block(blockno)[off..off + DIRENT_SIZE]);
        if entry.is_tombstone() {
            return Ok(BlankSlot { blockno, offset: off });
        }
    }

    let blocks_before = dir.size as u64 / BLOCK_SIZE as u64;
    let new_size = dir.size as u64 + BLOCK_SIZE as u64;
    change_size(dev, dir_ino, new_size)?;
    let grown = dev.read_inode(dir_ino);
    let blockno = dev.inode_block_at_offset(&grown, blocks_before * BLOCK_SIZE as u64);
    if blockno == 0 {
        return Err(Error::Io);
    }
    Ok(BlankSlot { blockno, offset: 0 })
}

/// Emit the entry at `cursor`: synthetic `.`/`..` at 0 and 1, then the
/// dense array (skipping tombstones), until `cursor` reaches `size /
/// entry_size + 2`. Returns `None` past the end.
pub fn readdir(dev: &BlockDevice, dir_ino: u32, cursor: u64) -> FsResult<Option<(ReaddirEntry, u64)>> {
    let dir = dev.read_inode(dir_ino);
    require_directory(&dir)?;
    let total = entry_count(&dir);
    let end = total + 2;

    let mut c = cursor;
    if c >= end {
        return Ok(None);
    }
    if c == 0 {
        return Ok(Some((ReaddirEntry::Dot, 1)));
    }
    if c == 1 {
        return Ok(Some((ReaddirEntry::DotDot, 2)));
    }
    loop {
        if c >= end {
            return Ok(None);
        }
        let idx = c - 2;
        let entry = read_entry(dev, &dir, idx)?;
        c += 1;
        if !entry.is_tombstone() {
            return Ok(Some((
                ReaddirEntry::Entry {
                    name: entry.name().to_vec(),
                    ino: entry.od_ino,
                },
                c,
            )));
        }
    }
}
