//! Name-space operations (`spec.md` §4.9, component C9): the things a
//! caller actually asks for — lookup, readdir, create, unlink, hard link,
//! symlink (with its conditional form) and following one.
//!
//! Every operation here either reads without touching the journal
//! (`lookup`, `readdir`, `follow_symlink`) or builds exactly one
//! [`crate::journal::StagedBatch`] and commits it through
//! [`crate::journal::Journal`] — growing the target directory first, via
//! [`crate::dir_engine::find_free_slot`], if a new entry needs room that
//! doesn't exist yet. That grow is its own already-applied journal batch,
//! independent of the entry write that follows it.

use crate::block_device::BlockDevice;
use crate::dir_engine::{self, ReaddirEntry};
use crate::error::{Error, FsResult};
use crate::journal::{ExecuteType, Journal, StagedBatch};
use crate::layout::{MAXNAMELEN, MAXSYMLINKLEN};
use crate::size_engine::change_size;
use crate::sys::dirent::{DirEntry, DIRENT_SIZE};
use crate::sys::inode::{FileType, RawInode};
use alloc::vec::Vec;

/// The literal prefix a conditional symlink target must begin with
/// (`spec.md` §4.9/§6, "conditional symlink convention").
const CONDITIONAL_PREFIX: &[u8] = b"root?";

fn require_directory(dev: &BlockDevice, dir_ino: u32) -> FsResult<RawInode> {
    let dir = dev.read_inode(dir_ino);
    if dir.file_type()? != FileType::Directory {
        return Err(Error::NotPermitted);
    }
    Ok(dir)
}

/// Lowest-numbered inode with `nlink == 0`, per `spec.md` §3 "Lifecycle".
fn alloc_inode(dev: &BlockDevice) -> FsResult<u32> {
    let ninodes = dev.superblock().ninodes;
    for ino in 1..=ninodes {
        if !dev.read_inode(ino).is_live() {
            return Ok(ino);
        }
    }
    log::warn!("ops: no free inode among {} slots", ninodes);
    Err(Error::NoSpace)
}

/// Write `entry` into the given blank slot and stage it as a `Create` or
/// `HardLink` batch whose `target_ino` is the inode that changed
/// (the newly created one, or the link target with its bumped count).
fn stage_direntry_write(
    dev: &mut BlockDevice,
    kind: ExecuteType,
    target_ino: u32,
    inode_after: RawInode,
    slot: dir_engine::BlankSlot,
    entry: DirEntry,
) -> FsResult<()> {
    let mut payload = dev.block(slot.blockno).to_vec();
    entry.write_to(&mut payload[slot.offset..slot.offset + DIRENT_SIZE]);
    let batch = StagedBatch::for_dir_entry(target_ino, inode_after, slot.blockno, payload);
    Journal::stage(dev, kind, &batch)?;
    Journal::apply(dev)
}

/// `lookup(dir_ino, name) -> child_ino`.
pub fn lookup(dev: &BlockDevice, dir_ino: u32, name: &[u8]) -> FsResult<u32> {
    let dir = dev.read_inode(dir_ino);
    dir_engine::find_direntry(dev, &dir, name)?.ok_or(Error::NotFound)
}

/// `readdir(dir_ino, cursor) -> (entry, next_cursor) | None`.
pub fn readdir(dev: &BlockDevice, dir_ino: u32, cursor: u64) -> FsResult<Option<(ReaddirEntry, u64)>> {
    dir_engine::readdir(dev, dir_ino, cursor)
}

/// `create(dir_ino, name, mode) -> new_ino`.
pub fn create(dev: &mut BlockDevice, dir_ino: u32, name: &[u8], mode: u32) -> FsResult<u32> {
    if name.len() > MAXNAMELEN {
        return Err(Error::NameTooLong);
    }
    let dir = require_directory(dev, dir_ino)?;
    if dir_engine::find_direntry(dev, &dir, name)?.is_some() {
        return Err(Error::Exists);
    }

    let new_ino = alloc_inode(dev)?;
    let slot = dir_engine::find_free_slot(dev, dir_ino)?;

    let mut inode = RawInode::default();
    inode.ftype = FileType::Regular as u32;
    inode.nlink = 1;
    inode.mode = mode;
    inode.size = 0;

    let entry = DirEntry::new(new_ino, name).ok_or(Error::NameTooLong)?;
    log::trace!("ops: create {:?} as inode {} in dir {}", core::str::from_utf8(name).ok(), new_ino, dir_ino);
    stage_direntry_write(dev, ExecuteType::Create, new_ino, inode, slot, entry)?;
    Ok(new_ino)
}

/// `link(src_ino, dir_ino, dst_name)`.
pub fn hard_link(dev: &mut BlockDevice, src_ino: u32, dir_ino: u32, dst_name: &[u8]) -> FsResult<()> {
    if dst_name.len() > MAXNAMELEN {
        return Err(Error::NameTooLong);
    }
    let dir = require_directory(dev, dir_ino)?;
    if dir_engine::find_direntry(dev, &dir, dst_name)?.is_some() {
        return Err(Error::Exists);
    }
    let mut src = dev.read_inode(src_ino);
    if !src.is_live() {
        return Err(Error::Io);
    }
    src.nlink += 1;

    let slot = dir_engine::find_free_slot(dev, dir_ino)?;
    let entry = DirEntry::new(src_ino, dst_name).ok_or(Error::NameTooLong)?;
    log::trace!("ops: link inode {} as {:?} in dir {}", src_ino, core::str::from_utf8(dst_name).ok(), dir_ino);
    stage_direntry_write(dev, ExecuteType::HardLink, src_ino, src, slot, entry)
}

/// `unlink(dir_ino, name)`.
pub fn unlink(dev: &mut BlockDevice, dir_ino: u32, name: &[u8]) -> FsResult<()> {
    let dir = require_directory(dev, dir_ino)?;
    let (slot, ino) = dir_engine::find_direntry_slot(dev, &dir, name)?.ok_or(Error::NotFound)?;

    let mut target = dev.read_inode(ino);
    let was_symlink = target.file_type()? == FileType::Symlink;
    target.nlink = target.nlink.saturating_sub(1);
    let reached_zero = target.nlink == 0;
    if reached_zero && was_symlink {
        target.clear();
    }

    let mut payload = dev.block(slot.blockno).to_vec();
    DirEntry::tombstone().write_to(&mut payload[slot.offset..slot.offset + DIRENT_SIZE]);
    let batch = StagedBatch::for_write(ino, target, slot.blockno, payload);
    log::trace!("ops: unlink {:?} (inode {}) from dir {}", core::str::from_utf8(name).ok(), ino, dir_ino);
    Journal::stage(dev, ExecuteType::Write, &batch)?;
    Journal::apply(dev)?;

    if reached_zero && !was_symlink {
        change_size(dev, ino, 0)?;
    }
    Ok(())
}

/// Validate and transform a raw symlink target into the stored form: a
/// conditional target's `:` delimiter is rewritten to a NUL so the two
/// branches become NUL-separated in place (`spec.md` §4.9/§6).
///
/// A target starting with `root?` but with no `:` is rejected outright —
/// `spec.md` §9 flags this as undefined in the source (it would later
/// over-run its string while following).
fn prepare_target(target: &[u8]) -> FsResult<Vec<u8>> {
    if target.len() > MAXSYMLINKLEN {
        return Err(Error::NameTooLong);
    }
    if let Some(rest) = target.strip_prefix(CONDITIONAL_PREFIX) {
        let colon = rest.iter().position(|&b| b == b':').ok_or(Error::NameTooLong)?;
        let mut stored = target.to_vec();
        stored[CONDITIONAL_PREFIX.len() + colon] = 0;
        Ok(stored)
    } else {
        Ok(target.to_vec())
    }
}

/// `symlink(dir_ino, name, target) -> new_ino`.
pub fn symlink(dev: &mut BlockDevice, dir_ino: u32, name: &[u8], target: &[u8]) -> FsResult<u32> {
    if name.len() > MAXNAMELEN {
        return Err(Error::NameTooLong);
    }
    let dir = require_directory(dev, dir_ino)?;
    if dir_engine::find_direntry(dev, &dir, name)?.is_some() {
        return Err(Error::Exists);
    }
    let stored_target = prepare_target(target)?;

    let new_ino = alloc_inode(dev)?;
    let mut inode = RawInode::default();
    inode.ftype = FileType::Symlink as u32;
    inode.nlink = 1;
    inode.set_symlink_target(&stored_target);
    // The inode record is otherwise unreachable until the directory entry
    // naming it is written, so it does not need to go through the journal
    // on its own (`spec.md` §4.9).
    dev.write_inode(new_ino, &inode);

    let slot = dir_engine::find_free_slot(dev, dir_ino)?;
    let entry = DirEntry::new(new_ino, name).ok_or(Error::NameTooLong)?;
    log::trace!("ops: symlink {:?} -> inode {} in dir {}", core::str::from_utf8(name).ok(), new_ino, dir_ino);
    stage_direntry_write(dev, ExecuteType::Create, new_ino, inode, slot, entry)?;
    Ok(new_ino)
}

/// `follow_symlink(ino, effective_uid) -> resolved_target_bytes`.
pub fn follow_symlink(dev: &BlockDevice, ino: u32, effective_uid: u32) -> FsResult<Vec<u8>> {
    let inode = dev.read_inode(ino);
    if inode.file_type()? != FileType::Symlink {
        return Err(Error::NotPermitted);
    }
    let raw = inode.symlink_target();
    if let Some(rest) = raw.strip_prefix(CONDITIONAL_PREFIX) {
        let nul = rest.iter().position(|&b| b == 0).ok_or(Error::Io)?;
        if effective_uid == 0 {
            Ok(rest[..nul].to_vec())
        } else {
            Ok(rest[nul + 1..].to_vec())
        }
    } else {
        Ok(raw.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BLOCK_SIZE;
    use crate::sys::superblock::Superblock;
    use alloc::vec;
    use alloc::vec::Vec;

    fn fresh_dev(nblocks: u32) -> (Vec<u8>, Superblock) {
        let sb = Superblock::format(nblocks, 64).unwrap();
        (vec![0u8; nblocks as usize * BLOCK_SIZE], sb)
    }

    fn new_root(dev: &mut BlockDevice) {
        let mut inode = RawInode::default();
        inode.ftype = FileType::Directory as u32;
        inode.nlink = 1;
        dev.write_inode(1, &inode);
    }

    #[test]
    fn create_then_lookup() {
        let (mut image, sb) = fresh_dev(2048);
        let mut dev = BlockDevice::new(&mut image, sb);
        new_root(&mut dev);
        let ino = create(&mut dev, 1, b"f", 0o644).unwrap();
        assert_eq!(lookup(&dev, 1, b"f").unwrap(), ino);
        let inode = dev.read_inode(ino);
        assert_eq!(inode.nlink, 1);
        assert_eq!(inode.size, 0);
    }

    #[test]
    fn create_duplicate_name_fails() {
        let (mut image, sb) = fresh_dev(2048);
        let mut dev = BlockDevice::new(&mut image, sb);
        new_root(&mut dev);
        create(&mut dev, 1, b"f", 0o644).unwrap();
        assert_eq!(create(&mut dev, 1, b"f", 0o644), Err(Error::Exists));
    }

    #[test]
    fn name_too_long_rejected() {
        let (mut image, sb) = fresh_dev(2048);
        let mut dev = BlockDevice::new(&mut image, sb);
        new_root(&mut dev);
        let long = [b'a'; MAXNAMELEN + 1];
        assert_eq!(create(&mut dev, 1, &long, 0), Err(Error::NameTooLong));
    }

    #[test]
    fn sixty_four_creates_cross_a_block_boundary() {
        let (mut image, sb) = fresh_dev(4096);
        let mut dev = BlockDevice::new(&mut image, sb);
        new_root(&mut dev);
        for i in 0..64u32 {
            let name = alloc::format!("a{i}");
            create(&mut dev, 1, name.as_bytes(), 0o644).unwrap();
        }
        let dir = dev.read_inode(1);
        assert_eq!(dir.size as u64, 64 * DIRENT_SIZE as u64);
        for i in 0..64u32 {
            let name = alloc::format!("a{i}");
            assert!(lookup(&dev, 1, name.as_bytes()).is_ok());
        }
    }

    #[test]
    fn hard_link_then_unlink_original_keeps_content() {
        let (mut image, sb) = fresh_dev(2048);
        let mut dev = BlockDevice::new(&mut image, sb);
        new_root(&mut dev);
        let f = create(&mut dev, 1, b"f", 0o644).unwrap();
        crate::io::write(&mut dev, f, 0, b"payload", false).unwrap();

        hard_link(&mut dev, f, 1, b"g").unwrap();
        assert_eq!(dev.read_inode(f).nlink, 2);

        unlink(&mut dev, 1, b"f").unwrap();
        assert_eq!(lookup(&dev, 1, b"f"), Err(Error::NotFound));
        let g = lookup(&dev, 1, b"g").unwrap();
        assert_eq!(g, f);
        assert_eq!(dev.read_inode(f).nlink, 1);

        let mut buf = [0u8; 7];
        crate::io::read(&dev, g, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"payload");
    }

    #[test]
    fn unlink_last_link_frees_blocks() {
        let (mut image, sb) = fresh_dev(4096);
        let mut dev = BlockDevice::new(&mut image, sb);
        new_root(&mut dev);
        let f = create(&mut dev, 1, b"f", 0o644).unwrap();
        let data = vec![0xaau8; (crate::layout::NDIRECT + 2) * BLOCK_SIZE];
        crate::io::write(&mut dev, f, 0, &data, false).unwrap();

        unlink(&mut dev, 1, b"f").unwrap();
        let inode = dev.read_inode(f);
        assert_eq!(inode.size, 0);
        assert_eq!(inode.indirect, 0);
        assert!(inode.direct.iter().all(|&b| b == 0));
    }

    #[test]
    fn symlink_roundtrip_plain_target() {
        let (mut image, sb) = fresh_dev(2048);
        let mut dev = BlockDevice::new(&mut image, sb);
        new_root(&mut dev);
        let s = symlink(&mut dev, 1, b"s", b"/a/b").unwrap();
        assert_eq!(follow_symlink(&dev, s, 0).unwrap(), b"/a/b");
        assert_eq!(follow_symlink(&dev, s, 1000).unwrap(), b"/a/b");
    }

    #[test]
    fn conditional_symlink_resolves_by_uid() {
        let (mut image, sb) = fresh_dev(2048);
        let mut dev = BlockDevice::new(&mut image, sb);
        new_root(&mut dev);
        let s = symlink(&mut dev, 1, b"s", b"root?/a:/b").unwrap();
        assert_eq!(follow_symlink(&dev, s, 0).unwrap(), b"/a");
        assert_eq!(follow_symlink(&dev, s, 1000).unwrap(), b"/b");
    }

    #[test]
    fn conditional_symlink_without_colon_is_rejected() {
        let (mut image, sb) = fresh_dev(2048);
        let mut dev = BlockDevice::new(&mut image, sb);
        new_root(&mut dev);
        assert_eq!(symlink(&mut dev, 1, b"s", b"root?nope"), Err(Error::NameTooLong));
    }

    #[test]
    fn create_on_non_directory_is_not_permitted() {
        let (mut image, sb) = fresh_dev(2048);
        let mut dev = BlockDevice::new(&mut image, sb);
        new_root(&mut dev);
        let f = create(&mut dev, 1, b"f", 0o644).unwrap();
        assert_eq!(create(&mut dev, f, b"x", 0o644), Err(Error::NotPermitted));
    }
}
