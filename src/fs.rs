//! Top-level entry point: [`Filesystem`] owns an in-memory disk image,
//! mounts it (replaying any pending journal per `spec.md` §4.10,
//! component C10), and exposes the operations of `spec.md` §6.
//!
//! Every mutating call here takes the same [`spin::Mutex`] for its whole
//! duration, which is the "conceptual whole-file-system lock" `spec.md` §5
//! describes — there is only ever one mutator in this core, but expressing
//! it as a real lock means a caller embedding this crate in a context with
//! more than one thread gets the right behaviour for free rather than by
//! convention.

use crate::block_device::BlockDevice;
use crate::dir_engine::ReaddirEntry;
use crate::error::{Error, FsResult};
use crate::journal::Journal;
use crate::layout::{BLOCK_SIZE, ROOT_INODE, SUPERBLOCK_BLOCK};
use crate::ops;
use crate::size_engine::change_size;
use crate::sys::inode::{FileType, RawInode};
use crate::sys::superblock::Superblock;
use alloc::vec::Vec;
use core::mem::size_of;
use spin::Mutex;

/// Attributes a caller may change through [`Filesystem::setattr`]. `None`
/// leaves a field untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct SetAttr {
    pub new_size: Option<u64>,
    pub new_mode: Option<u32>,
}

/// Mount-time options. `spec.md` §1 places dynamic growth and concurrent
/// access out of scope, so today this carries nothing but a read-only
/// flag reserved for a future caller; [`Filesystem::mount`] does not yet
/// enforce it.
#[derive(Debug, Default, Clone, Copy)]
pub struct MountOptions {
    pub read_only: bool,
}

/// Kind of a directory entry, as surfaced to a caller by [`Filesystem::readdir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
}

impl From<FileType> for EntryKind {
    fn from(t: FileType) -> EntryKind {
        match t {
            FileType::Regular => EntryKind::Regular,
            FileType::Directory => EntryKind::Directory,
            FileType::Symlink => EntryKind::Symlink,
        }
    }
}

/// One entry of a directory listing: `(name, inode number, kind, next
/// cursor)`, or `End` once the listing is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirListing {
    Entry { name: Vec<u8>, ino: u32, kind: EntryKind, next_cursor: u64 },
    End,
}

struct Inner {
    image: Vec<u8>,
    sb: Superblock,
}

/// A mounted filesystem. Cheap to clone-and-share via `Arc` since all
/// state lives behind the internal lock.
pub struct Filesystem {
    inner: Mutex<Inner>,
}

fn read_superblock(image: &[u8]) -> FsResult<Superblock> {
    let start = SUPERBLOCK_BLOCK as usize * BLOCK_SIZE;
    let end = start + size_of::<Superblock>();
    if image.len() < end {
        return Err(Error::Io);
    }
    let sb = unsafe { (image[start..end].as_ptr() as *const Superblock).read_unaligned() };
    sb.check_magic()?;
    Ok(sb)
}

fn write_superblock(image: &mut [u8], sb: &Superblock) {
    let start = SUPERBLOCK_BLOCK as usize * BLOCK_SIZE;
    let end = start + size_of::<Superblock>();
    unsafe {
        core::ptr::copy_nonoverlapping(sb as *const Superblock as *const u8, image[start..end].as_mut_ptr(), end - start);
    }
}

impl Filesystem {
    /// Lay out a fresh image of `nblocks` blocks and `ninodes` inodes: the
    /// whole data region is marked free and inode 1 is stamped as the
    /// (empty) root directory.
    pub fn format(nblocks: u32, ninodes: u32) -> FsResult<Filesystem> {
        let sb = Superblock::format(nblocks, ninodes)?;
        let mut image = alloc::vec![0u8; nblocks as usize * BLOCK_SIZE];
        write_superblock(&mut image, &sb);
        {
            let mut dev = BlockDevice::new(&mut image, sb);
            {
                let mut bitmap = dev.bitmap();
                for k in sb.firstdatab..sb.nblocks {
                    bitmap.free_block(k, sb.firstdatab, sb.nblocks);
                }
            }
            let mut root = RawInode::default();
            root.ftype = FileType::Directory as u32;
            root.nlink = 1;
            dev.write_inode(ROOT_INODE, &root);
        }
        log::trace!("formatted fresh image: {} blocks, {} inodes, data starts at {}", sb.nblocks, sb.ninodes, sb.firstdatab);
        Ok(Filesystem { inner: Mutex::new(Inner { image, sb }) })
    }

    /// Mount a previously formatted image, replaying (or discarding)
    /// whatever the journal last staged.
    pub fn mount(mut image: Vec<u8>, _opts: MountOptions) -> FsResult<Filesystem> {
        let sb = read_superblock(&image)?;
        {
            let mut dev = BlockDevice::new(&mut image, sb);
            Journal::recover(&mut dev)?;
        }
        log::trace!("mounted image: {} blocks, {} inodes", sb.nblocks, sb.ninodes);
        Ok(Filesystem { inner: Mutex::new(Inner { image, sb }) })
    }

    /// Hand back the raw image bytes, e.g. to persist them or re-mount
    /// elsewhere. The journal is always clean at rest between calls, so
    /// this is safe to call at any time.
    pub fn into_image(self) -> Vec<u8> {
        self.inner.into_inner().image
    }

    pub fn root_ino(&self) -> u32 {
        ROOT_INODE
    }

    pub fn lookup(&self, dir_ino: u32, name: &[u8]) -> FsResult<u32> {
        let mut guard = self.inner.lock();
        let dev = BlockDevice::new(&mut guard.image, guard.sb);
        ops::lookup(&dev, dir_ino, name)
    }

    pub fn readdir(&self, dir_ino: u32, cursor: u64) -> FsResult<DirListing> {
        let mut guard = self.inner.lock();
        let dev = BlockDevice::new(&mut guard.image, guard.sb);
        match ops::readdir(&dev, dir_ino, cursor)? {
            None => Ok(DirListing::End),
            Some((ReaddirEntry::Dot, next)) => Ok(DirListing::Entry {
                name: b".".to_vec(),
                ino: dir_ino,
                kind: EntryKind::Directory,
                next_cursor: next,
            }),
            Some((ReaddirEntry::DotDot, next)) => Ok(DirListing::Entry {
                name: b"..".to_vec(),
                ino: dir_ino,
                kind: EntryKind::Directory,
                next_cursor: next,
            }),
            Some((ReaddirEntry::Entry { name, ino }, next)) => {
                let kind = dev.read_inode(ino).file_type()?.into();
                Ok(DirListing::Entry { name, ino, kind, next_cursor: next })
            }
        }
    }

    pub fn read(&self, ino: u32, off: u64, buf: &mut [u8]) -> FsResult<usize> {
        let mut guard = self.inner.lock();
        let dev = BlockDevice::new(&mut guard.image, guard.sb);
        crate::io::read(&dev, ino, off, buf)
    }

    pub fn write(&self, ino: u32, off: u64, data: &[u8], append: bool) -> FsResult<usize> {
        let mut guard = self.inner.lock();
        let mut dev = BlockDevice::new(&mut guard.image, guard.sb);
        crate::io::write(&mut dev, ino, off, data, append)
    }

    pub fn setattr(&self, ino: u32, attr: SetAttr) -> FsResult<()> {
        let mut guard = self.inner.lock();
        let mut dev = BlockDevice::new(&mut guard.image, guard.sb);
        if let Some(mode) = attr.new_mode {
            let mut inode = dev.read_inode(ino);
            inode.mode = mode;
            dev.write_inode(ino, &inode);
        }
        if let Some(size) = attr.new_size {
            let inode = dev.read_inode(ino);
            if inode.file_type()? != FileType::Regular {
                return Err(Error::NotPermitted);
            }
            change_size(&mut dev, ino, size)?;
        }
        Ok(())
    }

    pub fn create(&self, dir_ino: u32, name: &[u8], mode: u32) -> FsResult<u32> {
        let mut guard = self.inner.lock();
        let mut dev = BlockDevice::new(&mut guard.image, guard.sb);
        ops::create(&mut dev, dir_ino, name, mode)
    }

    pub fn unlink(&self, dir_ino: u32, name: &[u8]) -> FsResult<()> {
        let mut guard = self.inner.lock();
        let mut dev = BlockDevice::new(&mut guard.image, guard.sb);
        ops::unlink(&mut dev, dir_ino, name)
    }

    pub fn link(&self, src_ino: u32, dir_ino: u32, dst_name: &[u8]) -> FsResult<()> {
        let mut guard = self.inner.lock();
        let mut dev = BlockDevice::new(&mut guard.image, guard.sb);
        ops::hard_link(&mut dev, src_ino, dir_ino, dst_name)
    }

    pub fn symlink(&self, dir_ino: u32, name: &[u8], target: &[u8]) -> FsResult<u32> {
        let mut guard = self.inner.lock();
        let mut dev = BlockDevice::new(&mut guard.image, guard.sb);
        ops::symlink(&mut dev, dir_ino, name, target)
    }

    pub fn follow_symlink(&self, ino: u32, effective_uid: u32) -> FsResult<Vec<u8>> {
        let mut guard = self.inner.lock();
        let dev = BlockDevice::new(&mut guard.image, guard.sb);
        ops::follow_symlink(&dev, ino, effective_uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_creates_empty_root() {
        let fs = Filesystem::format(2048, 128).unwrap();
        assert_eq!(fs.readdir(ROOT_INODE, 0).unwrap(), DirListing::Entry {
            name: b".".to_vec(),
            ino: ROOT_INODE,
            kind: EntryKind::Directory,
            next_cursor: 1,
        });
    }

    #[test]
    fn write_then_read_hello_world() {
        let fs = Filesystem::format(2048, 128).unwrap();
        let f = fs.create(ROOT_INODE, b"f", 0o644).unwrap();
        let n = fs.write(f, 0, b"Hello, world!\n", false).unwrap();
        assert_eq!(n, 14);
        let mut buf = [0u8; 14];
        let r = fs.read(f, 0, &mut buf).unwrap();
        assert_eq!(r, 14);
        assert_eq!(&buf, b"Hello, world!\n");
    }

    #[test]
    fn mount_replays_a_crashed_commit() {
        let (mut image, ino) = {
            let fs = Filesystem::format(2048, 128).unwrap();
            let f = fs.create(ROOT_INODE, b"f", 0o644).unwrap();
            fs.write(f, 0, b"abc", false).unwrap();
            (fs.into_image(), f)
        };

        // Hand-stage a batch and simulate a crash right after commit,
        // before apply: flip `committed` but do not call apply.
        let sb = read_superblock(&image).unwrap();
        let (target_ino, payload) = {
            let mut dev = BlockDevice::new(&mut image, sb);
            let mut inode = dev.read_inode(ino);
            let blockno = dev.inode_block_at_offset(&inode, 0);
            inode.size = 3;
            let payload = alloc::vec![0x42u8; BLOCK_SIZE];
            let batch = crate::journal::StagedBatch::for_write(ino, inode, blockno, payload.clone());
            Journal::stage(&mut dev, crate::journal::ExecuteType::Write, &batch).unwrap();
            (ino, payload)
        };

        let fs = Filesystem::mount(image, MountOptions::default()).unwrap();
        let mut buf = alloc::vec![0u8; BLOCK_SIZE];
        fs.read(target_ino, 0, &mut buf).unwrap();
        assert_eq!(buf, payload);
    }

    #[test]
    fn symlink_conditional_through_filesystem() {
        let fs = Filesystem::format(2048, 128).unwrap();
        let s = fs.symlink(ROOT_INODE, b"s", b"root?/a:/b").unwrap();
        assert_eq!(fs.follow_symlink(s, 0).unwrap(), b"/a");
        assert_eq!(fs.follow_symlink(s, 1000).unwrap(), b"/b");
    }
}
