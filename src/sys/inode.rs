//! The on-disk inode record and its in-memory tagged view.
//!
//! `spec.md` §9 flags the source's function-pointer dispatch table as
//! something to re-express as a tagged sum. [`FileType`] is that sum; a
//! [`RawInode`] is the fixed 64-byte on-disk record, reinterpreted
//! per-type the way a C union would be, but through explicit accessor
//! methods instead of unchecked field aliasing.

use crate::error::Error;
use crate::layout::{MAXSYMLINKLEN, NDIRECT};
use core::convert::TryFrom;
use core::fmt::{self, Debug};
use core::{mem, slice};

bitflags::bitflags! {
    /// UNIX-style permission bits. Only the low 9 bits are meaningful.
    pub struct Mode: u32 {
        const U_READ  = 0o400;
        const U_WRITE = 0o200;
        const U_EXEC  = 0o100;
        const G_READ  = 0o040;
        const G_WRITE = 0o020;
        const G_EXEC  = 0o010;
        const O_READ  = 0o004;
        const O_WRITE = 0o002;
        const O_EXEC  = 0o001;
    }
}

/// The tag the source dispatched on through a function-pointer table; here
/// it is matched on directly by every name-space operation in
/// [`crate::ops`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FileType {
    Regular = 1,
    Directory = 2,
    Symlink = 3,
}

impl TryFrom<u32> for FileType {
    type Error = Error;

    fn try_from(v: u32) -> Result<Self, Error> {
        match v {
            1 => Ok(FileType::Regular),
            2 => Ok(FileType::Directory),
            3 => Ok(FileType::Symlink),
            _ => Err(Error::Io),
        }
    }
}

/// Fixed 64-byte on-disk inode record (`spec.md` §6, "On-disk inode").
///
/// For [`FileType::Symlink`], the bytes from `mode` through `indirect2`
/// (inclusive) are reinterpreted as an inline target buffer of
/// [`MAXSYMLINKLEN`] bytes; `size` still holds the target's length, as it
/// does for regular files and directories.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct RawInode {
    pub size: u32,
    pub ftype: u32,
    pub nlink: u32,
    pub mode: u32,
    pub direct: [u32; NDIRECT],
    pub indirect: u32,
    pub indirect2: u32,
}

const _: () = assert!(mem::size_of::<RawInode>() == 64);

impl Default for RawInode {
    fn default() -> Self {
        RawInode {
            size: 0,
            ftype: 0,
            nlink: 0,
            mode: 0,
            direct: [0; NDIRECT],
            indirect: 0,
            indirect2: 0,
        }
    }
}

impl Debug for RawInode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawInode")
            .field("size", &{ self.size })
            .field("ftype", &{ self.ftype })
            .field("nlink", &{ self.nlink })
            .field("mode", &{ self.mode })
            .field("direct", &{ self.direct })
            .field("indirect", &{ self.indirect })
            .field("indirect2", &{ self.indirect2 })
            .finish()
    }
}

impl RawInode {
    /// `true` iff this record names a live file (`nlink != 0`).
    pub fn is_live(&self) -> bool {
        self.nlink != 0
    }

    pub fn file_type(&self) -> Result<FileType, Error> {
        FileType::try_from(self.ftype)
    }

    /// The permission bits of `mode`, typed. Unknown bits beyond the low 9
    /// are silently dropped rather than rejected, matching how a raw
    /// `mode` field is normally treated.
    pub fn permissions(&self) -> Mode {
        Mode::from_bits_truncate(self.mode)
    }

    /// Zero the whole record, releasing the inode number for reuse.
    pub fn clear(&mut self) {
        *self = RawInode::default();
    }

    /// Byte offset, within the record, at which the symlink target buffer
    /// begins: right after `size`, `ftype`, `nlink`.
    const SYMLINK_BUF_OFFSET: usize = 12;

    /// Read-only view of the inline symlink target, truncated to `size`
    /// bytes.
    ///
    /// Callers must already know `file_type() == Symlink`; this does not
    /// check the tag itself.
    pub fn symlink_target(&self) -> &[u8] {
        let len = (self.size as usize).min(MAXSYMLINKLEN);
        unsafe {
            let base = (self as *const RawInode as *const u8).add(Self::SYMLINK_BUF_OFFSET);
            slice::from_raw_parts(base, len)
        }
    }

    /// Write `target` into the inline symlink buffer and set `size`
    /// accordingly. Caller has already validated `target.len() <=
    /// MAXSYMLINKLEN`.
    pub fn set_symlink_target(&mut self, target: &[u8]) {
        debug_assert!(target.len() <= MAXSYMLINKLEN);
        unsafe {
            let base = (self as *mut RawInode as *mut u8).add(Self::SYMLINK_BUF_OFFSET);
            let buf = slice::from_raw_parts_mut(base, MAXSYMLINKLEN);
            buf[..target.len()].copy_from_slice(target);
        }
        self.size = target.len() as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn sizes() {
        assert_eq!(size_of::<RawInode>(), 64);
    }

    #[test]
    fn symlink_roundtrip() {
        let mut ino = RawInode::default();
        ino.ftype = FileType::Symlink as u32;
        ino.set_symlink_target(b"/a/b/c");
        assert_eq!(ino.symlink_target(), b"/a/b/c");
        assert_eq!(ino.size, 6);
    }

    #[test]
    fn fresh_inode_is_dead() {
        let ino = RawInode::default();
        assert!(!ino.is_live());
    }
}
