//! Directory entries: fixed-width `{inode number, NUL-terminated name}`
//! records that make up a directory file's contents (`spec.md` §3/§6).

use crate::layout::MAXNAMELEN;
use core::fmt::{self, Debug};
use core::mem::size_of;

/// `{od_ino, od_name}`. An entry with `od_ino == 0` is a tombstone: its
/// slot in the dense array is free but not removed.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DirEntry {
    pub od_ino: u32,
    pub od_name: [u8; MAXNAMELEN + 1],
}

pub const DIRENT_SIZE: usize = size_of::<DirEntry>();

impl Default for DirEntry {
    fn default() -> Self {
        DirEntry {
            od_ino: 0,
            od_name: [0; MAXNAMELEN + 1],
        }
    }
}

impl Debug for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirEntry")
            .field("od_ino", &{ self.od_ino })
            .field("name", &self.name())
            .finish()
    }
}

impl DirEntry {
    pub fn is_tombstone(&self) -> bool {
        self.od_ino == 0
    }

    /// The name up to its first NUL, as raw bytes (names are not required
    /// to be valid UTF-8).
    pub fn name(&self) -> &[u8] {
        let nul = self.od_name.iter().position(|&b| b == 0).unwrap_or(self.od_name.len());
        &self.od_name[..nul]
    }

    /// Build a populated entry. Returns `None` if `name` (including its
    /// NUL) does not fit in `od_name`.
    pub fn new(ino: u32, name: &[u8]) -> Option<DirEntry> {
        if name.len() > MAXNAMELEN {
            return None;
        }
        let mut od_name = [0u8; MAXNAMELEN + 1];
        od_name[..name.len()].copy_from_slice(name);
        Some(DirEntry { od_ino: ino, od_name })
    }

    pub fn tombstone() -> DirEntry {
        DirEntry::default()
    }

    /// Decode an entry out of a raw byte window (a slice of a directory
    /// data block). `bytes` must be at least [`DIRENT_SIZE`] long.
    pub fn from_bytes(bytes: &[u8]) -> DirEntry {
        debug_assert!(bytes.len() >= DIRENT_SIZE);
        unsafe { (bytes.as_ptr() as *const DirEntry).read_unaligned() }
    }

    /// Encode this entry into a raw byte window. `bytes` must be at least
    /// [`DIRENT_SIZE`] long.
    pub fn write_to(&self, bytes: &mut [u8]) {
        debug_assert!(bytes.len() >= DIRENT_SIZE);
        unsafe {
            core::ptr::copy_nonoverlapping(self as *const DirEntry as *const u8, bytes.as_mut_ptr(), DIRENT_SIZE);
        }
    }
}
