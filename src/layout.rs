//! Constants and on-disk layout shared by every other module.
//!
//! Nothing here touches an actual image; it is the vocabulary the rest of
//! the crate is written against (block size, block-map fan-out, journal
//! capacity, name limits). Changing one of these constants changes the
//! on-disk format, so they are not configurable at runtime.

/// Size in bytes of one block, and of one sector in [`crate::sector`] terms.
pub const BLOCK_SIZE: usize = 1024;

/// Number of direct block-map slots stored inline in an inode.
pub const NDIRECT: usize = 10;

/// Number of `u32` block indices that fit in one indirect (or indirect²)
/// block: `BLOCK_SIZE / size_of::<u32>()`.
pub const NINDIRECT: usize = BLOCK_SIZE / 4;

/// Largest file size representable by direct + indirect + indirect² slots.
pub const MAXFILESIZE: u64 =
    (NDIRECT as u64 + NINDIRECT as u64 + (NINDIRECT as u64 * NINDIRECT as u64)) * BLOCK_SIZE as u64;

/// Longest name an entry can hold, not counting the trailing NUL.
pub const MAXNAMELEN: usize = 59;

/// Longest inline symlink target, in bytes (the inode's `mode` field and
/// block-map slots are reinterpreted as this buffer for symlink inodes).
pub const MAXSYMLINKLEN: usize = 52;

/// Maximum number of data blocks staged in a single journal batch.
pub const JMAX: usize = 256;

/// Number of blocks occupied by the journal region: header, affected-block
/// list, indirect² snapshot, indirect snapshot, and `JMAX` data payloads.
pub const JOURNAL_BLOCKS: u32 = 4 + JMAX as u32;

/// On-image magic number identifying this filesystem format.
pub const FS_MAGIC: u32 = 0x4a42_4653; // "JBFS"

/// Block 0 is the boot sector, block 1 the superblock.
pub const BOOT_BLOCK: u32 = 0;
pub const SUPERBLOCK_BLOCK: u32 = 1;
/// The free-block bitmap always begins at block 2.
pub const BITMAP_START_BLOCK: u32 = 2;

/// Inode number of the filesystem root directory.
pub const ROOT_INODE: u32 = 1;

/// Inode number 0 never names a real inode; it is the directory-entry
/// tombstone value and the bitmap "out of file" sentinel.
pub const NULL_INODE: u32 = 0;
