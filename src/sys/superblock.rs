//! The on-disk superblock: block 1, immutable after mount (`spec.md` §3/§6).

use crate::error::Error;
use crate::layout::{
    BITMAP_START_BLOCK, BLOCK_SIZE, FS_MAGIC, JOURNAL_BLOCKS, ROOT_INODE,
};
use core::fmt::{self, Debug};
use core::mem::size_of;

/// `{magic, nblocks, ninodes, firstinob, firstjournalb, njournalb,
/// firstdatab}`, little-endian, packed — byte-exact with `spec.md` §6.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Superblock {
    pub magic: u32,
    pub nblocks: u32,
    pub ninodes: u32,
    pub firstinob: u32,
    pub firstjournalb: u32,
    pub njournalb: u32,
    pub firstdatab: u32,
}

const _: () = assert!(size_of::<Superblock>() <= BLOCK_SIZE);

impl Debug for Superblock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Superblock")
            .field("magic", &{ self.magic })
            .field("nblocks", &{ self.nblocks })
            .field("ninodes", &{ self.ninodes })
            .field("firstinob", &{ self.firstinob })
            .field("firstjournalb", &{ self.firstjournalb })
            .field("njournalb", &{ self.njournalb })
            .field("firstdatab", &{ self.firstdatab })
            .finish()
    }
}

impl Superblock {
    /// Lay out a fresh filesystem of `nblocks` total blocks with `ninodes`
    /// inodes. Returns [`Error::NoSpace`] if the image is too small to hold
    /// the boot block, superblock, bitmap, inode table, journal and at
    /// least one data block.
    pub fn format(nblocks: u32, ninodes: u32) -> Result<Superblock, Error> {
        let bitmap_blocks = div_ceil(nblocks as u64, 8 * BLOCK_SIZE as u64) as u32;
        let firstinob = BITMAP_START_BLOCK + bitmap_blocks;
        let inode_bytes = ninodes as u64 * 64;
        let inode_blocks = div_ceil(inode_bytes, BLOCK_SIZE as u64) as u32;
        let firstjournalb = firstinob + inode_blocks;
        let njournalb = JOURNAL_BLOCKS;
        let firstdatab = firstjournalb + njournalb;
        if firstdatab >= nblocks {
            return Err(Error::NoSpace);
        }
        Ok(Superblock {
            magic: FS_MAGIC,
            nblocks,
            ninodes,
            firstinob,
            firstjournalb,
            njournalb,
            firstdatab,
        })
    }

    pub fn check_magic(&self) -> Result<(), Error> {
        if self.magic == FS_MAGIC {
            Ok(())
        } else {
            Err(Error::Io)
        }
    }

    pub fn bitmap_blocks(&self) -> u32 {
        self.firstinob - BITMAP_START_BLOCK
    }

    pub fn inode_blocks(&self) -> u32 {
        self.firstjournalb - self.firstinob
    }

    pub fn inodes_per_block(&self) -> u32 {
        (BLOCK_SIZE / 64) as u32
    }

    /// Inode numbers are 1-based; [`ROOT_INODE`] always names the root
    /// directory.
    pub fn root_inode(&self) -> u32 {
        ROOT_INODE
    }
}

fn div_ceil(n: u64, d: u64) -> u64 {
    (n + d - 1) / d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_fits_one_block() {
        assert!(size_of::<Superblock>() <= BLOCK_SIZE);
    }

    #[test]
    fn format_lays_out_regions_in_order() {
        let sb = Superblock::format(4096, 256).unwrap();
        assert!(sb.firstinob > BITMAP_START_BLOCK);
        assert!(sb.firstjournalb > sb.firstinob);
        assert!(sb.firstdatab > sb.firstjournalb);
        assert_eq!(sb.njournalb, JOURNAL_BLOCKS);
        assert!(sb.firstdatab < sb.nblocks);
    }

    #[test]
    fn format_rejects_too_small_image() {
        assert!(Superblock::format(4, 8).is_err());
    }
}
