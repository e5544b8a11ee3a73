//! On-disk record layouts and the pure arithmetic over them: everything
//! `spec.md` §3 and §4.1-§4.3 calls data model rather than engine.

pub mod bitmap;
pub mod blockmap;
pub mod dirent;
pub mod inode;
pub mod superblock;
