#![cfg_attr(not(test), no_std)]

//! A journaled, crash-consistent block filesystem core.
//!
//! The entire filesystem lives inside one contiguous in-memory byte buffer
//! (a "disk image"): a superblock, a free-block bitmap, an inode table, a
//! fixed-size write-ahead journal region and a data region. Every operation
//! that touches more than one block stages its effect into the journal,
//! flips a committed flag, and only then copies the staged effect onto the
//! live structures — so a crash can be recovered by replaying (or
//! discarding) whatever the journal last staged. See [`journal`] for the
//! state machine and [`fs::Filesystem`] for the entry points.
//!
//! What this crate does *not* do: dispatch from a host VFS, copy bytes
//! to/from a user process, wire up a mount point, cache dentries, grow the
//! backing image, or allow concurrent mutation. Those are a caller's job.

extern crate alloc;
extern crate spin;

#[cfg(test)]
extern crate std;

pub mod block_device;
pub mod dir_engine;
pub mod error;
pub mod fs;
pub mod io;
pub mod journal;
pub mod layout;
pub mod ops;
pub mod resize;
pub mod sector;
pub mod size_engine;
pub mod sys;
pub mod volume;

pub use error::{Error, FsResult};
pub use fs::Filesystem;
