//! Error kinds surfaced to a caller, per `spec.md` §7.
//!
//! All of these except [`Error::Io`] are recoverable and leave the
//! filesystem exactly as it was before the failing operation began — the
//! planner in [`crate::resize`] only ever mutates a local copy, so an error
//! returned before a journal commit has touched nothing live.

use core::fmt;

/// Everything that can go wrong in this crate.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No free block, no free inode, or a requested size exceeds
    /// [`crate::layout::MAXFILESIZE`].
    NoSpace,
    /// The named directory entry does not exist.
    NotFound,
    /// The named directory entry already exists.
    Exists,
    /// A name or symlink target exceeds its fixed-width capacity.
    NameTooLong,
    /// The operation does not apply to this inode's type (e.g. `setattr`
    /// size on a directory).
    NotPermitted,
    /// A structural invariant was violated mid-operation (a block-map
    /// pointer was zero where a live block was expected). The image is left
    /// as-is; this is not locally recoverable and is surfaced for
    /// inspection rather than repaired.
    Io,
    /// A caller-supplied buffer could not be copied to or from.
    Fault,
    /// The host could not allocate an in-memory inode shadow or scratch
    /// buffer.
    OutOfMemory,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::NoSpace => "no space left on device",
            Error::NotFound => "no such file or directory",
            Error::Exists => "file exists",
            Error::NameTooLong => "name too long",
            Error::NotPermitted => "operation not permitted",
            Error::Io => "filesystem structure is inconsistent",
            Error::Fault => "bad address",
            Error::OutOfMemory => "cannot allocate memory",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}

/// Shorthand used throughout the crate instead of spelling out
/// `Result<T, Error>` at every signature.
pub type FsResult<T> = Result<T, Error>;
