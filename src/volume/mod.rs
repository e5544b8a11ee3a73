//! A typed view over a flat byte buffer, addressed in [`crate::sector`]
//! terms rather than raw `usize` offsets.
//!
//! This is the teacher crate's own abstraction, narrowed to a single
//! [`crate::sector::Size1024`] sector standing in for this filesystem's
//! 1 KiB block. [`crate::block_device`] builds the block-indexed view
//! (`block(i)`, `inode(i)`, ...) on top of it.

pub mod size;

use crate::error::Error;
use crate::sector::{Address, SectorSize};
use core::mem;
use core::ops::Range;
pub use size::Size;

/// A readable/writable backing store, addressed by [`Address<S>`].
pub trait Volume<T, S: SectorSize> {
    fn size(&self) -> Size<S>;

    /// Borrow the bytes in `range`.
    ///
    /// # Safety
    /// The caller must have already checked `range.end <= self.size()`.
    unsafe fn slice_unchecked(&self, range: Range<Address<S>>) -> VolumeSlice<'_, T, S>;

    /// Mutably borrow the bytes in `range`.
    ///
    /// # Safety
    /// The caller must have already checked `range.end <= self.size()`.
    unsafe fn slice_unchecked_mut(&mut self, range: Range<Address<S>>) -> VolumeSliceMut<'_, T, S>;
}

/// A borrowed, bounds-checked-at-construction window into a [`Volume`].
pub struct VolumeSlice<'a, T, S: SectorSize> {
    bytes: &'a [T],
    start: Address<S>,
}

impl<'a, S: SectorSize> VolumeSlice<'a, u8, S> {
    /// Reinterpret the slice as a `U`, returning it by value along with the
    /// address just past it.
    ///
    /// # Safety
    /// The slice must be at least `size_of::<U>()` bytes and satisfy `U`'s
    /// alignment and bit-pattern requirements (true for every `#[repr(C,
    /// packed)]` record in [`crate::sys`], which have no padding and accept
    /// any byte pattern).
    pub unsafe fn dynamic_cast<U: Copy>(self) -> (U, Address<S>) {
        debug_assert!(self.bytes.len() >= mem::size_of::<U>());
        let value = (self.bytes.as_ptr() as *const U).read_unaligned();
        let end = self.start + Address::from(mem::size_of::<U>());
        (value, end)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }
}

/// The mutable counterpart of [`VolumeSlice`].
pub struct VolumeSliceMut<'a, T, S: SectorSize> {
    bytes: &'a mut [T],
    start: Address<S>,
}

impl<'a, S: SectorSize> VolumeSliceMut<'a, u8, S> {
    /// Overwrite the slice with the bytes of `value`, returning the address
    /// just past it.
    ///
    /// # Safety
    /// Same preconditions as [`VolumeSlice::dynamic_cast`].
    pub unsafe fn write_cast<U: Copy>(self, value: &U) -> Address<S> {
        let size = mem::size_of::<U>();
        debug_assert!(self.bytes.len() >= size);
        let src = core::slice::from_raw_parts(value as *const U as *const u8, size);
        self.bytes[..size].copy_from_slice(src);
        self.start + Address::from(size)
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.bytes
    }
}

impl<S: SectorSize> Volume<u8, S> for alloc::vec::Vec<u8> {
    fn size(&self) -> Size<S> {
        Size::Bounded(Address::from(self.len()))
    }

    unsafe fn slice_unchecked(&self, range: Range<Address<S>>) -> VolumeSlice<'_, u8, S> {
        let start = range.start.into_index() as usize;
        let end = range.end.into_index() as usize;
        VolumeSlice {
            bytes: &self[start..end],
            start: range.start,
        }
    }

    unsafe fn slice_unchecked_mut(&mut self, range: Range<Address<S>>) -> VolumeSliceMut<'_, u8, S> {
        let start = range.start.into_index() as usize;
        let end = range.end.into_index() as usize;
        VolumeSliceMut {
            bytes: &mut self[start..end],
            start: range.start,
        }
    }
}

/// Checks `range.end <= volume.size()` and returns [`Error::Io`] otherwise.
pub fn check_bounds<T, S: SectorSize, V: Volume<T, S> + ?Sized>(
    vol: &V,
    range: &Range<Address<S>>,
) -> Result<(), Error> {
    if vol.size() < range.end {
        Err(Error::Io)
    } else {
        Ok(())
    }
}
