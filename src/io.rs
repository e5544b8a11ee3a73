//! Reading and writing file content (`spec.md` §4.7, component C7).
//!
//! Both operations work purely in terms of the block map C3 already
//! computes; the only new concern here is splitting a write that spans more
//! blocks than a single journal batch can hold into several batches, each
//! staged and applied independently, exactly like [`crate::size_engine`]
//! splits a large resize.

use crate::block_device::BlockDevice;
use crate::error::{Error, FsResult};
use crate::journal::{ExecuteType, Journal, StagedBatch};
use crate::layout::{BLOCK_SIZE, JMAX};
use crate::size_engine::change_size;
use crate::sys::inode::FileType;
use alloc::vec;
use alloc::vec::Vec;

/// Copy up to `buf.len()` bytes starting at file offset `off` into `buf`.
/// Returns the number of bytes actually read — short only because the read
/// ran past end-of-file, never because of a short underlying copy.
pub fn read(dev: &BlockDevice, ino: u32, off: u64, buf: &mut [u8]) -> FsResult<usize> {
    let inode = dev.read_inode(ino);
    if inode.file_type()? != FileType::Regular {
        return Err(Error::NotPermitted);
    }
    if off >= inode.size as u64 {
        return Ok(0);
    }
    let avail = (inode.size as u64 - off) as usize;
    let total = buf.len().min(avail);

    let mut done = 0usize;
    while done < total {
        let pos = off + done as u64;
        let block_off = (pos % BLOCK_SIZE as u64) as usize;
        let chunk = (BLOCK_SIZE - block_off).min(total - done);
        let blockno = dev.inode_block_at_offset(&inode, pos);
        if blockno == 0 {
            buf[done..done + chunk].fill(0);
        } else {
            let src = &dev.block(blockno)[block_off..block_off + chunk];
            buf[done..done + chunk].copy_from_slice(src);
        }
        done += chunk;
    }
    Ok(total)
}

/// Write `data` at file offset `off` (or at end-of-file, if `append`),
/// growing the file first if the write extends past its current size.
/// Returns the number of bytes written, which is always `data.len()`
/// (short writes only happen on error, in which case nothing is written).
pub fn write(dev: &mut BlockDevice, ino: u32, off: u64, data: &[u8], append: bool) -> FsResult<usize> {
    let inode = dev.read_inode(ino);
    if inode.file_type()? != FileType::Regular {
        return Err(Error::NotPermitted);
    }
    let start = if append { inode.size as u64 } else { off };
    let end = start
        .checked_add(data.len() as u64)
        .ok_or(Error::NoSpace)?;

    if end > inode.size as u64 {
        change_size(dev, ino, end)?;
    }

    let mut done = 0usize;
    while done < data.len() {
        let mut affected = Vec::new();
        let mut payloads = Vec::new();

        while done < data.len() && affected.len() < JMAX {
            let pos = start + done as u64;
            let block_off = (pos % BLOCK_SIZE as u64) as usize;
            let chunk = (BLOCK_SIZE - block_off).min(data.len() - done);
            let inode_now = dev.read_inode(ino);
            let blockno = dev.inode_block_at_offset(&inode_now, pos);
            if blockno == 0 {
                return Err(Error::Io);
            }

            let mut payload = dev.block(blockno).to_vec();
            payload[block_off..block_off + chunk].copy_from_slice(&data[done..done + chunk]);
            affected.push(blockno);
            payloads.push(payload);
            done += chunk;
        }

        let inode_after = dev.read_inode(ino);
        let mut batch = StagedBatch::for_write(ino, inode_after, affected[0], payloads[0].clone());
        batch.affected = affected;
        batch.data_payloads = batch
            .affected
            .iter()
            .cloned()
            .zip(payloads.into_iter())
            .collect();
        Journal::stage(dev, ExecuteType::Write, &batch)?;
        Journal::apply(dev)?;
    }

    Ok(data.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::inode::RawInode;
    use crate::sys::superblock::Superblock;

    fn fresh_dev(nblocks: u32) -> (Vec<u8>, Superblock) {
        let sb = Superblock::format(nblocks, 64).unwrap();
        (vec![0u8; nblocks as usize * BLOCK_SIZE], sb)
    }

    fn new_file(dev: &mut BlockDevice, ino: u32) {
        let mut inode = RawInode::default();
        inode.ftype = FileType::Regular as u32;
        inode.nlink = 1;
        dev.write_inode(ino, &inode);
    }

    #[test]
    fn write_then_read_back_hello_world() {
        let (mut image, sb) = fresh_dev(2048);
        let mut dev = BlockDevice::new(&mut image, sb);
        new_file(&mut dev, 3);
        let n = write(&mut dev, 3, 0, b"hello world", false).unwrap();
        assert_eq!(n, 11);

        let mut buf = [0u8; 11];
        let r = read(&dev, 3, 0, &mut buf).unwrap();
        assert_eq!(r, 11);
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn append_extends_and_reads_whole_file() {
        let (mut image, sb) = fresh_dev(2048);
        let mut dev = BlockDevice::new(&mut image, sb);
        new_file(&mut dev, 3);
        write(&mut dev, 3, 0, b"abc", false).unwrap();
        write(&mut dev, 3, 0, b"def", true).unwrap();

        let mut buf = [0u8; 6];
        read(&dev, 3, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"abcdef");
    }

    #[test]
    fn read_past_end_of_file_is_short() {
        let (mut image, sb) = fresh_dev(2048);
        let mut dev = BlockDevice::new(&mut image, sb);
        new_file(&mut dev, 3);
        write(&mut dev, 3, 0, b"abc", false).unwrap();

        let mut buf = [0u8; 10];
        let n = read(&dev, 3, 0, &mut buf).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn write_spanning_into_indirect_region_round_trips() {
        let (mut image, sb) = fresh_dev(4096);
        let mut dev = BlockDevice::new(&mut image, sb);
        new_file(&mut dev, 3);
        let len = (crate::layout::NDIRECT + 3) * BLOCK_SIZE;
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        write(&mut dev, 3, 0, &data, false).unwrap();

        let mut buf = vec![0u8; len];
        let n = read(&dev, 3, 0, &mut buf).unwrap();
        assert_eq!(n, len);
        assert_eq!(buf, data);
    }
}
