//! Storage media sitting behind the emulated controller. A media failure is a
//! hardware failure, so these methods panic rather than return errors.

use super::*;
use common::SECTOR_SIZE;

use std::any::Any;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

pub trait BlockDevice: Send + Sync + Any {
    fn read_block(&self, blockno: usize, buf: &mut [u8]);
    fn write_block(&self, blockno: usize, buf: &[u8]);
    /// capacity in sectors
    fn num_blocks(&self) -> usize;
}

/// RAM backed disk, used by the tests.
pub struct MemDisk {
    data: Mutex<Vec<u8>>,
}

impl MemDisk {
    pub fn new(sectors: usize) -> Self {
        Self {
            data: Mutex::new(vec![0u8; sectors * SECTOR_SIZE]),
        }
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) {
        let data = self.data.lock().unwrap();
        let start = blockno * SECTOR_SIZE;
        assert!(start + SECTOR_SIZE <= data.len(), "read beyond media: {}", blockno);
        buf[..SECTOR_SIZE].copy_from_slice(&data[start..start + SECTOR_SIZE]);
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) {
        let mut data = self.data.lock().unwrap();
        let start = blockno * SECTOR_SIZE;
        assert!(start + SECTOR_SIZE <= data.len(), "write beyond media: {}", blockno);
        data[start..start + SECTOR_SIZE].copy_from_slice(&buf[..SECTOR_SIZE]);
    }

    fn num_blocks(&self) -> usize {
        self.data.lock().unwrap().len() / SECTOR_SIZE
    }
}

/// Disk image file on the host, used by the command line tool.
pub struct FileDisk {
    file: Mutex<File>,
    sectors: usize,
}

impl FileDisk {
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let sectors = file.metadata()?.len() as usize / SECTOR_SIZE;
        Ok(Self {
            file: Mutex::new(file),
            sectors,
        })
    }

    /// create (or truncate) an image of `sectors` zeroed sectors
    pub fn create<P: AsRef<Path>>(path: P, sectors: usize) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((sectors * SECTOR_SIZE) as u64)?;
        Ok(Self {
            file: Mutex::new(file),
            sectors,
        })
    }
}

impl BlockDevice for FileDisk {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((blockno * SECTOR_SIZE) as u64))
            .and_then(|_| file.read_exact(&mut buf[..SECTOR_SIZE]))
            .unwrap_or_else(|e| panic!("image read of sector {} failed: {}", blockno, e));
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((blockno * SECTOR_SIZE) as u64))
            .and_then(|_| file.write_all(&buf[..SECTOR_SIZE]))
            .unwrap_or_else(|e| panic!("image write of sector {} failed: {}", blockno, e));
    }

    fn num_blocks(&self) -> usize {
        self.sectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_disk_keeps_sectors_apart() {
        let disk = MemDisk::new(4);
        disk.write_block(1, &[0xab; SECTOR_SIZE]);
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_block(0, &mut buf);
        assert!(buf.iter().all(|&b| b == 0));
        disk.read_block(1, &mut buf);
        assert!(buf.iter().all(|&b| b == 0xab));
        assert_eq!(disk.num_blocks(), 4);
    }
}
