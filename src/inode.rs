use super::*;
use common::*;
use fs::MountedPartition;
use super_block::SuperBlock;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// inode in memory
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Inode {
    pub i_no: u32,
    /// file: size in bytes; directory: sum of its entries' sizes
    pub i_size: u32,
    /// how many opens share this inode
    pub i_open_cnts: u32,
    /// set while a writer holds the file
    pub write_deny: bool,
    /// 0~11 direct blocks, 12 the single indirect block
    pub i_sectors: [u32; NDIRECT + 1],
}

/// inode on disk, INODE_SIZE bytes. The in-memory only fields are kept in
/// the record but always stored as 0.
#[derive(Serialize, Deserialize)]
struct DiskInode {
    i_no: u32,
    i_size: u32,
    i_open_cnts: u32,
    write_deny: u32,
    i_sectors: [u32; NDIRECT + 1],
    /// cache list linkage of the kernel this layout comes from
    link: [u32; 2],
}

impl Inode {
    /// a fresh inode: empty, unopened, no blocks
    pub fn new(inode_no: u32) -> Self {
        Self {
            i_no: inode_no,
            ..Default::default()
        }
    }

    fn to_disk(&self) -> DiskInode {
        DiskInode {
            i_no: self.i_no,
            i_size: self.i_size,
            i_open_cnts: 0,
            write_deny: 0,
            i_sectors: self.i_sectors,
            link: [0; 2],
        }
    }

    fn from_disk(d: DiskInode) -> Self {
        Self {
            i_no: d.i_no,
            i_size: d.i_size,
            i_open_cnts: 0,
            write_deny: false,
            i_sectors: d.i_sectors,
        }
    }

    /// encode the on-disk record into `buf[..INODE_SIZE]`
    pub fn encode_into(&self, buf: &mut [u8]) {
        bincode::serialize_into(&mut buf[..INODE_SIZE], &self.to_disk())
            .unwrap_or_else(|e| panic!("inode {} unencodable: {}", self.i_no, e));
    }

    pub fn decode(buf: &[u8]) -> Self {
        let d: DiskInode = bincode::deserialize(&buf[..INODE_SIZE])
            .unwrap_or_else(|e| panic!("inode record undecodable: {}", e));
        Self::from_disk(d)
    }
}

/// Where an inode record lives in the inode table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InodePosition {
    /// the record crosses into the next sector
    pub two_sec: bool,
    pub sec_lba: u32,
    /// byte offset inside `sec_lba`
    pub off_size: usize,
}

pub fn inode_locate(sb: &SuperBlock, inode_no: u32) -> InodePosition {
    assert!(inode_no < MAX_FILES_PER_PART, "inode {} out of table", inode_no);
    let off_size = inode_no as usize * INODE_SIZE;
    let off_sec = off_size / SECTOR_SIZE;
    let off_size_in_sec = off_size % SECTOR_SIZE;
    InodePosition {
        two_sec: SECTOR_SIZE - off_size_in_sec < INODE_SIZE,
        sec_lba: sb.inode_table_lba + off_sec as u32,
        off_size: off_size_in_sec,
    }
}

/// Open inodes of a partition, keyed by inode number.
#[derive(Default)]
pub struct InodeCache {
    inodes: HashMap<u32, Inode>,
}

impl InodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// the open inode `inode_no`; it not being open is a kernel bug
    pub fn inode(&self, inode_no: u32) -> &Inode {
        self.inodes
            .get(&inode_no)
            .unwrap_or_else(|| panic!("inode {} is not open", inode_no))
    }

    pub fn inode_mut(&mut self, inode_no: u32) -> &mut Inode {
        self.inodes
            .get_mut(&inode_no)
            .unwrap_or_else(|| panic!("inode {} is not open", inode_no))
    }

    pub fn insert(&mut self, inode: Inode) {
        let prev = self.inodes.insert(inode.i_no, inode);
        assert!(prev.is_none(), "inode opened twice into the cache");
    }

    fn remove(&mut self, inode_no: u32) -> Option<Inode> {
        self.inodes.remove(&inode_no)
    }

    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }
}

/// Open inode `inode_no`: bump its count if cached, load it otherwise.
pub fn inode_open(part: &mut MountedPartition, inode_no: u32) {
    {
        let _intr = part.intr.disable();
        if let Some(inode) = part.open_inodes.inodes.get_mut(&inode_no) {
            inode.i_open_cnts += 1;
            return;
        }
    }

    let pos = inode_locate(&part.sb, inode_no);
    let mut inode_buf = [0u8; SECTOR_SIZE * 2];
    let secs = if pos.two_sec { 2 } else { 1 };
    part.read_sectors(pos.sec_lba, &mut inode_buf, secs);
    let mut inode = Inode::decode(&inode_buf[pos.off_size..]);
    inode.i_open_cnts = 1;

    let _intr = part.intr.disable();
    part.open_inodes.insert(inode);
}

/// Drop one open of `inode_no`, evicting it from the cache at zero.
pub fn inode_close(part: &mut MountedPartition, inode_no: u32) {
    let _intr = part.intr.disable();
    let inode = part.open_inodes.inode_mut(inode_no);
    assert!(inode.i_open_cnts > 0);
    inode.i_open_cnts -= 1;
    if inode.i_open_cnts == 0 {
        part.open_inodes.remove(inode_no);
    }
}

/// Write `inode` back to the inode table. `io_buf` must hold 2 sectors.
pub fn inode_sync(part: &MountedPartition, inode: &Inode, io_buf: &mut [u8]) {
    let pos = inode_locate(&part.sb, inode.i_no);
    assert!(pos.sec_lba <= part.part.start_lba + part.part.sec_cnt);

    // read-patch-write, the record may straddle two sectors
    let secs = if pos.two_sec { 2 } else { 1 };
    part.read_sectors(pos.sec_lba, io_buf, secs);
    inode.encode_into(&mut io_buf[pos.off_size..]);
    part.write_sectors(pos.sec_lba, io_buf, secs);
}

/// sync the cached copy of open inode `inode_no`
pub fn inode_sync_open(part: &MountedPartition, inode_no: u32, io_buf: &mut [u8]) {
    inode_sync(part, part.open_inodes.inode(inode_no), io_buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sb() -> SuperBlock {
        SuperBlock {
            inode_table_lba: 100,
            ..Default::default()
        }
    }

    #[test]
    fn record_is_76_bytes_with_memory_fields_zeroed() {
        let mut inode = Inode::new(7);
        inode.i_size = 48;
        inode.i_open_cnts = 3;
        inode.write_deny = true;
        inode.i_sectors[0] = 0x1234;
        inode.i_sectors[NDIRECT] = 0x99;

        let mut buf = [0xffu8; INODE_SIZE];
        inode.encode_into(&mut buf);
        assert_eq!(&buf[0..4], &7u32.to_le_bytes());
        assert_eq!(&buf[4..8], &48u32.to_le_bytes());
        assert_eq!(&buf[8..16], &[0u8; 8]);
        assert_eq!(&buf[16..20], &0x1234u32.to_le_bytes());
        assert_eq!(&buf[64..68], &0x99u32.to_le_bytes());
        assert_eq!(&buf[68..76], &[0u8; 8]);

        let back = Inode::decode(&buf);
        assert_eq!(back.i_open_cnts, 0);
        assert!(!back.write_deny);
        assert_eq!(back.i_sectors, inode.i_sectors);
    }

    #[test]
    fn locate_detects_straddling_records() {
        let sb = sb();
        assert_eq!(
            inode_locate(&sb, 0),
            InodePosition {
                two_sec: false,
                sec_lba: 100,
                off_size: 0
            }
        );
        // 6 * 76 = 456, 56 bytes left in the sector
        let pos = inode_locate(&sb, 6);
        assert_eq!((pos.sec_lba, pos.off_size, pos.two_sec), (100, 456, true));
        // 7 * 76 = 532
        let pos = inode_locate(&sb, 7);
        assert_eq!((pos.sec_lba, pos.off_size, pos.two_sec), (101, 20, false));
    }

    #[test]
    #[should_panic(expected = "out of table")]
    fn locate_rejects_inode_beyond_table() {
        inode_locate(&sb(), MAX_FILES_PER_PART);
    }
}
