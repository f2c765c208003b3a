use super::*;
use common::*;

use serde::{Deserialize, Serialize};

/// Filesystem metadata, the second sector of a partition (the first is the
/// OBR). Only the first 52 bytes of the sector are used.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperBlock {
    /// Must be FS_MAGIC
    pub magic: u32,
    /// Sectors of the partition
    pub sec_cnt: u32,
    /// Number of inodes
    pub inode_cnt: u32,
    /// First sector of the partition
    pub part_lba_base: u32,

    pub block_bitmap_lba: u32,
    pub block_bitmap_sects: u32,

    pub inode_bitmap_lba: u32,
    pub inode_bitmap_sects: u32,

    pub inode_table_lba: u32,
    pub inode_table_sects: u32,

    /// First sector of the data area, bit 0 of the block bitmap
    pub data_start_lba: u32,
    pub root_inode_no: u32,
    pub dir_entry_size: u32,
}

impl SuperBlock {
    pub fn decode(sector: &[u8]) -> Self {
        // every field is a plain u32, any 52 bytes decode
        bincode::deserialize(sector).unwrap_or_default()
    }

    pub fn encode(&self) -> [u8; SECTOR_SIZE] {
        let mut sector = [0u8; SECTOR_SIZE];
        bincode::serialize_into(&mut sector[..], self)
            .unwrap_or_else(|e| panic!("super block unencodable: {}", e));
        sector
    }

    pub fn is_formatted(&self) -> bool {
        self.magic == FS_MAGIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_little_endian_u32_in_order() {
        let sb = SuperBlock {
            magic: FS_MAGIC,
            sec_cnt: 0x1000,
            root_inode_no: 0,
            dir_entry_size: DIR_ENTRY_SIZE as u32,
            ..Default::default()
        };
        let sector = sb.encode();
        assert_eq!(&sector[0..4], &[0x18, 0x03, 0x59, 0x19]);
        assert_eq!(&sector[4..8], &0x1000u32.to_le_bytes());
        assert_eq!(&sector[48..52], &(DIR_ENTRY_SIZE as u32).to_le_bytes());
        assert!(sector[52..].iter().all(|&b| b == 0));
        assert_eq!(SuperBlock::decode(&sector), sb);
    }

    #[test]
    fn blank_sector_is_unformatted() {
        assert!(!SuperBlock::decode(&[0u8; SECTOR_SIZE]).is_formatted());
    }
}
