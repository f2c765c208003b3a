use super::*;
use common::*;
use error::{FsError, Result};
use fs::{BitmapType, MountedPartition};
use inode::{inode_close, inode_open, Inode};

use serde::{Deserialize, Serialize};

#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FileType {
    /// a free directory slot
    #[default]
    Unknown = 0,
    Regular = 1,
    Directory = 2,
}

impl From<u8> for FileType {
    fn from(tag: u8) -> Self {
        match tag {
            1 => FileType::Regular,
            2 => FileType::Directory,
            _ => FileType::Unknown,
        }
    }
}

/// A directory entry as stored in a directory's data blocks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirEntry {
    /// NUL padded, may use all 16 bytes
    pub filename: [u8; MAX_FILE_NAME_LEN],
    pub i_no: u32,
    pub f_type: FileType,
}

#[derive(Serialize, Deserialize)]
struct DiskDirEntry {
    filename: [u8; MAX_FILE_NAME_LEN],
    i_no: u32,
    f_type: u8,
    pad: [u8; 3],
}

impl DirEntry {
    pub fn name(&self) -> &str {
        let len = self
            .filename
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_FILE_NAME_LEN);
        std::str::from_utf8(&self.filename[..len]).unwrap_or("")
    }

    pub fn encode_into(&self, buf: &mut [u8]) {
        let d = DiskDirEntry {
            filename: self.filename,
            i_no: self.i_no,
            f_type: self.f_type as u8,
            pad: [0; 3],
        };
        bincode::serialize_into(&mut buf[..DIR_ENTRY_SIZE], &d)
            .unwrap_or_else(|e| panic!("dir entry {} unencodable: {}", self.name(), e));
    }

    pub fn decode(buf: &[u8]) -> Self {
        let d: DiskDirEntry = bincode::deserialize(&buf[..DIR_ENTRY_SIZE])
            .unwrap_or_else(|e| panic!("dir entry undecodable: {}", e));
        Self {
            filename: d.filename,
            i_no: d.i_no,
            f_type: d.f_type.into(),
        }
    }
}

/// An open directory. Holds one open count on its inode, except the root
/// which stays open for the lifetime of the mount.
#[derive(Debug)]
pub struct Dir {
    pub inode_no: u32,
    /// readdir cursor, in bytes
    pub dir_pos: u32,
    is_root: bool,
}

impl Dir {
    /// a handle on the already open root directory
    pub fn root(inode_no: u32) -> Self {
        Self {
            inode_no,
            dir_pos: 0,
            is_root: true,
        }
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }
}

/// Open the root directory's inode. Done once at mount.
pub fn open_root_dir(part: &mut MountedPartition) -> Dir {
    let root_no = part.sb.root_inode_no;
    inode_open(part, root_no);
    Dir::root(root_no)
}

pub fn dir_open(part: &mut MountedPartition, inode_no: u32) -> Dir {
    if inode_no == part.sb.root_inode_no {
        return Dir::root(inode_no);
    }
    inode_open(part, inode_no);
    Dir {
        inode_no,
        dir_pos: 0,
        is_root: false,
    }
}

pub fn dir_close(part: &mut MountedPartition, dir: Dir) {
    // the root is never closed
    if dir.is_root {
        return;
    }
    inode_close(part, dir.inode_no);
}

/// Build an entry, names longer than the filename field are refused.
pub fn create_dir_entry(filename: &str, inode_no: u32, file_type: FileType) -> Result<DirEntry> {
    let bytes = filename.as_bytes();
    if bytes.len() > MAX_FILE_NAME_LEN {
        return Err(FsError::NameTooLong(filename.to_string()));
    }
    let mut entry = DirEntry {
        i_no: inode_no,
        f_type: file_type,
        ..Default::default()
    };
    entry.filename[..bytes.len()].copy_from_slice(bytes);
    Ok(entry)
}

/// Every block address of `inode`: 12 direct then the 128 found in the
/// indirect block. Holes are 0.
pub fn all_blocks(part: &MountedPartition, inode: &Inode) -> [u32; MAXFILE] {
    let mut all_blocks = [0u32; MAXFILE];
    all_blocks[..NDIRECT].copy_from_slice(&inode.i_sectors[..NDIRECT]);
    if inode.i_sectors[NDIRECT] != 0 {
        let mut table = [0u8; SECTOR_SIZE];
        part.read_sectors(inode.i_sectors[NDIRECT], &mut table, 1);
        for (slot, addr) in all_blocks[NDIRECT..].iter_mut().zip(table.chunks_exact(4)) {
            *slot = bincode::deserialize(addr)
                .unwrap_or_else(|e| panic!("indirect table undecodable: {}", e));
        }
    }
    all_blocks
}

/// Persist the indirect part of `all_blocks` into the indirect block.
pub fn write_indirect_table(
    part: &MountedPartition,
    indirect_lba: u32,
    all_blocks: &[u32; MAXFILE],
) {
    let mut table = [0u8; SECTOR_SIZE];
    for (slot, addr) in table.chunks_exact_mut(4).zip(all_blocks[NDIRECT..].iter()) {
        bincode::serialize_into(slot, addr)
            .unwrap_or_else(|e| panic!("indirect table unencodable: {}", e));
    }
    part.write_sectors(indirect_lba, &table, 1);
}

/// Look `name` up in `dir`.
pub fn search_dir_entry(part: &MountedPartition, dir: &Dir, name: &str) -> Option<DirEntry> {
    let dir_inode = part.open_inodes.inode(dir.inode_no);
    let all_blocks = all_blocks(part, dir_inode);
    let dir_entry_size = part.sb.dir_entry_size as usize;
    let dir_entrys_per_sec = SECTOR_SIZE / dir_entry_size;

    let mut buf = [0u8; SECTOR_SIZE];
    for &block_lba in all_blocks.iter().filter(|&&lba| lba != 0) {
        part.read_sectors(block_lba, &mut buf, 1);
        for slot in 0..dir_entrys_per_sec {
            let entry = DirEntry::decode(&buf[slot * dir_entry_size..]);
            if entry.f_type != FileType::Unknown && entry.name() == name {
                return Some(entry);
            }
        }
    }
    None
}

/// Every used entry of `dir`, in on-disk order.
pub fn read_dir_entries(part: &MountedPartition, dir: &Dir) -> Vec<DirEntry> {
    let dir_inode = part.open_inodes.inode(dir.inode_no);
    let all_blocks = all_blocks(part, dir_inode);
    let dir_entry_size = part.sb.dir_entry_size as usize;
    let mut entries = Vec::new();

    let mut buf = [0u8; SECTOR_SIZE];
    for &block_lba in all_blocks.iter().filter(|&&lba| lba != 0) {
        part.read_sectors(block_lba, &mut buf, 1);
        entries.extend(
            buf.chunks_exact(dir_entry_size)
                .map(DirEntry::decode)
                .filter(|e| e.f_type != FileType::Unknown),
        );
    }
    entries
}

/// Write `entry` into the first free slot of `parent`, growing the directory
/// by one block when every allocated block is full. The parent inode is
/// updated in the cache only, the caller syncs it.
pub fn sync_dir_entry(
    part: &mut MountedPartition,
    parent: &Dir,
    entry: &DirEntry,
    io_buf: &mut [u8],
) -> Result<()> {
    let mut dir_inode = part.open_inodes.inode(parent.inode_no).clone();
    let ret = append_dir_entry(part, &mut dir_inode, entry, io_buf);
    // even on failure the inode may have given back or gained an address
    *part.open_inodes.inode_mut(parent.inode_no) = dir_inode;
    ret
}

fn append_dir_entry(
    part: &mut MountedPartition,
    dir_inode: &mut Inode,
    entry: &DirEntry,
    io_buf: &mut [u8],
) -> Result<()> {
    let dir_entry_size = part.sb.dir_entry_size as usize;
    let dir_entrys_per_sec = SECTOR_SIZE / dir_entry_size;
    assert_eq!(dir_inode.i_size as usize % dir_entry_size, 0);

    let mut all_blocks = all_blocks(part, dir_inode);
    for block_idx in 0..MAXFILE {
        if all_blocks[block_idx] == 0 {
            let block_lba = part.block_bitmap_alloc().ok_or_else(|| {
                log::warn!("alloc block bitmap for sync_dir_entry failed");
                FsError::NoFreeBlock
            })?;
            // the bitmap goes to disk before anything points at the block
            part.bitmap_sync(block_lba - part.sb.data_start_lba, BitmapType::Block);

            if block_idx < NDIRECT {
                dir_inode.i_sectors[block_idx] = block_lba;
                all_blocks[block_idx] = block_lba;
            } else if block_idx == NDIRECT && dir_inode.i_sectors[NDIRECT] == 0 {
                // the block just taken becomes the indirect table
                dir_inode.i_sectors[NDIRECT] = block_lba;
                let data_lba = match part.block_bitmap_alloc() {
                    Some(lba) => lba,
                    None => {
                        let bit_idx = dir_inode.i_sectors[NDIRECT] - part.sb.data_start_lba;
                        part.block_bitmap.set(bit_idx as usize, false);
                        part.bitmap_sync(bit_idx, BitmapType::Block);
                        dir_inode.i_sectors[NDIRECT] = 0;
                        log::warn!("alloc block bitmap for sync_dir_entry failed");
                        return Err(FsError::NoFreeBlock);
                    }
                };
                part.bitmap_sync(data_lba - part.sb.data_start_lba, BitmapType::Block);
                all_blocks[NDIRECT] = data_lba;
                write_indirect_table(part, dir_inode.i_sectors[NDIRECT], &all_blocks);
            } else {
                all_blocks[block_idx] = block_lba;
                write_indirect_table(part, dir_inode.i_sectors[NDIRECT], &all_blocks);
            }

            // a fresh block, the entry lands in its first slot
            io_buf[..SECTOR_SIZE].fill(0);
            entry.encode_into(io_buf);
            part.write_sectors(all_blocks[block_idx], io_buf, 1);
            dir_inode.i_size += dir_entry_size as u32;
            return Ok(());
        }

        part.read_sectors(all_blocks[block_idx], io_buf, 1);
        for slot in 0..dir_entrys_per_sec {
            let off = slot * dir_entry_size;
            if FileType::from(io_buf[off + MAX_FILE_NAME_LEN + 4]) == FileType::Unknown {
                entry.encode_into(&mut io_buf[off..]);
                part.write_sectors(all_blocks[block_idx], io_buf, 1);
                dir_inode.i_size += dir_entry_size as u32;
                return Ok(());
            }
        }
    }
    log::warn!("directory is full!");
    Err(FsError::DirectoryFull)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_layout_is_24_bytes() {
        let entry = create_dir_entry("kernel.bin", 42, FileType::Regular).unwrap();
        let mut buf = [0xeeu8; DIR_ENTRY_SIZE];
        entry.encode_into(&mut buf);
        assert_eq!(&buf[..10], b"kernel.bin");
        assert!(buf[10..16].iter().all(|&b| b == 0));
        assert_eq!(&buf[16..20], &42u32.to_le_bytes());
        assert_eq!(buf[20], FileType::Regular as u8);
        assert_eq!(&buf[21..24], &[0, 0, 0]);
        assert_eq!(DirEntry::decode(&buf), entry);
    }

    #[test]
    fn name_may_fill_the_whole_field() {
        let entry = create_dir_entry("sixteen_chars_xx", 1, FileType::Directory).unwrap();
        assert_eq!(entry.name(), "sixteen_chars_xx");
        assert!(matches!(
            create_dir_entry("seventeen_chars_x", 1, FileType::Regular),
            Err(FsError::NameTooLong(_))
        ));
    }

    #[test]
    fn zeroed_slot_is_free() {
        let entry = DirEntry::decode(&[0u8; DIR_ENTRY_SIZE]);
        assert_eq!(entry.f_type, FileType::Unknown);
        assert_eq!(entry.name(), "");
    }
}
