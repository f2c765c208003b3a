/// sector size, also the block size of the filesystem
pub const SECTOR_SIZE: usize = 512;

pub const BLOCK_SIZE: usize = SECTOR_SIZE;

/// bits held by one sector of a bitmap
pub const BITS_PER_SECTOR: usize = SECTOR_SIZE * 8;

/// sectors one ATA command can move (sector count register 0 means 256)
pub const MAX_SECS_PER_CMD: usize = 256;

/// Must be the first field of the super block, anything else gets formatted
pub const FS_MAGIC: u32 = 0x19590318;

/// max # of files (inodes) per partition
pub const MAX_FILES_PER_PART: u32 = 4096;

/// direct blocks in inode
pub const NDIRECT: usize = 12;

/// block addresses held by the indirect block
pub const NINDIRECT: usize = BLOCK_SIZE / core::mem::size_of::<u32>();

/// max # of blocks a file (or directory) can own
pub const MAXFILE: usize = NDIRECT + NINDIRECT;

/// filename field of a directory entry
pub const MAX_FILE_NAME_LEN: usize = 16;

/// on-disk inode record: i_no, i_size, open_cnts, write_deny, 13 sectors, 2 link words
pub const INODE_SIZE: usize = 4 * (4 + NDIRECT + 1 + 2);

/// on-disk directory entry: filename, i_no, type tag + padding
pub const DIR_ENTRY_SIZE: usize = MAX_FILE_NAME_LEN + 4 + 4;

/// size of the global open-file table
pub const MAX_FILE_OPEN: usize = 32;

/// size of a task's descriptor table
pub const MAX_FILES_OPEN_PER_PROC: usize = 8;

/// stdin, stdout and stderr
pub const RESERVED_FDS: usize = 3;

pub const MAX_PATH_LEN: usize = 512;

/// primary partitions per disk
pub const MAX_PRIM_PARTS: usize = 4;

/// logical partitions per disk
pub const MAX_LOGIC_PARTS: usize = 8;

/// partition table type of an extended partition
pub const PART_TYPE_EXTENDED: u8 = 0x05;

pub const BOOT_SIGNATURE: u16 = 0xaa55;
