use super::*;
use bitmap::Bitmap;
use common::*;
use dir::*;
use error::{FsError, Result};
use file::{
    file_close, file_create, file_lseek, file_open, file_read, file_write, FileTable, OpenFlags,
    Task, Whence,
};
use ide::{Ide, Partition};
use inode::{inode_sync, inode_sync_open, Inode, InodeCache};
use intr::Interrupts;
use super_block::SuperBlock;

use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Debug)]
pub struct FsConfig {
    /// partition mounted at boot
    pub default_partition: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            default_partition: "sdb1".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitmapType {
    Inode,
    Block,
}

/// A partition with its filesystem loaded: super block, both bitmaps and the
/// inodes currently open on it.
pub struct MountedPartition {
    pub part: Arc<Partition>,
    pub sb: SuperBlock,
    pub block_bitmap: Bitmap,
    pub inode_bitmap: Bitmap,
    pub open_inodes: InodeCache,
    pub(crate) intr: Arc<Interrupts>,
}

impl MountedPartition {
    pub fn read_sectors(&self, lba: u32, buf: &mut [u8], sec_cnt: usize) {
        self.part.read_sectors(lba, buf, sec_cnt)
    }

    pub fn write_sectors(&self, lba: u32, buf: &[u8], sec_cnt: usize) {
        self.part.write_sectors(lba, buf, sec_cnt)
    }

    /// take a free inode number
    pub fn inode_bitmap_alloc(&mut self) -> Option<u32> {
        let bit_idx = self.inode_bitmap.scan(1)?;
        self.inode_bitmap.set(bit_idx, true);
        Some(bit_idx as u32)
    }

    /// take a free data block, returns its lba
    pub fn block_bitmap_alloc(&mut self) -> Option<u32> {
        let bit_idx = self.block_bitmap.scan(1)?;
        self.block_bitmap.set(bit_idx, true);
        Some(self.sb.data_start_lba + bit_idx as u32)
    }

    /// Write the bitmap sector holding `bit_idx` back to disk.
    pub fn bitmap_sync(&self, bit_idx: u32, btmp: BitmapType) {
        let off_sec = bit_idx as usize / BITS_PER_SECTOR;
        let off_size = off_sec * SECTOR_SIZE;
        let (sec_lba, bitmap) = match btmp {
            BitmapType::Inode => (self.sb.inode_bitmap_lba, &self.inode_bitmap),
            BitmapType::Block => (self.sb.block_bitmap_lba, &self.block_bitmap),
        };
        self.write_sectors(
            sec_lba + off_sec as u32,
            &bitmap.bytes()[off_size..off_size + SECTOR_SIZE],
            1,
        );
    }
}

fn div_round_up(x: usize, step: usize) -> usize {
    x.div_ceil(step)
}

/// Lay a fresh filesystem on `part`. Returns the super block written, or
/// `PartitionTooSmall` when the metadata would not leave room for data.
pub fn partition_format(part: &Partition) -> Result<SuperBlock> {
    let boot_sector_sects = 1;
    let super_block_sects = 1;
    let inode_bitmap_sects = div_round_up(MAX_FILES_PER_PART as usize, BITS_PER_SECTOR);
    let inode_table_sects = div_round_up(INODE_SIZE * MAX_FILES_PER_PART as usize, SECTOR_SIZE);
    let used_sects = boot_sector_sects + super_block_sects + inode_bitmap_sects + inode_table_sects;
    let sec_cnt = part.sec_cnt as usize;
    if sec_cnt <= used_sects + 2 {
        return Err(FsError::PartitionTooSmall {
            name: part.name.clone(),
            sectors: part.sec_cnt,
        });
    }
    let free_sects = sec_cnt - used_sects;

    // the block bitmap takes sectors from the blocks it describes
    let mut block_bitmap_sects = div_round_up(free_sects, BITS_PER_SECTOR);
    let block_bitmap_bit_len = free_sects - block_bitmap_sects;
    block_bitmap_sects = div_round_up(block_bitmap_bit_len, BITS_PER_SECTOR);

    let mut sb = SuperBlock {
        magic: FS_MAGIC,
        sec_cnt: part.sec_cnt,
        inode_cnt: MAX_FILES_PER_PART,
        part_lba_base: part.start_lba,
        block_bitmap_lba: part.start_lba + 2,
        block_bitmap_sects: block_bitmap_sects as u32,
        root_inode_no: 0,
        dir_entry_size: DIR_ENTRY_SIZE as u32,
        ..Default::default()
    };
    sb.inode_bitmap_lba = sb.block_bitmap_lba + sb.block_bitmap_sects;
    sb.inode_bitmap_sects = inode_bitmap_sects as u32;
    sb.inode_table_lba = sb.inode_bitmap_lba + sb.inode_bitmap_sects;
    sb.inode_table_sects = inode_table_sects as u32;
    sb.data_start_lba = sb.inode_table_lba + sb.inode_table_sects;

    log::info!("{} info:", part.name);
    log::info!(
        "   magic:{:#x}\n   part_lba_base:{:#x}\n   all_sectors:{:#x}\n   inode_cnt:{:#x}",
        sb.magic,
        sb.part_lba_base,
        sb.sec_cnt,
        sb.inode_cnt
    );
    log::info!(
        "   block_bitmap_lba:{:#x}\n   block_bitmap_sectors:{:#x}",
        sb.block_bitmap_lba,
        sb.block_bitmap_sects
    );
    log::info!(
        "   inode_bitmap_lba:{:#x}\n   inode_bitmap_sectors:{:#x}",
        sb.inode_bitmap_lba,
        sb.inode_bitmap_sects
    );
    log::info!(
        "   inode_table_lba:{:#x}\n   inode_table_sectors:{:#x}",
        sb.inode_table_lba,
        sb.inode_table_sects
    );
    log::info!("   data_start_lba:{:#x}", sb.data_start_lba);

    part.write_sectors(part.start_lba + 1, &sb.encode(), 1);

    let buf_size = block_bitmap_sects
        .max(inode_bitmap_sects)
        .max(inode_table_sects)
        * SECTOR_SIZE;
    let mut buf = vec![0u8; buf_size];

    // block bitmap: bits past the real block count are marked used so they
    // are never handed out, down to the end of the last bitmap sector
    let bitmap_bytes = block_bitmap_sects * SECTOR_SIZE;
    let last_byte = block_bitmap_bit_len / 8;
    let last_bit = block_bitmap_bit_len % 8;
    if last_byte < bitmap_bytes {
        let last_size = SECTOR_SIZE - (last_byte % SECTOR_SIZE);
        buf[last_byte..last_byte + last_size].fill(0xff);
        for bit_idx in 0..last_bit {
            buf[last_byte] &= !(1 << bit_idx);
        }
    }
    // block 0 is the root directory's
    buf[0] |= 0x01;
    part.write_sectors(sb.block_bitmap_lba, &buf, block_bitmap_sects);

    // inode bitmap: inode 0 is the root
    buf.fill(0);
    buf[0] |= 0x01;
    part.write_sectors(sb.inode_bitmap_lba, &buf, inode_bitmap_sects);

    // inode table: only the root inode
    buf.fill(0);
    let mut root = Inode::new(0);
    root.i_size = sb.dir_entry_size * 2;
    root.i_sectors[0] = sb.data_start_lba;
    root.encode_into(&mut buf);
    part.write_sectors(sb.inode_table_lba, &buf, inode_table_sects);

    // root directory: "." and ".."
    buf[..SECTOR_SIZE].fill(0);
    for (i, name) in [".", ".."].iter().enumerate() {
        let entry = DirEntry {
            i_no: 0,
            f_type: FileType::Directory,
            filename: {
                let mut filename = [0u8; MAX_FILE_NAME_LEN];
                filename[..name.len()].copy_from_slice(name.as_bytes());
                filename
            },
        };
        entry.encode_into(&mut buf[i * DIR_ENTRY_SIZE..]);
    }
    part.write_sectors(sb.data_start_lba, &buf, 1);

    log::info!("   root_dir_lba:{:#x}", sb.data_start_lba);
    log::info!("{} format done", part.name);
    Ok(sb)
}

/// Load the super block and bitmaps of partition `part_name`.
pub fn mount_partition(
    ide: &Ide,
    part_name: &str,
    intr: Arc<Interrupts>,
) -> Result<MountedPartition> {
    let part = ide
        .partition(part_name)
        .ok_or_else(|| FsError::NoSuchPartition(part_name.to_string()))?
        .clone();

    let mut sb_buf = [0u8; SECTOR_SIZE];
    part.read_sectors(part.start_lba + 1, &mut sb_buf, 1);
    let sb = SuperBlock::decode(&sb_buf);
    if !sb.is_formatted() {
        return Err(FsError::NotFormatted(part.name.clone()));
    }

    let mut bits = vec![0u8; sb.block_bitmap_sects as usize * SECTOR_SIZE];
    part.read_sectors(sb.block_bitmap_lba, &mut bits, sb.block_bitmap_sects as usize);
    let block_bitmap = Bitmap::from_bytes(bits);

    let mut bits = vec![0u8; sb.inode_bitmap_sects as usize * SECTOR_SIZE];
    part.read_sectors(sb.inode_bitmap_lba, &mut bits, sb.inode_bitmap_sects as usize);
    let inode_bitmap = Bitmap::from_bytes(bits);

    log::info!("mount {} done!", part.name);
    Ok(MountedPartition {
        part,
        sb,
        block_bitmap,
        inode_bitmap,
        open_inodes: InodeCache::new(),
        intr,
    })
}

/// Split the first component off `pathname` into `name_store`. Returns the
/// rest of the path, None once nothing is left.
pub fn path_parse<'a>(pathname: &'a str, name_store: &mut String) -> Option<&'a str> {
    // consecutive '/' count as one
    let pathname = pathname.trim_start_matches('/');
    let end = pathname.find('/').unwrap_or(pathname.len());
    name_store.push_str(&pathname[..end]);
    let rest = &pathname[end..];
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// Number of components in `pathname`, "/" is 0.
pub fn path_depth_cnt(pathname: &str) -> usize {
    let mut name = String::new();
    let mut p = path_parse(pathname, &mut name);
    let mut depth = 0;
    while !name.is_empty() {
        depth += 1;
        name.clear();
        if let Some(rest) = p {
            p = path_parse(rest, &mut name);
        }
    }
    depth
}

/// Outcome of a path lookup, valid whether or not the target was found.
#[derive(Debug)]
pub struct PathSearchRecord {
    /// the part of the path walked so far, normalized
    pub searched_path: String,
    /// the directory the lookup stopped in, open; the caller closes it
    pub parent_dir: Dir,
    pub file_type: FileType,
}

/// Resolve absolute `pathname` from `root`. Returns the inode number when the
/// whole path resolved.
pub fn search_file(
    part: &mut MountedPartition,
    root: u32,
    pathname: &str,
    record: &mut PathSearchRecord,
) -> Option<u32> {
    if pathname == "/" || pathname == "/." || pathname == "/.." {
        record.parent_dir = Dir::root(root);
        record.file_type = FileType::Directory;
        record.searched_path.clear();
        return Some(root);
    }

    record.parent_dir = Dir::root(root);
    record.file_type = FileType::Unknown;
    let mut parent_inode_no = root;
    let mut name = String::new();
    let mut sub_path = path_parse(pathname, &mut name);
    let mut found = root;

    while !name.is_empty() {
        record.searched_path.push('/');
        record.searched_path.push_str(&name);

        let dir_e = search_dir_entry(part, &record.parent_dir, &name)?;
        name.clear();
        if let Some(rest) = sub_path {
            sub_path = path_parse(rest, &mut name);
        }

        match dir_e.f_type {
            FileType::Directory => {
                parent_inode_no = record.parent_dir.inode_no;
                let next = dir_open(part, dir_e.i_no);
                let prev = std::mem::replace(&mut record.parent_dir, next);
                dir_close(part, prev);
                found = dir_e.i_no;
            }
            FileType::Regular => {
                record.file_type = FileType::Regular;
                return Some(dir_e.i_no);
            }
            FileType::Unknown => unreachable!("free slots never match a name"),
        }
    }

    // the last component is a directory: record its parent instead
    let next = dir_open(part, parent_inode_no);
    let prev = std::mem::replace(&mut record.parent_dir, next);
    dir_close(part, prev);
    record.file_type = FileType::Directory;
    Some(found)
}

/// the component after the last '/'
fn last_component(pathname: &str) -> &str {
    pathname.rsplit('/').next().unwrap_or(pathname)
}

fn check_path(pathname: &str) -> Result<()> {
    if !pathname.starts_with('/') || pathname.len() >= MAX_PATH_LEN {
        return Err(FsError::InvalidPath(pathname.to_string()));
    }
    Ok(())
}

/// The filesystem context: the driver, the mounted partition, the global
/// open-file table and the root directory.
///
/// Lock order is `cur_part` then `file_table`.
pub struct FileSystem {
    ide: Ide,
    cur_part: Mutex<MountedPartition>,
    file_table: Mutex<FileTable>,
    root_inode_no: u32,
}

impl FileSystem {
    /// Format every unformatted partition, then mount the default one and
    /// open its root directory.
    pub fn init(ide: Ide, intr: Arc<Interrupts>, config: &FsConfig) -> Result<Self> {
        log::info!("searching filesystem......");
        // the boot disk has no partitions, every partition listed is fair game
        for part in ide.partitions() {
            if part.sec_cnt == 0 {
                continue;
            }
            let mut sb_buf = [0u8; SECTOR_SIZE];
            part.read_sectors(part.start_lba + 1, &mut sb_buf, 1);
            if SuperBlock::decode(&sb_buf).is_formatted() {
                log::info!("{} has filesystem", part.name);
            } else {
                log::info!("formatting {}'s partition {}......", part.disk.name, part.name);
                if let Err(e) = partition_format(part) {
                    log::warn!("{}, skipped", e);
                }
            }
        }

        let mut cur_part = mount_partition(&ide, &config.default_partition, intr)?;
        let root = open_root_dir(&mut cur_part);

        Ok(Self {
            ide,
            cur_part: Mutex::new(cur_part),
            file_table: Mutex::new(FileTable::new()),
            root_inode_no: root.inode_no,
        })
    }

    pub fn ide(&self) -> &Ide {
        &self.ide
    }

    /// The mounted partition. Hold no file table lock while calling.
    pub fn partition(&self) -> MutexGuard<'_, MountedPartition> {
        self.cur_part.lock().unwrap()
    }

    pub fn file_table(&self) -> MutexGuard<'_, FileTable> {
        self.file_table.lock().unwrap()
    }

    pub fn root_dir(&self) -> Dir {
        Dir::root(self.root_inode_no)
    }

    fn lookup(
        &self,
        part: &mut MountedPartition,
        pathname: &str,
    ) -> Result<(Option<u32>, PathSearchRecord)> {
        check_path(pathname)?;
        let mut record = PathSearchRecord {
            searched_path: String::new(),
            parent_dir: self.root_dir(),
            file_type: FileType::Unknown,
        };
        let inode_no = search_file(part, self.root_inode_no, pathname, &mut record);
        Ok((inode_no, record))
    }

    /// Open (or with O_CREAT create) the regular file `pathname`.
    pub fn sys_open(&self, task: &mut Task, pathname: &str, flags: OpenFlags) -> Result<usize> {
        if pathname.ends_with('/') {
            log::warn!("can't open a directory {}", pathname);
            return Err(FsError::IsDirectory(pathname.to_string()));
        }
        log::debug!("sys_open {} {:?}", pathname, flags);
        let mut part = self.partition();
        let pathname_depth = path_depth_cnt(pathname);
        let (inode_no, record) = self.lookup(&mut part, pathname)?;

        if record.file_type == FileType::Directory {
            log::warn!("can't open a directory with open(), use opendir() to instead");
            dir_close(&mut part, record.parent_dir);
            return Err(FsError::IsDirectory(pathname.to_string()));
        }

        // every component up to the last must have resolved
        let path_searched_depth = path_depth_cnt(&record.searched_path);
        if pathname_depth != path_searched_depth {
            log::warn!(
                "cannot access {}: Not a directory, subpath {} isn't exist",
                pathname,
                record.searched_path
            );
            dir_close(&mut part, record.parent_dir);
            return Err(FsError::IntermediateMissing {
                path: pathname.to_string(),
                subpath: record.searched_path,
            });
        }

        let creat = flags.contains(OpenFlags::O_CREAT);
        match inode_no {
            None if !creat => {
                log::warn!(
                    "in path {}, file {} isn't exist",
                    record.searched_path,
                    last_component(pathname)
                );
                dir_close(&mut part, record.parent_dir);
                Err(FsError::NotFound(pathname.to_string()))
            }
            Some(_) if creat => {
                log::warn!("{} has already exist!", pathname);
                dir_close(&mut part, record.parent_dir);
                Err(FsError::AlreadyExists(pathname.to_string()))
            }
            None => {
                log::info!("creating file");
                let mut table = self.file_table();
                let ret = file_create(
                    &mut part,
                    &mut table,
                    task,
                    &record.parent_dir,
                    last_component(pathname),
                    flags,
                );
                dir_close(&mut part, record.parent_dir);
                ret
            }
            Some(inode_no) => {
                dir_close(&mut part, record.parent_dir);
                let mut table = self.file_table();
                file_open(&mut part, &mut table, task, inode_no, flags)
            }
        }
    }

    pub fn sys_close(&self, task: &mut Task, fd: usize) -> Result<()> {
        let global_fd = task.fd_local2global(fd)?;
        log::debug!("sys_close fd {} (global {})", fd, global_fd);
        let mut part = self.partition();
        let mut table = self.file_table();
        file_close(&mut part, table.get_mut(global_fd))?;
        task.fd_table[fd] = None;
        Ok(())
    }

    pub fn sys_write(&self, task: &Task, fd: usize, buf: &[u8]) -> Result<usize> {
        let global_fd = task.fd_local2global(fd)?;
        log::debug!("sys_write fd {} {} bytes", fd, buf.len());
        let mut part = self.partition();
        let mut table = self.file_table();
        file_write(&mut part, table.get_mut(global_fd), buf)
    }

    pub fn sys_read(&self, task: &Task, fd: usize, buf: &mut [u8]) -> Result<usize> {
        let global_fd = task.fd_local2global(fd)?;
        log::debug!("sys_read fd {} {} bytes", fd, buf.len());
        let part = self.partition();
        let mut table = self.file_table();
        file_read(&part, table.get_mut(global_fd), buf)
    }

    pub fn sys_lseek(&self, task: &Task, fd: usize, offset: i64, whence: Whence) -> Result<u32> {
        let global_fd = task.fd_local2global(fd)?;
        let part = self.partition();
        let mut table = self.file_table();
        file_lseek(&part, table.get_mut(global_fd), offset, whence)
    }

    /// Create directory `pathname`, with its "." and ".." entries.
    pub fn sys_mkdir(&self, pathname: &str) -> Result<()> {
        if last_component(pathname).is_empty() {
            return Err(FsError::InvalidPath(pathname.to_string()));
        }
        log::debug!("sys_mkdir {}", pathname);
        let mut part = self.partition();
        let (inode_no, record) = self.lookup(&mut part, pathname)?;
        if inode_no.is_some() {
            log::warn!("sys_mkdir: file or directory {} exist!", pathname);
            dir_close(&mut part, record.parent_dir);
            return Err(FsError::AlreadyExists(pathname.to_string()));
        }
        if path_depth_cnt(pathname) != path_depth_cnt(&record.searched_path) {
            log::warn!(
                "sys_mkdir: cannot access {}: Not a directory, subpath {} isn't exist",
                pathname,
                record.searched_path
            );
            dir_close(&mut part, record.parent_dir);
            return Err(FsError::IntermediateMissing {
                path: pathname.to_string(),
                subpath: record.searched_path,
            });
        }

        let ret = make_dir(&mut part, &record.parent_dir, last_component(pathname));
        dir_close(&mut part, record.parent_dir);
        ret
    }

    /// Every entry of directory `pathname`, "." and ".." included.
    pub fn sys_readdir(&self, pathname: &str) -> Result<Vec<DirEntry>> {
        let mut part = self.partition();
        let (inode_no, record) = self.lookup(&mut part, pathname)?;
        let file_type = record.file_type;
        dir_close(&mut part, record.parent_dir);
        match (inode_no, file_type) {
            (Some(inode_no), FileType::Directory) => {
                let dir = dir_open(&mut part, inode_no);
                let entries = read_dir_entries(&part, &dir);
                dir_close(&mut part, dir);
                Ok(entries)
            }
            (Some(_), _) => Err(FsError::NotADirectory(pathname.to_string())),
            (None, _) => Err(FsError::NotFound(pathname.to_string())),
        }
    }
}

/// How far `make_dir` got, each step is undone along with the ones before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum MkdirStep {
    InodeTaken,
    BlockTaken,
}

fn make_dir(part: &mut MountedPartition, parent: &Dir, dirname: &str) -> Result<()> {
    let probe = create_dir_entry(dirname, 0, FileType::Directory)?;
    let mut io_buf = vec![0u8; SECTOR_SIZE * 2];

    let inode_no = part.inode_bitmap_alloc().ok_or_else(|| {
        log::warn!("sys_mkdir: allocate inode failed");
        FsError::NoFreeInode
    })?;
    let mut new_dir_inode = Inode::new(inode_no);

    let block_lba = match part.block_bitmap_alloc() {
        Some(lba) => lba,
        None => {
            log::warn!("sys_mkdir: block_bitmap_alloc for create directory failed");
            rollback_mkdir(part, MkdirStep::InodeTaken, inode_no, 0);
            return Err(FsError::NoFreeBlock);
        }
    };
    new_dir_inode.i_sectors[0] = block_lba;
    part.bitmap_sync(block_lba - part.sb.data_start_lba, BitmapType::Block);

    // "." is the new directory, ".." its parent
    io_buf.fill(0);
    let dot = create_dir_entry(".", inode_no, FileType::Directory)?;
    let dot_dot = create_dir_entry("..", parent.inode_no, FileType::Directory)?;
    dot.encode_into(&mut io_buf);
    dot_dot.encode_into(&mut io_buf[DIR_ENTRY_SIZE..]);
    part.write_sectors(block_lba, &io_buf, 1);
    new_dir_inode.i_size = 2 * part.sb.dir_entry_size;

    let new_dir_entry = DirEntry {
        i_no: inode_no,
        ..probe
    };
    io_buf.fill(0);
    if let Err(e) = sync_dir_entry(part, parent, &new_dir_entry, &mut io_buf) {
        log::warn!("sys_mkdir: sync_dir_entry to disk failed!");
        rollback_mkdir(part, MkdirStep::BlockTaken, inode_no, block_lba);
        return Err(e);
    }

    inode_sync_open(part, parent.inode_no, &mut io_buf);
    inode_sync(part, &new_dir_inode, &mut io_buf);
    part.bitmap_sync(inode_no, BitmapType::Inode);
    Ok(())
}

fn rollback_mkdir(part: &mut MountedPartition, step: MkdirStep, inode_no: u32, block_lba: u32) {
    if step >= MkdirStep::BlockTaken {
        let bit_idx = block_lba - part.sb.data_start_lba;
        part.block_bitmap.set(bit_idx as usize, false);
        part.bitmap_sync(bit_idx, BitmapType::Block);
    }
    part.inode_bitmap.set(inode_no as usize, false);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(path: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut name = String::new();
        let mut p = path_parse(path, &mut name);
        while !name.is_empty() {
            out.push(std::mem::take(&mut name));
            if let Some(rest) = p {
                p = path_parse(rest, &mut name);
            }
        }
        out
    }

    #[test]
    fn parse_splits_components() {
        let mut name = String::new();
        assert_eq!(path_parse("/a/b/c", &mut name), Some("/b/c"));
        assert_eq!(name, "a");
        name.clear();
        assert_eq!(path_parse("/c", &mut name), None);
        assert_eq!(name, "c");
        assert_eq!(components("//a///b/c"), vec!["a", "b", "c"]);
        assert!(components("/").is_empty());
    }

    #[test]
    fn depth_counts_components() {
        assert_eq!(path_depth_cnt("/a/b/c"), 3);
        assert_eq!(path_depth_cnt("/"), 0);
        // repeated separators don't add components
        assert_eq!(path_depth_cnt("//a///b/c"), 3);
        assert_eq!(path_depth_cnt("/a/b/"), 2);
    }

    #[test]
    fn last_component_is_the_file_name() {
        assert_eq!(last_component("/d1/f1"), "f1");
        assert_eq!(last_component("/f1"), "f1");
    }
}
