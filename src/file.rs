use super::*;
use common::*;
use dir::{all_blocks, create_dir_entry, sync_dir_entry, write_indirect_table, Dir, FileType};
use error::{FsError, Result};
use fs::{BitmapType, MountedPartition};
use inode::{inode_close, inode_open, inode_sync, inode_sync_open, Inode};

use bitflags::bitflags;

bitflags! {
    #[derive(Default)]
    pub struct OpenFlags: u8 {
        const O_RDONLY = 0;
        const O_WRONLY = 1;
        const O_RDWR = 2;
        const O_CREAT = 4;
    }
}

impl OpenFlags {
    pub fn writable(&self) -> bool {
        self.intersects(OpenFlags::O_WRONLY | OpenFlags::O_RDWR)
    }

    pub fn readable(&self) -> bool {
        !self.contains(OpenFlags::O_WRONLY)
    }
}

/// Origin of an lseek offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// A slot of the global open-file table. `fd_inode` None means free.
#[derive(Clone, Copy, Debug, Default)]
pub struct File {
    pub fd_pos: u32,
    pub fd_flag: OpenFlags,
    pub fd_inode: Option<u32>,
}

pub struct FileTable {
    files: [File; MAX_FILE_OPEN],
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            files: [File::default(); MAX_FILE_OPEN],
        }
    }

    /// First free slot past the standard streams.
    pub fn get_free_slot_in_global(&self) -> Result<usize> {
        (RESERVED_FDS..MAX_FILE_OPEN)
            .find(|&i| self.files[i].fd_inode.is_none())
            .ok_or_else(|| {
                log::warn!("exceed max open files");
                FsError::FileTableFull
            })
    }

    pub fn get(&self, idx: usize) -> &File {
        &self.files[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut File {
        &mut self.files[idx]
    }

    pub fn in_use(&self) -> usize {
        self.files[RESERVED_FDS..]
            .iter()
            .filter(|f| f.fd_inode.is_some())
            .count()
    }
}

/// Per-task descriptor table, mapping local fds to global file table slots.
#[derive(Clone, Debug)]
pub struct Task {
    pub fd_table: [Option<usize>; MAX_FILES_OPEN_PER_PROC],
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

impl Task {
    pub fn new() -> Self {
        let mut fd_table = [None; MAX_FILES_OPEN_PER_PROC];
        // stdin, stdout and stderr
        for (fd, slot) in fd_table.iter_mut().take(RESERVED_FDS).enumerate() {
            *slot = Some(fd);
        }
        Self { fd_table }
    }

    /// Install global slot `global_fd_idx`, return the local fd.
    pub fn pcb_fd_install(&mut self, global_fd_idx: usize) -> Result<usize> {
        match (RESERVED_FDS..MAX_FILES_OPEN_PER_PROC).find(|&fd| self.fd_table[fd].is_none()) {
            Some(fd) => {
                self.fd_table[fd] = Some(global_fd_idx);
                Ok(fd)
            }
            None => {
                log::warn!("exceed max open files_per_proc");
                Err(FsError::FdTableFull)
            }
        }
    }

    pub fn fd_local2global(&self, local_fd: usize) -> Result<usize> {
        if !(RESERVED_FDS..MAX_FILES_OPEN_PER_PROC).contains(&local_fd) {
            return Err(FsError::BadDescriptor(local_fd));
        }
        self.fd_table[local_fd].ok_or(FsError::BadDescriptor(local_fd))
    }
}

/// How far `file_create` got, each step is undone along with the ones before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum CreateStep {
    InodeTaken,
    SlotTaken,
}

fn rollback_create(
    part: &mut MountedPartition,
    table: &mut FileTable,
    step: CreateStep,
    inode_no: u32,
    fd_idx: Option<usize>,
) {
    if step >= CreateStep::SlotTaken {
        if let Some(idx) = fd_idx {
            table.files[idx] = File::default();
        }
    }
    // the in-memory inode itself is dropped by the caller
    part.inode_bitmap.set(inode_no as usize, false);
}

/// Create regular file `filename` in `parent` and open it.
pub fn file_create(
    part: &mut MountedPartition,
    table: &mut FileTable,
    task: &mut Task,
    parent: &Dir,
    filename: &str,
    flag: OpenFlags,
) -> Result<usize> {
    // validated before anything is taken
    let probe = create_dir_entry(filename, 0, FileType::Regular)?;
    let mut io_buf = vec![0u8; SECTOR_SIZE * 2];

    let inode_no = part.inode_bitmap_alloc().ok_or_else(|| {
        log::warn!("in file_create: allocate inode failed");
        FsError::NoFreeInode
    })?;

    let mut new_inode = Inode::new(inode_no);
    // the creator is the writer
    new_inode.write_deny = flag.writable();

    let fd_idx = match table.get_free_slot_in_global() {
        Ok(idx) => idx,
        Err(e) => {
            rollback_create(part, table, CreateStep::InodeTaken, inode_no, None);
            return Err(e);
        }
    };
    table.files[fd_idx] = File {
        fd_pos: 0,
        fd_flag: flag,
        fd_inode: Some(inode_no),
    };

    let new_dir_entry = dir::DirEntry {
        i_no: inode_no,
        ..probe
    };
    if let Err(e) = sync_dir_entry(part, parent, &new_dir_entry, &mut io_buf) {
        log::warn!("sync dir_entry to disk failed");
        rollback_create(part, table, CreateStep::SlotTaken, inode_no, Some(fd_idx));
        return Err(e);
    }

    inode_sync_open(part, parent.inode_no, &mut io_buf);
    inode_sync(part, &new_inode, &mut io_buf);
    part.bitmap_sync(inode_no, BitmapType::Inode);

    new_inode.i_open_cnts = 1;
    {
        let _intr = part.intr.disable();
        part.open_inodes.insert(new_inode);
    }

    match task.pcb_fd_install(fd_idx) {
        Ok(fd) => Ok(fd),
        Err(e) => {
            // the file exists now, only the open is undone
            table.files[fd_idx] = File::default();
            inode_close(part, inode_no);
            Err(e)
        }
    }
}

/// Open existing inode `inode_no`. Only one writer at a time.
pub fn file_open(
    part: &mut MountedPartition,
    table: &mut FileTable,
    task: &mut Task,
    inode_no: u32,
    flag: OpenFlags,
) -> Result<usize> {
    let fd_idx = table.get_free_slot_in_global()?;
    inode_open(part, inode_no);
    table.files[fd_idx] = File {
        fd_pos: 0,
        fd_flag: flag,
        fd_inode: Some(inode_no),
    };

    if flag.writable() {
        let denied = {
            // test-and-set of the writer flag is one critical section
            let _intr = part.intr.disable();
            let inode = part.open_inodes.inode_mut(inode_no);
            if inode.write_deny {
                true
            } else {
                inode.write_deny = true;
                false
            }
        };
        if denied {
            table.files[fd_idx] = File::default();
            inode_close(part, inode_no);
            log::warn!("file can't be write now, try again later");
            return Err(FsError::WriteDenied);
        }
    }

    match task.pcb_fd_install(fd_idx) {
        Ok(fd) => Ok(fd),
        Err(e) => {
            file_close(part, &mut table.files[fd_idx])?;
            Err(e)
        }
    }
}

/// Release `file`'s writer flag (if it holds it) and its inode.
pub fn file_close(part: &mut MountedPartition, file: &mut File) -> Result<()> {
    let inode_no = file.fd_inode.ok_or(FsError::BadDescriptor(0))?;
    if file.fd_flag.writable() {
        part.open_inodes.inode_mut(inode_no).write_deny = false;
    }
    inode_close(part, inode_no);
    *file = File::default();
    Ok(())
}

/// Write `buf` at the file position, allocating blocks as needed.
pub fn file_write(part: &mut MountedPartition, file: &mut File, buf: &[u8]) -> Result<usize> {
    let inode_no = file.fd_inode.ok_or(FsError::BadDescriptor(0))?;
    if !file.fd_flag.writable() {
        return Err(FsError::NotWritable);
    }
    if buf.is_empty() {
        return Ok(0);
    }
    let start = file.fd_pos as usize;
    let end = start + buf.len();
    if end > MAXFILE * BLOCK_SIZE {
        log::warn!("exceed max file_size {} bytes, write file failed", MAXFILE * BLOCK_SIZE);
        return Err(FsError::FileTooLarge(MAXFILE * BLOCK_SIZE));
    }

    let mut inode = part.open_inodes.inode(inode_no).clone();
    let mut io_buf = vec![0u8; SECTOR_SIZE * 2];
    let mut all_blocks = all_blocks(part, &inode);
    let first_blk = start / BLOCK_SIZE;
    let last_blk = (end - 1) / BLOCK_SIZE;
    let mut fresh = [false; MAXFILE];

    let alloced = alloc_file_blocks(
        part,
        &mut inode,
        &mut all_blocks,
        &mut fresh,
        first_blk..=last_blk,
    );
    if let Err(e) = alloced {
        // whatever got allocated is already in the bitmap, keep it reachable
        *part.open_inodes.inode_mut(inode_no) = inode;
        inode_sync_open(part, inode_no, &mut io_buf);
        return Err(e);
    }

    let mut sec = [0u8; SECTOR_SIZE];
    let mut pos = start;
    let mut written = 0;
    while written < buf.len() {
        let blk = pos / BLOCK_SIZE;
        let off = pos % BLOCK_SIZE;
        let chunk = (BLOCK_SIZE - off).min(buf.len() - written);
        if chunk < BLOCK_SIZE && !fresh[blk] {
            part.read_sectors(all_blocks[blk], &mut sec, 1);
        } else {
            sec.fill(0);
        }
        sec[off..off + chunk].copy_from_slice(&buf[written..written + chunk]);
        part.write_sectors(all_blocks[blk], &sec, 1);
        pos += chunk;
        written += chunk;
    }

    file.fd_pos = end as u32;
    inode.i_size = inode.i_size.max(end as u32);
    *part.open_inodes.inode_mut(inode_no) = inode;
    inode_sync_open(part, inode_no, &mut io_buf);
    Ok(written)
}

fn alloc_file_blocks(
    part: &mut MountedPartition,
    inode: &mut Inode,
    all_blocks: &mut [u32; MAXFILE],
    fresh: &mut [bool; MAXFILE],
    blks: std::ops::RangeInclusive<usize>,
) -> Result<()> {
    let mut table_dirty = false;
    let mut ret = Ok(());
    for blk in blks {
        if all_blocks[blk] != 0 {
            continue;
        }
        if blk >= NDIRECT && inode.i_sectors[NDIRECT] == 0 {
            match part.block_bitmap_alloc() {
                Some(lba) => {
                    part.bitmap_sync(lba - part.sb.data_start_lba, BitmapType::Block);
                    inode.i_sectors[NDIRECT] = lba;
                    table_dirty = true;
                }
                None => {
                    ret = Err(FsError::NoFreeBlock);
                    break;
                }
            }
        }
        match part.block_bitmap_alloc() {
            Some(lba) => {
                part.bitmap_sync(lba - part.sb.data_start_lba, BitmapType::Block);
                all_blocks[blk] = lba;
                fresh[blk] = true;
                if blk < NDIRECT {
                    inode.i_sectors[blk] = lba;
                } else {
                    table_dirty = true;
                }
            }
            None => {
                ret = Err(FsError::NoFreeBlock);
                break;
            }
        }
    }
    if table_dirty {
        write_indirect_table(part, inode.i_sectors[NDIRECT], all_blocks);
    }
    if ret.is_err() {
        log::warn!("file_write: alloc block failed");
    }
    ret
}

/// Read from the file position into `buf`, at most up to the end of file.
pub fn file_read(part: &MountedPartition, file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let inode_no = file.fd_inode.ok_or(FsError::BadDescriptor(0))?;
    if !file.fd_flag.readable() {
        return Err(FsError::NotReadable);
    }
    let inode = part.open_inodes.inode(inode_no);
    let start = file.fd_pos as usize;
    let size = inode.i_size as usize;
    if start >= size {
        return Ok(0);
    }
    let size_to_read = buf.len().min(size - start);
    let all_blocks = all_blocks(part, inode);

    let mut sec = [0u8; SECTOR_SIZE];
    let mut pos = start;
    let mut read = 0;
    while read < size_to_read {
        let blk = pos / BLOCK_SIZE;
        let off = pos % BLOCK_SIZE;
        let chunk = (BLOCK_SIZE - off).min(size_to_read - read);
        if all_blocks[blk] == 0 {
            sec.fill(0);
        } else {
            part.read_sectors(all_blocks[blk], &mut sec, 1);
        }
        buf[read..read + chunk].copy_from_slice(&sec[off..off + chunk]);
        pos += chunk;
        read += chunk;
    }
    file.fd_pos = pos as u32;
    Ok(read)
}

/// Move the file position. The new position must stay within [0, size].
pub fn file_lseek(
    part: &MountedPartition,
    file: &mut File,
    offset: i64,
    whence: Whence,
) -> Result<u32> {
    let inode_no = file.fd_inode.ok_or(FsError::BadDescriptor(0))?;
    let size = part.open_inodes.inode(inode_no).i_size as i64;
    let new_pos = match whence {
        Whence::Set => offset,
        Whence::Cur => file.fd_pos as i64 + offset,
        Whence::End => size + offset,
    };
    if !(0..=size).contains(&new_pos) {
        return Err(FsError::InvalidSeek(new_pos));
    }
    file.fd_pos = new_pos as u32;
    Ok(file.fd_pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_slots_skip_standard_streams() {
        let mut table = FileTable::new();
        assert_eq!(table.get_free_slot_in_global().unwrap(), RESERVED_FDS);
        for i in RESERVED_FDS..MAX_FILE_OPEN {
            table.get_mut(i).fd_inode = Some(i as u32);
        }
        assert!(matches!(
            table.get_free_slot_in_global(),
            Err(FsError::FileTableFull)
        ));
        table.get_mut(7).fd_inode = None;
        assert_eq!(table.get_free_slot_in_global().unwrap(), 7);
    }

    #[test]
    fn task_fds_start_after_standard_streams() {
        let mut task = Task::new();
        let first = task.pcb_fd_install(10).unwrap();
        assert_eq!(first, RESERVED_FDS);
        assert_eq!(task.fd_local2global(first).unwrap(), 10);
        for g in 0..MAX_FILES_OPEN_PER_PROC - RESERVED_FDS - 1 {
            task.pcb_fd_install(11 + g).unwrap();
        }
        assert!(matches!(task.pcb_fd_install(30), Err(FsError::FdTableFull)));
        assert!(matches!(task.fd_local2global(1), Err(FsError::BadDescriptor(1))));
    }

    #[test]
    fn access_modes() {
        assert!(!OpenFlags::O_RDONLY.writable());
        assert!(OpenFlags::O_RDONLY.readable());
        assert!(OpenFlags::O_WRONLY.writable());
        assert!(!OpenFlags::O_WRONLY.readable());
        let rw = OpenFlags::O_CREAT | OpenFlags::O_RDWR;
        assert!(rw.writable() && rw.readable());
        assert!(!OpenFlags::O_CREAT.writable());
    }
}
