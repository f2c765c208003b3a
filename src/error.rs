use std::io;

/// Errors returned to callers of the filesystem. Hardware non-response and
/// broken invariants are not represented here: they panic.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("allocate inode failed")]
    NoFreeInode,

    #[error("block full")]
    NoFreeBlock,

    #[error("exceed max open files")]
    FileTableFull,

    #[error("exceed max open files per task")]
    FdTableFull,

    #[error("directory is full")]
    DirectoryFull,

    #[error("can't open a directory {0} with open(), use opendir() instead")]
    IsDirectory(String),

    /// `subpath` is the prefix of the path that resolution consumed before failing.
    #[error("cannot access {path}: Not a directory, subpath {subpath} isn't exist")]
    IntermediateMissing { path: String, subpath: String },

    #[error("{0} is not a directory")]
    NotADirectory(String),

    #[error("in path {0}, file isn't exist")]
    NotFound(String),

    #[error("{0} has already exist!")]
    AlreadyExists(String),

    #[error("file can't be write now, try again later")]
    WriteDenied,

    #[error("bad file descriptor {0}")]
    BadDescriptor(usize),

    #[error("partition {0} not found")]
    NoSuchPartition(String),

    #[error("{name} is too small for a filesystem: {sectors} sectors")]
    PartitionTooSmall { name: String, sectors: u32 },

    #[error("{0} has no filesystem")]
    NotFormatted(String),

    #[error("bad disk geometry: {0}")]
    InvalidGeometry(String),

    #[error("file name {0} is longer than the directory entry allows")]
    NameTooLong(String),

    #[error("invalid path {0}")]
    InvalidPath(String),

    #[error("file size exceeds {0} bytes")]
    FileTooLarge(usize),

    #[error("seek to {0} is outside the file")]
    InvalidSeek(i64),

    #[error("file is not opened for writing")]
    NotWritable,

    #[error("file is not opened for reading")]
    NotReadable,

    #[error("{0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
