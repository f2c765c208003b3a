pub mod bitmap;
pub mod block_device; // media behind the emulated drives
pub mod common;
pub mod controller; // emulated ATA controller
pub mod dir;
pub mod error;
pub mod file;
pub mod fs; // file system
pub mod ide; // disk driver
pub mod inode;
pub mod intr;
pub mod port;
pub mod super_block;
pub mod sync;

pub use error::{FsError, Result};
pub use file::{OpenFlags, Task, Whence};
pub use fs::{FileSystem, FsConfig};
pub use ide::{Ide, IdeConfig};
