//! Host tool: builds and edits disk images through the same driver and
//! filesystem code the kernel runs, against an emulated controller.
//!
//! The image is attached as channel 0 slave (sdb); a scratch boot disk sits
//! at master (sda) the way the kernel's own disk would.

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use kfs::block_device::{BlockDevice, FileDisk, MemDisk};
use kfs::common::{PART_TYPE_EXTENDED, SECTOR_SIZE};
use kfs::controller::AtaController;
use kfs::dir::FileType;
use kfs::ide::{write_partition_table, PartitionTableEntry};
use kfs::intr::Interrupts;
use kfs::{FileSystem, FsConfig, FsError, Ide, IdeConfig, OpenFlags, Result, Task};

use std::io::Write;
use std::sync::Arc;

/// first partition starts 1MiB in, like fdisk does
const FIRST_PART_LBA: u32 = 2048;
const BOOT_DISK_SECTORS: usize = 64;
const LINUX_PART_TYPE: u8 = 0x83;

fn cli() -> Command {
    let image = Arg::new("image").required(true).help("disk image file");
    let path = Arg::new("path").required(true).help("absolute path inside the filesystem");
    Command::new("kfs")
        .about("tiny kernel filesystem image tool")
        .arg(
            Arg::new("partition")
                .long("partition")
                .short('p')
                .global(true)
                .default_value("sdb1")
                .help("partition to mount"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("mkimg")
                .about("create a partitioned image")
                .arg(image.clone())
                .arg(
                    Arg::new("sectors")
                        .long("sectors")
                        .short('s')
                        .value_parser(value_parser!(u32))
                        .default_value("32768"),
                )
                .arg(
                    Arg::new("primary")
                        .long("primary")
                        .value_parser(value_parser!(u32).range(1..=4))
                        .default_value("1")
                        .help("primary partitions"),
                )
                .arg(
                    Arg::new("logical")
                        .long("logical")
                        .value_parser(value_parser!(u32).range(0..=8))
                        .default_value("0")
                        .help("logical partitions in an extended partition"),
                ),
        )
        .subcommand(
            Command::new("info")
                .about("list disks, partitions and the mounted super block")
                .arg(image.clone()),
        )
        .subcommand(
            Command::new("mkdir")
                .about("create a directory")
                .arg(image.clone())
                .arg(path.clone()),
        )
        .subcommand(
            Command::new("put")
                .about("copy a host file in")
                .arg(image.clone())
                .arg(Arg::new("src").required(true).help("host file"))
                .arg(path.clone()),
        )
        .subcommand(
            Command::new("cat")
                .about("print a file")
                .arg(image.clone())
                .arg(path.clone()),
        )
        .subcommand(
            Command::new("ls")
                .about("list a directory")
                .arg(image)
                .arg(Arg::new("path").default_value("/"))
                .arg(
                    Arg::new("long")
                        .short('l')
                        .action(ArgAction::SetTrue)
                        .help("show inode numbers and types"),
                ),
        )
}

/// Size of each primary partition when `sectors` are shared by `primary`
/// primaries and, with `logical` > 0, one extended partition.
fn partition_size(sectors: u32, primary: u32, logical: u32) -> Result<u32> {
    let usable = sectors.saturating_sub(FIRST_PART_LBA);
    let slots = if logical > 0 { primary + 1 } else { primary };
    let part_size = usable / slots;
    // an EBR plus at least one sector for each logical partition
    if part_size == 0 || usable - primary * part_size < 2 * logical {
        return Err(FsError::InvalidGeometry(format!(
            "{} sectors can't hold {} primary and {} logical partitions",
            sectors, primary, logical
        )));
    }
    Ok(part_size)
}

/// Split `sectors` into `primary` primaries, the last one extended when
/// `logical` partitions are wanted, and write the MBR/EBR chain.
fn mkimg(path: &str, sectors: u32, primary: u32, logical: u32) -> Result<()> {
    let part_size = partition_size(sectors, primary, logical)?;
    let disk = FileDisk::create(path, sectors as usize)?;

    let mut mbr = [0u8; SECTOR_SIZE];
    let mut entries = Vec::new();
    for i in 0..primary {
        entries.push(PartitionTableEntry::new(
            LINUX_PART_TYPE,
            FIRST_PART_LBA + i * part_size,
            part_size,
        ));
    }
    if logical > 0 {
        let ext_base = FIRST_PART_LBA + primary * part_size;
        let ext_size = sectors - ext_base;
        entries.push(PartitionTableEntry::new(PART_TYPE_EXTENDED, ext_base, ext_size));

        // every EBR is followed by its logical partition
        let span = ext_size / logical;
        for i in 0..logical {
            let ebr_lba = ext_base + i * span;
            let mut ebr = [0u8; SECTOR_SIZE];
            let mut ebr_entries = vec![PartitionTableEntry::new(LINUX_PART_TYPE, 1, span - 1)];
            if i + 1 < logical {
                // the link is relative to the start of the extended partition
                ebr_entries.push(PartitionTableEntry::new(
                    PART_TYPE_EXTENDED,
                    (i + 1) * span,
                    span,
                ));
            }
            write_partition_table(&mut ebr, &ebr_entries);
            disk.write_block(ebr_lba as usize, &ebr);
        }
    }
    write_partition_table(&mut mbr, &entries);
    disk.write_block(0, &mbr);
    println!(
        "{}: {} sectors, {} primary, {} logical partitions",
        path, sectors, primary, logical
    );
    Ok(())
}

/// Bring up the emulated machine with `image` as sdb.
fn boot_ide(image: &str) -> Result<(Ide, Arc<Interrupts>)> {
    let intr = Arc::new(Interrupts::new());
    let controller = Arc::new(AtaController::new(intr.clone()));
    controller.attach(0, 0, Arc::new(MemDisk::new(BOOT_DISK_SECTORS)));
    controller.attach(0, 1, Arc::new(FileDisk::open(image)?));
    let ide = Ide::init(controller, &intr, &IdeConfig::default());
    Ok((ide, intr))
}

fn mount(matches: &ArgMatches, image: &str) -> Result<FileSystem> {
    let (ide, intr) = boot_ide(image)?;
    let config = FsConfig {
        default_partition: matches
            .get_one::<String>("partition")
            .cloned()
            .unwrap_or_default(),
    };
    FileSystem::init(ide, intr, &config)
}

fn put(fs: &FileSystem, src: &str, path: &str) -> Result<()> {
    let data = std::fs::read(src)?;
    let mut task = Task::new();
    let fd = match fs.sys_open(&mut task, path, OpenFlags::O_CREAT | OpenFlags::O_WRONLY) {
        Err(FsError::AlreadyExists(_)) => fs.sys_open(&mut task, path, OpenFlags::O_WRONLY)?,
        ret => ret?,
    };
    let written = fs.sys_write(&task, fd, &data)?;
    fs.sys_close(&mut task, fd)?;
    println!("{} -> {}: {} bytes", src, path, written);
    Ok(())
}

fn cat(fs: &FileSystem, path: &str) -> Result<()> {
    let mut task = Task::new();
    let fd = fs.sys_open(&mut task, path, OpenFlags::O_RDONLY)?;
    let mut buf = [0u8; SECTOR_SIZE];
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    loop {
        let n = fs.sys_read(&task, fd, &mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
    }
    fs.sys_close(&mut task, fd)
}

fn ls(fs: &FileSystem, path: &str, long: bool) -> Result<()> {
    for entry in fs.sys_readdir(path)? {
        if long {
            let kind = match entry.f_type {
                FileType::Directory => 'd',
                FileType::Regular => '-',
                FileType::Unknown => '?',
            };
            println!("{} {:>5} {}", kind, entry.i_no, entry.name());
        } else {
            println!("{}", entry.name());
        }
    }
    Ok(())
}

fn info(matches: &ArgMatches, image: &str) -> Result<()> {
    let fs = mount(matches, image)?;
    for disk in fs.ide().disks() {
        if let Some(info) = disk.info() {
            println!("{}: {} [{}] {} sectors", disk.name, info.model, info.serial, info.sectors);
        }
        for part in disk.primary_parts().iter().chain(disk.logical_parts()) {
            println!(
                "   {} start_lba:{:#x} sec_cnt:{:#x}",
                part.name, part.start_lba, part.sec_cnt
            );
        }
    }

    let part = fs.partition();
    let sb = &part.sb;
    println!("mounted {}:", part.part.name);
    println!("   inode_cnt:{} data_start_lba:{:#x}", sb.inode_cnt, sb.data_start_lba);
    println!(
        "   block_bitmap {:#x}+{} inode_bitmap {:#x}+{} inode_table {:#x}+{}",
        sb.block_bitmap_lba,
        sb.block_bitmap_sects,
        sb.inode_bitmap_lba,
        sb.inode_bitmap_sects,
        sb.inode_table_lba,
        sb.inode_table_sects
    );
    Ok(())
}

fn run(matches: &ArgMatches) -> Result<()> {
    let (name, sub) = match matches.subcommand() {
        Some(x) => x,
        None => return Ok(()),
    };
    let image = sub.get_one::<String>("image").map(String::as_str).unwrap_or_default();
    let path = || sub.get_one::<String>("path").map(String::as_str).unwrap_or("/");
    match name {
        "mkimg" => mkimg(
            image,
            *sub.get_one::<u32>("sectors").unwrap_or(&32768),
            *sub.get_one::<u32>("primary").unwrap_or(&1),
            *sub.get_one::<u32>("logical").unwrap_or(&0),
        ),
        "info" => info(matches, image),
        "mkdir" => mount(matches, image)?.sys_mkdir(path()),
        "put" => {
            let src = sub.get_one::<String>("src").map(String::as_str).unwrap_or_default();
            put(&mount(matches, image)?, src, path())
        }
        "cat" => cat(&mount(matches, image)?, path()),
        "ls" => ls(&mount(matches, image)?, path(), sub.get_flag("long")),
        _ => Ok(()),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let matches = cli().get_matches();
    if let Err(e) = run(&matches) {
        eprintln!("kfs: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_too_small_is_refused() {
        assert!(matches!(
            partition_size(1024, 1, 1),
            Err(FsError::InvalidGeometry(_))
        ));
        assert!(matches!(
            partition_size(FIRST_PART_LBA + 3, 1, 2),
            Err(FsError::InvalidGeometry(_))
        ));
        assert!(matches!(
            partition_size(FIRST_PART_LBA, 1, 0),
            Err(FsError::InvalidGeometry(_))
        ));
        assert_eq!(partition_size(4096, 4, 0).unwrap(), 512);
        // 2048 usable: 3 slots of 682, the extended one gets the 684 left
        assert_eq!(partition_size(4096, 2, 8).unwrap(), 682);
    }
}
