#![allow(dead_code)]

use kfs::block_device::{BlockDevice, MemDisk};
use kfs::common::{PART_TYPE_EXTENDED, SECTOR_SIZE};
use kfs::controller::AtaController;
use kfs::ide::{write_partition_table, PartitionTableEntry};
use kfs::intr::Interrupts;
use kfs::{FileSystem, FsConfig, Ide, IdeConfig};

use std::sync::Arc;

pub const LINUX: u8 = 0x83;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A disk of `sectors` with `primaries` as (start_lba, sec_cnt) and, when
/// `logicals` is not empty, an extended partition right after the last
/// primary holding one logical partition of each listed size.
pub fn partitioned_disk(
    sectors: usize,
    primaries: &[(u32, u32)],
    logicals: &[u32],
) -> Arc<MemDisk> {
    let disk = MemDisk::new(sectors);
    let mut entries: Vec<_> = primaries
        .iter()
        .map(|&(start, cnt)| PartitionTableEntry::new(LINUX, start, cnt))
        .collect();

    if !logicals.is_empty() {
        let ext_base = primaries.iter().map(|&(s, c)| s + c).max().unwrap_or(1);
        let ext_size: u32 = logicals.iter().map(|l| l + 1).sum();
        entries.push(PartitionTableEntry::new(PART_TYPE_EXTENDED, ext_base, ext_size));

        let mut ebr_off = 0;
        for (i, &size) in logicals.iter().enumerate() {
            let mut ebr = [0u8; SECTOR_SIZE];
            let mut ebr_entries = vec![PartitionTableEntry::new(LINUX, 1, size)];
            let next_off = ebr_off + size + 1;
            if i + 1 < logicals.len() {
                ebr_entries.push(PartitionTableEntry::new(
                    PART_TYPE_EXTENDED,
                    next_off,
                    logicals[i + 1] + 1,
                ));
            }
            write_partition_table(&mut ebr, &ebr_entries);
            disk.write_block((ext_base + ebr_off) as usize, &ebr);
            ebr_off = next_off;
        }
    }

    let mut mbr = [0u8; SECTOR_SIZE];
    write_partition_table(&mut mbr, &entries);
    disk.write_block(0, &mbr);
    Arc::new(disk)
}

/// the disk most filesystem tests run on: sdb1 of 4096 sectors
pub fn fs_disk() -> Arc<MemDisk> {
    partitioned_disk(8192, &[(2048, 4096)], &[])
}

pub struct Machine {
    pub intr: Arc<Interrupts>,
    pub controller: Arc<AtaController>,
    pub ide: Ide,
}

pub fn boot_disks(sda: Arc<MemDisk>, sdb: Arc<MemDisk>, config: &IdeConfig) -> Machine {
    init_logger();
    let intr = Arc::new(Interrupts::new());
    let controller = Arc::new(AtaController::new(intr.clone()));
    controller.attach(0, 0, sda);
    controller.attach(0, 1, sdb);
    let ide = Ide::init(controller.clone(), &intr, config);
    Machine {
        intr,
        controller,
        ide,
    }
}

/// sda is a blank boot disk, `sdb` the disk under test.
pub fn boot_with(sdb: Arc<MemDisk>, config: &IdeConfig) -> Machine {
    boot_disks(Arc::new(MemDisk::new(1024)), sdb, config)
}

pub fn boot(sdb: Arc<MemDisk>) -> Machine {
    boot_with(sdb, &IdeConfig::default())
}

pub fn mount(sdb: Arc<MemDisk>) -> FileSystem {
    let machine = boot(sdb);
    FileSystem::init(machine.ide, machine.intr, &FsConfig::default()).unwrap()
}
