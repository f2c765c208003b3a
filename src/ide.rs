//! Driver for a pair of IDE channels (two drives each) in LBA28 PIO mode.
//!
//! A transfer goes: command issued (expecting interrupt) -> interrupt fires and
//! ups `disk_done` -> status polled until not busy -> data moved -> idle.
//! The poll after the interrupt is needed because the interrupt only says the
//! operation finished, not that the status register has settled.

use super::*;
use common::*;
use intr::Interrupts;
use port::PortIo;
use sync::{Mutex, Semaphore};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::Duration;

pub const REG_DATA: u16 = 0;
pub const REG_ERROR: u16 = 1;
pub const REG_SECT_CNT: u16 = 2;
pub const REG_LBA_L: u16 = 3;
pub const REG_LBA_M: u16 = 4;
pub const REG_LBA_H: u16 = 5;
pub const REG_DEV: u16 = 6;
pub const REG_STATUS: u16 = 7;
pub const REG_CMD: u16 = REG_STATUS;
pub const REG_ALT_STATUS: u16 = 0x206;

/// controller busy
pub const BIT_STAT_BSY: u8 = 0x80;
/// drive ready
pub const BIT_STAT_DRDY: u8 = 0x40;
/// data ready to be transferred
pub const BIT_STAT_DRQ: u8 = 0x08;
pub const BIT_STAT_ERR: u8 = 0x01;

/// bits 7 and 5 are always 1
pub const BIT_DEV_MBS: u8 = 0xa0;
pub const BIT_DEV_LBA: u8 = 0x40;
/// slave drive
pub const BIT_DEV_DEV: u8 = 0x10;

pub const CMD_IDENTIFY: u8 = 0xec;
pub const CMD_READ_SECTOR: u8 = 0x20;
pub const CMD_WRITE_SECTOR: u8 = 0x30;

pub const PRIMARY_PORT_BASE: u16 = 0x1f0;
pub const SECONDARY_PORT_BASE: u16 = 0x170;
/// 0x20 + 14 and 0x20 + 15 on the slave 8259A
pub const PRIMARY_IRQ: u8 = 0x2e;
pub const SECONDARY_IRQ: u8 = 0x2f;

/// byte offset of the partition table in a boot sector
pub const PART_TABLE_OFFSET: usize = 446;
pub const PART_ENTRY_SIZE: usize = 16;

#[derive(Clone, Debug)]
pub struct IdeConfig {
    /// number of attached hard disks (what the BIOS reports at 0x475)
    pub disk_count: u8,
    /// ceiling of the post-interrupt status poll
    pub busy_wait_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for IdeConfig {
    fn default() -> Self {
        Self {
            disk_count: 2,
            busy_wait_ms: 30 * 1000,
            poll_interval_ms: 10,
        }
    }
}

/// One entry of an MBR/EBR partition table, 16 bytes on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTableEntry {
    pub bootable: u8,
    pub start_head: u8,
    pub start_sec: u8,
    pub start_chs: u8,
    pub fs_type: u8,
    pub end_head: u8,
    pub end_sec: u8,
    pub end_chs: u8,
    /// first sector of the partition, relative to the table's base
    pub start_lba: u32,
    pub sec_cnt: u32,
}

impl PartitionTableEntry {
    pub fn new(fs_type: u8, start_lba: u32, sec_cnt: u32) -> Self {
        Self {
            fs_type,
            start_lba,
            sec_cnt,
            ..Default::default()
        }
    }
}

/// Decode the 4 partition table entries of a boot sector (MBR or EBR).
pub fn read_partition_table(sector: &[u8]) -> [PartitionTableEntry; 4] {
    let mut entries = [PartitionTableEntry::default(); 4];
    for (i, entry) in entries.iter_mut().enumerate() {
        let off = PART_TABLE_OFFSET + i * PART_ENTRY_SIZE;
        *entry = bincode::deserialize(&sector[off..off + PART_ENTRY_SIZE])
            .unwrap_or_else(|e| panic!("partition entry {} undecodable: {}", i, e));
    }
    entries
}

/// Fill the partition table and the 0x55aa signature of a boot sector.
pub fn write_partition_table(sector: &mut [u8], entries: &[PartitionTableEntry]) {
    assert!(entries.len() <= 4);
    sector[PART_TABLE_OFFSET..SECTOR_SIZE].fill(0);
    for (i, entry) in entries.iter().enumerate() {
        let off = PART_TABLE_OFFSET + i * PART_ENTRY_SIZE;
        bincode::serialize_into(&mut sector[off..off + PART_ENTRY_SIZE], entry)
            .unwrap_or_else(|e| panic!("partition entry {} unencodable: {}", i, e));
    }
    sector[SECTOR_SIZE - 2..SECTOR_SIZE].copy_from_slice(&BOOT_SIGNATURE.to_le_bytes());
}

pub struct Channel {
    pub name: String,
    pub port_base: u16,
    pub irq_no: u8,
    /// set by `issue_command`, only then does the handler signal `disk_done`
    expecting_intr: AtomicBool,
    /// serializes every transfer on this channel
    lock: Mutex,
    disk_done: Semaphore,
    io: Arc<dyn PortIo>,
    busy_wait_ms: u64,
    poll_interval_ms: u64,
}

impl Channel {
    fn new(channel_no: usize, io: Arc<dyn PortIo>, config: &IdeConfig) -> Self {
        let (port_base, irq_no) = match channel_no {
            0 => (PRIMARY_PORT_BASE, PRIMARY_IRQ),
            1 => (SECONDARY_PORT_BASE, SECONDARY_IRQ),
            _ => panic!("only two ide channels exist"),
        };
        Self {
            name: format!("ide{}", channel_no),
            port_base,
            irq_no,
            expecting_intr: AtomicBool::new(false),
            lock: Mutex::new(),
            // 0: whoever issues a command blocks until the handler ups it
            disk_done: Semaphore::new(0),
            io,
            busy_wait_ms: config.busy_wait_ms,
            poll_interval_ms: config.poll_interval_ms,
        }
    }

    fn reg(&self, offset: u16) -> u16 {
        self.port_base + offset
    }

    pub fn issue_command(&self, cmd: u8) {
        self.expecting_intr.store(true, Ordering::SeqCst);
        self.io.outb(self.reg(REG_CMD), cmd);
    }

    pub fn intr_handler(&self, irq_no: u8) {
        assert_eq!(irq_no, self.irq_no);
        // each transfer holds the channel lock, so this is the interrupt it waits for
        if self.expecting_intr.swap(false, Ordering::SeqCst) {
            self.disk_done.up();
            // reading status tells the controller the interrupt was handled
            self.io.inb(self.reg(REG_STATUS));
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskInfo {
    pub serial: String,
    pub model: String,
    pub sectors: u32,
}

#[derive(Default)]
pub struct DiskParts {
    pub primary: Vec<Arc<Partition>>,
    pub logical: Vec<Arc<Partition>>,
}

pub struct Disk {
    pub name: String,
    /// 0 master, 1 slave
    pub dev_no: u8,
    channel: Arc<Channel>,
    info: OnceLock<DiskInfo>,
    parts: OnceLock<DiskParts>,
}

pub struct Partition {
    pub name: String,
    pub start_lba: u32,
    pub sec_cnt: u32,
    pub disk: Arc<Disk>,
}

/// State carried through one recursive partition table walk.
#[derive(Default)]
struct PartitionScan {
    /// lba of the outermost extended partition, every nested one is relative to it
    ext_lba_base: u32,
    parts: DiskParts,
}

/// swap each pair of bytes, identify strings are stored that way
fn swap_pairs_bytes(src: &[u8]) -> String {
    let mut buf = Vec::with_capacity(src.len());
    for pair in src.chunks(2) {
        buf.extend(pair.iter().rev());
    }
    String::from_utf8_lossy(&buf)
        .trim_end_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}

impl Disk {
    pub fn info(&self) -> Option<&DiskInfo> {
        self.info.get()
    }

    pub fn primary_parts(&self) -> &[Arc<Partition>] {
        match self.parts.get() {
            Some(parts) => parts.primary.as_slice(),
            None => &[],
        }
    }

    pub fn logical_parts(&self) -> &[Arc<Partition>] {
        match self.parts.get() {
            Some(parts) => parts.logical.as_slice(),
            None => &[],
        }
    }

    fn device_byte(&self) -> u8 {
        let mut reg_device = BIT_DEV_MBS | BIT_DEV_LBA;
        if self.dev_no == 1 {
            reg_device |= BIT_DEV_DEV;
        }
        reg_device
    }

    pub fn select_drive(&self) {
        let ch = &self.channel;
        ch.io.outb(ch.reg(REG_DEV), self.device_byte());
    }

    /// `sec_cnt` 0 stands for 256 sectors
    pub fn select_sector(&self, lba: u32, sec_cnt: u8) {
        assert!(lba <= 0x0fff_ffff, "lba {} out of LBA28 range", lba);
        let ch = &self.channel;
        ch.io.outb(ch.reg(REG_SECT_CNT), sec_cnt);
        ch.io.outb(ch.reg(REG_LBA_L), lba as u8);
        ch.io.outb(ch.reg(REG_LBA_M), (lba >> 8) as u8);
        ch.io.outb(ch.reg(REG_LBA_H), (lba >> 16) as u8);
        // bits 24~27 go to the low nibble of the device register
        let lba_hi = (lba >> 24) as u8;
        ch.io.outb(ch.reg(REG_DEV), self.device_byte() | lba_hi);
    }

    /// Poll for "not busy", report whether data is ready. false on timeout.
    pub fn wait_ready(&self) -> bool {
        let ch = &self.channel;
        let mut time_limit = ch.busy_wait_ms;
        loop {
            let status = ch.io.inb(ch.reg(REG_STATUS));
            if status & BIT_STAT_BSY == 0 {
                return status & BIT_STAT_DRQ != 0;
            }
            if time_limit < ch.poll_interval_ms {
                return false;
            }
            time_limit -= ch.poll_interval_ms;
            thread::sleep(Duration::from_millis(ch.poll_interval_ms));
        }
    }

    fn read_from_sector(&self, buf: &mut [u8]) {
        self.channel.io.insw(self.channel.reg(REG_DATA), buf);
    }

    fn write_to_sector(&self, buf: &[u8]) {
        self.channel.io.outsw(self.channel.reg(REG_DATA), buf);
    }

    /// Read `sec_cnt` sectors starting at `lba` into `buf`.
    pub fn read_sectors(&self, lba: u32, buf: &mut [u8], sec_cnt: usize) {
        assert!(sec_cnt > 0);
        assert!(buf.len() >= sec_cnt * SECTOR_SIZE);
        let ch = &self.channel;
        let _guard = ch.lock.lock();

        self.select_drive();
        let mut secs_done = 0;
        while secs_done < sec_cnt {
            let secs_op = (sec_cnt - secs_done).min(MAX_SECS_PER_CMD);
            // 256 wraps to 0, which the controller reads as 256
            self.select_sector(lba + secs_done as u32, secs_op as u8);
            ch.issue_command(CMD_READ_SECTOR);
            ch.disk_done.down();
            if !self.wait_ready() {
                panic!("{} read sector {} failed!!!!!!", self.name, lba);
            }
            let start = secs_done * SECTOR_SIZE;
            self.read_from_sector(&mut buf[start..start + secs_op * SECTOR_SIZE]);
            secs_done += secs_op;
        }
    }

    /// Write `sec_cnt` sectors of `buf` starting at `lba`.
    pub fn write_sectors(&self, lba: u32, buf: &[u8], sec_cnt: usize) {
        assert!(sec_cnt > 0);
        assert!(buf.len() >= sec_cnt * SECTOR_SIZE);
        let ch = &self.channel;
        let _guard = ch.lock.lock();

        self.select_drive();
        let mut secs_done = 0;
        while secs_done < sec_cnt {
            let secs_op = (sec_cnt - secs_done).min(MAX_SECS_PER_CMD);
            self.select_sector(lba + secs_done as u32, secs_op as u8);
            ch.issue_command(CMD_WRITE_SECTOR);
            if !self.wait_ready() {
                panic!("{} write sector {} failed!!!!!!", self.name, lba);
            }
            let start = secs_done * SECTOR_SIZE;
            self.write_to_sector(&buf[start..start + secs_op * SECTOR_SIZE]);
            // the controller is now writing its buffer to the media
            ch.disk_done.down();
            secs_done += secs_op;
        }
    }

    pub fn identify(&self) -> DiskInfo {
        let ch = &self.channel;
        let _guard = ch.lock.lock();
        let mut id_info = [0u8; SECTOR_SIZE];

        self.select_drive();
        ch.issue_command(CMD_IDENTIFY);
        ch.disk_done.down();
        if !self.wait_ready() {
            panic!("{} identify failed!!!!!!", self.name);
        }
        self.read_from_sector(&mut id_info);

        let (sn_start, sn_len, md_start, md_len) = (10 * 2, 20, 27 * 2, 40);
        let sectors = u32::from_le_bytes([
            id_info[60 * 2],
            id_info[60 * 2 + 1],
            id_info[60 * 2 + 2],
            id_info[60 * 2 + 3],
        ]);
        let info = DiskInfo {
            serial: swap_pairs_bytes(&id_info[sn_start..sn_start + sn_len]),
            model: swap_pairs_bytes(&id_info[md_start..md_start + md_len]),
            sectors,
        };
        log::info!("disk {} info:", self.name);
        log::info!("   SN: {}", info.serial);
        log::info!("   MODULE: {}", info.model);
        log::info!("   SECTORS: {}", info.sectors);
        log::info!(
            "   CAPACITY: {}MB",
            info.sectors as u64 * SECTOR_SIZE as u64 / 1024 / 1024
        );
        info
    }

    /// Walk the boot sector at `ext_lba` (0 for the MBR), recursing into
    /// extended partitions.
    fn scan_partitions(self: &Arc<Self>, ext_lba: u32, scan: &mut PartitionScan, depth: usize) {
        let mut bs = [0u8; SECTOR_SIZE];
        self.read_sectors(ext_lba, &mut bs, 1);

        for p in read_partition_table(&bs).iter() {
            if p.fs_type == PART_TYPE_EXTENDED {
                // an EBR chain can't be longer than the logical slots it may fill
                if depth > MAX_LOGIC_PARTS {
                    log::warn!("{}: extended partition chain too deep, stop scanning", self.name);
                    continue;
                }
                if scan.ext_lba_base != 0 {
                    // nested extended partitions are relative to the outermost one
                    self.scan_partitions(p.start_lba + scan.ext_lba_base, scan, depth + 1);
                } else {
                    // first extended partition, seen from the MBR
                    scan.ext_lba_base = p.start_lba;
                    self.scan_partitions(p.start_lba, scan, depth + 1);
                }
            } else if p.fs_type != 0 {
                if ext_lba == 0 {
                    let p_no = scan.parts.primary.len();
                    assert!(p_no < MAX_PRIM_PARTS, "{}: too many primary partitions", self.name);
                    scan.parts.primary.push(Arc::new(Partition {
                        name: format!("{}{}", self.name, p_no + 1),
                        start_lba: ext_lba + p.start_lba,
                        sec_cnt: p.sec_cnt,
                        disk: self.clone(),
                    }));
                } else {
                    let l_no = scan.parts.logical.len();
                    assert!(l_no < MAX_LOGIC_PARTS, "{}: too many logical partitions", self.name);
                    // logical partitions are numbered from 5, 1~4 belong to primaries
                    scan.parts.logical.push(Arc::new(Partition {
                        name: format!("{}{}", self.name, l_no + 5),
                        start_lba: ext_lba + p.start_lba,
                        sec_cnt: p.sec_cnt,
                        disk: self.clone(),
                    }));
                }
            }
        }
    }
}

impl Partition {
    pub fn read_sectors(&self, lba: u32, buf: &mut [u8], sec_cnt: usize) {
        self.disk.read_sectors(lba, buf, sec_cnt)
    }

    pub fn write_sectors(&self, lba: u32, buf: &[u8], sec_cnt: usize) {
        self.disk.write_sectors(lba, buf, sec_cnt)
    }
}

/// The driver context: the disks of both channels and every partition found.
/// Each disk holds its channel.
pub struct Ide {
    disks: Vec<Arc<Disk>>,
    partitions: Vec<Arc<Partition>>,
}

impl Ide {
    pub fn init(io: Arc<dyn PortIo>, intr: &Interrupts, config: &IdeConfig) -> Self {
        log::info!("ide_init start...");
        let hd_cnt = config.disk_count as usize;
        assert!(hd_cnt > 0, "no hard disk attached");
        assert!(hd_cnt <= 4, "only two channels of two disks each");
        // two disks per channel
        let channel_cnt = hd_cnt.div_ceil(2);

        let mut ide = Ide {
            disks: Vec::with_capacity(hd_cnt),
            partitions: Vec::new(),
        };
        for channel_no in 0..channel_cnt {
            let channel = Arc::new(Channel::new(channel_no, io.clone(), config));
            let weak: Weak<Channel> = Arc::downgrade(&channel);
            intr.register_handler(
                channel.irq_no,
                Arc::new(move |irq_no| {
                    if let Some(channel) = weak.upgrade() {
                        channel.intr_handler(irq_no);
                    }
                }),
            );

            for dev_no in 0..2 {
                if channel_no * 2 + dev_no >= hd_cnt {
                    break;
                }
                let disk = Arc::new(Disk {
                    name: format!("sd{}", (b'a' + (channel_no * 2 + dev_no) as u8) as char),
                    dev_no: dev_no as u8,
                    channel: channel.clone(),
                    info: OnceLock::new(),
                    parts: OnceLock::new(),
                });
                let info = disk.identify();
                let _ = disk.info.set(info);
                // the raw disk holding the kernel has no partition table
                if !(channel_no == 0 && dev_no == 0) {
                    let mut scan = PartitionScan::default();
                    disk.scan_partitions(0, &mut scan, 0);
                    ide.partitions.extend(scan.parts.primary.iter().cloned());
                    ide.partitions.extend(scan.parts.logical.iter().cloned());
                    let _ = disk.parts.set(scan.parts);
                }
                ide.disks.push(disk);
            }
        }

        log::info!("all partition info:");
        for part in ide.partitions.iter() {
            log::info!(
                "   {} start_lba:{:#x}, sec_cnt:{:#x}",
                part.name,
                part.start_lba,
                part.sec_cnt
            );
        }
        log::info!("ide_init done!");
        ide
    }

    pub fn disks(&self) -> &[Arc<Disk>] {
        &self.disks
    }

    pub fn disk(&self, name: &str) -> Option<&Arc<Disk>> {
        self.disks.iter().find(|d| d.name == name)
    }

    /// every partition, in discovery order
    pub fn partitions(&self) -> &[Arc<Partition>] {
        &self.partitions
    }

    pub fn partition(&self, name: &str) -> Option<&Arc<Partition>> {
        self.partitions.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_device::{BlockDevice, MemDisk};
    use crate::controller::AtaController;

    #[test]
    fn partition_table_layout() {
        let mut sector = [0u8; SECTOR_SIZE];
        let entries = [
            PartitionTableEntry::new(0x83, 2048, 1000),
            PartitionTableEntry::new(PART_TYPE_EXTENDED, 4096, 8192),
        ];
        write_partition_table(&mut sector, &entries);
        assert_eq!(sector[510], 0x55);
        assert_eq!(sector[511], 0xaa);
        // type byte sits at offset 4 of the entry, start lba at 8, count at 12
        assert_eq!(sector[446 + 4], 0x83);
        assert_eq!(&sector[446 + 8..446 + 12], &2048u32.to_le_bytes());
        assert_eq!(&sector[446 + 12..446 + 16], &1000u32.to_le_bytes());
        assert_eq!(sector[462 + 4], PART_TYPE_EXTENDED);

        let decoded = read_partition_table(&sector);
        assert_eq!(decoded[0], entries[0]);
        assert_eq!(decoded[1], entries[1]);
        assert_eq!(decoded[2].fs_type, 0);
    }

    #[test]
    fn identify_strings_are_pair_swapped() {
        assert_eq!(swap_pairs_bytes(b"BQ  "), "QB");
        assert_eq!(swap_pairs_bytes(b"bAcD\0\0"), "AbDc");
    }

    #[test]
    fn interrupt_without_a_command_is_ignored() {
        let intr = Arc::new(Interrupts::new());
        let controller = Arc::new(AtaController::new(intr.clone()));
        let media = Arc::new(MemDisk::new(64));
        controller.attach(0, 0, Arc::new(MemDisk::new(64)));
        controller.attach(0, 1, media.clone());
        let ide = Ide::init(controller, &intr, &IdeConfig::default());
        let sdb = ide.disk("sdb").unwrap();

        // nothing outstanding: no completion may be recorded
        intr.raise(PRIMARY_IRQ);
        intr.raise(PRIMARY_IRQ);
        assert_eq!(sdb.channel.disk_done.value(), 0);
        assert!(!sdb.channel.expecting_intr.load(Ordering::SeqCst));

        media.write_block(9, &[0x5a; SECTOR_SIZE]);
        let mut buf = [0u8; SECTOR_SIZE];
        sdb.read_sectors(9, &mut buf, 1);
        assert!(buf.iter().all(|&b| b == 0x5a));
        assert_eq!(sdb.channel.disk_done.value(), 0);
    }
}
