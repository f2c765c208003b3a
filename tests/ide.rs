mod common;

use common::*;
use kfs::block_device::{BlockDevice, MemDisk};
use kfs::common::SECTOR_SIZE;
use kfs::IdeConfig;

use rand::Rng;
use std::sync::Arc;

#[test]
fn identify_reports_capacity() {
    let machine = boot(fs_disk());
    let sdb = machine.ide.disk("sdb").unwrap();
    let info = sdb.info().unwrap();
    assert_eq!(info.sectors, 8192);
    assert_eq!(info.model, "KFS EMULATED ATA DISK");
    assert_eq!(machine.ide.disks().len(), 2);
}

#[test]
fn scan_finds_primary_and_chained_logical_partitions() {
    let disk = partitioned_disk(
        32768,
        &[(2048, 4096), (6144, 2048)],
        &[1000, 2000, 3000],
    );
    let machine = boot(disk);
    let sdb = machine.ide.disk("sdb").unwrap();

    let primary: Vec<_> = sdb
        .primary_parts()
        .iter()
        .map(|p| (p.name.as_str(), p.start_lba, p.sec_cnt))
        .collect();
    assert_eq!(primary, vec![("sdb1", 2048, 4096), ("sdb2", 6144, 2048)]);

    // extended at 8192; each EBR sits right before its logical partition
    let logical: Vec<_> = sdb
        .logical_parts()
        .iter()
        .map(|p| (p.name.as_str(), p.start_lba, p.sec_cnt))
        .collect();
    assert_eq!(
        logical,
        vec![
            ("sdb5", 8193, 1000),
            ("sdb6", 8192 + 1001 + 1, 2000),
            ("sdb7", 8192 + 1001 + 2001 + 1, 3000),
        ]
    );
    assert_eq!(machine.ide.partitions().len(), 5);
    assert!(machine.ide.partition("sdb6").is_some());
}

#[test]
fn boot_disk_is_not_scanned() {
    // even a partition table on the boot disk is ignored
    let sda = partitioned_disk(1024, &[(100, 100)], &[]);
    let machine = boot_disks(sda, fs_disk(), &IdeConfig::default());
    assert!(machine.ide.disk("sda").unwrap().primary_parts().is_empty());
    assert!(machine
        .ide
        .partitions()
        .iter()
        .all(|p| p.name.starts_with("sdb")));
}

#[test]
#[should_panic(expected = "too many logical partitions")]
fn ninth_logical_partition_is_fatal() {
    boot(partitioned_disk(8192, &[(2048, 64)], &[16; 9]));
}

#[test]
fn sector_round_trip_across_command_boundaries() {
    let media = Arc::new(MemDisk::new(2048));
    let machine = boot(media.clone());
    let sdb = machine.ide.disk("sdb").unwrap();
    let mut rng = rand::thread_rng();

    // 256 is one full command, 257 needs a second one
    for (lba, cnt) in [(3u32, 1usize), (10, 256), (300, 257)] {
        let data: Vec<u8> = (0..cnt * SECTOR_SIZE).map(|_| rng.gen()).collect();
        sdb.write_sectors(lba, &data, cnt);

        let mut back = vec![0u8; cnt * SECTOR_SIZE];
        sdb.read_sectors(lba, &mut back, cnt);
        assert_eq!(back, data, "{} sectors at {}", cnt, lba);

        // and the media really holds them
        let mut sector = [0u8; SECTOR_SIZE];
        media.read_block(lba as usize + cnt - 1, &mut sector);
        assert_eq!(&sector[..], &data[(cnt - 1) * SECTOR_SIZE..]);
    }
}

#[test]
fn channel_serves_every_transfer_in_order() {
    let machine = boot(Arc::new(MemDisk::new(512)));
    let sdb = machine.ide.disk("sdb").unwrap().clone();
    let workers: Vec<_> = (0..4u8)
        .map(|t| {
            let sdb = sdb.clone();
            std::thread::spawn(move || {
                let lba = 16 * t as u32;
                for round in 0..20u8 {
                    let data = [t ^ round; SECTOR_SIZE * 2];
                    sdb.write_sectors(lba, &data, 2);
                    let mut back = [0u8; SECTOR_SIZE * 2];
                    sdb.read_sectors(lba, &mut back, 2);
                    assert_eq!(back, data);
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
}

#[test]
#[should_panic(expected = "read sector 5 failed")]
fn drive_stuck_busy_is_fatal() {
    let config = IdeConfig {
        busy_wait_ms: 30,
        poll_interval_ms: 10,
        ..Default::default()
    };
    let machine = boot_with(fs_disk(), &config);
    machine.controller.set_stuck_busy(0, 1, true);
    let mut buf = [0u8; SECTOR_SIZE];
    machine.ide.disk("sdb").unwrap().read_sectors(5, &mut buf, 1);
}
