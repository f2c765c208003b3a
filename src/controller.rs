//! Emulated IDE controller pair. It answers the driver's port I/O the way a
//! PIO ATA controller does and raises the channel interrupt on completion.

use super::*;
use block_device::BlockDevice;
use common::{MAX_SECS_PER_CMD, SECTOR_SIZE};
use ide::*;
use intr::Interrupts;
use port::PortIo;

use std::sync::{Arc, Mutex};

struct Drive {
    media: Arc<dyn BlockDevice>,
    serial: String,
    model: String,
    /// never leaves BSY, stands in for a dead drive
    stuck_busy: bool,
}

enum Pending {
    None,
    /// data port receives sectors for this write
    Write { dev: usize, lba: usize, count: usize },
}

struct ChannelState {
    irq_no: u8,
    drives: [Option<Drive>; 2],
    sect_cnt: u8,
    lba_l: u8,
    lba_m: u8,
    lba_h: u8,
    device: u8,
    status: u8,
    /// INTRQ asserted and not yet acknowledged by a status read
    intrq: bool,
    buffer: Vec<u8>,
    pos: usize,
    pending: Pending,
}

impl ChannelState {
    fn new(irq_no: u8) -> Self {
        Self {
            irq_no,
            drives: [None, None],
            sect_cnt: 0,
            lba_l: 0,
            lba_m: 0,
            lba_h: 0,
            device: 0,
            status: BIT_STAT_DRDY,
            intrq: false,
            buffer: Vec::new(),
            pos: 0,
            pending: Pending::None,
        }
    }

    fn dev(&self) -> usize {
        if self.device & BIT_DEV_DEV != 0 {
            1
        } else {
            0
        }
    }

    fn lba(&self) -> usize {
        ((self.device as usize & 0x0f) << 24)
            | ((self.lba_h as usize) << 16)
            | ((self.lba_m as usize) << 8)
            | self.lba_l as usize
    }

    fn count(&self) -> usize {
        if self.sect_cnt == 0 {
            MAX_SECS_PER_CMD
        } else {
            self.sect_cnt as usize
        }
    }

    /// Returns true when the caller has to deliver the interrupt.
    fn assert_intrq(&mut self) -> bool {
        if self.intrq {
            // line still high from the last one, no new edge
            return false;
        }
        self.intrq = true;
        true
    }

    /// Run a command, returns whether an interrupt must be raised.
    fn command(&mut self, cmd: u8) -> bool {
        let dev = self.dev();
        let (lba, count) = (self.lba(), self.count());
        self.buffer.clear();
        self.pos = 0;
        self.pending = Pending::None;

        let drive = match &self.drives[dev] {
            Some(drive) => drive,
            None => {
                self.status = BIT_STAT_ERR;
                return self.assert_intrq();
            }
        };
        if drive.stuck_busy {
            self.status = BIT_STAT_BSY;
            return cmd != CMD_WRITE_SECTOR && self.assert_intrq();
        }

        match cmd {
            CMD_READ_SECTOR => {
                if lba + count > drive.media.num_blocks() {
                    self.status = BIT_STAT_DRDY | BIT_STAT_ERR;
                    return self.assert_intrq();
                }
                self.buffer.resize(count * SECTOR_SIZE, 0);
                for i in 0..count {
                    let start = i * SECTOR_SIZE;
                    drive
                        .media
                        .read_block(lba + i, &mut self.buffer[start..start + SECTOR_SIZE]);
                }
                self.status = BIT_STAT_DRDY | BIT_STAT_DRQ;
                self.assert_intrq()
            }
            CMD_WRITE_SECTOR => {
                if lba + count > drive.media.num_blocks() {
                    self.status = BIT_STAT_DRDY | BIT_STAT_ERR;
                    return false;
                }
                self.pending = Pending::Write { dev, lba, count };
                self.status = BIT_STAT_DRDY | BIT_STAT_DRQ;
                false
            }
            CMD_IDENTIFY => {
                self.buffer = identify_sector(drive);
                self.status = BIT_STAT_DRDY | BIT_STAT_DRQ;
                self.assert_intrq()
            }
            _ => {
                log::warn!("controller: unknown command {:#x}", cmd);
                self.status = BIT_STAT_DRDY | BIT_STAT_ERR;
                self.assert_intrq()
            }
        }
    }

    fn read_data(&mut self, buf: &mut [u8]) {
        let avail = self.buffer.len().saturating_sub(self.pos);
        let n = buf.len().min(avail);
        buf[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        buf[n..].fill(0);
        self.pos += n;
        if self.pos >= self.buffer.len() {
            self.buffer.clear();
            self.pos = 0;
            self.status &= !BIT_STAT_DRQ;
        }
    }

    /// Returns whether the write completed and an interrupt must be raised.
    fn write_data(&mut self, buf: &[u8]) -> bool {
        let (dev, lba, count) = match self.pending {
            Pending::Write { dev, lba, count } => (dev, lba, count),
            Pending::None => return false,
        };
        let want = count * SECTOR_SIZE - self.buffer.len();
        self.buffer.extend_from_slice(&buf[..buf.len().min(want)]);
        if self.buffer.len() < count * SECTOR_SIZE {
            return false;
        }
        if let Some(drive) = &self.drives[dev] {
            for i in 0..count {
                let start = i * SECTOR_SIZE;
                drive
                    .media
                    .write_block(lba + i, &self.buffer[start..start + SECTOR_SIZE]);
            }
        }
        self.buffer.clear();
        self.pending = Pending::None;
        self.status = BIT_STAT_DRDY;
        self.assert_intrq()
    }
}

/// ATA strings are stored with the two bytes of each word swapped
fn put_ata_string(dst: &mut [u8], s: &str) {
    let mut bytes = s.as_bytes().to_vec();
    bytes.resize(dst.len(), b' ');
    for (i, pair) in bytes.chunks(2).enumerate() {
        dst[i * 2] = pair[1];
        dst[i * 2 + 1] = pair[0];
    }
}

fn identify_sector(drive: &Drive) -> Vec<u8> {
    let mut id = vec![0u8; SECTOR_SIZE];
    put_ata_string(&mut id[20..40], &drive.serial);
    put_ata_string(&mut id[54..94], &drive.model);
    // words 60-61: sectors addressable in LBA28
    let sectors = drive.media.num_blocks().min(0x0fff_ffff) as u32;
    id[120..124].copy_from_slice(&sectors.to_le_bytes());
    id
}

pub struct AtaController {
    channels: [Mutex<ChannelState>; 2],
    intr: Arc<Interrupts>,
}

impl AtaController {
    pub fn new(intr: Arc<Interrupts>) -> Self {
        Self {
            channels: [
                Mutex::new(ChannelState::new(PRIMARY_IRQ)),
                Mutex::new(ChannelState::new(SECONDARY_IRQ)),
            ],
            intr,
        }
    }

    /// Plug `media` in as drive `dev` (0 master, 1 slave) of `channel`.
    pub fn attach(&self, channel: usize, dev: usize, media: Arc<dyn BlockDevice>) {
        let serial = format!("KFS{:04}{}", channel * 2 + dev, media.num_blocks() % 10000);
        self.channels[channel].lock().unwrap().drives[dev] = Some(Drive {
            media,
            serial,
            model: "KFS EMULATED ATA DISK".to_string(),
            stuck_busy: false,
        });
    }

    pub fn set_stuck_busy(&self, channel: usize, dev: usize, stuck: bool) {
        if let Some(drive) = self.channels[channel].lock().unwrap().drives[dev].as_mut() {
            drive.stuck_busy = stuck;
        }
    }

    /// map a port to (channel, register offset)
    fn decode(port: u16) -> Option<(usize, u16)> {
        for (ch, base) in [PRIMARY_PORT_BASE, SECONDARY_PORT_BASE].iter().enumerate() {
            if (*base..=*base + REG_STATUS).contains(&port) {
                return Some((ch, port - base));
            }
            if port == *base + REG_ALT_STATUS {
                return Some((ch, REG_ALT_STATUS));
            }
        }
        None
    }

    fn raise(&self, irq_no: u8) {
        // the state lock is released here: the handler reads the status register
        self.intr.raise(irq_no);
    }
}

impl PortIo for AtaController {
    fn inb(&self, port: u16) -> u8 {
        let (ch, reg) = match Self::decode(port) {
            Some(x) => x,
            None => return 0xff,
        };
        let mut state = self.channels[ch].lock().unwrap();
        match reg {
            REG_STATUS => {
                // reading the status register acknowledges the interrupt
                state.intrq = false;
                state.status
            }
            REG_ALT_STATUS => state.status,
            REG_SECT_CNT => state.sect_cnt,
            REG_LBA_L => state.lba_l,
            REG_LBA_M => state.lba_m,
            REG_LBA_H => state.lba_h,
            REG_DEV => state.device,
            REG_ERROR => {
                if state.status & BIT_STAT_ERR != 0 {
                    0x04
                } else {
                    0
                }
            }
            _ => 0xff,
        }
    }

    fn outb(&self, port: u16, value: u8) {
        let (ch, reg) = match Self::decode(port) {
            Some(x) => x,
            None => return,
        };
        let mut state = self.channels[ch].lock().unwrap();
        match reg {
            REG_SECT_CNT => state.sect_cnt = value,
            REG_LBA_L => state.lba_l = value,
            REG_LBA_M => state.lba_m = value,
            REG_LBA_H => state.lba_h = value,
            REG_DEV => state.device = value,
            REG_CMD => {
                let raise = state.command(value);
                let irq_no = state.irq_no;
                drop(state);
                if raise {
                    self.raise(irq_no);
                }
            }
            _ => {}
        }
    }

    fn insw(&self, port: u16, buf: &mut [u8]) {
        if let Some((ch, REG_DATA)) = Self::decode(port) {
            self.channels[ch].lock().unwrap().read_data(buf);
        } else {
            buf.fill(0xff);
        }
    }

    fn outsw(&self, port: u16, buf: &[u8]) {
        if let Some((ch, REG_DATA)) = Self::decode(port) {
            let irq = {
                let mut state = self.channels[ch].lock().unwrap();
                if state.write_data(buf) {
                    Some(state.irq_no)
                } else {
                    None
                }
            };
            if let Some(irq) = irq {
                self.raise(irq);
            }
        }
    }
}
