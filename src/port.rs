/// x86 style port I/O, the only way the driver reaches the controller.
pub trait PortIo: Send + Sync {
    fn inb(&self, port: u16) -> u8;
    fn outb(&self, port: u16, value: u8);
    /// read `buf.len() / 2` 16-bit words from `port`
    fn insw(&self, port: u16, buf: &mut [u8]);
    /// write `buf.len() / 2` 16-bit words to `port`
    fn outsw(&self, port: u16, buf: &[u8]);
}
