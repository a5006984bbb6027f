//! Block Device Abstraction
//!
//! Provides a common interface for block-level storage devices. The kernel
//! backs this with ATA PIO; host builds (tests and the image tool) use the
//! RAM device.

use crate::error::KernelError;

/// Bytes per device block.
pub const BLOCK_SIZE: usize = 512;

/// Block device trait
pub trait BlockDevice {
    /// Device name for diagnostics
    fn name(&self) -> &str;

    /// Total number of blocks
    fn block_count(&self) -> u32;

    /// Read whole blocks starting at `start_block`; the buffer length
    /// must be a multiple of [`BLOCK_SIZE`].
    fn read_blocks(&mut self, start_block: u32, buffer: &mut [u8]) -> Result<(), KernelError>;

    /// Write whole blocks starting at `start_block`.
    fn write_blocks(&mut self, start_block: u32, buffer: &[u8]) -> Result<(), KernelError>;
}

#[cfg(not(target_os = "none"))]
fn check_range(
    start_block: u32,
    len: usize,
    block_count: u32,
) -> Result<u32, KernelError> {
    if len % BLOCK_SIZE != 0 {
        return Err(KernelError::UnalignedBuffer { len });
    }
    let count = (len / BLOCK_SIZE) as u32;
    if start_block + count > block_count {
        return Err(KernelError::BlockOutOfRange { lba: start_block, count });
    }
    Ok(count)
}

/// RAM-backed block device (for testing and the host-side image tool)
#[cfg(not(target_os = "none"))]
pub struct RamBlockDevice {
    data: std::vec::Vec<u8>,
}

#[cfg(not(target_os = "none"))]
impl RamBlockDevice {
    /// Create a zero-filled device of `block_count` blocks.
    pub fn new(block_count: u32) -> Self {
        Self {
            data: std::vec![0u8; block_count as usize * BLOCK_SIZE],
        }
    }

    /// Wrap an existing image, padding it up to a block boundary.
    pub fn from_vec(mut data: std::vec::Vec<u8>) -> Self {
        let rem = data.len() % BLOCK_SIZE;
        if rem != 0 {
            data.resize(data.len() + BLOCK_SIZE - rem, 0);
        }
        Self { data }
    }

    /// Take the raw image back.
    pub fn into_vec(self) -> std::vec::Vec<u8> {
        self.data
    }
}

#[cfg(not(target_os = "none"))]
impl BlockDevice for RamBlockDevice {
    fn name(&self) -> &str {
        "ram"
    }

    fn block_count(&self) -> u32 {
        (self.data.len() / BLOCK_SIZE) as u32
    }

    fn read_blocks(&mut self, start_block: u32, buffer: &mut [u8]) -> Result<(), KernelError> {
        check_range(start_block, buffer.len(), self.block_count())?;
        let start = start_block as usize * BLOCK_SIZE;
        buffer.copy_from_slice(&self.data[start..start + buffer.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, start_block: u32, buffer: &[u8]) -> Result<(), KernelError> {
        check_range(start_block, buffer.len(), self.block_count())?;
        let start = start_block as usize * BLOCK_SIZE;
        self.data[start..start + buffer.len()].copy_from_slice(buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_device_roundtrip() {
        let mut dev = RamBlockDevice::new(100);
        assert_eq!(dev.block_count(), 100);

        let write_data = [0x42u8; BLOCK_SIZE];
        dev.write_blocks(7, &write_data).unwrap();

        let mut read_data = [0u8; BLOCK_SIZE];
        dev.read_blocks(7, &mut read_data).unwrap();
        assert_eq!(read_data, write_data);
    }

    #[test]
    fn rejects_out_of_range() {
        let mut dev = RamBlockDevice::new(4);
        let buf = [0u8; BLOCK_SIZE * 2];
        assert!(dev.write_blocks(3, &buf).is_err());
        assert!(dev.write_blocks(2, &buf).is_ok());
    }

    #[test]
    fn rejects_unaligned_buffers() {
        let mut dev = RamBlockDevice::new(4);
        let mut buf = [0u8; 100];
        assert_eq!(
            dev.read_blocks(0, &mut buf),
            Err(KernelError::UnalignedBuffer { len: 100 })
        );
    }

    #[test]
    fn from_vec_pads_to_block_boundary() {
        let dev = RamBlockDevice::from_vec(std::vec![0xAA; BLOCK_SIZE + 10]);
        assert_eq!(dev.block_count(), 2);
    }
}
