mod file_device;
mod memory_device;

pub use file_device::FileBlockDevice;
pub use memory_device::MemoryBlockDevice;

use crate::address::SECTOR_SIZE;

/// Raw sector addressed disk, e.g. the swap partition.
pub trait BlockDeviceModule: Send {
    /// Reads sector `index` into `dest`.
    ///
    /// If this call fails, it could be that already some data was written to `dest`.
    fn read_sector(&mut self, index: usize, dest: &mut [u8; SECTOR_SIZE]) -> Result<(), ()>;

    /// Writes `src` to sector `index`
    fn write_sector(&mut self, index: usize, src: &[u8; SECTOR_SIZE]) -> Result<(), ()>;

    /// Returns the number of sectors of this device
    ///
    /// **Accessing sectors at or above this index is illegal!**
    fn sector_count(&self) -> usize;
}
