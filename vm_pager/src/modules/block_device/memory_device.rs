use super::BlockDeviceModule;
use crate::address::SECTOR_SIZE;

/// Disk kept in RAM.
///
/// Can be told to fail every write, which is how swap device errors are tested.
pub struct MemoryBlockDevice {
    data: Vec<u8>,
    fail_writes: bool,
}

impl MemoryBlockDevice {
    pub fn new(sectors: usize) -> Self {
        Self {
            data: vec![0; sectors * SECTOR_SIZE],
            fail_writes: false,
        }
    }

    /// Makes all following writes fail (or succeed again)
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    fn sector_range(&self, index: usize) -> Result<core::ops::Range<usize>, ()> {
        if index >= self.sector_count() {
            return Err(());
        }

        let start = index * SECTOR_SIZE;
        Ok(start..start + SECTOR_SIZE)
    }
}

impl BlockDeviceModule for MemoryBlockDevice {
    fn read_sector(&mut self, index: usize, dest: &mut [u8; SECTOR_SIZE]) -> Result<(), ()> {
        let range = self.sector_range(index)?;
        dest.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_sector(&mut self, index: usize, src: &[u8; SECTOR_SIZE]) -> Result<(), ()> {
        if self.fail_writes {
            return Err(());
        }

        let range = self.sector_range(index)?;
        self.data[range].copy_from_slice(src);
        Ok(())
    }

    fn sector_count(&self) -> usize {
        self.data.len() / SECTOR_SIZE
    }
}
