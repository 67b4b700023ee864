/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{
    fs::{remove_file, File},
    io::{Read, Seek, SeekFrom, Write},
    mem::ManuallyDrop,
    path::Path,
};

use super::BlockDeviceModule;
use crate::address::SECTOR_SIZE;

/// Disk image stored in a host file.
///
/// The image is created (truncated) on construction and removed again on drop.
pub struct FileBlockDevice {
    /// underlying image file
    file: ManuallyDrop<File>,

    /// path of file, save for deleting file later
    file_path: String,

    /// cached sector count, so no `metadata` call necessary
    sector_count: usize,
}

impl FileBlockDevice {
    /// Creates a new zeroed disk image with `sectors` sectors at `filepath`
    pub fn new(filepath: String, sectors: usize) -> std::io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .truncate(true)
            .create(true)
            .open(filepath.clone())?;

        file.set_len((sectors * SECTOR_SIZE) as u64)?;

        Ok(Self {
            file: ManuallyDrop::new(file),
            file_path: filepath,
            sector_count: sectors,
        })
    }

    fn seek_to(&mut self, index: usize) -> Result<(), ()> {
        if index >= self.sector_count {
            log::error!(
                "sector {} out of range (device has {} sectors)",
                index,
                self.sector_count
            );
            return Err(());
        }

        self.file
            .seek(SeekFrom::Start((index * SECTOR_SIZE) as u64))
            .map_err(|_| ())?;
        Ok(())
    }
}

impl BlockDeviceModule for FileBlockDevice {
    fn read_sector(&mut self, index: usize, dest: &mut [u8; SECTOR_SIZE]) -> Result<(), ()> {
        self.seek_to(index)?;
        self.file.read_exact(dest).map_err(|_| ())?;

        Ok(())
    }

    fn write_sector(&mut self, index: usize, src: &[u8; SECTOR_SIZE]) -> Result<(), ()> {
        self.seek_to(index)?;
        self.file.write_all(src).map_err(|_| ())?;

        Ok(())
    }

    fn sector_count(&self) -> usize {
        self.sector_count
    }
}

impl Drop for FileBlockDevice {
    fn drop(&mut self) {
        // drop and close file before removing
        // note that after this call, file should never be accessed again...
        unsafe {
            ManuallyDrop::drop(&mut self.file);
        }

        if Path::new(self.file_path.as_str()).exists() {
            let _ = remove_file(self.file_path.as_str());
        }
    }
}
