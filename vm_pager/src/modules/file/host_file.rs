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
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use super::{FileModule, FileRef};
use crate::util::lock;

/// Regular file on the host file system.
pub struct HostFile {
    /// underlying file, the cursor is shared so every access seeks first
    file: Mutex<File>,

    /// path of file, needed to open it again
    file_path: PathBuf,

    /// cached file size, files never grow through this interface
    file_size: u64,
}

impl HostFile {
    /// Opens an existing file for reading and writing
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::options().read(true).write(true).open(path.as_ref())?;
        let file_size = file.metadata()?.len();

        Ok(Self {
            file: Mutex::new(file),
            file_path: path.as_ref().to_path_buf(),
            file_size,
        })
    }

    /// Creates (or truncates) a file and fills it with `contents`
    pub fn create<P: AsRef<Path>>(path: P, contents: &[u8]) -> std::io::Result<Self> {
        let mut file = File::options()
            .read(true)
            .write(true)
            .truncate(true)
            .create(true)
            .open(path.as_ref())?;
        file.write_all(contents)?;
        file.sync_all()?;

        Ok(Self {
            file: Mutex::new(file),
            file_path: path.as_ref().to_path_buf(),
            file_size: contents.len() as u64,
        })
    }

    /// Clamps `[offset, offset + len)` to the file size
    fn clamp(&self, offset: u64, len: usize) -> usize {
        let remaining = self.file_size.saturating_sub(offset);
        len.min(usize::try_from(remaining).unwrap_or(usize::MAX))
    }
}

impl FileModule for HostFile {
    fn read_at(&self, dest: &mut [u8], offset: u64) -> Result<usize, ()> {
        let len = self.clamp(offset, dest.len());
        if len == 0 {
            return Ok(0);
        }

        let mut file = lock(&self.file);
        file.seek(SeekFrom::Start(offset)).map_err(|_| ())?;
        file.read_exact(&mut dest[..len]).map_err(|_| ())?;

        Ok(len)
    }

    fn write_at(&self, src: &[u8], offset: u64) -> Result<usize, ()> {
        let len = self.clamp(offset, src.len());
        if len == 0 {
            return Ok(0);
        }

        let mut file = lock(&self.file);
        file.seek(SeekFrom::Start(offset)).map_err(|_| ())?;
        file.write_all(&src[..len]).map_err(|_| ())?;

        Ok(len)
    }

    fn reopen(&self) -> Result<FileRef, ()> {
        HostFile::open(&self.file_path)
            .map(|file| Arc::new(file) as FileRef)
            .map_err(|err| {
                log::error!("could not reopen {:?}: {}", self.file_path, err);
            })
    }

    fn length(&self) -> u64 {
        self.file_size
    }
}
