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

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use super::{FileModule, FileRef};
use crate::util::lock;

/// Contents of a file, shared by all handles opened on it
struct MemoryInode {
    data: Mutex<Vec<u8>>,

    /// Number of `write_at` calls over all handles
    write_calls: AtomicUsize,

    /// Number of bytes written over all handles
    written_bytes: AtomicUsize,
}

/// File held in RAM.
///
/// Handles created with [`FileModule::reopen`] share the same contents, like
/// two open file descriptions of the same inode.
#[derive(Clone)]
pub struct MemoryFile {
    inode: Arc<MemoryInode>,
}

impl MemoryFile {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inode: Arc::new(MemoryInode {
                data: Mutex::new(data),
                write_calls: AtomicUsize::new(0),
                written_bytes: AtomicUsize::new(0),
            }),
        }
    }

    /// Wraps the file into a shareable handle
    pub fn into_ref(self) -> FileRef {
        Arc::new(self)
    }

    /// Copy of the current file contents
    pub fn contents(&self) -> Vec<u8> {
        lock(&self.inode.data).clone()
    }

    /// How many times `write_at` was called on this file
    pub fn write_calls(&self) -> usize {
        self.inode.write_calls.load(Ordering::SeqCst)
    }

    /// How many bytes were written to this file
    pub fn written_bytes(&self) -> usize {
        self.inode.written_bytes.load(Ordering::SeqCst)
    }
}

impl FileModule for MemoryFile {
    fn read_at(&self, dest: &mut [u8], offset: u64) -> Result<usize, ()> {
        let data = lock(&self.inode.data);
        let start = usize::try_from(offset).map_err(|_| ())?.min(data.len());
        let end = (start + dest.len()).min(data.len());

        dest[..end - start].copy_from_slice(&data[start..end]);
        Ok(end - start)
    }

    fn write_at(&self, src: &[u8], offset: u64) -> Result<usize, ()> {
        let mut data = lock(&self.inode.data);
        let start = usize::try_from(offset).map_err(|_| ())?.min(data.len());
        let end = (start + src.len()).min(data.len());

        data[start..end].copy_from_slice(&src[..end - start]);

        self.inode.write_calls.fetch_add(1, Ordering::SeqCst);
        self.inode
            .written_bytes
            .fetch_add(end - start, Ordering::SeqCst);
        Ok(end - start)
    }

    fn reopen(&self) -> Result<FileRef, ()> {
        Ok(Arc::new(self.clone()))
    }

    fn length(&self) -> u64 {
        lock(&self.inode.data).len() as u64
    }
}
