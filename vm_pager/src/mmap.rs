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

//! Memory mapped files.
//!
//! A mapping turns a whole file into a contiguous run of lazily loaded,
//! writable pages. Dirty pages are written back to the file when they are
//! evicted, when the mapping is removed and when the process exits. Mapped
//! pages never go to swap.

use std::fmt;

use log::{debug, error, warn};

use crate::{
    address::{VirtualPage, PAGE_SIZE},
    demand_pager::DemandPager,
    modules::{
        block_device::BlockDeviceModule,
        file::FileRef,
        page_directory::HardwarePageTableModule,
        physical_memory::PhysicalMemoryModule,
    },
    page_table::{FileSource, PageDescriptor},
    process::{AddressSpace, Process, ProcessId},
    util::{div_ceil, lock},
};

/// Identifies a mapping inside its process, the first mapping gets id 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MappingId(u32);

impl MappingId {
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct MappedFileRecord {
    pub id: MappingId,

    /// Private handle, stays valid after the process closed its descriptor
    pub file: FileRef,

    pub base: VirtualPage,
    pub page_count: usize,
}

impl MappedFileRecord {
    /// Pages covered by this mapping, in ascending order
    pub fn pages(&self) -> impl Iterator<Item = VirtualPage> + '_ {
        (0..self.page_count).filter_map(|i| self.base.offset(i))
    }
}

#[derive(Default)]
pub struct MmapTable {
    records: Vec<MappedFileRecord>,
    last_id: u32,
}

impl MmapTable {
    fn next_id(&mut self) -> MappingId {
        self.last_id += 1;
        MappingId(self.last_id)
    }

    pub fn get(&self, id: MappingId) -> Option<&MappedFileRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    fn remove(&mut self, id: MappingId) -> Option<MappedFileRecord> {
        let index = self.records.iter().position(|record| record.id == id)?;
        Some(self.records.remove(index))
    }

    pub fn ids(&self) -> Vec<MappingId> {
        self.records.iter().map(|record| record.id).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MmapError {
    #[error("can not map a file at address 0")]
    NullAddress,
    #[error("address {0:#x} is not page aligned")]
    Unaligned(usize),
    #[error("can not map an empty file")]
    EmptyFile,
    #[error("page {0:#x} is already in use")]
    Overlap(usize),
    #[error("mapping at {0:#x} does not fit into user space")]
    OutOfUserSpace(usize),
    #[error("could not reopen the file")]
    ReopenFailed,
    #[error("no mapping with id {0}")]
    UnknownMapping(MappingId),
    #[error("no such process")]
    UnknownProcess,
    #[error("file descriptor {0} is not open")]
    BadDescriptor(i32),
}

impl<P, D, H> DemandPager<P, D, H>
where
    P: PhysicalMemoryModule,
    D: BlockDeviceModule,
    H: HardwarePageTableModule,
{
    /// Maps `file` at `address` into the address space of `pid`.
    ///
    /// No page is loaded here, every page is read on its first access.
    pub fn mmap(&self, pid: ProcessId, file: &FileRef, address: usize) -> Result<MappingId, MmapError> {
        let process = self.process(pid).ok_or(MmapError::UnknownProcess)?;
        let mut space = lock(&process.space);
        if space.destroyed {
            return Err(MmapError::UnknownProcess);
        }

        self.map_file(&mut space, file, address)
    }

    /// Removes mapping `id`, writing dirty pages back to the file
    pub fn munmap(&self, pid: ProcessId, id: MappingId) -> Result<(), MmapError> {
        let process = self.process(pid).ok_or(MmapError::UnknownProcess)?;
        let mut space = lock(&process.space);

        self.unmap_file(&process, &mut space, id)
    }

    /// Makes `file` accessible to `pid` and returns its file descriptor
    pub fn open_file(&self, pid: ProcessId, file: FileRef) -> Result<i32, MmapError> {
        let process = self.process(pid).ok_or(MmapError::UnknownProcess)?;
        let mut space = lock(&process.space);
        if space.destroyed {
            return Err(MmapError::UnknownProcess);
        }

        Ok(space.files.open(file))
    }

    /// Closes `fd` of `pid`. Mappings created from it stay valid.
    pub fn close_file(&self, pid: ProcessId, fd: i32) -> Result<(), MmapError> {
        let process = self.process(pid).ok_or(MmapError::UnknownProcess)?;
        let mut space = lock(&process.space);

        space
            .files
            .close(fd)
            .map(|_| ())
            .ok_or(MmapError::BadDescriptor(fd))
    }

    /// `mmap` system call: maps the file open as `fd`.
    ///
    /// Returns the mapping id or -1 on failure.
    pub fn sys_mmap(&self, pid: ProcessId, fd: i32, address: usize) -> i32 {
        let result = self.process(pid).ok_or(MmapError::UnknownProcess).and_then(|process| {
            let mut space = lock(&process.space);
            if space.destroyed {
                return Err(MmapError::UnknownProcess);
            }

            let file = space
                .files
                .get(fd)
                .cloned()
                .ok_or(MmapError::BadDescriptor(fd))?;
            self.map_file(&mut space, &file, address)
        });

        match result {
            Ok(id) => i32::try_from(id.get()).unwrap_or(-1),
            Err(err) => {
                debug!("mmap of fd {} at {:#x} failed: {}", fd, address, err);
                -1
            }
        }
    }

    /// `munmap` system call. Unknown ids are ignored.
    pub fn sys_munmap(&self, pid: ProcessId, mapping: i32) {
        let id = match u32::try_from(mapping) {
            Ok(id) => MappingId(id),
            Err(_) => {
                debug!("munmap of invalid mapping {}", mapping);
                return;
            }
        };

        if let Err(err) = self.munmap(pid, id) {
            debug!("munmap of mapping {} failed: {}", mapping, err);
        }
    }

    fn map_file(&self, space: &mut AddressSpace, file: &FileRef, address: usize) -> Result<MappingId, MmapError> {
        if address == 0 {
            return Err(MmapError::NullAddress);
        }
        let base = VirtualPage::from_aligned(address).ok_or(MmapError::Unaligned(address))?;

        let length = file.length();
        if length == 0 {
            return Err(MmapError::EmptyFile);
        }
        let length = usize::try_from(length).map_err(|_| MmapError::OutOfUserSpace(address))?;
        let page_count = div_ceil(length, PAGE_SIZE);

        let end = page_count
            .checked_mul(PAGE_SIZE)
            .and_then(|bytes| address.checked_add(bytes))
            .ok_or(MmapError::OutOfUserSpace(address))?;
        if !self.config.is_user_address(address) || end > self.config.user_top {
            return Err(MmapError::OutOfUserSpace(address));
        }

        for i in 0..page_count {
            let page = base.offset(i).ok_or(MmapError::OutOfUserSpace(address))?;
            if space.pages.contains(page) {
                return Err(MmapError::Overlap(page.address()));
            }
        }

        let file = file.reopen().map_err(|_| MmapError::ReopenFailed)?;
        let id = space.mappings.next_id();

        for i in 0..page_count {
            let page = base.offset(i).ok_or(MmapError::OutOfUserSpace(address))?;
            let offset = i * PAGE_SIZE;
            let read_len = (length - offset).min(PAGE_SIZE);

            space
                .pages
                .insert(PageDescriptor::mapped(
                    page,
                    id,
                    FileSource::new(file.clone(), offset as u64, read_len),
                ))
                .map_err(|_| MmapError::Overlap(page.address()))?;
        }

        space.mappings.records.push(MappedFileRecord {
            id,
            file,
            base,
            page_count,
        });

        debug!(
            "Mapped {} bytes at {:?} as mapping {}",
            length, base, id
        );
        Ok(id)
    }

    /// Writes every resident and dirty page of mapping `id` back, then drops
    /// all of its pages.
    ///
    /// Pages that were never loaded or were evicted already cause no I/O.
    pub(crate) fn unmap_file(
        &self,
        process: &Process<H>,
        space: &mut AddressSpace,
        id: MappingId,
    ) -> Result<(), MmapError> {
        let record = space
            .mappings
            .remove(id)
            .ok_or(MmapError::UnknownMapping(id))?;

        for page in record.pages() {
            if let Some(descriptor) = space.pages.find(page.address()) {
                if let (Some(frame), Some(mapped)) = (descriptor.frame(), &descriptor.mapped) {
                    let dirty = lock(&process.directory).is_dirty(page);

                    if dirty {
                        let mut buffer = vec![0u8; mapped.source.read_len];
                        self.memory.read_frame(frame, 0, &mut buffer);

                        if self.write_back(&buffer, &mapped.source).is_err() {
                            error!(
                                "Lost changes of {:?} in mapping {}, writing back failed",
                                page, id
                            );
                        }
                    }
                }
            } else {
                warn!("Page {:?} of mapping {} has no descriptor", page, id);
            }

            space
                .pages
                .remove_and_release(page.address(), &process.directory, &self.frames, &self.swap);
        }

        debug!("Unmapped mapping {} of {:?}", id, process.pid());
        Ok(())
    }

    /// Writes the first `read_len` bytes of `bytes` to the file of `source`
    pub(crate) fn write_back(&self, bytes: &[u8], source: &FileSource) -> Result<(), ()> {
        let written = source.file.write_at(&bytes[..source.read_len], source.offset)?;
        self.stats.file_write_backs.increment();

        if written == source.read_len {
            Ok(())
        } else {
            Err(())
        }
    }
}
