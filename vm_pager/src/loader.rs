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

use log::debug;

use crate::{
    address::{is_page_aligned, VirtualPage, PAGE_SIZE},
    demand_pager::DemandPager,
    modules::{
        block_device::BlockDeviceModule, file::FileRef, page_directory::HardwarePageTableModule,
        physical_memory::PhysicalMemoryModule,
    },
    page_table::{Backing, FileSource, PageDescriptor, PageTableError},
    process::ProcessId,
    util::lock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("segment at {0:#x} is not page aligned")]
    Unaligned(usize),
    #[error("segment at {0:#x} does not fit into user space")]
    OutOfUserSpace(usize),
    #[error(transparent)]
    Overlap(#[from] PageTableError),
    #[error("process does not exist or has exited")]
    UnknownProcess,
}

impl<P, D, H> DemandPager<P, D, H>
where
    P: PhysicalMemoryModule,
    D: BlockDeviceModule,
    H: HardwarePageTableModule,
{
    /// Declares an executable segment: `read_bytes` bytes of `file` starting
    /// at `offset` are mapped at `upage`, followed by `zero_bytes` zeroes.
    ///
    /// Nothing is read here, each page is loaded on its first access.
    pub fn load_segment(
        &self,
        pid: ProcessId,
        file: &FileRef,
        offset: u64,
        upage: usize,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> Result<(), LoadError> {
        let total = read_bytes
            .checked_add(zero_bytes)
            .ok_or(LoadError::OutOfUserSpace(upage))?;
        if !is_page_aligned(upage) || !is_page_aligned(total) || offset % PAGE_SIZE as u64 != 0 {
            return Err(LoadError::Unaligned(upage));
        }

        let end = upage
            .checked_add(total)
            .ok_or(LoadError::OutOfUserSpace(upage))?;
        if !self.config.is_user_address(upage) || end > self.config.user_top {
            return Err(LoadError::OutOfUserSpace(upage));
        }

        let process = self.process(pid).ok_or(LoadError::UnknownProcess)?;
        let mut space = lock(&process.space);
        if space.destroyed {
            return Err(LoadError::UnknownProcess);
        }

        let mut remaining = read_bytes;
        for i in 0..total / PAGE_SIZE {
            let page = VirtualPage::containing(upage + i * PAGE_SIZE);
            let page_read = remaining.min(PAGE_SIZE);
            remaining -= page_read;

            let source = FileSource::new(file.clone(), offset + (i * PAGE_SIZE) as u64, page_read);
            space
                .pages
                .insert(PageDescriptor::new(page, writable, Backing::FileBacked(source)))?;
        }

        debug!(
            "Declared segment of {:?} at {:#x}: {} bytes from file, {} zeroed",
            pid, upage, read_bytes, zero_bytes
        );
        Ok(())
    }
}
