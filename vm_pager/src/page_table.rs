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

//! Per process table of page descriptors.
//!
//! The page table is the only owner of its descriptors. Everything else
//! (frame table, mapped file records) refers to a descriptor by its
//! [`VirtualPage`] key and looks it up here.

use std::{
    collections::{hash_map, HashMap},
    fmt,
    sync::Mutex,
};

use log::trace;

use crate::{
    address::{PhysFrame, VirtualPage, PAGE_SIZE},
    frame_table::FrameTable,
    mmap::MappingId,
    modules::{
        block_device::BlockDeviceModule, file::FileRef, page_directory::HardwarePageTableModule,
        physical_memory::PhysicalMemoryModule,
    },
    swap::{SwapSlot, SwapStore},
    util::lock,
};

/// Where the contents of a page that is not resident come from
#[derive(Clone)]
pub struct FileSource {
    pub file: FileRef,

    /// Byte offset of the page inside `file`
    pub offset: u64,

    /// Bytes read from `file`, the rest of the page is zeroed
    pub read_len: usize,
    pub zero_len: usize,
}

impl FileSource {
    pub fn new(file: FileRef, offset: u64, read_len: usize) -> Self {
        assert!(read_len <= PAGE_SIZE, "file source exceeds one page");

        Self {
            file,
            offset,
            read_len,
            zero_len: PAGE_SIZE - read_len,
        }
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSource")
            .field("offset", &self.offset)
            .field("read_len", &self.read_len)
            .field("zero_len", &self.zero_len)
            .finish()
    }
}

/// Current location of a page's contents
#[derive(Debug, Clone)]
pub enum Backing {
    /// Loaded into a physical frame
    Resident(PhysFrame),

    /// Not loaded yet, comes from an executable segment
    FileBacked(FileSource),

    /// Not loaded yet (or evicted), belongs to a mapped file
    MappedFile(FileSource),

    /// Lives in a swap slot
    Swapped(SwapSlot),
}

/// Mapped file a page belongs to, used for writing the page back
#[derive(Debug, Clone)]
pub struct MappedPage {
    pub mapping: MappingId,
    pub source: FileSource,
}

#[derive(Debug, Clone)]
pub struct PageDescriptor {
    pub virtual_page: VirtualPage,
    pub writable: bool,
    pub backing: Backing,

    /// Only set for pages created by `mmap`
    pub mapped: Option<MappedPage>,
}

impl PageDescriptor {
    pub fn new(virtual_page: VirtualPage, writable: bool, backing: Backing) -> Self {
        Self {
            virtual_page,
            writable,
            backing,
            mapped: None,
        }
    }

    /// Descriptor of a page belonging to mapping `mapping`
    pub fn mapped(virtual_page: VirtualPage, mapping: MappingId, source: FileSource) -> Self {
        Self {
            virtual_page,
            writable: true,
            backing: Backing::MappedFile(source.clone()),
            mapped: Some(MappedPage { mapping, source }),
        }
    }

    /// Frame of this page if it is resident
    #[inline]
    pub fn frame(&self) -> Option<PhysFrame> {
        match self.backing {
            Backing::Resident(frame) => Some(frame),
            _ => None,
        }
    }

    #[inline]
    pub fn is_resident(&self) -> bool {
        self.frame().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PageTableError {
    #[error("page {0:#x} already has a descriptor")]
    AlreadyMapped(usize),
}

#[derive(Debug, Default)]
pub struct PageTable {
    descriptors: HashMap<VirtualPage, PageDescriptor>,
}

impl PageTable {
    pub fn create() -> Self {
        Self::default()
    }

    /// Adds `descriptor`, fails if its page already has one
    pub fn insert(&mut self, descriptor: PageDescriptor) -> Result<(), PageTableError> {
        match self.descriptors.entry(descriptor.virtual_page) {
            hash_map::Entry::Occupied(_) => Err(PageTableError::AlreadyMapped(
                descriptor.virtual_page.address(),
            )),
            hash_map::Entry::Vacant(entry) => {
                entry.insert(descriptor);
                Ok(())
            }
        }
    }

    /// Descriptor of the page containing `address`
    pub fn find(&self, address: usize) -> Option<&PageDescriptor> {
        self.descriptors.get(&VirtualPage::containing(address))
    }

    pub fn find_mut(&mut self, address: usize) -> Option<&mut PageDescriptor> {
        self.descriptors.get_mut(&VirtualPage::containing(address))
    }

    #[inline]
    pub fn contains(&self, page: VirtualPage) -> bool {
        self.descriptors.contains_key(&page)
    }

    /// Removes the descriptor of the page containing `address` together with
    /// every resource it holds: the hardware mapping, the frame or the swap
    /// slot.
    ///
    /// Returns `false` if there is no such descriptor, so calling this twice
    /// for the same address is harmless.
    pub fn remove_and_release<P, D, H>(
        &mut self,
        address: usize,
        directory: &Mutex<H>,
        frames: &FrameTable<P>,
        swap: &SwapStore<D>,
    ) -> bool
    where
        P: PhysicalMemoryModule,
        D: BlockDeviceModule,
        H: HardwarePageTableModule,
    {
        let page = VirtualPage::containing(address);
        let descriptor = match self.descriptors.remove(&page) {
            Some(descriptor) => descriptor,
            None => return false,
        };

        lock(directory).clear(page);

        match descriptor.backing {
            Backing::Resident(frame) => frames.release(frame),
            Backing::Swapped(slot) => swap.free(slot),
            Backing::FileBacked(_) | Backing::MappedFile(_) => {}
        }

        trace!("Released descriptor of {:?}", page);
        true
    }

    /// Releases every descriptor, see [`PageTable::remove_and_release`]
    pub fn destroy<P, D, H>(&mut self, directory: &Mutex<H>, frames: &FrameTable<P>, swap: &SwapStore<D>)
    where
        P: PhysicalMemoryModule,
        D: BlockDeviceModule,
        H: HardwarePageTableModule,
    {
        let pages: Vec<VirtualPage> = self.descriptors.keys().copied().collect();
        for page in pages {
            self.remove_and_release(page.address(), directory, frames, swap);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageDescriptor> {
        self.descriptors.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
