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
    fmt,
    sync::{Condvar, Mutex},
};

use crate::{
    mmap::MmapTable,
    modules::{file::FileRef, page_directory::HardwarePageTableModule},
    page_table::PageTable,
    util::lock,
};

/// Exit status of a process that was killed by the kernel
pub const EXIT_ABNORMAL: i32 = -1;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessId(u32);

impl ProcessId {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

/// Descriptors 0 and 1 are the console
const FIRST_FILE_DESCRIPTOR: i32 = 2;

/// Open files of one process
#[derive(Default)]
pub struct FileDescriptorTable {
    files: Vec<(i32, FileRef)>,
    next: Option<i32>,
}

impl FileDescriptorTable {
    /// Stores `file` and returns its new descriptor
    pub fn open(&mut self, file: FileRef) -> i32 {
        let fd = self.next.unwrap_or(FIRST_FILE_DESCRIPTOR);
        self.next = Some(fd + 1);
        self.files.push((fd, file));
        fd
    }

    pub fn get(&self, fd: i32) -> Option<&FileRef> {
        self.files
            .iter()
            .find(|(other, _)| *other == fd)
            .map(|(_, file)| file)
    }

    /// Removes `fd`, returns the file if it was open
    pub fn close(&mut self, fd: i32) -> Option<FileRef> {
        let index = self.files.iter().position(|(other, _)| *other == fd)?;
        Some(self.files.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }
}

/// Everything of a process that is protected by its address space lock
#[derive(Default)]
pub struct AddressSpace {
    pub pages: PageTable,
    pub mappings: MmapTable,
    pub files: FileDescriptorTable,

    /// Set once the address space was torn down
    pub destroyed: bool,
}

/// One user process as seen by the pager.
///
/// Lock order inside a process: `space` before `directory`.
/// `directory` and `exit_status` are leaf locks.
pub struct Process<H: HardwarePageTableModule> {
    pid: ProcessId,
    pub(crate) space: Mutex<AddressSpace>,
    pub(crate) directory: Mutex<H>,
    exit_status: Mutex<Option<i32>>,
    exited: Condvar,
}

impl<H: HardwarePageTableModule> Process<H> {
    pub(crate) fn new(pid: ProcessId) -> Self {
        Self {
            pid,
            space: Mutex::new(AddressSpace::default()),
            directory: Mutex::new(H::new()),
            exit_status: Mutex::new(None),
            exited: Condvar::new(),
        }
    }

    #[inline]
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Exit status, `None` while the process is running
    pub fn exit_status(&self) -> Option<i32> {
        *lock(&self.exit_status)
    }

    /// Records the exit status. The first recorded status wins.
    ///
    /// Returns `false` if the process had already exited.
    pub(crate) fn set_exit_status(&self, status: i32) -> bool {
        let mut exit_status = lock(&self.exit_status);
        if exit_status.is_some() {
            return false;
        }

        *exit_status = Some(status);
        self.exited.notify_all();
        true
    }

    /// Blocks until the process has exited and returns its status
    pub fn wait(&self) -> i32 {
        let mut exit_status = lock(&self.exit_status);
        loop {
            if let Some(status) = *exit_status {
                return status;
            }

            exit_status = self
                .exited
                .wait(exit_status)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Runs `f` on the hardware page directory of this process
    pub fn with_directory<R, F: FnOnce(&mut H) -> R>(&self, f: F) -> R {
        f(&mut lock(&self.directory))
    }
}
