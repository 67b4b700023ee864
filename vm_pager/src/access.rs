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

//! User memory accesses as the MMU performs them.
//!
//! Each page touched is translated through the hardware page directory of the
//! process. A miss raises a page fault and the access is restarted once the
//! fault is resolved, a hit sets the accessed (and dirty) bit.

use std::ops::Range;

use crate::{
    address::{VirtualPage, PAGE_SIZE},
    demand_pager::DemandPager,
    fault::FaultFlags,
    modules::{
        block_device::BlockDeviceModule, page_directory::HardwarePageTableModule,
        physical_memory::PhysicalMemoryModule,
    },
    process::ProcessId,
    util::lock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("process was killed by a page fault at {0:#x}")]
    Killed(usize),
    #[error("process does not exist or has exited")]
    UnknownProcess,
}

impl<P, D, H> DemandPager<P, D, H>
where
    P: PhysicalMemoryModule,
    D: BlockDeviceModule,
    H: HardwarePageTableModule,
{
    /// Reads `dest.len()` bytes at `address` from the memory of `pid`
    pub fn read_user(&self, pid: ProcessId, address: usize, dest: &mut [u8], stack_pointer: usize) -> Result<(), AccessError> {
        self.walk_user(pid, address, dest.len(), false, stack_pointer, |bytes, offset, range| {
            dest[range.clone()].copy_from_slice(&bytes[offset..offset + range.len()])
        })
    }

    /// Writes `src` to `address` in the memory of `pid`
    pub fn write_user(&self, pid: ProcessId, address: usize, src: &[u8], stack_pointer: usize) -> Result<(), AccessError> {
        self.walk_user(pid, address, src.len(), true, stack_pointer, |bytes, offset, range| {
            bytes[offset..offset + range.len()].copy_from_slice(&src[range])
        })
    }

    /// Calls `copy` for every page in `address..address + len` with the
    /// frame contents, the offset inside the frame and the matching range of
    /// the caller's buffer.
    fn walk_user<F>(
        &self,
        pid: ProcessId,
        address: usize,
        len: usize,
        write: bool,
        stack_pointer: usize,
        mut copy: F,
    ) -> Result<(), AccessError>
    where
        F: FnMut(&mut [u8; PAGE_SIZE], usize, Range<usize>),
    {
        let process = self.process(pid).ok_or(AccessError::UnknownProcess)?;
        let mut done = 0;

        while done < len {
            if process.exit_status().is_some() {
                return Err(AccessError::UnknownProcess);
            }

            let current = address.checked_add(done).ok_or(AccessError::Killed(address))?;
            let page = VirtualPage::containing(current);
            let offset = current - page.address();
            let chunk = (PAGE_SIZE - offset).min(len - done);

            let hit = {
                let mut directory = lock(&process.directory);
                match directory.translate(page) {
                    Some((frame, writable)) if writable || !write => {
                        directory.set_accessed(page, true);
                        if write {
                            directory.set_dirty(page, true);
                        }

                        // copy while the mapping can not be taken away
                        self.memory
                            .with_frame(frame, |bytes| copy(bytes, offset, done..done + chunk));
                        Ok(())
                    }
                    Some(_) => Err(FaultFlags {
                        not_present: false,
                        write,
                        user: true,
                    }),
                    None => Err(FaultFlags::not_present(write)),
                }
            };

            match hit {
                Ok(()) => done += chunk,
                Err(flags) => {
                    if !self.page_fault(pid, current, flags, stack_pointer) {
                        return Err(AccessError::Killed(current));
                    }
                }
            }
        }

        Ok(())
    }
}
