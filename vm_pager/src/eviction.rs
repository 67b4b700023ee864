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

//! Frame eviction.
//!
//! The frame table stays locked from the victim search until the victim's
//! frame is handed to the faulting process, so no two threads can pick the
//! same victim and the freed frame can not be taken by somebody else.
//!
//! Frames of other processes are only considered if their address space can
//! be locked without blocking. If that fails for every candidate, the search
//! releases the frame table and starts over once.

use std::{
    sync::{PoisonError, TryLockError},
    thread,
};

use log::debug;

use crate::{
    address::{PhysFrame, VirtualPage, PAGE_SIZE},
    demand_pager::DemandPager,
    fault::FaultError,
    frame_table::Probe,
    modules::{
        block_device::BlockDeviceModule, page_directory::HardwarePageTableModule,
        physical_memory::PhysicalMemoryModule,
    },
    page_table::Backing,
    process::{AddressSpace, Process},
};

impl<P, D, H> DemandPager<P, D, H>
where
    P: PhysicalMemoryModule,
    D: BlockDeviceModule,
    H: HardwarePageTableModule,
{
    /// Evicts one frame and returns it reserved for the caller.
    ///
    /// `process` is the faulting process and `space` its locked address space.
    /// Frames of other processes are only taken if their address space lock
    /// is free, a busy owner is skipped. Fails if no frame is evictable at all,
    /// if every candidate is still busy after one more search or if the victim
    /// could not be written out.
    pub(crate) fn evict(&self, process: &Process<H>, space: &mut AddressSpace) -> Result<PhysFrame, FaultError> {
        let current = process.pid();
        let mut table = self.frames.lock();
        let mut skipped: Vec<PhysFrame> = Vec::new();
        let mut retried = false;

        loop {
            let victim = table.select_victim(current, |frame, mapping| {
                if skipped.contains(&frame) {
                    return Probe::Busy;
                }

                let page = mapping.virtual_page;
                let probe_directory = |directory: &mut H| {
                    if directory.is_accessed(page) {
                        directory.set_accessed(page, false);
                        Probe::Referenced
                    } else {
                        Probe::Idle
                    }
                };

                if mapping.owner == current {
                    process.with_directory(probe_directory)
                } else {
                    match self.process(mapping.owner) {
                        Some(owner) => owner.with_directory(probe_directory),
                        None => Probe::Busy,
                    }
                }
            });

            let (frame, mapping) = match victim {
                Some(victim) => victim,
                None if skipped.is_empty() => return Err(FaultError::OutOfMemory),
                None if retried => {
                    debug!("{:?} found only busy victims twice", current);
                    return Err(FaultError::OutOfMemory);
                }
                None => {
                    // every candidate belongs to a process that is busy in a
                    // fault of its own, give them one chance to finish
                    drop(table);
                    thread::yield_now();
                    table = self.frames.lock();
                    skipped.clear();
                    retried = true;

                    match table.allocate() {
                        Ok(frame) => return Ok(frame),
                        Err(_) => continue,
                    }
                }
            };

            if mapping.owner == current {
                self.detach(process, space, frame, mapping.virtual_page)?;
            } else {
                let owner = match self.process(mapping.owner) {
                    Some(owner) => owner,
                    None => {
                        skipped.push(frame);
                        continue;
                    }
                };

                let mut other = match owner.space.try_lock() {
                    Ok(guard) => guard,
                    Err(TryLockError::Poisoned(err)) => PoisonError::into_inner(err),
                    Err(TryLockError::WouldBlock) => {
                        debug!("Skipping frame {}, {:?} is busy", frame.number(), mapping.owner);
                        skipped.push(frame);
                        continue;
                    }
                };
                self.detach(&owner, &mut other, frame, mapping.virtual_page)?;
            }

            table.release(frame);
            return table.allocate().map_err(|_| FaultError::OutOfMemory);
        }
    }

    /// Moves the contents of `frame` to their backing store and points the
    /// descriptor of `page` there.
    ///
    /// Mapped file pages go back to their file if they are dirty, all other
    /// pages go to swap. On failure the hardware mapping is restored and the
    /// page stays resident.
    fn detach(
        &self,
        owner: &Process<H>,
        space: &mut AddressSpace,
        frame: PhysFrame,
        page: VirtualPage,
    ) -> Result<(), FaultError> {
        let descriptor = match space.pages.find_mut(page.address()) {
            Some(descriptor) if descriptor.frame() == Some(frame) => descriptor,
            _ => panic!(
                "frame {} is registered for {:?} of {:?}, but its descriptor does not reference it",
                frame.number(),
                page,
                owner.pid()
            ),
        };

        // from here on user accesses fault and wait for the address space lock
        let (dirty, mapping) = owner.with_directory(|directory| {
            let dirty = directory.is_dirty(page);
            let mapping = directory.translate(page);
            directory.clear(page);
            (dirty, mapping)
        });

        let restore = || {
            owner.with_directory(|directory| {
                if let Some((frame, writable)) = mapping {
                    directory.install(page, frame, writable);
                    directory.set_dirty(page, dirty);
                }
            })
        };

        let mut buffer = Box::new([0u8; PAGE_SIZE]);
        self.memory.read_frame(frame, 0, &mut buffer[..]);

        let backing = match &descriptor.mapped {
            Some(mapped) => {
                if dirty && self.write_back(&buffer[..], &mapped.source).is_err() {
                    restore();
                    return Err(FaultError::FileWrite(page.address()));
                }
                Backing::MappedFile(mapped.source.clone())
            }
            None => match self.swap.write_out(&buffer) {
                Ok(slot) => {
                    self.stats.swap_outs.increment();
                    Backing::Swapped(slot)
                }
                Err(err) => {
                    restore();
                    return Err(err.into());
                }
            },
        };

        descriptor.backing = backing;
        self.stats.evictions.increment();

        debug!(
            "Evicted {:?} of {:?} from frame {} (dirty: {})",
            page,
            owner.pid(),
            frame.number(),
            dirty
        );
        Ok(())
    }
}
