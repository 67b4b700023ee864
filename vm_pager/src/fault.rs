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

//! Page fault resolution.
//!
//! A fault is handled in one of these ways, checked in this order:
//!
//! 1. protection violation on a present page: fatal
//! 2. address outside of user space: fatal
//! 3. no descriptor: stack growth if the address is close enough to the
//!    stack pointer and inside the stack region, fatal otherwise
//! 4. swapped page: swap in
//! 5. page backed by a file (executable segment or mapped file): lazy load
//! 6. resident page that is still mapped: nothing to do, the access is
//!    restarted
//! 7. anything else means the bookkeeping is broken: fatal
//!
//! Every frame allocation is retried once after evicting a victim. A fatal
//! outcome only terminates the faulting process.

use log::{trace, warn};

use crate::{
    address::{PhysFrame, VirtualPage, PAGE_SIZE},
    demand_pager::DemandPager,
    frame_table::FrameError,
    modules::{
        block_device::BlockDeviceModule, page_directory::HardwarePageTableModule,
        physical_memory::PhysicalMemoryModule,
    },
    page_table::{Backing, FileSource, PageDescriptor},
    process::{AddressSpace, Process, ProcessId, EXIT_ABNORMAL},
    swap::{SwapError, SwapSlot},
    util::lock,
};

/// Error code bits pushed by the CPU on a page fault
const ERROR_PRESENT: u32 = 0x1;
const ERROR_WRITE: u32 = 0x2;
const ERROR_USER: u32 = 0x4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultFlags {
    /// `false` if the page was present and the access violated its protection
    pub not_present: bool,
    pub write: bool,
    pub user: bool,
}

impl FaultFlags {
    /// Fault on a page that is not mapped
    pub const fn not_present(write: bool) -> Self {
        Self {
            not_present: true,
            write,
            user: true,
        }
    }

    /// Decodes the x86 page fault error code
    pub const fn from_error_code(code: u32) -> Self {
        Self {
            not_present: code & ERROR_PRESENT == 0,
            write: code & ERROR_WRITE != 0,
            user: code & ERROR_USER != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FaultError {
    #[error("protection violation at {0:#x}")]
    ProtectionViolation(usize),
    #[error("{0:#x} is not a user address")]
    InvalidAddress(usize),
    #[error("{0:#x} is too far below the stack pointer")]
    BelowStackPointer(usize),
    #[error("{0:#x} is outside of the stack region")]
    OutsideStackRegion(usize),
    #[error("out of physical memory")]
    OutOfMemory,
    #[error(transparent)]
    Swap(#[from] SwapError),
    #[error("could not read the contents of {0:#x} from its file")]
    FileRead(usize),
    #[error("could not write back {0:#x} to its file")]
    FileWrite(usize),
    #[error("{0:#x} is mapped already")]
    InstallFailed(usize),
    #[error("descriptor of {0:#x} is in an inconsistent state")]
    Inconsistent(usize),
    #[error("process does not exist or has exited")]
    UnknownProcess,
}

impl<P, D, H> DemandPager<P, D, H>
where
    P: PhysicalMemoryModule,
    D: BlockDeviceModule,
    H: HardwarePageTableModule,
{
    /// Trap handler entry: resolves the fault or terminates `pid` with
    /// [`EXIT_ABNORMAL`].
    ///
    /// Returns `true` if the faulting access can be restarted.
    pub fn page_fault(&self, pid: ProcessId, address: usize, flags: FaultFlags, stack_pointer: usize) -> bool {
        if self.resolve_fault(pid, address, flags, stack_pointer) {
            return true;
        }

        if self.terminate(pid, EXIT_ABNORMAL) {
            self.stats.kills.increment();
        }
        false
    }

    /// Resolves the fault, `false` means the caller has to terminate `pid`
    pub fn resolve_fault(&self, pid: ProcessId, address: usize, flags: FaultFlags, stack_pointer: usize) -> bool {
        match self.try_resolve_fault(pid, address, flags, stack_pointer) {
            Ok(()) => true,
            Err(err) => {
                warn!("Unresolvable page fault of {:?}: {}", pid, err);
                false
            }
        }
    }

    pub fn try_resolve_fault(
        &self,
        pid: ProcessId,
        address: usize,
        flags: FaultFlags,
        stack_pointer: usize,
    ) -> Result<(), FaultError> {
        self.stats.faults.increment();
        trace!(
            "{:?} faulted at {:#x} (write: {}, present: {})",
            pid,
            address,
            flags.write,
            !flags.not_present
        );

        if !flags.not_present {
            return Err(FaultError::ProtectionViolation(address));
        }
        if !self.config.is_user_address(address) {
            return Err(FaultError::InvalidAddress(address));
        }

        let process = self.process(pid).ok_or(FaultError::UnknownProcess)?;
        let mut space = lock(&process.space);
        if space.destroyed {
            return Err(FaultError::UnknownProcess);
        }

        let page = VirtualPage::containing(address);
        let backing = match space.pages.find(address) {
            Some(descriptor) => descriptor.backing.clone(),
            None => return self.grow_stack(&process, &mut space, address, stack_pointer),
        };

        match backing {
            Backing::Swapped(slot) => self.swap_in(&process, &mut space, page, slot),
            Backing::FileBacked(source) | Backing::MappedFile(source) => {
                self.lazy_load(&process, &mut space, page, &source)
            }
            Backing::Resident(frame) => {
                // an eviction that failed to write the page out restored the
                // mapping while this fault waited for the address space
                let translation = lock(&process.directory).translate(page);
                if matches!(translation, Some((mapped, _)) if mapped == frame) {
                    trace!("Spurious fault of {:?} on {:?}", pid, page);
                    return Ok(());
                }

                warn!(
                    "{:?} faulted on {:?} which is resident in frame {}",
                    pid,
                    page,
                    frame.number()
                );
                Err(FaultError::Inconsistent(address))
            }
        }
    }

    fn grow_stack(
        &self,
        process: &Process<H>,
        space: &mut AddressSpace,
        address: usize,
        stack_pointer: usize,
    ) -> Result<(), FaultError> {
        if !self.config.is_stack_access(address, stack_pointer) {
            return Err(
                if address < stack_pointer.saturating_sub(self.config.stack_slack) {
                    FaultError::BelowStackPointer(address)
                } else {
                    FaultError::OutsideStackRegion(address)
                },
            );
        }

        let page = VirtualPage::containing(address);
        let frame = self.obtain_frame(process, space)?;
        self.memory.with_frame(frame, |bytes| bytes.fill(0));

        if space
            .pages
            .insert(PageDescriptor::new(page, true, Backing::Resident(frame)))
            .is_err()
        {
            self.frames.release(frame);
            return Err(FaultError::Inconsistent(address));
        }

        self.stats.stack_growths.increment();
        trace!("Grew stack of {:?} by {:?}", process.pid(), page);
        self.make_resident(process, space, page, frame)
    }

    fn swap_in(
        &self,
        process: &Process<H>,
        space: &mut AddressSpace,
        page: VirtualPage,
        slot: SwapSlot,
    ) -> Result<(), FaultError> {
        let frame = self.obtain_frame(process, space)?;

        let mut buffer = Box::new([0u8; PAGE_SIZE]);
        if let Err(err) = self.swap.read_in(slot, &mut buffer) {
            self.frames.release(frame);
            return Err(err.into());
        }
        self.memory.write_frame(frame, 0, &buffer[..]);

        self.stats.swap_ins.increment();
        trace!("Swapped in {:?} from slot {}", page, slot.index());
        self.make_resident(process, space, page, frame)
    }

    fn lazy_load(
        &self,
        process: &Process<H>,
        space: &mut AddressSpace,
        page: VirtualPage,
        source: &FileSource,
    ) -> Result<(), FaultError> {
        let frame = self.obtain_frame(process, space)?;

        // the tail stays zero
        let mut buffer = Box::new([0u8; PAGE_SIZE]);
        match source
            .file
            .read_at(&mut buffer[..source.read_len], source.offset)
        {
            Ok(read) if read == source.read_len => {}
            _ => {
                self.frames.release(frame);
                return Err(FaultError::FileRead(page.address()));
            }
        }
        self.memory.write_frame(frame, 0, &buffer[..]);

        self.stats.lazy_loads.increment();
        trace!(
            "Loaded {:?} ({} bytes at offset {})",
            page,
            source.read_len,
            source.offset
        );
        self.make_resident(process, space, page, frame)
    }

    /// Marks the descriptor of `page` resident in `frame`, installs the
    /// hardware mapping and hands the frame over to the frame table.
    ///
    /// The frame contents have to be valid at this point.
    fn make_resident(
        &self,
        process: &Process<H>,
        space: &mut AddressSpace,
        page: VirtualPage,
        frame: PhysFrame,
    ) -> Result<(), FaultError> {
        let descriptor = match space.pages.find_mut(page.address()) {
            Some(descriptor) => descriptor,
            None => {
                self.frames.release(frame);
                return Err(FaultError::Inconsistent(page.address()));
            }
        };

        let installed = lock(&process.directory).install(page, frame, descriptor.writable);

        // the frame holds the only copy of the page now, so it is accounted
        // for even if the mapping could not be installed
        descriptor.backing = Backing::Resident(frame);
        self.frames.register(frame, process.pid(), page);

        if installed {
            Ok(())
        } else {
            Err(FaultError::InstallFailed(page.address()))
        }
    }

    /// Allocates a frame, evicting one victim if physical memory is full
    fn obtain_frame(&self, process: &Process<H>, space: &mut AddressSpace) -> Result<PhysFrame, FaultError> {
        match self.frames.allocate() {
            Ok(frame) => Ok(frame),
            Err(FrameError::Exhausted) => self.evict(process, space),
        }
    }
}

#[cfg(test)]
mod test {
    use super::FaultFlags;

    #[test]
    fn test_fault_flags_from_error_code() {
        let flags = FaultFlags::from_error_code(0b110);
        assert!(flags.not_present);
        assert!(flags.write);
        assert!(flags.user);

        let flags = FaultFlags::from_error_code(0b011);
        assert!(!flags.not_present);
        assert!(flags.write);
        assert!(!flags.user);
    }
}
