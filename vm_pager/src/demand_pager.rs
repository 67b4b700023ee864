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
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};

use log::{debug, info};

use crate::{
    fault_stats::{FaultStats, FaultStatsSnapshot},
    frame_table::FrameTable,
    modules::{
        block_device::BlockDeviceModule, page_directory::HardwarePageTableModule,
        physical_memory::PhysicalMemoryModule,
    },
    page_table::PageDescriptor,
    pager_config::PagerConfig,
    process::{Process, ProcessId},
    swap::SwapStore,
    util::lock,
};

/// Demand paging virtual memory manager.
///
/// Owns the global state shared by all processes: the frame table, the swap
/// store and the process registry. All process related calls take the
/// [`ProcessId`] of the process they act on.
///
/// Lock order: address space of the current process, frame table, swap
/// store. The address space of another process is only taken with
/// `try_lock` while the frame table is held (see eviction). Hardware page
/// directories, frame contents and the process registry are leaf locks.
pub struct DemandPager<P: PhysicalMemoryModule, D: BlockDeviceModule, H: HardwarePageTableModule> {
    pub(crate) config: PagerConfig,
    pub(crate) memory: Arc<P>,
    pub(crate) frames: FrameTable<P>,
    pub(crate) swap: SwapStore<D>,
    pub(crate) stats: FaultStats,
    processes: Mutex<HashMap<ProcessId, Arc<Process<H>>>>,
    next_pid: AtomicU32,
}

impl<P, D, H> DemandPager<P, D, H>
where
    P: PhysicalMemoryModule,
    D: BlockDeviceModule,
    H: HardwarePageTableModule,
{
    pub fn new(config: PagerConfig, memory: Arc<P>, swap_device: D) -> Self {
        assert!(
            config.user_base < config.user_top,
            "user space is empty: {:#x}..{:#x}",
            config.user_base,
            config.user_top
        );

        debug!(
            "Demand pager with {} frames, user space {:#x}..{:#x}",
            memory.frame_count(),
            config.user_base,
            config.user_top
        );

        Self {
            config,
            frames: FrameTable::new(memory.clone()),
            memory,
            swap: SwapStore::init(swap_device),
            stats: FaultStats::default(),
            processes: Mutex::new(HashMap::new()),
            next_pid: AtomicU32::new(1),
        }
    }

    #[inline]
    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    #[inline]
    pub fn memory(&self) -> &Arc<P> {
        &self.memory
    }

    #[inline]
    pub fn frames(&self) -> &FrameTable<P> {
        &self.frames
    }

    #[inline]
    pub fn swap(&self) -> &SwapStore<D> {
        &self.swap
    }

    /// Creates a process with an empty address space
    pub fn create_process(&self) -> ProcessId {
        let pid = ProcessId::new(self.next_pid.fetch_add(1, Ordering::Relaxed));
        lock(&self.processes).insert(pid, Arc::new(Process::new(pid)));

        debug!("Created {:?}", pid);
        pid
    }

    pub fn process(&self, pid: ProcessId) -> Option<Arc<Process<H>>> {
        lock(&self.processes).get(&pid).cloned()
    }

    /// All processes, including the ones that have exited
    pub fn processes(&self) -> Vec<Arc<Process<H>>> {
        lock(&self.processes).values().cloned().collect()
    }

    /// Records `status` as the exit status of `pid` and tears down its
    /// address space.
    ///
    /// Returns `false` if the process does not exist or has exited already.
    pub fn terminate(&self, pid: ProcessId, status: i32) -> bool {
        let process = match self.process(pid) {
            Some(process) => process,
            None => return false,
        };

        if !process.set_exit_status(status) {
            return false;
        }

        self.destroy_address_space(pid);
        debug!("{:?} exited with status {}", pid, status);
        true
    }

    /// Exit status of `pid`, `None` while it is running or if it is unknown
    pub fn exit_status(&self, pid: ProcessId) -> Option<i32> {
        self.process(pid).and_then(|process| process.exit_status())
    }

    /// Blocks until `pid` exited and returns its exit status
    pub fn wait(&self, pid: ProcessId) -> Option<i32> {
        self.process(pid).map(|process| process.wait())
    }

    /// Releases everything the address space of `pid` holds.
    ///
    /// Mapped files are unmapped first, so their dirty pages reach the file.
    /// Calling this more than once is harmless.
    pub fn destroy_address_space(&self, pid: ProcessId) {
        let process = match self.process(pid) {
            Some(process) => process,
            None => return,
        };

        let mut space = lock(&process.space);
        if space.destroyed {
            return;
        }

        for id in space.mappings.ids() {
            // ids come from the table itself
            let _ = self.unmap_file(&process, &mut space, id);
        }

        let pages = space.pages.len();
        space
            .pages
            .destroy(&process.directory, &self.frames, &self.swap);
        space.files.clear();
        space.destroyed = true;

        debug!("Destroyed address space of {:?} ({} pages)", pid, pages);
    }

    /// Copy of the descriptor of the page containing `address` in `pid`
    pub fn find_descriptor(&self, pid: ProcessId, address: usize) -> Option<PageDescriptor> {
        let process = self.process(pid)?;
        let space = lock(&process.space);
        space.pages.find(address).cloned()
    }

    /// Is `address` a valid user pointer?
    #[inline]
    pub fn is_user_address(&self, address: usize) -> bool {
        self.config.is_user_address(address)
    }

    pub fn stats(&self) -> FaultStatsSnapshot {
        self.stats.snapshot()
    }

    /// Logs the fault statistics
    pub fn print_stats(&self) {
        let stats = self.stats();
        info!(
            "Paging: {} faults, {} stack growths, {} lazy loads, {} swap ins",
            stats.faults, stats.stack_growths, stats.lazy_loads, stats.swap_ins
        );
        info!(
            "Paging: {} evictions, {} swap outs, {} file write backs, {} processes killed",
            stats.evictions, stats.swap_outs, stats.file_write_backs, stats.kills
        );
        info!(
            "Paging: {}/{} frames registered, {}/{} swap slots used",
            self.frames.registered_count(),
            self.memory.frame_count(),
            self.swap.used_slots(),
            self.swap.slot_count()
        );
    }
}
