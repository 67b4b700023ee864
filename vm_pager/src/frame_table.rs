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

//! Global registry of the frames that currently back user pages.
//!
//! Frames are addressed by their [`PhysFrame`] number, which also is their
//! position in the registry. The registry only remembers *who* uses a frame
//! (process id and virtual page), the page descriptor itself stays owned by
//! that process's page table and is looked up through it.

use std::sync::{Arc, Mutex, MutexGuard};

use log::trace;

use crate::{
    address::{PhysFrame, VirtualPage},
    modules::physical_memory::PhysicalMemoryModule,
    process::ProcessId,
    util::lock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("no free physical frame left")]
    Exhausted,
}

/// Reverse mapping of a frame to the page it backs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMapping {
    pub owner: ProcessId,
    pub virtual_page: VirtualPage,
}

#[derive(Debug, Clone, Copy)]
struct FrameEntry {
    /// `None` while the frame is reserved but not registered yet
    mapping: Option<FrameMapping>,

    /// `false` while the frame is being filled
    evictable: bool,
}

/// Result of looking at a victim candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The page was accessed since the last scan. The accessed bit has been
    /// cleared, the frame gets another chance.
    Referenced,

    /// The page was not accessed, it can be evicted
    Idle,

    /// The owner can not be touched right now, skip the frame
    Busy,
}

pub(crate) struct FrameRegistry {
    frames: Vec<Option<FrameEntry>>,

    /// Position of the clock hand
    hand: usize,

    /// Frames that are reserved or registered
    in_use: usize,
}

/// Frame table, one per pager.
pub struct FrameTable<P: PhysicalMemoryModule> {
    memory: Arc<P>,
    registry: Mutex<FrameRegistry>,
}

/// Locked frame table
pub struct FrameTableGuard<'a, P: PhysicalMemoryModule> {
    memory: &'a P,
    registry: MutexGuard<'a, FrameRegistry>,
}

impl<P: PhysicalMemoryModule> FrameTable<P> {
    pub fn new(memory: Arc<P>) -> Self {
        let frame_count = memory.frame_count();

        Self {
            memory,
            registry: Mutex::new(FrameRegistry {
                frames: vec![None; frame_count],
                hand: 0,
                in_use: 0,
            }),
        }
    }

    /// Takes the frame table lock.
    ///
    /// Hold the guard for as long as a victim search and the detaching of the
    /// victim have to appear as one step.
    pub fn lock(&self) -> FrameTableGuard<'_, P> {
        FrameTableGuard {
            memory: &self.memory,
            registry: lock(&self.registry),
        }
    }

    /// See [`FrameTableGuard::allocate`]
    pub fn allocate(&self) -> Result<PhysFrame, FrameError> {
        self.lock().allocate()
    }

    /// See [`FrameTableGuard::register`]
    pub fn register(&self, frame: PhysFrame, owner: ProcessId, virtual_page: VirtualPage) {
        self.lock().register(frame, owner, virtual_page)
    }

    /// See [`FrameTableGuard::release`]
    pub fn release(&self, frame: PhysFrame) {
        self.lock().release(frame)
    }

    /// Returns the reverse mapping of a registered frame
    pub fn lookup(&self, frame: PhysFrame) -> Option<FrameMapping> {
        self.lock().lookup(frame)
    }

    /// Number of registered (evictable) frames
    pub fn registered_count(&self) -> usize {
        self.lock().registered_count()
    }
}

impl<P: PhysicalMemoryModule> FrameTableGuard<'_, P> {
    /// Takes one frame from the physical allocator.
    ///
    /// The frame is reserved: it belongs to nobody and is never chosen as a
    /// victim until [`FrameTableGuard::register`] is called.
    /// Running out of frames is expected, callers evict and retry once.
    pub fn allocate(&mut self) -> Result<PhysFrame, FrameError> {
        let frame = self
            .memory
            .alloc_user_page()
            .ok_or(FrameError::Exhausted)?;

        let entry = &mut self.registry.frames[frame.number()];
        assert!(
            entry.is_none(),
            "physical allocator handed out frame {} twice",
            frame.number()
        );
        *entry = Some(FrameEntry {
            mapping: None,
            evictable: false,
        });
        self.registry.in_use += 1;

        trace!("Reserved frame {}", frame.number());
        Ok(frame)
    }

    /// Marks a reserved frame as backing `virtual_page` of `owner` and makes it
    /// evictable.
    ///
    /// **Only call this once the frame contents are valid.**
    pub fn register(&mut self, frame: PhysFrame, owner: ProcessId, virtual_page: VirtualPage) {
        let entry = self.entry_mut(frame);
        assert!(
            entry.mapping.is_none(),
            "frame {} is already registered to {:?}",
            frame.number(),
            entry.mapping
        );

        entry.mapping = Some(FrameMapping {
            owner,
            virtual_page,
        });
        entry.evictable = true;
    }

    /// Removes the frame from the registry and hands it back to the
    /// physical allocator.
    ///
    /// The caller has to remove every reference to the frame first.
    pub fn release(&mut self, frame: PhysFrame) {
        assert!(
            matches!(self.registry.frames.get(frame.number()), Some(Some(_))),
            "frame {} is not in the frame table",
            frame.number()
        );
        self.registry.frames[frame.number()] = None;
        self.registry.in_use -= 1;

        self.memory.free_user_page(frame);
        trace!("Released frame {}", frame.number());
    }

    pub fn lookup(&self, frame: PhysFrame) -> Option<FrameMapping> {
        self.registry
            .frames
            .get(frame.number())
            .copied()
            .flatten()
            .and_then(|entry| entry.mapping)
    }

    pub fn registered_count(&self) -> usize {
        self.registry
            .frames
            .iter()
            .flatten()
            .filter(|entry| entry.mapping.is_some())
            .count()
    }

    /// Second chance (clock) victim search.
    ///
    /// Frames owned by other processes than `current` are scanned first; only
    /// if none of them can be taken the frames of `current` are scanned.
    /// Each of the two passes visits every frame at most twice, so a table in
    /// which every page was accessed still yields a victim: the first sweep
    /// clears the accessed bits, the second one takes the first frame.
    ///
    /// `probe` reads and clears the hardware accessed bit of a candidate.
    /// Reserved (non-evictable) frames are never probed.
    ///
    /// # Panics
    /// If the table holds no frame at all: the caller ran out of physical
    /// memory without owning a single frame, which means the accounting is
    /// broken.
    pub fn select_victim<F>(&mut self, current: ProcessId, mut probe: F) -> Option<(PhysFrame, FrameMapping)>
    where
        F: FnMut(PhysFrame, &FrameMapping) -> Probe,
    {
        assert!(
            self.registry.in_use > 0,
            "victim requested from an empty frame table"
        );

        self.clock_pass(|mapping| mapping.owner != current, &mut probe)
            .or_else(|| self.clock_pass(|mapping| mapping.owner == current, &mut probe))
    }

    fn clock_pass<C, F>(&mut self, candidate: C, probe: &mut F) -> Option<(PhysFrame, FrameMapping)>
    where
        C: Fn(&FrameMapping) -> bool,
        F: FnMut(PhysFrame, &FrameMapping) -> Probe,
    {
        let frame_count = self.registry.frames.len();
        let start = self.registry.hand;

        for step in 0..2 * frame_count {
            let index = (start + step) % frame_count;

            let mapping = match self.registry.frames[index] {
                Some(FrameEntry {
                    mapping: Some(mapping),
                    evictable: true,
                }) if candidate(&mapping) => mapping,
                _ => continue,
            };

            let frame = PhysFrame::new(index);
            match probe(frame, &mapping) {
                Probe::Idle => {
                    self.registry.hand = (index + 1) % frame_count;
                    return Some((frame, mapping));
                }
                Probe::Referenced | Probe::Busy => {}
            }
        }

        None
    }

    fn entry_mut(&mut self, frame: PhysFrame) -> &mut FrameEntry {
        match self.registry.frames.get_mut(frame.number()) {
            Some(Some(entry)) => entry,
            _ => panic!("frame {} is not in the frame table", frame.number()),
        }
    }
}
