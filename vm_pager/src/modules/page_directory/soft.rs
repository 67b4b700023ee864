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

use std::collections::HashMap;

use super::HardwarePageTableModule;
use crate::address::{PhysFrame, VirtualPage};

#[derive(Debug, Clone, Copy)]
struct SoftEntry {
    frame: PhysFrame,
    writable: bool,
    accessed: bool,
    dirty: bool,
}

/// Page directory kept in software.
///
/// Stands in for the MMU: the simulated user accesses of the pager set the
/// accessed and dirty bits exactly where the hardware would.
#[derive(Debug, Default)]
pub struct SoftPageDirectory {
    entries: HashMap<VirtualPage, SoftEntry>,
}

impl SoftPageDirectory {
    /// Number of installed mappings
    pub fn mapped_pages(&self) -> usize {
        self.entries.len()
    }
}

impl HardwarePageTableModule for SoftPageDirectory {
    fn new() -> Self {
        Self::default()
    }

    fn install(&mut self, page: VirtualPage, frame: PhysFrame, writable: bool) -> bool {
        if self.entries.contains_key(&page) {
            return false;
        }

        self.entries.insert(
            page,
            SoftEntry {
                frame,
                writable,
                accessed: false,
                dirty: false,
            },
        );
        true
    }

    fn clear(&mut self, page: VirtualPage) {
        self.entries.remove(&page);
    }

    fn translate(&self, page: VirtualPage) -> Option<(PhysFrame, bool)> {
        self.entries
            .get(&page)
            .map(|entry| (entry.frame, entry.writable))
    }

    fn is_accessed(&self, page: VirtualPage) -> bool {
        self.entries.get(&page).is_some_and(|entry| entry.accessed)
    }

    fn set_accessed(&mut self, page: VirtualPage, accessed: bool) {
        if let Some(entry) = self.entries.get_mut(&page) {
            entry.accessed = accessed;
        }
    }

    fn is_dirty(&self, page: VirtualPage) -> bool {
        self.entries.get(&page).is_some_and(|entry| entry.dirty)
    }

    fn set_dirty(&mut self, page: VirtualPage, dirty: bool) {
        if let Some(entry) = self.entries.get_mut(&page) {
            entry.dirty = dirty;
        }
    }
}
