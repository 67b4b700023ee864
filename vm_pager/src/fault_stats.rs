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

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Counter(AtomicU64);

impl Counter {
    #[inline]
    pub(crate) fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Event counters of the pager
#[derive(Debug, Default)]
pub(crate) struct FaultStats {
    pub(crate) faults: Counter,
    pub(crate) stack_growths: Counter,
    pub(crate) lazy_loads: Counter,
    pub(crate) swap_ins: Counter,
    pub(crate) evictions: Counter,
    pub(crate) swap_outs: Counter,
    pub(crate) file_write_backs: Counter,
    pub(crate) kills: Counter,
}

impl FaultStats {
    pub(crate) fn snapshot(&self) -> FaultStatsSnapshot {
        FaultStatsSnapshot {
            faults: self.faults.get(),
            stack_growths: self.stack_growths.get(),
            lazy_loads: self.lazy_loads.get(),
            swap_ins: self.swap_ins.get(),
            evictions: self.evictions.get(),
            swap_outs: self.swap_outs.get(),
            file_write_backs: self.file_write_backs.get(),
            kills: self.kills.get(),
        }
    }
}

/// Counter values at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FaultStatsSnapshot {
    /// Page faults handled, including the ones that killed the process
    pub faults: u64,
    pub stack_growths: u64,
    pub lazy_loads: u64,
    pub swap_ins: u64,
    pub evictions: u64,
    pub swap_outs: u64,

    /// Dirty mapped pages written to their file (on eviction and unmap)
    pub file_write_backs: u64,

    /// Processes terminated because of a fault
    pub kills: u64,
}
