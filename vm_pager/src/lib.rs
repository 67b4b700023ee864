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

mod access;
mod demand_pager;
mod eviction;
mod fault_stats;
mod util;

pub mod address;
pub mod fault;
pub mod frame_table;
pub mod loader;
pub mod mmap;
pub mod modules;
pub mod page_table;
pub mod pager_config;
pub mod process;
pub mod swap;

#[cfg(test)]
mod test;

pub use access::AccessError;
pub use demand_pager::DemandPager;
pub use fault::{FaultError, FaultFlags};
pub use fault_stats::FaultStatsSnapshot;
pub use mmap::{MappingId, MmapError};
pub use pager_config::PagerConfig;
pub use process::{ProcessId, EXIT_ABNORMAL};
