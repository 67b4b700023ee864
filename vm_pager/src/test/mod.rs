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

use std::{collections::HashSet, sync::Arc};

use crate::{
    address::{PAGE_SIZE, SECTORS_PER_SLOT},
    frame_table::FrameMapping,
    modules::{
        block_device::{test::get_test_device, FileBlockDevice},
        page_directory::{HardwarePageTableModule, SoftPageDirectory},
        physical_memory::UserPool,
    },
    page_table::Backing,
    util::lock,
    DemandPager, PagerConfig,
};

mod eviction;
mod mmap;

pub(crate) type TestPager = DemandPager<UserPool, FileBlockDevice, SoftPageDirectory>;

/// First address used for test segments and mappings
pub(crate) const TEST_BASE: usize = 0x1000_0000;

pub(crate) fn get_test_pager(test_name: &str, frames: usize, swap_slots: usize) -> TestPager {
    let _ = env_logger::builder().is_test(true).try_init();

    DemandPager::new(
        PagerConfig::default(),
        Arc::new(UserPool::new(frames)),
        get_test_device(test_name, swap_slots * SECTORS_PER_SLOT),
    )
}

/// Checks the bookkeeping of all processes against the frame table and the
/// swap store. Only call this while no fault is in flight.
pub(crate) fn check_consistency(pager: &TestPager) {
    let mut frames = HashSet::new();
    let mut swapped = 0;

    for process in pager.processes() {
        let space = lock(&process.space);
        let directory = lock(&process.directory);

        for descriptor in space.pages.iter() {
            let page = descriptor.virtual_page;

            match &descriptor.backing {
                Backing::Resident(frame) => {
                    assert!(frames.insert(*frame), "frame {} is used twice", frame.number());
                    assert_eq!(
                        pager.frames.lookup(*frame),
                        Some(FrameMapping {
                            owner: process.pid(),
                            virtual_page: page,
                        }),
                        "frame table does not know {:?} of {:?}",
                        page,
                        process.pid()
                    );
                    assert_eq!(directory.translate(page).map(|(f, _)| f), Some(*frame));
                }
                Backing::Swapped(_) => {
                    assert!(descriptor.mapped.is_none(), "mapped page {:?} was swapped", page);
                    swapped += 1;
                }
                Backing::FileBacked(_) | Backing::MappedFile(_) => {
                    assert!(directory.translate(page).is_none());
                }
            }
        }
    }

    assert_eq!(pager.frames.registered_count(), frames.len());
    assert_eq!(pager.memory.used_frames(), frames.len());
    assert_eq!(pager.swap.used_slots(), swapped);
}

/// Fills `pages` stack pages of a throwaway process with garbage and lets it
/// exit, so the next allocations get dirty frames back
pub(crate) fn scribble_frames(pager: &TestPager, pages: usize) {
    let pid = pager.create_process();
    let top = pager.config().user_top;

    for i in 1..=pages {
        let address = top - i * PAGE_SIZE;
        pager
            .write_user(pid, address, &[0xAA; PAGE_SIZE], address)
            .unwrap();
    }

    assert!(pager.terminate(pid, 0));
}
