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
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Barrier,
    },
    thread,
};

use rand::{rngs::SmallRng, RngCore, SeedableRng};

use super::{check_consistency, get_test_pager, TestPager, TEST_BASE};
use crate::{
    address::PAGE_SIZE,
    modules::file::{FileModule, FileRef, MemoryFile},
    page_table::Backing,
    process::ProcessId,
    util::lock,
    AccessError, EXIT_ABNORMAL,
};

/// writes `pages` random stack pages and returns their contents, top page first
fn fill_stack(pager: &TestPager, pid: ProcessId, pages: usize, rand: &mut SmallRng) -> Vec<Vec<u8>> {
    let top = pager.config().user_top;

    (1..=pages)
        .map(|i| {
            let mut data = vec![0u8; PAGE_SIZE];
            rand.fill_bytes(&mut data);

            let address = top - i * PAGE_SIZE;
            pager.write_user(pid, address, &data, address).unwrap();
            data
        })
        .collect()
}

fn check_stack(pager: &TestPager, pid: ProcessId, expected: &[Vec<u8>]) {
    let top = pager.config().user_top;
    let sp = top - expected.len() * PAGE_SIZE;

    for (i, data) in expected.iter().enumerate() {
        let mut read = vec![0u8; PAGE_SIZE];
        pager
            .read_user(pid, top - (i + 1) * PAGE_SIZE, &mut read, sp)
            .unwrap();
        assert!(read == *data, "stack page {} differs", i);
    }
}

#[test]
fn test_eviction_under_pressure() {
    let pager = get_test_pager("test_eviction_under_pressure", 4, 16);
    const SEED: u64 = 3_141_592_653_589_793;
    let mut rand = SmallRng::seed_from_u64(SEED);

    let pid = pager.create_process();
    let pages = fill_stack(&pager, pid, 10, &mut rand);

    // 10 pages in 4 frames
    let stats = pager.stats();
    assert_eq!(stats.stack_growths, 10);
    assert_eq!(stats.evictions, 6);
    assert_eq!(stats.swap_outs, 6);
    assert_eq!(pager.swap().used_slots(), 6);
    assert_eq!(pager.frames().registered_count(), 4);
    check_consistency(&pager);

    // reading everything back needs swap ins, which evict again
    check_stack(&pager, pid, &pages);
    assert!(pager.stats().swap_ins >= 6);
    check_consistency(&pager);

    // and once more in reverse order
    let top = pager.config().user_top;
    for i in (0..pages.len()).rev() {
        let mut read = vec![0u8; PAGE_SIZE];
        pager
            .read_user(pid, top - (i + 1) * PAGE_SIZE, &mut read, top - pages.len() * PAGE_SIZE)
            .unwrap();
        assert!(read == pages[i]);
    }
    check_consistency(&pager);

    // exit gives back frames and slots
    assert!(pager.terminate(pid, 0));
    assert_eq!(pager.memory().used_frames(), 0);
    assert_eq!(pager.swap().used_slots(), 0);
}

#[test]
fn test_eviction_prefers_other_process() {
    let pager = get_test_pager("test_eviction_prefers_other_process", 4, 8);
    let top = pager.config().user_top;
    let mut rand = SmallRng::seed_from_u64(27_182_818);

    let first = pager.create_process();
    let second = pager.create_process();

    fill_stack(&pager, first, 2, &mut rand);
    fill_stack(&pager, second, 2, &mut rand);
    assert_eq!(pager.memory().used_frames(), 4);

    // the third page of the second process takes a frame of the first one
    fill_stack(&pager, second, 3, &mut rand);

    for i in 1..=3 {
        assert!(pager
            .find_descriptor(second, top - i * PAGE_SIZE)
            .unwrap()
            .is_resident());
    }

    let evicted: Vec<_> = (1..=2)
        .filter(|i| {
            matches!(
                pager.find_descriptor(first, top - i * PAGE_SIZE).unwrap().backing,
                Backing::Swapped(_)
            )
        })
        .collect();
    assert_eq!(evicted.len(), 1);
    check_consistency(&pager);
}

#[test]
fn test_clean_mapped_pages_are_dropped() {
    let pager = get_test_pager("test_clean_mapped_pages_are_dropped", 3, 4);
    let sp = pager.config().user_top;
    let mut rand = SmallRng::seed_from_u64(1_618_033);

    let mut contents = vec![0u8; 6 * PAGE_SIZE];
    rand.fill_bytes(&mut contents);
    let file = MemoryFile::new(contents.clone());

    let pid = pager.create_process();
    pager.mmap(pid, &file.clone().into_ref(), TEST_BASE).unwrap();

    // reading 6 pages through 3 frames evicts clean mapped pages twice over
    for _ in 0..2 {
        let mut read = vec![0u8; contents.len()];
        pager.read_user(pid, TEST_BASE, &mut read, sp).unwrap();
        assert_eq!(read, contents);
    }

    assert!(pager.stats().evictions > 0);
    assert_eq!(file.write_calls(), 0);
    assert_eq!(pager.swap().used_slots(), 0);
    check_consistency(&pager);
}

#[test]
fn test_dirty_mapped_pages_go_to_file() {
    let pager = get_test_pager("test_dirty_mapped_pages_go_to_file", 3, 4);
    let sp = pager.config().user_top;
    let mut rand = SmallRng::seed_from_u64(1_414_213_562);

    let file = MemoryFile::new(vec![0u8; 6 * PAGE_SIZE]);
    let pid = pager.create_process();
    let id = pager.mmap(pid, &file.clone().into_ref(), TEST_BASE).unwrap();

    let mut expected = vec![0u8; 6 * PAGE_SIZE];
    rand.fill_bytes(&mut expected);
    pager.write_user(pid, TEST_BASE, &expected, sp).unwrap();

    // evicted pages were written to the file instead of swap
    assert_eq!(pager.swap().used_slots(), 0);
    assert_eq!(file.write_calls(), 3);
    assert_eq!(file.contents()[..3 * PAGE_SIZE], expected[..3 * PAGE_SIZE]);
    check_consistency(&pager);

    // a written back page reads back the new contents from the file
    let mut read = vec![0u8; PAGE_SIZE];
    pager.read_user(pid, TEST_BASE, &mut read, sp).unwrap();
    assert!(read[..] == expected[..PAGE_SIZE]);

    pager.munmap(pid, id).unwrap();
    assert_eq!(file.contents(), expected);
    assert_eq!(pager.memory().used_frames(), 0);
    check_consistency(&pager);
}

#[test]
fn test_swap_exhaustion_kills_process() {
    let pager = get_test_pager("test_swap_exhaustion_kills_process", 2, 1);
    let top = pager.config().user_top;

    let pid = pager.create_process();
    let data = [0x55u8; PAGE_SIZE];

    // two pages fit into memory, the third one fills the only swap slot
    for i in 1..=3 {
        let address = top - i * PAGE_SIZE;
        pager.write_user(pid, address, &data, address).unwrap();
    }
    assert_eq!(pager.swap().used_slots(), 1);

    // the fourth one has nowhere to go
    let address = top - 4 * PAGE_SIZE;
    assert_eq!(
        pager.write_user(pid, address, &data, address),
        Err(AccessError::Killed(address))
    );
    assert_eq!(pager.exit_status(pid), Some(EXIT_ABNORMAL));

    // the killed process left nothing behind
    assert_eq!(pager.memory().used_frames(), 0);
    assert_eq!(pager.swap().used_slots(), 0);
    check_consistency(&pager);
}

/// File whose first write waits for the test twice and then fails
#[derive(Clone)]
struct StalledFile {
    inner: MemoryFile,
    gate: Arc<Barrier>,
    stall: Arc<AtomicBool>,
}

impl FileModule for StalledFile {
    fn read_at(&self, dest: &mut [u8], offset: u64) -> Result<usize, ()> {
        self.inner.read_at(dest, offset)
    }

    fn write_at(&self, src: &[u8], offset: u64) -> Result<usize, ()> {
        if self.stall.swap(false, Ordering::SeqCst) {
            // entered, then released
            self.gate.wait();
            self.gate.wait();
            return Err(());
        }
        self.inner.write_at(src, offset)
    }

    fn reopen(&self) -> Result<FileRef, ()> {
        Ok(Arc::new(self.clone()))
    }

    fn length(&self) -> u64 {
        self.inner.length()
    }
}

#[test]
fn test_failed_write_back_spares_victim() {
    let pager = get_test_pager("test_failed_write_back_spares_victim", 1, 4);
    let top = pager.config().user_top;

    let gate = Arc::new(Barrier::new(2));
    let file = StalledFile {
        inner: MemoryFile::new(vec![0u8; PAGE_SIZE]),
        gate: gate.clone(),
        stall: Arc::new(AtomicBool::new(true)),
    };

    // the victim dirties the only frame through a mapping
    let victim = pager.create_process();
    let file: FileRef = Arc::new(file);
    pager.mmap(victim, &file, TEST_BASE).unwrap();
    pager.write_user(victim, TEST_BASE, &[7u8; 16], top).unwrap();

    let faulter = pager.create_process();
    let address = top - PAGE_SIZE;

    thread::scope(|scope| {
        let pager = &pager;
        let faulting = scope.spawn(move || pager.write_user(faulter, address, &[1u8; 16], address));

        // the victim's page is unmapped while its write back hangs
        gate.wait();
        let faults = pager.stats().faults;
        let reading = scope.spawn(move || {
            let mut read = [0u8; 16];
            pager.read_user(victim, TEST_BASE, &mut read, top).map(|_| read)
        });

        while pager.stats().faults == faults {
            thread::yield_now();
        }
        gate.wait();

        assert_eq!(faulting.join().unwrap(), Err(AccessError::Killed(address)));
        assert_eq!(reading.join().unwrap(), Ok([7u8; 16]));
    });

    assert_eq!(pager.exit_status(faulter), Some(EXIT_ABNORMAL));
    assert_eq!(pager.exit_status(victim), None);
    assert!(pager.find_descriptor(victim, TEST_BASE).unwrap().is_resident());
    check_consistency(&pager);
}

#[test]
fn test_busy_process_is_skipped() {
    let pager = get_test_pager("test_busy_process_is_skipped", 2, 4);
    let top = pager.config().user_top;
    let mut rand = SmallRng::seed_from_u64(5_772_156);

    let caller = pager.create_process();
    let other = pager.create_process();
    let own = fill_stack(&pager, caller, 1, &mut rand);
    let others = fill_stack(&pager, other, 1, &mut rand);

    // with the other address space held, only the caller's own frame is left
    let other_process = pager.process(other).unwrap();
    let guard = lock(&other_process.space);
    let address = top - 2 * PAGE_SIZE;
    pager.write_user(caller, address, &[3u8; 64], address).unwrap();
    drop(guard);

    assert!(matches!(
        pager.find_descriptor(caller, top - PAGE_SIZE).unwrap().backing,
        Backing::Swapped(_)
    ));
    assert!(pager.find_descriptor(other, top - PAGE_SIZE).unwrap().is_resident());
    assert_eq!(pager.stats().kills, 0);
    check_consistency(&pager);

    check_stack(&pager, other, &others);
    let mut read = vec![0u8; PAGE_SIZE];
    pager.read_user(caller, top - PAGE_SIZE, &mut read, address).unwrap();
    assert!(read == own[0]);
}

#[test]
fn test_only_busy_victims_fail() {
    let pager = get_test_pager("test_only_busy_victims_fail", 1, 4);
    let top = pager.config().user_top;
    let mut rand = SmallRng::seed_from_u64(6_931_471);

    let other = pager.create_process();
    let others = fill_stack(&pager, other, 1, &mut rand);
    let caller = pager.create_process();

    // the only frame belongs to a process that stays busy
    let other_process = pager.process(other).unwrap();
    let guard = lock(&other_process.space);
    let address = top - PAGE_SIZE;
    assert_eq!(
        pager.write_user(caller, address, &[3u8; 64], address),
        Err(AccessError::Killed(address))
    );
    drop(guard);

    assert_eq!(pager.exit_status(caller), Some(EXIT_ABNORMAL));
    assert_eq!(pager.exit_status(other), None);
    assert_eq!(pager.stats().evictions, 0);
    check_stack(&pager, other, &others);
    check_consistency(&pager);
}
