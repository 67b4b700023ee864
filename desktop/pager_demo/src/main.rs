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

use std::{fs::remove_file, sync::Arc, thread};

use env_logger::{Builder, Env};
use log::{error, info};
use rand::{rngs::SmallRng, RngCore, SeedableRng};
use vm_pager::{
    address::{PAGE_SIZE, SECTORS_PER_SLOT},
    modules::{
        block_device::FileBlockDevice,
        file::{FileRef, HostFile},
        page_directory::SoftPageDirectory,
        physical_memory::UserPool,
    },
    DemandPager, PagerConfig,
};

type Pager = DemandPager<UserPool, FileBlockDevice, SoftPageDirectory>;

const FRAMES: usize = 32;
const SWAP_SLOTS: usize = 256;

const WORKERS: usize = 4;
const ROUNDS: usize = 4;
const STACK_PAGES: usize = 24;
const MAPPED_PAGES: usize = 8;

/// Where each worker maps its data file
const MAP_BASE: usize = 0x1000_0000;

fn main() {
    Builder::from_env(Env::default())
        .format_module_path(false)
        .init();

    let swap = FileBlockDevice::new(
        "/tmp/pager_demo_swap.img".to_string(),
        SWAP_SLOTS * SECTORS_PER_SLOT,
    )
    .unwrap();

    let pager: Pager = DemandPager::new(
        PagerConfig::default(),
        Arc::new(UserPool::new(FRAMES)),
        swap,
    );

    info!(
        "Running {} workers with {} stack pages each on {} frames",
        WORKERS, STACK_PAGES, FRAMES
    );

    thread::scope(|scope| {
        for worker in 0..WORKERS {
            let pager = &pager;
            scope.spawn(move || run_worker(pager, worker));
        }
    });

    pager.print_stats();
    println!("{}", serde_json::to_string_pretty(&pager.stats()).unwrap());
}

fn run_worker(pager: &Pager, worker: usize) {
    let pid = pager.create_process();
    let mut rand = SmallRng::seed_from_u64(0x5EED + worker as u64);

    let path = format!("/tmp/pager_demo_{}.map", worker);
    let file: FileRef = Arc::new(HostFile::create(&path, &vec![0u8; MAPPED_PAGES * PAGE_SIZE]).unwrap());
    let mapping = pager.mmap(pid, &file, MAP_BASE).unwrap();

    let top = pager.config().user_top;
    let sp = top - STACK_PAGES * PAGE_SIZE;
    let mut stack = vec![vec![0u8; PAGE_SIZE]; STACK_PAGES];
    let mut mapped = vec![0u8; MAPPED_PAGES * PAGE_SIZE];

    for round in 0..ROUNDS {
        for (i, page) in stack.iter_mut().enumerate() {
            rand.fill_bytes(page);
            if pager
                .write_user(pid, top - (i + 1) * PAGE_SIZE, page, sp)
                .is_err()
            {
                error!("Worker {} was killed in round {}", worker, round);
                return;
            }
        }

        // scattered small writes to the mapped file
        for _ in 0..16 {
            let offset = rand.next_u32() as usize % (mapped.len() - 8);
            let value = rand.next_u64().to_le_bytes();
            mapped[offset..offset + 8].copy_from_slice(&value);

            if pager.write_user(pid, MAP_BASE + offset, &value, sp).is_err() {
                error!("Worker {} was killed in round {}", worker, round);
                return;
            }
        }

        for (i, page) in stack.iter().enumerate() {
            let mut read = vec![0u8; PAGE_SIZE];
            let ok = pager
                .read_user(pid, top - (i + 1) * PAGE_SIZE, &mut read, sp)
                .is_ok();

            if !ok || read != *page {
                error!("Worker {}: stack page {} is corrupted", worker, i);
            }
        }
    }

    pager.munmap(pid, mapping).unwrap();
    pager.terminate(pid, 0);

    let mut contents = vec![0u8; mapped.len()];
    file.read_at(&mut contents, 0).unwrap();
    if contents != mapped {
        error!("Worker {}: mapped file does not match", worker);
    } else {
        info!("Worker {} done, mapped file is consistent", worker);
    }

    drop(file);
    let _ = remove_file(&path);
}
