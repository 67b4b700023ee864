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

use std::sync::Mutex;

use super::PhysicalMemoryModule;
use crate::{
    address::{PhysFrame, PAGE_SIZE},
    util::{bit_array::BitArray, lock},
};

/// Fixed pool of user frames.
///
/// Frame contents are *not* cleared on allocation, the same way a real page
/// allocator hands out whatever the previous owner left behind.
pub struct UserPool {
    frames: Vec<Mutex<Box<[u8; PAGE_SIZE]>>>,
    used: Mutex<BitArray>,
}

impl UserPool {
    pub fn new(frame_count: usize) -> Self {
        Self {
            frames: (0..frame_count)
                .map(|_| Mutex::new(Box::new([0u8; PAGE_SIZE])))
                .collect(),
            used: Mutex::new(BitArray::new(frame_count)),
        }
    }

    /// Number of frames that are currently handed out
    pub fn used_frames(&self) -> usize {
        lock(&self.used).count_set()
    }
}

impl PhysicalMemoryModule for UserPool {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn alloc_user_page(&self) -> Option<PhysFrame> {
        lock(&self.used).scan_and_flip().map(PhysFrame::new)
    }

    fn free_user_page(&self, frame: PhysFrame) {
        let mut used = lock(&self.used);
        assert!(
            frame.number() < used.len() && used.is_set(frame.number()),
            "freeing frame {} which is not allocated",
            frame.number()
        );
        used.set(false, frame.number());
    }

    fn with_frame<R, F: FnOnce(&mut [u8; PAGE_SIZE]) -> R>(&self, frame: PhysFrame, f: F) -> R {
        let mut bytes = lock(&self.frames[frame.number()]);
        f(&mut bytes)
    }
}
