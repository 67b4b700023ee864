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

//! Swap store: slot allocator on the swap disk.
//!
//! A slot is a run of [`SECTORS_PER_SLOT`] sectors holding exactly one page,
//! slot `i` starts at sector `i * SECTORS_PER_SLOT`. There is no on disk
//! header, the slot index is the whole addressing scheme.

use std::sync::Mutex;

use log::{debug, trace};

use crate::{
    address::{PAGE_SIZE, SECTORS_PER_SLOT, SECTOR_SIZE},
    modules::block_device::BlockDeviceModule,
    util::{bit_array::BitArray, lock},
};

/// Index of a swap slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwapSlot(usize);

impl SwapSlot {
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }

    #[inline]
    const fn first_sector(self) -> usize {
        self.0 * SECTORS_PER_SLOT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SwapError {
    #[error("no free swap slot left")]
    NoSpace,
    #[error("swap device failed while accessing slot {0}")]
    Device(usize),
}

struct SwapInner<D: BlockDeviceModule> {
    device: D,

    /// one bit per slot, set if the slot holds a page
    used: BitArray,
}

/// Page sized slot allocator on top of a block device.
///
/// Every operation takes the store's lock for the bitmap change together with
/// the sector transfer that belongs to it.
pub struct SwapStore<D: BlockDeviceModule> {
    inner: Mutex<SwapInner<D>>,
}

impl<D: BlockDeviceModule> SwapStore<D> {
    /// Takes over `device`, all slots start out free
    pub fn init(device: D) -> Self {
        let slots = device.sector_count() / SECTORS_PER_SLOT;
        debug!(
            "Swap store with {} slots ({} sectors)",
            slots,
            device.sector_count()
        );

        Self {
            inner: Mutex::new(SwapInner {
                device,
                used: BitArray::new(slots),
            }),
        }
    }

    /// Stores `frame` in a free slot and returns the slot.
    ///
    /// If the device fails, the slot is released again.
    pub fn write_out(&self, frame: &[u8; PAGE_SIZE]) -> Result<SwapSlot, SwapError> {
        let mut inner = lock(&self.inner);
        let slot = SwapSlot(inner.used.scan_and_flip().ok_or(SwapError::NoSpace)?);

        for (i, chunk) in frame.chunks_exact(SECTOR_SIZE).enumerate() {
            let mut sector = [0u8; SECTOR_SIZE];
            sector.copy_from_slice(chunk);

            if inner
                .device
                .write_sector(slot.first_sector() + i, &sector)
                .is_err()
            {
                inner.used.set(false, slot.index());
                return Err(SwapError::Device(slot.index()));
            }
        }

        trace!("Swapped out page to slot {}", slot.index());
        Ok(slot)
    }

    /// Copies the page stored in `slot` into `dest` and frees the slot.
    ///
    /// On a device error the slot stays in use.
    pub fn read_in(&self, slot: SwapSlot, dest: &mut [u8; PAGE_SIZE]) -> Result<(), SwapError> {
        let mut inner = lock(&self.inner);
        Self::assert_in_use(&inner, slot);

        for (i, chunk) in dest.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            let mut sector = [0u8; SECTOR_SIZE];
            inner
                .device
                .read_sector(slot.first_sector() + i, &mut sector)
                .map_err(|_| SwapError::Device(slot.index()))?;
            chunk.copy_from_slice(&sector);
        }

        inner.used.set(false, slot.index());
        trace!("Swapped in page from slot {}", slot.index());
        Ok(())
    }

    /// Frees `slot` without reading it
    pub fn free(&self, slot: SwapSlot) {
        let mut inner = lock(&self.inner);
        Self::assert_in_use(&inner, slot);
        inner.used.set(false, slot.index());
    }

    /// Number of slots that currently hold a page
    pub fn used_slots(&self) -> usize {
        lock(&self.inner).used.count_set()
    }

    /// Total number of slots
    pub fn slot_count(&self) -> usize {
        lock(&self.inner).used.len()
    }

    fn assert_in_use(inner: &SwapInner<D>, slot: SwapSlot) {
        assert!(
            slot.index() < inner.used.len() && inner.used.is_set(slot.index()),
            "swap slot {} is not in use",
            slot.index()
        );
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::SmallRng, RngCore, SeedableRng};

    use super::{SwapError, SwapStore};
    use crate::address::{PAGE_SIZE, SECTORS_PER_SLOT};
    use crate::modules::block_device::{test::get_test_device, MemoryBlockDevice};

    fn random_page(rand: &mut SmallRng) -> Box<[u8; PAGE_SIZE]> {
        let mut page = Box::new([0u8; PAGE_SIZE]);
        rand.fill_bytes(&mut page[..]);
        page
    }

    #[test]
    fn test_swap_round_trip() {
        let swap = SwapStore::init(get_test_device("test_swap_round_trip", 4 * SECTORS_PER_SLOT));
        let mut rand = SmallRng::seed_from_u64(876_234_987_123);

        assert_eq!(swap.slot_count(), 4);
        assert_eq!(swap.used_slots(), 0);

        let original = random_page(&mut rand);
        let slot = swap.write_out(&original).unwrap();
        assert_eq!(swap.used_slots(), 1);

        let mut restored = Box::new([0u8; PAGE_SIZE]);
        swap.read_in(slot, &mut restored).unwrap();
        assert_eq!(original[..], restored[..]);
        assert_eq!(swap.used_slots(), 0);
    }

    #[test]
    fn test_swap_slots_do_not_overlap() {
        let swap = SwapStore::init(get_test_device(
            "test_swap_slots_do_not_overlap",
            3 * SECTORS_PER_SLOT,
        ));
        let mut rand = SmallRng::seed_from_u64(1_254_789);

        let pages: Vec<_> = (0..3).map(|_| random_page(&mut rand)).collect();
        let slots: Vec<_> = pages.iter().map(|p| swap.write_out(p).unwrap()).collect();
        assert_eq!(swap.write_out(&pages[0]), Err(SwapError::NoSpace));

        // read them back in a different order
        for i in [1, 2, 0] {
            let mut restored = Box::new([0u8; PAGE_SIZE]);
            swap.read_in(slots[i], &mut restored).unwrap();
            assert_eq!(pages[i][..], restored[..]);
        }
        assert_eq!(swap.used_slots(), 0);
    }

    #[test]
    fn test_swap_free_reuses_slot() {
        let swap = SwapStore::init(MemoryBlockDevice::new(2 * SECTORS_PER_SLOT + 3));
        assert_eq!(swap.slot_count(), 2);

        let page = Box::new([7u8; PAGE_SIZE]);
        let first = swap.write_out(&page).unwrap();
        let second = swap.write_out(&page).unwrap();
        assert_ne!(first, second);

        swap.free(first);
        assert_eq!(swap.used_slots(), 1);
        assert_eq!(swap.write_out(&page).unwrap(), first);
    }

    #[test]
    fn test_swap_device_error_releases_slot() {
        let mut device = MemoryBlockDevice::new(SECTORS_PER_SLOT);
        device.set_fail_writes(true);
        let swap = SwapStore::init(device);

        let page = Box::new([1u8; PAGE_SIZE]);
        assert_eq!(swap.write_out(&page), Err(SwapError::Device(0)));
        assert_eq!(swap.used_slots(), 0);
    }

    #[test]
    #[should_panic]
    fn test_swap_double_free() {
        let swap = SwapStore::init(MemoryBlockDevice::new(SECTORS_PER_SLOT));
        let slot = swap.write_out(&Box::new([0u8; PAGE_SIZE])).unwrap();
        swap.free(slot);
        swap.free(slot);
    }
}
