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

use super::div_ceil;

/// Fixed size bitmap, one bit per slot.
pub(crate) struct BitArray {
    arr: Vec<u8>,
    bits: usize,
}

impl BitArray {
    /// Creates a bitmap with `bits` entries, all unset
    pub(crate) fn new(bits: usize) -> Self {
        BitArray {
            arr: vec![0; div_ceil(bits, 8)],
            bits,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.bits
    }

    pub(crate) fn set(&mut self, value: bool, index: usize) {
        debug_assert!(index < self.bits, "index {} out of range {}", index, self.bits);

        let arr_index = index / 8;
        let internal_index = index % 8;

        let item = &mut self.arr[arr_index];
        if value {
            // set bit
            *item |= 1u8 << internal_index;
        } else {
            // unset bit
            *item &= !(1u8 << internal_index);
        }
    }

    pub(crate) fn is_set(&self, index: usize) -> bool {
        debug_assert!(index < self.bits, "index {} out of range {}", index, self.bits);

        let arr_index = index / 8;
        let internal_index = index % 8;

        let item = self.arr[arr_index];
        (item & (1u8 << internal_index)) != 0
    }

    /// Finds the first unset bit, sets it and returns its index
    pub(crate) fn scan_and_flip(&mut self) -> Option<usize> {
        let (arr_index, item) = self
            .arr
            .iter()
            .enumerate()
            .find(|(_, item)| **item != u8::MAX)?;

        let index = arr_index * 8 + item.trailing_ones() as usize;
        if index >= self.bits {
            // only padding bits of the last byte are free
            return None;
        }

        self.set(true, index);
        Some(index)
    }

    /// Number of set bits
    pub(crate) fn count_set(&self) -> usize {
        self.arr.iter().map(|item| item.count_ones() as usize).sum()
    }
}
