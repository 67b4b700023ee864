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

use core::fmt;
use static_assertions::const_assert_eq;

/// Bytes per virtual page and per physical frame
pub const PAGE_SIZE: usize = 4096;

/// Bytes per disk sector
pub const SECTOR_SIZE: usize = 512;

/// Sectors that make up one swap slot
pub const SECTORS_PER_SLOT: usize = PAGE_SIZE / SECTOR_SIZE;

const_assert_eq!(PAGE_SIZE % SECTOR_SIZE, 0);
const_assert_eq!(PAGE_SIZE & (PAGE_SIZE - 1), 0);

#[inline]
pub const fn is_page_aligned(address: usize) -> bool {
    address % PAGE_SIZE == 0
}

/// Page aligned virtual address.
///
/// Used as the key of a process's page table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPage(usize);

impl VirtualPage {
    /// Rounds `address` down to its page boundary
    #[inline]
    pub const fn containing(address: usize) -> Self {
        Self(address & !(PAGE_SIZE - 1))
    }

    /// Returns `None` if `address` is not page aligned
    #[inline]
    pub const fn from_aligned(address: usize) -> Option<Self> {
        if is_page_aligned(address) {
            Some(Self(address))
        } else {
            None
        }
    }

    #[inline]
    pub const fn address(self) -> usize {
        self.0
    }

    /// Page `count` pages above this one, `None` on overflow
    #[inline]
    pub fn offset(self, count: usize) -> Option<Self> {
        count
            .checked_mul(PAGE_SIZE)
            .and_then(|bytes| self.0.checked_add(bytes))
            .map(Self)
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage({:#x})", self.0)
    }
}

/// Physical frame number.
///
/// The number doubles as the stable index of the frame inside the frame table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysFrame(usize);

impl PhysFrame {
    #[inline]
    pub const fn new(number: usize) -> Self {
        Self(number)
    }

    #[inline]
    pub const fn number(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn physical_address(self) -> usize {
        self.0 * PAGE_SIZE
    }
}
