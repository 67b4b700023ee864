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

/// Lowest address a user program may touch
pub const USER_BASE: usize = 0x0804_8000;

/// First kernel address, user space lies below it
pub const PHYS_BASE: usize = 0xC000_0000;

/// Size of the reserved stack region below [`PHYS_BASE`]
pub const MAX_STACK_SIZE: usize = 1 << 23;

/// How far below the stack pointer a stack access may fault
/// (`PUSHA` writes 32 bytes below the current pointer)
pub const STACK_SLACK: usize = 32;

/// Address space layout used by the pager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PagerConfig {
    /// Lowest valid user address
    pub user_base: usize,

    /// Top of user space (exclusive), the stack grows down from here
    pub user_top: usize,

    /// Maximum size of the stack region in bytes
    pub max_stack_size: usize,

    /// Allowed distance of a stack growth fault below the stack pointer
    pub stack_slack: usize,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            user_base: USER_BASE,
            user_top: PHYS_BASE,
            max_stack_size: MAX_STACK_SIZE,
            stack_slack: STACK_SLACK,
        }
    }
}

impl PagerConfig {
    /// Is `address` inside the user part of the address space?
    #[inline]
    pub fn is_user_address(&self, address: usize) -> bool {
        address >= self.user_base && address < self.user_top
    }

    /// Lowest address of the stack region
    #[inline]
    pub fn stack_limit(&self) -> usize {
        self.user_top.saturating_sub(self.max_stack_size)
    }

    /// Is `address` a legitimate stack access for a thread whose stack
    /// pointer currently is `stack_pointer`?
    pub fn is_stack_access(&self, address: usize, stack_pointer: usize) -> bool {
        address >= stack_pointer.saturating_sub(self.stack_slack)
            && address >= self.stack_limit()
            && address < self.user_top
    }
}
