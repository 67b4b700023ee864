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

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) mod bit_array;

/// efficient way to calculate: ceil(x / y)
#[inline]
pub(crate) const fn div_ceil(num: usize, div: usize) -> usize {
    (num + div - 1) / div
}

/// Locks `mutex`, ignoring poisoning.
///
/// A panicking fault handler must not take the rest of the kernel with it,
/// so the data behind a poisoned lock is used as is.
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
