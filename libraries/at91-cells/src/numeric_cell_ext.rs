// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! Arithmetic convenience methods for `Cell`s of numeric types.
//!
//! Turns `cell.set(cell.get() + 1)` into `cell.increment()` for counter
//! cells (statistics, in-flight tallies).

use core::cell::Cell;
use core::ops::Add;

pub trait NumericCellExt<T>
where
    T: Copy + Add,
{
    /// Add `val` to the stored value.
    fn add(&self, val: T);

    /// Add 1 to the stored value.
    fn increment(&self);
}

impl<T> NumericCellExt<T> for Cell<T>
where
    T: Copy + Add<Output = T> + From<usize>,
{
    fn add(&self, val: T) {
        self.set(self.get() + val);
    }

    fn increment(&self) {
        self.set(self.get() + T::from(1_usize));
    }
}
