// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! A shared cell holding a mutable reference that can be borrowed one
//! user at a time.

use core::cell::Cell;

/// A cell that owns an optional `&'a mut T` and lends it out dynamically.
///
/// Several holders may keep a `&TakeCell`, but the wrapped mutable
/// reference is only reachable by taking it out (leaving the cell empty)
/// or by borrowing it for the duration of a closure with [`map`].
/// Taking from an empty cell yields `None` instead of aliasing.
///
/// [`map`]: TakeCell::map
pub struct TakeCell<'a, T: 'a + ?Sized> {
    val: Cell<Option<&'a mut T>>,
}

impl<'a, T: ?Sized> TakeCell<'a, T> {
    pub const fn empty() -> TakeCell<'a, T> {
        TakeCell {
            val: Cell::new(None),
        }
    }

    pub const fn new(value: &'a mut T) -> TakeCell<'a, T> {
        TakeCell {
            val: Cell::new(Some(value)),
        }
    }

    pub fn is_none(&self) -> bool {
        let inner = self.take();
        let result = inner.is_none();
        self.val.set(inner);
        result
    }

    /// Remove the wrapped reference, leaving the cell empty. Returns
    /// `None` if the reference is currently taken elsewhere.
    pub fn take(&self) -> Option<&'a mut T> {
        self.val.replace(None)
    }

    /// Store `val` and hand back the previous content, if any.
    pub fn replace(&self, val: &'a mut T) -> Option<&'a mut T> {
        self.val.replace(Some(val))
    }

    /// Borrow the content for the duration of `closure`, if the cell is
    /// not empty. The content is back in the cell when this returns.
    ///
    /// ```
    /// use at91_cells::take_cell::TakeCell;
    ///
    /// let mut scratch = [0u8; 4];
    /// let cell = TakeCell::new(&mut scratch[..]);
    /// cell.map(|buf| buf[0] = 0xa5);
    /// assert_eq!(cell.take().unwrap()[0], 0xa5);
    /// ```
    pub fn map<F, R>(&self, closure: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let maybe_val = self.take();
        maybe_val.map(|mut val| {
            let res = closure(&mut val);
            self.replace(val);
            res
        })
    }
}
