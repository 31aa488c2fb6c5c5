// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! A `Cell<Option<T>>` wrapper with option-shaped accessors.

use core::cell::Cell;

/// A cell holding an optional value.
///
/// Spelled-out `Cell<Option<T>>` state reads poorly at call sites
/// (`cell.set(Some(x))`, `cell.get().map(...)`); this wrapper folds the
/// `Option` handling into the method set. Used for client references,
/// in-flight operation records, and similar maybe-present driver state.
pub struct OptionalCell<T> {
    value: Cell<Option<T>>,
}

impl<T> OptionalCell<T> {
    pub const fn empty() -> OptionalCell<T> {
        OptionalCell {
            value: Cell::new(None),
        }
    }

    /// Store `val` in the cell.
    pub fn set(&self, val: T) {
        self.value.set(Some(val));
    }

    /// Remove and return the content, leaving the cell empty.
    pub fn take(&self) -> Option<T> {
        self.value.take()
    }

    /// Empty the cell.
    pub fn clear(&self) {
        self.value.set(None);
    }

    pub fn is_some(&self) -> bool {
        let inner = self.value.take();
        let result = inner.is_some();
        self.value.set(inner);
        result
    }

    pub fn is_none(&self) -> bool {
        !self.is_some()
    }
}

impl<T: Copy> OptionalCell<T> {
    /// Return a copy of the content, if any.
    pub fn get(&self) -> Option<T> {
        self.value.get()
    }

    /// Call `closure` with a copy of the content, if any.
    pub fn map<F, R>(&self, closure: F) -> Option<R>
    where
        F: FnOnce(T) -> R,
    {
        self.value.get().map(closure)
    }
}
