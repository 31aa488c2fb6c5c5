// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! Intrusive singly linked list used for the message queue.
//!
//! Nodes carry their own link, so queuing allocates nothing: a node is a
//! borrowed `&'a T` and membership lasts until it is popped. One node can
//! be on at most one list at a time.

use core::cell::Cell;

pub(crate) struct ListLink<'a, T: 'a + ?Sized>(Cell<Option<&'a T>>);

impl<'a, T: ?Sized> ListLink<'a, T> {
    pub(crate) const fn empty() -> ListLink<'a, T> {
        ListLink(Cell::new(None))
    }

    fn get(&self) -> Option<&'a T> {
        self.0.get()
    }

    fn set(&self, next: Option<&'a T>) {
        self.0.set(next);
    }
}

pub(crate) trait ListNode<'a, T: ?Sized> {
    fn next(&'a self) -> &'a ListLink<'a, T>;
}

pub(crate) struct List<'a, T: 'a + ?Sized + ListNode<'a, T>> {
    head: ListLink<'a, T>,
}

impl<'a, T: 'a + ?Sized + ListNode<'a, T>> List<'a, T> {
    pub(crate) const fn new() -> List<'a, T> {
        List {
            head: ListLink::empty(),
        }
    }

    pub(crate) fn head(&self) -> Option<&'a T> {
        self.head.get()
    }

    pub(crate) fn push_tail(&self, node: &'a T) {
        node.next().set(None);
        match self.head.get() {
            None => self.head.set(Some(node)),
            Some(first) => {
                let mut last = first;
                while let Some(next) = last.next().get() {
                    last = next;
                }
                last.next().set(Some(node));
            }
        }
    }

    pub(crate) fn pop_head(&self) -> Option<&'a T> {
        let removed = self.head.get();
        if let Some(node) = removed {
            self.head.set(node.next().get());
            node.next().set(None);
        }
        removed
    }
}
