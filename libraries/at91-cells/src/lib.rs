// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! Interior-mutability cell types for single-threaded driver state.
//!
//! Driver objects in this workspace are shared by immutable reference
//! between an interrupt entry point, a deferred-work entry point, and
//! client calls. These cells provide the small amount of mutability that
//! state needs without handing out overlapping `&mut` borrows.

#![no_std]

pub mod numeric_cell_ext;
pub mod optional_cell;
pub mod take_cell;
