// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! Peripheral driver cores for the Atmel AT91SAM9x5 family (SAM9G15/G25/G35,
//! SAM9X25/X35).
//!
//! Two independent engines live here:
//!
//! - [`pmecc`]: the Programmable Multibit Error Correcting Code controller,
//!   a BCH encoder/decoder used behind the static memory controller to
//!   protect NAND pages. Parity generation and remainder capture are
//!   hardware concerns reached through a trait; the syndrome, locator and
//!   root-search arithmetic runs here in software.
//! - [`spi`]: the serial peripheral interface master, driving queued
//!   multi-transfer messages over PIO or DMA with interrupt-fed progress
//!   and deferred completion handling.
//!
//! Both engines are written against narrow hardware traits so boards wire
//! in memory-mapped register blocks while tests substitute simulated
//! peripherals. Driver state lives in [`Cell`](core::cell::Cell)-family
//! types and every entry point takes `&self`: callers must keep each engine
//! instance on a single execution context, with interrupt entry points
//! recording state for a later `service()` pass rather than re-entering
//! engine logic.

#![cfg_attr(not(test), no_std)]

pub mod pmecc;
pub mod spi;

mod static_ref;
pub use static_ref::StaticRef;

#[cfg(test)]
mod tests;
