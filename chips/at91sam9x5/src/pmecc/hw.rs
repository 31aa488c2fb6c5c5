// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! Interface between the correction engine and a PMECC register bank.
//!
//! The engine never touches registers directly. Everything it needs from
//! the hardware is behind [`PmeccBank`], so boards hand it the real
//! memory-mapped bank ([`MmioPmecc`](super::regs::MmioPmecc)) while tests
//! and ECC-less platforms hand it the software datapath
//! ([`SoftPmecc`](super::soft::SoftPmecc)).

use super::{EccConfig, EccError};

/// Which way a page is moving through the checker.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EccDirection {
    Read,
    Write,
}

/// One PMECC bank: the checker datapath plus the per-sector parity and
/// remainder register files.
///
/// Calls arrive in a fixed order per page: `start`, `feed`, `is_busy`
/// until idle, then `parity` (writes) or `error_sectors` and `remainder`
/// (reads). Implementations may ignore `feed` when the real datapath
/// snoops the external bus.
pub trait PmeccBank {
    /// Program the bank for a geometry. Called once, before the first page.
    fn configure(&self, config: &EccConfig) -> Result<(), EccError>;

    /// Reset the datapath and arm it for one page.
    fn start(&self, direction: EccDirection);

    /// Present the page passing the checker. `spare` is empty in the write
    /// direction, where parity does not exist yet.
    fn feed(&self, data: &[u8], spare: &[u8]);

    /// True while the datapath is still digesting the page.
    fn is_busy(&self) -> bool;

    /// Bitmask of sectors whose remainders came out nonzero, bit n for
    /// sector n.
    fn error_sectors(&self) -> u32;

    /// One packed remainder word for a sector: two 16-bit remainders of
    /// consecutive odd alpha powers, lower power in the low half.
    fn remainder(&self, sector: usize, index: usize) -> u32;

    /// One computed parity byte for a sector, in stored order.
    fn parity(&self, sector: usize, index: usize) -> u8;
}
