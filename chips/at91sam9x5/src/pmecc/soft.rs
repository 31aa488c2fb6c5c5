// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! Software PMECC bank.
//!
//! [`SoftPmecc`] computes in `feed` what the real bank computes while the
//! page crosses the external bus: per-sector parity in the write direction,
//! per-odd-power remainders and the flagged-sector mask in the read
//! direction. Results are held in register-file shape, packed remainder
//! words included, so [`Pmecc`](super::Pmecc) cannot tell the difference.
//!
//! This is the bank used by the test suite. It also serves platforms
//! without the hardware block, at the price of the bit-serial divisions.

use core::cell::Cell;

use at91_cells::optional_cell::OptionalCell;

use super::codec::BchCodec;
use super::hw::{EccDirection, PmeccBank};
use super::{EccConfig, EccError, MAX_SECTORS, MAX_STRENGTH};

/// Remainder words per sector: two odd powers per word.
const REM_WORDS: usize = MAX_STRENGTH / 2;

/// Parity bytes per sector for the widest geometry, 14 * 24 bits.
const PARITY_BYTES: usize = 42;

pub struct SoftPmecc {
    codec: OptionalCell<BchCodec>,
    config: OptionalCell<EccConfig>,
    direction: Cell<EccDirection>,
    rem: Cell<[[u32; REM_WORDS]; MAX_SECTORS]>,
    parity: Cell<[[u8; PARITY_BYTES]; MAX_SECTORS]>,
    flagged: Cell<u32>,
    latency: Cell<u32>,
    remaining_busy: Cell<u32>,
}

impl SoftPmecc {
    pub fn new() -> SoftPmecc {
        SoftPmecc {
            codec: OptionalCell::empty(),
            config: OptionalCell::empty(),
            direction: Cell::new(EccDirection::Read),
            rem: Cell::new([[0; REM_WORDS]; MAX_SECTORS]),
            parity: Cell::new([[0; PARITY_BYTES]; MAX_SECTORS]),
            flagged: Cell::new(0),
            latency: Cell::new(0),
            remaining_busy: Cell::new(0),
        }
    }

    /// Report busy for the first `polls` status reads of every page. The
    /// default is zero; tests raise it to exercise the bounded wait.
    pub fn set_latency(&self, polls: u32) {
        self.latency.set(polls);
    }
}

impl Default for SoftPmecc {
    fn default() -> SoftPmecc {
        SoftPmecc::new()
    }
}

impl PmeccBank for SoftPmecc {
    fn configure(&self, config: &EccConfig) -> Result<(), EccError> {
        self.codec.set(BchCodec::new(
            config.sector_size.field(),
            config.strength.count(),
            config.sector_size.bytes(),
        ));
        self.config.set(*config);
        Ok(())
    }

    fn start(&self, direction: EccDirection) {
        self.direction.set(direction);
        self.flagged.set(0);
        self.remaining_busy.set(self.latency.get());
    }

    fn feed(&self, data: &[u8], spare: &[u8]) {
        let codec = match self.codec.get() {
            Some(codec) => codec,
            None => return,
        };
        let config = match self.config.get() {
            Some(config) => config,
            None => return,
        };

        let sector_bytes = config.sector_size.bytes();
        let eb = codec.ecc_bytes();
        match self.direction.get() {
            EccDirection::Write => {
                let mut parity = self.parity.get();
                for sector in 0..config.sectors {
                    let d = &data[sector * sector_bytes..][..sector_bytes];
                    codec.encode(d, &mut parity[sector][..eb]);
                }
                self.parity.set(parity);
            }
            EccDirection::Read => {
                let mut words = self.rem.get();
                let mut flagged = 0;
                for sector in 0..config.sectors {
                    let d = &data[sector * sector_bytes..][..sector_bytes];
                    let e = &spare[config.ecc_offset + sector * eb..][..eb];
                    let mut rem = [0u32; MAX_STRENGTH];
                    if codec.remainders(d, e, &mut rem) {
                        flagged |= 1 << sector;
                    }
                    for (w, word) in words[sector].iter_mut().enumerate() {
                        let lo = rem[2 * w] & 0xffff;
                        let hi = rem[2 * w + 1] & 0xffff;
                        *word = (hi << 16) | lo;
                    }
                }
                self.rem.set(words);
                self.flagged.set(flagged);
            }
        }
    }

    fn is_busy(&self) -> bool {
        let left = self.remaining_busy.get();
        if left > 0 {
            self.remaining_busy.set(left - 1);
            true
        } else {
            false
        }
    }

    fn error_sectors(&self) -> u32 {
        self.flagged.get()
    }

    fn remainder(&self, sector: usize, index: usize) -> u32 {
        self.rem.get()[sector][index]
    }

    fn parity(&self, sector: usize, index: usize) -> u8 {
        self.parity.get()[sector][index]
    }
}
