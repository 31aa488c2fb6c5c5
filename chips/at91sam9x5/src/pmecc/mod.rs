// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! Programmable Multibit Error Correcting Code controller (PMECC).
//!
//! The PMECC sits behind the static memory controller and BCH-protects
//! NAND pages: on writes it derives parity for each sector, on reads it
//! captures the remainder of the received sector against the minimal
//! polynomial of each odd power of alpha. The hardware stops there.
//! Turning remainders into corrected bits - syndrome substitution, the
//! Berlekamp iteration for the error locator and the root search over the
//! sector - happens here in software, one flagged sector at a time.
//!
//! [`Pmecc`] drives one bank through the [`PmeccBank`](hw::PmeccBank)
//! trait. Pages are processed synchronously: `read_page` and `write_page`
//! poll the bank with a bounded budget and return [`EccError::Timeout`]
//! if it never settles, so a wedged engine surfaces as an error instead
//! of a hang.
//!
//! Geometry limits come from the hardware: sectors of 512 bytes over
//! GF(2^13) or 1024 bytes over GF(2^14), correction strengths of 2, 4, 8,
//! 12 or 24 bits per sector, and 1, 2, 4 or 8 sectors per page.

pub mod hw;
pub mod regs;
pub mod soft;

pub(crate) mod codec;
pub(crate) mod gf;

use core::cell::Cell;

use at91_cells::numeric_cell_ext::NumericCellExt;

use self::gf::Field;
use self::hw::{EccDirection, PmeccBank};

/// Strongest supported correction, errors per sector.
pub const MAX_STRENGTH: usize = 24;

/// Largest supported page, sectors.
pub const MAX_SECTORS: usize = 8;

/// Widest row of the locator table: degrees up to 2 * MAX_STRENGTH.
const SMU_WIDTH: usize = 2 * MAX_STRENGTH + 1;
const SMU_ROWS: usize = MAX_STRENGTH + 2;

/// Sector granularity of the checker. The sector size fixes the field.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SectorSize {
    S512,
    S1024,
}

impl SectorSize {
    pub fn bytes(self) -> usize {
        match self {
            SectorSize::S512 => 512,
            SectorSize::S1024 => 1024,
        }
    }

    pub(crate) fn field(self) -> Field {
        match self {
            SectorSize::S512 => Field::gf13(),
            SectorSize::S1024 => Field::gf14(),
        }
    }

    pub(crate) fn encoding(self) -> u32 {
        match self {
            SectorSize::S512 => 0,
            SectorSize::S1024 => 1,
        }
    }
}

/// Correctable bits per sector.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EccStrength {
    T2,
    T4,
    T8,
    T12,
    T24,
}

impl EccStrength {
    pub fn count(self) -> usize {
        match self {
            EccStrength::T2 => 2,
            EccStrength::T4 => 4,
            EccStrength::T8 => 8,
            EccStrength::T12 => 12,
            EccStrength::T24 => 24,
        }
    }

    pub(crate) fn encoding(self) -> u32 {
        match self {
            EccStrength::T2 => 0,
            EccStrength::T4 => 1,
            EccStrength::T8 => 2,
            EccStrength::T12 => 3,
            EccStrength::T24 => 4,
        }
    }
}

/// One NAND geometry as the checker sees it.
#[derive(Clone, Copy, Debug)]
pub struct EccConfig {
    pub sector_size: SectorSize,
    pub strength: EccStrength,
    /// Sectors per page: 1, 2, 4 or 8.
    pub sectors: usize,
    /// Spare area size in bytes.
    pub spare_size: usize,
    /// Offset of the stored ECC region within the spare area.
    pub ecc_offset: usize,
    /// Busy polls allowed before a page is declared stuck.
    pub busy_spins: u32,
}

impl EccConfig {
    pub fn page_bytes(&self) -> usize {
        self.sectors * self.sector_size.bytes()
    }

    /// Stored parity per sector: dim * strength bits, byte padded.
    pub fn ecc_bytes_per_sector(&self) -> usize {
        let bits = self.sector_size.field().dim() as usize * self.strength.count();
        (bits + 7) / 8
    }

    pub fn ecc_total_bytes(&self) -> usize {
        self.sectors * self.ecc_bytes_per_sector()
    }

    fn validate(&self) -> Result<(), EccError> {
        if !matches!(self.sectors, 1 | 2 | 4 | 8) {
            return Err(EccError::Config);
        }
        if self.ecc_offset + self.ecc_total_bytes() > self.spare_size {
            return Err(EccError::Config);
        }
        if self.busy_spins == 0 {
            return Err(EccError::Config);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EccError {
    /// Geometry rejected, or the bank cannot realize it.
    Config,
    /// Buffer lengths disagree with the configured geometry.
    Length,
    /// The bank stayed busy past the poll budget.
    Timeout,
    /// A sector holds more errors than the strength can locate.
    Uncorrectable,
}

/// Lifetime counters, mirroring what NAND stacks feed their bad-block
/// heuristics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EccStats {
    /// Total bit flips repaired.
    pub corrected: usize,
    /// Total sectors given up on.
    pub failed: usize,
}

/// The correction engine for one PMECC bank.
pub struct Pmecc<'a, B: PmeccBank> {
    bank: &'a B,
    config: EccConfig,
    field: Field,
    corrected: Cell<usize>,
    failed: Cell<usize>,
}

impl<'a, B: PmeccBank> Pmecc<'a, B> {
    pub fn new(bank: &'a B, config: EccConfig) -> Result<Pmecc<'a, B>, EccError> {
        config.validate()?;
        bank.configure(&config)?;
        Ok(Pmecc {
            bank,
            config,
            field: config.sector_size.field(),
            corrected: Cell::new(0),
            failed: Cell::new(0),
        })
    }

    pub fn config(&self) -> &EccConfig {
        &self.config
    }

    pub fn stats(&self) -> EccStats {
        EccStats {
            corrected: self.corrected.get(),
            failed: self.failed.get(),
        }
    }

    /// Run a page through the checker in the write direction and place the
    /// per-sector parity into the spare area at the configured offset.
    pub fn write_page(&self, data: &[u8], spare: &mut [u8]) -> Result<(), EccError> {
        self.check_lengths(data.len(), spare.len())?;

        self.bank.start(EccDirection::Write);
        self.bank.feed(data, &[]);
        self.wait_ready()?;

        let eb = self.config.ecc_bytes_per_sector();
        for sector in 0..self.config.sectors {
            let base = self.config.ecc_offset + sector * eb;
            for i in 0..eb {
                spare[base + i] = self.bank.parity(sector, i);
            }
        }
        Ok(())
    }

    /// Verify a page read from flash and repair it in place, stored parity
    /// included. Returns the number of bit flips repaired.
    ///
    /// Sectors beyond help are left untouched; once every flagged sector
    /// has been visited the page reports [`EccError::Uncorrectable`] if any
    /// of them failed.
    pub fn read_page(&self, data: &mut [u8], spare: &mut [u8]) -> Result<usize, EccError> {
        self.check_lengths(data.len(), spare.len())?;

        self.bank.start(EccDirection::Read);
        self.bank.feed(data, spare);
        self.wait_ready()?;

        // An erased page carries no parity: every stored ECC byte still
        // reads 0xff. Nothing to verify.
        let off = self.config.ecc_offset;
        let total = self.config.ecc_total_bytes();
        if spare[off..off + total].iter().all(|&b| b == 0xff) {
            return Ok(0);
        }

        let flagged = self.bank.error_sectors();
        let sector_bytes = self.config.sector_size.bytes();
        let eb = self.config.ecc_bytes_per_sector();

        let mut corrected = 0;
        let mut failed = 0;
        for sector in 0..self.config.sectors {
            if flagged & (1 << sector) == 0 {
                continue;
            }
            let data_slice = &mut data[sector * sector_bytes..][..sector_bytes];
            let ecc_slice = &mut spare[off + sector * eb..][..eb];
            match self.correct_sector(sector, data_slice, ecc_slice) {
                Ok(n) => corrected += n,
                Err(EccError::Uncorrectable) => {
                    log::warn!("pmecc: sector {} has too many bit flips", sector);
                    failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if corrected > 0 {
            log::debug!("pmecc: corrected {} bit flips", corrected);
            self.corrected.add(corrected);
        }
        if failed > 0 {
            self.failed.add(failed);
            return Err(EccError::Uncorrectable);
        }
        Ok(corrected)
    }

    fn check_lengths(&self, data: usize, spare: usize) -> Result<(), EccError> {
        if data != self.config.page_bytes() || spare != self.config.spare_size {
            return Err(EccError::Length);
        }
        Ok(())
    }

    fn wait_ready(&self) -> Result<(), EccError> {
        let mut spins = self.config.busy_spins;
        while self.bank.is_busy() {
            if spins == 0 {
                log::error!("pmecc: engine stuck busy");
                return Err(EccError::Timeout);
            }
            spins -= 1;
            core::hint::spin_loop();
        }
        Ok(())
    }

    /// Decode one flagged sector: remainders to syndromes, syndromes to a
    /// locator, locator roots to bit positions, positions to flips.
    fn correct_sector(
        &self,
        sector: usize,
        data: &mut [u8],
        ecc: &mut [u8],
    ) -> Result<usize, EccError> {
        let strength = self.config.strength.count();
        let mut dec = SectorDecoder::new(self.field, strength);

        dec.load_remainders(self.bank, sector);
        dec.substitute();
        dec.derive_locator()?;

        let mut roots = [0u32; MAX_STRENGTH];
        let count = dec.locate(data.len() * 8, &mut roots)?;

        // All positions proven in range before anything is flipped, so a
        // failed sector is returned exactly as it was read.
        let span_bytes = data.len() + ecc.len();
        if roots[..count].iter().any(|&pos| pos as usize / 8 >= span_bytes) {
            return Err(EccError::Uncorrectable);
        }
        for &pos in roots[..count].iter() {
            let byte = pos as usize / 8;
            let bit = pos as usize % 8;
            if byte < data.len() {
                data[byte] ^= 1 << bit;
            } else {
                ecc[byte - data.len()] ^= 1 << bit;
            }
        }
        Ok(count)
    }
}

/// Decode state for one sector.
///
/// Syndromes and locator rows are indexed the way the register-level
/// documentation numbers them: si[1..=2t], one smu row per Berlekamp
/// iteration, degrees kept doubled in lmu.
struct SectorDecoder {
    field: Field,
    strength: usize,
    partial: [u16; SMU_WIDTH],
    si: [u16; SMU_WIDTH],
    smu: [[u16; SMU_WIDTH]; SMU_ROWS],
    lmu: [u16; SMU_ROWS],
    mu: [i32; SMU_ROWS],
    dmu: [u16; SMU_ROWS],
    delta: [i32; SMU_ROWS],
    sigma_deg: usize,
}

impl SectorDecoder {
    fn new(field: Field, strength: usize) -> SectorDecoder {
        SectorDecoder {
            field,
            strength,
            partial: [0; SMU_WIDTH],
            si: [0; SMU_WIDTH],
            smu: [[0; SMU_WIDTH]; SMU_ROWS],
            lmu: [0; SMU_ROWS],
            mu: [0; SMU_ROWS],
            dmu: [0; SMU_ROWS],
            delta: [0; SMU_ROWS],
            sigma_deg: 0,
        }
    }

    /// Pull the packed remainder words for one sector apart: two 16-bit
    /// remainders per word, the lower odd power in the low half.
    fn load_remainders<B: PmeccBank>(&mut self, bank: &B, sector: usize) {
        for i in 0..self.strength {
            let word = bank.remainder(sector, i / 2);
            let half = if i % 2 == 0 { word } else { word >> 16 };
            self.partial[2 * i + 1] = (half & 0xffff) as u16;
        }
    }

    /// Evaluate each remainder at its odd power of alpha to get the odd
    /// syndromes; even syndromes are squares of their half-index ones.
    fn substitute(&mut self) {
        let dim = self.field.dim() as usize;
        let mut i = 1;
        while i < 2 * self.strength {
            self.si[i] = 0;
            for j in 0..dim {
                if self.partial[i] & (1 << j) != 0 {
                    self.si[i] ^= self.field.alpha((i * j) as u32);
                }
            }
            i += 2;
        }
        let mut i = 2;
        while i <= 2 * self.strength {
            let half = self.si[i / 2];
            self.si[i] = if half == 0 {
                0
            } else {
                self.field.alpha(2 * self.field.log(half))
            };
            i += 2;
        }
    }

    /// Berlekamp iteration over the syndromes. The locator ends up in the
    /// final smu row, either through early termination once enough
    /// consecutive discrepancies vanish, or after all rows run.
    fn derive_locator(&mut self) -> Result<(), EccError> {
        let tt = self.strength;
        let field = self.field;
        let last = tt + 1;

        // Row 0 is the formal lead-in row, row 1 starts from S1.
        self.mu[0] = -1;
        self.smu[0][0] = 1;
        self.dmu[0] = 1;
        self.lmu[0] = 0;
        self.delta[0] = (self.mu[0] * 2 - i32::from(self.lmu[0])) >> 1;

        self.mu[1] = 0;
        self.smu[1][0] = 1;
        self.dmu[1] = self.si[1];
        self.lmu[1] = 0;
        self.delta[1] = (self.mu[1] * 2 - i32::from(self.lmu[1])) >> 1;

        let mut zero_streak = 0i32;

        for i in 1..=tt {
            self.mu[i + 1] = (i as i32) << 1;

            if self.dmu[i] == 0 {
                zero_streak += 1;

                // With this many zero discrepancies in a row the locator
                // cannot change any more; adopt it and stop.
                let room = tt as i32 - i32::from(self.lmu[i] >> 1) - 1;
                let needed = room / 2 + if room & 1 != 0 { 2 } else { 1 };
                if zero_streak == needed {
                    self.smu[last] = self.smu[i];
                    self.lmu[last] = self.lmu[i];
                    self.sigma_deg = (self.lmu[last] >> 1) as usize;
                    return Ok(());
                }

                // Zero discrepancy: carry the row forward unchanged.
                self.smu[i + 1] = self.smu[i];
                self.lmu[i + 1] = self.lmu[i];
            } else {
                // Correct with the earlier nonzero-discrepancy row of
                // largest delta.
                let mut ro = 0;
                let mut largest = -(MAX_STRENGTH as i32);
                for j in 0..i {
                    if self.dmu[j] != 0 && self.delta[j] > largest {
                        largest = self.delta[j];
                        ro = j;
                    }
                }

                let diff = (self.mu[i] - self.mu[ro]) as usize;
                let lro = (self.lmu[ro] >> 1) as usize;
                let li = (self.lmu[i] >> 1) as usize;

                self.lmu[i + 1] = if li > lro + diff {
                    self.lmu[i]
                } else {
                    ((lro + diff) * 2) as u16
                };

                if lro + diff >= SMU_WIDTH {
                    return Err(EccError::Uncorrectable);
                }
                self.smu[i + 1].fill(0);
                for k in 0..=lro {
                    if self.smu[ro][k] == 0 {
                        continue;
                    }
                    let exp = field.log(self.dmu[i])
                        + (field.size() - field.log(self.dmu[ro]))
                        + field.log(self.smu[ro][k]);
                    self.smu[i + 1][k + diff] = field.alpha(exp);
                }
                for k in 0..=li {
                    self.smu[i + 1][k] ^= self.smu[i][k];
                }
            }

            self.delta[i + 1] = (self.mu[i + 1] * 2 - i32::from(self.lmu[i + 1])) >> 1;

            // The last row needs no follow-up discrepancy.
            if i < tt {
                for k in 0..=(self.lmu[i + 1] >> 1) as usize {
                    if k == 0 {
                        self.dmu[i + 1] = self.si[2 * i + 1];
                    } else if self.smu[i + 1][k] != 0 && self.si[2 * i + 1 - k] != 0 {
                        let exp =
                            field.log(self.smu[i + 1][k]) + field.log(self.si[2 * i + 1 - k]);
                        self.dmu[i + 1] ^= field.alpha(exp);
                    }
                }
            }
        }

        self.sigma_deg = (self.lmu[last] >> 1) as usize;
        Ok(())
    }

    /// Walk every bit position of the sector (data plus parity) and test
    /// it against the locator. The sector is correctable exactly when the
    /// number of roots found matches the locator degree.
    fn locate(&self, sector_bits: usize, roots: &mut [u32; MAX_STRENGTH]) -> Result<usize, EccError> {
        let deg = self.sigma_deg;
        if deg == 0 || deg > self.strength {
            return Err(EccError::Uncorrectable);
        }

        let field = self.field;
        let n = field.size();
        let sigma = &self.smu[self.strength + 1];
        let span = sector_bits + field.dim() as usize * self.strength;

        // Stream position 0 carries the highest-degree coefficient,
        // alpha^(span-1), so its root candidate is alpha^(n - (span - 1)).
        // Each following position multiplies term j by alpha^j.
        let e0 = n - ((span as u32 - 1) % n);
        let mut acc = [0u16; MAX_STRENGTH + 1];
        for j in 0..=deg {
            acc[j] = field.mul(sigma[j], field.alpha(e0 * j as u32));
        }

        let mut count = 0;
        for pos in 0..span {
            let mut sum = 0;
            for &term in acc[..=deg].iter() {
                sum ^= term;
            }
            if sum == 0 {
                if count == deg {
                    return Err(EccError::Uncorrectable);
                }
                roots[count] = pos as u32;
                count += 1;
            }
            for (j, term) in acc[1..=deg].iter_mut().enumerate() {
                *term = field.mul(*term, field.alpha(j as u32 + 1));
            }
        }

        if count == deg {
            Ok(count)
        } else {
            Err(EccError::Uncorrectable)
        }
    }
}
