// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! Software model of the PMECC parity and remainder datapath.
//!
//! The controller divides each sector, viewed as a polynomial over GF(2)
//! with the first bit on the bus as the highest-degree coefficient, by the
//! BCH generator polynomial (writes) or by the minimal polynomial of each
//! odd power of alpha (reads). [`BchCodec`] reproduces both divisions
//! bit-serially, which lets [`SoftPmecc`](super::soft::SoftPmecc) stand in
//! for the register bank and lets tests fabricate spare areas that the
//! real hardware would accept.
//!
//! Within a sector's byte stream, bit `k` of the codeword is bit `k % 8`
//! of byte `k / 8`, so a located root at stream position `k` is exactly
//! the flip the correction step applies.

use super::gf::Field;
use super::MAX_STRENGTH;

/// u64 limbs needed for the widest generator polynomial, degree 14 * 24.
const GEN_LIMBS: usize = 6;

/// Coefficient buffer for one minimal polynomial, degree at most 14.
const MIN_POLY_COEFFS: usize = 16;

/// Parity generator and remainder calculator for one PMECC geometry.
#[derive(Clone, Copy)]
pub(crate) struct BchCodec {
    field: Field,
    strength: usize,
    sector_bytes: usize,
    parity_bits: usize,
    /// Minimal polynomial of alpha^(2i+1), bit k holding the x^k coefficient.
    min_poly: [u32; MAX_STRENGTH],
    min_deg: [u32; MAX_STRENGTH],
    gen: [u64; GEN_LIMBS],
    gen_deg: usize,
}

impl BchCodec {
    pub(crate) fn new(field: Field, strength: usize, sector_bytes: usize) -> BchCodec {
        debug_assert!(strength <= MAX_STRENGTH);
        let mut codec = BchCodec {
            field,
            strength,
            sector_bytes,
            parity_bits: field.dim() as usize * strength,
            min_poly: [0; MAX_STRENGTH],
            min_deg: [0; MAX_STRENGTH],
            gen: [0; GEN_LIMBS],
            gen_deg: 0,
        };
        codec.gen[0] = 1;

        // The generator is the product of the distinct minimal polynomials
        // of alpha^1, alpha^3, .. alpha^(2t-1). Two odd powers never share
        // a conjugacy class for the supported geometries, but dedupe by
        // class representative so a collision cannot double a factor.
        let mut reps = [0u32; MAX_STRENGTH];
        let mut rep_count = 0;
        for i in 0..strength {
            let exp = (2 * i + 1) as u32;
            let (mask, deg, rep) = minimal_poly(&field, exp);
            codec.min_poly[i] = mask;
            codec.min_deg[i] = deg;
            if reps[..rep_count].contains(&rep) {
                continue;
            }
            reps[rep_count] = rep;
            rep_count += 1;
            mul_small(&mut codec.gen, mask, deg);
            codec.gen_deg += deg as usize;
        }
        debug_assert_eq!(codec.gen_deg, codec.parity_bits);
        codec
    }

    /// Parity bit count, dim * strength. Stored parity is padded with zero
    /// bits up to the next byte boundary.
    pub(crate) fn parity_bits(&self) -> usize {
        self.parity_bits
    }

    pub(crate) fn ecc_bytes(&self) -> usize {
        (self.parity_bits + 7) / 8
    }

    /// Compute the parity bytes for one sector of data.
    pub(crate) fn encode(&self, data: &[u8], ecc: &mut [u8]) {
        debug_assert_eq!(data.len(), self.sector_bytes);
        debug_assert_eq!(ecc.len(), self.ecc_bytes());

        // Divide x^p * d(x) by the generator: feed every data coefficient,
        // highest degree first, then p zero coefficients for the shift.
        let mut rem = [0u64; GEN_LIMBS];
        for k in 0..data.len() * 8 {
            let bit = (data[k / 8] >> (k % 8)) & 1;
            self.gen_step(&mut rem, bit);
        }
        for _ in 0..self.parity_bits {
            self.gen_step(&mut rem, 0);
        }

        // Remainder coefficient x^d lands at stream position p - 1 - d,
        // which is bit (p - 1 - d) % 8 of parity byte (p - 1 - d) / 8.
        for byte in ecc.iter_mut() {
            *byte = 0;
        }
        for d in 0..self.gen_deg {
            if limb_bit(&rem, d) != 0 {
                let pos = self.parity_bits - 1 - d;
                ecc[pos / 8] |= 1 << (pos % 8);
            }
        }
    }

    /// Divide the received sector (data plus stored parity) by each odd
    /// power's minimal polynomial. Returns true when any remainder is
    /// nonzero, mirroring the per-sector bit of the status register.
    pub(crate) fn remainders(
        &self,
        data: &[u8],
        ecc: &[u8],
        out: &mut [u32; MAX_STRENGTH],
    ) -> bool {
        debug_assert_eq!(data.len(), self.sector_bytes);
        debug_assert_eq!(ecc.len(), self.ecc_bytes());

        let mut state = [0u32; MAX_STRENGTH];
        for k in 0..data.len() * 8 {
            let bit = u32::from((data[k / 8] >> (k % 8)) & 1);
            for i in 0..self.strength {
                state[i] = self.min_step(i, state[i], bit);
            }
        }
        for k in 0..self.parity_bits {
            let bit = u32::from((ecc[k / 8] >> (k % 8)) & 1);
            for i in 0..self.strength {
                state[i] = self.min_step(i, state[i], bit);
            }
        }

        let mut any = false;
        for i in 0..MAX_STRENGTH {
            out[i] = if i < self.strength { state[i] } else { 0 };
            any |= out[i] != 0;
        }
        any
    }

    /// Append one dividend coefficient to the generator division register.
    fn gen_step(&self, rem: &mut [u64; GEN_LIMBS], bit: u8) {
        let top = limb_bit(rem, self.gen_deg - 1);
        shl1(rem);
        rem[0] ^= u64::from(bit);
        if top != 0 {
            for (r, g) in rem.iter_mut().zip(self.gen.iter()) {
                *r ^= g;
            }
        }
    }

    /// Same division step against one minimal polynomial, scalar register.
    fn min_step(&self, i: usize, state: u32, bit: u32) -> u32 {
        let deg = self.min_deg[i];
        let top = (state >> (deg - 1)) & 1;
        let mut next = (state << 1) ^ bit;
        if top != 0 {
            next ^= self.min_poly[i];
        }
        next
    }
}

/// Minimal polynomial of alpha^exp over GF(2): the product of (x + alpha^s)
/// over the conjugacy class {exp, 2 exp, 4 exp, ..}. Returns the polynomial
/// as a bitmask, its degree, and the smallest exponent in the class.
fn minimal_poly(field: &Field, exp: u32) -> (u32, u32, u32) {
    let mut coeffs = [0u16; MIN_POLY_COEFFS];
    coeffs[0] = 1;
    let mut deg = 0usize;
    let mut rep = exp;

    let mut s = exp;
    loop {
        let root = field.alpha(s);
        coeffs[deg + 1] = coeffs[deg];
        let mut k = deg;
        while k >= 1 {
            coeffs[k] = coeffs[k - 1] ^ field.mul(root, coeffs[k]);
            k -= 1;
        }
        coeffs[0] = field.mul(root, coeffs[0]);
        deg += 1;

        s = (s * 2) % field.size();
        if s < rep {
            rep = s;
        }
        if s == exp {
            break;
        }
    }

    // Conjugate products collapse to GF(2) coefficients.
    let mut mask = 0u32;
    for (k, &c) in coeffs.iter().enumerate().take(deg + 1) {
        debug_assert!(c <= 1);
        if c == 1 {
            mask |= 1 << k;
        }
    }
    (mask, deg as u32, rep)
}

/// Multiply a limb polynomial in place by a small polynomial mask.
fn mul_small(acc: &mut [u64; GEN_LIMBS], mask: u32, deg: u32) {
    let src = *acc;
    *acc = [0; GEN_LIMBS];
    for k in 0..=deg as usize {
        if mask & (1 << k) != 0 {
            xor_shifted(acc, &src, k);
        }
    }
}

fn xor_shifted(dst: &mut [u64; GEN_LIMBS], src: &[u64; GEN_LIMBS], shift: usize) {
    let limbs = shift / 64;
    let bits = shift % 64;
    for i in 0..GEN_LIMBS - limbs {
        dst[i + limbs] ^= src[i] << bits;
        if bits > 0 && i + limbs + 1 < GEN_LIMBS {
            dst[i + limbs + 1] ^= src[i] >> (64 - bits);
        }
    }
}

fn shl1(limbs: &mut [u64; GEN_LIMBS]) {
    for i in (1..GEN_LIMBS).rev() {
        limbs[i] = (limbs[i] << 1) | (limbs[i - 1] >> 63);
    }
    limbs[0] <<= 1;
}

fn limb_bit(limbs: &[u64; GEN_LIMBS], bit: usize) -> u64 {
    (limbs[bit / 64] >> (bit % 64)) & 1
}
