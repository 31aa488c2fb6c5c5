// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! Galois field arithmetic for the PMECC BCH codec.
//!
//! The controller corrects within one of two fields depending on sector
//! size: GF(2^13) for 512-byte sectors and GF(2^14) for 1024-byte sectors.
//! Both log/antilog table pairs are built at compile time from the
//! primitive polynomials the hardware ROM tables encode, so a [`Field`]
//! handle is nothing more than a pair of `&'static` slices and costs
//! nothing to copy around.

/// Primitive polynomial for GF(2^13): x^13 + x^4 + x^3 + x + 1.
const POLY_13: u32 = 0x201b;

/// Primitive polynomial for GF(2^14): x^14 + x^10 + x^6 + x + 1.
const POLY_14: u32 = 0x4443;

/// Nonzero element count of GF(2^13).
pub const SIZE_13: u32 = (1 << 13) - 1;

/// Nonzero element count of GF(2^14).
pub const SIZE_14: u32 = (1 << 14) - 1;

struct Tables<const N: usize> {
    alpha_to: [u16; N],
    index_of: [u16; N],
}

impl<const N: usize> Tables<N> {
    const fn build(dim: u32, poly: u32) -> Tables<N> {
        let mut alpha_to = [0u16; N];
        let mut index_of = [0u16; N];
        let mut elem: u32 = 1;
        let mut exp = 0;
        while exp < N - 1 {
            alpha_to[exp] = elem as u16;
            index_of[elem as usize] = exp as u16;
            elem <<= 1;
            if elem & (1 << dim) != 0 {
                elem ^= poly;
            }
            exp += 1;
        }
        Tables { alpha_to, index_of }
    }
}

static TABLES_13: Tables<{ SIZE_13 as usize + 1 }> = Tables::build(13, POLY_13);
static TABLES_14: Tables<{ SIZE_14 as usize + 1 }> = Tables::build(14, POLY_14);

/// Handle onto one of the two PMECC fields.
#[derive(Clone, Copy)]
pub struct Field {
    dim: u32,
    size: u32,
    alpha_to: &'static [u16],
    index_of: &'static [u16],
}

impl Field {
    /// GF(2^13), used with 512-byte sectors.
    pub fn gf13() -> Field {
        Field {
            dim: 13,
            size: SIZE_13,
            alpha_to: &TABLES_13.alpha_to,
            index_of: &TABLES_13.index_of,
        }
    }

    /// GF(2^14), used with 1024-byte sectors.
    pub fn gf14() -> Field {
        Field {
            dim: 14,
            size: SIZE_14,
            alpha_to: &TABLES_14.alpha_to,
            index_of: &TABLES_14.index_of,
        }
    }

    /// Degree of the field extension (13 or 14).
    pub fn dim(&self) -> u32 {
        self.dim
    }

    /// Number of nonzero elements, 2^dim - 1.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// alpha^exp. The exponent is reduced modulo the field size, so callers
    /// may accumulate exponents without wrapping them first.
    #[inline]
    pub fn alpha(&self, exp: u32) -> u16 {
        self.alpha_to[(exp % self.size) as usize]
    }

    /// Discrete log of a nonzero element.
    #[inline]
    pub fn log(&self, elem: u16) -> u32 {
        debug_assert!(elem != 0);
        u32::from(self.index_of[elem as usize])
    }

    /// Field multiplication via the log/antilog tables.
    #[inline]
    pub fn mul(&self, a: u16, b: u16) -> u16 {
        if a == 0 || b == 0 {
            0
        } else {
            self.alpha(self.log(a) + self.log(b))
        }
    }
}
