// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! Memory-mapped SPI controller.

use core::cell::Cell;

use tock_registers::fields::FieldValue;
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

use crate::static_ref::StaticRef;

use super::hw::{ChipSelect, CsSettings, SpiHardware, SpiStatus};

register_structs! {
    pub SpiRegisters {
        (0x00 => cr: WriteOnly<u32, CR::Register>),
        (0x04 => mr: ReadWrite<u32, MR::Register>),
        (0x08 => rdr: ReadOnly<u32, RDR::Register>),
        (0x0c => tdr: WriteOnly<u32, TDR::Register>),
        (0x10 => sr: ReadOnly<u32, SR::Register>),
        (0x14 => ier: WriteOnly<u32, INT::Register>),
        (0x18 => idr: WriteOnly<u32, INT::Register>),
        (0x1c => imr: ReadOnly<u32, INT::Register>),
        (0x20 => _reserved0),
        (0x30 => csr: [ReadWrite<u32, CSR::Register>; 4]),
        (0x40 => @END),
    }
}

register_bitfields![u32,
    CR [
        SPIEN OFFSET(0) NUMBITS(1) [],
        SPIDIS OFFSET(1) NUMBITS(1) [],
        SWRST OFFSET(7) NUMBITS(1) [],
        LASTXFER OFFSET(24) NUMBITS(1) []
    ],
    MR [
        MSTR OFFSET(0) NUMBITS(1) [],
        PS OFFSET(1) NUMBITS(1) [],
        PCSDEC OFFSET(2) NUMBITS(1) [],
        MODFDIS OFFSET(4) NUMBITS(1) [],
        WDRBT OFFSET(5) NUMBITS(1) [],
        LLB OFFSET(7) NUMBITS(1) [],
        PCS OFFSET(16) NUMBITS(4) [],
        DLYBCS OFFSET(24) NUMBITS(8) []
    ],
    RDR [
        RD OFFSET(0) NUMBITS(16) []
    ],
    TDR [
        TD OFFSET(0) NUMBITS(16) [],
        PCS OFFSET(16) NUMBITS(4) [],
        LASTXFER OFFSET(24) NUMBITS(1) []
    ],
    SR [
        RDRF OFFSET(0) NUMBITS(1) [],
        TDRE OFFSET(1) NUMBITS(1) [],
        MODF OFFSET(2) NUMBITS(1) [],
        OVRES OFFSET(3) NUMBITS(1) [],
        NSSR OFFSET(8) NUMBITS(1) [],
        TXEMPTY OFFSET(9) NUMBITS(1) [],
        UNDES OFFSET(10) NUMBITS(1) [],
        SPIENS OFFSET(16) NUMBITS(1) []
    ],
    INT [
        RDRF OFFSET(0) NUMBITS(1) [],
        TDRE OFFSET(1) NUMBITS(1) [],
        MODF OFFSET(2) NUMBITS(1) [],
        OVRES OFFSET(3) NUMBITS(1) [],
        NSSR OFFSET(8) NUMBITS(1) [],
        TXEMPTY OFFSET(9) NUMBITS(1) [],
        UNDES OFFSET(10) NUMBITS(1) []
    ],
    CSR [
        CPOL OFFSET(0) NUMBITS(1) [],
        NCPHA OFFSET(1) NUMBITS(1) [],
        CSNAAT OFFSET(2) NUMBITS(1) [],
        CSAAT OFFSET(3) NUMBITS(1) [],
        BITS OFFSET(4) NUMBITS(4) [],
        SCBR OFFSET(8) NUMBITS(8) [],
        DLYBS OFFSET(16) NUMBITS(8) [],
        DLYBCT OFFSET(24) NUMBITS(8) []
    ]
];

pub const SPI0_BASE: StaticRef<SpiRegisters> =
    unsafe { StaticRef::new(0xf000_0000 as *const SpiRegisters) };
pub const SPI1_BASE: StaticRef<SpiRegisters> =
    unsafe { StaticRef::new(0xf000_4000 as *const SpiRegisters) };

/// The real controller. Select lines are driven through MR.PCS with the
/// active device's image always loaded into CSR0, so the clock reaches its
/// idle polarity before the line asserts.
pub struct MmioSpi {
    registers: StaticRef<SpiRegisters>,
    images: [Cell<Option<CsSettings>>; 4],
    loops_per_us: u32,
}

impl MmioSpi {
    /// `loops_per_us` calibrates the coarse spin used for inter-transfer
    /// delays.
    pub const fn new(registers: StaticRef<SpiRegisters>, loops_per_us: u32) -> MmioSpi {
        MmioSpi {
            registers,
            images: [
                Cell::new(None),
                Cell::new(None),
                Cell::new(None),
                Cell::new(None),
            ],
            loops_per_us,
        }
    }

    fn csr_image(settings: CsSettings, hold: bool) -> FieldValue<u32, CSR::Register> {
        CSR::SCBR.val(u32::from(settings.scbr))
            + CSR::BITS.val(u32::from(settings.bits - 8))
            + CSR::CPOL.val(u32::from(settings.cpol))
            + CSR::NCPHA.val(u32::from(settings.ncpha))
            + CSR::CSAAT.val(u32::from(hold))
    }
}

impl SpiHardware for MmioSpi {
    fn init(&self) {
        let regs = self.registers;
        // Reset twice: the first reset can be swallowed right after boot.
        regs.cr.write(CR::SWRST::SET);
        regs.cr.write(CR::SWRST::SET);
        regs.mr
            .write(MR::MSTR::SET + MR::MODFDIS::SET + MR::PCS.val(0xf));
        regs.cr.write(CR::SPIEN::SET);
    }

    fn shutdown(&self) {
        self.registers.cr.write(CR::SPIDIS::SET);
    }

    fn configure_cs(&self, cs: ChipSelect, settings: CsSettings) {
        self.images[cs.0 as usize].set(Some(settings));
        self.registers.csr[cs.0 as usize].write(Self::csr_image(settings, false));
    }

    fn activate_cs(&self, cs: ChipSelect) {
        let settings = match self.images[cs.0 as usize].get() {
            Some(settings) => settings,
            None => return,
        };
        let regs = self.registers;
        regs.csr[0].write(Self::csr_image(settings, true));
        regs.mr.modify(MR::PCS.val(!(1u32 << cs.0) & 0xf));
    }

    fn deactivate_cs(&self, _cs: ChipSelect) {
        let regs = self.registers;
        regs.cr.write(CR::LASTXFER::SET);
        regs.mr.modify(MR::PCS.val(0xf));
    }

    fn write_word(&self, word: u16) {
        self.registers.tdr.write(TDR::TD.val(u32::from(word)));
    }

    fn read_word(&self) -> u16 {
        self.registers.rdr.read(RDR::RD) as u16
    }

    fn status(&self) -> SpiStatus {
        let sr = self.registers.sr.extract();
        SpiStatus {
            rx_ready: sr.is_set(SR::RDRF),
            overrun: sr.is_set(SR::OVRES),
        }
    }

    fn enable_rx_interrupts(&self) {
        self.registers.ier.write(INT::RDRF::SET + INT::OVRES::SET);
    }

    fn enable_overrun_interrupt(&self) {
        self.registers.ier.write(INT::OVRES::SET);
    }

    fn disable_interrupts(&self) {
        self.registers.idr.write(
            INT::RDRF::SET
                + INT::TDRE::SET
                + INT::MODF::SET
                + INT::OVRES::SET
                + INT::NSSR::SET
                + INT::TXEMPTY::SET
                + INT::UNDES::SET,
        );
    }

    fn delay_us(&self, us: u32) {
        for _ in 0..us {
            for _ in 0..self.loops_per_us {
                core::hint::spin_loop();
            }
        }
    }
}
