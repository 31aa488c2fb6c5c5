// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! Memory-mapped PMECC register bank.

use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

use crate::static_ref::StaticRef;

use super::hw::{EccDirection, PmeccBank};
use super::{EccConfig, EccError};

/// PMECC_CLK value for a 133 MHz MCK.
const CLKCTRL_133MHZ: u32 = 2;

/// Register words per sector in the ECC and REM files, stride 0x40.
const SECTOR_STRIDE: usize = 16;

register_structs! {
    pub PmeccRegisters {
        (0x000 => cfg: ReadWrite<u32, CFG::Register>),
        (0x004 => sarea: ReadWrite<u32, SAREA::Register>),
        (0x008 => saddr: ReadWrite<u32, SADDR::Register>),
        (0x00c => eaddr: ReadWrite<u32, EADDR::Register>),
        (0x010 => clk: ReadWrite<u32, CLK::Register>),
        (0x014 => ctrl: WriteOnly<u32, CTRL::Register>),
        (0x018 => sr: ReadOnly<u32, SR::Register>),
        (0x01c => ier: WriteOnly<u32, INT::Register>),
        (0x020 => idr: WriteOnly<u32, INT::Register>),
        (0x024 => imr: ReadOnly<u32, INT::Register>),
        (0x028 => isr: ReadOnly<u32>),
        (0x02c => _reserved0),
        (0x040 => ecc: [ReadOnly<u32>; 128]),
        (0x240 => rem: [ReadOnly<u32>; 128]),
        (0x440 => @END),
    }
}

register_bitfields![u32,
    CFG [
        BCH_ERR OFFSET(0) NUMBITS(3) [],
        SECTORSZ OFFSET(4) NUMBITS(1) [],
        PAGESIZE OFFSET(8) NUMBITS(2) [],
        NANDWR OFFSET(12) NUMBITS(1) [],
        SPAREEN OFFSET(16) NUMBITS(1) [],
        AUTO OFFSET(20) NUMBITS(1) []
    ],
    SAREA [
        SPARESIZE OFFSET(0) NUMBITS(9) []
    ],
    SADDR [
        STARTADDR OFFSET(0) NUMBITS(9) []
    ],
    EADDR [
        ENDADDR OFFSET(0) NUMBITS(9) []
    ],
    CLK [
        CLKCTRL OFFSET(0) NUMBITS(3) []
    ],
    CTRL [
        RST OFFSET(0) NUMBITS(1) [],
        DATA OFFSET(1) NUMBITS(1) [],
        USER OFFSET(2) NUMBITS(1) [],
        ENABLE OFFSET(4) NUMBITS(1) [],
        DISABLE OFFSET(5) NUMBITS(1) []
    ],
    SR [
        BUSY OFFSET(0) NUMBITS(1) [],
        ENABLE OFFSET(4) NUMBITS(1) []
    ],
    INT [
        ERRIS OFFSET(0) NUMBITS(1) []
    ]
];

pub const PMECC_BASE: StaticRef<PmeccRegisters> =
    unsafe { StaticRef::new(0xffff_e000 as *const PmeccRegisters) };

/// The real register bank. The checker datapath snoops the external bus,
/// so [`feed`](PmeccBank::feed) is a no-op here.
pub struct MmioPmecc {
    registers: StaticRef<PmeccRegisters>,
}

impl MmioPmecc {
    pub const fn new(registers: StaticRef<PmeccRegisters>) -> MmioPmecc {
        MmioPmecc { registers }
    }
}

impl PmeccBank for MmioPmecc {
    fn configure(&self, config: &EccConfig) -> Result<(), EccError> {
        let regs = self.registers;
        let pagesize = match config.sectors {
            1 => 0,
            2 => 1,
            4 => 2,
            8 => 3,
            _ => return Err(EccError::Config),
        };
        if config.spare_size == 0 || config.spare_size > 512 {
            return Err(EccError::Config);
        }

        regs.ctrl.write(CTRL::RST::SET);
        regs.ctrl.write(CTRL::DISABLE::SET);
        regs.cfg.write(
            CFG::BCH_ERR.val(config.strength.encoding())
                + CFG::SECTORSZ.val(config.sector_size.encoding())
                + CFG::PAGESIZE.val(pagesize)
                + CFG::SPAREEN::CLEAR,
        );
        regs.sarea
            .write(SAREA::SPARESIZE.val(config.spare_size as u32 - 1));
        regs.saddr.write(SADDR::STARTADDR.val(config.ecc_offset as u32));
        regs.eaddr.write(
            EADDR::ENDADDR.val((config.ecc_offset + config.ecc_total_bytes() - 1) as u32),
        );
        regs.clk.write(CLK::CLKCTRL.val(CLKCTRL_133MHZ));
        regs.idr.write(INT::ERRIS::SET);
        regs.ctrl.write(CTRL::ENABLE::SET);
        Ok(())
    }

    fn start(&self, direction: EccDirection) {
        let regs = self.registers;
        regs.ctrl.write(CTRL::RST::SET);
        regs.ctrl.write(CTRL::DISABLE::SET);
        match direction {
            EccDirection::Read => regs.cfg.modify(CFG::NANDWR::CLEAR + CFG::AUTO::SET),
            EccDirection::Write => regs.cfg.modify(CFG::NANDWR::SET + CFG::AUTO::CLEAR),
        }
        regs.ctrl.write(CTRL::ENABLE::SET);
        regs.ctrl.write(CTRL::DATA::SET);
    }

    fn feed(&self, _data: &[u8], _spare: &[u8]) {}

    fn is_busy(&self) -> bool {
        self.registers.sr.is_set(SR::BUSY)
    }

    fn error_sectors(&self) -> u32 {
        self.registers.isr.get()
    }

    fn remainder(&self, sector: usize, index: usize) -> u32 {
        self.registers.rem[sector * SECTOR_STRIDE + index].get()
    }

    fn parity(&self, sector: usize, index: usize) -> u8 {
        let word = self.registers.ecc[sector * SECTOR_STRIDE + index / 4].get();
        (word >> (8 * (index % 4))) as u8
    }
}
