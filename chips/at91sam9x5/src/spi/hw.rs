// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! Interfaces between the transfer engine and the controller hardware.
//!
//! [`SpiHardware`] is the register-level surface of one controller
//! instance, [`DmaChannel`] one half-duplex channel wired to its data
//! registers. Boards provide [`MmioSpi`](super::regs::MmioSpi) plus their
//! DMA controller's channels; tests provide simulated peers.

use super::Error;

/// One of the four peripheral chip select lines.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ChipSelect(pub u8);

/// Chip select register image computed during device setup.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CsSettings {
    /// Serial clock divider: SPCK = MCK / scbr, never zero.
    pub scbr: u8,
    /// Frame size in bits, 8..=16.
    pub bits: u8,
    /// Clock idles high.
    pub cpol: bool,
    /// Data captured on the leading clock edge.
    pub ncpha: bool,
}

/// Controller status snapshot. Reading it clears the sticky bits, so one
/// read per interrupt.
#[derive(Clone, Copy, Default, Debug)]
pub struct SpiStatus {
    /// The receive register holds an unread word.
    pub rx_ready: bool,
    /// The receiver lost a word since the last read.
    pub overrun: bool,
}

/// Register-level operations of one SPI controller.
pub trait SpiHardware {
    /// Soft-reset the controller and bring it up as bus master.
    fn init(&self);

    /// Disable the controller outputs.
    fn shutdown(&self);

    /// Latch a device's chip select register image.
    fn configure_cs(&self, cs: ChipSelect, settings: CsSettings);

    /// Assert a device's select line and hold it between words.
    fn activate_cs(&self, cs: ChipSelect);

    /// Release a device's select line.
    fn deactivate_cs(&self, cs: ChipSelect);

    /// Push one word into the transmit register.
    fn write_word(&self, word: u16);

    /// Pull the received word out of the receive register.
    fn read_word(&self) -> u16;

    fn status(&self) -> SpiStatus;

    /// Unmask receive-ready and overrun interrupts (PIO mode).
    fn enable_rx_interrupts(&self);

    /// Unmask only the overrun interrupt (DMA mode).
    fn enable_overrun_interrupt(&self);

    /// Mask every interrupt source.
    fn disable_interrupts(&self);

    /// Busy-wait, for inter-transfer and select-bounce delays.
    fn delay_us(&self, us: u32);
}

/// Transfer direction of a DMA channel, seen from memory.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DmaDirection {
    MemoryToPeripheral,
    PeripheralToMemory,
}

/// One half-duplex DMA channel tied to the controller data registers.
///
/// Channels complete asynchronously: the board's DMA interrupt handler
/// calls [`SpiMaster::dma_complete`](super::SpiMaster::dma_complete) for
/// the finished direction. Bytes received into `dst` are guaranteed
/// visible only after `sync_rx` runs in the completion stage.
pub trait DmaChannel {
    /// Arm a peripheral-to-memory transfer covering `dst`. Armed before
    /// the transmit side starts so no incoming word is dropped.
    fn submit_rx(&self, dst: &mut [u8]) -> Result<(), Error>;

    /// Start a memory-to-peripheral transfer of `src`.
    fn submit_tx(&self, src: &[u8]) -> Result<(), Error>;

    /// Completion-side fence making the received bytes visible in `dst`.
    fn sync_rx(&self, dst: &mut [u8]);

    /// Abort whatever is in flight.
    fn terminate(&self);
}
