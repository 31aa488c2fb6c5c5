// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! SPI master transfer engine.
//!
//! Callers describe work as a [`Message`]: an ordered slice of
//! [`Transfer`]s against one chip select, completed as a unit through a
//! [`SpiClient`] callback. Messages queue in strict FIFO order; the
//! engine walks each message transfer by transfer, choosing per transfer
//! between the interrupt-fed PIO pump and the DMA channels (attached with
//! [`SpiMaster::set_dma`]).
//!
//! Interrupt entry points ([`SpiMaster::handle_interrupt`],
//! [`SpiMaster::dma_complete`]) stay minimal: they move at most one word
//! and record what happened. Everything that takes time or calls back
//! into clients - buffer fences, delays, select changes, completion,
//! starting the next piece of work - runs in [`SpiMaster::service`],
//! which the board calls from thread context whenever
//! [`SpiMaster::has_pending_work`] says so. Clients may submit new
//! messages from inside their completion callback; they enqueue behind
//! whatever is already waiting.
//!
//! A receiver overrun is not recoverable mid-stream: the whole message
//! aborts with [`Error::Io`], its select line releases, and the engine
//! moves on to the next message.

pub mod hw;
pub mod regs;

pub(crate) mod list;

use core::cell::Cell;

use at91_cells::numeric_cell_ext::NumericCellExt;
use at91_cells::optional_cell::OptionalCell;
use at91_cells::take_cell::TakeCell;

use self::hw::{ChipSelect, CsSettings, DmaChannel, DmaDirection, SpiHardware};
use self::list::{List, ListLink, ListNode};

/// Transfers shorter than this run PIO even when DMA is available; the
/// setup cost outweighs the pump.
pub const DMA_MIN_BYTES: usize = 16;

/// Stale words drained from the receiver before a PIO transfer starts.
/// A receiver still full after this many reads is broken.
const STALE_DRAIN_RETRIES: u32 = 1000;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Error {
    /// Malformed message or device arguments.
    InvalidArgument,
    /// Per-transfer override the controller cannot honor.
    Unsupported,
    /// The engine is shutting down or already shut down.
    Shutdown,
    /// Receiver overrun, or a receiver that would not drain.
    Io,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClockPolarity {
    IdleLow,
    IdleHigh,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClockPhase {
    SampleLeading,
    SampleTrailing,
}

/// Per-device bus parameters, fixed at [`SpiMaster::setup`] time.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DeviceConfig {
    pub polarity: ClockPolarity,
    pub phase: ClockPhase,
    /// Frame size, 8..=16 bits. Frames above 8 bits move two bytes per
    /// word, little-endian, and always run PIO.
    pub bits_per_word: u8,
    /// Requested clock ceiling in Hz.
    pub speed_hz: u32,
}

/// One direction-pair of the bus clocked as a unit.
///
/// Either buffer may be absent: a missing tx sends zeros, a missing rx
/// discards. `len` bytes are clocked regardless.
pub struct Transfer<'a> {
    tx: Option<&'a [u8]>,
    rx: TakeCell<'a, [u8]>,
    len: usize,
    delay_us: u32,
    cs_change: bool,
    bits_per_word: Option<u8>,
    speed_hz: Option<u32>,
}

impl<'a> Transfer<'a> {
    pub fn new(tx: Option<&'a [u8]>, rx: Option<&'a mut [u8]>, len: usize) -> Transfer<'a> {
        Transfer {
            tx,
            rx: match rx {
                Some(buf) => TakeCell::new(buf),
                None => TakeCell::empty(),
            },
            len,
            delay_us: 0,
            cs_change: false,
            bits_per_word: None,
            speed_hz: None,
        }
    }

    /// Busy-wait this long after the transfer, before any select change.
    pub fn with_delay_us(mut self, us: u32) -> Transfer<'a> {
        self.delay_us = us;
        self
    }

    /// Bounce the select line after this transfer; on the last transfer
    /// of a message this instead holds the line for a follow-up message.
    pub fn with_cs_change(mut self) -> Transfer<'a> {
        self.cs_change = true;
        self
    }

    /// Per-transfer frame size override. The controller cannot switch
    /// frame sizes mid-message, so submission rejects any value that
    /// differs from the device setup.
    pub fn with_bits_per_word(mut self, bits: u8) -> Transfer<'a> {
        self.bits_per_word = Some(bits);
        self
    }

    /// Per-transfer speed override; rejected like a frame size override.
    pub fn with_speed_hz(mut self, hz: u32) -> Transfer<'a> {
        self.speed_hz = Some(hz);
        self
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the receive buffer, if any. Meant for inspecting received
    /// data after completion.
    pub fn map_rx<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        self.rx.map(f)
    }
}

/// Completion callback for one message.
pub trait SpiClient {
    /// Called exactly once per submitted message, after its last transfer
    /// finishes or the message aborts. The engine is still formally busy
    /// during the call, so submissions made here queue in order.
    fn message_done(&self, message: &Message, status: Result<(), Error>);
}

/// An ordered group of transfers against one device, completed as a unit.
pub struct Message<'a> {
    transfers: &'a [Transfer<'a>],
    cs: ChipSelect,
    client: &'a dyn SpiClient,
    status: Cell<Option<Result<(), Error>>>,
    actual: Cell<usize>,
    tag: Cell<usize>,
    next: ListLink<'a, Message<'a>>,
}

impl<'a> Message<'a> {
    pub fn new(
        cs: ChipSelect,
        transfers: &'a [Transfer<'a>],
        client: &'a dyn SpiClient,
    ) -> Message<'a> {
        Message {
            transfers,
            cs,
            client,
            status: Cell::new(None),
            actual: Cell::new(0),
            tag: Cell::new(0),
            next: ListLink::empty(),
        }
    }

    pub fn cs(&self) -> ChipSelect {
        self.cs
    }

    /// None while queued or in flight, the final result afterwards.
    pub fn status(&self) -> Option<Result<(), Error>> {
        self.status.get()
    }

    /// Bytes moved by transfers that completed cleanly.
    pub fn actual_bytes(&self) -> usize {
        self.actual.get()
    }

    /// Caller cookie carried through to completion.
    pub fn set_tag(&self, tag: usize) {
        self.tag.set(tag);
    }

    pub fn tag(&self) -> usize {
        self.tag.get()
    }
}

impl<'a> ListNode<'a, Message<'a>> for Message<'a> {
    fn next(&'a self) -> &'a ListLink<'a, Message<'a>> {
        &self.next
    }
}

#[derive(Clone, Copy)]
struct DeviceState {
    config: DeviceConfig,
    settings: CsSettings,
}

/// The transfer engine for one controller instance.
pub struct SpiMaster<'a, H: SpiHardware> {
    hw: &'a H,
    clock_hz: u32,
    queue: List<'a, Message<'a>>,
    current: OptionalCell<&'a Message<'a>>,
    transfer_index: Cell<usize>,
    remaining: Cell<usize>,
    word_bytes: Cell<usize>,
    uses_dma: Cell<bool>,
    done_status: Cell<Result<(), Error>>,
    pending_service: Cell<bool>,
    stay: OptionalCell<ChipSelect>,
    stopping: Cell<bool>,
    devices: [Cell<Option<DeviceState>>; 4],
    dma_rx: OptionalCell<&'a dyn DmaChannel>,
    dma_tx: OptionalCell<&'a dyn DmaChannel>,
    scratch: TakeCell<'a, [u8]>,
    pio_only_logged: Cell<bool>,
    overruns: Cell<usize>,
}

impl<'a, H: SpiHardware> SpiMaster<'a, H> {
    /// Bring the controller up. `clock_hz` is the peripheral clock the
    /// baud dividers derive from; `scratch` bounces DMA transfers that
    /// lack a buffer on one side and bounds how long such transfers may
    /// be.
    pub fn new(hw: &'a H, clock_hz: u32, scratch: &'a mut [u8]) -> SpiMaster<'a, H> {
        hw.init();
        SpiMaster {
            hw,
            clock_hz,
            queue: List::new(),
            current: OptionalCell::empty(),
            transfer_index: Cell::new(0),
            remaining: Cell::new(0),
            word_bytes: Cell::new(1),
            uses_dma: Cell::new(false),
            done_status: Cell::new(Ok(())),
            pending_service: Cell::new(false),
            stay: OptionalCell::empty(),
            stopping: Cell::new(false),
            devices: [
                Cell::new(None),
                Cell::new(None),
                Cell::new(None),
                Cell::new(None),
            ],
            dma_rx: OptionalCell::empty(),
            dma_tx: OptionalCell::empty(),
            scratch: TakeCell::new(scratch),
            pio_only_logged: Cell::new(false),
            overruns: Cell::new(0),
        }
    }

    /// Attach the receive and transmit channels. Without them every
    /// transfer runs PIO.
    pub fn set_dma(&self, rx: &'a dyn DmaChannel, tx: &'a dyn DmaChannel) {
        self.dma_rx.set(rx);
        self.dma_tx.set(tx);
    }

    /// Configure one device. Must run before the first message to that
    /// chip select; reconfiguring between messages is fine. A queued
    /// message whose byte count no longer fits the new frame width
    /// completes with [`Error::InvalidArgument`].
    pub fn setup(&self, cs: ChipSelect, config: DeviceConfig) -> Result<(), Error> {
        if self.stopping.get() {
            return Err(Error::Shutdown);
        }
        if cs.0 >= 4 || !(8..=16).contains(&config.bits_per_word) || config.speed_hz == 0 {
            return Err(Error::InvalidArgument);
        }

        // Round the divider up so the device never clocks faster than
        // asked for.
        let scbr =
            (u64::from(self.clock_hz) + u64::from(config.speed_hz) - 1) / u64::from(config.speed_hz);
        let scbr = scbr.max(1);
        if scbr > 255 {
            return Err(Error::InvalidArgument);
        }

        let settings = CsSettings {
            scbr: scbr as u8,
            bits: config.bits_per_word,
            cpol: matches!(config.polarity, ClockPolarity::IdleHigh),
            ncpha: matches!(config.phase, ClockPhase::SampleLeading),
        };
        self.devices[cs.0 as usize].set(Some(DeviceState { config, settings }));
        self.hw.configure_cs(cs, settings);
        Ok(())
    }

    /// Queue a message. The message and its buffers stay borrowed until
    /// the completion callback runs.
    pub fn submit(&self, msg: &'a Message<'a>) -> Result<(), Error> {
        if self.stopping.get() {
            return Err(Error::Shutdown);
        }
        if msg.transfers.is_empty() || msg.cs.0 >= 4 {
            return Err(Error::InvalidArgument);
        }
        let dev = match self.devices[msg.cs.0 as usize].get() {
            Some(dev) => dev,
            None => return Err(Error::InvalidArgument),
        };

        for t in msg.transfers {
            if t.len > 0 && t.tx.is_none() && t.rx.is_none() {
                return Err(Error::InvalidArgument);
            }
            if t.tx.map_or(false, |buf| buf.len() < t.len) {
                return Err(Error::InvalidArgument);
            }
            if t.rx.map(|buf| buf.len()).map_or(false, |l| l < t.len) {
                return Err(Error::InvalidArgument);
            }
            if dev.config.bits_per_word > 8 && t.len % 2 != 0 {
                return Err(Error::InvalidArgument);
            }
            if t.bits_per_word.map_or(false, |b| b != dev.config.bits_per_word) {
                return Err(Error::Unsupported);
            }
            if t.speed_hz.map_or(false, |hz| hz != dev.config.speed_hz) {
                return Err(Error::Unsupported);
            }
        }

        msg.status.set(None);
        msg.actual.set(0);
        self.queue.push_tail(msg);
        if self.current.is_none() {
            self.next_message();
        }
        Ok(())
    }

    /// Interrupt entry point for the controller's own interrupt line.
    /// Records errors and pumps one PIO word; the rest waits for
    /// [`service`](Self::service).
    pub fn handle_interrupt(&self) {
        let status = self.hw.status();

        if status.overrun {
            self.hw.disable_interrupts();
            self.overruns.increment();
            self.done_status.set(Err(Error::Io));
            self.pending_service.set(true);
            return;
        }

        if status.rx_ready && !self.uses_dma.get() {
            self.pump_pio();
        }
    }

    /// Interrupt entry point for the DMA channels. Only the receive side
    /// finishes a transfer; the transmitter always drains first.
    pub fn dma_complete(&self, direction: DmaDirection) {
        if direction == DmaDirection::PeripheralToMemory && self.uses_dma.get() {
            self.pending_service.set(true);
        }
    }

    /// True when [`service`](Self::service) has deferred work to run.
    pub fn has_pending_work(&self) -> bool {
        self.pending_service.get()
    }

    /// Deferred completion stage: buffer fences, inter-transfer delays,
    /// select changes, completion callbacks, and the start of the next
    /// piece of work. Runs in thread context.
    pub fn service(&self) {
        if !self.pending_service.replace(false) {
            return;
        }
        let msg = match self.current.get() {
            Some(msg) => msg,
            None => return,
        };
        let index = self.transfer_index.get();
        let t = &msg.transfers[index];
        let status = self.done_status.get();

        match status {
            Err(e) => {
                if self.uses_dma.get() {
                    self.dma_rx.map(|chan| chan.terminate());
                    self.dma_tx.map(|chan| chan.terminate());
                }
                log::warn!("spi: transfer {} failed: {:?}", index, e);
            }
            Ok(()) => {
                if self.uses_dma.get() {
                    // Land the received bytes before anyone looks at them.
                    t.rx.map(|buf| {
                        self.dma_rx.map(|chan| chan.sync_rx(&mut buf[..t.len]));
                    });
                }
                msg.actual.add(t.len);
            }
        }

        if t.delay_us > 0 {
            self.hw.delay_us(t.delay_us);
        }

        let last = index + 1 == msg.transfers.len();
        if last || status.is_err() {
            self.message_done(msg, status, t.cs_change);
        } else {
            if t.cs_change {
                self.hw.deactivate_cs(msg.cs);
                self.hw.delay_us(1);
                self.hw.activate_cs(msg.cs);
            }
            self.transfer_index.set(index + 1);
            self.start_transfer(msg, index + 1);
        }
    }

    /// Tear the engine down. The in-flight message and everything queued
    /// complete with [`Error::Shutdown`], the select lines release, and
    /// further submissions are refused.
    pub fn stop(&self) {
        if self.stopping.replace(true) {
            return;
        }
        self.hw.disable_interrupts();
        self.pending_service.set(false);
        self.dma_rx.map(|chan| chan.terminate());
        self.dma_tx.map(|chan| chan.terminate());

        if let Some(msg) = self.current.take() {
            // The in-flight message is the queue head, except while its
            // completion callback runs, where it is already unlinked and
            // already has a status.
            if self.queue.head().map_or(false, |head| core::ptr::eq(head, msg)) {
                let _ = self.queue.pop_head();
            }
            self.hw.deactivate_cs(msg.cs);
            if msg.status().is_none() {
                msg.status.set(Some(Err(Error::Shutdown)));
                msg.client.message_done(msg, Err(Error::Shutdown));
            }
        }
        if let Some(held) = self.stay.take() {
            self.hw.deactivate_cs(held);
        }
        self.fail_queued(Error::Shutdown);
        self.hw.shutdown();
    }

    /// Receiver overruns seen since construction.
    pub fn overruns(&self) -> usize {
        self.overruns.get()
    }

    fn next_message(&self) {
        let msg = match self.queue.head() {
            Some(msg) => msg,
            None => return,
        };

        // Keep the line asserted across back-to-back messages to the same
        // device.
        match self.stay.take() {
            Some(held) if held == msg.cs => {}
            Some(held) => {
                self.hw.deactivate_cs(held);
                self.hw.activate_cs(msg.cs);
            }
            None => self.hw.activate_cs(msg.cs),
        }

        self.current.set(msg);
        self.transfer_index.set(0);
        self.start_transfer(msg, 0);
    }

    fn start_transfer(&self, msg: &'a Message<'a>, index: usize) {
        let t = &msg.transfers[index];
        self.done_status.set(Ok(()));
        self.uses_dma.set(false);

        if t.len == 0 {
            // Nothing to clock; the transfer only carries a delay or a
            // select change.
            self.pending_service.set(true);
            return;
        }

        let dev = match self.devices[msg.cs.0 as usize].get() {
            Some(dev) => dev,
            None => {
                self.done_status.set(Err(Error::InvalidArgument));
                self.pending_service.set(true);
                return;
            }
        };

        // The length was validated at submit time; setup() may have widened
        // the frame while the message waited in the queue.
        if dev.config.bits_per_word > 8 && t.len % 2 != 0 {
            self.done_status.set(Err(Error::InvalidArgument));
            self.pending_service.set(true);
            return;
        }

        if self.dma_eligible(t, &dev) {
            match self.start_dma(t) {
                Ok(()) => {
                    self.uses_dma.set(true);
                    return;
                }
                Err(_) => log::warn!("spi: dma submit failed, falling back to pio"),
            }
        }
        self.start_pio(t, &dev);
    }

    fn dma_eligible(&self, t: &Transfer<'a>, dev: &DeviceState) -> bool {
        if t.len < DMA_MIN_BYTES {
            return false;
        }
        if self.dma_rx.is_none() || self.dma_tx.is_none() {
            if !self.pio_only_logged.replace(true) {
                log::info!("spi: no dma channels attached, large transfers run pio");
            }
            return false;
        }
        if dev.config.bits_per_word > 8 {
            return false;
        }
        // A missing buffer is bounced through scratch, so it has to fit.
        if t.tx.is_none() || t.rx.is_none() {
            let scratch_len = self.scratch.map(|s| s.len()).unwrap_or(0);
            if t.len > scratch_len {
                return false;
            }
        }
        true
    }

    fn start_dma(&self, t: &Transfer<'a>) -> Result<(), Error> {
        let rx_chan = match self.dma_rx.get() {
            Some(chan) => chan,
            None => return Err(Error::Io),
        };
        let tx_chan = match self.dma_tx.get() {
            Some(chan) => chan,
            None => return Err(Error::Io),
        };
        let len = t.len;

        // Receive side first so no incoming word is dropped.
        let armed = match t.rx.map(|buf| rx_chan.submit_rx(&mut buf[..len])) {
            Some(result) => result,
            None => self
                .scratch
                .map(|s| rx_chan.submit_rx(&mut s[..len]))
                .unwrap_or(Err(Error::Io)),
        };
        armed?;

        let started = match t.tx {
            Some(buf) => tx_chan.submit_tx(&buf[..len]),
            None => self
                .scratch
                .map(|s| {
                    s[..len].fill(0);
                    tx_chan.submit_tx(&s[..len])
                })
                .unwrap_or(Err(Error::Io)),
        };
        if let Err(e) = started {
            rx_chan.terminate();
            return Err(e);
        }

        self.hw.enable_overrun_interrupt();
        Ok(())
    }

    fn start_pio(&self, t: &Transfer<'a>, dev: &DeviceState) {
        let wb = if dev.config.bits_per_word > 8 { 2 } else { 1 };
        self.word_bytes.set(wb);
        self.remaining.set(t.len);

        // Flush anything stale out of the receiver before priming. A
        // receiver that will not drain is reported, not spun on forever.
        let mut retries = STALE_DRAIN_RETRIES;
        while self.hw.status().rx_ready {
            let _ = self.hw.read_word();
            retries -= 1;
            if retries == 0 {
                log::warn!("spi: receiver will not drain");
                self.done_status.set(Err(Error::Io));
                self.pending_service.set(true);
                return;
            }
        }

        self.send_next_word(t);
        self.hw.enable_rx_interrupts();
    }

    fn send_next_word(&self, t: &Transfer<'a>) {
        let offset = t.len - self.remaining.get();
        let word = match t.tx {
            Some(buf) => {
                if self.word_bytes.get() == 2 {
                    u16::from(buf[offset]) | (u16::from(buf[offset + 1]) << 8)
                } else {
                    u16::from(buf[offset])
                }
            }
            None => 0,
        };
        self.hw.write_word(word);
    }

    fn pump_pio(&self) {
        let msg = match self.current.get() {
            Some(msg) => msg,
            None => return,
        };
        let remaining = self.remaining.get();
        if remaining == 0 {
            return;
        }
        let t = &msg.transfers[self.transfer_index.get()];
        let wb = self.word_bytes.get();

        let offset = t.len - remaining;
        let word = self.hw.read_word();
        t.rx.map(|buf| {
            buf[offset] = word as u8;
            if wb == 2 {
                buf[offset + 1] = (word >> 8) as u8;
            }
        });

        let remaining = remaining - wb;
        self.remaining.set(remaining);

        if remaining > 0 {
            self.send_next_word(t);
        } else {
            self.hw.disable_interrupts();
            self.pending_service.set(true);
        }
    }

    fn message_done(&self, msg: &'a Message<'a>, status: Result<(), Error>, stay: bool) {
        if !stay || status.is_err() {
            self.hw.deactivate_cs(msg.cs);
            self.stay.clear();
        } else {
            self.stay.set(msg.cs);
        }

        let _ = self.queue.pop_head();
        msg.status.set(Some(status));
        // The engine still looks busy during the callback, so re-entrant
        // submissions enqueue behind anything already waiting.
        msg.client.message_done(msg, status);

        self.current.clear();
        self.transfer_index.set(0);
        self.remaining.set(0);
        self.uses_dma.set(false);
        self.done_status.set(Ok(()));

        if self.stopping.get() {
            self.fail_queued(Error::Shutdown);
            self.hw.disable_interrupts();
            return;
        }
        if self.queue.head().is_some() {
            self.next_message();
        } else {
            self.hw.disable_interrupts();
        }
    }

    fn fail_queued(&self, error: Error) {
        while let Some(msg) = self.queue.pop_head() {
            msg.status.set(Some(Err(error)));
            msg.client.message_done(msg, Err(error));
        }
    }
}
