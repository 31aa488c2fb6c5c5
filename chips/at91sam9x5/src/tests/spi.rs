// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright AT91 Cores Contributors 2026.

//! Transfer engine scenarios against the simulated controller.

use core::cell::RefCell;
use std::rc::Rc;

use at91_cells::optional_cell::OptionalCell;

use crate::spi::hw::ChipSelect;
use crate::spi::{
    ClockPhase, ClockPolarity, DeviceConfig, Error, Message, SpiClient, SpiMaster, Transfer,
    DMA_MIN_BYTES,
};
use crate::tests::sim::{run_engine, Event, Lcg, SimDma, SimSpi};

const MCK_HZ: u32 = 133_000_000;

fn device() -> DeviceConfig {
    DeviceConfig {
        polarity: ClockPolarity::IdleLow,
        phase: ClockPhase::SampleLeading,
        bits_per_word: 8,
        speed_hz: 1_000_000,
    }
}

/// Completion log, plus an optional message to push from inside the
/// first callback that fires.
struct Recorder<'a> {
    completions: RefCell<Vec<(usize, Result<(), Error>)>>,
    resubmit: OptionalCell<(&'a SpiMaster<'a, SimSpi>, &'a Message<'a>)>,
}

impl<'a> Recorder<'a> {
    fn new() -> Recorder<'a> {
        Recorder {
            completions: RefCell::new(Vec::new()),
            resubmit: OptionalCell::empty(),
        }
    }

    fn completions(&self) -> Vec<(usize, Result<(), Error>)> {
        self.completions.borrow().clone()
    }
}

impl<'a> SpiClient for Recorder<'a> {
    fn message_done(&self, message: &Message, status: Result<(), Error>) {
        self.completions.borrow_mut().push((message.tag(), status));
        if let Some((master, msg)) = self.resubmit.take() {
            master.submit(msg).unwrap();
        }
    }
}

#[test]
fn setup_computes_chip_select_settings() {
    let bus = SimSpi::new();
    let mut scratch = [0u8; 64];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    assert!(bus.initialized());

    let mut inverted = device();
    inverted.polarity = ClockPolarity::IdleHigh;
    inverted.phase = ClockPhase::SampleTrailing;
    master.setup(ChipSelect(1), inverted).unwrap();
    let (cs, settings) = *bus.cs_configs().last().unwrap();
    assert_eq!(cs, 1);
    assert_eq!(settings.scbr, 133);
    assert_eq!(settings.bits, 8);
    assert!(settings.cpol);
    assert!(!settings.ncpha);

    // Faster than the bus clock clamps to the smallest divider.
    let mut fast = device();
    fast.speed_hz = 2 * MCK_HZ;
    master.setup(ChipSelect(0), fast).unwrap();
    assert_eq!(bus.cs_configs().last().unwrap().1.scbr, 1);

    // A divider past 255 does not fit the register.
    let mut slow = device();
    slow.speed_hz = 400_000;
    assert_eq!(master.setup(ChipSelect(0), slow), Err(Error::InvalidArgument));

    let mut wide = device();
    wide.bits_per_word = 17;
    assert_eq!(master.setup(ChipSelect(0), wide), Err(Error::InvalidArgument));

    let mut stopped = device();
    stopped.speed_hz = 0;
    assert_eq!(
        master.setup(ChipSelect(0), stopped),
        Err(Error::InvalidArgument)
    );

    assert_eq!(
        master.setup(ChipSelect(4), device()),
        Err(Error::InvalidArgument)
    );
}

#[test]
fn pio_transfer_exchanges_words_and_releases_the_line() {
    let tx = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let mut rx = [0u8; 8];
    let recorder = Recorder::new();
    let transfers = [Transfer::new(Some(&tx), Some(&mut rx), 8)];
    let msg = Message::new(ChipSelect(0), &transfers, &recorder);
    msg.set_tag(7);

    let bus = SimSpi::new();
    let mut scratch = [0u8; 64];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.setup(ChipSelect(0), device()).unwrap();
    assert_eq!(msg.status(), None);

    master.submit(&msg).unwrap();
    run_engine(&bus, &master);

    assert_eq!(recorder.completions(), vec![(7, Ok(()))]);
    assert_eq!(msg.status(), Some(Ok(())));
    assert_eq!(msg.actual_bytes(), 8);

    // The simulated device echoes the previous word; the first reply is
    // zero.
    let got = transfers[0].map_rx(|buf| buf.to_vec()).unwrap();
    assert_eq!(got, vec![0, 1, 2, 3, 4, 5, 6, 7]);

    let events = bus.events();
    assert_eq!(events.first(), Some(&Event::CsAssert(0)));
    assert_eq!(events.last(), Some(&Event::CsRelease(0)));
    let words = events
        .iter()
        .filter(|e| matches!(e, Event::Word(_)))
        .count();
    assert_eq!(words, 8);
}

#[test]
fn dma_and_pio_move_the_same_bytes() {
    let mut rng = Lcg::new(0x5117_d00d);
    let mut tx = [0u8; 32];
    for b in tx.iter_mut() {
        *b = rng.next_u32() as u8;
    }
    let mut expected = vec![0u8];
    expected.extend_from_slice(&tx[..31]);

    // Without channels every transfer runs PIO.
    let mut rx_pio = [0u8; 32];
    let recorder_pio = Recorder::new();
    let transfers_pio = [Transfer::new(Some(&tx), Some(&mut rx_pio), 32)];
    let msg_pio = Message::new(ChipSelect(0), &transfers_pio, &recorder_pio);
    let bus_pio = SimSpi::new();
    let mut scratch_pio = [0u8; 64];
    let master_pio = SpiMaster::new(&bus_pio, MCK_HZ, &mut scratch_pio);
    master_pio.setup(ChipSelect(0), device()).unwrap();
    master_pio.submit(&msg_pio).unwrap();
    run_engine(&bus_pio, &master_pio);
    assert_eq!(msg_pio.status(), Some(Ok(())));
    assert!(bus_pio
        .events()
        .iter()
        .any(|e| matches!(e, Event::Word(_))));

    // The same transfer through the DMA channels.
    let mut rx_dma = [0u8; 32];
    let recorder_dma = Recorder::new();
    let transfers_dma = [Transfer::new(Some(&tx), Some(&mut rx_dma), 32)];
    let msg_dma = Message::new(ChipSelect(0), &transfers_dma, &recorder_dma);
    let bus_dma = SimSpi::new();
    let (rx_chan, tx_chan) = SimDma::pair(&bus_dma);
    let mut scratch_dma = [0u8; 64];
    let master_dma = SpiMaster::new(&bus_dma, MCK_HZ, &mut scratch_dma);
    master_dma.set_dma(&rx_chan, &tx_chan);
    master_dma.setup(ChipSelect(0), device()).unwrap();
    master_dma.submit(&msg_dma).unwrap();
    run_engine(&bus_dma, &master_dma);
    assert_eq!(msg_dma.status(), Some(Ok(())));
    assert!(bus_dma.events().contains(&Event::DmaExchange(32)));

    let pio_bytes = transfers_pio[0].map_rx(|buf| buf.to_vec()).unwrap();
    let dma_bytes = transfers_dma[0].map_rx(|buf| buf.to_vec()).unwrap();
    assert_eq!(pio_bytes, expected);
    assert_eq!(dma_bytes, expected);
}

#[test]
fn short_transfers_stay_pio_even_with_dma_attached() {
    let tx = [0x5au8; DMA_MIN_BYTES];
    let recorder = Recorder::new();
    let below = [Transfer::new(Some(&tx[..DMA_MIN_BYTES - 1]), None, DMA_MIN_BYTES - 1)];
    let at = [Transfer::new(Some(&tx), None, DMA_MIN_BYTES)];
    let msg_below = Message::new(ChipSelect(0), &below, &recorder);
    let msg_at = Message::new(ChipSelect(0), &at, &recorder);

    let bus = SimSpi::new();
    let (rx_chan, tx_chan) = SimDma::pair(&bus);
    let mut scratch = [0u8; 64];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.set_dma(&rx_chan, &tx_chan);
    master.setup(ChipSelect(0), device()).unwrap();

    master.submit(&msg_below).unwrap();
    master.submit(&msg_at).unwrap();
    run_engine(&bus, &master);

    assert_eq!(msg_below.status(), Some(Ok(())));
    assert_eq!(msg_at.status(), Some(Ok(())));
    let events = bus.events();
    let words = events
        .iter()
        .filter(|e| matches!(e, Event::Word(_)))
        .count();
    assert_eq!(words, DMA_MIN_BYTES - 1, "the short transfer went word by word");
    assert!(events.contains(&Event::DmaExchange(DMA_MIN_BYTES)));
}

#[test]
fn messages_complete_in_submission_order_even_when_resubmitted() {
    let tx = [0xaau8; 4];
    let recorder = Recorder::new();
    let t1 = [Transfer::new(Some(&tx), None, 4)];
    let t2 = [Transfer::new(Some(&tx), None, 4)];
    let t3 = [Transfer::new(Some(&tx), None, 4)];
    let t4 = [Transfer::new(Some(&tx), None, 4)];
    let msg1 = Message::new(ChipSelect(0), &t1, &recorder);
    let msg2 = Message::new(ChipSelect(0), &t2, &recorder);
    let msg3 = Message::new(ChipSelect(0), &t3, &recorder);
    let msg4 = Message::new(ChipSelect(0), &t4, &recorder);
    msg1.set_tag(1);
    msg2.set_tag(2);
    msg3.set_tag(3);
    msg4.set_tag(4);

    let bus = SimSpi::new();
    let mut scratch = [0u8; 64];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.setup(ChipSelect(0), device()).unwrap();

    // The first completion callback pushes a fourth message; it must
    // land behind the two already waiting.
    recorder.resubmit.set((&master, &msg4));

    master.submit(&msg1).unwrap();
    master.submit(&msg2).unwrap();
    master.submit(&msg3).unwrap();
    run_engine(&bus, &master);

    let tags: Vec<usize> = recorder.completions().iter().map(|c| c.0).collect();
    assert_eq!(tags, vec![1, 2, 3, 4]);
    assert!(recorder.completions().iter().all(|c| c.1 == Ok(())));
}

#[test]
fn chip_select_holds_across_messages_when_asked() {
    let tx = [0x11u8; 2];
    let recorder = Recorder::new();
    let t1 = [Transfer::new(Some(&tx), None, 2).with_cs_change()];
    let t2 = [Transfer::new(Some(&tx), None, 2)];
    let msg1 = Message::new(ChipSelect(2), &t1, &recorder);
    let msg2 = Message::new(ChipSelect(2), &t2, &recorder);

    let bus = SimSpi::new();
    let mut scratch = [0u8; 16];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.setup(ChipSelect(2), device()).unwrap();
    master.submit(&msg1).unwrap();
    master.submit(&msg2).unwrap();
    run_engine(&bus, &master);

    let events = bus.events();
    let asserts = events
        .iter()
        .filter(|e| matches!(e, Event::CsAssert(_)))
        .count();
    let releases = events
        .iter()
        .filter(|e| matches!(e, Event::CsRelease(_)))
        .count();
    assert_eq!(asserts, 1, "the line stays held between the messages");
    assert_eq!(releases, 1);
    assert_eq!(events.last(), Some(&Event::CsRelease(2)));
}

#[test]
fn a_held_line_is_released_for_the_next_device() {
    let tx = [0x33u8; 2];
    let recorder = Recorder::new();
    let t1 = [Transfer::new(Some(&tx), None, 2).with_cs_change()];
    let t2 = [Transfer::new(Some(&tx), None, 2)];
    let msg1 = Message::new(ChipSelect(2), &t1, &recorder);
    let msg2 = Message::new(ChipSelect(1), &t2, &recorder);

    let bus = SimSpi::new();
    let mut scratch = [0u8; 16];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.setup(ChipSelect(2), device()).unwrap();
    master.setup(ChipSelect(1), device()).unwrap();
    master.submit(&msg1).unwrap();
    master.submit(&msg2).unwrap();
    run_engine(&bus, &master);

    let events = bus.events();
    let handoff = events
        .iter()
        .position(|e| *e == Event::CsRelease(2))
        .expect("held line released");
    assert_eq!(events.get(handoff + 1), Some(&Event::CsAssert(1)));
    assert_eq!(events.last(), Some(&Event::CsRelease(1)));
}

#[test]
fn cs_change_mid_message_bounces_the_line() {
    let tx = [0x22u8; 2];
    let recorder = Recorder::new();
    let transfers = [
        Transfer::new(Some(&tx), None, 2)
            .with_cs_change()
            .with_delay_us(5),
        Transfer::new(Some(&tx), None, 2),
    ];
    let msg = Message::new(ChipSelect(0), &transfers, &recorder);

    let bus = SimSpi::new();
    let mut scratch = [0u8; 16];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.setup(ChipSelect(0), device()).unwrap();
    master.submit(&msg).unwrap();
    run_engine(&bus, &master);

    assert_eq!(msg.status(), Some(Ok(())));
    assert_eq!(msg.actual_bytes(), 4);
    assert_eq!(
        bus.events(),
        vec![
            Event::CsAssert(0),
            Event::Word(0x22),
            Event::Word(0x22),
            Event::CsRelease(0),
            Event::CsAssert(0),
            Event::Word(0x22),
            Event::Word(0x22),
            Event::CsRelease(0),
        ]
    );
    // The per-transfer delay runs before the one microsecond bounce gap.
    assert_eq!(bus.delays(), vec![5, 1]);
}

#[test]
fn an_overrun_fails_the_message_and_the_bus_recovers() {
    let tx = [9u8; 6];
    let recorder = Recorder::new();
    let t1 = [Transfer::new(Some(&tx), None, 6)];
    let t2 = [Transfer::new(Some(&tx), None, 6)];
    let msg1 = Message::new(ChipSelect(0), &t1, &recorder);
    let msg2 = Message::new(ChipSelect(0), &t2, &recorder);
    msg1.set_tag(1);
    msg2.set_tag(2);

    let bus = SimSpi::new();
    let mut scratch = [0u8; 16];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.setup(ChipSelect(0), device()).unwrap();

    bus.force_overrun_after(3);
    master.submit(&msg1).unwrap();
    master.submit(&msg2).unwrap();
    run_engine(&bus, &master);

    assert_eq!(
        recorder.completions(),
        vec![(1, Err(Error::Io)), (2, Ok(()))]
    );
    assert_eq!(msg1.actual_bytes(), 0);
    assert_eq!(msg2.actual_bytes(), 6);
    assert_eq!(master.overruns(), 1);
}

#[test]
fn an_overrun_during_dma_terminates_the_channels() {
    let tx = [7u8; 32];
    let mut rx = [0u8; 32];
    let recorder = Recorder::new();
    let transfers = [Transfer::new(Some(&tx), Some(&mut rx), 32)];
    let msg = Message::new(ChipSelect(0), &transfers, &recorder);

    let bus = SimSpi::new();
    let (rx_chan, tx_chan) = SimDma::pair(&bus);
    let mut scratch = [0u8; 64];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.set_dma(&rx_chan, &tx_chan);
    master.setup(ChipSelect(0), device()).unwrap();

    bus.force_overrun_after(10);
    master.submit(&msg).unwrap();
    run_engine(&bus, &master);

    assert_eq!(msg.status(), Some(Err(Error::Io)));
    assert_eq!(msg.actual_bytes(), 0);
    assert_eq!(rx_chan.terminations(), 1);
    assert_eq!(tx_chan.terminations(), 1);
    assert_eq!(master.overruns(), 1);
}

#[test]
fn a_receiver_that_never_drains_fails_the_transfer() {
    let tx = [1u8; 4];
    let recorder = Recorder::new();
    let transfers = [Transfer::new(Some(&tx), None, 4)];
    let msg = Message::new(ChipSelect(0), &transfers, &recorder);

    let bus = SimSpi::new();
    let mut scratch = [0u8; 16];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.setup(ChipSelect(0), device()).unwrap();

    bus.stick_receiver();
    master.submit(&msg).unwrap();
    run_engine(&bus, &master);

    assert_eq!(msg.status(), Some(Err(Error::Io)));
    assert_eq!(msg.actual_bytes(), 0);
}

#[test]
fn submission_validation_rejects_malformed_messages() {
    let tx = [0u8; 4];
    let mut small_rx = [0u8; 2];
    let recorder = Recorder::new();

    let no_buffers = [Transfer::new(None, None, 4)];
    let empty: [Transfer; 0] = [];
    let short_tx = [Transfer::new(Some(&tx[..2]), None, 4)];
    let short_rx = [Transfer::new(None, Some(&mut small_rx), 4)];
    let override_bits = [Transfer::new(Some(&tx), None, 4).with_bits_per_word(16)];
    let override_speed = [Transfer::new(Some(&tx), None, 4).with_speed_hz(42)];
    let matching = [Transfer::new(Some(&tx), None, 4)
        .with_bits_per_word(8)
        .with_speed_hz(1_000_000)];

    let msg_no_buffers = Message::new(ChipSelect(0), &no_buffers, &recorder);
    let msg_empty = Message::new(ChipSelect(0), &empty, &recorder);
    let msg_bad_cs = Message::new(ChipSelect(5), &matching, &recorder);
    let msg_unknown = Message::new(ChipSelect(3), &matching, &recorder);
    let msg_short_tx = Message::new(ChipSelect(0), &short_tx, &recorder);
    let msg_short_rx = Message::new(ChipSelect(0), &short_rx, &recorder);
    let msg_bits = Message::new(ChipSelect(0), &override_bits, &recorder);
    let msg_speed = Message::new(ChipSelect(0), &override_speed, &recorder);
    let msg_ok = Message::new(ChipSelect(0), &matching, &recorder);

    let bus = SimSpi::new();
    let mut scratch = [0u8; 16];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.setup(ChipSelect(0), device()).unwrap();

    assert_eq!(master.submit(&msg_no_buffers), Err(Error::InvalidArgument));
    assert_eq!(master.submit(&msg_empty), Err(Error::InvalidArgument));
    assert_eq!(master.submit(&msg_bad_cs), Err(Error::InvalidArgument));
    assert_eq!(master.submit(&msg_unknown), Err(Error::InvalidArgument));
    assert_eq!(master.submit(&msg_short_tx), Err(Error::InvalidArgument));
    assert_eq!(master.submit(&msg_short_rx), Err(Error::InvalidArgument));
    assert_eq!(master.submit(&msg_bits), Err(Error::Unsupported));
    assert_eq!(master.submit(&msg_speed), Err(Error::Unsupported));
    assert_eq!(msg_bits.status(), None, "a refused message never starts");

    // Overrides that match the device setup are honored.
    master.submit(&msg_ok).unwrap();
    run_engine(&bus, &master);
    assert_eq!(msg_ok.status(), Some(Ok(())));
}

#[test]
fn odd_lengths_are_rejected_on_wide_frame_devices() {
    let tx = [0u8; 3];
    let recorder = Recorder::new();
    let odd = [Transfer::new(Some(&tx), None, 3)];
    let msg = Message::new(ChipSelect(0), &odd, &recorder);

    let bus = SimSpi::new();
    let mut scratch = [0u8; 16];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    let mut wide = device();
    wide.bits_per_word = 16;
    master.setup(ChipSelect(0), wide).unwrap();

    assert_eq!(master.submit(&msg), Err(Error::InvalidArgument));
}

#[test]
fn widening_frames_mid_queue_fails_the_stale_message() {
    let tx = [0x5au8; 4];
    let tx_odd = [0x5au8; 3];
    let tx_wide = [0x5au8; 2];
    let recorder = Recorder::new();
    let t1 = [Transfer::new(Some(&tx), None, 4)];
    let t2 = [Transfer::new(Some(&tx_odd), None, 3)];
    let t3 = [Transfer::new(Some(&tx_wide), None, 2)];
    let msg1 = Message::new(ChipSelect(0), &t1, &recorder);
    let msg2 = Message::new(ChipSelect(0), &t2, &recorder);
    let msg3 = Message::new(ChipSelect(0), &t3, &recorder);
    msg1.set_tag(1);
    msg2.set_tag(2);
    msg3.set_tag(3);

    let bus = SimSpi::new();
    let mut scratch = [0u8; 16];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.setup(ChipSelect(0), device()).unwrap();

    // Three bytes pass validation while the device runs 8-bit frames.
    master.submit(&msg1).unwrap();
    master.submit(&msg2).unwrap();

    // Widen the frames while the first message is in flight and the odd
    // one still waits.
    let mut wide = device();
    wide.bits_per_word = 16;
    master.setup(ChipSelect(0), wide).unwrap();
    run_engine(&bus, &master);

    assert_eq!(
        recorder.completions(),
        vec![(1, Ok(())), (2, Err(Error::InvalidArgument))]
    );
    assert_eq!(msg2.status(), Some(Err(Error::InvalidArgument)));
    assert_eq!(msg2.actual_bytes(), 0);

    // The engine is still usable at the new width.
    master.submit(&msg3).unwrap();
    run_engine(&bus, &master);
    assert_eq!(recorder.completions().last(), Some(&(3, Ok(()))));
}

#[test]
fn sixteen_bit_frames_move_two_bytes_per_word() {
    let tx = [0x34u8, 0x12, 0x78, 0x56];
    let mut rx = [0u8; 4];
    let recorder = Recorder::new();
    let transfers = [Transfer::new(Some(&tx), Some(&mut rx), 4)];
    let msg = Message::new(ChipSelect(0), &transfers, &recorder);

    let bus = SimSpi::new();
    bus.set_responder(|word| word.wrapping_add(0x0101));
    let mut scratch = [0u8; 16];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    let mut wide = device();
    wide.bits_per_word = 16;
    master.setup(ChipSelect(0), wide).unwrap();
    master.submit(&msg).unwrap();
    run_engine(&bus, &master);

    assert_eq!(msg.status(), Some(Ok(())));
    assert_eq!(msg.actual_bytes(), 4);

    // Bytes assemble little endian into words and back.
    let words: Vec<u16> = bus
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::Word(w) => Some(*w),
            _ => None,
        })
        .collect();
    assert_eq!(words, vec![0x1234, 0x5678]);
    let got = transfers[0].map_rx(|buf| buf.to_vec()).unwrap();
    assert_eq!(got, vec![0x35, 0x13, 0x79, 0x57]);
}

#[test]
fn wide_frames_never_use_dma() {
    let tx = [0x66u8; 32];
    let recorder = Recorder::new();
    let transfers = [Transfer::new(Some(&tx), None, 32)];
    let msg = Message::new(ChipSelect(0), &transfers, &recorder);

    let bus = SimSpi::new();
    let (rx_chan, tx_chan) = SimDma::pair(&bus);
    let mut scratch = [0u8; 64];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.set_dma(&rx_chan, &tx_chan);
    let mut wide = device();
    wide.bits_per_word = 16;
    master.setup(ChipSelect(0), wide).unwrap();
    master.submit(&msg).unwrap();
    run_engine(&bus, &master);

    assert_eq!(msg.status(), Some(Ok(())));
    let events = bus.events();
    assert!(!events.iter().any(|e| matches!(e, Event::DmaExchange(_))));
    let words = events
        .iter()
        .filter(|e| matches!(e, Event::Word(_)))
        .count();
    assert_eq!(words, 16, "two bytes per word over sixteen words");
}

#[test]
fn missing_buffers_bounce_through_scratch() {
    // Transmit only, then receive only; both large enough for DMA.
    let tx = [0x44u8; 24];
    let mut rx = [0xffu8; 24];
    let recorder = Recorder::new();
    let t_tx = [Transfer::new(Some(&tx), None, 24)];
    let t_rx = [Transfer::new(None, Some(&mut rx), 24)];
    let msg_tx = Message::new(ChipSelect(0), &t_tx, &recorder);
    let msg_rx = Message::new(ChipSelect(0), &t_rx, &recorder);

    let bus = SimSpi::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    bus.set_responder(move |word| {
        log.borrow_mut().push(word);
        0x5a
    });
    let (rx_chan, tx_chan) = SimDma::pair(&bus);
    let mut scratch = [0u8; 64];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.set_dma(&rx_chan, &tx_chan);
    master.setup(ChipSelect(0), device()).unwrap();

    master.submit(&msg_tx).unwrap();
    master.submit(&msg_rx).unwrap();
    run_engine(&bus, &master);

    assert_eq!(msg_tx.status(), Some(Ok(())));
    assert_eq!(msg_rx.status(), Some(Ok(())));
    let exchanges = bus
        .events()
        .iter()
        .filter(|e| matches!(e, Event::DmaExchange(_)))
        .count();
    assert_eq!(exchanges, 2, "both directions were DMA eligible");

    // A missing transmit buffer clocks zeros onto the wire.
    let wire = seen.borrow();
    assert_eq!(wire.len(), 48);
    assert!(wire[..24].iter().all(|&w| w == 0x44));
    assert!(wire[24..].iter().all(|&w| w == 0));

    // The receive-only transfer still collects every reply.
    let got = t_rx[0].map_rx(|buf| buf.to_vec()).unwrap();
    assert_eq!(got, vec![0x5a; 24]);
}

#[test]
fn a_missing_buffer_longer_than_scratch_falls_back_to_pio() {
    let tx = [0x77u8; 48];
    let recorder = Recorder::new();
    let transfers = [Transfer::new(Some(&tx), None, 48)];
    let msg = Message::new(ChipSelect(0), &transfers, &recorder);

    let bus = SimSpi::new();
    let (rx_chan, tx_chan) = SimDma::pair(&bus);
    let mut scratch = [0u8; 32];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.set_dma(&rx_chan, &tx_chan);
    master.setup(ChipSelect(0), device()).unwrap();
    master.submit(&msg).unwrap();
    run_engine(&bus, &master);

    assert_eq!(msg.status(), Some(Ok(())));
    assert_eq!(msg.actual_bytes(), 48);
    assert!(!bus
        .events()
        .iter()
        .any(|e| matches!(e, Event::DmaExchange(_))));
}

#[test]
fn dma_submit_failure_falls_back_to_pio() {
    let tx = [0x55u8; 32];
    let recorder = Recorder::new();
    let t1 = [Transfer::new(Some(&tx), None, 32)];
    let t2 = [Transfer::new(Some(&tx), None, 32)];
    let msg1 = Message::new(ChipSelect(0), &t1, &recorder);
    let msg2 = Message::new(ChipSelect(0), &t2, &recorder);

    let bus = SimSpi::new();
    let (rx_chan, tx_chan) = SimDma::pair(&bus);
    let mut scratch = [0u8; 64];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.set_dma(&rx_chan, &tx_chan);
    master.setup(ChipSelect(0), device()).unwrap();

    // Receive descriptor refused outright.
    rx_chan.fail_next_submits(1);
    master.submit(&msg1).unwrap();
    run_engine(&bus, &master);
    assert_eq!(msg1.status(), Some(Ok(())));
    assert_eq!(rx_chan.terminations(), 0);

    // Transmit descriptor refused after the receive side was armed; the
    // armed channel is torn down before the fallback.
    bus.clear_events();
    tx_chan.fail_next_submits(1);
    master.submit(&msg2).unwrap();
    run_engine(&bus, &master);
    assert_eq!(msg2.status(), Some(Ok(())));
    assert_eq!(rx_chan.terminations(), 1);
    assert!(!bus
        .events()
        .iter()
        .any(|e| matches!(e, Event::DmaExchange(_))));
}

#[test]
fn an_empty_transfer_still_delays_and_bounces() {
    let recorder = Recorder::new();
    let transfers = [Transfer::new(None, None, 0).with_delay_us(9)];
    assert!(transfers[0].is_empty());
    let msg = Message::new(ChipSelect(0), &transfers, &recorder);

    let bus = SimSpi::new();
    let mut scratch = [0u8; 16];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.setup(ChipSelect(0), device()).unwrap();
    master.submit(&msg).unwrap();
    run_engine(&bus, &master);

    assert_eq!(msg.status(), Some(Ok(())));
    assert_eq!(msg.actual_bytes(), 0);
    assert_eq!(bus.delays(), vec![9]);
    assert_eq!(
        bus.events(),
        vec![Event::CsAssert(0), Event::CsRelease(0)]
    );
}

#[test]
fn stop_fails_the_current_and_queued_messages() {
    let tx = [3u8; 4];
    let recorder = Recorder::new();
    let t1 = [Transfer::new(Some(&tx), None, 4)];
    let t2 = [Transfer::new(Some(&tx), None, 4)];
    let msg1 = Message::new(ChipSelect(0), &t1, &recorder);
    let msg2 = Message::new(ChipSelect(0), &t2, &recorder);
    msg1.set_tag(1);
    msg2.set_tag(2);

    let bus = SimSpi::new();
    let mut scratch = [0u8; 16];
    let master = SpiMaster::new(&bus, MCK_HZ, &mut scratch);
    master.setup(ChipSelect(0), device()).unwrap();
    master.submit(&msg1).unwrap();
    master.submit(&msg2).unwrap();

    // The first transfer is in flight; nothing has completed.
    master.stop();

    assert_eq!(
        recorder.completions(),
        vec![(1, Err(Error::Shutdown)), (2, Err(Error::Shutdown))]
    );
    assert_eq!(bus.shutdowns(), 1);
    assert_eq!(bus.events().last(), Some(&Event::CsRelease(0)));
    assert_eq!(master.submit(&msg1), Err(Error::Shutdown));
    assert_eq!(
        master.setup(ChipSelect(1), device()),
        Err(Error::Shutdown)
    );
}
