//! Shared test harness: a simulated RFM69-compat chip behind the
//! `Transport` trait and a hand-cranked millisecond clock.
//!
//! The chip model is just deep enough for the driver: FIFO bytes become
//! readable only in receive mode, FIFO writes in transmit mode are
//! collected for inspection, and the status registers answer the flags
//! the state machine polls for.

#![allow(dead_code)]

use rfnet::peripherals::regs;
use rfnet::{crc16_update, Band, Clock, Radio, RadioConfig, Transport};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

pub const GROUP: u8 = 212;

pub struct ChipState {
    regs: [u8; 128],
    /// Bytes "on the air", drained one per FIFO read while receiving.
    pub air: VecDeque<u8>,
    /// Bytes the driver pushed into the FIFO while transmitting.
    pub sent: Vec<u8>,
    /// Simulate a busy channel (RSSI threshold exceeded).
    pub rssi_busy: bool,
    pub low_battery: bool,
    /// Make the SPI probe fail, as if no module were wired up.
    pub fail_probe: bool,
    /// Raise the receive FIFO overrun flag.
    pub overrun: bool,
    /// Report packet-sent regardless of how much was fed, simulating a
    /// transmit FIFO underrun.
    pub force_tx_complete: bool,
    /// Number of masked critical sections the driver entered.
    pub masked_sections: u32,
}

impl ChipState {
    fn new() -> Self {
        ChipState {
            regs: [0; 128],
            air: VecDeque::new(),
            sent: Vec::new(),
            rssi_busy: false,
            low_battery: false,
            fail_probe: false,
            overrun: false,
            force_tx_complete: false,
            masked_sections: 0,
        }
    }

    fn mode(&self) -> u8 {
        self.regs[usize::from(regs::OPMODE)] & regs::MODE_MASK
    }

    /// The bytes fed so far form a complete frame: header, length,
    /// `length` payload bytes, two CRC bytes and the trailer.
    fn tx_frame_complete(&self) -> bool {
        self.sent.len() >= 2 && self.sent.len() >= usize::from(self.sent[1]) + 5
    }

    fn read(&mut self, addr: u8) -> u8 {
        match addr {
            regs::FIFO => {
                if self.mode() == regs::MODE_RECEIVER {
                    self.air.pop_front().unwrap_or(0)
                } else {
                    0
                }
            }
            regs::IRQ_FLAGS1 => {
                let mut flags = regs::IRQ1_MODE_READY;
                if self.rssi_busy {
                    flags |= regs::IRQ1_RSSI;
                }
                flags
            }
            regs::IRQ_FLAGS2 => {
                let mut flags = 0;
                if self.mode() == regs::MODE_RECEIVER {
                    if self.overrun {
                        flags |= regs::IRQ2_FIFO_OVERRUN;
                    }
                    if !self.air.is_empty() {
                        flags |= regs::IRQ2_FIFO_NOT_EMPTY;
                    }
                }
                if self.mode() == regs::MODE_TRANSMITTER
                    && (self.force_tx_complete || self.tx_frame_complete())
                {
                    flags |= regs::IRQ2_PACKET_SENT;
                }
                flags
            }
            regs::OSC1 => regs::OSC1_RC_CAL_DONE,
            regs::LOW_BAT => {
                if self.low_battery {
                    regs::LOW_BAT_MONITOR
                } else {
                    0
                }
            }
            regs::RSSI_VALUE => 0x42,
            regs::SYNC_VALUE7 if self.fail_probe => 0,
            _ => self.regs[usize::from(addr)],
        }
    }

    fn write(&mut self, addr: u8, value: u8) {
        if addr == regs::FIFO {
            if self.mode() == regs::MODE_TRANSMITTER {
                self.sent.push(value);
            }
            return;
        }
        if addr == regs::IRQ_FLAGS2 {
            // Writing the overrun bit resets the FIFO.
            if value & regs::IRQ2_FIFO_OVERRUN != 0 {
                self.overrun = false;
                self.air.clear();
            }
            return;
        }
        self.regs[usize::from(addr)] = value;
    }
}

#[derive(Clone)]
pub struct MockTransport {
    chip: Rc<RefCell<ChipState>>,
}

impl MockTransport {
    pub fn new() -> (MockTransport, Rc<RefCell<ChipState>>) {
        let chip = Rc::new(RefCell::new(ChipState::new()));
        (MockTransport { chip: chip.clone() }, chip)
    }
}

impl Transport for MockTransport {
    fn read_register(&mut self, addr: u8) -> u8 {
        self.chip.borrow_mut().read(addr)
    }

    fn write_register(&mut self, addr: u8, value: u8) {
        self.chip.borrow_mut().write(addr, value)
    }

    fn with_irq_masked<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.chip.borrow_mut().masked_sections += 1;
        f(self)
    }
}

#[derive(Clone, Default)]
pub struct MockClock(Rc<Cell<u64>>);

impl MockClock {
    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

pub fn new_radio(node: u8) -> (Radio<MockTransport>, Rc<RefCell<ChipState>>) {
    let (transport, chip) = MockTransport::new();
    let radio = Radio::new(transport, RadioConfig::new(node, Band::Mhz868, GROUP))
        .expect("mock radio probe");
    (radio, chip)
}

/// Step the interrupt handler, as the hardware would per byte event.
pub fn pump(radio: &mut Radio<MockTransport>, steps: usize) {
    for _ in 0..steps {
        radio.interrupt();
    }
}

/// Take the frame a radio just transmitted, as it would appear in a
/// receiver's FIFO: the trailer filler never makes it through the other
/// side's sync-gated FIFO, so it is stripped; the group byte was carried
/// by the sync word and gets reconstructed by the receiving driver.
pub fn take_frame(chip: &Rc<RefCell<ChipState>>) -> Vec<u8> {
    let mut chip = chip.borrow_mut();
    let mut frame = std::mem::take(&mut chip.sent);
    frame.pop();
    frame
}

/// Put bytes on a radio's air, to be drained by its receive interrupts.
pub fn feed(chip: &Rc<RefCell<ChipState>>, bytes: &[u8]) {
    chip.borrow_mut().air.extend(bytes.iter().copied());
}

/// Craft the on-air byte stream of a protocol frame (header, length,
/// payload, CRC), the way a peer in `group` would emit it.
pub fn frame_bytes(group: u8, header: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![header, payload.len() as u8];
    bytes.extend_from_slice(payload);
    let crc = bytes
        .iter()
        .fold(crc16_update(0xFFFF, group), |c, &b| crc16_update(c, b));
    bytes.push(crc as u8);
    bytes.push((crc >> 8) as u8);
    bytes
}
