//! The application-facing half of the driver: the [`Radio`] type and the
//! cooperative four-call contract (`recv_done`, `can_send`, `send_start`,
//! `send_wait`) everything else builds on.

use crate::cipher::CipherContext;
use crate::config::{Band, RadioConfig};
use crate::frame::{self, accept, Accept, FrameBuf, Header, CRC_INIT};
use crate::peripherals::{regs, PowerMode, RfmChip, Transport};
use crate::{Error, State, BUF_MAX, MAX_ENCRYPTED_PAYLOAD, MAX_PAYLOAD};
use log::{debug, trace};

/// Diagnostic counters, kept since initialization.
#[derive(Debug, Default, Clone, Copy)]
pub struct Counters {
    /// Frames delivered to the application.
    pub rx_packets: u16,
    /// Frames transmitted to completion.
    pub tx_packets: u16,
    /// Clean frames addressed to some other node.
    pub discards: u16,
    /// Receive FIFO overruns; each one costs the frame in flight.
    pub fifo_overruns: u16,
    /// Transmissions the chip terminated early because the FIFO drained.
    pub underruns: u16,
}

/// One packet radio.
///
/// The value owns all protocol state and the [`Transport`] below it;
/// exactly one owner exists for the lifetime of the process. A platform
/// wires [`interrupt`](Radio::interrupt) to the chip's interrupt line and
/// polls the facade from its main loop. None of the facade calls block
/// except [`send_wait`](Radio::send_wait).
///
/// Reception must be polled through [`recv_done`](Radio::recv_done) at
/// least as often as frames can arrive; once the chip's FIFO overflows,
/// frames are silently lost.
pub struct Radio<T: Transport> {
    pub(crate) chip: RfmChip<T>,
    pub(crate) state: State,
    pub(crate) rx: FrameBuf,
    pub(crate) tx: FrameBuf,
    pub(crate) fill: u8,
    pub(crate) crc: u16,
    pub(crate) rssi: u8,
    pub(crate) node_id: u8,
    pub(crate) group: u8,
    pub(crate) band: Band,
    pub(crate) fixed_len: u8,
    pub(crate) cipher: Option<CipherContext>,
    pub(crate) seq: Option<u32>,
    pub(crate) counters: Counters,
}

impl<T: Transport> Radio<T> {
    /// Bring up the radio: probe the SPI link, program the startup
    /// register table and the carrier frequency, and leave the chip
    /// parked in standby.
    pub fn new(transport: T, config: RadioConfig) -> Result<Self, Error> {
        let mut chip = RfmChip::new(transport);
        chip.init(config.group(), config.frf())?;
        debug!(
            "node {} up in group {} ({:?})",
            config.node_id(),
            config.group(),
            config.band()
        );
        Ok(Radio {
            chip,
            state: State::Idle,
            rx: FrameBuf::new(),
            tx: FrameBuf::new(),
            fill: 0,
            crc: 0,
            rssi: 0,
            node_id: config.node_id(),
            group: config.group(),
            band: config.band(),
            fixed_len: 0,
            cipher: None,
            seq: None,
            counters: Counters::default(),
        })
    }

    /// Poll for a received frame. Returns `true` exactly once per frame
    /// that completed with a clean CRC and passed the address check;
    /// [`header`](Radio::header), [`payload`](Radio::payload) and friends
    /// are valid until the next facade call. Re-arms reception whenever
    /// the previous receive or transmit cycle has finished.
    pub fn recv_done(&mut self) -> bool {
        match self.state {
            State::Receiving if self.rx_complete() => {
                self.state = State::Idle;
                self.chip.set_mode(regs::MODE_STANDBY);
                if self.fixed_len != 0 {
                    // Raw fixed-length mode bypasses the protocol checks.
                    self.counters.rx_packets += 1;
                    self.seq = None;
                    return true;
                }
                if usize::from(self.rx.len()) > MAX_PAYLOAD {
                    // Never trust an oversized declared length; force the
                    // frame into the bad-CRC path.
                    self.crc = 1;
                }
                match accept(self.rx.header(), self.rx.len(), self.crc, self.node_id) {
                    Accept::Accepted => {
                        self.counters.rx_packets += 1;
                        self.seq = match &self.cipher {
                            Some(cipher) => cipher.decrypt(&mut self.rx),
                            None => None,
                        };
                        return true;
                    }
                    Accept::NotForUs => {
                        self.counters.discards += 1;
                        trace!("frame for node {}, not us", self.rx.header().node());
                    }
                    Accept::BadCrc => trace!("frame dropped, bad crc"),
                }
            }
            // Sending states, Done included, belong to the interrupt side;
            // it folds Done back to Idle once the chip reports packet-sent.
            _ => {}
        }
        if self.state == State::Idle {
            self.recv_start();
        }
        false
    }

    /// Check whether a transmission may be started: the receiver must be
    /// armed with an empty buffer and the channel sensed clear.
    ///
    /// A `true` return parks the receiver as a side effect and *must* be
    /// followed by [`send_start`](Radio::send_start); calling `can_send`
    /// without sending leaves reception disabled until the next
    /// `recv_done` re-arms it.
    pub fn can_send(&mut self) -> bool {
        if self.state == State::Receiving && self.fill == 0 && self.chip.channel_clear() {
            self.chip.set_mode(regs::MODE_STANDBY);
            self.state = State::Idle;
            return true;
        }
        false
    }

    /// Start transmitting a frame. Valid only right after a `true`
    /// return from [`recv_done`](Radio::recv_done) (replies and
    /// acknowledgments) or [`can_send`](Radio::can_send) (requests);
    /// calling it out of sequence is a contract violation.
    ///
    /// Headers without [`Header::DST`] get this node's id filled in as
    /// the sender. With an encryption key installed the payload is
    /// transformed in place before transmission.
    ///
    /// # Panics
    ///
    /// Panics when the payload exceeds [`MAX_PAYLOAD`] bytes (or
    /// [`MAX_ENCRYPTED_PAYLOAD`] with encryption enabled).
    pub fn send_start(&mut self, header: Header, payload: &[u8]) {
        assert!(payload.len() <= MAX_PAYLOAD);
        debug_assert_eq!(self.state, State::Idle);

        let bits = if header.is_addressed() {
            header.bits()
        } else {
            (header.bits() & !Header::ID_MASK) | self.node_id
        };
        self.tx.set_group(self.group);
        self.tx.set_header(Header::from_bits(bits));
        self.tx.set_len(payload.len() as u8);
        self.tx.data_mut()[..payload.len()].copy_from_slice(payload);
        if let Some(cipher) = &mut self.cipher {
            assert!(payload.len() <= MAX_ENCRYPTED_PAYLOAD);
            cipher.encrypt(&mut self.tx);
        }

        // The preamble and sync bytes, group included, are emitted by the
        // hardware; every packet goes out with the full five-byte sync,
        // group 0 included. The software CRC covers the group from the
        // start.
        self.chip.write(regs::SYNC_CONFIG, regs::SYNC_FIVE_BYTES);
        self.crc = frame::crc16_update(CRC_INIT, self.group);
        self.state = State::SendingPayload { pos: 0 };
        self.chip.flush_fifo();
        self.chip.write(regs::DIO_MAPPING1, regs::DIO_TX_PACKET_SENT);
        self.chip.set_mode(regs::MODE_TRANSMITTER);
        trace!("send: hdr {:02x} len {}", bits, self.tx.len());
    }

    /// Wait for the transmission started by
    /// [`send_start`](Radio::send_start) to finish, parking the CPU in
    /// `mode` between steps.
    ///
    /// The wait also advances the transmit machine itself, so it works on
    /// platforms that poll instead of wiring up the interrupt line.
    /// Deeper power modes may cost an independent millisecond clock a few
    /// ticks while the core sleeps.
    pub fn send_wait(&mut self, mode: PowerMode) {
        while self.sending() {
            self.chip.park(mode);
            self.interrupt();
        }
    }

    /// Wait until transmission is possible, then send. Incoming frames
    /// that complete during the wait are discarded.
    pub fn send_now(&mut self, header: Header, payload: &[u8]) {
        while !self.can_send() {
            self.recv_done();
        }
        self.send_start(header, payload);
    }

    /// True while a transmission is in flight.
    pub fn sending(&self) -> bool {
        self.state.is_sending()
    }

    /// Park the chip in its lowest-power state (`deep`) or in standby.
    /// The next `recv_done` poll resumes normal operation.
    pub fn sleep(&mut self, deep: bool) {
        let mode = if deep {
            regs::MODE_SLEEP
        } else {
            regs::MODE_STANDBY
        };
        self.chip.set_mode(mode);
        self.state = State::Idle;
    }

    /// True while the supply voltage sits below the chip's low-battery
    /// threshold. An impending failure warning, not a guarantee that any
    /// further frame can be sent.
    pub fn low_battery(&mut self) -> bool {
        self.chip.read(regs::LOW_BAT) & regs::LOW_BAT_MONITOR != 0
    }

    /// Raw register exchange for out-of-band tuning, run with the radio
    /// interrupt masked. Register addresses with the top bit set are
    /// writes; plain addresses read.
    pub fn control(&mut self, addr: u8, value: u8) -> u8 {
        self.chip.spi.with_irq_masked(|spi| {
            if addr & 0x80 != 0 {
                spi.write_register(addr & 0x7F, value);
                0
            } else {
                spi.read_register(addr)
            }
        })
    }

    /// Install (or remove) the 16-byte XXTEA key. Payloads of outgoing
    /// frames are encrypted and carry a sequence number; received
    /// payloads are decrypted after the CRC check and the sequence shows
    /// up in [`seq`](Radio::seq).
    pub fn set_encryption_key(&mut self, key: Option<&[u8; 16]>) {
        self.cipher = key.map(CipherContext::new);
    }

    /// Receive fixed-length packets from non-protocol FSK devices:
    /// framing, CRC and address checks are bypassed and every completed
    /// buffer is delivered as-is. Length 0 restores normal protocol
    /// reception.
    pub fn set_raw_receive(&mut self, fixed_len: u8) {
        self.fixed_len = if usize::from(fixed_len) > MAX_PAYLOAD {
            MAX_PAYLOAD as u8
        } else {
            fixed_len
        };
    }

    // ------------ accessors, valid right after recv_done() ------------

    /// Header of the received frame.
    pub fn header(&self) -> Header {
        self.rx.header()
    }

    /// Payload length of the received frame.
    pub fn length(&self) -> u8 {
        self.rx.len()
    }

    /// Payload bytes of the received frame.
    pub fn payload(&self) -> &[u8] {
        let len = usize::from(self.rx.len()).min(MAX_PAYLOAD);
        &self.rx.data()[..len]
    }

    /// Running CRC of the last completed frame; zero means intact.
    pub fn crc(&self) -> u16 {
        self.crc
    }

    /// Signal strength sampled at the start of the last received frame.
    pub fn rssi(&self) -> u8 {
        self.rssi
    }

    /// Sequence number of the last received encrypted frame, `None` when
    /// encryption is off or the frame was not sealed. Replay policy is
    /// the caller's.
    pub fn seq(&self) -> Option<u32> {
        self.seq
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn group(&self) -> u8 {
        self.group
    }

    pub fn band(&self) -> Band {
        self.band
    }

    /// Current transceiver state, mostly useful in tests and diagnostics.
    pub fn state(&self) -> State {
        self.state
    }

    pub(crate) fn rx_complete(&self) -> bool {
        usize::from(self.fill) >= BUF_MAX || self.fill >= self.rx.len().saturating_add(5)
    }
}
