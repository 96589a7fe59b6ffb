//! Rust implementation of the group/node addressed FSK packet protocol
//! spoken by RFM12B and RFM69-class radio modules.
//!
//! The driver turns the chip's byte-wide register interface into framed
//! packets: a shared network group, 5-bit node addresses, length-prefixed
//! payloads with a trailing CRC-16, an optional bounded-retry
//! acknowledgment layer ([`EasyTx`]) and optional XXTEA payload
//! encryption.
//!
//! All protocol state lives in a single [`Radio`] value. The hardware is
//! reached through the [`Transport`] trait, so the same state machine runs
//! against a real SPI bus or against a simulated chip on the host. One
//! byte moves per call to [`Radio::interrupt`], which a platform hooks up
//! to the radio's interrupt line (or calls in a loop when polling):
//!
//! ```ignore
//! let config = RadioConfig::new(5, Band::Mhz868, 212);
//! let mut radio = Radio::new(spi, config)?;
//!
//! loop {
//!     if radio.recv_done() {
//!         handle(radio.header(), radio.payload());
//!     }
//!     if have_data && radio.can_send() {
//!         radio.send_start(Header::broadcast(), &data);
//!         radio.send_wait(PowerMode::Idle);
//!     }
//! }
//! ```

#![no_std]

mod app;
mod cipher;
mod easy;
mod irq;

pub mod config;
pub mod frame;
pub mod peripherals;

pub use app::{Counters, Radio};
pub use config::{Band, RadioConfig};
pub use easy::{EasyPoll, EasySend, EasyTx};
pub use frame::{accept, ack_reply, crc16_update, Accept, Header};
pub use peripherals::{Clock, PowerMode, Transport};

/// Maximum number of payload bytes in one frame.
pub const MAX_PAYLOAD: usize = 66;

/// Maximum payload when encryption is enabled; the cipher appends up to
/// four sequence bytes before transmission.
pub const MAX_ENCRYPTED_PAYLOAD: usize = MAX_PAYLOAD - 4;

/// Frame buffer size: group + header + length + payload + 2 CRC bytes.
pub(crate) const BUF_MAX: usize = MAX_PAYLOAD + 5;

// Retry schedule of the EasyTx layer.
pub(crate) const RETRIES: u8 = 8;
pub(crate) const RETRY_DELAY_MS: u64 = 1000;

/// Errors reported during radio bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The SPI probe failed; no responding radio on the bus.
    RadioNotFound,
}

/// Transceiver states; these determine what to do with each interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Neither receiving nor transmitting; the chip sits in standby.
    Idle,
    /// The receiver is on, collecting frame bytes as they arrive.
    Receiving,
    /// Transmitting header, length and payload bytes, in on-air order.
    /// `pos` indexes the next byte to feed to the FIFO.
    SendingPayload { pos: u8 },
    /// Transmitting the low CRC byte.
    SendingCrcLow,
    /// Transmitting the high CRC byte.
    SendingCrcHigh,
    /// Transmitting the trailer filler byte.
    SendingTrailer,
    /// All bytes queued; waiting for the chip to report packet-sent.
    Done,
}

impl State {
    pub(crate) fn is_sending(self) -> bool {
        !matches!(self, State::Idle | State::Receiving)
    }
}
